//! The capture layer: the contract exposed to instrumentation hooks.
//!
//! The host's network-library hooks deliver raw bytes here via
//! [`CaptureLayer::on_stream_bytes`] and signal completion via
//! [`CaptureLayer::on_stream_end`]. This crate never intercepts anything
//! itself; it only transforms data already being processed elsewhere, on
//! the calling thread, without suspending or performing I/O.
//!
//! # Hook shape
//!
//! `on_stream_bytes` returns a [`StreamOpGuard`] that the hook must hold
//! across its delegation to the original I/O operation. Overlapping API
//! surfaces (a "write a range" entry point delegating to "write one unit")
//! both invoke the hook; the guard's reentrancy depth ensures only the
//! outermost invocation captures, and the outermost guard's drop resets the
//! depth for the next chain.

use std::sync::Arc;

use http::HeaderMap;
use http::header::CONTENT_TYPE;
use tracing::debug;

use crate::capture::registry::CaptureEntry;
use crate::capture::reentrancy::{OpCategory, ReentrancyScope};
use crate::capture::{BoundedByteAccumulator, StreamCaptureRegistry, StreamId};
use crate::config::CaptureConfig;
use crate::content::{self, Charset};
use crate::context::RequestContext;
use crate::filter::{Filter, MultiFilter, Verdict};

/// Everything the host attaches to its observability record once a stream
/// completes, plus the blocking verdict it must act on.
#[derive(Debug)]
pub struct CaptureReport {
    /// `true` means the host should veto continued request processing
    /// (e.g. answer 403). What to do with the verdict is the host's call.
    pub blocked: bool,
    /// Human-readable reason, present only when blocked.
    pub reason: Option<String>,
    /// The captured payload prefix, decoded; `None` if nothing was
    /// captured.
    pub payload: Option<String>,
    /// Header key/value pairs suitable for an observability record.
    pub headers: Vec<(String, String)>,
}

/// RAII token returned by [`CaptureLayer::on_stream_bytes`].
///
/// Hold it across the delegated call to the original I/O operation; drop it
/// when the operation concludes. Nested hook invocations receive inner
/// guards whose drop leaves the depth untouched.
#[derive(Debug)]
#[must_use = "hold the guard across the delegated I/O call"]
pub struct StreamOpGuard {
    scope: ReentrancyScope,
}

impl StreamOpGuard {
    /// Returns `true` if this invocation was the outermost one (the one
    /// that captured).
    pub fn is_outermost(&self) -> bool {
        self.scope.is_outermost()
    }
}

/// The in-process interception core, one per attached host process.
pub struct CaptureLayer {
    config: CaptureConfig,
    registry: StreamCaptureRegistry,
    filters: Arc<MultiFilter>,
}

impl CaptureLayer {
    /// Assemble the layer from configuration and the composed filter
    /// (obtained from [`crate::filter::FilterRegistry`]).
    pub fn new(config: CaptureConfig, filters: Arc<MultiFilter>) -> Self {
        Self {
            config,
            registry: StreamCaptureRegistry::new(),
            filters,
        }
    }

    /// The underlying stream table, exposed for host-driven eviction.
    pub fn registry(&self) -> &StreamCaptureRegistry {
        &self.registry
    }

    /// Early header-phase veto, before any body bytes flow.
    pub fn evaluate_headers(&self, ctx: &RequestContext, headers: &HeaderMap) -> Verdict {
        self.filters.evaluate_request_headers(ctx, headers)
    }

    /// Intercept one unit of stream I/O.
    ///
    /// Called by the instrumentation hook once per logical I/O call, any
    /// number of times per stream, from the thread performing that I/O.
    /// Captures the `[offset, offset + len)` range of `data` (clamped to
    /// `data`'s bounds and to the accumulator's remaining room) into the
    /// stream's bounded buffer.
    ///
    /// A registry entry is attached lazily on the first call whose declared
    /// `Content-Type` is eligible for capture; ineligible streams cost one
    /// header check and are otherwise untouched.
    pub fn on_stream_bytes(
        &self,
        category: OpCategory,
        stream: StreamId,
        ctx: &Arc<RequestContext>,
        headers: &HeaderMap,
        data: &[u8],
        offset: usize,
        len: usize,
    ) -> StreamOpGuard {
        let scope = ReentrancyScope::enter(category);
        if scope.is_outermost() {
            self.capture(stream, ctx, headers, data, offset, len);
        }
        StreamOpGuard { scope }
    }

    fn capture(
        &self,
        stream: StreamId,
        ctx: &Arc<RequestContext>,
        headers: &HeaderMap,
        data: &[u8],
        offset: usize,
        len: usize,
    ) {
        if !self.registry.contains(stream) && !self.try_attach(stream, ctx, headers) {
            return;
        }

        let start = offset.min(data.len());
        let end = offset.saturating_add(len).min(data.len());
        let chunk = &data[start..end];

        self.registry.with_entry(stream, |entry| {
            entry.accumulator.append(chunk);
        });
    }

    /// Attach a fresh entry if the declared Content-Type warrants capture.
    fn try_attach(&self, stream: StreamId, ctx: &Arc<RequestContext>, headers: &HeaderMap) -> bool {
        let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
            return false;
        };
        if !content::should_capture(content_type, &self.config.capture_content_types) {
            return false;
        }

        let charset = Charset::resolve(content::parse_charset(content_type).as_deref());
        debug!(
            stream = stream.raw(),
            request = ctx.id(),
            ?charset,
            "attaching capture entry"
        );

        self.registry.attach(
            stream,
            CaptureEntry {
                accumulator: BoundedByteAccumulator::new(self.config.max_capture_bytes),
                context: ctx.clone(),
                headers: headers.clone(),
                charset,
            },
        )
    }

    /// Complete a stream: evict its entry, evaluate the composed filter
    /// over the captured content, and report.
    ///
    /// Returns `None` when the stream was never captured (ineligible
    /// content type, or already completed). After this call the stream id
    /// is dead; a logically "next" request on the same physical stream gets
    /// a fresh id.
    pub fn on_stream_end(&self, stream: StreamId) -> Option<CaptureReport> {
        let entry = self.registry.detach(stream)?;

        let header_verdict = self
            .filters
            .evaluate_request_headers(&entry.context, &entry.headers);
        let body_verdict = self.filters.evaluate_request_body(
            &entry.context,
            entry.accumulator.as_slice(),
            &entry.headers,
        );

        let blocked = header_verdict.blocked || body_verdict.blocked;
        let reason = match (header_verdict.reason, body_verdict.reason) {
            (Some(h), Some(b)) => Some(format!("{h}; {b}")),
            (Some(h), None) => Some(h),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };

        let payload = if entry.accumulator.is_empty() {
            None
        } else {
            Some(entry.accumulator.decode(entry.charset))
        };

        let headers = entry
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        debug!(
            stream = stream.raw(),
            request = entry.context.id(),
            blocked,
            "stream completed"
        );

        Some(CaptureReport {
            blocked,
            reason,
            payload,
            headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::filter::Verdict;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/json; charset=utf-8".parse().unwrap());
        headers
    }

    fn layer_with(filters: Vec<Arc<dyn Filter>>) -> CaptureLayer {
        CaptureLayer::new(CaptureConfig::default(), Arc::new(MultiFilter::new(filters)))
    }

    fn plain_layer() -> CaptureLayer {
        layer_with(vec![])
    }

    #[test]
    fn test_eligible_stream_is_captured() {
        let layer = plain_layer();
        let ctx = Arc::new(RequestContext::new());
        let headers = json_headers();
        let stream = StreamId::next();

        let data = br#"{"query":"q"}"#;
        drop(layer.on_stream_bytes(OpCategory::Read, stream, &ctx, &headers, data, 0, data.len()));

        let report = layer.on_stream_end(stream).unwrap();
        assert!(!report.blocked);
        assert_eq!(report.payload.as_deref(), Some(r#"{"query":"q"}"#));
        assert!(
            report
                .headers
                .iter()
                .any(|(name, value)| name == "content-type" && value.contains("json"))
        );
    }

    #[test]
    fn test_ineligible_content_type_not_captured() {
        let layer = plain_layer();
        let ctx = Arc::new(RequestContext::new());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "text/plain".parse().unwrap());
        let stream = StreamId::next();

        drop(layer.on_stream_bytes(OpCategory::Read, stream, &ctx, &headers, b"hello", 0, 5));

        assert!(layer.on_stream_end(stream).is_none());
        assert!(layer.registry().is_empty());
    }

    #[test]
    fn test_missing_content_type_not_captured() {
        let layer = plain_layer();
        let ctx = Arc::new(RequestContext::new());
        let stream = StreamId::next();

        drop(layer.on_stream_bytes(
            OpCategory::Read,
            stream,
            &ctx,
            &HeaderMap::new(),
            b"hello",
            0,
            5,
        ));
        assert!(layer.on_stream_end(stream).is_none());
    }

    #[test]
    fn test_capture_truncates_at_configured_cap() {
        let config = CaptureConfig {
            max_capture_bytes: 4,
            ..Default::default()
        };
        let layer = CaptureLayer::new(config, Arc::new(MultiFilter::new(vec![])));
        let ctx = Arc::new(RequestContext::new());
        let headers = json_headers();
        let stream = StreamId::next();

        drop(layer.on_stream_bytes(OpCategory::Read, stream, &ctx, &headers, b"AB", 0, 2));
        drop(layer.on_stream_bytes(OpCategory::Read, stream, &ctx, &headers, b"CDE", 0, 3));

        let report = layer.on_stream_end(stream).unwrap();
        assert_eq!(report.payload.as_deref(), Some("ABCD"));
    }

    #[test]
    fn test_offset_and_len_are_clamped() {
        let layer = plain_layer();
        let ctx = Arc::new(RequestContext::new());
        let headers = json_headers();
        let stream = StreamId::next();

        // offset+len beyond the slice: clamped, no panic
        drop(layer.on_stream_bytes(OpCategory::Read, stream, &ctx, &headers, b"abcdef", 2, 100));
        // offset beyond the slice: captures nothing
        drop(layer.on_stream_bytes(OpCategory::Read, stream, &ctx, &headers, b"abc", 10, 5));

        let report = layer.on_stream_end(stream).unwrap();
        assert_eq!(report.payload.as_deref(), Some("cdef"));
    }

    #[test]
    fn test_nested_hook_invocations_capture_once() {
        let layer = plain_layer();
        let ctx = Arc::new(RequestContext::new());
        let headers = json_headers();
        let stream = StreamId::next();

        // Outer "write a range" hook...
        let data = b"ABCDE";
        let outer =
            layer.on_stream_bytes(OpCategory::Write, stream, &ctx, &headers, data, 0, data.len());
        assert!(outer.is_outermost());

        // ...whose delegated implementation writes one unit at a time,
        // re-entering the hook for each byte.
        for i in 0..data.len() {
            let inner =
                layer.on_stream_bytes(OpCategory::Write, stream, &ctx, &headers, data, i, 1);
            assert!(!inner.is_outermost());
        }
        drop(outer);

        // Captured exactly once, at the outermost layer.
        let report = layer.on_stream_end(stream).unwrap();
        assert_eq!(report.payload.as_deref(), Some("ABCDE"));

        // The counter did not drift: the next chain is outermost again.
        let next_stream = StreamId::next();
        let guard =
            layer.on_stream_bytes(OpCategory::Write, next_stream, &ctx, &headers, b"x", 0, 1);
        assert!(guard.is_outermost());
        drop(guard);
        layer.on_stream_end(next_stream);
    }

    #[test]
    fn test_stream_end_without_capture_is_none() {
        let layer = plain_layer();
        assert!(layer.on_stream_end(StreamId::next()).is_none());
    }

    #[test]
    fn test_stream_end_runs_filters_and_reports_block() {
        struct BodyBlocker;
        impl Filter for BodyBlocker {
            fn name(&self) -> &'static str {
                "body-blocker"
            }
            fn evaluate_request_headers(&self, _: &RequestContext, _: &HeaderMap) -> Verdict {
                Verdict::allow()
            }
            fn evaluate_request_body(
                &self,
                _: &RequestContext,
                body: &[u8],
                _: &HeaderMap,
            ) -> Verdict {
                if body.windows(4).any(|w| w == b"drop") {
                    Verdict::block("query contains drop")
                } else {
                    Verdict::allow()
                }
            }
        }

        let layer = layer_with(vec![Arc::new(BodyBlocker)]);
        let ctx = Arc::new(RequestContext::new());
        let headers = json_headers();
        let stream = StreamId::next();

        let data = br#"{"query":"drop table users"}"#;
        drop(layer.on_stream_bytes(OpCategory::Read, stream, &ctx, &headers, data, 0, data.len()));

        let report = layer.on_stream_end(stream).unwrap();
        assert!(report.blocked);
        assert_eq!(report.reason.as_deref(), Some("query contains drop"));
    }

    #[test]
    fn test_empty_capture_reports_no_payload() {
        let layer = plain_layer();
        let ctx = Arc::new(RequestContext::new());
        let headers = json_headers();
        let stream = StreamId::next();

        // Eligible stream, but zero bytes observed.
        drop(layer.on_stream_bytes(OpCategory::Read, stream, &ctx, &headers, b"", 0, 0));

        let report = layer.on_stream_end(stream).unwrap();
        assert!(report.payload.is_none());
    }

    #[test]
    fn test_charset_from_content_type_drives_decoding() {
        let layer = plain_layer();
        let ctx = Arc::new(RequestContext::new());
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            "application/json; charset=iso-8859-1".parse().unwrap(),
        );
        let stream = StreamId::next();

        let data = [0x61, 0xE9]; // "aé" in Latin-1
        drop(layer.on_stream_bytes(OpCategory::Read, stream, &ctx, &headers, &data, 0, 2));

        let report = layer.on_stream_end(stream).unwrap();
        assert_eq!(report.payload.as_deref(), Some("a\u{00E9}"));
    }
}
