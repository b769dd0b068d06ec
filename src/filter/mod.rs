//! Blocking policy evaluation.
//!
//! A [`Filter`] is a polymorphic evaluation capability over request headers
//! and request body. Concrete filters (the IP policy filter in
//! [`ip_policy`], plus any host-supplied implementations) are composed by
//! [`multi::MultiFilter`], which the host obtains once from
//! [`registry::FilterRegistry`] and injects wherever a verdict is needed.

pub mod ip_policy;
pub mod multi;
pub mod registry;

pub use ip_policy::{BlockingData, IpPolicyFilter, IpPolicyProvider, TimedIpSet};
pub use multi::MultiFilter;
pub use registry::{FilterProvider, FilterRegistry};

use http::HeaderMap;

use crate::context::RequestContext;

/// The outcome of a filter evaluation.
///
/// `blocked == true` vetoes continued request processing. The reason string
/// is for observability records only; it never feeds back into the
/// decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    /// `true` means block execution of the request.
    pub blocked: bool,
    /// Human-readable explanation, present only when blocked.
    pub reason: Option<String>,
}

impl Verdict {
    /// A non-blocking verdict.
    pub fn allow() -> Self {
        Self::default()
    }

    /// A blocking verdict with a reason.
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason.into()),
        }
    }

    /// Returns `true` if this verdict blocks the request.
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }
}

/// A polymorphic blocking-evaluation capability.
///
/// Implementations may annotate the passed [`RequestContext`] for
/// observability, but must not mutate headers or body. Both operations are
/// synchronous, bounded-time computations over in-memory data; filters
/// never suspend, block, or perform I/O.
pub trait Filter: Send + Sync {
    /// Unique name, used for logging and the disabled-provider flag.
    fn name(&self) -> &'static str;

    /// Evaluate the request headers. Called before any body bytes flow.
    fn evaluate_request_headers(&self, ctx: &RequestContext, headers: &HeaderMap) -> Verdict;

    /// Evaluate the captured request body (possibly truncated).
    ///
    /// Default: no block. Filters that only inspect headers/metadata keep
    /// this default.
    fn evaluate_request_body(
        &self,
        ctx: &RequestContext,
        body: &[u8],
        headers: &HeaderMap,
    ) -> Verdict {
        let _ = (ctx, body, headers);
        Verdict::allow()
    }
}
