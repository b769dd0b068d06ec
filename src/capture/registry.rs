//! Concurrent stream-to-accumulator association table.
//!
//! Streams are identified by a [`StreamId`] handle assigned at attach time
//! rather than by the live I/O object itself. Ids come from a process-wide
//! monotonic counter and are never reused for the life of the process, so a
//! detached stream's id cannot alias a later stream. The table holds plain
//! owned entries and must be explicitly detached when the owning context
//! ends; it never pins the host's stream or request objects.
//!
//! `lookup` is the hot path, executed on every intercepted I/O call from
//! many request-handling threads touching disjoint ids. The table is a
//! [`DashMap`] (per-shard locking), not a single mutex over the whole
//! structure.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use http::HeaderMap;
use tracing::debug;

use crate::capture::accumulator::BoundedByteAccumulator;
use crate::content::Charset;
use crate::context::RequestContext;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Stable lightweight handle for a live stream-like object.
///
/// The host instrumentation assigns one id per physical stream at first
/// intercepted access and uses it for every subsequent call. When the same
/// physical stream begins a logically "next" request, the host detaches the
/// old entry and attaches a fresh one under a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(u64);

impl StreamId {
    /// Allocate the next process-unique stream id.
    pub fn next() -> Self {
        Self(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value, for logging.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Everything the registry tracks for one captured stream.
#[derive(Debug)]
pub struct CaptureEntry {
    /// Bounded buffer accumulating the payload prefix.
    pub accumulator: BoundedByteAccumulator,
    /// The triggering request's context (annotations, id).
    pub context: Arc<RequestContext>,
    /// Headers declared on the triggering request.
    pub headers: HeaderMap,
    /// Decoder resolved from the declared Content-Type.
    pub charset: Charset,
}

/// Concurrent identity-keyed association from streams to capture state.
#[derive(Debug, Default)]
pub struct StreamCaptureRegistry {
    entries: DashMap<StreamId, CaptureEntry>,
}

impl StreamCaptureRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an association for `id`.
    ///
    /// Policy: first-wins. If an association already exists the call is a
    /// silent no-op and returns `false`; the live entry keeps accumulating.
    pub fn attach(&self, id: StreamId, entry: CaptureEntry) -> bool {
        match self.entries.entry(id) {
            Entry::Occupied(_) => {
                debug!(stream = id.raw(), "attach ignored, entry already live");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }

    /// Returns `true` if an association exists for `id`.
    pub fn contains(&self, id: StreamId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Run `f` against the live entry for `id`, if any.
    ///
    /// This is the hot-path access used on every intercepted I/O call. The
    /// shard lock is held only for the duration of `f`; callers must not
    /// re-enter the registry from inside it.
    pub fn with_entry<R>(&self, id: StreamId, f: impl FnOnce(&mut CaptureEntry) -> R) -> Option<R> {
        self.entries.get_mut(&id).map(|mut entry| f(&mut entry))
    }

    /// Remove and return the association for `id`, if any.
    ///
    /// Called when the owning context ends, or before re-attaching when the
    /// same physical stream starts serving the next logical request.
    pub fn detach(&self, id: StreamId) -> Option<CaptureEntry> {
        self.entries.remove(&id).map(|(_, entry)| entry)
    }

    /// Number of live associations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no streams are being captured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
