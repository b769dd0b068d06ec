//! Request-scoped context threaded through capture and filter evaluation.
//!
//! The context stands in for the host's trace/span handle, which this crate
//! treats as opaque. Filters may annotate it for observability; the host
//! attaches the annotations to whatever record it keeps for the request.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Per-request metadata shared between the capture registry and filters.
///
/// Annotations use interior mutability because filters receive the context
/// by shared reference while several may annotate during one evaluation
/// pass. Filters must not base decisions on annotations written by
/// siblings; annotations are observability output only.
#[derive(Debug)]
pub struct RequestContext {
    id: u64,
    annotations: Mutex<HashMap<String, String>>,
}

impl RequestContext {
    /// Create a fresh context with a process-unique request id.
    pub fn new() -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            annotations: Mutex::new(HashMap::new()),
        }
    }

    /// The process-unique id of this request.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Record an observability annotation on this request.
    pub fn annotate(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut map) = self.annotations.lock() {
            map.insert(key.into(), value.into());
        }
    }

    /// Look up a previously recorded annotation.
    pub fn annotation(&self, key: &str) -> Option<String> {
        self.annotations.lock().ok()?.get(key).cloned()
    }

    /// Snapshot all annotations, suitable for attaching to an
    /// observability record.
    pub fn annotations(&self) -> HashMap<String, String> {
        self.annotations
            .lock()
            .map(|map| map.clone())
            .unwrap_or_default()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
