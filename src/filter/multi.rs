//! Aggregation of independent filters into a single verdict.
//!
//! # Chain semantics
//!
//! Both operations are a logical OR across all member filters, and every
//! member is evaluated even after one has already returned "block".
//! Short-circuiting is explicitly not the policy: filters annotate the
//! request context for observability, and those side effects must occur for
//! every filter on every request.
//!
//! # Defect isolation
//!
//! Each member runs under `catch_unwind`. A panicking filter contributes
//! "no block", is logged at ERROR level with its name (never the payload),
//! and cannot mask or corrupt a sibling's verdict. There is no separate
//! "filter crashed" user-visible state.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use http::HeaderMap;
use tracing::{debug, error, warn};

use crate::context::RequestContext;
use crate::filter::{Filter, Verdict};

/// An ordered collection of filters evaluated as one.
pub struct MultiFilter {
    filters: Vec<Arc<dyn Filter>>,
}

impl MultiFilter {
    /// Compose the given filters, evaluated in order.
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }

    /// Number of composed filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns `true` if no filters are composed (everything allowed).
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Names of the composed filters, in evaluation order.
    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Evaluate all members, OR the results, concatenate reasons.
    fn combine(&self, evaluate: impl Fn(&dyn Filter) -> Verdict) -> Verdict {
        let mut blocked = false;
        let mut reasons: Vec<String> = Vec::new();

        for filter in &self.filters {
            let name = filter.name();
            let result = catch_unwind(AssertUnwindSafe(|| evaluate(filter.as_ref())));

            match result {
                Ok(verdict) => {
                    if verdict.blocked {
                        warn!(filter = name, "filter blocked request");
                        blocked = true;
                        reasons.push(
                            verdict
                                .reason
                                .unwrap_or_else(|| format!("blocked by {name}")),
                        );
                    } else {
                        debug!(filter = name, "filter allowed request");
                    }
                }
                Err(_) => {
                    // Payload content is never logged, only the name.
                    error!(filter = name, "filter panicked during evaluation");
                }
            }
        }

        Verdict {
            blocked,
            reason: if reasons.is_empty() {
                None
            } else {
                Some(reasons.join("; "))
            },
        }
    }
}

impl Filter for MultiFilter {
    fn name(&self) -> &'static str {
        "multi"
    }

    fn evaluate_request_headers(&self, ctx: &RequestContext, headers: &HeaderMap) -> Verdict {
        self.combine(|f| f.evaluate_request_headers(ctx, headers))
    }

    fn evaluate_request_body(
        &self,
        ctx: &RequestContext,
        body: &[u8],
        headers: &HeaderMap,
    ) -> Verdict {
        self.combine(|f| f.evaluate_request_body(ctx, body, headers))
    }
}
