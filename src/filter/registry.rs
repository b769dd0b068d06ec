//! Process-wide, lazily-initialized holder of the composed filter.
//!
//! The host composition root discovers filter providers (plugin loading is
//! its concern, not ours), builds a `FilterRegistry` from the concrete
//! ordered list, and asks it for the composed [`MultiFilter`]. Composition
//! happens exactly once, on first request, via [`OnceLock`] (the
//! atomic-initialization equivalent of double-checked locking): concurrent
//! first-callers observe one construction and all receive the same
//! instance.
//!
//! Providers disabled by configuration are skipped; providers that fail to
//! build are excluded with a warning rather than aborting composition, so a
//! partial provider set still yields a working filter.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::error::FilterResult;
use crate::filter::{Filter, MultiFilter};

/// A source of one filter implementation, registered by the host at
/// startup.
pub trait FilterProvider: Send + Sync {
    /// Provider identity, matched against the configured disabled set.
    fn name(&self) -> &'static str;

    /// Construct the filter. A failure here excludes only this provider.
    fn build(&self, config: &CaptureConfig) -> FilterResult<Arc<dyn Filter>>;
}

/// Thread-safe, build-once holder of the composed filter.
pub struct FilterRegistry {
    providers: Vec<Box<dyn FilterProvider>>,
    composed: OnceLock<Arc<MultiFilter>>,
}

impl FilterRegistry {
    /// Create a registry over the host's discovered providers, in order.
    pub fn new(providers: Vec<Box<dyn FilterProvider>>) -> Self {
        Self {
            providers,
            composed: OnceLock::new(),
        }
    }

    /// The composed filter, built on first call and shared thereafter.
    pub fn composed(&self, config: &CaptureConfig) -> Arc<MultiFilter> {
        self.composed
            .get_or_init(|| Arc::new(self.build(config)))
            .clone()
    }

    fn build(&self, config: &CaptureConfig) -> MultiFilter {
        let mut filters: Vec<Arc<dyn Filter>> = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            let name = provider.name();
            if config.is_provider_disabled(name) {
                debug!(provider = name, "filter provider disabled by configuration");
                continue;
            }
            match provider.build(config) {
                Ok(filter) => filters.push(filter),
                Err(err) => {
                    warn!(provider = name, error = %err, "excluding filter provider");
                }
            }
        }

        info!(count = filters.len(), "composed filter set");
        MultiFilter::new(filters)
    }
}
