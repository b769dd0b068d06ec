//! Error types for the TapGate interception core.
//!
//! This crate is designed so that no error can propagate into the host
//! request-processing path: malformed headers fall back to defaults,
//! over-capacity appends truncate silently, and an absent policy snapshot
//! means "no restriction". The error types below exist only at the
//! composition boundary (filter provider construction and policy feed
//! parsing), where the host decides how to react.

use thiserror::Error;

/// Errors that can occur while composing filters or ingesting policy data.
#[derive(Debug, Error)]
pub enum FilterError {
    /// A filter provider failed to construct its filter.
    ///
    /// The registry excludes the provider from the composed set rather
    /// than aborting construction.
    #[error("filter provider '{name}' failed to build: {reason}")]
    ProviderBuild {
        /// Provider name
        name: String,
        /// Reason for the failure
        reason: String,
    },

    /// The policy data feed could not be deserialized.
    #[error("malformed policy feed: {0}")]
    PolicyFeed(#[from] serde_json::Error),
}

/// Result type alias for filter composition operations.
pub type FilterResult<T> = Result<T, FilterError>;
