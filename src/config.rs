//! Centralized configuration for the TapGate interception core.
//!
//! All parameters can be overridden via environment variables. The host
//! composition root typically calls [`CaptureConfig::from_env`] once at
//! attach time and hands the result to the capture layer and the filter
//! registry.

use std::collections::HashSet;

/// Runtime configuration for payload capture and filter composition.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Maximum number of bytes captured per stream.
    ///
    /// Appends beyond this cap are silently dropped; the already-captured
    /// prefix is preserved.
    pub max_capture_bytes: usize,

    /// Content-Type substrings eligible for capture (matched
    /// case-insensitively). Plain text is excluded by policy.
    pub capture_content_types: Vec<String>,

    /// Filter provider names excluded from composition.
    pub disabled_providers: HashSet<String>,

    /// Fallback value when a declared Content-Length is absent or
    /// unparsable.
    pub default_content_length: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_capture_bytes: 4096,
            capture_content_types: vec![
                "json".to_string(),
                "graphql".to_string(),
                "x-www-form-urlencoded".to_string(),
            ],
            disabled_providers: HashSet::new(),
            default_content_length: 4096,
        }
    }
}

impl CaptureConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// # Environment Variables
    ///
    /// - `TAPGATE_MAX_CAPTURE_BYTES` (default: 4096)
    /// - `TAPGATE_CAPTURE_CONTENT_TYPES` (comma-separated substrings,
    ///   default: `json,graphql,x-www-form-urlencoded`)
    /// - `TAPGATE_DISABLED_FILTERS` (comma-separated provider names,
    ///   default: empty)
    /// - `TAPGATE_DEFAULT_CONTENT_LENGTH` (default: 4096)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_capture_bytes: std::env::var("TAPGATE_MAX_CAPTURE_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_capture_bytes),

            capture_content_types: std::env::var("TAPGATE_CAPTURE_CONTENT_TYPES")
                .ok()
                .map(|v| parse_list(&v))
                .filter(|v| !v.is_empty())
                .unwrap_or(default.capture_content_types),

            disabled_providers: std::env::var("TAPGATE_DISABLED_FILTERS")
                .ok()
                .map(|v| parse_list(&v).into_iter().collect())
                .unwrap_or(default.disabled_providers),

            default_content_length: std::env::var("TAPGATE_DEFAULT_CONTENT_LENGTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.default_content_length),
        }
    }

    /// Returns `true` if the named filter provider is disabled.
    pub fn is_provider_disabled(&self, name: &str) -> bool {
        self.disabled_providers.contains(name)
    }
}

/// Split a comma-separated environment value into trimmed, non-empty items.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
