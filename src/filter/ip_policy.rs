//! Reference filter: client IP policy evaluation.
//!
//! # Candidate extraction
//!
//! Proxies and load balancers disagree about where the client address
//! lives, so one candidate IP is pulled from each of five header
//! conventions and accumulated into a set (duplicates collapse):
//!
//! - `X-Real-IP` (whole value)
//! - `X-Forwarded-For` (first comma-separated value, the original client)
//! - `X-ProxyUser-Ip`
//! - `Forwarded` (RFC 7239), the `for=` parameter: elements split on `;`,
//!   parameters on `=`
//! - `Proxy-Client-IP`
//!
//! Values are trimmed; empty results are skipped.
//!
//! # Decision
//!
//! Against the current policy snapshot, with strict `now < expires_at`:
//! effectively-allowed is the allowlist plus unexpired snoozed entries,
//! effectively-denied is the denylist plus unexpired suspended entries.
//! The request is blocked only if at least one candidate is denied and no
//! candidate is allowed. A single allowed candidate neutralizes violations
//! from other candidates in the same request; since some of these headers
//! are client-spoofable, that is a deliberate preservation of upstream
//! behavior, not an endorsement (see DESIGN.md).
//!
//! An absent snapshot never blocks. Body evaluation always allows; this
//! filter inspects headers/metadata only.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use http::HeaderMap;
use serde::Deserialize;
use tracing::debug;

use crate::config::CaptureConfig;
use crate::context::RequestContext;
use crate::error::FilterResult;
use crate::filter::registry::FilterProvider;
use crate::filter::{Filter, Verdict};

/// A set of IPs with a shared expiry, used for suspend/snooze entries.
#[derive(Debug, Clone, Deserialize)]
pub struct TimedIpSet {
    /// IPs covered by this entry.
    pub ips: HashSet<String>,
    /// The entry applies only while `now < expires_at` (strict).
    pub expires_at: DateTime<Utc>,
}

impl TimedIpSet {
    /// Returns `true` if this entry still applies at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// An immutable point-in-time snapshot of the IP policy lists.
///
/// All four lists may be simultaneously non-empty and may contain the same
/// IP in different roles; the decision rule resolves conflicts
/// deterministically. Snapshots are replaced wholesale on refresh and never
/// mutated in place.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockingData {
    /// Unconditional violations.
    #[serde(default)]
    pub denylist: HashSet<String>,
    /// Unconditional allows.
    #[serde(default)]
    pub allowlist: HashSet<String>,
    /// Temporary denylist entries, each with its own expiry.
    #[serde(default)]
    pub suspended: Vec<TimedIpSet>,
    /// Temporary allowlist entries, each with its own expiry.
    #[serde(default)]
    pub snoozed: Vec<TimedIpSet>,
}

impl BlockingData {
    /// Parse a snapshot from the JSON policy feed.
    pub fn from_json(feed: &str) -> FilterResult<Self> {
        Ok(serde_json::from_str(feed)?)
    }

    /// Returns `true` if `ip` is effectively allowed at `now`
    /// (allowlisted, or covered by an unexpired snooze entry).
    fn is_effectively_allowed(&self, ip: &str, now: DateTime<Utc>) -> bool {
        self.allowlist.contains(ip)
            || self
                .snoozed
                .iter()
                .any(|entry| entry.is_active(now) && entry.ips.contains(ip))
    }

    /// Returns `true` if `ip` is effectively denied at `now`
    /// (denylisted, or covered by an unexpired suspend entry).
    fn is_effectively_denied(&self, ip: &str, now: DateTime<Utc>) -> bool {
        self.denylist.contains(ip)
            || self
                .suspended
                .iter()
                .any(|entry| entry.is_active(now) && entry.ips.contains(ip))
    }
}

/// Filter that blocks requests whose candidate client IPs violate the
/// current policy snapshot.
pub struct IpPolicyFilter {
    // Replaced wholesale on refresh; in-flight evaluations hold their own
    // Arc and never observe a partially updated snapshot.
    policy: RwLock<Option<Arc<BlockingData>>>,
}

impl IpPolicyFilter {
    /// Create a filter with no policy installed (never blocks).
    pub fn new() -> Self {
        Self {
            policy: RwLock::new(None),
        }
    }

    /// Create a filter with an initial policy snapshot.
    pub fn with_policy(policy: BlockingData) -> Self {
        Self {
            policy: RwLock::new(Some(Arc::new(policy))),
        }
    }

    /// Atomically install a new policy snapshot.
    pub fn install_policy(&self, policy: BlockingData) {
        if let Ok(mut slot) = self.policy.write() {
            *slot = Some(Arc::new(policy));
        }
    }

    /// Remove the current policy snapshot (back to "no restriction").
    pub fn clear_policy(&self) {
        if let Ok(mut slot) = self.policy.write() {
            *slot = None;
        }
    }

    fn snapshot(&self) -> Option<Arc<BlockingData>> {
        self.policy.read().ok()?.clone()
    }

    /// Classify the candidates and decide, at an explicit `now`.
    ///
    /// Classification is independent per list: a candidate can land in both
    /// `allowed` and `violations`. Block only if violations is non-empty
    /// AND allowed is empty.
    fn decide(
        &self,
        candidates: &HashSet<String>,
        policy: &BlockingData,
        now: DateTime<Utc>,
    ) -> Verdict {
        let mut allowed: Vec<&str> = Vec::new();
        let mut violations: Vec<&str> = Vec::new();

        for ip in candidates {
            if policy.is_effectively_allowed(ip, now) {
                allowed.push(ip);
            }
            if policy.is_effectively_denied(ip, now) {
                violations.push(ip);
            }
        }

        if !violations.is_empty() && allowed.is_empty() {
            violations.sort_unstable();
            Verdict::block(format!("client ip denied by policy: {}", violations.join(", ")))
        } else {
            Verdict::allow()
        }
    }
}

impl Default for IpPolicyFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for IpPolicyFilter {
    fn name(&self) -> &'static str {
        "ip-policy"
    }

    fn evaluate_request_headers(&self, ctx: &RequestContext, headers: &HeaderMap) -> Verdict {
        let candidates = extract_candidates(headers);
        if candidates.is_empty() {
            return Verdict::allow();
        }

        let mut sorted: Vec<&str> = candidates.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        ctx.annotate("ip_policy.candidates", sorted.join(","));

        let Some(policy) = self.snapshot() else {
            debug!("no ip policy snapshot installed, allowing");
            return Verdict::allow();
        };

        self.decide(&candidates, &policy, Utc::now())
    }

    // Headers-only filter: body inspection belongs to other filters.
}

/// Pull one candidate IP from each of the five header conventions.
///
/// Whitespace is trimmed, empty results are skipped, and duplicates across
/// conventions collapse into the set.
pub fn extract_candidates(headers: &HeaderMap) -> HashSet<String> {
    let mut candidates = HashSet::new();

    let mut add = |value: Option<&str>| {
        if let Some(ip) = value.map(str::trim).filter(|ip| !ip.is_empty()) {
            candidates.insert(ip.to_string());
        }
    };

    add(header_str(headers, "x-real-ip"));

    // First comma-separated value: the original client in the chain.
    add(header_str(headers, "x-forwarded-for").and_then(|v| v.split(',').next()));

    add(header_str(headers, "x-proxyuser-ip"));

    add(header_str(headers, "forwarded").and_then(parse_forwarded_for));

    add(header_str(headers, "proxy-client-ip"));

    candidates
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Extract the `for=` parameter from an RFC 7239 `Forwarded` value.
///
/// Parameters are split on `;`, then each on `=`. Quotes around the value
/// are stripped; `for` is matched case-insensitively.
fn parse_forwarded_for(value: &str) -> Option<&str> {
    value.split(';').find_map(|param| {
        let mut parts = param.splitn(2, '=');
        let key = parts.next()?.trim();
        if key.eq_ignore_ascii_case("for") {
            Some(parts.next()?.trim().trim_matches('"'))
        } else {
            None
        }
    })
}

/// Provider for the reference IP policy filter.
///
/// Holds a shared handle to the filter so the host's policy feed can keep
/// installing fresh snapshots after composition.
pub struct IpPolicyProvider {
    filter: Arc<IpPolicyFilter>,
}

impl IpPolicyProvider {
    /// Create a provider around a shared filter handle.
    pub fn new(filter: Arc<IpPolicyFilter>) -> Self {
        Self { filter }
    }

    /// The shared filter handle, for installing policy snapshots.
    pub fn filter(&self) -> Arc<IpPolicyFilter> {
        self.filter.clone()
    }
}

impl FilterProvider for IpPolicyProvider {
    fn name(&self) -> &'static str {
        "ip-policy"
    }

    fn build(&self, _config: &CaptureConfig) -> FilterResult<Arc<dyn Filter>> {
        Ok(self.filter.clone())
    }
}
