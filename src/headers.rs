//! HTTP response headers the facade applies after a decision (spec §4.5/§6).
//!
//! Keeps the teacher's header-name constants and `(name, value)` pair
//! shape (`examples/setulabs-skp-ratelimit/src/headers.rs`) but renders
//! the standardized `RateLimit-*` names instead of the teacher's
//! `X-RateLimit-*` prefix, and derives values from [`crate::decision::Decision`]
//! rather than the teacher's `RateLimitInfo`.

use serde::Serialize;

use crate::decision::Decision;

/// Standard and extended rate limit header names.
pub mod names {
    pub const RATE_LIMIT_LIMIT: &str = "RateLimit-Limit";
    pub const RATE_LIMIT_REMAINING: &str = "RateLimit-Remaining";
    pub const RATE_LIMIT_RESET: &str = "RateLimit-Reset";
    pub const RETRY_AFTER: &str = "Retry-After";
    pub const X_RATE_LIMIT_RESET: &str = "X-RateLimit-Reset";
    pub const X_RATE_LIMIT_POLICY: &str = "X-RateLimit-Policy";
}

/// The literal rejection body of spec §6: `{"detail":"rate_limited",
/// "retry_after_ms":<int>}`, grounded in `original_source/src/pacer/
/// middleware.py`'s `JSONResponse(status_code=429, content={"detail":
/// "rate_limited", "retry_after_ms": ...})`.
#[derive(Debug, Clone, Serialize)]
pub struct RejectionBody {
    pub detail: &'static str,
    pub retry_after_ms: u64,
}

impl RejectionBody {
    pub fn new(retry_after_ms: u64) -> Self {
        Self {
            detail: "rate_limited",
            retry_after_ms,
        }
    }

    /// Render as the JSON text a 429 response body carries.
    ///
    /// `RejectionBody`'s shape is fixed and its fields are trivially
    /// serializable, so only an internal bug could make this fail;
    /// falls back to a literal matching the same shape rather than
    /// panicking the request path.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"detail":"rate_limited","retry_after_ms":{}}}"#,
                self.retry_after_ms
            )
        })
    }
}

/// Whether the optional legacy/descriptor headers are emitted, per the
/// `legacy_timestamp_header` / `expose_policy_header` config fields of
/// spec §6.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderOptions {
    pub legacy_timestamp_header: bool,
    pub expose_policy_header: bool,
}

/// Delta-seconds, clamped to a minimum of 1 (spec §6/§9): emitting `0`
/// misleads clients that treat it as "retry immediately".
fn delta_seconds_min_1(ms: u64) -> u64 {
    (ms / 1000).max(1)
}

/// Render the headers for one decision as `(name, value)` pairs, in the
/// order spec §6's table lists them.
pub fn response_headers(decision: &Decision, now_unix_secs: u64, opts: HeaderOptions) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        (names::RATE_LIMIT_LIMIT, decision.limit().to_string()),
        (names::RATE_LIMIT_REMAINING, decision.remaining().to_string()),
        (
            names::RATE_LIMIT_RESET,
            delta_seconds_min_1(decision.reset_ms()).to_string(),
        ),
    ];

    if decision.is_denied() {
        headers.push((
            names::RETRY_AFTER,
            delta_seconds_min_1(decision.retry_after_ms()).to_string(),
        ));
    }

    if opts.legacy_timestamp_header {
        let reset_at = now_unix_secs + delta_seconds_min_1(decision.reset_ms());
        headers.push((names::X_RATE_LIMIT_RESET, reset_at.to_string()));
    }

    if opts.expose_policy_header {
        if let Some(descriptor) = decision.policy().descriptor(decision.matched_index()) {
            headers.push((names::X_RATE_LIMIT_POLICY, descriptor));
        }
    }

    headers
}
