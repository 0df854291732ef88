//! The admission facade's per-request result (C5, spec §4.5/§6).
//!
//! Replaces the teacher's multi-algorithm `Decision`/`RateLimitInfo` pair
//! (`Instant`-based reset/window fields meant to serve six different
//! algorithms) with the single shape this spec's `check()` returns:
//! `allowed`, `retry_after_ms`, `reset_ms`, `remaining`, `matched_index`,
//! plus the policy that was evaluated so header rendering can look up the
//! matched rate's `permits`/descriptor.

use std::sync::Arc;

use serde::Serialize;

use crate::policy::Policy;

/// The result of one `RateLimiter::check` call. Serializable (minus the
/// evaluated policy, an internal reference) for hooks and telemetry
/// exporters that want to log or ship a decision as-is.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub(crate) allowed: bool,
    pub(crate) retry_after_ms: u64,
    pub(crate) reset_ms: u64,
    pub(crate) remaining: u64,
    pub(crate) matched_index: usize,
    #[serde(skip)]
    pub(crate) policy: Arc<Policy>,
}

impl Decision {
    pub(crate) fn new(
        allowed: bool,
        retry_after_ms: u64,
        reset_ms: u64,
        remaining: u64,
        matched_index: usize,
        policy: Arc<Policy>,
    ) -> Self {
        Self {
            allowed,
            retry_after_ms,
            reset_ms,
            remaining,
            matched_index,
            policy,
        }
    }

    /// Synthesize the result the fail-open path returns when the store is
    /// unreachable: admit, with `remaining` set to the loosest rate's
    /// permit count and no retry/reset pressure (spec §7).
    pub(crate) fn fail_open(policy: Arc<Policy>) -> Self {
        let remaining = policy
            .rates()
            .iter()
            .map(|r| r.permits() as u64)
            .max()
            .unwrap_or(0);
        Self {
            allowed: true,
            retry_after_ms: 0,
            reset_ms: 0,
            remaining,
            matched_index: 0,
            policy,
        }
    }

    /// Synthesize the result the fail-closed path returns when the store
    /// is unreachable: reject with the fixed 1000ms retry/reset of §7.
    pub(crate) fn fail_closed(policy: Arc<Policy>) -> Self {
        Self {
            allowed: false,
            retry_after_ms: 1000,
            reset_ms: 1000,
            remaining: 0,
            matched_index: 0,
            policy,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn is_denied(&self) -> bool {
        !self.allowed
    }

    pub fn retry_after_ms(&self) -> u64 {
        self.retry_after_ms
    }

    pub fn reset_ms(&self) -> u64 {
        self.reset_ms
    }

    /// Never negative: callers must not see a negative remaining count,
    /// even though some store script paths compute one internally before
    /// clamping (spec §9 Open Questions).
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// The rate within `policy()` that determined this decision: the
    /// tightest rate on admission, the one with the longest retry on
    /// rejection.
    pub fn matched_index(&self) -> usize {
        self.matched_index
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// `permits` of the matched rate, for the `RateLimit-Limit` header.
    pub fn limit(&self) -> u64 {
        self.policy
            .rates()
            .get(self.matched_index)
            .map(|r| r.permits() as u64)
            .unwrap_or(0)
    }
}
