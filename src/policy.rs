//! Policy (C1): an ordered set of 1-3 rates plus a selector and a name.
//!
//! This is a fresh type, not a generalization of the teacher's
//! `policy.rs` — that file's `Policy` trait adjusted a request's *token
//! cost* after the fact (`PenaltyPolicy`/`CreditPolicy`/`CompositePolicy`),
//! an unrelated concept with no counterpart in this spec (see
//! `DESIGN.md`). The key-derivation format is grounded directly in
//! `original_source/src/pacer/policies.py`'s `Rate.key_for` /
//! `tests/test_multi_rate.py`'s `Policy.generate_keys`, which confirm the
//! exact `{app}:{scope_mode}:{hash_tag}:{principal}:r{i}:{permits}/{period}`
//! layout used here.

use crate::error::ConfigError;
use crate::key::KeySpec;
use crate::rate::Rate;

/// Default and maximum number of rates a policy may carry, per spec §4.1.
pub const DEFAULT_MAX_RATES: usize = 3;

/// An ordered set of 1..=max_rates [`Rate`]s, a selector, and a name used
/// in telemetry.
#[derive(Debug, Clone)]
pub struct Policy {
    rates: Vec<Rate>,
    key_spec: KeySpec,
    name: String,
}

impl Policy {
    /// Build a policy, enforcing the non-empty / bounded rate list
    /// invariant with the default bound of 3.
    pub fn new(
        rates: Vec<Rate>,
        key_spec: KeySpec,
        name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Self::with_max_rates(rates, key_spec, name, DEFAULT_MAX_RATES)
    }

    /// As [`Policy::new`], but with a caller-chosen bound on the number of
    /// rates (still must be at least 1).
    pub fn with_max_rates(
        rates: Vec<Rate>,
        key_spec: KeySpec,
        name: impl Into<String>,
        max_rates: usize,
    ) -> Result<Self, ConfigError> {
        if rates.is_empty() {
            return Err(ConfigError::InvalidPolicy(
                "a policy must carry at least one rate".into(),
            ));
        }
        if rates.len() > max_rates {
            return Err(ConfigError::InvalidPolicy(format!(
                "a policy may carry at most {max_rates} rates, got {}",
                rates.len()
            )));
        }
        Ok(Self {
            rates,
            key_spec,
            name: name.into(),
        })
    }

    /// Convenience constructor for a single-rate policy identified by a
    /// built-in key-spec tag (`ip`, `api_key`, `user`, `org`).
    pub fn single(rate: Rate, key_tag: &str, name: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(vec![rate], KeySpec::from_tag(key_tag)?, name)
    }

    pub fn rates(&self) -> &[Rate] {
        &self.rates
    }

    pub fn key_spec(&self) -> &KeySpec {
        &self.key_spec
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `tau_policy = max(tau_i)` over all rates — the TTL the atomic
    /// script applies to every key it writes.
    pub fn ttl_ms(&self) -> u64 {
        self.rates.iter().map(Rate::ttl_ms).max().unwrap_or(0)
    }

    /// Per-rate store keys, in the layout defined by spec §3: the
    /// hash-tag braces wrap *scope*, not principal, so that a clustered
    /// store colocates every rate of one request on one shard.
    pub fn generate_keys(&self, app: &str, scope_mode: &str, scope: &str, principal: &str) -> Vec<String> {
        self.rates
            .iter()
            .enumerate()
            .map(|(i, rate)| {
                format!(
                    "{app}:{scope_mode}:{{{scope}}}:{principal}:r{i}:{}",
                    rate.descriptor()
                )
            })
            .collect()
    }

    /// Human-readable descriptor for the `X-RateLimit-Policy` header:
    /// `{permits};w={per}` for the given rate, with `;burst={burst}`
    /// appended when non-zero.
    pub fn descriptor(&self, rate_index: usize) -> Option<String> {
        let rate = self.rates.get(rate_index)?;
        let mut s = format!("{};w={}", rate.permits(), rate.period());
        if rate.burst() > 0 {
            s.push_str(&format!(";burst={}", rate.burst()));
        }
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_rates() {
        assert!(Policy::new(vec![], KeySpec::Ip, "p").is_err());
    }

    #[test]
    fn rejects_more_than_max_rates() {
        let rate = Rate::simple(1, "1s").unwrap();
        let rates = vec![rate.clone(), rate.clone(), rate.clone(), rate];
        assert!(Policy::new(rates, KeySpec::Ip, "p").is_err());
    }

    #[test]
    fn generates_keys_with_scope_hash_tag() {
        let policy = Policy::single(Rate::new(2, "1s", 0).unwrap(), "ip", "t").unwrap();
        let keys = policy.generate_keys("pacer", "route", "/test", "192.168.1.1");
        assert_eq!(keys, vec!["pacer:route:{/test}:192.168.1.1:r0:2/1s"]);
    }

    #[test]
    fn generates_one_key_per_rate_with_index_suffix() {
        let policy = Policy::new(
            vec![
                Rate::new(100, "1m", 10).unwrap(),
                Rate::new(10, "10s", 2).unwrap(),
            ],
            KeySpec::Ip,
            "multi",
        )
        .unwrap();
        let keys = policy.generate_keys("app", "route", "/x", "p1");
        assert_eq!(keys[0], "app:route:{/x}:p1:r0:100/1m");
        assert_eq!(keys[1], "app:route:{/x}:p1:r1:10/10s");
    }

    #[test]
    fn ttl_is_the_max_across_rates() {
        let policy = Policy::new(
            vec![
                Rate::new(10, "1s", 0).unwrap(),
                Rate::new(1000, "1h", 50).unwrap(),
            ],
            KeySpec::Ip,
            "multi",
        )
        .unwrap();
        assert_eq!(policy.ttl_ms(), policy.rates()[1].ttl_ms());
    }

    #[test]
    fn descriptor_includes_burst_only_when_nonzero() {
        let policy = Policy::single(Rate::new(10, "1s", 5).unwrap(), "ip", "t").unwrap();
        assert_eq!(policy.descriptor(0).unwrap(), "10;w=1s;burst=5");

        let policy = Policy::single(Rate::new(10, "1s", 0).unwrap(), "ip", "t").unwrap();
        assert_eq!(policy.descriptor(0).unwrap(), "10;w=1s");
    }
}
