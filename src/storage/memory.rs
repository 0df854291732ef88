//! In-process store, for local development and the test suite.
//!
//! Grounded in `examples/setulabs-skp-ratelimit/src/storage/memory_gc.rs`:
//! the `DashMap` + `parking_lot::Mutex` + background-GC-via-`tokio::spawn`
//! shape is kept, generalized from that file's generic `StorageEntry` to a
//! TAT-only entry, and the generic request-count/duration `GcConfig` is
//! kept verbatim since eviction here serves the same purpose (bounding
//! memory for quiescent keys) even though its *decision data* is now a
//! plain `u64` TAT rather than an arbitrary algorithm entry.
//!
//! `DashMap` shards by key, which is exactly wrong for this spec's
//! multi-rate atomicity requirement (§4.4: all rates must be decided and
//! written as one step). A single `parking_lot::Mutex` around the decide
//! step gives the same check-then-write guarantee the Lua script gives a
//! `RedisStore`, without needing per-key locking at all.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::Result;
use crate::policy::Policy;
use crate::storage::{ScriptVerdict, Store, current_timestamp_ms};

/// How often the background sweep runs.
#[derive(Debug, Clone, Copy)]
pub enum GcInterval {
    /// Sweep after every `n` admitted requests across all keys.
    Requests(u64),
    /// Sweep on a wall-clock cadence.
    Duration(Duration),
    /// Never sweep automatically; only [`MemoryStore::gc`] removes entries.
    Manual,
}

#[derive(Debug, Clone, Copy)]
pub struct GcConfig {
    pub interval: GcInterval,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval: GcInterval::Duration(Duration::from_secs(60)),
        }
    }
}

struct Entry {
    tat_ms: u64,
    expires_at_ms: u64,
}

pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
    decision_lock: Arc<Mutex<()>>,
    requests_since_gc: Arc<AtomicU64>,
    gc_config: GcConfig,
    shutdown: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(GcConfig::default())
    }

    pub fn with_config(gc_config: GcConfig) -> Self {
        let entries: Arc<DashMap<String, Entry>> = Arc::new(DashMap::new());
        let shutdown = Arc::new(Notify::new());

        if let GcInterval::Duration(period) = gc_config.interval {
            let entries = entries.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(period) => {
                            sweep(&entries, current_timestamp_ms());
                        }
                        _ = shutdown.notified() => break,
                    }
                }
            });
        }

        Self {
            entries,
            decision_lock: Arc::new(Mutex::new(())),
            requests_since_gc: Arc::new(AtomicU64::new(0)),
            gc_config,
            shutdown,
        }
    }

    /// Force an immediate sweep of expired entries.
    pub fn gc(&self) {
        sweep(&self.entries, current_timestamp_ms());
    }

    /// Number of live (unexpired) keys currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

fn sweep(entries: &DashMap<String, Entry>, now_ms: u64) {
    entries.retain(|_, entry| entry.expires_at_ms > now_ms);
}

/// The same check-then-write algorithm as `GCRA_SCRIPT`, expressed
/// directly in Rust since there is no server to ship Lua to.
fn decide(
    entries: &DashMap<String, Entry>,
    keys: &[String],
    policy: &Policy,
    now_ms: u64,
) -> ScriptVerdict {
    let rates = policy.rates();
    let mut allowed_per_rate = Vec::with_capacity(rates.len());
    let mut new_tat = Vec::with_capacity(rates.len());
    let mut reset = Vec::with_capacity(rates.len());
    let mut remaining = Vec::with_capacity(rates.len());
    let mut retry = Vec::with_capacity(rates.len());

    for (i, rate) in rates.iter().enumerate() {
        let t_i = rate.emission_interval_ms();
        let b_i = rate.burst_capacity_ms();
        let tat = entries
            .get(&keys[i])
            .filter(|e| e.expires_at_ms > now_ms)
            .map(|e| e.tat_ms)
            .unwrap_or(now_ms);

        let allow_at = tat as i64 - b_i as i64;
        if (now_ms as i64) < allow_at {
            allowed_per_rate.push(false);
            retry.push((allow_at - now_ms as i64) as u64);
            reset.push((tat as i64 - now_ms as i64).max(0) as u64);
            remaining.push(0u64);
            new_tat.push(0u64);
        } else {
            let candidate_tat = tat.max(now_ms) + t_i;
            allowed_per_rate.push(true);
            new_tat.push(candidate_tat);
            reset.push(candidate_tat - now_ms);
            let rem = (b_i as i64 - (candidate_tat - now_ms) as i64) / t_i as i64;
            remaining.push(rem.max(0) as u64);
            retry.push(0);
        }
    }

    if let Some(rejecting) = (0..rates.len())
        .filter(|&i| !allowed_per_rate[i])
        .max_by_key(|&i| retry[i])
    {
        return ScriptVerdict {
            allowed: false,
            retry_after_ms: retry[rejecting],
            reset_ms: reset[rejecting],
            remaining: 0,
            matched_index: rejecting,
        };
    }

    let ttl = policy.ttl_ms();
    for (i, key) in keys.iter().enumerate() {
        entries.insert(
            key.clone(),
            Entry {
                tat_ms: new_tat[i],
                expires_at_ms: now_ms + ttl,
            },
        );
    }

    let matched = (0..rates.len())
        .min_by_key(|&i| remaining[i])
        .unwrap_or(0);

    ScriptVerdict {
        allowed: true,
        retry_after_ms: 0,
        reset_ms: reset[matched],
        remaining: remaining[matched],
        matched_index: matched,
    }
}

impl Store for MemoryStore {
    async fn check_policy(&self, keys: &[String], policy: &Policy, now_ms: u64) -> Result<ScriptVerdict> {
        let _guard = self.decision_lock.lock();
        let verdict = decide(&self.entries, keys, policy, now_ms);

        if let GcInterval::Requests(n) = self.gc_config.interval {
            let count = self.requests_since_gc.fetch_add(1, Ordering::Relaxed) + 1;
            if count >= n {
                self.requests_since_gc.store(0, Ordering::Relaxed);
                sweep(&self.entries, now_ms);
            }
        }

        Ok(verdict)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeySpec;
    use crate::rate::Rate;

    fn policy(permits: u32, period: &str, burst: u32) -> Policy {
        Policy::single(Rate::new(permits, period, burst).unwrap(), "ip", "t").unwrap()
    }

    #[tokio::test]
    async fn admits_burst_then_blocks() {
        let store = MemoryStore::new();
        let p = policy(10, "1s", 5);
        let keys = p.generate_keys("app", "route", "/x", "1.2.3.4");

        for i in 0..6 {
            let v = store
                .check_policy(&keys, &p, 1_000_000 + i)
                .await
                .unwrap();
            assert!(v.allowed, "request {i} should admit");
        }

        let v = store.check_policy(&keys, &p, 1_000_006).await.unwrap();
        assert!(!v.allowed);
        assert!(v.retry_after_ms > 0);
    }

    #[tokio::test]
    async fn isolates_different_principals() {
        let store = MemoryStore::new();
        let p = policy(2, "1s", 1);
        let keys_a = p.generate_keys("app", "route", "/x", "a");
        let keys_b = p.generate_keys("app", "route", "/x", "b");

        for _ in 0..2 {
            assert!(store.check_policy(&keys_a, &p, 1_000_000).await.unwrap().allowed);
        }
        assert!(!store.check_policy(&keys_a, &p, 1_000_000).await.unwrap().allowed);

        for _ in 0..2 {
            assert!(store.check_policy(&keys_b, &p, 1_000_000).await.unwrap().allowed);
        }
    }

    #[tokio::test]
    async fn ttl_expiry_resets_to_first_request() {
        let store = MemoryStore::new();
        let p = policy(2, "1s", 0); // ttl = 2000ms
        let keys = p.generate_keys("app", "route", "/x", "a");

        assert!(store.check_policy(&keys, &p, 1_000_000).await.unwrap().allowed);
        // well past ttl
        let v = store.check_policy(&keys, &p, 1_000_000 + 3_000).await.unwrap();
        assert!(v.allowed);
    }

    #[tokio::test]
    async fn multi_rate_tightest_wins() {
        let store = MemoryStore::new();
        let p = Policy::new(
            vec![
                Rate::new(100, "1m", 10).unwrap(),
                Rate::new(10, "10s", 2).unwrap(),
                Rate::new(1000, "1h", 50).unwrap(),
            ],
            KeySpec::Ip,
            "multi",
        )
        .unwrap();
        let keys = p.generate_keys("app", "route", "/x", "a");

        let mut admits = 0;
        let mut last_rejected_index = None;
        for i in 0..15u64 {
            let v = store.check_policy(&keys, &p, 1_000_000 + i).await.unwrap();
            if v.allowed {
                admits += 1;
            } else {
                last_rejected_index = Some(v.matched_index);
            }
        }
        assert_eq!(admits, 3);
        assert_eq!(last_rejected_index, Some(1));
    }
}
