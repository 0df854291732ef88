//! Store adapter (C3): a pooled connection to the shared store plus the
//! atomic GCRA script (C4) it invokes.
//!
//! The `Store` trait keeps the teacher's async-fn-in-trait shape
//! (`examples/setulabs-skp-ratelimit/src/storage/mod.rs`) and its blanket
//! `Arc<S>` impl, but the operation set is narrowed to the one contract
//! this spec actually needs: `check_policy` (the atomic multi-rate
//! decision) and `ping` (for `healthy()`). The teacher's generic
//! `get`/`set`/`delete`/`increment`/`execute_atomic`/`compare_and_swap`
//! surface existed to support several interchangeable algorithms; this
//! limiter has exactly one algorithm (GCRA) and the contract is narrower
//! and stricter as a result (see `DESIGN.md`).

mod script;

#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "redis")]
mod redis_store;

#[cfg(feature = "memory")]
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::{RedisConfig, RedisStore};

pub use script::GCRA_SCRIPT;

use serde::Serialize;

use crate::error::Result;
use crate::policy::Policy;

/// The decoded result of one invocation of the atomic decision script,
/// spec §4.3's `check_policy` contract. `matched_index` is 0-based
/// internally; the wire format's 1-based index is an adapter-boundary
/// detail (see `RedisStore`/`MemoryStore`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScriptVerdict {
    pub allowed: bool,
    pub retry_after_ms: u64,
    pub reset_ms: u64,
    pub remaining: u64,
    pub matched_index: usize,
}

/// A pooled connection to the store plus the provisioned atomic script.
pub trait Store: Send + Sync + 'static {
    /// Evaluate `policy` against `keys` (one per rate, in order) at
    /// `now_ms`, atomically. On the happy path this is a single
    /// EVALSHA-equivalent round trip; implementations handle script
    /// eviction internally (reload once, retry once) before surfacing
    /// `StoreScript`.
    fn check_policy(
        &self,
        keys: &[String],
        policy: &Policy,
        now_ms: u64,
    ) -> impl std::future::Future<Output = Result<ScriptVerdict>> + Send;

    /// A lightweight liveness probe bounded by the command timeout.
    fn ping(&self) -> impl std::future::Future<Output = Result<()>> + Send;
}

impl<S: Store + ?Sized> Store for std::sync::Arc<S> {
    async fn check_policy(&self, keys: &[String], policy: &Policy, now_ms: u64) -> Result<ScriptVerdict> {
        (**self).check_policy(keys, policy, now_ms).await
    }

    async fn ping(&self) -> Result<()> {
        (**self).ping().await
    }
}

/// Current time in milliseconds since the Unix epoch — the `now_ms`
/// supplied by the caller, per spec §4.4's documented clock-source choice
/// (see `DESIGN.md` Open Questions).
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as u64
}
