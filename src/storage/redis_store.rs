//! Redis-backed store adapter (C3): pooled connections plus the cached
//! atomic decision script.
//!
//! Grounded in the teacher's `redis_cluster.rs` for the `deadpool-redis`
//! pool shape (`Config::from_url` + `create_pool` + a PING on construction)
//! and in `original_source/src/pacer/storage_simple.py`'s `_load_script` /
//! `_execute_script_sha` / `NoScriptError` handling for the script
//! lifecycle, translated from `redis.asyncio` to `redis`/`deadpool-redis`.
//! Unlike the teacher's adapter, `execute_atomic` here is not GET-then-SET
//! from the client — the decision itself runs server-side via `EVALSHA`,
//! which is what makes it safe under concurrent callers (spec §4.4).

use std::sync::RwLock;
use std::time::Duration;

use deadpool_redis::{Config, Pool, Runtime};
use redis::RedisError;

use crate::error::{ConnectionError, RateLimitError, Result};
use crate::policy::Policy;
use crate::storage::{GCRA_SCRIPT, ScriptVerdict, Store, script::N_MAX};

/// Redis store configuration (spec §6's `store_url`, `connect_timeout_ms`,
/// `command_timeout_ms`, plus a connection pool size).
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub pool_size: usize,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 50,
            connect_timeout: Duration::from_millis(1000),
            command_timeout: Duration::from_millis(100),
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// A pooled connection to Redis plus the cached SHA of [`GCRA_SCRIPT`].
pub struct RedisStore {
    pool: Pool,
    command_timeout: Duration,
    script_sha: RwLock<Option<String>>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect, PING, and load the decision script. Mirrors the teacher's
    /// `RedisStorage::new` connect-and-verify sequence.
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        let mut cfg = Config::from_url(&config.url);
        cfg.pool = Some(deadpool_redis::PoolConfig::new(config.pool_size));
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            RateLimitError::StoreUnavailable(ConnectionError::ConnectionFailed(e.to_string()))
        })?;

        let store = Self {
            pool,
            command_timeout: config.command_timeout,
            script_sha: RwLock::new(None),
        };

        store.ping_with_timeout(config.connect_timeout).await?;
        store.load_script().await?;
        tracing::info!("connected to redis and loaded the GCRA decision script");
        Ok(store)
    }

    pub async fn from_url(url: impl Into<String>) -> Result<Self> {
        Self::connect(RedisConfig::new(url)).await
    }

    async fn get_conn(&self) -> Result<deadpool_redis::Connection> {
        self.pool.get().await.map_err(|_| {
            RateLimitError::StoreUnavailable(ConnectionError::PoolExhausted)
        })
    }

    async fn ping_with_timeout(&self, timeout: Duration) -> Result<()> {
        let mut conn = self.get_conn().await?;
        tokio::time::timeout(timeout, redis::cmd("PING").query_async::<()>(&mut conn))
            .await
            .map_err(|_| {
                RateLimitError::StoreUnavailable(ConnectionError::Timeout(timeout.as_millis() as u64))
            })?
            .map_err(|e| classify_redis_error(e, timeout))?;
        Ok(())
    }

    async fn load_script(&self) -> Result<String> {
        let mut conn = self.get_conn().await?;
        let sha: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(GCRA_SCRIPT)
            .query_async(&mut conn)
            .await
            .map_err(|e| classify_redis_error(e, self.command_timeout))?;
        *self.script_sha.write().expect("script_sha lock poisoned") = Some(sha.clone());
        tracing::debug!(sha = %sha, "loaded GCRA decision script");
        Ok(sha)
    }

    fn cached_sha(&self) -> Option<String> {
        self.script_sha.read().expect("script_sha lock poisoned").clone()
    }

    async fn evalsha(
        &self,
        conn: &mut deadpool_redis::Connection,
        sha: &str,
        keys: &[String],
        args: &[i64],
    ) -> std::result::Result<Vec<i64>, RedisError> {
        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(sha).arg(keys.len());
        for key in keys {
            cmd.arg(key);
        }
        for arg in args {
            cmd.arg(arg);
        }
        cmd.query_async(conn).await
    }

    /// Bound one `EVALSHA` round trip by the configured command timeout
    /// (spec §4.3/§5: "every `check` call suspends at most once ...
    /// bounded by the command timeout"). Returns the raw [`EvalError`] so
    /// the caller can still inspect a NOSCRIPT reply before it gets folded
    /// into a [`RateLimitError`].
    async fn evalsha_with_timeout(
        &self,
        conn: &mut deadpool_redis::Connection,
        sha: &str,
        keys: &[String],
        args: &[i64],
    ) -> std::result::Result<Vec<i64>, EvalError> {
        match tokio::time::timeout(self.command_timeout, self.evalsha(conn, sha, keys, args)).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(EvalError::Redis(e)),
            Err(_) => Err(EvalError::Timeout),
        }
    }
}

/// Outcome of a timeout-bounded `EVALSHA` attempt: either the client-level
/// `RedisError` the command itself produced, or the deadline elapsing
/// first. Kept distinct from [`RateLimitError`] so NOSCRIPT can still be
/// detected on the raw error before classification collapses it.
enum EvalError {
    Timeout,
    Redis(RedisError),
}

impl EvalError {
    fn into_rate_limit_error(self, command_timeout: Duration) -> RateLimitError {
        match self {
            EvalError::Timeout => {
                RateLimitError::StoreUnavailable(ConnectionError::Timeout(command_timeout.as_millis() as u64))
            }
            EvalError::Redis(e) => classify_redis_error(e, command_timeout),
        }
    }
}

/// Pad `keys` up to [`N_MAX`] slots with empty strings, per spec §6's wire
/// contract ("key strings (padded with empty strings)"). The script only
/// reads `KEYS[1..n_rates]`, so the padding slots are never dereferenced;
/// this keeps the argument shape documented by `script.rs`'s header comment
/// regardless.
fn pad_keys(keys: &[String]) -> Vec<String> {
    let mut padded = keys.to_vec();
    padded.resize(N_MAX, String::new());
    padded
}

/// Transport/timeout errors surface as `StoreUnavailable`; everything else
/// a Redis client can report is a `StoreScript`/`StoreProtocol` split made
/// by the caller, since `RedisError` alone does not distinguish them.
fn classify_redis_error(err: RedisError, command_timeout: Duration) -> RateLimitError {
    if err.is_timeout() {
        return RateLimitError::StoreUnavailable(ConnectionError::Timeout(
            command_timeout.as_millis() as u64,
        ));
    }
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        return RateLimitError::StoreUnavailable(ConnectionError::ConnectionFailed(err.to_string()));
    }
    RateLimitError::StoreScript(err.to_string())
}

fn is_noscript(err: &RedisError) -> bool {
    err.code() == Some("NOSCRIPT")
}

impl Store for RedisStore {
    async fn check_policy(&self, keys: &[String], policy: &Policy, now_ms: u64) -> Result<ScriptVerdict> {
        let rates = policy.rates();
        let mut args: Vec<i64> = vec![now_ms as i64, policy.ttl_ms() as i64, rates.len() as i64];
        for rate in rates {
            args.push(rate.emission_interval_ms() as i64);
            args.push(rate.burst_capacity_ms() as i64);
        }
        while args.len() < 3 + N_MAX * 2 {
            args.push(0);
        }

        let sha = self
            .cached_sha()
            .ok_or_else(|| RateLimitError::StoreScript("script not yet loaded".into()))?;
        let padded_keys = pad_keys(keys);

        let mut conn = self.get_conn().await?;
        let raw = match self.evalsha_with_timeout(&mut conn, &sha, &padded_keys, &args).await {
            Ok(v) => v,
            Err(EvalError::Redis(e)) if is_noscript(&e) => {
                tracing::warn!("redis evicted the GCRA script, reloading and retrying once");
                let sha = self.load_script().await?;
                self.evalsha_with_timeout(&mut conn, &sha, &padded_keys, &args)
                    .await
                    .map_err(|e| e.into_rate_limit_error(self.command_timeout))?
            }
            Err(e) => return Err(e.into_rate_limit_error(self.command_timeout)),
        };

        if raw.len() != 5 {
            return Err(RateLimitError::StoreProtocol(format!(
                "expected a 5-element reply, got {}",
                raw.len()
            )));
        }
        Ok(ScriptVerdict {
            allowed: raw[0] != 0,
            retry_after_ms: raw[1].max(0) as u64,
            reset_ms: raw[2].max(0) as u64,
            remaining: raw[3].max(0) as u64,
            matched_index: (raw[4].max(1) - 1) as usize,
        })
    }

    async fn ping(&self) -> Result<()> {
        self.ping_with_timeout(self.command_timeout).await
    }
}
