//! The admission facade (C5): orchestrates C1-C4 per request.
//!
//! This is a ground-up replacement of the teacher's `RateLimitManager`
//! (a per-route `Quota` lookup table over a single `Algorithm`). The
//! facade here has exactly one algorithm (GCRA, always delegated to the
//! store adapter) and one orchestration shape: derive keys, invoke the
//! store, interpret the verdict, run observer hooks, apply fail-mode.
//! Grounded in `original_source/src/pacer/limiter.py`'s `RateLimiter`
//! class for the state machine (`Uninit -> Ready -> Closed`,
//! implicit-startup-on-first-check) and its `_metrics` counters,
//! reimplemented with `AtomicU64` instead of the Python class's plain
//! instance attributes (concurrency across threads, not just async
//! tasks, needs real atomics here).

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex as AsyncMutex;

use crate::decision::Decision;
use crate::error::{ConfigError, RateLimitError, Result};
use crate::headers::{HeaderOptions, response_headers};
use crate::key::RequestParts;
use crate::policy::Policy;
use crate::storage::{Store, current_timestamp_ms};

/// What a request's store keys are scoped by (spec §3's "scope"): the
/// route path, `METHOD:path`, or a single process-wide bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    Route,
    Method,
    App,
}

impl ScopeMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::Method => "method",
            Self::App => "app",
        }
    }

    fn scope_for(self, req: &dyn RequestParts) -> String {
        match self {
            Self::Route => req.path().to_string(),
            Self::Method => format!("{}:{}", req.method(), req.path()),
            Self::App => "global".to_string(),
        }
    }
}

/// What happens to admission while the store is unreachable (spec §7).
/// The limiter defaults to `Open`: silent over-admission for seconds is
/// usually safer than a 100% outage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailMode {
    #[default]
    Open,
    Closed,
}

type DecisionHook = Arc<dyn Fn(&dyn RequestParts, &Policy, &Decision, u64) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&dyn RequestParts, &Policy, &RateLimitError, u64) + Send + Sync>;

/// Immutable, validated configuration for a [`RateLimiter`]. Built via
/// [`LimiterConfigBuilder`], which is the only place `ConfigInvalid` can
/// be raised (spec §7: never at request time).
#[derive(Clone)]
pub struct LimiterConfig {
    pub app_name: String,
    pub scope_mode: ScopeMode,
    pub fail_mode: FailMode,
    pub connect_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub expose_headers: bool,
    pub legacy_timestamp_header: bool,
    pub expose_policy_header: bool,
    on_decision: Option<DecisionHook>,
    on_error: Option<ErrorHook>,
}

impl std::fmt::Debug for LimiterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterConfig")
            .field("app_name", &self.app_name)
            .field("scope_mode", &self.scope_mode)
            .field("fail_mode", &self.fail_mode)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("command_timeout_ms", &self.command_timeout_ms)
            .field("expose_headers", &self.expose_headers)
            .field("legacy_timestamp_header", &self.legacy_timestamp_header)
            .field("expose_policy_header", &self.expose_policy_header)
            .finish_non_exhaustive()
    }
}

/// Builder for [`LimiterConfig`], validating synchronously at `build()`.
pub struct LimiterConfigBuilder {
    app_name: String,
    scope_mode: ScopeMode,
    fail_mode: FailMode,
    connect_timeout_ms: u64,
    command_timeout_ms: u64,
    expose_headers: bool,
    legacy_timestamp_header: bool,
    expose_policy_header: bool,
    on_decision: Option<DecisionHook>,
    on_error: Option<ErrorHook>,
}

impl Default for LimiterConfigBuilder {
    fn default() -> Self {
        Self {
            app_name: "app".to_string(),
            scope_mode: ScopeMode::Route,
            fail_mode: FailMode::Open,
            connect_timeout_ms: 1000,
            command_timeout_ms: 100,
            expose_headers: true,
            legacy_timestamp_header: false,
            expose_policy_header: false,
            on_decision: None,
            on_error: None,
        }
    }
}

impl LimiterConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn scope_mode(mut self, mode: ScopeMode) -> Self {
        self.scope_mode = mode;
        self
    }

    pub fn fail_mode(mut self, mode: FailMode) -> Self {
        self.fail_mode = mode;
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    pub fn command_timeout_ms(mut self, ms: u64) -> Self {
        self.command_timeout_ms = ms;
        self
    }

    pub fn expose_headers(mut self, expose: bool) -> Self {
        self.expose_headers = expose;
        self
    }

    pub fn legacy_timestamp_header(mut self, enabled: bool) -> Self {
        self.legacy_timestamp_header = enabled;
        self
    }

    pub fn expose_policy_header(mut self, enabled: bool) -> Self {
        self.expose_policy_header = enabled;
        self
    }

    pub fn on_decision(
        mut self,
        hook: impl Fn(&dyn RequestParts, &Policy, &Decision, u64) + Send + Sync + 'static,
    ) -> Self {
        self.on_decision = Some(Arc::new(hook));
        self
    }

    pub fn on_error(
        mut self,
        hook: impl Fn(&dyn RequestParts, &Policy, &RateLimitError, u64) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> std::result::Result<LimiterConfig, ConfigError> {
        if self.app_name.trim().is_empty() {
            return Err(ConfigError::MissingRequired("app_name".into()));
        }
        if self.connect_timeout_ms == 0 || self.command_timeout_ms == 0 {
            return Err(ConfigError::InvalidStore(
                "timeouts must be greater than zero".into(),
            ));
        }
        Ok(LimiterConfig {
            app_name: self.app_name,
            scope_mode: self.scope_mode,
            fail_mode: self.fail_mode,
            connect_timeout_ms: self.connect_timeout_ms,
            command_timeout_ms: self.command_timeout_ms,
            expose_headers: self.expose_headers,
            legacy_timestamp_header: self.legacy_timestamp_header,
            expose_policy_header: self.expose_policy_header,
            on_decision: self.on_decision,
            on_error: self.on_error,
        })
    }
}

/// The limiter instance's lifecycle state (spec §4.5).
#[derive(Debug, Clone)]
enum LimiterState {
    Uninit,
    Ready,
    /// Startup failed under `fail_mode = open`: admits everything until
    /// the next `startup()` succeeds.
    Degraded,
    Closed,
    /// Startup failed under `fail_mode = closed`: propagates.
    Errored(String),
}

#[derive(Default)]
struct LimiterMetrics {
    admitted: AtomicU64,
    rejected: AtomicU64,
    store_errors: AtomicU64,
}

/// Orchestrates C1-C4 per request: derive keys, invoke the store,
/// interpret the verdict, run observer hooks, apply fail-mode, format
/// headers.
pub struct RateLimiter<St: Store> {
    store: St,
    config: LimiterConfig,
    default_policy: Arc<Policy>,
    state: AsyncMutex<LimiterState>,
    metrics: LimiterMetrics,
}

impl<St: Store> RateLimiter<St> {
    pub fn new(store: St, default_policy: Policy, config: LimiterConfig) -> Self {
        Self {
            store,
            config,
            default_policy: Arc::new(default_policy),
            state: AsyncMutex::new(LimiterState::Uninit),
            metrics: LimiterMetrics::default(),
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn default_policy(&self) -> &Policy {
        &self.default_policy
    }

    /// Opens the store (a lightweight ping, since `St` is constructed
    /// already-connected — see `DESIGN.md`). Single-flight: concurrent
    /// callers of an implicit startup all observe the same outcome.
    pub async fn startup(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if matches!(*state, LimiterState::Ready | LimiterState::Degraded) {
            return Ok(());
        }
        match self.store.ping().await {
            Ok(()) => {
                *state = LimiterState::Ready;
                Ok(())
            }
            Err(err) => match self.config.fail_mode {
                FailMode::Open => {
                    tracing::warn!(error = %err, "startup ping failed, degrading to fail-open until next startup");
                    *state = LimiterState::Degraded;
                    Ok(())
                }
                FailMode::Closed => {
                    *state = LimiterState::Errored(err.to_string());
                    Err(err)
                }
            },
        }
    }

    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        *state = LimiterState::Closed;
    }

    /// True iff startup succeeded and a store ping currently returns
    /// within the command timeout.
    pub async fn healthy(&self) -> bool {
        {
            let state = self.state.lock().await;
            if !matches!(*state, LimiterState::Ready | LimiterState::Degraded) {
                return false;
            }
        }
        let timeout = std::time::Duration::from_millis(self.config.command_timeout_ms);
        tokio::time::timeout(timeout, self.store.ping())
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    async fn ensure_started(&self) -> Result<()> {
        {
            let state = self.state.lock().await;
            match &*state {
                LimiterState::Ready | LimiterState::Degraded => return Ok(()),
                LimiterState::Errored(msg) => {
                    return Err(RateLimitError::StoreUnavailable(
                        crate::error::ConnectionError::ConnectionFailed(msg.clone()),
                    ));
                }
                LimiterState::Closed => {
                    return Err(RateLimitError::StoreUnavailable(
                        crate::error::ConnectionError::Closed,
                    ));
                }
                LimiterState::Uninit => {}
            }
        }
        self.startup().await
    }

    /// Full admission probe. Uses the limiter's default policy if `policy`
    /// is `None`.
    pub async fn check(
        &self,
        request: &dyn RequestParts,
        policy: Option<&Policy>,
    ) -> Result<Decision> {
        self.ensure_started().await?;

        let policy_ref: Arc<Policy> = match policy {
            Some(p) => Arc::new(p.clone()),
            None => self.default_policy.clone(),
        };

        let scope = self.config.scope_mode.scope_for(request);
        let principal = policy_ref.key_spec().select(request);
        let keys = policy_ref.generate_keys(
            &self.config.app_name,
            self.config.scope_mode.as_str(),
            &scope,
            &principal,
        );

        let t_start = Instant::now();
        let now_ms = current_timestamp_ms();
        let result = self.store.check_policy(&keys, &policy_ref, now_ms).await;
        let elapsed_ms = t_start.elapsed().as_millis() as u64;

        match result {
            Ok(verdict) => {
                if verdict.allowed {
                    self.metrics.admitted.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
                }
                let decision = Decision::new(
                    verdict.allowed,
                    verdict.retry_after_ms,
                    verdict.reset_ms,
                    verdict.remaining,
                    verdict.matched_index,
                    policy_ref.clone(),
                );
                self.invoke_decision_hook(request, &policy_ref, &decision, elapsed_ms);
                Ok(decision)
            }
            Err(err) => {
                self.metrics.store_errors.fetch_add(1, Ordering::Relaxed);
                self.invoke_error_hook(request, &policy_ref, &err, elapsed_ms);
                Ok(self.apply_fail_mode(policy_ref))
            }
        }
    }

    fn apply_fail_mode(&self, policy: Arc<Policy>) -> Decision {
        match self.config.fail_mode {
            FailMode::Open => Decision::fail_open(policy),
            FailMode::Closed => Decision::fail_closed(policy),
        }
    }

    /// Hooks must never break admission: panics are caught and logged,
    /// never propagated (spec §6/§9's "HookFailure").
    fn invoke_decision_hook(
        &self,
        request: &dyn RequestParts,
        policy: &Policy,
        decision: &Decision,
        elapsed_ms: u64,
    ) {
        if let Some(hook) = &self.config.on_decision {
            let outcome = catch_unwind(AssertUnwindSafe(|| hook(request, policy, decision, elapsed_ms)));
            if outcome.is_err() {
                tracing::warn!("on_decision hook panicked; ignoring");
            }
        }
    }

    fn invoke_error_hook(
        &self,
        request: &dyn RequestParts,
        policy: &Policy,
        error: &RateLimitError,
        elapsed_ms: u64,
    ) {
        if let Some(hook) = &self.config.on_error {
            let outcome = catch_unwind(AssertUnwindSafe(|| hook(request, policy, error, elapsed_ms)));
            if outcome.is_err() {
                tracing::warn!("on_error hook panicked; ignoring");
            }
        }
    }

    /// Render this decision's response headers.
    pub fn response_headers(&self, decision: &Decision) -> Vec<(&'static str, String)> {
        if !self.config.expose_headers {
            return Vec::new();
        }
        let now_unix_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        response_headers(
            decision,
            now_unix_secs,
            HeaderOptions {
                legacy_timestamp_header: self.config.legacy_timestamp_header,
                expose_policy_header: self.config.expose_policy_header,
            },
        )
    }

    pub fn metrics(&self) -> (u64, u64, u64) {
        (
            self.metrics.admitted.load(Ordering::Relaxed),
            self.metrics.rejected.load(Ordering::Relaxed),
            self.metrics.store_errors.load(Ordering::Relaxed),
        )
    }
}
