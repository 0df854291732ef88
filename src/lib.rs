//! Distributed HTTP rate limiting on the GCRA (Generic Cell Rate
//! Algorithm): atomic per-policy admission decisions shared across
//! process instances through a pluggable [`storage::Store`] backend.
//!
//! - **One algorithm, composed**: a [`policy::Policy`] carries up to
//!   three [`rate::Rate`]s; a request is admitted only if every rate
//!   admits it, and the tightest/loosest outcome wins per spec §4.4.
//! - **Pluggable storage**: in-process [`storage::MemoryStore`] (feature
//!   `memory`) or pooled [`storage::RedisStore`] (feature `redis`), both
//!   evaluating the identical check-then-write algorithm atomically.
//! - **Identity selectors**: [`key::KeySpec`] maps a request to a
//!   principal string through the framework-agnostic
//!   [`key::RequestParts`] trait.
//! - **Framework glue**: thin Axum (`axum` feature) and Actix-web
//!   (`actix` feature) adapters over the [`manager::RateLimiter`]
//!   admission facade.
//!
//! # Quick start
//!
//! ```ignore
//! use pacer_rs::{KeySpec, LimiterConfigBuilder, MemoryStore, Policy, Rate, RateLimiter};
//!
//! # async fn run() -> pacer_rs::Result<()> {
//! let policy = Policy::new(
//!     vec![Rate::new(100, "1m", 20)?],
//!     KeySpec::Ip,
//!     "public-api",
//! )?;
//! let limiter = RateLimiter::new(
//!     MemoryStore::new(),
//!     policy,
//!     LimiterConfigBuilder::new().app_name("my-service").build()?,
//! );
//! limiter.startup().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Feature flags
//!
//! - `memory` (default): in-process [`storage::MemoryStore`]
//! - `redis`: pooled [`storage::RedisStore`] backed by `deadpool-redis`
//! - `axum`: Tower `Layer`/`Service` middleware for Axum
//! - `actix`: `Transform`/`Service` middleware for Actix-web
//! - `full`: all of the above

pub mod decision;
pub mod error;
pub mod headers;
pub mod key;
pub mod manager;
pub mod policy;
pub mod rate;
pub mod registry;
pub mod storage;

#[cfg(any(feature = "axum", feature = "actix"))]
pub mod middleware;

pub use decision::Decision;
pub use error::{ConfigError, ConnectionError, RateLimitError, Result};
pub use headers::{HeaderOptions, RejectionBody};
pub use key::{KeySpec, RequestParts};
pub use manager::{FailMode, LimiterConfig, LimiterConfigBuilder, RateLimiter, ScopeMode};
pub use policy::Policy;
pub use rate::Rate;
pub use storage::{ScriptVerdict, Store};

#[cfg(feature = "memory")]
pub use storage::MemoryStore;

#[cfg(feature = "redis")]
pub use storage::{RedisConfig, RedisStore};

#[cfg(feature = "axum")]
pub use middleware::{AuthContext, RateLimitLayer};

#[cfg(feature = "actix")]
pub use middleware::actix::RateLimitMiddleware;

/// Convenience re-exports for the common admission path.
pub mod prelude {
    pub use crate::decision::Decision;
    pub use crate::error::{RateLimitError, Result};
    pub use crate::key::{KeySpec, RequestParts};
    pub use crate::manager::{FailMode, LimiterConfigBuilder, RateLimiter, ScopeMode};
    pub use crate::policy::Policy;
    pub use crate::rate::Rate;
    pub use crate::storage::Store;

    #[cfg(feature = "memory")]
    pub use crate::storage::MemoryStore;

    #[cfg(feature = "redis")]
    pub use crate::storage::{RedisConfig, RedisStore};
}
