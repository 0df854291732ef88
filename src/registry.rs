//! An optional process-wide "current limiter" registry, for framework
//! integrations that cannot thread a `RateLimiter` through an extension
//! or dependency-injection layer (spec §9 Design Notes).
//!
//! The source crate exposes a single global instance because it is
//! tied to one Python process and one algorithm. This limiter is
//! generic over `St: Store`, and Rust statics cannot be generic, so the
//! registry stores a type-erased `Arc<dyn Any>` and downcasts on read —
//! the `init`/`set`/`read`/`clear` lifecycle spec §9 asks for, with the
//! same double-set guard, but implemented as type erasure rather than a
//! monomorphized global.

use std::any::Any;
use std::sync::{Arc, OnceLock, RwLock};

use thiserror::Error;

use crate::manager::RateLimiter;
use crate::storage::Store;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a limiter is already registered; call clear() first or use set() to overwrite")]
    AlreadySet,
}

static REGISTRY: OnceLock<RwLock<Option<Arc<dyn Any + Send + Sync>>>> = OnceLock::new();

fn slot() -> &'static RwLock<Option<Arc<dyn Any + Send + Sync>>> {
    REGISTRY.get_or_init(|| RwLock::new(None))
}

/// Register the process-wide limiter. Fails if one is already set —
/// use [`set`] to overwrite intentionally (e.g. during a test teardown).
pub fn init<St: Store>(limiter: Arc<RateLimiter<St>>) -> Result<(), RegistryError> {
    let mut guard = slot().write().expect("registry lock poisoned");
    if guard.is_some() {
        return Err(RegistryError::AlreadySet);
    }
    *guard = Some(limiter as Arc<dyn Any + Send + Sync>);
    Ok(())
}

/// Unconditionally register (or replace) the process-wide limiter.
pub fn set<St: Store>(limiter: Arc<RateLimiter<St>>) {
    *slot().write().expect("registry lock poisoned") = Some(limiter as Arc<dyn Any + Send + Sync>);
}

/// Read the process-wide limiter back, if one was registered with the
/// same `St`. Returns `None` for an empty registry or a type mismatch.
pub fn get<St: Store>() -> Option<Arc<RateLimiter<St>>> {
    let guard = slot().read().expect("registry lock poisoned");
    guard.as_ref()?.clone().downcast::<RateLimiter<St>>().ok()
}

/// Clear the registry. Idempotent.
pub fn clear() {
    if let Some(slot) = REGISTRY.get() {
        *slot.write().expect("registry lock poisoned") = None;
    }
}
