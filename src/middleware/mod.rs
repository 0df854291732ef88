//! HTTP framework glue (out of scope per spec §1, kept only as thin,
//! feature-gated adapters over the admission facade).

#[cfg(feature = "axum")]
mod layer;
#[cfg(feature = "axum")]
pub use layer::{AuthContext, RateLimitLayer, RateLimitService};

#[cfg(feature = "actix")]
pub mod actix;
