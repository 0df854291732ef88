//! Error types for rate limiting operations.
//!
//! Mirrors the taxonomy an admission facade must distinguish: configuration
//! errors are fatal at construction, store errors are the ones the fail-open
//! / fail-closed policy absorbs at request time.

use thiserror::Error;

/// Result type for rate limiting operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Top-level error type for the limiter.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Raised at construction; never at runtime.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Transport, connect, timeout, or pool exhaustion talking to the store.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] ConnectionError),

    /// The store reported a script-execution error that a single
    /// reload-and-retry did not resolve.
    #[error("store script error: {0}")]
    StoreScript(String),

    /// The store's response did not match the expected shape.
    #[error("store protocol error: {0}")]
    StoreProtocol(String),
}

impl RateLimitError {
    /// True for the three runtime categories (2-4) that the admission
    /// facade absorbs via fail-mode rather than propagating.
    pub fn is_store_error(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

/// Configuration-related errors. Surfaces as [`RateLimitError::Config`],
/// i.e. spec's `ConfigInvalid`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A rate's duration string did not match the grammar, or its numeric
    /// fields were out of range (permits < 1, burst negative, etc).
    #[error("invalid rate: {0}")]
    InvalidRate(String),

    /// A policy's rate list was empty or exceeded the configured maximum.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// A key spec's string identifier was not one of the built-in tags.
    #[error("invalid key spec: {0}")]
    InvalidKeySpec(String),

    /// A store URL or connection parameter was malformed.
    #[error("invalid store configuration: {0}")]
    InvalidStore(String),

    /// A required configuration field was not supplied and has no default.
    #[error("missing required configuration: {0}")]
    MissingRequired(String),
}

/// Connection-related errors, surfaced as [`RateLimitError::StoreUnavailable`].
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Failed to establish a connection within `connect_timeout_ms`.
    #[error("failed to connect: {0}")]
    ConnectionFailed(String),

    /// A command did not complete within `command_timeout_ms`.
    #[error("command timed out after {0}ms")]
    Timeout(u64),

    /// The connection pool had no available connections.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// The connection was closed by the peer mid-operation.
    #[error("connection closed unexpectedly")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_not_store_errors() {
        let err = RateLimitError::Config(ConfigError::MissingRequired("store_url".into()));
        assert!(!err.is_store_error());
    }

    #[test]
    fn store_errors_are_store_errors() {
        let err = RateLimitError::StoreUnavailable(ConnectionError::PoolExhausted);
        assert!(err.is_store_error());
        let err = RateLimitError::StoreScript("NOSCRIPT".into());
        assert!(err.is_store_error());
        let err = RateLimitError::StoreProtocol("expected array of 5".into());
        assert!(err.is_store_error());
    }

    #[test]
    fn display_messages_are_stable() {
        let err = RateLimitError::Config(ConfigError::InvalidRate("bad period: 5x".into()));
        assert_eq!(
            err.to_string(),
            "invalid configuration: invalid rate: bad period: 5x"
        );
    }
}
