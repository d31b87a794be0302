//! Cache error types.
//!
//! This module defines the errors that can cross the cache's public boundary.
//! The surface is deliberately small: lookup misses, removal of unknown keys,
//! and revalidation failures are ordinary return values, never errors (callers
//! at authentication decision points must not be able to distinguish them).
//! Only configuration and lifecycle failures are surfaced here.

use thiserror::Error;

/// Errors raised by cache configuration and lifecycle operations.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]` — new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// A configuration value is malformed or out of range.
    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// The configuration key that failed validation.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// `activate` was called on a service that is already active.
    ///
    /// Use [`reconfigure`](crate::service::IdentityCacheService::reconfigure)
    /// to replace the configuration of an active service.
    #[error("Cache service is already active")]
    AlreadyActive,

    /// `reconfigure` was called on a service that was never activated.
    #[error("Cache service is not active")]
    NotActive,
}

impl CacheError {
    /// Creates an [`CacheError::InvalidConfig`] error.
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig { key: key.into(), reason: reason.into() }
    }
}

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
