//! Shared test utilities for identity cache testing.
//!
//! Helpers for building authenticated identities, token claims, and small
//! cache configurations without repeating the same boilerplate in every
//! test. Feature-gated behind `testutil` to prevent leaking into production
//! builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! identity-cache = { path = "../identity-cache", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use identity_cache::testutil::{test_identity, test_claims};
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{
    config::CacheConfig,
    identity::{Identity, TokenClaims},
};

/// Builds an authenticated identity in realm `TestRealm` whose opaque token
/// is `"{principal}-token"`, so token-keyed lookups are predictable.
pub fn test_identity(principal: &str) -> Identity {
    Identity::new("TestRealm", principal)
        .with_token(format!("{principal}-token").into_bytes())
        .with_groups(["users"])
}

/// Builds token claims expiring `lifetime` from now, with an optional nonce.
pub fn test_claims(jti: Option<&str>, lifetime: Duration) -> TokenClaims {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    TokenClaims {
        iss: "https://issuer.test".to_owned(),
        client_id: "test-client".to_owned(),
        sub: "subject".to_owned(),
        exp: now + lifetime.as_secs(),
        jti: jti.map(str::to_owned),
    }
}

/// A cache configuration with no background sweeping and a small entry
/// limit, so capacity behavior is observable without timing dependencies.
pub fn small_config(entry_limit: usize) -> CacheConfig {
    CacheConfig::builder()
        .entry_limit(entry_limit)
        .timeout(Duration::ZERO)
        .build()
}
