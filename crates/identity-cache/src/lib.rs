//! # Identity Cache
//!
//! An in-memory cache of authenticated identities keyed by credential-derived
//! cache keys, so repeated authentications with the same credentials skip the
//! expensive primary path (registry lookups, password digest checks, token
//! parsing).
//!
//! This crate provides:
//! - **Multi-key entries**: One identity reachable through many alias keys
//!   (password digest, opaque SSO token), with removal through any alias
//!   invalidating all of them
//! - **Generational eviction**: A two-generation table swap bounds both
//!   entry count and entry age; recently-used entries survive, cold ones age
//!   out in batches
//! - **Lookup-time revalidation**: An optional external authority is
//!   consulted on every hit, failing closed on error
//! - **Replay prevention**: An atomic nonce cache rejects token replays
//!   within the token's validity window
//!
//! ## Example
//!
//! ```no_run
//! use identity_cache::{CacheConfig, CacheKey, Identity, IdentityCacheService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = IdentityCacheService::builder().build();
//! service.activate(CacheConfig::default())?;
//!
//! let identity = Identity::new("BasicRealm", "alice").with_token(b"sso".to_vec());
//! service.insert_with_password(identity, "alice", "secret");
//!
//! // A later basic-auth request hits the cache instead of the registry.
//! let key = CacheKey::basic("BasicRealm", "alice", "secret");
//! if let Some(cached) = service.lookup(Some(&key)).await {
//!     println!("cached principal: {}", cached.principal);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Cache configuration and its string-map parser.
pub mod config;
/// Cache error types.
pub mod error;
/// Identity and token claim types.
pub mod identity;
/// Cache keys and key-derivation providers.
pub mod key;
/// Token replay prevention.
pub mod replay;
/// Background staleness sweeping.
pub mod scheduler;
/// The identity cache façade.
pub mod service;
/// The generational key/entry store.
pub mod store;

/// Test helpers (feature-gated).
#[cfg(feature = "testutil")]
pub mod testutil;

// Re-export key types for convenience
pub use config::{CacheConfig, CacheConfigBuilder, UNBOUNDED};
pub use error::{CacheError, Result};
pub use identity::{Identity, TokenClaims};
pub use key::{CacheKey, CacheKeyProvider, KeyContext};
pub use replay::ReplayNonceCache;
pub use service::{CredentialValidator, IdentityCacheService, IdentityCacheServiceBuilder};
pub use store::{EvictionListener, GenerationalStore};
