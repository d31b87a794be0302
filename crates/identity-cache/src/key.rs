//! Cache keys and pluggable key derivation.
//!
//! Every cached identity is indexed under one or more [`CacheKey`]s, each
//! derived by a [`CacheKeyProvider`] from whatever authentication context is
//! available. New authentication mechanisms register additional providers at
//! service construction time; the cache core never changes.
//!
//! Keys are a tagged enum rather than opaque strings so that the
//! password-credential key type stays semantically distinct — it is the one
//! gated by the `allowBasicAuthLookup` policy — and so that structural
//! equality rules out delimiter or prefix ambiguity between key families.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use crate::identity::Identity;

/// A lookup key for a cached identity.
///
/// Multiple keys may resolve to the same entry (e.g. a token-derived key and
/// a password-credential key for one subject); removal by any one of them
/// invalidates all of them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Password-credential key: realm, username, and a one-way digest of the
    /// password. Honored on lookup only when `allowBasicAuthLookup` is true.
    Basic {
        /// Security realm.
        realm: String,
        /// Username as presented.
        username: String,
        /// Hex-encoded SHA-256 digest of the password.
        digest: String,
    },
    /// Opaque-token key: deterministic base64url (no padding) encoding of the
    /// raw token bytes.
    Token(String),
}

impl CacheKey {
    /// Builds a password-credential key, digesting the password.
    pub fn basic(
        realm: impl Into<String>,
        username: impl Into<String>,
        password: &str,
    ) -> Self {
        Self::Basic {
            realm: realm.into(),
            username: username.into(),
            digest: hex::encode(Sha256::digest(password.as_bytes())),
        }
    }

    /// Builds an opaque-token key from raw token bytes.
    pub fn token(bytes: &[u8]) -> Self {
        Self::Token(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Whether this is a password-credential key (the policy-gated type).
    pub fn is_basic(&self) -> bool {
        matches!(self, Self::Basic { .. })
    }
}

/// The authentication context available to key providers.
///
/// `username`/`password` are only present on the insert variant where the
/// caller explicitly records a basic-auth shortcut key.
#[derive(Clone, Copy, Debug)]
pub struct KeyContext<'a> {
    /// The authenticated identity being inserted or removed.
    pub identity: &'a Identity,
    /// Username from an explicit basic-auth insert, if any.
    pub username: Option<&'a str>,
    /// Password from an explicit basic-auth insert, if any.
    pub password: Option<&'a str>,
}

impl<'a> KeyContext<'a> {
    /// Context carrying only the identity (token-based derivation).
    pub fn new(identity: &'a Identity) -> Self {
        Self { identity, username: None, password: None }
    }

    /// Context carrying the identity plus an explicit username/password pair.
    pub fn with_password(identity: &'a Identity, username: &'a str, password: &'a str) -> Self {
        Self { identity, username: Some(username), password: Some(password) }
    }
}

/// Strategy for deriving cache keys from an authentication context.
///
/// Implementations must be side-effect-free and order-independent: the
/// service iterates every registered provider on each insert and unions the
/// derived key sets into one entry.
pub trait CacheKeyProvider: Send + Sync {
    /// Derives zero or more lookup keys from the context.
    fn derive_keys(&self, ctx: &KeyContext<'_>) -> Vec<CacheKey>;

    /// Derives the key an external caller would use to evict by reference
    /// (e.g. "this SSO token is being logged out").
    ///
    /// Defaults to the first derived key.
    fn removal_key(&self, ctx: &KeyContext<'_>) -> Option<CacheKey> {
        self.derive_keys(ctx).into_iter().next()
    }
}

/// Derives a single [`CacheKey::Basic`] from an explicit username/password
/// pair and the identity's realm.
///
/// Produces nothing when the context has no password credential.
#[derive(Clone, Copy, Debug, Default)]
pub struct PasswordCredentialProvider;

impl CacheKeyProvider for PasswordCredentialProvider {
    fn derive_keys(&self, ctx: &KeyContext<'_>) -> Vec<CacheKey> {
        match (ctx.username, ctx.password) {
            (Some(username), Some(password)) => {
                vec![CacheKey::basic(&ctx.identity.realm, username, password)]
            },
            _ => Vec::new(),
        }
    }
}

/// Derives a single [`CacheKey::Token`] from the identity's opaque token
/// bytes, when present.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpaqueTokenProvider;

impl CacheKeyProvider for OpaqueTokenProvider {
    fn derive_keys(&self, ctx: &KeyContext<'_>) -> Vec<CacheKey> {
        match &ctx.identity.token {
            Some(bytes) => vec![CacheKey::token(bytes)],
            None => Vec::new(),
        }
    }
}
