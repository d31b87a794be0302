//! Authenticated identity payloads and validated token claims.
//!
//! [`Identity`] is the principal/credential bundle produced by a successful
//! (expensive) authentication. The cache stores it behind `Arc` and hands out
//! immutable handles; callers never receive a mutable view of a cached
//! identity.
//!
//! [`TokenClaims`] is the already-validated claim set extracted from a bearer
//! token. Structural and signature validation happen upstream — this crate
//! only consumes the result, primarily for replay prevention via the `jti`
//! claim.

use serde::{Deserialize, Serialize};

/// An authenticated principal/credential bundle.
///
/// Constructed by the caller after primary authentication succeeds, then
/// handed to [`IdentityCacheService::insert`](crate::service::IdentityCacheService::insert)
/// so that subsequent requests can skip the expensive authentication path.
///
/// The optional `token` holds the raw bytes of an opaque single-sign-on
/// credential. When present, [`OpaqueTokenProvider`](crate::key::OpaqueTokenProvider)
/// derives a cache key from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Principal name (the authenticated subject).
    pub principal: String,
    /// Security realm the principal was authenticated against.
    pub realm: String,
    /// Raw opaque token bytes from the identity's private credentials, if any.
    pub token: Option<Vec<u8>>,
    /// Group memberships resolved during authentication.
    pub groups: Vec<String>,
}

impl Identity {
    /// Creates an identity with no token credential and no groups.
    pub fn new(realm: impl Into<String>, principal: impl Into<String>) -> Self {
        Self { principal: principal.into(), realm: realm.into(), token: None, groups: Vec::new() }
    }

    /// Attaches raw opaque token bytes to the identity.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<Vec<u8>>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Attaches group memberships to the identity.
    #[must_use]
    pub fn with_groups(mut self, groups: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

/// Validated claim set from a bearer token.
///
/// Produced by an upstream token verifier after structural and signature
/// validation. The [`ReplayNonceCache`](crate::replay::ReplayNonceCache)
/// consumes the `(iss, client_id, jti)` triple; tokens without a `jti` claim
/// opt out of replay protection entirely.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer.
    pub iss: String,
    /// Audience / client identifier the token was minted for.
    pub client_id: String,
    /// Subject.
    pub sub: String,
    /// Expiration time (seconds since epoch).
    pub exp: u64,
    /// JWT ID (optional; enables replay prevention when present).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_builders() {
        let identity = Identity::new("BasicRealm", "alice")
            .with_token(b"sso-token".to_vec())
            .with_groups(["admins", "users"]);

        assert_eq!(identity.realm, "BasicRealm");
        assert_eq!(identity.principal, "alice");
        assert_eq!(identity.token.as_deref(), Some(b"sso-token".as_slice()));
        assert_eq!(identity.groups, vec!["admins".to_string(), "users".to_string()]);
    }

    #[test]
    fn test_claims_jti_omitted_when_none() {
        let claims = TokenClaims {
            iss: "https://issuer.example.com".into(),
            client_id: "rp-client".into(),
            sub: "alice".into(),
            exp: 2_000_000_000,
            jti: None,
        };

        let json = serde_json::to_string(&claims).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed.get("jti").is_none());
    }
}
