//! Token replay prevention via nonce (JTI) tracking.
//!
//! The replay cache maintains a set of recently-presented token identifiers.
//! A token presented more than once within its validity window is flagged,
//! preventing replay where a captured credential is reused by an attacker.
//!
//! # Design
//!
//! - **Composite identity**: A nonce is only meaningful within its issuing
//!   context, so entries are keyed by the full `(issuer, client, jti)` triple.
//!   Two issuers handing out the same `jti` never collide, and a `jti` that
//!   is a prefix or superset of another is a distinct nonce.
//! - **Per-entry expiry**: Each entry expires when the token itself expires,
//!   bounding memory usage automatically.
//! - **Capacity-bounded**: LRU eviction acts as a safety net beyond the
//!   per-entry TTL.
//!
//! # Usage
//!
//! ```no_run
//! use identity_cache::replay::ReplayNonceCache;
//!
//! // Track up to 10_000 nonces at once.
//! let cache = ReplayNonceCache::new(10_000);
//! ```

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use moka::{future::Cache, policy::EvictionPolicy};

use crate::identity::TokenClaims;

/// Composite nonce identity. Structural equality over the triple sidesteps
/// any delimiter ambiguity a concatenated string key would have.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NonceKey {
    issuer: String,
    client_id: String,
    jti: String,
}

/// Per-entry expiry policy that stores the absolute expiration instant at
/// insertion time.
struct NonceExpiry;

impl moka::Expiry<NonceKey, Instant> for NonceExpiry {
    fn expire_after_create(
        &self,
        _key: &NonceKey,
        value: &Instant,
        created_at: Instant,
    ) -> Option<Duration> {
        // `value` holds the absolute expiration instant. Return the
        // remaining duration, or zero if already past.
        Some(value.saturating_duration_since(created_at))
    }
}

/// In-memory replay nonce cache backed by a [`moka::future::Cache`].
///
/// The check-and-record step is atomic: when two tasks present the same
/// nonce concurrently, exactly one observes it as fresh.
///
/// # Thread Safety
///
/// `ReplayNonceCache` is `Send + Sync` and safe for concurrent use from
/// multiple async tasks.
pub struct ReplayNonceCache {
    /// Cache mapping nonce → expiration instant.
    seen: Cache<NonceKey, Instant>,
}

impl ReplayNonceCache {
    /// Creates a replay cache tracking at most `max_capacity` nonces.
    /// Beyond capacity, the least-recently-used entry is evicted.
    pub fn new(max_capacity: u64) -> Self {
        let seen = Cache::builder()
            .max_capacity(max_capacity)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(NonceExpiry)
            .build();
        Self { seen }
    }

    /// Atomically checks whether this token's nonce was already presented,
    /// recording it if not.
    ///
    /// Returns `true` when the `(issuer, client, jti)` triple was seen
    /// before within the token's validity window. Tokens without a `jti`
    /// claim carry no nonce: they are never recorded and never flagged.
    pub async fn seen_before(&self, claims: &TokenClaims) -> bool {
        let Some(jti) = claims.jti.as_deref() else {
            return false;
        };

        let key = NonceKey {
            issuer: claims.iss.clone(),
            client_id: claims.client_id.clone(),
            jti: jti.to_owned(),
        };
        let expiration = Instant::now() + remaining_lifetime(claims.exp);

        let entry = self.seen.entry(key).or_insert(expiration).await;
        let replayed = !entry.is_fresh();
        if replayed {
            tracing::warn!(
                issuer = %claims.iss,
                client_id = %claims.client_id,
                jti,
                "token replay detected"
            );
        }
        replayed
    }

    /// Number of tracked nonces, for tests and diagnostics. Approximate
    /// until pending maintenance runs.
    pub fn nonce_count(&self) -> u64 {
        self.seen.entry_count()
    }

    #[cfg(test)]
    async fn run_pending_tasks(&self) {
        self.seen.run_pending_tasks().await;
    }
}

/// Upper bound on how long a nonce is tracked. Keeps the expiration instant
/// arithmetic overflow-free for absurd `exp` values while comfortably
/// exceeding any realistic token lifetime.
const MAX_TRACKED_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Remaining lifetime of a token expiring at Unix time `exp`, saturating to
/// zero for tokens already past expiry and clamped to
/// [`MAX_TRACKED_LIFETIME`].
fn remaining_lifetime(exp: u64) -> Duration {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    Duration::from_secs(exp.saturating_sub(now)).min(MAX_TRACKED_LIFETIME)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn claims(iss: &str, client: &str, jti: Option<&str>, lifetime: Duration) -> TokenClaims {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + lifetime.as_secs();
        TokenClaims {
            iss: iss.to_owned(),
            client_id: client.to_owned(),
            sub: "subject".to_owned(),
            exp,
            jti: jti.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn test_first_presentation_is_fresh() {
        let cache = ReplayNonceCache::new(100);
        let c = claims("https://issuer", "client-a", Some("jti-001"), Duration::from_secs(60));
        assert!(!cache.seen_before(&c).await);
    }

    #[tokio::test]
    async fn test_second_presentation_is_replay() {
        let cache = ReplayNonceCache::new(100);
        let c = claims("https://issuer", "client-a", Some("jti-002"), Duration::from_secs(60));
        assert!(!cache.seen_before(&c).await);
        assert!(cache.seen_before(&c).await);
    }

    #[tokio::test]
    async fn test_triple_components_are_distinct_dimensions() {
        // Same jti under a different issuer or client is a different nonce.
        let cache = ReplayNonceCache::new(100);
        let base = claims("https://issuer", "client-a", Some("jti-x"), Duration::from_secs(60));
        assert!(!cache.seen_before(&base).await);

        let other_issuer =
            claims("https://other", "client-a", Some("jti-x"), Duration::from_secs(60));
        assert!(!cache.seen_before(&other_issuer).await);

        let other_client =
            claims("https://issuer", "client-b", Some("jti-x"), Duration::from_secs(60));
        assert!(!cache.seen_before(&other_client).await);
    }

    #[tokio::test]
    async fn test_prefix_and_superset_jtis_are_distinct() {
        // Structural keying: "ab" under client "c" must not collide with
        // "a" under client "bc" or any other concatenation-ambiguous pair.
        let cache = ReplayNonceCache::new(100);
        let a = claims("iss", "c", Some("ab"), Duration::from_secs(60));
        let b = claims("iss", "cb", Some("a"), Duration::from_secs(60));
        let c = claims("iss", "c", Some("abc"), Duration::from_secs(60));

        assert!(!cache.seen_before(&a).await);
        assert!(!cache.seen_before(&b).await);
        assert!(!cache.seen_before(&c).await);
    }

    #[tokio::test]
    async fn test_missing_jti_is_never_recorded() {
        let cache = ReplayNonceCache::new(100);
        let c = claims("https://issuer", "client-a", None, Duration::from_secs(60));
        assert!(!cache.seen_before(&c).await);
        assert!(!cache.seen_before(&c).await);
        cache.run_pending_tasks().await;
        assert_eq!(cache.nonce_count(), 0);
    }

    #[tokio::test]
    async fn test_far_future_expiry_is_tracked_without_panic() {
        // exp at the far end of the representable range must clamp, not
        // overflow the expiration arithmetic.
        let cache = ReplayNonceCache::new(100);
        let mut c = claims("https://issuer", "client-a", Some("jti-far"), Duration::ZERO);
        c.exp = u64::MAX;

        assert!(!cache.seen_before(&c).await);
        assert!(cache.seen_before(&c).await);
    }

    #[tokio::test]
    async fn test_nonce_readmitted_after_expiry() {
        let cache = ReplayNonceCache::new(100);
        // Already-expired token: tracked with zero TTL.
        let c = claims("https://issuer", "client-a", Some("jti-expire"), Duration::ZERO);
        assert!(!cache.seen_before(&c).await);

        tokio::time::sleep(Duration::from_millis(100)).await;
        cache.run_pending_tasks().await;

        let fresh =
            claims("https://issuer", "client-a", Some("jti-expire"), Duration::from_secs(60));
        assert!(!cache.seen_before(&fresh).await);
    }

    #[tokio::test]
    async fn test_capacity_eviction_readmits_oldest() {
        let cache = ReplayNonceCache::new(2);
        for jti in ["jti-1", "jti-2", "jti-3"] {
            let c = claims("iss", "client", Some(jti), Duration::from_secs(300));
            assert!(!cache.seen_before(&c).await);
        }
        cache.run_pending_tasks().await;

        // jti-1 was evicted under LRU pressure.
        let c = claims("iss", "client", Some("jti-1"), Duration::from_secs(300));
        assert!(!cache.seen_before(&c).await);
    }

    #[tokio::test]
    async fn test_concurrent_presentations_admit_exactly_one() {
        use std::sync::Arc;

        let cache = Arc::new(ReplayNonceCache::new(100));
        let c = claims("iss", "client", Some("jti-race"), Duration::from_secs(60));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let c = c.clone();
            handles.push(tokio::spawn(async move { cache.seen_before(&c).await }));
        }

        let mut fresh = 0;
        for handle in handles {
            if !handle.await.unwrap() {
                fresh += 1;
            }
        }
        assert_eq!(fresh, 1);
    }
}
