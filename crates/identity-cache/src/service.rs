//! The identity cache façade.
//!
//! [`IdentityCacheService`] binds a [`GenerationalStore`], an
//! [`EvictionScheduler`], and the registered [`CacheKeyProvider`]s behind one
//! public surface. It applies the `allowBasicAuthLookup` policy gate,
//! revalidates cached identities against an optional external authority at
//! lookup time, and supports atomic reconfiguration with a hard cutover.
//!
//! Providers, eviction listeners, and the revalidation collaborator are all
//! fixed at construction time via [`IdentityCacheService::builder`]; the
//! mutable state is a single swappable `(store, scheduler, config)` triple.
//!
//! Misses and no-ops are plain return values. A lookup that misses because
//! the key is unknown, because policy gates it, or because revalidation
//! failed is indistinguishable to the caller — authentication decision
//! points never learn cache internals.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    config::CacheConfig,
    error::{CacheError, Result},
    identity::Identity,
    key::{CacheKey, CacheKeyProvider, KeyContext, OpaqueTokenProvider, PasswordCredentialProvider},
    scheduler::EvictionScheduler,
    store::{EvictionListener, GenerationalStore},
};

/// Boxed error type for revalidation collaborator failures.
pub type ValidatorError = Box<dyn std::error::Error + Send + Sync>;

/// External authority consulted at lookup time to confirm a cached identity
/// is still valid (typically a registry or directory check).
///
/// The call may block on I/O; the service never holds the store lock while
/// invoking it. An `Err` is treated exactly like `Ok(false)` — fail closed,
/// never "trust the cache".
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    /// Whether the cached identity is still valid.
    async fn is_valid(&self, identity: &Identity) -> std::result::Result<bool, ValidatorError>;
}

/// One activated configuration: store, its sweeper, and the config they were
/// built from. Replaced wholesale on reconfiguration.
struct ActiveState {
    store: Arc<GenerationalStore>,
    scheduler: EvictionScheduler,
    config: CacheConfig,
}

impl ActiveState {
    fn start(config: &CacheConfig, listeners: Arc<[Arc<dyn EvictionListener>]>) -> Self {
        let store = Arc::new(GenerationalStore::new(config, listeners));
        let scheduler = EvictionScheduler::start(store.clone(), config.timeout());
        Self { store, scheduler, config: config.clone() }
    }
}

/// Façade over the identity cache subsystem.
///
/// # Lifecycle
///
/// Construct with [`builder`](Self::builder), then
/// [`activate`](Self::activate) with an initial [`CacheConfig`].
/// [`reconfigure`](Self::reconfigure) is a hard cutover: entries inserted
/// under the old configuration become unreachable, and the old background
/// sweeper is stopped before the call returns. [`deactivate`](Self::deactivate)
/// guarantees no background activity after it returns.
///
/// # Examples
///
/// ```
/// use identity_cache::{
///     config::CacheConfig,
///     identity::Identity,
///     key::CacheKey,
///     service::IdentityCacheService,
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let service = IdentityCacheService::builder().build();
/// service.activate(CacheConfig::default())?;
///
/// let identity = Identity::new("BasicRealm", "alice").with_token(b"sso".to_vec());
/// service.insert(identity.clone());
///
/// let hit = service.lookup(Some(&CacheKey::token(b"sso"))).await;
/// assert_eq!(hit.as_deref(), Some(&identity));
///
/// service.deactivate().await;
/// # Ok(())
/// # }
/// ```
pub struct IdentityCacheService {
    providers: Vec<Arc<dyn CacheKeyProvider>>,
    listeners: Arc<[Arc<dyn EvictionListener>]>,
    validator: Option<Arc<dyn CredentialValidator>>,
    state: RwLock<Option<Arc<ActiveState>>>,
}

impl IdentityCacheService {
    /// Returns a builder with the two standard key providers registered:
    /// [`PasswordCredentialProvider`] and [`OpaqueTokenProvider`].
    pub fn builder() -> IdentityCacheServiceBuilder {
        IdentityCacheServiceBuilder {
            providers: vec![
                Arc::new(PasswordCredentialProvider),
                Arc::new(OpaqueTokenProvider),
            ],
            listeners: Vec::new(),
            validator: None,
        }
    }

    /// Activates the service with an initial configuration, constructing the
    /// store and starting the background sweeper.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::AlreadyActive`] if the service is active; use
    /// [`reconfigure`](Self::reconfigure) instead.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context when the configured
    /// timeout is non-zero (the sweeper is a spawned task).
    pub fn activate(&self, config: CacheConfig) -> Result<()> {
        let mut state = self.state.write();
        if state.is_some() {
            return Err(CacheError::AlreadyActive);
        }
        tracing::info!(
            entry_limit = config.entry_limit(),
            timeout_ms = config.timeout().as_millis() as u64,
            allow_basic_auth_lookup = config.allow_basic_auth_lookup(),
            "identity cache activated"
        );
        *state = Some(Arc::new(ActiveState::start(&config, self.listeners.clone())));
        Ok(())
    }

    /// Atomically replaces the store and sweeper with freshly constructed
    /// ones reflecting `config`.
    ///
    /// This is a hard cutover: entries inserted under the old configuration
    /// are not migrated and become unreachable. The old sweeper has fully
    /// stopped by the time this returns, so two background sweepers never
    /// run concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotActive`] if the service was never activated.
    /// A failed reconfiguration leaves the previously active store intact.
    pub async fn reconfigure(&self, config: CacheConfig) -> Result<()> {
        let next = Arc::new(ActiveState::start(&config, self.listeners.clone()));

        let old = {
            let mut state = self.state.write();
            if state.is_none() {
                None
            } else {
                state.replace(next.clone())
            }
        };

        match old {
            Some(old) => {
                old.scheduler.stop().await;
                tracing::info!(
                    entry_limit = config.entry_limit(),
                    timeout_ms = config.timeout().as_millis() as u64,
                    "identity cache reconfigured; previous entries discarded"
                );
                Ok(())
            },
            None => {
                // The replacement was never installed; tear it down.
                next.scheduler.stop().await;
                Err(CacheError::NotActive)
            },
        }
    }

    /// Deactivates the service: stops the sweeper and releases the store.
    ///
    /// Safe to call on an inactive service. No background activity remains
    /// after return.
    pub async fn deactivate(&self) {
        let old = self.state.write().take();
        if let Some(old) = old {
            old.scheduler.stop().await;
            tracing::info!("identity cache deactivated");
        }
    }

    /// Whether the service is currently active.
    pub fn is_active(&self) -> bool {
        self.state.read().is_some()
    }

    /// Caches an authenticated identity under every key the registered
    /// providers derive from its token-based credentials.
    ///
    /// A no-op when the service is inactive or when no provider derives a
    /// key.
    #[tracing::instrument(skip_all, fields(principal = %identity.principal))]
    pub fn insert(&self, identity: Identity) {
        let identity = Arc::new(identity);
        let keys = self.derive_all(&KeyContext::new(&identity));
        self.insert_keys(identity, keys);
    }

    /// Caches an authenticated identity, additionally recording a
    /// password-credential shortcut key derived from the given
    /// username/password pair.
    ///
    /// Used when the caller already performed primary authentication and
    /// wants subsequent basic-auth requests to hit the cache.
    #[tracing::instrument(skip_all, fields(principal = %identity.principal))]
    pub fn insert_with_password(&self, identity: Identity, username: &str, password: &str) {
        let identity = Arc::new(identity);
        let keys = self.derive_all(&KeyContext::with_password(&identity, username, password));
        self.insert_keys(identity, keys);
    }

    /// Looks up a cached identity.
    ///
    /// `None` keys always miss. Password-credential keys miss while
    /// `allowBasicAuthLookup` is false, even when the entry exists (other
    /// key types for the same identity remain usable). On a hit, the entry's
    /// survival window is refreshed; if a revalidation collaborator is
    /// configured it is consulted after the store lock is released, and an
    /// invalid (or erroring — fail closed) result evicts the entry, notifies
    /// the eviction listeners, and misses.
    #[tracing::instrument(skip_all)]
    pub async fn lookup(&self, key: Option<&CacheKey>) -> Option<Arc<Identity>> {
        let key = key?;
        let state = self.active_state()?;

        if key.is_basic() && !state.config.allow_basic_auth_lookup() {
            tracing::debug!("basic-auth lookup disallowed by policy");
            return None;
        }

        let identity = state.store.get(key)?;

        if let Some(validator) = &self.validator {
            let valid = match validator.is_valid(&identity).await {
                Ok(valid) => valid,
                Err(error) => {
                    tracing::warn!(
                        principal = %identity.principal,
                        %error,
                        "revalidation collaborator failed; treating identity as invalid"
                    );
                    false
                },
            };
            if !valid {
                // Revalidation failure is an eviction, not a removal:
                // listeners are told the identity aged out of trust.
                if let Some(evicted) = state.store.remove(key) {
                    for listener in self.listeners.iter() {
                        listener.on_evicted(vec![evicted.clone()]);
                    }
                }
                tracing::debug!(principal = %identity.principal, "evicted on failed revalidation");
                return None;
            }
        }

        Some(identity)
    }

    /// Removes the identity resolved by `key`, invalidating every alias key
    /// that pointed at the same entry.
    ///
    /// `None` and unknown keys are silent no-ops. Eviction listeners are not
    /// notified — removal is a direct operation, not an eviction.
    pub fn remove(&self, key: Option<&CacheKey>) {
        let Some(key) = key else { return };
        if let Some(state) = self.active_state() {
            state.store.remove(key);
        }
    }

    /// Removes an identity by reference, using each provider's removal key.
    ///
    /// Used when an external caller evicts by credential rather than by key
    /// (e.g. "this SSO token is being logged out").
    pub fn remove_identity(&self, identity: &Identity) {
        let Some(state) = self.active_state() else { return };
        let ctx = KeyContext::new(identity);
        for provider in &self.providers {
            if let Some(key) = provider.removal_key(&ctx) {
                state.store.remove(&key);
            }
        }
    }

    /// Clears every entry in the store.
    pub fn remove_all(&self) {
        if let Some(state) = self.active_state() {
            state.store.clear();
            tracing::debug!("identity cache cleared");
        }
    }

    /// External configuration-change notification; equivalent to
    /// [`remove_all`](Self::remove_all).
    pub fn notify_change(&self) {
        self.remove_all();
    }

    /// Number of distinct live entries, for tests and operational
    /// visibility. Zero when inactive.
    pub fn entry_count(&self) -> usize {
        self.active_state().map_or(0, |state| state.store.entry_count())
    }

    fn active_state(&self) -> Option<Arc<ActiveState>> {
        self.state.read().clone()
    }

    fn derive_all(&self, ctx: &KeyContext<'_>) -> Vec<CacheKey> {
        self.providers.iter().flat_map(|p| p.derive_keys(ctx)).collect()
    }

    fn insert_keys(&self, identity: Arc<Identity>, keys: Vec<CacheKey>) {
        match self.active_state() {
            Some(state) => state.store.insert(identity, keys),
            None => tracing::debug!("insert ignored: cache not active"),
        }
    }
}

/// Builder for [`IdentityCacheService`].
///
/// Starts with the two standard key providers registered; additional
/// providers, eviction listeners, and the optional revalidation collaborator
/// are added here and fixed for the service's lifetime.
pub struct IdentityCacheServiceBuilder {
    providers: Vec<Arc<dyn CacheKeyProvider>>,
    listeners: Vec<Arc<dyn EvictionListener>>,
    validator: Option<Arc<dyn CredentialValidator>>,
}

impl IdentityCacheServiceBuilder {
    /// Registers an additional key-derivation strategy.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn CacheKeyProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Registers an eviction observer.
    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn EvictionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Sets the revalidation collaborator consulted on every lookup hit.
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn CredentialValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Builds the (inactive) service.
    pub fn build(self) -> IdentityCacheService {
        IdentityCacheService {
            providers: self.providers,
            listeners: Arc::from(self.listeners),
            validator: self.validator,
            state: RwLock::new(None),
        }
    }
}
