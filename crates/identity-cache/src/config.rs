//! Cache configuration.
//!
//! [`CacheConfig`] carries the four tunables of the identity cache:
//! an initial table size hint, the hard entry limit, the staleness timeout,
//! and the basic-auth lookup policy gate. Configuration arrives either
//! programmatically via the builder or as a flat key→value map from a
//! management interface (see [`CacheConfig::from_map`]); loading that map
//! from a file is out of scope here.
//!
//! There is no process-wide configuration holder: a `CacheConfig` value is
//! passed explicitly to [`activate`](crate::service::IdentityCacheService::activate)
//! and [`reconfigure`](crate::service::IdentityCacheService::reconfigure).

use std::{collections::HashMap, time::Duration};

use crate::error::CacheError;

/// Default initial size hint for the key tables.
pub const DEFAULT_INITIAL_SIZE_HINT: usize = 50;

/// Default hard entry limit.
pub const DEFAULT_ENTRY_LIMIT: usize = 25_000;

/// Default staleness timeout (10 minutes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Entry-limit sentinel meaning "unbounded" (alongside `0`).
///
/// Both `0` and `usize::MAX` disable capacity eviction entirely;
/// [`GenerationalStore::is_eviction_required`](crate::store::GenerationalStore::is_eviction_required)
/// always returns `false` at these sentinels.
pub const UNBOUNDED: usize = usize::MAX;

// Flat-map keys accepted by `from_map`.
const KEY_INITIAL_SIZE_HINT: &str = "initialSizeHint";
const KEY_ENTRY_LIMIT: &str = "entryLimit";
const KEY_TIMEOUT_MILLIS: &str = "timeoutMillis";
const KEY_ALLOW_BASIC_AUTH_LOOKUP: &str = "allowBasicAuthLookup";

/// Configuration for one generation of the identity cache.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use identity_cache::config::CacheConfig;
///
/// let config = CacheConfig::builder()
///     .entry_limit(10_000)
///     .timeout(Duration::from_secs(300))
///     .allow_basic_auth_lookup(false)
///     .build();
/// assert_eq!(config.entry_limit(), 10_000);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    initial_size_hint: usize,
    entry_limit: usize,
    timeout: Duration,
    allow_basic_auth_lookup: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CacheConfig {
    /// Returns a builder initialized with the default values.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder {
            initial_size_hint: DEFAULT_INITIAL_SIZE_HINT,
            entry_limit: DEFAULT_ENTRY_LIMIT,
            timeout: DEFAULT_TIMEOUT,
            allow_basic_auth_lookup: true,
        }
    }

    /// Parses a configuration from a flat key→value map.
    ///
    /// Recognized keys: `initialSizeHint`, `entryLimit`, `timeoutMillis`,
    /// `allowBasicAuthLookup`. Absent keys fall back to defaults; unknown
    /// keys are ignored (management interfaces routinely pass through
    /// properties intended for other components).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidConfig`] if a recognized key's value
    /// cannot be parsed. A failed parse never corrupts a previously active
    /// configuration — the error is surfaced before any store is touched.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, CacheError> {
        let mut builder = Self::builder();

        if let Some(raw) = map.get(KEY_INITIAL_SIZE_HINT) {
            builder = builder.initial_size_hint(parse_usize(KEY_INITIAL_SIZE_HINT, raw)?);
        }
        if let Some(raw) = map.get(KEY_ENTRY_LIMIT) {
            builder = builder.entry_limit(parse_usize(KEY_ENTRY_LIMIT, raw)?);
        }
        if let Some(raw) = map.get(KEY_TIMEOUT_MILLIS) {
            let millis = raw.trim().parse::<u64>().map_err(|e| {
                CacheError::invalid_config(KEY_TIMEOUT_MILLIS, format!("'{raw}': {e}"))
            })?;
            builder = builder.timeout(Duration::from_millis(millis));
        }
        if let Some(raw) = map.get(KEY_ALLOW_BASIC_AUTH_LOOKUP) {
            let allow = raw.trim().parse::<bool>().map_err(|_| {
                CacheError::invalid_config(
                    KEY_ALLOW_BASIC_AUTH_LOOKUP,
                    format!("'{raw}' is not a boolean"),
                )
            })?;
            builder = builder.allow_basic_auth_lookup(allow);
        }

        Ok(builder.build())
    }

    /// Initial size hint for the key tables.
    pub fn initial_size_hint(&self) -> usize {
        self.initial_size_hint
    }

    /// Hard capacity bound. `0` and [`UNBOUNDED`] both mean unbounded.
    pub fn entry_limit(&self) -> usize {
        self.entry_limit
    }

    /// Staleness timeout. `Duration::ZERO` disables periodic sweeping.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sweep period derived from the timeout.
    ///
    /// An entry must survive untouched across two consecutive sweep
    /// intervals before staleness eviction, so each interval is half the
    /// configured timeout. Returns `Duration::ZERO` when sweeping is
    /// disabled.
    pub fn sweep_interval(&self) -> Duration {
        self.timeout / 2
    }

    /// Whether password-credential keys are honored on lookup.
    pub fn allow_basic_auth_lookup(&self) -> bool {
        self.allow_basic_auth_lookup
    }
}

fn parse_usize(key: &'static str, raw: &str) -> Result<usize, CacheError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| CacheError::invalid_config(key, format!("'{raw}': {e}")))
}

/// Builder for [`CacheConfig`].
#[derive(Clone, Debug)]
pub struct CacheConfigBuilder {
    initial_size_hint: usize,
    entry_limit: usize,
    timeout: Duration,
    allow_basic_auth_lookup: bool,
}

impl CacheConfigBuilder {
    /// Sets the initial size hint for the key tables.
    #[must_use]
    pub fn initial_size_hint(mut self, hint: usize) -> Self {
        self.initial_size_hint = hint;
        self
    }

    /// Sets the hard entry limit. `0` and [`UNBOUNDED`] disable capacity
    /// eviction.
    #[must_use]
    pub fn entry_limit(mut self, limit: usize) -> Self {
        self.entry_limit = limit;
        self
    }

    /// Sets the staleness timeout. `Duration::ZERO` disables periodic
    /// sweeping; capacity eviction stays active.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets whether password-credential keys are honored on lookup.
    #[must_use]
    pub fn allow_basic_auth_lookup(mut self, allow: bool) -> Self {
        self.allow_basic_auth_lookup = allow;
        self
    }

    /// Builds the [`CacheConfig`].
    pub fn build(self) -> CacheConfig {
        CacheConfig {
            initial_size_hint: self.initial_size_hint,
            entry_limit: self.entry_limit,
            timeout: self.timeout,
            allow_basic_auth_lookup: self.allow_basic_auth_lookup,
        }
    }
}
