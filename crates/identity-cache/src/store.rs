//! Concurrent key→entry store with generational eviction.
//!
//! [`GenerationalStore`] is the storage primitive of the identity cache: a
//! key→entry index where several independently derived keys resolve to one
//! [`CacheEntry`], with two eviction strategies layered on a single rotation
//! primitive.
//!
//! # Generations
//!
//! Entries live in one of two tables, `current` and `previous`. A rotation
//! evicts everything still resident in `previous` (notifying the eviction
//! listeners once with the whole batch), demotes `current` wholesale into
//! `previous`, and starts a fresh `current`. Touching an entry — inserting it
//! again or looking it up — promotes it back into `current`, so residence in
//! `previous` is exactly "untouched since the last rotation".
//!
//! - **Capacity eviction** runs a rotation synchronously inside `insert`
//!   whenever the distinct-entry count of `current` exceeds the configured
//!   limit. Eviction therefore lags by one generation: the table must fill
//!   past the limit once more before the previously demoted batch is
//!   discarded.
//! - **Staleness eviction** is the same rotation, invoked periodically by the
//!   [`EvictionScheduler`](crate::scheduler::EvictionScheduler). An entry must
//!   stay untouched across two consecutive sweep intervals (roughly the full
//!   configured timeout, each interval being half of it) before it is evicted.
//!
//! # Concurrency
//!
//! All table mutation is serialized under one `parking_lot::Mutex`; a rotation
//! is an atomic table replacement under that lock, never an in-place rewrite
//! observable mid-operation. Eviction listeners are notified only after the
//! lock is released.

use std::{
    collections::{HashMap, HashSet},
    mem,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use parking_lot::Mutex;

use crate::{config::CacheConfig, identity::Identity, key::CacheKey};

/// Observer notified when the store ages out a batch of entries.
///
/// Called once per eviction batch — a capacity-triggered generation swap or a
/// staleness sweep — with the evicted identity payloads, for external cleanup
/// such as invalidating dependent session state. Never called for explicit
/// [`remove`](GenerationalStore::remove) or [`clear`](GenerationalStore::clear):
/// callers distinguish "I removed this" from "the cache aged this out".
pub trait EvictionListener: Send + Sync {
    /// Receives one batch of evicted identities.
    fn on_evicted(&self, evicted: Vec<Arc<Identity>>);
}

/// One cached identity together with every key that currently resolves to it.
pub struct CacheEntry {
    /// Unique id, used to deduplicate alias keys during rotation.
    id: u64,
    value: Arc<Identity>,
    /// All keys bound to this entry. Every key lives in exactly one table at
    /// a time, and all of an entry's keys live in the same table.
    keys: Mutex<HashSet<CacheKey>>,
    /// Refreshed on insert and successful lookup, never by sweep inspection.
    last_touched: Mutex<Instant>,
    /// Rotation epoch at which the entry last entered `current`.
    generation: AtomicU64,
}

impl CacheEntry {
    fn new(id: u64, value: Arc<Identity>, epoch: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            value,
            keys: Mutex::new(HashSet::new()),
            last_touched: Mutex::new(Instant::now()),
            generation: AtomicU64::new(epoch),
        })
    }

    fn touch(&self, epoch: u64) {
        *self.last_touched.lock() = Instant::now();
        self.generation.store(epoch, Ordering::Relaxed);
    }

    /// The cached identity.
    pub fn value(&self) -> &Arc<Identity> {
        &self.value
    }

    /// When the entry was last inserted or successfully looked up.
    pub fn last_touched(&self) -> Instant {
        *self.last_touched.lock()
    }

    /// Rotation epoch at which the entry last entered the current table.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }
}

/// The two generation tables plus bookkeeping, guarded by one mutex.
struct Tables {
    current: HashMap<CacheKey, Arc<CacheEntry>>,
    previous: HashMap<CacheKey, Arc<CacheEntry>>,
    /// Distinct entries (not keys) resident in `current`.
    current_entries: usize,
    /// Distinct entries resident in `previous`.
    previous_entries: usize,
    /// Monotonic rotation counter.
    epoch: u64,
}

/// Concurrent key→entry table with capacity and staleness eviction.
pub struct GenerationalStore {
    tables: Mutex<Tables>,
    entry_limit: usize,
    initial_size_hint: usize,
    listeners: Arc<[Arc<dyn EvictionListener>]>,
    next_id: AtomicU64,
}

impl GenerationalStore {
    /// Creates a store sized and bounded per `config`.
    pub fn new(config: &CacheConfig, listeners: Arc<[Arc<dyn EvictionListener>]>) -> Self {
        let hint = config.initial_size_hint();
        Self {
            tables: Mutex::new(Tables {
                current: HashMap::with_capacity(hint),
                previous: HashMap::new(),
                current_entries: 0,
                previous_entries: 0,
                epoch: 0,
            }),
            entry_limit: config.entry_limit(),
            initial_size_hint: hint,
            listeners,
            next_id: AtomicU64::new(0),
        }
    }

    /// Inserts an identity under the given keys, all resolving to one entry.
    ///
    /// If an entry holding the same identity already exists — whether or not
    /// any incoming key currently resolves to it — that entry is refreshed
    /// instead: it is promoted into `current`, the new keys are added as
    /// aliases, and `last_touched` is updated. A key
    /// owned by a *different* entry is rebound; an entry that loses its last
    /// key this way is dropped silently (replaced, not aged out).
    ///
    /// An empty key set is a no-op — an entry without keys would be
    /// unreachable.
    ///
    /// Runs the capacity check afterwards and performs at most one generation
    /// swap; the eviction listeners observe the discarded batch after the
    /// store lock is released.
    pub fn insert(&self, value: Arc<Identity>, keys: Vec<CacheKey>) {
        if keys.is_empty() {
            tracing::debug!("insert skipped: no keys derived");
            return;
        }

        let victims = {
            let mut t = self.tables.lock();

            // Refresh an existing entry for the same identity. Fast path:
            // one of the incoming keys already resolves to it. Otherwise the
            // new keys are all disjoint from the entry's current aliases and
            // it has to be found by value.
            let existing = keys
                .iter()
                .find_map(|k| {
                    t.current
                        .get(k)
                        .or_else(|| t.previous.get(k))
                        .filter(|e| e.value().as_ref() == value.as_ref())
                        .cloned()
                })
                .or_else(|| {
                    t.current
                        .values()
                        .chain(t.previous.values())
                        .find(|e| e.value().as_ref() == value.as_ref())
                        .cloned()
                });

            let entry = match existing {
                Some(entry) => {
                    promote(&mut t, &entry);
                    entry
                },
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let entry = CacheEntry::new(id, value, t.epoch);
                    t.current_entries += 1;
                    entry
                },
            };

            for key in keys {
                bind_key(&mut t, &entry, key);
            }
            entry.touch(t.epoch);

            if self.eviction_required(&t) { self.rotate(&mut t) } else { Vec::new() }
        };

        self.notify(victims);
    }

    /// Looks up an identity by key, refreshing its survival window on hit.
    ///
    /// A hit in `previous` promotes the entry (all of its keys) back into
    /// `current`.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Identity>> {
        let mut t = self.tables.lock();

        if let Some(entry) = t.current.get(key).cloned() {
            entry.touch(t.epoch);
            return Some(entry.value().clone());
        }

        let entry = t.previous.get(key).cloned()?;
        promote(&mut t, &entry);
        entry.touch(t.epoch);
        Some(entry.value().clone())
    }

    /// Removes the entry resolved by `key` together with every alias key,
    /// from whichever table holds it, synchronously.
    ///
    /// Removal is a direct operation, not an eviction: the eviction listeners
    /// are not notified. Returns the removed identity, if any.
    pub fn remove(&self, key: &CacheKey) -> Option<Arc<Identity>> {
        let mut t = self.tables.lock();

        let (entry, in_current) = match t.current.get(key).cloned() {
            Some(e) => (e, true),
            None => (t.previous.get(key).cloned()?, false),
        };

        let keys: Vec<CacheKey> = entry.keys.lock().drain().collect();
        for k in &keys {
            if in_current {
                t.current.remove(k);
            } else {
                t.previous.remove(k);
            }
        }
        if in_current {
            t.current_entries -= 1;
        } else {
            t.previous_entries -= 1;
        }

        Some(entry.value().clone())
    }

    /// Clears every entry from both tables. No listener notification.
    pub fn clear(&self) {
        let mut t = self.tables.lock();
        t.current.clear();
        t.previous.clear();
        t.current_entries = 0;
        t.previous_entries = 0;
    }

    /// Evicts entries untouched since the last sweep and demotes the rest.
    ///
    /// Invoked periodically by the scheduler; also callable directly (tests,
    /// manual maintenance). Listeners observe the evicted batch after the
    /// store lock is released.
    pub fn sweep(&self) {
        let victims = {
            let mut t = self.tables.lock();
            self.rotate(&mut t)
        };
        if !victims.is_empty() {
            tracing::debug!(evicted = victims.len(), "staleness sweep evicted entries");
        }
        self.notify(victims);
    }

    /// Whether the next insert will trigger a capacity generation swap.
    ///
    /// Always `false` at the unbounded sentinels (`0`, `usize::MAX`) and on
    /// an empty store; otherwise `true` exactly when the distinct-entry count
    /// of `current` exceeds the limit.
    pub fn is_eviction_required(&self) -> bool {
        self.eviction_required(&self.tables.lock())
    }

    /// Number of distinct live entries across both generations.
    pub fn entry_count(&self) -> usize {
        let t = self.tables.lock();
        t.current_entries + t.previous_entries
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    fn eviction_required(&self, t: &Tables) -> bool {
        if self.entry_limit == 0 || self.entry_limit == usize::MAX {
            return false;
        }
        if t.current_entries + t.previous_entries == 0 {
            return false;
        }
        t.current_entries > self.entry_limit
    }

    /// One generation swap. Caller holds the table lock; the returned victims
    /// are deduplicated entry values for listener notification outside it.
    fn rotate(&self, t: &mut Tables) -> Vec<Arc<Identity>> {
        t.epoch += 1;

        let discarded = mem::replace(
            &mut t.previous,
            mem::replace(&mut t.current, HashMap::with_capacity(self.initial_size_hint)),
        );
        t.previous_entries = t.current_entries;
        t.current_entries = 0;

        // Alias keys map to the same entry; dedupe by entry id.
        let mut seen = HashSet::new();
        let mut victims = Vec::new();
        for entry in discarded.into_values() {
            debug_assert!(entry.generation() < t.epoch, "promoted entry left in previous");
            if seen.insert(entry.id) {
                victims.push(entry.value().clone());
            }
        }
        victims
    }

    fn notify(&self, victims: Vec<Arc<Identity>>) {
        if victims.is_empty() {
            return;
        }
        for listener in self.listeners.iter() {
            listener.on_evicted(victims.clone());
        }
    }
}

/// Moves all of an entry's keys from `previous` into `current`.
///
/// No-op when the entry is already resident in `current`.
fn promote(t: &mut Tables, entry: &Arc<CacheEntry>) {
    let keys = entry.keys.lock();
    let mut moved = false;
    for k in keys.iter() {
        if t.previous.remove(k).is_some() {
            t.current.insert(k.clone(), entry.clone());
            moved = true;
        }
    }
    if moved {
        t.previous_entries -= 1;
        t.current_entries += 1;
    }
}

/// Binds `key` to `entry` in `current`, unbinding it from any other entry
/// first so that every key resolves to exactly one live entry.
fn bind_key(t: &mut Tables, entry: &Arc<CacheEntry>, key: CacheKey) {
    if entry.keys.lock().contains(&key) {
        // Already an alias of this entry; ensure it is indexed in current
        // (promotion has moved the rest of the keys there).
        t.current.insert(key, entry.clone());
        return;
    }

    for (table, is_current) in [(&mut t.current, true), (&mut t.previous, false)] {
        if let Some(other) = table.remove(&key) {
            let mut other_keys = other.keys.lock();
            other_keys.remove(&key);
            if other_keys.is_empty() {
                // The replaced entry lost its last key; it is unreachable
                // and dropped without listener notification.
                if is_current {
                    t.current_entries -= 1;
                } else {
                    t.previous_entries -= 1;
                }
            }
        }
    }

    entry.keys.lock().insert(key.clone());
    t.current.insert(key, entry.clone());
}
