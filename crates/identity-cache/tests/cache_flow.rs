//! End-to-end identity cache flow tests.
//!
//! Exercises the public service surface the way an authentication front end
//! would: activate from raw configuration, populate on successful logins,
//! serve repeat requests from the cache, and observe capacity eviction
//! through a registered listener.
#![allow(clippy::expect_used, clippy::panic, clippy::unwrap_used)]

use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;

use identity_cache::{
    testutil::{small_config, test_identity},
    CacheConfig, CacheKey, EvictionListener, Identity, IdentityCacheService,
};

#[derive(Default)]
struct RecordingListener {
    batches: Mutex<Vec<Vec<Arc<Identity>>>>,
}

impl RecordingListener {
    fn evicted_principals(&self) -> Vec<String> {
        let mut principals: Vec<String> = self
            .batches
            .lock()
            .iter()
            .flatten()
            .map(|identity| identity.principal.clone())
            .collect();
        principals.sort();
        principals
    }
}

impl EvictionListener for RecordingListener {
    fn on_evicted(&self, evicted: Vec<Arc<Identity>>) {
        self.batches.lock().push(evicted);
    }
}

fn token_key(principal: &str) -> CacheKey {
    CacheKey::token(format!("{principal}-token").as_bytes())
}

#[tokio::test]
async fn test_login_then_repeat_requests_hit_cache() {
    let service = IdentityCacheService::builder().build();

    let mut raw = HashMap::new();
    raw.insert("entryLimit".to_owned(), "100".to_owned());
    raw.insert("timeoutMillis".to_owned(), "0".to_owned());
    service.activate(CacheConfig::from_map(&raw).unwrap()).unwrap();

    // Primary authentication succeeded; populate under both aliases.
    let alice = test_identity("alice");
    service.insert_with_password(alice.clone(), "alice", "secret");

    // Subsequent basic-auth and token requests resolve without the registry.
    let by_password = CacheKey::basic("TestRealm", "alice", "secret");
    assert_eq!(service.lookup(Some(&by_password)).await.as_deref(), Some(&alice));
    assert_eq!(service.lookup(Some(&token_key("alice"))).await.as_deref(), Some(&alice));

    // A wrong password derives a different key and misses.
    let wrong = CacheKey::basic("TestRealm", "alice", "wrong");
    assert!(service.lookup(Some(&wrong)).await.is_none());

    // Logout through one alias invalidates the other.
    service.remove(Some(&by_password));
    assert!(service.lookup(Some(&token_key("alice"))).await.is_none());

    service.deactivate().await;
}

#[tokio::test]
async fn test_capacity_pressure_evicts_cold_entries_in_batches() {
    let listener = Arc::new(RecordingListener::default());
    let service = IdentityCacheService::builder().listener(listener.clone()).build();
    service.activate(small_config(1)).unwrap();

    for principal in ["a", "b", "c", "d"] {
        service.insert(test_identity(principal));
    }

    // Cold entries age out in batches; the most recent inserts survive.
    assert_eq!(listener.evicted_principals(), vec!["a".to_owned(), "b".to_owned()]);
    assert!(service.lookup(Some(&token_key("c"))).await.is_some());
    assert!(service.lookup(Some(&token_key("d"))).await.is_some());

    service.deactivate().await;
}

#[tokio::test]
async fn test_recently_used_entries_survive_capacity_pressure() {
    let listener = Arc::new(RecordingListener::default());
    let service = IdentityCacheService::builder().listener(listener.clone()).build();
    service.activate(small_config(2)).unwrap();

    service.insert(test_identity("hot"));
    service.insert(test_identity("cold-1"));
    service.insert(test_identity("cold-2"));

    // Touch "hot" so it is promoted out of the aging generation.
    assert!(service.lookup(Some(&token_key("hot"))).await.is_some());

    for n in 0..4 {
        service.insert(test_identity(&format!("filler-{n}")));
    }

    assert!(service.lookup(Some(&token_key("hot"))).await.is_some());
    assert!(listener
        .evicted_principals()
        .iter()
        .all(|principal| principal != "hot"));

    service.deactivate().await;
}

#[tokio::test]
async fn test_background_sweep_expires_idle_entries() {
    let listener = Arc::new(RecordingListener::default());
    let service = IdentityCacheService::builder().listener(listener.clone()).build();
    let config = CacheConfig::builder().timeout(Duration::from_millis(100)).build();
    service.activate(config).unwrap();

    service.insert(test_identity("idle"));
    assert_eq!(service.entry_count(), 1);

    // Two sweep intervals beyond the full timeout.
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(service.lookup(Some(&token_key("idle"))).await.is_none());
    assert_eq!(service.entry_count(), 0);
    assert_eq!(listener.evicted_principals(), vec!["idle".to_owned()]);

    service.deactivate().await;
}

#[tokio::test]
async fn test_reconfigure_swaps_limits_without_old_state() {
    let service = IdentityCacheService::builder().build();
    service.activate(small_config(1)).unwrap();
    service.insert(test_identity("before"));

    service.reconfigure(small_config(100)).await.unwrap();
    assert!(service.lookup(Some(&token_key("before"))).await.is_none());

    // The new limit applies: many entries coexist without eviction.
    for n in 0..20 {
        service.insert(test_identity(&format!("after-{n}")));
    }
    assert_eq!(service.entry_count(), 20);

    service.deactivate().await;
}
