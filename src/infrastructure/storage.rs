//! In-process stores.
//!
//! Provides concurrent, sharded storage for duplicate records, challenge
//! counters and issued captchas.

use crate::application::ports::{ChallengeStore, DuplicateStore};
use crate::domain::challenge::{ChallengeKey, ChallengeState};
use crate::domain::fingerprint::Fingerprint;
use crate::error::StoreError;
use ahash::RandomState;
use dashmap::DashMap;
use std::borrow::Borrow;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Thread-safe sharded storage backed by DashMap.
///
/// Each key operation locks only the shard holding the key, so
/// check-and-set on one key is atomic without serializing unrelated keys.
#[derive(Debug)]
pub struct ShardedStorage<K, V>
where
    K: Eq + Hash,
{
    map: DashMap<K, V, RandomState>,
}

impl<K, V> ShardedStorage<K, V>
where
    K: Eq + Hash,
{
    /// Create a new sharded storage instance.
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Insert or replace a value.
    pub fn insert(&self, key: K, value: V) {
        self.map.insert(key, value);
    }

    /// Run `accessor` on the value for `key` while holding its shard lock,
    /// inserting `factory()` first if the key is absent.
    pub fn with_entry_mut<R>(
        &self,
        key: K,
        factory: impl FnOnce() -> V,
        accessor: impl FnOnce(&mut V) -> R,
    ) -> R {
        let mut value = self.map.entry(key).or_insert_with(factory);
        accessor(&mut value)
    }

    /// Read the value for `key` under its shard lock.
    pub fn read<Q, R>(&self, key: &Q, f: impl FnOnce(&V) -> R) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key).map(|value| f(&value))
    }

    /// Check if a key exists.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Remove a key and return its value.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.remove(key).map(|(_, value)| value)
    }

    /// Remove a key only if `predicate` holds for its value.
    pub fn remove_if<Q>(&self, key: &Q, predicate: impl FnOnce(&V) -> bool) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map
            .remove_if(key, |_, value| predicate(value))
            .map(|(_, value)| value)
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the storage is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.map.clear();
    }

    /// Drop every entry for which `expired` holds, returning how many were
    /// removed.
    pub fn purge(&self, mut expired: impl FnMut(&V) -> bool) -> usize {
        let mut removed = 0;
        self.map.retain(|_, value| {
            let keep = !expired(value);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}

impl<K, V> Default for ShardedStorage<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

/// In-process record of an admitted fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateRecord {
    expires_at: Instant,
}

impl DuplicateRecord {
    pub fn new(now: Instant, window: Duration) -> Self {
        Self {
            expires_at: now + window,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

/// DashMap-backed duplicate store.
pub type InMemoryDuplicateStore = ShardedStorage<Fingerprint, DuplicateRecord>;

/// DashMap-backed challenge counter store.
pub type InMemoryChallengeStore = ShardedStorage<ChallengeKey, ChallengeState>;

impl DuplicateStore for ShardedStorage<Fingerprint, DuplicateRecord> {
    fn try_insert(
        &self,
        fingerprint: &Fingerprint,
        now: Instant,
        window: Duration,
    ) -> Result<bool, StoreError> {
        let mut created = false;
        let admitted = self.with_entry_mut(
            *fingerprint,
            || {
                created = true;
                DuplicateRecord::new(now, window)
            },
            |record| {
                if record.is_expired(now) {
                    *record = DuplicateRecord::new(now, window);
                    true
                } else {
                    false
                }
            },
        );
        Ok(created || admitted)
    }

    fn remove(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        ShardedStorage::remove(self, fingerprint);
        Ok(())
    }

    fn purge_expired(&self, now: Instant) -> usize {
        self.purge(|record| record.is_expired(now))
    }
}

impl ChallengeStore for ShardedStorage<ChallengeKey, ChallengeState> {
    fn attempts(&self, key: &ChallengeKey, now: Instant) -> Result<u32, StoreError> {
        match self.read(key, |state| (state.attempts(now), state.is_expired(now))) {
            Some((attempts, false)) => Ok(attempts),
            Some((_, true)) => {
                // Elapsed windows are dropped on read
                self.remove_if(key, |state| state.is_expired(now));
                Ok(0)
            }
            None => Ok(0),
        }
    }

    fn increment(
        &self,
        key: &ChallengeKey,
        now: Instant,
        window: Duration,
    ) -> Result<u32, StoreError> {
        Ok(self.with_entry_mut(
            key.clone(),
            || ChallengeState::open(now, window),
            |state| state.record(now, window),
        ))
    }

    fn reset(&self, key: &ChallengeKey) -> Result<(), StoreError> {
        ShardedStorage::remove(self, key);
        Ok(())
    }

    fn purge_expired(&self, now: Instant) -> usize {
        self.purge(|state| state.is_expired(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::ActionKind;
    use crate::domain::actor::UserId;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_basic_operations() {
        let storage: ShardedStorage<String, i32> = ShardedStorage::new();

        storage.with_entry_mut("key1".to_string(), || 42, |_| ());
        assert_eq!(storage.len(), 1);
        assert!(storage.contains_key("key1"));
        assert_eq!(storage.read("key1", |v| *v), Some(42));

        assert_eq!(storage.remove("key1"), Some(42));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_with_entry_mut_updates_in_place() {
        let storage: ShardedStorage<&str, u32> = ShardedStorage::new();
        for _ in 0..3 {
            storage.with_entry_mut("k", || 0, |v| *v += 1);
        }
        assert_eq!(storage.read("k", |v| *v), Some(3));
    }

    #[test]
    fn test_remove_if() {
        let storage: ShardedStorage<&str, u32> = ShardedStorage::new();
        storage.with_entry_mut("k", || 5, |_| ());
        assert_eq!(storage.remove_if("k", |v| *v > 10), None);
        assert_eq!(storage.remove_if("k", |v| *v == 5), Some(5));
    }

    #[test]
    fn test_purge_counts_removed() {
        let storage: ShardedStorage<u32, u32> = ShardedStorage::new();
        for i in 0..10 {
            storage.with_entry_mut(i, || i, |_| ());
        }
        assert_eq!(storage.purge(|v| v % 2 == 0), 5);
        assert_eq!(storage.len(), 5);
    }

    #[test]
    fn test_duplicate_store_admits_once() {
        let store = InMemoryDuplicateStore::new();
        let fp = Fingerprint::simple(&UserId::from("1"), "answer.add");
        let now = Instant::now();
        let window = Duration::from_secs(2);

        assert_eq!(store.try_insert(&fp, now, window), Ok(true));
        assert_eq!(store.try_insert(&fp, now, window), Ok(false));
        assert_eq!(store.try_insert(&fp, now + window, window), Ok(true));
    }

    #[test]
    fn test_duplicate_store_concurrent_admission() {
        let store = Arc::new(InMemoryDuplicateStore::new());
        let fp = Fingerprint::simple(&UserId::from("1"), "answer.add");
        let now = Instant::now();
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.try_insert(&fp, now, Duration::from_secs(2)).unwrap()
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_challenge_store_counts_and_resets() {
        let store = InMemoryChallengeStore::new();
        let key = ChallengeKey::new(&UserId::from("1"), ActionKind::Answer);
        let now = Instant::now();
        let window = Duration::from_secs(60);

        assert_eq!(store.attempts(&key, now), Ok(0));
        assert_eq!(store.increment(&key, now, window), Ok(1));
        assert_eq!(store.increment(&key, now, window), Ok(2));
        store.reset(&key).unwrap();
        assert_eq!(store.attempts(&key, now), Ok(0));
    }

    #[test]
    fn test_challenge_store_purges_elapsed_windows() {
        let store = InMemoryChallengeStore::new();
        let now = Instant::now();
        let window = Duration::from_secs(60);
        let old = ChallengeKey::new(&UserId::from("1"), ActionKind::Answer);
        let new = ChallengeKey::new(&UserId::from("2"), ActionKind::Answer);

        store.increment(&old, now, window).unwrap();
        store.increment(&new, now + Duration::from_secs(30), window).unwrap();

        assert_eq!(store.purge_expired(now + window), 1);
        assert_eq!(store.attempts(&new, now + window), Ok(1));
    }
}
