//! Replay and lockout cache
//!
//! Two advisory locks sit on one shared [`LockStore`]:
//! - **message dedupe** (`transaction/<hash>`): claimed before validation and
//!   never released; entries age out after the dedupe TTL, which is longer
//!   than a blockhash stays valid, so an expired message can no longer land.
//! - **source lockout** (`transfer/<source>`): claimed just before co-signing
//!   and held as a [`SourceLock`] until the relay reaches a terminal state.
//!
//! # RAII contract
//!
//! A [`SourceLock`] is released exactly once: explicitly via
//! [`SourceLock::release`], or on drop if the owning task is cancelled. Drop
//! cannot await, so it hands the release to the current tokio runtime; with no
//! runtime the entry is left to expire after the lock TTL.

use super::errors::RelayError;
use crate::metrics::metrics;
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shared key-value store with an atomic claim-if-absent
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Set `key` unless a live entry exists; returns whether this call claimed it
    ///
    /// Must be a single atomic operation: two concurrent claims of the same
    /// key never both succeed.
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool, RelayError>;

    async fn release(&self, key: &str) -> Result<(), RelayError>;

    /// Drop expired entries, returning how many were removed
    async fn purge_expired(&self) -> Result<usize, RelayError>;
}

/// Single-instance store backed by a concurrent map
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    entries: DashMap<String, Instant>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|expiry| *expiry > Instant::now())
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool, RelayError> {
        let now = Instant::now();
        // The entry guard holds the shard lock, so check and set cannot interleave
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    return Ok(false);
                }
                entry.insert(now + ttl);
                Ok(true)
            }
            Entry::Vacant(entry) => {
                entry.insert(now + ttl);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str) -> Result<(), RelayError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, RelayError> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, expiry| *expiry > now);
        Ok(before.saturating_sub(self.entries.len()))
    }
}

pub fn dedupe_key(message_hash: &str) -> String {
    format!("transaction/{}", message_hash)
}

pub fn lock_key(source: &Pubkey) -> String {
    format!("transfer/{}", source)
}

/// Dedupe and lockout operations over a shared store
#[derive(Clone)]
pub struct RelayCache {
    store: Arc<dyn LockStore>,
    dedupe_ttl: Duration,
    lock_ttl: Duration,
}

impl RelayCache {
    pub fn new(store: Arc<dyn LockStore>, dedupe_ttl: Duration, lock_ttl: Duration) -> Self {
        Self {
            store,
            dedupe_ttl,
            lock_ttl,
        }
    }

    /// Record a message hash; a second claim is `DuplicateTransaction`
    pub async fn claim_message(&self, message_hash: &str) -> Result<(), RelayError> {
        if self
            .store
            .claim(&dedupe_key(message_hash), self.dedupe_ttl)
            .await?
        {
            Ok(())
        } else {
            Err(RelayError::DuplicateTransaction)
        }
    }

    /// Lock a fee-paying source account; a held lock is `DuplicateTransfer`
    pub async fn lock_source(&self, source: &Pubkey) -> Result<SourceLock, RelayError> {
        let key = lock_key(source);
        if !self.store.claim(&key, self.lock_ttl).await? {
            return Err(RelayError::DuplicateTransfer);
        }
        metrics().source_locks_held.inc();
        debug!(source = %source, "Source account locked");
        Ok(SourceLock {
            store: Arc::clone(&self.store),
            key,
            source: *source,
            acquired_at: Instant::now(),
            released: false,
        })
    }

    /// Periodically purge expired entries until the task is aborted
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => debug!(purged, "Purged expired cache entries"),
                    Err(e) => warn!(error = %e, "Cache sweep failed"),
                }
            }
        })
    }
}

/// Held lock on a source account
pub struct SourceLock {
    store: Arc<dyn LockStore>,
    key: String,
    source: Pubkey,
    acquired_at: Instant,
    released: bool,
}

impl SourceLock {
    pub fn source(&self) -> &Pubkey {
        &self.source
    }

    pub async fn release(mut self) -> Result<(), RelayError> {
        self.released = true;
        metrics().source_locks_held.dec();
        let result = self.store.release(&self.key).await;
        info!(
            source = %self.source,
            held_for_ms = self.acquired_at.elapsed().as_millis() as u64,
            "Source account unlocked"
        );
        result
    }
}

impl Drop for SourceLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let m = metrics();
        m.source_locks_held.dec();
        m.source_locks_dropped_auto.inc();

        let held_for_ms = self.acquired_at.elapsed().as_millis() as u64;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = Arc::clone(&self.store);
                let key = std::mem::take(&mut self.key);
                let source = self.source;
                handle.spawn(async move {
                    if let Err(e) = store.release(&key).await {
                        warn!(source = %source, error = %e, "Failed to release dropped source lock");
                    }
                });
                warn!(
                    source = %self.source,
                    held_for_ms,
                    release_type = "auto_drop",
                    "Source lock released on drop"
                );
            }
            Err(_) => {
                warn!(
                    source = %self.source,
                    held_for_ms,
                    "Source lock dropped outside a runtime, entry will expire"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(store: Arc<MemoryLockStore>) -> RelayCache {
        RelayCache::new(store, Duration::from_secs(120), Duration::from_secs(120))
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_until_expiry() {
        let store = MemoryLockStore::new();
        assert!(store.claim("k", Duration::from_millis(20)).await.unwrap());
        assert!(!store.claim("k", Duration::from_millis(20)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.claim("k", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryLockStore::new();
        store.claim("short", Duration::from_millis(5)).await.unwrap();
        store.claim("long", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.contains("long"));
        assert!(!store.contains("short"));
    }

    #[tokio::test]
    async fn test_message_dedupe() {
        let cache = cache(Arc::new(MemoryLockStore::new()));
        cache.claim_message("abc").await.unwrap();
        assert!(matches!(
            cache.claim_message("abc").await,
            Err(RelayError::DuplicateTransaction)
        ));
        cache.claim_message("abd").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_single_winner() {
        let cache = cache(Arc::new(MemoryLockStore::new()));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.claim_message("same").await.is_ok() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_source_lock_explicit_release() {
        let store = Arc::new(MemoryLockStore::new());
        let cache = cache(Arc::clone(&store));
        let source = Pubkey::new_unique();

        let lock = cache.lock_source(&source).await.unwrap();
        assert_eq!(lock.source(), &source);
        assert!(matches!(
            cache.lock_source(&source).await,
            Err(RelayError::DuplicateTransfer)
        ));

        lock.release().await.unwrap();
        assert!(store.is_empty());
        cache.lock_source(&source).await.unwrap().release().await.unwrap();
    }

    #[tokio::test]
    async fn test_source_lock_released_on_drop() {
        let store = Arc::new(MemoryLockStore::new());
        let cache = cache(Arc::clone(&store));
        let source = Pubkey::new_unique();

        {
            let _lock = cache.lock_source(&source).await.unwrap();
            assert!(store.contains(&lock_key(&source)));
        }
        // Let the spawned release run
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!store.contains(&lock_key(&source)));
    }

    #[tokio::test]
    async fn test_sweeper_purges() {
        let store = Arc::new(MemoryLockStore::new());
        let cache = RelayCache::new(
            Arc::clone(&store) as Arc<dyn LockStore>,
            Duration::from_millis(5),
            Duration::from_millis(5),
        );
        cache.claim_message("old").await.unwrap();

        let sweeper = cache.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        sweeper.abort();
        assert!(store.is_empty());
    }
}
