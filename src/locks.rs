//! Per-entity mutual exclusion.
//!
//! Keyed async mutexes: one domain keyed by game id for state transitions,
//! one keyed by user id for seed and balance mutations. Acquisition blocks up
//! to a configured bound (contention windows are sub-millisecond) and then
//! surfaces a retryable `LockTimeout`. Guards are RAII, so every exit path,
//! including error paths, releases the lock.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::errors::{EngineError, EngineResult};

/// Table of named async mutexes with bounded acquisition. Entries are
/// dropped when the last holder releases, so the table tracks live
/// contention instead of every key ever locked.
pub struct LockTable {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    timeout: Duration,
}

/// RAII guard for one table entry. Dropping it releases the mutex and then
/// removes the entry if no other task holds a handle to it.
#[derive(Debug)]
pub struct KeyedGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        // Release the mutex before inspecting the refcount, otherwise our
        // own guard keeps the entry pinned.
        self.guard.take();
        // strong_count == 1 means only the map itself holds the Arc: no
        // holder, no waiter. A waiter cloning under the same shard lock
        // raises the count and the removal is skipped.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl LockTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            timeout,
        }
    }

    /// Acquire the lock for `key`, waiting at most the configured timeout.
    pub async fn acquire(&self, key: &str) -> EngineResult<KeyedGuard> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .map_err(|_| EngineError::LockTimeout {
                key: key.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            })?;

        Ok(KeyedGuard {
            guard: Some(guard),
            key: key.to_string(),
            locks: self.locks.clone(),
        })
    }

    /// Number of keys currently held or contended.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// The two lock domains the engine uses. At most one in-flight mutating
/// action per game and per user.
pub struct ConcurrencyGuard {
    games: LockTable,
    users: LockTable,
}

impl ConcurrencyGuard {
    pub fn new(timeout: Duration) -> Self {
        Self {
            games: LockTable::new(timeout),
            users: LockTable::new(timeout),
        }
    }

    /// Serializes reveal/cash-out transitions for one game instance.
    pub async fn acquire_game(&self, game_id: &Uuid) -> EngineResult<KeyedGuard> {
        self.games.acquire(&format!("game:{}", game_id)).await
    }

    /// Serializes seed rotation, nonce draws and game creation for one user.
    pub async fn acquire_user(&self, user_id: &str) -> EngineResult<KeyedGuard> {
        self.users.acquire(&format!("user:{}", user_id)).await
    }
}
