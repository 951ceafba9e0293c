//! Per-scope serialization of recalculations.
//!
//! Two recalculations of the same (facility, product) pair must not
//! interleave. A single-pair scope holds the global lock shared and its pair
//! mutex exclusively, so different pairs proceed in parallel. Any wider scope
//! holds the global lock exclusively.
//!
//! Pair mutexes live only while someone holds or waits on them; the last
//! guard to release a pair drops its entry from the table.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use super::types::{StockKey, StockScope};

/// Lock table keyed by stock pair.
#[derive(Debug, Default)]
pub struct ScopeLocks {
    global: Arc<RwLock<()>>,
    pairs: Arc<PairTable>,
}

type PairTable = DashMap<StockKey, Arc<Mutex<()>>>;

/// Held while a scope is being written; releases on drop.
#[derive(Debug)]
pub enum ScopeGuard {
    /// One pair.
    Pair(PairGuard),
    /// Several pairs.
    Wide(OwnedRwLockWriteGuard<()>),
}

/// Exclusive hold on one pair plus a shared hold on the global lock.
#[derive(Debug)]
pub struct PairGuard {
    key: StockKey,
    pairs: Arc<PairTable>,
    held: Option<OwnedMutexGuard<()>>,
    _global: OwnedRwLockReadGuard<()>,
}

impl Drop for PairGuard {
    fn drop(&mut self) {
        drop(self.held.take());
        // Waiters clone the mutex before locking it, so a count of one means
        // only the table still refers to it.
        self.pairs
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl ScopeLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until `scope` can be written exclusively.
    pub async fn acquire(&self, scope: StockScope) -> ScopeGuard {
        match scope.as_pair() {
            Some(key) => {
                let global = Arc::clone(&self.global).read_owned().await;
                let pair = Arc::clone(self.pairs.entry(key).or_default().value());
                let held = pair.lock_owned().await;
                ScopeGuard::Pair(PairGuard {
                    key,
                    pairs: Arc::clone(&self.pairs),
                    held: Some(held),
                    _global: global,
                })
            }
            None => ScopeGuard::Wide(Arc::clone(&self.global).write_owned().await),
        }
    }

    /// Number of pairs currently held or waited on.
    #[must_use]
    pub fn tracked_pairs(&self) -> usize {
        self.pairs.len()
    }
}
