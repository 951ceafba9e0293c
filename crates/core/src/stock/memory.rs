//! In-memory stock store.
//!
//! Backs tests and single-process tooling. A unit of work holds the store
//! lock for its whole lifetime and mutates a private copy of the state, which
//! replaces the shared state on commit. Transactions are therefore serialized
//! and a dropped or failed unit of work leaves no trace.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use stockbook_shared::types::{StockBalanceId, StockMovementId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::error::StockError;
use super::store::{StockStore, StockUnitOfWork};
use super::types::{Balance, Movement, Reference, StockKey, StockScope};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    movements: HashMap<StockMovementId, Movement>,
    balances: BTreeMap<(StockKey, NaiveDate), Balance>,
    failing_day: Option<NaiveDate>,
}

/// In-memory store backed by `Arc<Mutex<..>>`.
///
/// Clone-friendly (cloning shares the same underlying storage).
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockStore {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryStockStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All movements ordered by (date, id).
    pub async fn movements(&self) -> Vec<Movement> {
        let state = self.state.lock().await;
        let mut movements: Vec<Movement> = state.movements.values().cloned().collect();
        movements.sort_by_key(|m| (m.date, m.id));
        movements
    }

    /// All balances ordered by (facility, product, day).
    pub async fn balances(&self) -> Vec<Balance> {
        self.state.lock().await.balances.values().cloned().collect()
    }

    /// Makes every balance write for `day` fail with a storage error.
    pub async fn fail_balance_writes_on(&self, day: NaiveDate) {
        self.state.lock().await.failing_day = Some(day);
    }

    /// Removes a failure installed by [`Self::fail_balance_writes_on`].
    pub async fn clear_failures(&self) {
        self.state.lock().await.failing_day = None;
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    type UnitOfWork = InMemoryUnitOfWork;

    async fn begin(&self) -> Result<Self::UnitOfWork, StockError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryUnitOfWork { guard, working })
    }
}

/// Unit of work of [`InMemoryStockStore`].
#[derive(Debug)]
pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
}

impl InMemoryUnitOfWork {
    fn check_writable(&self, day: NaiveDate) -> Result<(), StockError> {
        if self.working.failing_day == Some(day) {
            return Err(StockError::Storage(format!(
                "injected balance write failure on {day}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StockUnitOfWork for InMemoryUnitOfWork {
    async fn insert_movement(&mut self, movement: &Movement) -> Result<(), StockError> {
        self.working.movements.insert(movement.id, movement.clone());
        Ok(())
    }

    async fn update_movement(&mut self, movement: &Movement) -> Result<(), StockError> {
        match self.working.movements.get_mut(&movement.id) {
            Some(stored) => {
                *stored = movement.clone();
                Ok(())
            }
            None => Err(StockError::Storage(format!(
                "movement {} does not exist",
                movement.id
            ))),
        }
    }

    async fn delete_movement(&mut self, id: StockMovementId) -> Result<(), StockError> {
        self.working.movements.remove(&id);
        Ok(())
    }

    async fn movements_by_reference(
        &mut self,
        reference: &Reference,
    ) -> Result<Vec<Movement>, StockError> {
        let mut movements: Vec<Movement> = self
            .working
            .movements
            .values()
            .filter(|m| m.reference == *reference)
            .cloned()
            .collect();
        movements.sort_by_key(|m| (m.date, m.id));
        Ok(movements)
    }

    async fn movements_on(
        &mut self,
        day: NaiveDate,
        scope: StockScope,
    ) -> Result<Vec<Movement>, StockError> {
        let mut movements: Vec<Movement> = self
            .working
            .movements
            .values()
            .filter(|m| m.date == day && scope.contains(&m.key()))
            .cloned()
            .collect();
        movements.sort_by_key(|m| m.id);
        Ok(movements)
    }

    async fn balances_on(
        &mut self,
        day: NaiveDate,
        scope: StockScope,
    ) -> Result<Vec<Balance>, StockError> {
        Ok(self
            .working
            .balances
            .values()
            .filter(|b| b.day == day && scope.contains(&b.key()))
            .cloned()
            .collect())
    }

    async fn latest_balances_before(
        &mut self,
        day: NaiveDate,
        scope: StockScope,
    ) -> Result<Vec<Balance>, StockError> {
        // Ordered by (key, day): the last row seen per key wins.
        let mut latest: BTreeMap<StockKey, &Balance> = BTreeMap::new();
        for balance in self.working.balances.values() {
            if balance.day < day && scope.contains(&balance.key()) {
                latest.insert(balance.key(), balance);
            }
        }
        Ok(latest.into_values().cloned().collect())
    }

    async fn upsert_balance(&mut self, balance: &Balance) -> Result<(), StockError> {
        self.check_writable(balance.day)?;
        let slot = (balance.key(), balance.day);
        let id = self
            .working
            .balances
            .get(&slot)
            .map_or(balance.id, |existing| existing.id);
        self.working
            .balances
            .insert(slot, Balance { id, ..balance.clone() });
        Ok(())
    }

    async fn delete_balance(&mut self, id: StockBalanceId) -> Result<(), StockError> {
        self.working.balances.retain(|_, b| b.id != id);
        Ok(())
    }

    async fn next_active_day(
        &mut self,
        from: NaiveDate,
        scope: StockScope,
    ) -> Result<Option<NaiveDate>, StockError> {
        let movement_day = self
            .working
            .movements
            .values()
            .filter(|m| m.date >= from && scope.contains(&m.key()))
            .map(|m| m.date)
            .min();
        let balance_day = self
            .working
            .balances
            .values()
            .filter(|b| b.day >= from && scope.contains(&b.key()))
            .map(|b| b.day)
            .min();
        Ok(movement_day.into_iter().chain(balance_day).min())
    }

    async fn latest_balance_day(&mut self) -> Result<Option<NaiveDate>, StockError> {
        Ok(self.working.balances.values().map(|b| b.day).max())
    }

    async fn commit(mut self) -> Result<(), StockError> {
        *self.guard = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StockError> {
        Ok(())
    }
}
