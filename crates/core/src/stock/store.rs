//! Storage seam for the stock ledger.
//!
//! A [`StockStore`] opens units of work; a [`StockUnitOfWork`] is one atomic
//! transaction spanning movement and balance reads and writes. Dropping a unit
//! of work without committing discards its writes.

use async_trait::async_trait;
use chrono::NaiveDate;
use stockbook_shared::types::{StockBalanceId, StockMovementId};

use super::error::StockError;
use super::types::{Balance, Movement, Reference, StockScope};

/// Opens units of work against the movement ledger and balance snapshot store.
#[async_trait]
pub trait StockStore: Send + Sync + 'static {
    /// The transaction type of this store.
    type UnitOfWork: StockUnitOfWork;

    /// Begins a new unit of work.
    async fn begin(&self) -> Result<Self::UnitOfWork, StockError>;
}

/// One atomic transaction over movements and balances.
#[async_trait]
pub trait StockUnitOfWork: Send {
    /// Inserts a movement.
    async fn insert_movement(&mut self, movement: &Movement) -> Result<(), StockError>;

    /// Replaces a stored movement with the same id.
    async fn update_movement(&mut self, movement: &Movement) -> Result<(), StockError>;

    /// Deletes a movement.
    async fn delete_movement(&mut self, id: StockMovementId) -> Result<(), StockError>;

    /// Movements of a document, ordered by date ascending.
    async fn movements_by_reference(
        &mut self,
        reference: &Reference,
    ) -> Result<Vec<Movement>, StockError>;

    /// Movements dated `day` within `scope`.
    async fn movements_on(
        &mut self,
        day: NaiveDate,
        scope: StockScope,
    ) -> Result<Vec<Movement>, StockError>;

    /// Balance rows for `day` within `scope`.
    async fn balances_on(
        &mut self,
        day: NaiveDate,
        scope: StockScope,
    ) -> Result<Vec<Balance>, StockError>;

    /// For each pair within `scope`, its latest balance row strictly before `day`.
    async fn latest_balances_before(
        &mut self,
        day: NaiveDate,
        scope: StockScope,
    ) -> Result<Vec<Balance>, StockError>;

    /// Inserts or replaces the row keyed by (facility, product, day).
    ///
    /// An existing row keeps its identity.
    async fn upsert_balance(&mut self, balance: &Balance) -> Result<(), StockError>;

    /// Deletes a balance row.
    async fn delete_balance(&mut self, id: StockBalanceId) -> Result<(), StockError>;

    /// Earliest day `>= from` holding a movement or a balance row within `scope`.
    async fn next_active_day(
        &mut self,
        from: NaiveDate,
        scope: StockScope,
    ) -> Result<Option<NaiveDate>, StockError>;

    /// Most recent day that has any balance row.
    async fn latest_balance_day(&mut self) -> Result<Option<NaiveDate>, StockError>;

    /// Makes all writes of this unit of work durable.
    async fn commit(self) -> Result<(), StockError>;

    /// Discards all writes of this unit of work.
    async fn rollback(self) -> Result<(), StockError>;
}
