//! Stock ledger repository on PostgreSQL.
//!
//! Implements the core `StockStore` seam with one `SeaORM` database
//! transaction per unit of work.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement, TransactionTrait,
};
use stockbook_core::stock::{
    Balance, Direction, DocumentKind, Movement, Reference, StockError, StockScope, StockStore,
    StockUnitOfWork,
};
use stockbook_shared::types::{
    DocumentId, FacilityId, ProductId, StockBalanceId, StockMovementId,
};
use tracing::error;

use crate::entities::{sea_orm_active_enums::StockDirection, stock_balances, stock_movements};

/// Latest balance row per pair strictly before a day, optionally filtered.
const LATEST_BALANCES_BEFORE_SQL: &str = r"
SELECT DISTINCT ON (facility_id, product_id) *
FROM stock_balances
WHERE day < $1
  AND ($2::uuid IS NULL OR facility_id = $2)
  AND ($3::uuid IS NULL OR product_id = $3)
ORDER BY facility_id, product_id, day DESC
";

/// `StockStore` backed by a `SeaORM` connection pool.
#[derive(Debug, Clone)]
pub struct SeaStockStore {
    db: DatabaseConnection,
}

impl SeaStockStore {
    /// Creates a new stock store.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StockStore for SeaStockStore {
    type UnitOfWork = SeaStockUnitOfWork;

    async fn begin(&self) -> Result<Self::UnitOfWork, StockError> {
        let txn = self.db.begin().await.map_err(storage_error)?;
        Ok(SeaStockUnitOfWork { txn })
    }
}

/// Unit of work wrapping one database transaction.
///
/// Dropping it without committing rolls the transaction back.
pub struct SeaStockUnitOfWork {
    txn: DatabaseTransaction,
}

#[async_trait]
impl StockUnitOfWork for SeaStockUnitOfWork {
    async fn insert_movement(&mut self, movement: &Movement) -> Result<(), StockError> {
        let now = Utc::now().into();
        let model = stock_movements::ActiveModel {
            created_at: Set(now),
            updated_at: Set(now),
            ..movement_active_model(movement)
        };

        stock_movements::Entity::insert(model)
            .exec_without_returning(&self.txn)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn update_movement(&mut self, movement: &Movement) -> Result<(), StockError> {
        let model = stock_movements::ActiveModel {
            updated_at: Set(Utc::now().into()),
            ..movement_active_model(movement)
        };

        stock_movements::Entity::update(model)
            .exec(&self.txn)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn delete_movement(&mut self, id: StockMovementId) -> Result<(), StockError> {
        stock_movements::Entity::delete_by_id(id.into_inner())
            .exec(&self.txn)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn movements_by_reference(
        &mut self,
        reference: &Reference,
    ) -> Result<Vec<Movement>, StockError> {
        stock_movements::Entity::find()
            .filter(stock_movements::Column::ReferenceId.eq(reference.id.into_inner()))
            .filter(stock_movements::Column::ReferenceType.eq(reference.kind.as_str()))
            .order_by_asc(stock_movements::Column::MovementDate)
            .order_by_asc(stock_movements::Column::Id)
            .all(&self.txn)
            .await
            .map_err(storage_error)?
            .into_iter()
            .map(movement_from_model)
            .collect()
    }

    async fn movements_on(
        &mut self,
        day: NaiveDate,
        scope: StockScope,
    ) -> Result<Vec<Movement>, StockError> {
        stock_movements::Entity::find()
            .filter(stock_movements::Column::MovementDate.eq(day))
            .filter(movement_scope(scope))
            .order_by_asc(stock_movements::Column::Id)
            .all(&self.txn)
            .await
            .map_err(storage_error)?
            .into_iter()
            .map(movement_from_model)
            .collect()
    }

    async fn balances_on(
        &mut self,
        day: NaiveDate,
        scope: StockScope,
    ) -> Result<Vec<Balance>, StockError> {
        let rows = stock_balances::Entity::find()
            .filter(stock_balances::Column::Day.eq(day))
            .filter(balance_scope(scope))
            .order_by_asc(stock_balances::Column::FacilityId)
            .order_by_asc(stock_balances::Column::ProductId)
            .all(&self.txn)
            .await
            .map_err(storage_error)?;

        Ok(rows.into_iter().map(balance_from_model).collect())
    }

    async fn latest_balances_before(
        &mut self,
        day: NaiveDate,
        scope: StockScope,
    ) -> Result<Vec<Balance>, StockError> {
        let rows = stock_balances::Entity::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DbBackend::Postgres,
                LATEST_BALANCES_BEFORE_SQL,
                [
                    day.into(),
                    scope.facility_id.map(FacilityId::into_inner).into(),
                    scope.product_id.map(ProductId::into_inner).into(),
                ],
            ))
            .all(&self.txn)
            .await
            .map_err(storage_error)?;

        Ok(rows.into_iter().map(balance_from_model).collect())
    }

    async fn upsert_balance(&mut self, balance: &Balance) -> Result<(), StockError> {
        let model = stock_balances::ActiveModel {
            id: Set(balance.id.into_inner()),
            facility_id: Set(balance.facility_id.into_inner()),
            product_id: Set(balance.product_id.into_inner()),
            day: Set(balance.day),
            start_balance: Set(balance.start),
            income_balance: Set(balance.income),
            outcome_balance: Set(balance.outcome),
            finish_balance: Set(balance.finish),
        };

        stock_balances::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    stock_balances::Column::FacilityId,
                    stock_balances::Column::ProductId,
                    stock_balances::Column::Day,
                ])
                .update_columns([
                    stock_balances::Column::StartBalance,
                    stock_balances::Column::IncomeBalance,
                    stock_balances::Column::OutcomeBalance,
                    stock_balances::Column::FinishBalance,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.txn)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn delete_balance(&mut self, id: StockBalanceId) -> Result<(), StockError> {
        stock_balances::Entity::delete_by_id(id.into_inner())
            .exec(&self.txn)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn next_active_day(
        &mut self,
        from: NaiveDate,
        scope: StockScope,
    ) -> Result<Option<NaiveDate>, StockError> {
        let next_movement: Option<Option<NaiveDate>> = stock_movements::Entity::find()
            .select_only()
            .column_as(stock_movements::Column::MovementDate.min(), "day")
            .filter(stock_movements::Column::MovementDate.gte(from))
            .filter(movement_scope(scope))
            .into_tuple()
            .one(&self.txn)
            .await
            .map_err(storage_error)?;

        let next_balance: Option<Option<NaiveDate>> = stock_balances::Entity::find()
            .select_only()
            .column_as(stock_balances::Column::Day.min(), "day")
            .filter(stock_balances::Column::Day.gte(from))
            .filter(balance_scope(scope))
            .into_tuple()
            .one(&self.txn)
            .await
            .map_err(storage_error)?;

        Ok(earliest(next_movement.flatten(), next_balance.flatten()))
    }

    async fn latest_balance_day(&mut self) -> Result<Option<NaiveDate>, StockError> {
        let latest: Option<Option<NaiveDate>> = stock_balances::Entity::find()
            .select_only()
            .column_as(stock_balances::Column::Day.max(), "day")
            .into_tuple()
            .one(&self.txn)
            .await
            .map_err(storage_error)?;

        Ok(latest.flatten())
    }

    async fn commit(self) -> Result<(), StockError> {
        self.txn.commit().await.map_err(storage_error)
    }

    async fn rollback(self) -> Result<(), StockError> {
        self.txn.rollback().await.map_err(storage_error)
    }
}

fn storage_error(err: DbErr) -> StockError {
    error!(error = %err, "Stock storage operation failed");
    StockError::Storage(err.to_string())
}

fn movement_scope(scope: StockScope) -> Condition {
    Condition::all()
        .add_option(
            scope
                .facility_id
                .map(|id| stock_movements::Column::FacilityId.eq(id.into_inner())),
        )
        .add_option(
            scope
                .product_id
                .map(|id| stock_movements::Column::ProductId.eq(id.into_inner())),
        )
}

fn balance_scope(scope: StockScope) -> Condition {
    Condition::all()
        .add_option(
            scope
                .facility_id
                .map(|id| stock_balances::Column::FacilityId.eq(id.into_inner())),
        )
        .add_option(
            scope
                .product_id
                .map(|id| stock_balances::Column::ProductId.eq(id.into_inner())),
        )
}

fn earliest(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

const fn direction_to_db(direction: Direction) -> StockDirection {
    match direction {
        Direction::Income => StockDirection::Income,
        Direction::Outcome => StockDirection::Outcome,
    }
}

const fn direction_from_db(direction: StockDirection) -> Direction {
    match direction {
        StockDirection::Income => Direction::Income,
        StockDirection::Outcome => Direction::Outcome,
    }
}

/// Every column except the timestamps.
fn movement_active_model(movement: &Movement) -> stock_movements::ActiveModel {
    stock_movements::ActiveModel {
        id: Set(movement.id.into_inner()),
        facility_id: Set(movement.facility_id.into_inner()),
        product_id: Set(movement.product_id.into_inner()),
        direction: Set(direction_to_db(movement.direction)),
        reference_type: Set(movement.reference.kind.as_str().to_string()),
        reference_id: Set(movement.reference.id.into_inner()),
        quantity: Set(movement.quantity),
        movement_date: Set(movement.date),
        ..Default::default()
    }
}

fn movement_from_model(model: stock_movements::Model) -> Result<Movement, StockError> {
    Ok(Movement {
        id: StockMovementId::from_uuid(model.id),
        facility_id: FacilityId::from_uuid(model.facility_id),
        product_id: ProductId::from_uuid(model.product_id),
        direction: direction_from_db(model.direction),
        reference: Reference::new(
            model.reference_type.parse::<DocumentKind>()?,
            DocumentId::from_uuid(model.reference_id),
        ),
        quantity: model.quantity,
        date: model.movement_date,
    })
}

fn balance_from_model(model: stock_balances::Model) -> Balance {
    Balance {
        id: StockBalanceId::from_uuid(model.id),
        facility_id: FacilityId::from_uuid(model.facility_id),
        product_id: ProductId::from_uuid(model.product_id),
        day: model.day,
        start: model.start_balance,
        income: model.income_balance,
        outcome: model.outcome_balance,
        finish: model.finish_balance,
    }
}
