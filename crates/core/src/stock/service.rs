//! Stock service facade.
//!
//! The calls document handlers and reporting make. Write paths take the scope
//! lock for every pair they touch, then write movements and recalculate the
//! affected balances inside one unit of work, so the movement change and the
//! balance chain commit or roll back together.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use stockbook_shared::RecalculationConfig;
use stockbook_shared::types::{DocumentId, FacilityId, ProductId};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::clock::Clock;
use super::engine::{RecalculationEngine, RecalculationReport};
use super::error::StockError;
use super::ledger::{MovementLedger, distinct_keys};
use super::resolver::{PointInTimeResolver, ensure_available_within};
use super::store::{StockStore, StockUnitOfWork};
use super::types::{
    DocumentKind, Movement, MovementRewrite, NewMovement, PointBalance, Reference, StockKey,
    StockScope,
};

/// Entry point for stock ledger operations.
pub struct StockService<S: StockStore> {
    engine: RecalculationEngine<S>,
    resolver: PointInTimeResolver<S>,
}

impl<S: StockStore> StockService<S> {
    /// Creates a new stock service.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: RecalculationConfig) -> Self {
        Self {
            resolver: PointInTimeResolver::new(Arc::clone(&store)),
            engine: RecalculationEngine::new(store, clock, config),
        }
    }

    /// The recalculation engine.
    pub fn engine(&self) -> &RecalculationEngine<S> {
        &self.engine
    }

    /// The point-in-time resolver.
    pub fn resolver(&self) -> &PointInTimeResolver<S> {
        &self.resolver
    }

    // ========================================================================
    // Recalculation
    // ========================================================================

    /// Recalculates balances from `date` up to the horizon, optionally
    /// restricted to a facility and/or product.
    pub async fn recalculate_all_balances_from_date(
        &self,
        date: NaiveDate,
        facility_id: Option<FacilityId>,
        product_id: Option<ProductId>,
    ) -> Result<RecalculationReport, StockError> {
        self.engine
            .recalculate(
                date,
                StockScope::new(facility_id, product_id),
                &CancellationToken::new(),
            )
            .await
    }

    /// Day after the latest persisted balance, or `today - lookback` when
    /// no balance exists yet.
    pub async fn get_last_balance_date(&self) -> Result<NaiveDate, StockError> {
        self.engine.last_balance_date().await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Movements of a document ordered by date ascending.
    pub async fn get_stock_movements_by_reference(
        &self,
        reference_id: DocumentId,
        reference_type: DocumentKind,
    ) -> Result<Vec<Movement>, StockError> {
        let reference = Reference::new(reference_type, reference_id);
        let mut uow = self.engine.store().begin().await?;
        let movements = MovementLedger::by_reference(&mut uow, &reference).await;
        uow.rollback().await?;
        movements
    }

    /// Balances as of `date` for every pair in the filter.
    pub async fn get_stock_balance_by_date(
        &self,
        facility_id: Option<FacilityId>,
        product_id: Option<ProductId>,
        date: NaiveDate,
    ) -> Result<Vec<PointBalance>, StockError> {
        self.resolver
            .balance_as_of(StockScope::new(facility_id, product_id), date)
            .await
    }

    /// Fails with `InsufficientStock` unless `quantity` is available.
    pub async fn ensure_available(
        &self,
        key: StockKey,
        date: NaiveDate,
        quantity: Decimal,
    ) -> Result<PointBalance, StockError> {
        self.resolver.ensure_available(key, date, quantity).await
    }

    // ========================================================================
    // Document writes
    // ========================================================================

    /// Appends the movements of a new document and recalculates the affected
    /// pairs from their earliest movement date.
    pub async fn record_movements(
        &self,
        movements: Vec<NewMovement>,
    ) -> Result<Vec<Movement>, StockError> {
        if movements.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<StockKey> = movements.iter().map(NewMovement::key).collect();
        let _guard = self.engine.locks().acquire(StockScope::covering(&keys)).await;

        let mut uow = self.engine.store().begin().await?;
        let mut recorded = Vec::with_capacity(movements.len());
        for input in movements {
            recorded.push(MovementLedger::append(&mut uow, input).await?);
        }
        self.recalculate_affected(&mut uow, &recorded).await?;
        uow.commit().await?;

        info!(count = recorded.len(), "Stock movements recorded");
        Ok(recorded)
    }

    /// Rewrites every movement of a document with new values and recalculates
    /// both the old and the new pairs from the earliest old or new date.
    ///
    /// # Errors
    ///
    /// Returns `ReferenceNotFound` if the document has no movements.
    pub async fn update_stock_movements_and_recalculate_balances(
        &self,
        rewrite: MovementRewrite,
    ) -> Result<Vec<Movement>, StockError> {
        let target = StockKey::new(rewrite.facility_id, rewrite.product_id);
        let mut scope = self.scope_for_reference(&rewrite.reference, target).await?;

        loop {
            let _guard = self.engine.locks().acquire(scope).await;
            let mut uow = self.engine.store().begin().await?;
            let rewritten = MovementLedger::rewrite(&mut uow, &rewrite).await?;

            // The document moved to another pair between the lookup and the lock.
            if !rewritten.affected_keys().iter().all(|key| scope.contains(key)) {
                uow.rollback().await?;
                scope = StockScope::all();
                continue;
            }

            let touched: Vec<Movement> = rewritten
                .previous
                .iter()
                .chain(&rewritten.current)
                .cloned()
                .collect();
            self.recalculate_affected(&mut uow, &touched).await?;
            uow.commit().await?;

            info!(
                reference = %rewrite.reference,
                count = rewritten.current.len(),
                "Stock movements rewritten"
            );
            return Ok(rewritten.current);
        }
    }

    /// Deletes every movement of a document without touching balances.
    ///
    /// The caller is expected to recalculate from the returned movements'
    /// earliest date.
    pub async fn delete_stock_movements(
        &self,
        reference_id: DocumentId,
        reference_type: DocumentKind,
    ) -> Result<Vec<Movement>, StockError> {
        let reference = Reference::new(reference_type, reference_id);
        let mut uow = self.engine.store().begin().await?;
        let removed = MovementLedger::remove(&mut uow, &reference).await?;
        uow.commit().await?;

        info!(reference = %reference, count = removed.len(), "Stock movements deleted");
        Ok(removed)
    }

    /// Deletes every movement of a document and recalculates the affected
    /// pairs from the removed movements' dates.
    pub async fn remove_document_movements(
        &self,
        reference: Reference,
    ) -> Result<Vec<Movement>, StockError> {
        let existing = self
            .get_stock_movements_by_reference(reference.id, reference.kind)
            .await?;
        if existing.is_empty() {
            return Ok(Vec::new());
        }
        let mut scope = StockScope::covering(&distinct_keys(&existing));

        loop {
            let _guard = self.engine.locks().acquire(scope).await;
            let mut uow = self.engine.store().begin().await?;
            let removed = MovementLedger::remove(&mut uow, &reference).await?;

            if !removed.iter().all(|m| scope.contains(&m.key())) {
                uow.rollback().await?;
                scope = StockScope::all();
                continue;
            }

            self.recalculate_affected(&mut uow, &removed).await?;
            uow.commit().await?;

            info!(
                reference = %reference,
                count = removed.len(),
                "Document stock movements removed"
            );
            return Ok(removed);
        }
    }

    /// Fails with `InsufficientStock` unless `quantity` is available, checked
    /// inside an open unit of work.
    pub async fn ensure_available_within(
        &self,
        uow: &mut S::UnitOfWork,
        key: StockKey,
        date: NaiveDate,
        quantity: Decimal,
    ) -> Result<PointBalance, StockError> {
        ensure_available_within(uow, key, date, quantity).await
    }

    async fn scope_for_reference(
        &self,
        reference: &Reference,
        target: StockKey,
    ) -> Result<StockScope, StockError> {
        let existing = self
            .get_stock_movements_by_reference(reference.id, reference.kind)
            .await?;
        let mut keys = distinct_keys(&existing);
        keys.push(target);
        Ok(StockScope::covering(&keys))
    }

    async fn recalculate_affected(
        &self,
        uow: &mut S::UnitOfWork,
        movements: &[Movement],
    ) -> Result<(), StockError> {
        for (key, anchor) in earliest_dates(movements) {
            self.engine
                .recalculate_within(uow, anchor, StockScope::pair(key))
                .await?;
        }
        Ok(())
    }
}

fn earliest_dates(movements: &[Movement]) -> BTreeMap<StockKey, NaiveDate> {
    let mut anchors: BTreeMap<StockKey, NaiveDate> = BTreeMap::new();
    for movement in movements {
        anchors
            .entry(movement.key())
            .and_modify(|date| *date = (*date).min(movement.date))
            .or_insert(movement.date);
    }
    anchors
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
