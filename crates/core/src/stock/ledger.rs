//! Movement ledger operations.
//!
//! Appends, rewrites and deletes movements inside a caller-supplied unit of
//! work. None of these operations recalculate balances.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use stockbook_shared::types::StockMovementId;

use super::error::StockError;
use super::store::StockUnitOfWork;
use super::types::{Movement, MovementRewrite, NewMovement, Reference, StockKey};

/// Outcome of rewriting a document's movements.
#[derive(Debug, Clone)]
pub struct RewrittenMovements {
    /// Movements as they were before the rewrite.
    pub previous: Vec<Movement>,
    /// Movements as stored after the rewrite.
    pub current: Vec<Movement>,
}

impl RewrittenMovements {
    /// Earliest date touched before or after the rewrite.
    #[must_use]
    pub fn anchor_date(&self) -> Option<NaiveDate> {
        self.previous
            .iter()
            .chain(&self.current)
            .map(|m| m.date)
            .min()
    }

    /// Every pair touched before or after the rewrite, deduplicated and sorted.
    #[must_use]
    pub fn affected_keys(&self) -> Vec<StockKey> {
        distinct_keys(self.previous.iter().chain(&self.current))
    }
}

/// Stateless operations over the movement ledger.
pub struct MovementLedger;

impl MovementLedger {
    /// Appends a movement.
    ///
    /// # Errors
    ///
    /// Returns `NonPositiveQuantity` if the quantity is zero or negative and
    /// `QuantityPrecision` if it has more than four fractional digits.
    pub async fn append<U: StockUnitOfWork>(
        uow: &mut U,
        input: NewMovement,
    ) -> Result<Movement, StockError> {
        validate_quantity(input.quantity)?;

        let movement = Movement {
            id: StockMovementId::new(),
            facility_id: input.facility_id,
            product_id: input.product_id,
            direction: input.direction,
            reference: input.reference,
            quantity: input.quantity,
            date: input.date,
        };
        uow.insert_movement(&movement).await?;
        Ok(movement)
    }

    /// Applies new facility/product/direction/quantity/date to every movement
    /// of a document.
    ///
    /// # Errors
    ///
    /// Returns `NonPositiveQuantity` or `QuantityPrecision` for an invalid quantity and
    /// `ReferenceNotFound` if the document has no movements.
    pub async fn rewrite<U: StockUnitOfWork>(
        uow: &mut U,
        rewrite: &MovementRewrite,
    ) -> Result<RewrittenMovements, StockError> {
        validate_quantity(rewrite.quantity)?;

        let previous = uow.movements_by_reference(&rewrite.reference).await?;
        if previous.is_empty() {
            return Err(StockError::ReferenceNotFound(rewrite.reference));
        }

        let mut current = Vec::with_capacity(previous.len());
        for movement in &previous {
            let updated = Movement {
                id: movement.id,
                facility_id: rewrite.facility_id,
                product_id: rewrite.product_id,
                direction: rewrite.direction,
                reference: movement.reference,
                quantity: rewrite.quantity,
                date: rewrite.date,
            };
            uow.update_movement(&updated).await?;
            current.push(updated);
        }

        Ok(RewrittenMovements { previous, current })
    }

    /// Deletes every movement of a document and returns what was removed.
    pub async fn remove<U: StockUnitOfWork>(
        uow: &mut U,
        reference: &Reference,
    ) -> Result<Vec<Movement>, StockError> {
        let removed = uow.movements_by_reference(reference).await?;
        for movement in &removed {
            uow.delete_movement(movement.id).await?;
        }
        Ok(removed)
    }

    /// Movements of a document ordered by date ascending.
    pub async fn by_reference<U: StockUnitOfWork>(
        uow: &mut U,
        reference: &Reference,
    ) -> Result<Vec<Movement>, StockError> {
        let mut movements = uow.movements_by_reference(reference).await?;
        movements.sort_by_key(|m| m.date);
        Ok(movements)
    }
}

/// Fractional digits a stored quantity can carry (`NUMERIC(19, 4)`).
pub const MAX_QUANTITY_SCALE: u32 = 4;

fn validate_quantity(quantity: Decimal) -> Result<(), StockError> {
    if quantity <= Decimal::ZERO {
        return Err(StockError::NonPositiveQuantity(quantity));
    }
    if quantity.normalize().scale() > MAX_QUANTITY_SCALE {
        return Err(StockError::QuantityPrecision(quantity));
    }
    Ok(())
}

/// Distinct pairs of the given movements in key order.
pub(crate) fn distinct_keys<'a>(movements: impl IntoIterator<Item = &'a Movement>) -> Vec<StockKey> {
    let mut keys: Vec<StockKey> = movements.into_iter().map(Movement::key).collect();
    keys.sort();
    keys.dedup();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use stockbook_shared::types::{DocumentId, FacilityId, ProductId};

    use crate::stock::memory::InMemoryStockStore;
    use crate::stock::store::StockStore;
    use crate::stock::types::{Direction, DocumentKind};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, d).unwrap()
    }

    fn new_movement(reference: Reference, key: StockKey, quantity: Decimal, date: NaiveDate) -> NewMovement {
        NewMovement {
            facility_id: key.facility_id,
            product_id: key.product_id,
            direction: Direction::Income,
            reference,
            quantity,
            date,
        }
    }

    #[tokio::test]
    async fn test_append_rejects_non_positive_quantity() {
        let store = InMemoryStockStore::new();
        let key = StockKey::new(FacilityId::new(), ProductId::new());
        let reference = Reference::new(DocumentKind::Supply, DocumentId::new());

        let mut uow = store.begin().await.unwrap();
        for quantity in [dec!(0), dec!(-1)] {
            let err = MovementLedger::append(&mut uow, new_movement(reference, key, quantity, day(1)))
                .await
                .unwrap_err();
            assert!(matches!(err, StockError::NonPositiveQuantity(_)));
        }
        uow.commit().await.unwrap();

        assert!(store.movements().await.is_empty());
    }

    #[tokio::test]
    async fn test_append_rejects_quantity_finer_than_storage_scale() {
        let store = InMemoryStockStore::new();
        let key = StockKey::new(FacilityId::new(), ProductId::new());
        let reference = Reference::new(DocumentKind::Supply, DocumentId::new());

        let mut uow = store.begin().await.unwrap();
        let err = MovementLedger::append(&mut uow, new_movement(reference, key, dec!(0.00001), day(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::QuantityPrecision(_)));
        assert!(!err.is_retryable());

        // Trailing zeros beyond the scale are fine.
        MovementLedger::append(&mut uow, new_movement(reference, key, dec!(1.250000), day(1)))
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let stored = store.movements().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].quantity, dec!(1.25));
    }

    #[tokio::test]
    async fn test_rewrite_rejects_quantity_finer_than_storage_scale() {
        let store = InMemoryStockStore::new();
        let key = StockKey::new(FacilityId::new(), ProductId::new());
        let reference = Reference::new(DocumentKind::Supply, DocumentId::new());

        let mut uow = store.begin().await.unwrap();
        MovementLedger::append(&mut uow, new_movement(reference, key, dec!(2), day(1)))
            .await
            .unwrap();
        let rewrite = MovementRewrite {
            reference,
            direction: Direction::Income,
            facility_id: key.facility_id,
            product_id: key.product_id,
            quantity: dec!(2.12345),
            date: day(2),
        };
        let err = MovementLedger::rewrite(&mut uow, &rewrite).await.unwrap_err();
        assert!(matches!(err, StockError::QuantityPrecision(_)));
    }

    #[tokio::test]
    async fn test_by_reference_orders_by_date_and_ignores_other_documents() {
        let store = InMemoryStockStore::new();
        let key = StockKey::new(FacilityId::new(), ProductId::new());
        let reference = Reference::new(DocumentKind::Production, DocumentId::new());
        let other = Reference::new(DocumentKind::Production, DocumentId::new());

        let mut uow = store.begin().await.unwrap();
        MovementLedger::append(&mut uow, new_movement(reference, key, dec!(1), day(9))).await.unwrap();
        MovementLedger::append(&mut uow, new_movement(reference, key, dec!(2), day(3))).await.unwrap();
        MovementLedger::append(&mut uow, new_movement(other, key, dec!(3), day(1))).await.unwrap();

        let movements = MovementLedger::by_reference(&mut uow, &reference).await.unwrap();
        let dates: Vec<NaiveDate> = movements.iter().map(|m| m.date).collect();
        assert_eq!(dates, vec![day(3), day(9)]);
    }

    #[tokio::test]
    async fn test_rewrite_reports_old_and_new_pairs() {
        let store = InMemoryStockStore::new();
        let old_key = StockKey::new(FacilityId::new(), ProductId::new());
        let new_key = StockKey::new(FacilityId::new(), old_key.product_id);
        let reference = Reference::new(DocumentKind::Supply, DocumentId::new());

        let mut uow = store.begin().await.unwrap();
        MovementLedger::append(&mut uow, new_movement(reference, old_key, dec!(10), day(5))).await.unwrap();

        let rewrite = MovementRewrite {
            reference,
            direction: Direction::Outcome,
            facility_id: new_key.facility_id,
            product_id: new_key.product_id,
            quantity: dec!(4),
            date: day(8),
        };
        let result = MovementLedger::rewrite(&mut uow, &rewrite).await.unwrap();

        assert_eq!(result.anchor_date(), Some(day(5)));
        let mut expected = vec![old_key, new_key];
        expected.sort();
        assert_eq!(result.affected_keys(), expected);
        assert_eq!(result.current[0].id, result.previous[0].id);
        assert_eq!(result.current[0].direction, Direction::Outcome);
        assert_eq!(result.current[0].quantity, dec!(4));
    }

    #[tokio::test]
    async fn test_rewrite_unknown_reference_is_not_found() {
        let store = InMemoryStockStore::new();
        let key = StockKey::new(FacilityId::new(), ProductId::new());
        let rewrite = MovementRewrite {
            reference: Reference::new(DocumentKind::Supply, DocumentId::new()),
            direction: Direction::Income,
            facility_id: key.facility_id,
            product_id: key.product_id,
            quantity: dec!(1),
            date: day(1),
        };

        let mut uow = store.begin().await.unwrap();
        let err = MovementLedger::rewrite(&mut uow, &rewrite).await.unwrap_err();
        assert!(matches!(err, StockError::ReferenceNotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_returns_deleted_movements() {
        let store = InMemoryStockStore::new();
        let key = StockKey::new(FacilityId::new(), ProductId::new());
        let reference = Reference::new(DocumentKind::Adjustment, DocumentId::new());

        let mut uow = store.begin().await.unwrap();
        MovementLedger::append(&mut uow, new_movement(reference, key, dec!(1), day(2))).await.unwrap();
        MovementLedger::append(&mut uow, new_movement(reference, key, dec!(2), day(4))).await.unwrap();
        let removed = MovementLedger::remove(&mut uow, &reference).await.unwrap();
        assert_eq!(removed.len(), 2);
        assert!(MovementLedger::remove(&mut uow, &reference).await.unwrap().is_empty());
        uow.commit().await.unwrap();

        assert!(store.movements().await.is_empty());
    }
}
