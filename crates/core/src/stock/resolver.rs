//! Point-in-time balance lookups.
//!
//! Answers "what is the balance as of date D" without a persisted row for D:
//! the finish of the latest snapshot before D becomes the start, and D's own
//! movements supply income and outcome. Read-only.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::error::StockError;
use super::store::{StockStore, StockUnitOfWork};
use super::types::{DailyTotals, PointBalance, StockKey, StockScope};

/// Resolves balances as of an arbitrary date.
pub struct PointInTimeResolver<S: StockStore> {
    store: Arc<S>,
}

impl<S: StockStore> PointInTimeResolver<S> {
    /// Creates a resolver over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Balances of every pair in `scope` that has history before `date` or
    /// movements on it, ordered by (facility, product).
    pub async fn balance_as_of(
        &self,
        scope: StockScope,
        date: NaiveDate,
    ) -> Result<Vec<PointBalance>, StockError> {
        let mut uow = self.store.begin().await?;
        let resolved = resolve(&mut uow, scope, date).await;
        uow.rollback().await?;
        resolved
    }

    /// Balance of a single pair; all zero when the pair has no history.
    pub async fn balance_for(
        &self,
        key: StockKey,
        date: NaiveDate,
    ) -> Result<PointBalance, StockError> {
        let mut uow = self.store.begin().await?;
        let resolved = resolve_pair(&mut uow, key, date).await;
        uow.rollback().await?;
        resolved
    }

    /// Checks that `quantity` can be consumed from `key` on `date`.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientStock` when the as-of finish is below `quantity`.
    pub async fn ensure_available(
        &self,
        key: StockKey,
        date: NaiveDate,
        quantity: Decimal,
    ) -> Result<PointBalance, StockError> {
        let mut uow = self.store.begin().await?;
        let checked = ensure_available_within(&mut uow, key, date, quantity).await;
        uow.rollback().await?;
        checked
    }
}

/// Resolves balances as of `date` inside an open unit of work.
pub async fn resolve<U: StockUnitOfWork>(
    uow: &mut U,
    scope: StockScope,
    date: NaiveDate,
) -> Result<Vec<PointBalance>, StockError> {
    let mut starts: BTreeMap<StockKey, Decimal> = uow
        .latest_balances_before(date, scope)
        .await?
        .into_iter()
        .map(|balance| (balance.key(), balance.finish))
        .collect();
    let mut totals = DailyTotals::aggregate(&uow.movements_on(date, scope).await?);

    for key in totals.keys() {
        starts.entry(*key).or_insert(Decimal::ZERO);
    }

    Ok(starts
        .into_iter()
        .map(|(key, start)| {
            let day_totals = totals.remove(&key).unwrap_or_default();
            PointBalance::new(key, date, start, day_totals)
        })
        .collect())
}

/// Single-pair form of [`resolve`].
pub async fn resolve_pair<U: StockUnitOfWork>(
    uow: &mut U,
    key: StockKey,
    date: NaiveDate,
) -> Result<PointBalance, StockError> {
    let resolved = resolve(uow, StockScope::pair(key), date).await?;
    Ok(resolved
        .into_iter()
        .next()
        .unwrap_or_else(|| PointBalance::new(key, date, Decimal::ZERO, DailyTotals::default())))
}

/// [`PointInTimeResolver::ensure_available`] inside an open unit of work.
pub async fn ensure_available_within<U: StockUnitOfWork>(
    uow: &mut U,
    key: StockKey,
    date: NaiveDate,
    quantity: Decimal,
) -> Result<PointBalance, StockError> {
    let balance = resolve_pair(uow, key, date).await?;
    if balance.finish < quantity {
        return Err(StockError::InsufficientStock {
            key,
            date,
            available: balance.finish,
            requested: quantity,
        });
    }
    Ok(balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use stockbook_shared::types::{DocumentId, FacilityId, ProductId, StockBalanceId, StockMovementId};

    use crate::stock::memory::InMemoryStockStore;
    use crate::stock::types::{Balance, Direction, DocumentKind, Movement, Reference};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    async fn seed(store: &InMemoryStockStore, key: StockKey) {
        let mut uow = store.begin().await.unwrap();
        let snapshot = Balance::compute(
            StockBalanceId::new(),
            key,
            day(3),
            dec!(0),
            DailyTotals {
                income: dec!(40),
                outcome: dec!(0),
            },
        );
        uow.upsert_balance(&snapshot).await.unwrap();
        for (direction, quantity) in [(Direction::Income, dec!(5)), (Direction::Outcome, dec!(12))] {
            uow.insert_movement(&Movement {
                id: StockMovementId::new(),
                facility_id: key.facility_id,
                product_id: key.product_id,
                direction,
                reference: Reference::new(DocumentKind::Production, DocumentId::new()),
                quantity,
                date: day(7),
            })
            .await
            .unwrap();
        }
        uow.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_combines_prior_snapshot_with_same_day_movements() {
        let store = InMemoryStockStore::new();
        let key = StockKey::new(FacilityId::new(), ProductId::new());
        seed(&store, key).await;
        let resolver = PointInTimeResolver::new(Arc::new(store));

        let balance = resolver.balance_for(key, day(7)).await.unwrap();
        assert_eq!(balance.start, dec!(40));
        assert_eq!(balance.income, dec!(5));
        assert_eq!(balance.outcome, dec!(12));
        assert_eq!(balance.finish, dec!(33));
    }

    #[tokio::test]
    async fn test_day_without_movements_carries_snapshot() {
        let store = InMemoryStockStore::new();
        let key = StockKey::new(FacilityId::new(), ProductId::new());
        seed(&store, key).await;
        let resolver = PointInTimeResolver::new(Arc::new(store));

        let balance = resolver.balance_for(key, day(5)).await.unwrap();
        assert_eq!(balance.start, dec!(40));
        assert_eq!(balance.finish, dec!(40));
    }

    #[tokio::test]
    async fn test_unknown_pair_is_zero() {
        let resolver = PointInTimeResolver::new(Arc::new(InMemoryStockStore::new()));
        let key = StockKey::new(FacilityId::new(), ProductId::new());

        let balance = resolver.balance_for(key, day(1)).await.unwrap();
        assert_eq!(balance.finish, Decimal::ZERO);
        assert!(resolver.balance_as_of(StockScope::all(), day(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scope_lists_every_pair_with_history() {
        let store = InMemoryStockStore::new();
        let facility = FacilityId::new();
        let a = StockKey::new(facility, ProductId::new());
        let b = StockKey::new(facility, ProductId::new());
        seed(&store, a).await;
        seed(&store, b).await;
        let resolver = PointInTimeResolver::new(Arc::new(store));

        let balances = resolver
            .balance_as_of(StockScope::new(Some(facility), None), day(7))
            .await
            .unwrap();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(balances.iter().map(|b| b.key).collect::<Vec<_>>(), expected);
    }

    #[tokio::test]
    async fn test_ensure_available() {
        let store = InMemoryStockStore::new();
        let key = StockKey::new(FacilityId::new(), ProductId::new());
        seed(&store, key).await;
        let resolver = PointInTimeResolver::new(Arc::new(store.clone()));

        assert!(resolver.ensure_available(key, day(7), dec!(33)).await.is_ok());

        let err = resolver
            .ensure_available(key, day(7), dec!(34))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StockError::InsufficientStock { available, requested, .. }
                if available == dec!(33) && requested == dec!(34)
        ));
        assert_eq!(store.movements().await.len(), 2);
    }
}
