//! Property-based tests for balance recalculation.
//!
//! - Every row satisfies `finish = start + income - outcome`
//! - Consecutive rows of a pair chain `start(d2) == finish(d1)`
//! - Rows exist exactly on days with movements
//! - Incremental recalculation matches a full rebuild
//! - Point-in-time lookups match persisted rows

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use stockbook_shared::RecalculationConfig;
use stockbook_shared::types::{DocumentId, FacilityId, ProductId, StockMovementId};
use tokio_util::sync::CancellationToken;

use super::clock::FixedClock;
use super::engine::RecalculationEngine;
use super::memory::InMemoryStockStore;
use super::resolver::PointInTimeResolver;
use super::store::{StockStore, StockUnitOfWork};
use super::types::{Balance, Direction, DocumentKind, Movement, Reference, StockKey, StockScope};

/// A movement before it is bound to concrete ids.
#[derive(Debug, Clone)]
struct Draft {
    pair: usize,
    day: u32,
    direction: Direction,
    quantity: Decimal,
}

/// Strategy to generate positive quantities (0.01 to 1,000.00).
fn quantity() -> impl Strategy<Value = Decimal> {
    (1i64..100_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Income), Just(Direction::Outcome)]
}

fn draft() -> impl Strategy<Value = Draft> {
    (0usize..3, 1u32..=15, direction(), quantity()).prop_map(|(pair, day, direction, quantity)| {
        Draft {
            pair,
            day,
            direction,
            quantity,
        }
    })
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, d).unwrap()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn keys() -> Vec<StockKey> {
    let facility = FacilityId::new();
    vec![
        StockKey::new(facility, ProductId::new()),
        StockKey::new(facility, ProductId::new()),
        StockKey::new(FacilityId::new(), ProductId::new()),
    ]
}

fn bind(drafts: &[Draft], keys: &[StockKey]) -> Vec<Movement> {
    drafts
        .iter()
        .map(|d| {
            let key = keys[d.pair];
            Movement {
                id: StockMovementId::new(),
                facility_id: key.facility_id,
                product_id: key.product_id,
                direction: d.direction,
                reference: Reference::new(DocumentKind::Adjustment, DocumentId::new()),
                quantity: d.quantity,
                date: day(d.day),
            }
        })
        .collect()
}

fn engine(store: &InMemoryStockStore) -> RecalculationEngine<InMemoryStockStore> {
    RecalculationEngine::new(
        Arc::new(store.clone()),
        Arc::new(FixedClock(day(20))),
        RecalculationConfig::default(),
    )
}

async fn insert_all(store: &InMemoryStockStore, movements: &[Movement]) {
    let mut uow = store.begin().await.unwrap();
    for movement in movements {
        uow.insert_movement(movement).await.unwrap();
    }
    uow.commit().await.unwrap();
}

async fn rebuild(store: &InMemoryStockStore, from: NaiveDate) {
    engine(store)
        .recalculate(from, StockScope::all(), &CancellationToken::new())
        .await
        .unwrap();
}

type Figures = (Decimal, Decimal, Decimal, Decimal);

fn by_slot(balances: &[Balance]) -> BTreeMap<(StockKey, NaiveDate), Figures> {
    balances
        .iter()
        .map(|b| ((b.key(), b.day), (b.start, b.income, b.outcome, b.finish)))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Row formula, chain continuity, no stale rows and final totals.
    #[test]
    fn prop_chain_invariants(drafts in prop::collection::vec(draft(), 0..40)) {
        let rt = runtime();
        let keys = keys();
        let movements = bind(&drafts, &keys);
        let store = InMemoryStockStore::new();

        let balances = rt.block_on(async {
            insert_all(&store, &movements).await;
            rebuild(&store, day(1)).await;
            store.balances().await
        });

        for balance in &balances {
            prop_assert!(balance.is_consistent());
        }

        let mut last_finish: BTreeMap<StockKey, Decimal> = BTreeMap::new();
        for balance in &balances {
            let expected_start = last_finish.get(&balance.key()).copied().unwrap_or(Decimal::ZERO);
            prop_assert_eq!(balance.start, expected_start);
            last_finish.insert(balance.key(), balance.finish);
        }

        let active: BTreeSet<(StockKey, NaiveDate)> =
            movements.iter().map(|m| (m.key(), m.date)).collect();
        let persisted: BTreeSet<(StockKey, NaiveDate)> =
            balances.iter().map(|b| (b.key(), b.day)).collect();
        prop_assert_eq!(active, persisted);

        for key in &keys {
            let net: Decimal = movements
                .iter()
                .filter(|m| m.key() == *key)
                .map(Movement::signed_quantity)
                .sum();
            prop_assert_eq!(last_finish.get(key).copied().unwrap_or(Decimal::ZERO), net);
        }
    }

    /// Recalculating twice leaves identical rows, identities included.
    #[test]
    fn prop_recalculation_idempotent(drafts in prop::collection::vec(draft(), 1..30)) {
        let rt = runtime();
        let movements = bind(&drafts, &keys());
        let store = InMemoryStockStore::new();

        let (first, second) = rt.block_on(async {
            insert_all(&store, &movements).await;
            rebuild(&store, day(1)).await;
            let first = store.balances().await;
            rebuild(&store, day(1)).await;
            (first, store.balances().await)
        });

        prop_assert_eq!(first, second);
    }

    /// Adding movements and recalculating from their earliest date gives the
    /// same figures as rebuilding everything from scratch.
    #[test]
    fn prop_incremental_matches_full(
        initial in prop::collection::vec(draft(), 0..20),
        later in prop::collection::vec(draft(), 1..10),
        removed in prop::collection::vec(any::<bool>(), 20),
    ) {
        let rt = runtime();
        let keys = keys();
        let initial = bind(&initial, &keys);
        let later = bind(&later, &keys);
        let removed: Vec<Movement> = initial
            .iter()
            .zip(&removed)
            .filter(|(_, remove)| **remove)
            .map(|(m, _)| m.clone())
            .collect();

        let incremental = InMemoryStockStore::new();
        let full = InMemoryStockStore::new();

        let (incremental_rows, full_rows) = rt.block_on(async {
            insert_all(&incremental, &initial).await;
            rebuild(&incremental, day(1)).await;

            insert_all(&incremental, &later).await;
            let mut uow = incremental.begin().await.unwrap();
            for movement in &removed {
                uow.delete_movement(movement.id).await.unwrap();
            }
            uow.commit().await.unwrap();

            let anchor = later
                .iter()
                .chain(&removed)
                .map(|m| m.date)
                .min()
                .unwrap_or(day(1));
            rebuild(&incremental, anchor).await;

            let survivors: Vec<Movement> = initial
                .iter()
                .filter(|m| !removed.iter().any(|r| r.id == m.id))
                .chain(&later)
                .cloned()
                .collect();
            insert_all(&full, &survivors).await;
            rebuild(&full, day(1)).await;

            (incremental.balances().await, full.balances().await)
        });

        prop_assert_eq!(by_slot(&incremental_rows), by_slot(&full_rows));
    }

    /// The resolver reproduces every persisted row.
    #[test]
    fn prop_as_of_matches_persisted(drafts in prop::collection::vec(draft(), 1..30)) {
        let rt = runtime();
        let movements = bind(&drafts, &keys());
        let store = InMemoryStockStore::new();
        let resolver = PointInTimeResolver::new(Arc::new(store.clone()));

        let pairs = rt.block_on(async {
            insert_all(&store, &movements).await;
            rebuild(&store, day(1)).await;
            let mut pairs = Vec::new();
            for balance in store.balances().await {
                let resolved = resolver.balance_for(balance.key(), balance.day).await.unwrap();
                pairs.push((balance, resolved));
            }
            pairs
        });

        for (balance, resolved) in pairs {
            prop_assert_eq!(resolved.start, balance.start);
            prop_assert_eq!(resolved.income, balance.income);
            prop_assert_eq!(resolved.outcome, balance.outcome);
            prop_assert_eq!(resolved.finish, balance.finish);
        }
    }
}
