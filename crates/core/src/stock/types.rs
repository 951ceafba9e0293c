//! Stock domain types.
//!
//! This module defines the movement ledger rows, the derived daily balance
//! rows and the small value types the recalculation engine works with.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stockbook_shared::types::{DocumentId, FacilityId, ProductId, StockBalanceId, StockMovementId};

use super::error::StockError;

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Stock increases (supply received, production output).
    Income,
    /// Stock decreases (component consumption, write-off).
    Outcome,
}

impl Direction {
    /// Returns the stable string form stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Outcome => "outcome",
        }
    }
}

/// Kind of document a movement originates from.
///
/// The engine only uses it as part of the reference grouping key; it never
/// branches on the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Goods received against a purchase.
    Supply,
    /// Finished goods produced by a production run.
    Production,
    /// Components consumed by a production run.
    ProductionConsumption,
    /// Manual stock correction.
    Adjustment,
}

impl DocumentKind {
    /// Returns the stable string form stored in the `reference_type` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Supply => "supply",
            Self::Production => "production",
            Self::ProductionConsumption => "production_consumption",
            Self::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supply" => Ok(Self::Supply),
            "production" => Ok(Self::Production),
            "production_consumption" => Ok(Self::ProductionConsumption),
            "adjustment" => Ok(Self::Adjustment),
            other => Err(StockError::UnknownReferenceType(other.to_string())),
        }
    }
}

/// Polymorphic pointer to the document that produced a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// Document type tag.
    pub kind: DocumentKind,
    /// Document identifier, opaque to the engine.
    pub id: DocumentId,
}

impl Reference {
    /// Creates a new reference.
    #[must_use]
    pub const fn new(kind: DocumentKind, id: DocumentId) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A (facility, product) pair; the unit balances are kept for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    /// Facility holding the stock.
    pub facility_id: FacilityId,
    /// Stocked product.
    pub product_id: ProductId,
}

impl StockKey {
    /// Creates a new stock key.
    #[must_use]
    pub const fn new(facility_id: FacilityId, product_id: ProductId) -> Self {
        Self {
            facility_id,
            product_id,
        }
    }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.facility_id, self.product_id)
    }
}

/// Optional facility/product filter restricting which pairs an operation touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockScope {
    /// Restrict to one facility.
    pub facility_id: Option<FacilityId>,
    /// Restrict to one product.
    pub product_id: Option<ProductId>,
}

impl StockScope {
    /// Every pair.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            facility_id: None,
            product_id: None,
        }
    }

    /// Builds a scope from optional filters.
    #[must_use]
    pub const fn new(facility_id: Option<FacilityId>, product_id: Option<ProductId>) -> Self {
        Self {
            facility_id,
            product_id,
        }
    }

    /// Exactly one pair.
    #[must_use]
    pub const fn pair(key: StockKey) -> Self {
        Self {
            facility_id: Some(key.facility_id),
            product_id: Some(key.product_id),
        }
    }

    /// Returns the pair when both filters are set.
    #[must_use]
    pub fn as_pair(&self) -> Option<StockKey> {
        Some(StockKey::new(self.facility_id?, self.product_id?))
    }

    /// Returns true if the pair falls inside this scope.
    #[must_use]
    pub fn contains(&self, key: &StockKey) -> bool {
        self.facility_id.is_none_or(|f| f == key.facility_id)
            && self.product_id.is_none_or(|p| p == key.product_id)
    }

    /// Smallest scope covering every given pair.
    #[must_use]
    pub fn covering<'a>(keys: impl IntoIterator<Item = &'a StockKey>) -> Self {
        let mut keys = keys.into_iter();
        let Some(first) = keys.next() else {
            return Self::all();
        };
        let mut scope = Self::pair(*first);
        for key in keys {
            if scope.facility_id != Some(key.facility_id) {
                scope.facility_id = None;
            }
            if scope.product_id != Some(key.product_id) {
                scope.product_id = None;
            }
        }
        scope
    }
}

/// A dated stock event tied to one originating document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Movement identity.
    pub id: StockMovementId,
    /// Facility the stock moved in or out of.
    pub facility_id: FacilityId,
    /// Product that moved.
    pub product_id: ProductId,
    /// Income or outcome.
    pub direction: Direction,
    /// Originating document.
    pub reference: Reference,
    /// Moved quantity, always positive.
    pub quantity: Decimal,
    /// Business day of the movement.
    pub date: NaiveDate,
}

impl Movement {
    /// The pair this movement belongs to.
    #[must_use]
    pub const fn key(&self) -> StockKey {
        StockKey::new(self.facility_id, self.product_id)
    }

    /// Signed effect of this movement on the balance.
    #[must_use]
    pub fn signed_quantity(&self) -> Decimal {
        match self.direction {
            Direction::Income => self.quantity,
            Direction::Outcome => -self.quantity,
        }
    }
}

/// Input for appending a movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    /// Facility the stock moves in or out of.
    pub facility_id: FacilityId,
    /// Product that moves.
    pub product_id: ProductId,
    /// Income or outcome.
    pub direction: Direction,
    /// Originating document.
    pub reference: Reference,
    /// Quantity (must be > 0).
    pub quantity: Decimal,
    /// Business day of the movement.
    pub date: NaiveDate,
}

impl NewMovement {
    /// The pair this movement belongs to.
    #[must_use]
    pub const fn key(&self) -> StockKey {
        StockKey::new(self.facility_id, self.product_id)
    }
}

/// Replacement values applied to every movement of an edited document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRewrite {
    /// Document whose movements are rewritten.
    pub reference: Reference,
    /// New direction.
    pub direction: Direction,
    /// New facility.
    pub facility_id: FacilityId,
    /// New product.
    pub product_id: ProductId,
    /// New quantity (must be > 0).
    pub quantity: Decimal,
    /// New business day.
    pub date: NaiveDate,
}

/// Income and outcome of one pair on one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTotals {
    /// Sum of income quantities.
    pub income: Decimal,
    /// Sum of outcome quantities.
    pub outcome: Decimal,
}

impl DailyTotals {
    /// Adds one movement.
    pub fn add(&mut self, direction: Direction, quantity: Decimal) {
        match direction {
            Direction::Income => self.income += quantity,
            Direction::Outcome => self.outcome += quantity,
        }
    }

    /// Sums movements by pair and direction.
    ///
    /// Movements are not filtered by date; callers pass one day's movements.
    #[must_use]
    pub fn aggregate<'a>(
        movements: impl IntoIterator<Item = &'a Movement>,
    ) -> BTreeMap<StockKey, Self> {
        let mut totals: BTreeMap<StockKey, Self> = BTreeMap::new();
        for movement in movements {
            totals
                .entry(movement.key())
                .or_default()
                .add(movement.direction, movement.quantity);
        }
        totals
    }

    /// Net change of the day.
    #[must_use]
    pub fn net(&self) -> Decimal {
        self.income - self.outcome
    }
}

/// Persisted daily balance snapshot of one pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Balance identity.
    pub id: StockBalanceId,
    /// Facility.
    pub facility_id: FacilityId,
    /// Product.
    pub product_id: ProductId,
    /// Day this snapshot summarises.
    pub day: NaiveDate,
    /// Finish of the previous snapshot (0 for the first one).
    pub start: Decimal,
    /// Income of the day.
    pub income: Decimal,
    /// Outcome of the day.
    pub outcome: Decimal,
    /// `start + income - outcome`.
    pub finish: Decimal,
}

impl Balance {
    /// Builds a snapshot from the carried-over start and the day's totals.
    #[must_use]
    pub fn compute(
        id: StockBalanceId,
        key: StockKey,
        day: NaiveDate,
        start: Decimal,
        totals: DailyTotals,
    ) -> Self {
        Self {
            id,
            facility_id: key.facility_id,
            product_id: key.product_id,
            day,
            start,
            income: totals.income,
            outcome: totals.outcome,
            finish: start + totals.net(),
        }
    }

    /// The pair this balance belongs to.
    #[must_use]
    pub const fn key(&self) -> StockKey {
        StockKey::new(self.facility_id, self.product_id)
    }

    /// Returns true if `finish = start + income - outcome` holds.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.finish == self.start + self.income - self.outcome
    }
}

/// Balance of one pair as of a date, whether or not that day was snapshotted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointBalance {
    /// The pair.
    pub key: StockKey,
    /// The requested date.
    pub date: NaiveDate,
    /// Finish of the latest snapshot before `date`.
    pub start: Decimal,
    /// Income on `date`.
    pub income: Decimal,
    /// Outcome on `date`.
    pub outcome: Decimal,
    /// `start + income - outcome`.
    pub finish: Decimal,
}

impl PointBalance {
    /// Combines a carried-over start with the day's totals.
    #[must_use]
    pub fn new(key: StockKey, date: NaiveDate, start: Decimal, totals: DailyTotals) -> Self {
        Self {
            key,
            date,
            start,
            income: totals.income,
            outcome: totals.outcome,
            finish: start + totals.net(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn movement(key: StockKey, direction: Direction, quantity: Decimal) -> Movement {
        Movement {
            id: StockMovementId::new(),
            facility_id: key.facility_id,
            product_id: key.product_id,
            direction,
            reference: Reference::new(DocumentKind::Supply, DocumentId::new()),
            quantity,
            date: day(1),
        }
    }

    #[test]
    fn test_document_kind_round_trip_through_str() {
        for kind in [
            DocumentKind::Supply,
            DocumentKind::Production,
            DocumentKind::ProductionConsumption,
            DocumentKind::Adjustment,
        ] {
            assert_eq!(kind.as_str().parse::<DocumentKind>().unwrap(), kind);
        }
        assert!(matches!(
            "invoice".parse::<DocumentKind>(),
            Err(StockError::UnknownReferenceType(_))
        ));
    }

    #[test]
    fn test_document_kind_serde_matches_column_value() {
        let json = serde_json::to_string(&DocumentKind::ProductionConsumption).unwrap();
        assert_eq!(json, "\"production_consumption\"");
        let json = serde_json::to_string(&Direction::Outcome).unwrap();
        assert_eq!(json, "\"outcome\"");
    }

    #[test]
    fn test_daily_totals_aggregate_by_pair_and_direction() {
        let a = StockKey::new(FacilityId::new(), ProductId::new());
        let b = StockKey::new(FacilityId::new(), ProductId::new());
        let movements = vec![
            movement(a, Direction::Income, dec!(10)),
            movement(a, Direction::Income, dec!(5.5)),
            movement(a, Direction::Outcome, dec!(3)),
            movement(b, Direction::Outcome, dec!(7)),
        ];

        let totals = DailyTotals::aggregate(&movements);

        assert_eq!(totals.len(), 2);
        assert_eq!(totals[&a].income, dec!(15.5));
        assert_eq!(totals[&a].outcome, dec!(3));
        assert_eq!(totals[&a].net(), dec!(12.5));
        assert_eq!(totals[&b].income, dec!(0));
        assert_eq!(totals[&b].net(), dec!(-7));
    }

    #[test]
    fn test_balance_compute_keeps_invariant() {
        let key = StockKey::new(FacilityId::new(), ProductId::new());
        let totals = DailyTotals {
            income: dec!(0),
            outcome: dec!(30),
        };
        let balance = Balance::compute(StockBalanceId::new(), key, day(2), dec!(100), totals);

        assert_eq!(balance.finish, dec!(70));
        assert!(balance.is_consistent());
        assert_eq!(balance.key(), key);
    }

    #[test]
    fn test_signed_quantity() {
        let key = StockKey::new(FacilityId::new(), ProductId::new());
        assert_eq!(movement(key, Direction::Income, dec!(4)).signed_quantity(), dec!(4));
        assert_eq!(movement(key, Direction::Outcome, dec!(4)).signed_quantity(), dec!(-4));
    }

    #[test]
    fn test_scope_contains() {
        let key = StockKey::new(FacilityId::new(), ProductId::new());
        let other = StockKey::new(FacilityId::new(), key.product_id);

        assert!(StockScope::all().contains(&key));
        assert!(StockScope::pair(key).contains(&key));
        assert!(!StockScope::pair(key).contains(&other));
        assert!(StockScope::new(None, Some(key.product_id)).contains(&other));
        assert!(!StockScope::new(Some(key.facility_id), None).contains(&other));
    }

    #[test]
    fn test_scope_covering() {
        let facility = FacilityId::new();
        let a = StockKey::new(facility, ProductId::new());
        let b = StockKey::new(facility, ProductId::new());

        assert_eq!(StockScope::covering([&a]), StockScope::pair(a));
        assert_eq!(StockScope::covering([&a, &a]).as_pair(), Some(a));
        assert_eq!(
            StockScope::covering([&a, &b]),
            StockScope::new(Some(facility), None)
        );
        assert_eq!(StockScope::covering(std::iter::empty()), StockScope::all());
    }
}
