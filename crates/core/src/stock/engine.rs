//! Balance recalculation engine.
//!
//! Walks forward from an anchor date and re-derives every daily balance row
//! from the movement ledger. Each day depends on the finish of the previous
//! snapshot, so days are processed strictly in ascending order. Days without
//! movements or balance rows in scope are skipped; skipping them produces the
//! same rows as visiting them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use futures::{StreamExt, TryStreamExt, stream};
use rust_decimal::Decimal;
use stockbook_shared::RecalculationConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::clock::Clock;
use super::error::StockError;
use super::lock::ScopeLocks;
use super::store::{StockStore, StockUnitOfWork};
use super::types::{Balance, DailyTotals, StockKey, StockScope};

/// What one day of recalculation changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayOutcome {
    /// The recalculated day.
    pub day: NaiveDate,
    /// Balance rows written.
    pub upserted: usize,
    /// Stale balance rows deleted.
    pub removed: usize,
}

/// Summary of a recalculation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecalculationReport {
    /// First day considered.
    pub anchor: NaiveDate,
    /// First day not considered (exclusive upper bound).
    pub horizon: NaiveDate,
    /// Days that had movements or balance rows in scope.
    pub days_processed: usize,
    /// Balance rows written.
    pub upserted: usize,
    /// Stale balance rows deleted.
    pub removed: usize,
    /// Last day whose writes were applied.
    pub last_day: Option<NaiveDate>,
    /// The run stopped early because cancellation was requested.
    pub cancelled: bool,
}

impl RecalculationReport {
    fn new(anchor: NaiveDate, horizon: NaiveDate) -> Self {
        Self {
            anchor,
            horizon,
            days_processed: 0,
            upserted: 0,
            removed: 0,
            last_day: None,
            cancelled: false,
        }
    }

    fn record(&mut self, outcome: DayOutcome) {
        self.days_processed += 1;
        self.upserted += outcome.upserted;
        self.removed += outcome.removed;
        self.last_day = Some(outcome.day);
    }
}

/// Recomputes daily balances from the movement ledger.
pub struct RecalculationEngine<S: StockStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    locks: Arc<ScopeLocks>,
    config: RecalculationConfig,
}

impl<S: StockStore> RecalculationEngine<S> {
    /// Creates an engine with its own lock table.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: RecalculationConfig) -> Self {
        Self {
            store,
            clock,
            locks: Arc::new(ScopeLocks::new()),
            config,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The lock table serializing writers per stock pair.
    pub fn locks(&self) -> &Arc<ScopeLocks> {
        &self.locks
    }

    /// The engine configuration.
    pub fn config(&self) -> &RecalculationConfig {
        &self.config
    }

    /// The current business day.
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Exclusive upper bound of the walk.
    ///
    /// The still-open current day is left to the point-in-time resolver
    /// unless `snapshot_today` is set.
    pub fn horizon(&self) -> NaiveDate {
        let today = self.today();
        if self.config.snapshot_today {
            next_day(today)
        } else {
            today
        }
    }

    /// The day after the latest persisted balance, or
    /// `today - bootstrap_lookback_days` on an empty store.
    pub async fn last_balance_date(&self) -> Result<NaiveDate, StockError> {
        let mut uow = self.store.begin().await?;
        let latest = uow.latest_balance_day().await;
        uow.rollback().await?;

        Ok(match latest? {
            Some(day) => next_day(day),
            None => self.lookback_start(),
        })
    }

    /// `today - bootstrap_lookback_days`.
    pub fn lookback_start(&self) -> NaiveDate {
        self.today()
            .checked_sub_days(Days::new(u64::from(self.config.bootstrap_lookback_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Recalculates `scope` from `anchor` up to the horizon, committing each
    /// day in its own unit of work.
    ///
    /// Cancellation is checked between days; committed days stay committed.
    ///
    /// # Errors
    ///
    /// Returns `StockError::Interrupted` carrying the first uncommitted day.
    pub async fn recalculate(
        &self,
        anchor: NaiveDate,
        scope: StockScope,
        cancel: &CancellationToken,
    ) -> Result<RecalculationReport, StockError> {
        let _guard = self.locks.acquire(scope).await;
        let horizon = self.horizon();
        let mut report = RecalculationReport::new(anchor, horizon);
        let mut cursor = anchor;

        while cursor < horizon {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match self.commit_next_day(cursor, horizon, scope).await {
                Ok(Some(outcome)) => {
                    report.record(outcome);
                    cursor = next_day(outcome.day);
                }
                Ok(None) => break,
                Err(source) => {
                    return Err(StockError::Interrupted {
                        resume_from: cursor,
                        source: Box::new(source),
                    });
                }
            }
        }

        info!(
            %anchor,
            %horizon,
            days = report.days_processed,
            upserted = report.upserted,
            removed = report.removed,
            cancelled = report.cancelled,
            "Stock balances recalculated"
        );
        Ok(report)
    }

    /// Recalculates independent pairs concurrently, each under its own lock.
    pub async fn recalculate_pairs(
        &self,
        anchor: NaiveDate,
        keys: &[StockKey],
        cancel: &CancellationToken,
    ) -> Result<Vec<RecalculationReport>, StockError> {
        let limit = self.config.max_parallel_pairs.max(1);
        stream::iter(keys.iter().copied())
            .map(|key| self.recalculate(anchor, StockScope::pair(key), cancel))
            .buffer_unordered(limit)
            .try_collect()
            .await
    }

    /// Recalculates `scope` from `anchor` inside the caller's unit of work.
    ///
    /// Nothing is committed here; the caller commits together with its own
    /// movement writes. The caller must hold the scope lock.
    pub async fn recalculate_within<U: StockUnitOfWork>(
        &self,
        uow: &mut U,
        anchor: NaiveDate,
        scope: StockScope,
    ) -> Result<RecalculationReport, StockError> {
        let horizon = self.horizon();
        let mut report = RecalculationReport::new(anchor, horizon);
        let mut cursor = anchor;

        while cursor < horizon {
            let Some(day) = uow
                .next_active_day(cursor, scope)
                .await?
                .filter(|day| *day < horizon)
            else {
                break;
            };
            let outcome = recalculate_day(uow, day, scope).await?;
            report.record(outcome);
            cursor = next_day(day);
        }

        Ok(report)
    }

    async fn commit_next_day(
        &self,
        from: NaiveDate,
        horizon: NaiveDate,
        scope: StockScope,
    ) -> Result<Option<DayOutcome>, StockError> {
        let mut uow = self.store.begin().await?;
        let Some(day) = uow
            .next_active_day(from, scope)
            .await?
            .filter(|day| *day < horizon)
        else {
            uow.rollback().await?;
            return Ok(None);
        };

        let outcome = recalculate_day(&mut uow, day, scope).await?;
        uow.commit().await?;
        debug!(
            %day,
            upserted = outcome.upserted,
            removed = outcome.removed,
            "Stock balance day committed"
        );
        Ok(Some(outcome))
    }
}

/// Re-derives the balance rows of one day within `scope`.
///
/// 1. Sums the day's movements per pair and direction.
/// 2. Deletes rows of pairs that no longer have movements that day.
/// 3. Carries the latest earlier finish into `start` (0 without history).
/// 4. Upserts `finish = start + income - outcome`, keeping row identities.
pub async fn recalculate_day<U: StockUnitOfWork>(
    uow: &mut U,
    day: NaiveDate,
    scope: StockScope,
) -> Result<DayOutcome, StockError> {
    let movements = uow.movements_on(day, scope).await?;
    let totals = DailyTotals::aggregate(&movements);

    let mut removed = 0;
    let mut existing_ids = HashMap::new();
    for balance in uow.balances_on(day, scope).await? {
        if totals.contains_key(&balance.key()) {
            existing_ids.insert(balance.key(), balance.id);
        } else {
            uow.delete_balance(balance.id).await?;
            removed += 1;
        }
    }

    if totals.is_empty() {
        return Ok(DayOutcome {
            day,
            upserted: 0,
            removed,
        });
    }

    let previous: HashMap<StockKey, Decimal> = uow
        .latest_balances_before(day, scope)
        .await?
        .into_iter()
        .map(|balance| (balance.key(), balance.finish))
        .collect();

    for (key, day_totals) in &totals {
        let start = previous.get(key).copied().unwrap_or(Decimal::ZERO);
        let id = existing_ids.get(key).copied().unwrap_or_default();
        let balance = Balance::compute(id, *key, day, start, *day_totals);
        uow.upsert_balance(&balance).await?;
    }

    Ok(DayOutcome {
        day,
        upserted: totals.len(),
        removed,
    })
}

fn next_day(day: NaiveDate) -> NaiveDate {
    day.succ_opt().unwrap_or(NaiveDate::MAX)
}
