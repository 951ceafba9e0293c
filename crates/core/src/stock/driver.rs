//! Periodic balance refresh.
//!
//! Safety net behind the synchronous document paths: once per interval the
//! worker recalculates every pair forward from the day after the latest
//! persisted balance, or from the horizon of its previous pass if that is
//! earlier. The synchronous paths never snapshot the still-open day, and a
//! back-dated write for another pair can move the latest balance past it, so
//! every day is revisited once after it closes. A transient failure is
//! retried after a cooldown from the first day that was not committed.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use stockbook_shared::RecalculationConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::engine::RecalculationReport;
use super::error::StockError;
use super::service::StockService;
use super::store::StockStore;
use super::types::StockScope;

/// Counters returned when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Runs that reached the horizon or were cancelled cleanly.
    pub completed_runs: usize,
    /// Runs that failed.
    pub failed_runs: usize,
}

/// Background worker driving the daily recalculation.
pub struct BalanceRefreshWorker<S: StockStore> {
    service: Arc<StockService<S>>,
    interval: Duration,
    retry_cooldown: Duration,
    covered_until: Option<NaiveDate>,
}

impl<S: StockStore> BalanceRefreshWorker<S> {
    /// Creates a worker using the configured interval and cooldown.
    pub fn new(service: Arc<StockService<S>>, config: &RecalculationConfig) -> Self {
        Self::with_schedule(service, config.interval(), config.retry_cooldown())
    }

    /// Creates a worker with an explicit schedule.
    pub fn with_schedule(
        service: Arc<StockService<S>>,
        interval: Duration,
        retry_cooldown: Duration,
    ) -> Self {
        Self {
            service,
            interval,
            retry_cooldown,
            covered_until: None,
        }
    }

    /// Day the next regular pass starts from.
    ///
    /// The earlier of the last balance date and the horizon the previous
    /// completed pass reached. Before the first pass the lookback window
    /// stands in for that horizon.
    pub async fn next_anchor(&self) -> Result<NaiveDate, StockError> {
        let last = self.service.get_last_balance_date().await?;
        let covered = self
            .covered_until
            .unwrap_or_else(|| self.service.engine().lookback_start());
        Ok(last.min(covered))
    }

    /// Runs one pass, from `resume_from` or from [`Self::next_anchor`].
    pub async fn run_once(
        &mut self,
        resume_from: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> Result<RecalculationReport, StockError> {
        let anchor = match resume_from {
            Some(day) => day,
            None => self.next_anchor().await?,
        };
        let report = self
            .service
            .engine()
            .recalculate(anchor, StockScope::all(), cancel)
            .await?;
        if !report.cancelled {
            self.covered_until = Some(report.horizon);
        }
        Ok(report)
    }

    /// Runs passes until `cancel` fires. The first pass starts immediately.
    pub async fn run(mut self, cancel: CancellationToken) -> RefreshStats {
        let mut stats = RefreshStats::default();
        let mut resume_from = None;

        info!(
            interval_secs = self.interval.as_secs(),
            retry_cooldown_secs = self.retry_cooldown.as_secs(),
            "Balance refresh worker started"
        );

        loop {
            let wait = match self.run_once(resume_from, &cancel).await {
                Ok(report) => {
                    stats.completed_runs += 1;
                    resume_from = None;
                    if report.cancelled {
                        break;
                    }
                    self.interval
                }
                Err(err) if err.is_retryable() => {
                    stats.failed_runs += 1;
                    resume_from = err.resume_from().or(resume_from);
                    warn!(
                        error = %err,
                        resume_from = ?resume_from,
                        "Balance refresh failed, retrying after cooldown"
                    );
                    self.retry_cooldown
                }
                Err(err) => {
                    stats.failed_runs += 1;
                    resume_from = None;
                    error!(error = %err, "Balance refresh failed");
                    self.interval
                }
            };

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }
        }

        info!(
            completed = stats.completed_runs,
            failed = stats.failed_runs,
            "Balance refresh worker stopped"
        );
        stats
    }
}
