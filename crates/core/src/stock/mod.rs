//! Stock movement ledger and daily balance snapshots.
//!
//! This module implements:
//! - Movement ledger (append, rewrite, delete per document)
//! - Daily balance recalculation from an anchor date forward
//! - Point-in-time balance lookups
//! - The service facade used by document handlers
//! - The periodic refresh worker
//! - Storage seams and an in-memory store

pub mod clock;
pub mod driver;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod memory;
pub mod resolver;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
mod engine_props;

pub use clock::{Clock, FixedClock, SystemClock};
pub use driver::{BalanceRefreshWorker, RefreshStats};
pub use engine::{DayOutcome, RecalculationEngine, RecalculationReport, recalculate_day};
pub use error::{ErrorKind, StockError};
pub use ledger::{MovementLedger, RewrittenMovements};
pub use lock::{PairGuard, ScopeGuard, ScopeLocks};
pub use memory::{InMemoryStockStore, InMemoryUnitOfWork};
pub use resolver::PointInTimeResolver;
pub use service::StockService;
pub use store::{StockStore, StockUnitOfWork};
pub use types::{
    Balance, DailyTotals, Direction, DocumentKind, Movement, MovementRewrite, NewMovement,
    PointBalance, Reference, StockKey, StockScope,
};
