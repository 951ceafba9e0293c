//! Repository implementations for data access.

pub mod stock;

pub use stock::{SeaStockStore, SeaStockUnitOfWork};
