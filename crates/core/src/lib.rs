//! Core business logic for Stockbook.
//!
//! This crate contains the stock ledger domain with ZERO web or database
//! dependencies. Storage is reached through the `StockStore` trait, which the
//! `stockbook-db` crate implements on PostgreSQL.
//!
//! # Modules
//!
//! - `stock` - Movement ledger, balance recalculation and point-in-time lookups

pub mod stock;
