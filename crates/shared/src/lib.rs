//! Shared identifiers, errors, and configuration for Stockbook.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for facilities, products, documents, movements and balances
//! - Application-wide error types
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, DatabaseConfig, LoggingConfig, RecalculationConfig};
pub use error::AppError;
