//! `SeaORM` entity prelude.

pub use super::stock_balances::Entity as StockBalances;
pub use super::stock_movements::Entity as StockMovements;
