//! `SeaORM` active enums mapped to PostgreSQL enum types.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Direction of a stock movement (`stock_direction`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "stock_direction")]
pub enum StockDirection {
    /// Stock enters the facility.
    #[sea_orm(string_value = "income")]
    Income,
    /// Stock leaves the facility.
    #[sea_orm(string_value = "outcome")]
    Outcome,
}
