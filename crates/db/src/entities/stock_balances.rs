//! `SeaORM` Entity for stock_balances table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_balances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub facility_id: Uuid,
    pub product_id: Uuid,
    pub day: Date,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub start_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub income_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub outcome_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub finish_balance: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
