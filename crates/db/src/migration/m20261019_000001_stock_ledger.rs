//! Stock ledger schema.
//!
//! Creates the movement ledger and the derived daily balance snapshots.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(STOCK_LEDGER_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            r"
DROP TABLE IF EXISTS stock_balances CASCADE;
DROP TABLE IF EXISTS stock_movements CASCADE;
DROP TYPE IF EXISTS stock_direction;
",
        )
        .await?;
        Ok(())
    }
}

const STOCK_LEDGER_SQL: &str = r"
CREATE TYPE stock_direction AS ENUM ('income', 'outcome');

-- Append-mostly ledger; rows belong to exactly one originating document
CREATE TABLE stock_movements (
    id UUID PRIMARY KEY,
    facility_id UUID NOT NULL,
    product_id UUID NOT NULL,
    direction stock_direction NOT NULL,
    reference_type VARCHAR(32) NOT NULL,
    reference_id UUID NOT NULL,
    quantity NUMERIC(19, 4) NOT NULL,
    movement_date DATE NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_stock_movements_quantity_positive CHECK (quantity > 0)
);

CREATE INDEX idx_stock_movements_pair ON stock_movements(facility_id, product_id, movement_date);
CREATE INDEX idx_stock_movements_reference ON stock_movements(reference_id, reference_type);
CREATE INDEX idx_stock_movements_date ON stock_movements(movement_date);

-- Derived daily snapshots, written only by the recalculation engine
CREATE TABLE stock_balances (
    id UUID PRIMARY KEY,
    facility_id UUID NOT NULL,
    product_id UUID NOT NULL,
    day DATE NOT NULL,
    start_balance NUMERIC(19, 4) NOT NULL,
    income_balance NUMERIC(19, 4) NOT NULL,
    outcome_balance NUMERIC(19, 4) NOT NULL,
    finish_balance NUMERIC(19, 4) NOT NULL,
    CONSTRAINT uq_stock_balances_pair_day UNIQUE (facility_id, product_id, day),
    CONSTRAINT chk_stock_balances_finish
        CHECK (finish_balance = start_balance + income_balance - outcome_balance)
);

CREATE INDEX idx_stock_balances_day ON stock_balances(day);
";
