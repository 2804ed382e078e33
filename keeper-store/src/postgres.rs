//! PostgreSQL store implementation (feature `postgres`)
//!
//! One row per position; the terminal exit record is stored as JSONB so the
//! document-shaped `exit_data` round-trips without a schema change per field.
//! The table name comes from configuration (the "collection" for open
//! positions), so all queries are built at runtime.

use crate::error::StoreError;
use crate::repository::{HistoryFilter, PositionStore};
use async_trait::async_trait;
use keeper_domain::{
    Amount, ExitData, MonitoredPosition, PositionId, PositionStatus, Price, Side, TokenSymbol,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

/// PostgreSQL-backed position store.
pub struct PgPositionStore {
    pool: PgPool,
    table: String,
}

impl PgPositionStore {
    /// Create a store over an existing pool and table name.
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self { pool, table: table.into() }
    }

    /// Get a reference to the underlying pool (for testing).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the positions table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id UUID PRIMARY KEY,
                trade_id VARCHAR(128) NOT NULL,
                user_id VARCHAR(128) NOT NULL,
                safe_address VARCHAR(128) NOT NULL,
                network_key VARCHAR(64) NOT NULL,
                token_symbol VARCHAR(32) NOT NULL,
                side VARCHAR(8) NOT NULL,
                entry_price DECIMAL(30, 12) NOT NULL,
                entry_amount DECIMAL(30, 12) NOT NULL,
                tp1 DECIMAL(30, 12) NOT NULL,
                tp2 DECIMAL(30, 12) NOT NULL,
                sl DECIMAL(30, 12) NOT NULL,
                max_exit_time TIMESTAMPTZ NOT NULL,
                entry_tx_hash VARCHAR(128),
                status VARCHAR(16) NOT NULL,
                current_price DECIMAL(30, 12),
                highest_favorable_price DECIMAL(30, 12) NOT NULL,
                trailing_stop_price DECIMAL(30, 12) NOT NULL,
                trailing_stop_enabled BOOLEAN NOT NULL,
                price_check_count BIGINT NOT NULL,
                last_price_check TIMESTAMPTZ,
                executed_at TIMESTAMPTZ NOT NULL,
                exit_data JSONB,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            table = self.table
        );

        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_position(&self, row: &PgRow) -> Result<MonitoredPosition, StoreError> {
        let side_str: String = row.try_get("side")?;
        let side = Side::parse(&side_str)
            .ok_or_else(|| StoreError::Deserialization(format!("Invalid side: {}", side_str)))?;

        let status_str: String = row.try_get("status")?;
        let status = match status_str.as_str() {
            "active" => PositionStatus::Active,
            "exited" => PositionStatus::Exited,
            "failed" => PositionStatus::Failed,
            other => {
                return Err(StoreError::Deserialization(format!("Invalid status: {}", other)))
            },
        };

        let token: String = row.try_get("token_symbol")?;
        let token_symbol = TokenSymbol::new(&token)
            .map_err(|e| StoreError::Deserialization(format!("Invalid token symbol: {}", e)))?;

        let entry_price = Price::new(row.try_get("entry_price")?)
            .map_err(|e| StoreError::Deserialization(format!("Invalid entry_price: {}", e)))?;
        let entry_amount = Amount::new(row.try_get("entry_amount")?)
            .map_err(|e| StoreError::Deserialization(format!("Invalid entry_amount: {}", e)))?;
        let tp1 = Price::new(row.try_get("tp1")?)
            .map_err(|e| StoreError::Deserialization(format!("Invalid tp1: {}", e)))?;
        let tp2 = Price::new(row.try_get("tp2")?)
            .map_err(|e| StoreError::Deserialization(format!("Invalid tp2: {}", e)))?;
        let sl = Price::new(row.try_get("sl")?)
            .map_err(|e| StoreError::Deserialization(format!("Invalid sl: {}", e)))?;

        let current_price = row
            .try_get::<Option<rust_decimal::Decimal>, _>("current_price")?
            .map(|p| {
                Price::new(p)
                    .map_err(|e| StoreError::Deserialization(format!("Invalid current_price: {}", e)))
            })
            .transpose()?;

        let exit_data = row
            .try_get::<Option<serde_json::Value>, _>("exit_data")?
            .map(|value| {
                serde_json::from_value::<ExitData>(value)
                    .map_err(|e| StoreError::Deserialization(format!("Invalid exit_data: {}", e)))
            })
            .transpose()?;

        let price_check_count: i64 = row.try_get("price_check_count")?;

        Ok(MonitoredPosition {
            id: row.try_get("id")?,
            trade_id: row.try_get("trade_id")?,
            user_id: row.try_get("user_id")?,
            safe_address: row.try_get("safe_address")?,
            network_key: row.try_get("network_key")?,
            token_symbol,
            side,
            entry_price,
            entry_amount,
            tp1,
            tp2,
            sl,
            max_exit_time: row.try_get("max_exit_time")?,
            entry_tx_hash: row.try_get("entry_tx_hash")?,
            status,
            current_price,
            highest_favorable_price: Price::from(
                row.try_get::<rust_decimal::Decimal, _>("highest_favorable_price")?,
            ),
            trailing_stop_price: Price::from(
                row.try_get::<rust_decimal::Decimal, _>("trailing_stop_price")?,
            ),
            trailing_stop_enabled: row.try_get("trailing_stop_enabled")?,
            price_check_count: price_check_count.max(0) as u64,
            last_price_check: row.try_get("last_price_check")?,
            executed_at: row.try_get("executed_at")?,
            exit_data,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl PositionStore for PgPositionStore {
    async fn insert(&self, position: &MonitoredPosition) -> Result<PositionId, StoreError> {
        let exit_data = position
            .exit_data
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let sql = format!(
            r#"
            INSERT INTO {table} (
                id, trade_id, user_id, safe_address, network_key,
                token_symbol, side, entry_price, entry_amount,
                tp1, tp2, sl, max_exit_time, entry_tx_hash, status,
                current_price, highest_favorable_price, trailing_stop_price,
                trailing_stop_enabled, price_check_count, last_price_check,
                executed_at, exit_data, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25
            )
            "#,
            table = self.table
        );

        sqlx::query(&sql)
            .bind(position.id)
            .bind(&position.trade_id)
            .bind(&position.user_id)
            .bind(&position.safe_address)
            .bind(&position.network_key)
            .bind(position.token_symbol.as_str())
            .bind(position.side.to_string())
            .bind(position.entry_price.as_decimal())
            .bind(position.entry_amount.as_decimal())
            .bind(position.tp1.as_decimal())
            .bind(position.tp2.as_decimal())
            .bind(position.sl.as_decimal())
            .bind(position.max_exit_time)
            .bind(&position.entry_tx_hash)
            .bind(position.status.as_str())
            .bind(position.current_price.map(|p| p.as_decimal()))
            .bind(position.highest_favorable_price.as_decimal())
            .bind(position.trailing_stop_price.as_decimal())
            .bind(position.trailing_stop_enabled)
            .bind(position.price_check_count as i64)
            .bind(position.last_price_check)
            .bind(position.executed_at)
            .bind(exit_data)
            .bind(position.created_at)
            .bind(position.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(position.id)
    }

    async fn find_by_id(&self, id: PositionId) -> Result<Option<MonitoredPosition>, StoreError> {
        let sql = format!("SELECT * FROM {table} WHERE id = $1", table = self.table);

        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(|r| self.row_to_position(&r)).transpose()
    }

    async fn find_by_trade_id(
        &self,
        trade_id: &str,
    ) -> Result<Option<MonitoredPosition>, StoreError> {
        let sql = format!(
            r#"
            SELECT * FROM {table}
            WHERE trade_id = $1
            ORDER BY (status = 'active') DESC, created_at DESC
            LIMIT 1
            "#,
            table = self.table
        );

        let row = sqlx::query(&sql).bind(trade_id).fetch_optional(&self.pool).await?;
        row.map(|r| self.row_to_position(&r)).transpose()
    }

    async fn list_active(&self) -> Result<Vec<MonitoredPosition>, StoreError> {
        let sql = format!(
            "SELECT * FROM {table} WHERE status = 'active' ORDER BY created_at ASC",
            table = self.table
        );

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(|r| self.row_to_position(r)).collect()
    }

    async fn update_status(
        &self,
        id: PositionId,
        status: PositionStatus,
        exit_data: ExitData,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(&exit_data)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let sql = format!(
            "UPDATE {table} SET status = $2, exit_data = $3, updated_at = NOW() WHERE id = $1",
            table = self.table
        );

        let result = sqlx::query(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(value)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("position", id.to_string()));
        }

        Ok(())
    }

    async fn history(&self, filter: HistoryFilter) -> Result<Vec<MonitoredPosition>, StoreError> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT * FROM {table} WHERE status <> 'active'",
            table = self.table
        ));

        if let Some(status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(user_id) = &filter.user_id {
            builder.push(" AND user_id = ");
            builder.push_bind(user_id.clone());
        }
        if let Some(symbol) = &filter.token_symbol {
            builder.push(" AND token_symbol = ");
            builder.push_bind(symbol.to_uppercase());
        }

        builder.push(" ORDER BY updated_at DESC");

        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(|r| self.row_to_position(r)).collect()
    }
}
