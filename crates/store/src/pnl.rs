//! Daily realized P&L counters.
//!
//! Persisted so risk limits keyed on the day's realized P&L survive a
//! restart; restored by the startup recovery procedure.

use std::str::FromStr;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

#[derive(Clone)]
pub struct PnlStore {
    pool: SqlitePool,
}

impl PnlStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upserts the realized P&L counter for `day`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn record_day(&self, day: NaiveDate, realized_pnl: Decimal) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO daily_pnl (day, realized_pnl, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(day) DO UPDATE SET
                realized_pnl = excluded.realized_pnl,
                updated_at = excluded.updated_at
            ",
        )
        .bind(day.to_string())
        .bind(realized_pnl.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Realized P&L for `day`, if a counter was persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored value is malformed.
    pub async fn load_day(&self, day: NaiveDate) -> Result<Option<Decimal>> {
        let row = sqlx::query("SELECT realized_pnl FROM daily_pnl WHERE day = ?1")
            .bind(day.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("realized_pnl");
                Ok(Some(Decimal::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }
}
