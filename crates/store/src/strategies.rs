//! Deployed strategy configuration persistence.
//!
//! Configs are stored as a tagged JSON blob and decoded by strategy
//! type at the engine's persistence boundary.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use optrade_core::StrategyStatus;

#[derive(Debug, Clone)]
pub struct StrategyRecord {
    pub id: String,
    pub strategy_type: String,
    pub status: String,
    pub config_json: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct StrategyStore {
    pool: SqlitePool,
}

impl StrategyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts or updates a strategy record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert(&self, record: &StrategyRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO strategies (id, strategy_type, status, config_json, created_at, closed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                strategy_type = excluded.strategy_type,
                status = excluded.status,
                config_json = excluded.config_json,
                closed_at = excluded.closed_at
            ",
        )
        .bind(&record.id)
        .bind(&record.strategy_type)
        .bind(&record.status)
        .bind(&record.config_json)
        .bind(record.created_at)
        .bind(record.closed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates only the persisted status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn set_status(&self, id: &str, status: StrategyStatus) -> Result<()> {
        let closed_at = if status.is_terminal() { Some(Utc::now()) } else { None };
        sqlx::query("UPDATE strategies SET status = ?2, closed_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status.as_str())
            .bind(closed_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All strategies that have not reached CLOSED, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn load_open(&self) -> Result<Vec<StrategyRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, strategy_type, status, config_json, created_at, closed_at
            FROM strategies
            WHERE status != 'CLOSED'
            ORDER BY created_at ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| StrategyRecord {
                id: row.get("id"),
                strategy_type: row.get("strategy_type"),
                status: row.get("status"),
                config_json: row.get("config_json"),
                created_at: row.get("created_at"),
                closed_at: row.get("closed_at"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    fn record(id: &str, status: &str) -> StrategyRecord {
        StrategyRecord {
            id: id.to_string(),
            strategy_type: "short_strangle".to_string(),
            status: status.to_string(),
            config_json: r#"{"type":"short_strangle","underlying":"NIFTY"}"#.to_string(),
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    #[tokio::test]
    async fn load_open_excludes_closed_strategies() {
        let store = Store::connect_in_memory().await.unwrap();
        let strategies = store.strategies();

        strategies.upsert(&record("s1", "ACTIVE")).await.unwrap();
        strategies.upsert(&record("s2", "ARMED")).await.unwrap();
        strategies.upsert(&record("s3", "CLOSED")).await.unwrap();

        let open = strategies.load_open().await.unwrap();
        let ids: Vec<_> = open.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"s1"));
        assert!(ids.contains(&"s2"));
        assert!(!ids.contains(&"s3"));
    }

    #[tokio::test]
    async fn set_status_stamps_closed_at_on_terminal() {
        let store = Store::connect_in_memory().await.unwrap();
        let strategies = store.strategies();

        strategies.upsert(&record("s1", "ACTIVE")).await.unwrap();
        strategies.set_status("s1", StrategyStatus::Closed).await.unwrap();

        let open = strategies.load_open().await.unwrap();
        assert!(open.is_empty());
    }
}
