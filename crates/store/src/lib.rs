//! SQLite persistence for the engine's durable state.
//!
//! Holds the execution journal (the WAL the multi-leg executor writes
//! ahead of every broker call), deployed strategy configurations, and
//! daily P&L counters. The store is pure data access; all behavior
//! lives in the executor and the recovery procedure.

pub mod journal;
pub mod pnl;
pub mod strategies;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

pub use journal::{JournalStore, JournalRow, NewJournalLeg};
pub use pnl::PnlStore;
pub use strategies::{StrategyRecord, StrategyStore};

/// Shared handle over one SQLite pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if missing) the database at `url` and runs migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or migrations fail.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// In-memory database for tests. Single connection, since each
    /// in-memory connection is its own database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or migrations fail.
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn journal(&self) -> JournalStore {
        JournalStore::new(self.pool.clone())
    }

    pub fn strategies(&self) -> StrategyStore {
        StrategyStore::new(self.pool.clone())
    }

    pub fn pnl(&self) -> PnlStore {
        PnlStore::new(self.pool.clone())
    }
}
