//! Execution journal access.
//!
//! One row per leg, grouped by `group_id`. Rows are inserted PENDING
//! before any broker call, flipped to IN_PROGRESS when the group is
//! dispatched, and updated to a terminal status as each leg resolves.
//! Terminal rows (COMPLETED, FAILED) are never mutated again; the only
//! later touch is the startup recovery scan relabeling IN_PROGRESS rows
//! as REQUIRES_RECOVERY.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::debug;

use optrade_core::{JournalStatus, OperationType};

/// Leg fields captured at append time.
#[derive(Debug, Clone)]
pub struct NewJournalLeg {
    pub instrument: String,
    pub side: String,
    pub quantity: i64,
}

/// A journal row as stored.
#[derive(Debug, Clone)]
pub struct JournalRow {
    pub id: i64,
    pub group_id: String,
    pub strategy_id: String,
    pub operation_type: String,
    pub leg_index: i64,
    pub total_legs: i64,
    pub instrument: String,
    pub side: String,
    pub quantity: i64,
    pub broker_order_id: Option<String>,
    pub status: JournalStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct JournalStore {
    pool: SqlitePool,
}

impl JournalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts one PENDING row per leg under `group_id`.
    ///
    /// Must be awaited (durably committed) before the first broker call
    /// for any leg of the group.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails.
    pub async fn append_group(
        &self,
        group_id: &str,
        strategy_id: &str,
        operation_type: OperationType,
        legs: &[NewJournalLeg],
    ) -> Result<()> {
        let now = Utc::now();
        let total = i64::try_from(legs.len())?;

        for (index, leg) in legs.iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO execution_journal (
                    group_id, strategy_id, operation_type, leg_index, total_legs,
                    instrument, side, quantity, status, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'PENDING', ?9, ?9)
                ",
            )
            .bind(group_id)
            .bind(strategy_id)
            .bind(operation_type.as_str())
            .bind(i64::try_from(index)?)
            .bind(total)
            .bind(&leg.instrument)
            .bind(&leg.side)
            .bind(leg.quantity)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }

        debug!(group_id, legs = legs.len(), "Journal group appended");
        Ok(())
    }

    /// Flips the group's PENDING rows to IN_PROGRESS.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_group_in_progress(&self, group_id: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE execution_journal
            SET status = 'IN_PROGRESS', updated_at = ?2
            WHERE group_id = ?1 AND status = 'PENDING'
            ",
        )
        .bind(group_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a leg's terminal outcome. Atomic single-row update guarded
    /// so terminal rows are never rewritten.
    ///
    /// Returns `false` if the row was already terminal (update skipped).
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn record_leg_result(
        &self,
        group_id: &str,
        leg_index: i64,
        status: JournalStatus,
        broker_order_id: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE execution_journal
            SET status = ?3, broker_order_id = ?4, failure_reason = ?5, updated_at = ?6
            WHERE group_id = ?1 AND leg_index = ?2
              AND status NOT IN ('COMPLETED', 'FAILED')
            ",
        )
        .bind(group_id)
        .bind(leg_index)
        .bind(status.as_str())
        .bind(broker_order_id)
        .bind(failure_reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All rows of one group, ordered by leg index.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row has an unknown status.
    pub async fn group_rows(&self, group_id: &str) -> Result<Vec<JournalRow>> {
        let rows = sqlx::query(
            r"
            SELECT id, group_id, strategy_id, operation_type, leg_index, total_legs,
                   instrument, side, quantity, broker_order_id, status, failure_reason,
                   created_at, updated_at
            FROM execution_journal
            WHERE group_id = ?1
            ORDER BY leg_index ASC
            ",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_from).collect()
    }

    /// All rows written for one strategy, newest group first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row has an unknown status.
    pub async fn strategy_rows(&self, strategy_id: &str) -> Result<Vec<JournalRow>> {
        let rows = sqlx::query(
            r"
            SELECT id, group_id, strategy_id, operation_type, leg_index, total_legs,
                   instrument, side, quantity, broker_order_id, status, failure_reason,
                   created_at, updated_at
            FROM execution_journal
            WHERE strategy_id = ?1
            ORDER BY created_at DESC, leg_index ASC
            ",
        )
        .bind(strategy_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_from).collect()
    }

    /// Rows that need operator or recovery attention.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row has an unknown status.
    pub async fn unresolved(&self) -> Result<Vec<JournalRow>> {
        let rows = sqlx::query(
            r"
            SELECT id, group_id, strategy_id, operation_type, leg_index, total_legs,
                   instrument, side, quantity, broker_order_id, status, failure_reason,
                   created_at, updated_at
            FROM execution_journal
            WHERE status IN ('IN_PROGRESS', 'REQUIRES_RECOVERY')
            ORDER BY created_at ASC, leg_index ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_from).collect()
    }

    /// Startup scan: relabels every IN_PROGRESS row REQUIRES_RECOVERY and
    /// returns the affected group ids. Rows already REQUIRES_RECOVERY are
    /// untouched, so repeated scans are idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    pub async fn relabel_in_progress(&self) -> Result<Vec<String>> {
        let groups: Vec<String> = sqlx::query(
            r"
            SELECT DISTINCT group_id FROM execution_journal
            WHERE status = 'IN_PROGRESS'
            ORDER BY group_id
            ",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| row.get::<String, _>("group_id"))
        .collect();

        if groups.is_empty() {
            return Ok(groups);
        }

        sqlx::query(
            r"
            UPDATE execution_journal
            SET status = 'REQUIRES_RECOVERY', updated_at = ?1
            WHERE status = 'IN_PROGRESS'
            ",
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(groups)
    }

    fn row_from(row: &sqlx::sqlite::SqliteRow) -> Result<JournalRow> {
        let status_str: String = row.get("status");
        let status = JournalStatus::parse(&status_str)
            .ok_or_else(|| anyhow!("unknown journal status {status_str:?}"))?;
        Ok(JournalRow {
            id: row.get("id"),
            group_id: row.get("group_id"),
            strategy_id: row.get("strategy_id"),
            operation_type: row.get("operation_type"),
            leg_index: row.get("leg_index"),
            total_legs: row.get("total_legs"),
            instrument: row.get("instrument"),
            side: row.get("side"),
            quantity: row.get("quantity"),
            broker_order_id: row.get("broker_order_id"),
            status,
            failure_reason: row.get("failure_reason"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}
