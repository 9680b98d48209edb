// SPDX-License-Identifier: MIT

//! Daily API-call and cost budget, enforced as a single `BEGIN IMMEDIATE`
//! transaction per check so two runner processes sharing one SQLite file
//! never race a check-then-write.

use chrono::Utc;
use oj_core::OjError;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;

pub struct BudgetGate {
    conn: Connection,
    max_daily_api_calls: i64,
    max_daily_cost_usd: f64,
}

impl BudgetGate {
    pub fn open(db_path: &Path, max_daily_api_calls: i64, max_daily_cost_usd: f64) -> Result<Self, OjError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path).map_err(to_transient)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS budget_counters (
                day TEXT NOT NULL,
                worker_name TEXT NOT NULL,
                api_calls INTEGER NOT NULL,
                cost_usd REAL NOT NULL,
                PRIMARY KEY (day, worker_name)
            );",
        )
        .map_err(to_transient)?;
        Ok(Self { conn, max_daily_api_calls, max_daily_cost_usd })
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn open_in_memory(max_daily_api_calls: i64, max_daily_cost_usd: f64) -> Result<Self, OjError> {
        let conn = Connection::open_in_memory().map_err(to_transient)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS budget_counters (
                day TEXT NOT NULL,
                worker_name TEXT NOT NULL,
                api_calls INTEGER NOT NULL,
                cost_usd REAL NOT NULL,
                PRIMARY KEY (day, worker_name)
            );",
        )
        .map_err(to_transient)?;
        Ok(Self { conn, max_daily_api_calls, max_daily_cost_usd })
    }

    /// Atomically checks today's aggregate for `worker` against the
    /// configured daily maxima and, if it still fits, logs `calls`/`cost`
    /// against it. Returns `Err(OjError::BudgetExceeded)` without writing
    /// anything when the budget would be exceeded.
    pub fn check_and_log(&mut self, worker: &str, calls: i64, cost: f64) -> Result<(), OjError> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(to_transient)?;

        let existing: Option<(i64, f64)> = tx
            .query_row(
                "SELECT api_calls, cost_usd FROM budget_counters WHERE day = ?1 AND worker_name = ?2",
                (&today, worker),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(to_transient)?;

        let (used_calls, used_cost) = existing.unwrap_or((0, 0.0));
        let projected_calls = used_calls + calls;
        let projected_cost = used_cost + cost;

        if projected_calls > self.max_daily_api_calls || projected_cost > self.max_daily_cost_usd {
            return Err(OjError::BudgetExceeded(worker.to_string()));
        }

        tx.execute(
            "INSERT INTO budget_counters (day, worker_name, api_calls, cost_usd)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(day, worker_name) DO UPDATE SET
                api_calls = excluded.api_calls,
                cost_usd = excluded.cost_usd",
            (&today, worker, projected_calls, projected_cost),
        )
        .map_err(to_transient)?;

        tx.commit().map_err(to_transient)?;
        Ok(())
    }
}

fn to_transient(err: rusqlite::Error) -> OjError {
    OjError::TransientIo(err.to_string())
}

#[cfg(test)]
#[path = "budget_tests.rs"]
mod tests;
