//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database. The engine never executes
//! SQL; the runner moves data between the two.
//!
//! Dates are stored as `YYYY-MM-DD` text, structured values as JSON text.

use crate::{engine::RunStats, error::EngineResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

mod outputs;
mod profiles;
mod records;

pub struct PulseStore {
    conn: Connection,
    path: Option<String>, // None for :memory:
}

impl PulseStore {
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: Some(path.to_string()) })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Run log ────────────────────────────────────────────────

    /// Record one finished computation. Returns the new run id.
    pub fn record_run(
        &self,
        client_id: &str,
        reference_date: NaiveDate,
        computed_at: DateTime<Utc>,
        stats: &RunStats,
    ) -> EngineResult<String> {
        let run_id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO run (run_id, client_id, reference_date, computed_at, stats)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id,
                client_id,
                reference_date.to_string(),
                computed_at.to_rfc3339(),
                serde_json::to_string(stats)?,
            ],
        )?;
        Ok(run_id)
    }

    pub fn run_count(&self, client_id: &str) -> EngineResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM run WHERE client_id = ?1",
            params![client_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}
