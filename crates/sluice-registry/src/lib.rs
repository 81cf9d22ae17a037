//! Declared-state registry backing the Lifecycle Controller, grounded on
//! `cmd/util.go`'s `ControlDB`: a single SQLite-backed `jobs` table that
//! the controller polls in full every tick and that CLI handlers mutate.
//!
//! The original's `jobs` table only distinguishes `staged`/`running`; this
//! implementation adds `stopping`/`stopped` so the controller (§4.8) and
//! `delete` (§6: "delete against a running pipeline first transitions it to
//! stopping and waits for stopped before removing") have a state to signal
//! and observe shutdown through.

use rusqlite::{params, Connection, OptionalExtension};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("no pipeline with id {0}")]
    NotFound(i64),
    #[error("invalid status value: {0}")]
    InvalidStatus(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Staged,
    Running,
    Stopping,
    Stopped,
}

impl PipelineStatus {
    fn as_str(self) -> &'static str {
        match self {
            PipelineStatus::Staged => "staged",
            PipelineStatus::Running => "running",
            PipelineStatus::Stopping => "stopping",
            PipelineStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PipelineStatus {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "staged" => Ok(PipelineStatus::Staged),
            "running" => Ok(PipelineStatus::Running),
            "stopping" => Ok(PipelineStatus::Stopping),
            "stopped" => Ok(PipelineStatus::Stopped),
            other => Err(RegistryError::InvalidStatus(other.to_string())),
        }
    }
}

/// A row of the `jobs` table, matching spec.md §3's Pipeline Record.
#[derive(Debug, Clone)]
pub struct PipelineRecord {
    pub id: i64,
    pub interval: i64,
    pub task_graph: String,
    pub spec: String,
    pub status: PipelineStatus,
    pub alive: bool,
}

/// SQLite-backed registry, matching `ControlDB`'s single `*sql.DB` handle.
/// `rusqlite::Connection` isn't `Send`-free-for-async by itself, so all
/// access is serialized behind a `Mutex` and callers on the async side
/// (the Lifecycle Controller) are expected to wrap calls in
/// `spawn_blocking` the way any synchronous SQLite driver requires.
pub struct SqliteRegistry {
    conn: Mutex<Connection>,
}

impl SqliteRegistry {
    /// Opens (creating if needed) the registry database and ensures the
    /// `jobs` table exists, mirroring `InitTables`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER NOT NULL PRIMARY KEY,
                interval INTEGER,
                task_graph TEXT,
                spec TEXT,
                status TEXT CHECK (status IN ('staged', 'running', 'stopping', 'stopped')),
                alive INTEGER
            )",
            [],
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Registers a new pipeline as staged, matching `AddHandler`.
    pub fn add(&self, spec_name: &str, task_graph: &str, interval: i64) -> Result<i64> {
        let conn = self.conn.lock().expect("registry mutex poisoned");
        conn.execute(
            "INSERT INTO jobs (interval, task_graph, spec, status, alive) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![interval, task_graph, spec_name, PipelineStatus::Staged.as_str(), 1],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Lists every pipeline record, matching `ListHandler`/the controller's
    /// per-tick full scan.
    pub fn list(&self) -> Result<Vec<PipelineRecord>> {
        let conn = self.conn.lock().expect("registry mutex poisoned");
        let mut stmt = conn.prepare("SELECT id, interval, task_graph, spec, status, alive FROM jobs")?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Looks up one pipeline by id, matching `DetailHandler`.
    pub fn detail(&self, id: i64) -> Result<Option<PipelineRecord>> {
        let conn = self.conn.lock().expect("registry mutex poisoned");
        conn.query_row(
            "SELECT id, interval, task_graph, spec, status, alive FROM jobs WHERE id = ?1",
            params![id],
            row_to_record,
        )
        .optional()
        .map_err(RegistryError::from)
    }

    pub fn set_status(&self, id: i64, status: PipelineStatus) -> Result<()> {
        let conn = self.conn.lock().expect("registry mutex poisoned");
        let affected = conn.execute(
            "UPDATE jobs SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        if affected == 0 {
            return Err(RegistryError::NotFound(id));
        }
        Ok(())
    }

    pub fn set_alive(&self, id: i64, alive: bool) -> Result<()> {
        let conn = self.conn.lock().expect("registry mutex poisoned");
        let affected = conn.execute("UPDATE jobs SET alive = ?1 WHERE id = ?2", params![alive as i64, id])?;
        if affected == 0 {
            return Err(RegistryError::NotFound(id));
        }
        Ok(())
    }

    /// Deletes a pipeline record outright. Per spec.md §6's delete policy,
    /// callers must first drive a running pipeline through
    /// stopping -> stopped (via `set_status`) before calling this; this
    /// method itself is a plain unconditional `DELETE`, matching
    /// `DeleteHandler`.
    pub fn delete(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().expect("registry mutex poisoned");
        conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<PipelineRecord> {
    let status_str: String = row.get(4)?;
    let status = PipelineStatus::from_str(&status_str).map_err(|_| {
        rusqlite::Error::InvalidColumnType(4, "status".into(), rusqlite::types::Type::Text)
    })?;
    let alive: i64 = row.get(5)?;
    Ok(PipelineRecord {
        id: row.get(0)?,
        interval: row.get(1)?,
        task_graph: row.get(2)?,
        spec: row.get(3)?,
        status,
        alive: alive != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> SqliteRegistry {
        let path = std::env::temp_dir().join(format!("sluice-registry-test-{}.db", uuid_like()));
        SqliteRegistry::open(path).unwrap()
    }

    fn uuid_like() -> String {
        format!("{:?}-{}", std::time::SystemTime::now(), std::process::id())
    }

    #[test]
    fn add_then_list_round_trips() {
        let reg = temp_db();
        let id = reg.add("pipe.json", "[]", 10).unwrap();
        let records = reg.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].status, PipelineStatus::Staged);
        assert!(records[0].alive);
    }

    #[test]
    fn status_transitions_and_delete() {
        let reg = temp_db();
        let id = reg.add("pipe.json", "[]", 10).unwrap();
        reg.set_status(id, PipelineStatus::Running).unwrap();
        assert_eq!(reg.detail(id).unwrap().unwrap().status, PipelineStatus::Running);

        reg.set_status(id, PipelineStatus::Stopping).unwrap();
        reg.set_status(id, PipelineStatus::Stopped).unwrap();
        reg.delete(id).unwrap();
        assert!(reg.detail(id).unwrap().is_none());
    }

    #[test]
    fn set_status_on_missing_id_errors() {
        let reg = temp_db();
        let err = reg.set_status(999, PipelineStatus::Running).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(999)));
    }
}
