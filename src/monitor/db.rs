//! Read-only access to the Rocoto `jobs` table.

use crate::error::MonitorError;
use chrono::DateTime;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

/// One row of the Rocoto `jobs` table.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub taskname: String,
    /// Cycle formatted `%Y%m%d%H%M` (UTC).
    pub cycle: String,
    pub state: String,
    pub cores: i64,
    pub duration: f64,
}

impl JobRow {
    /// Key used for this job in an experiment record.
    pub fn key(&self) -> String {
        format!("{}_{}", self.taskname, self.cycle)
    }
}

/// Format a Rocoto cycle (unix seconds) the way task keys expect.
pub fn format_cycle(seconds: i64) -> String {
    match DateTime::from_timestamp(seconds, 0) {
        Some(dt) => dt.format("%Y%m%d%H%M").to_string(),
        None => seconds.to_string(),
    }
}

/// Read every job from the database at `path`.
pub fn read_jobs(path: &Path) -> Result<Vec<JobRow>, MonitorError> {
    let db_err = |source| MonitorError::Database {
        path: path.to_path_buf(),
        source,
    };
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(db_err)?;
    let mut stmt = conn
        .prepare("SELECT taskname, cycle, state, cores, duration FROM jobs")
        .map_err(db_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(JobRow {
                taskname: row.get(0)?,
                cycle: format_cycle(row.get(1)?),
                state: row.get(2)?,
                cores: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                duration: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
            })
        })
        .map_err(db_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
}
