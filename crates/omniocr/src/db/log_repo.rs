//! Log repository: append and read operations for the `job_logs` table.
//!
//! There is deliberately no update or delete here; rows disappear only when
//! their job is deleted.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw log row from the database.
#[derive(Debug, Clone)]
pub struct LogRow {
    pub id: String,
    pub job_id: String,
    pub level: String,
    pub message: String,
    pub created_at: String,
}

impl LogRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            level: row.get("level")?,
            message: row.get("message")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Appends a log row.
pub fn insert(conn: &Connection, log: &LogRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO job_logs (id, job_id, level, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![log.id, log.job_id, log.level, log.message, log.created_at],
    )?;
    Ok(())
}

/// Lists a job's logs in append order.
pub fn list_for_job(conn: &Connection, job_id: &str) -> Result<Vec<LogRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, job_id, level, message, created_at FROM job_logs
         WHERE job_id = ?1 ORDER BY seq ASC",
    )?;
    let rows = stmt
        .query_map(params![job_id], LogRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Returns the `created_at` of the most recent log row for a job.
pub fn latest_created_at(conn: &Connection, job_id: &str) -> Result<Option<String>, DatabaseError> {
    let latest = conn
        .query_row(
            "SELECT created_at FROM job_logs WHERE job_id = ?1 ORDER BY seq DESC LIMIT 1",
            params![job_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(latest)
}
