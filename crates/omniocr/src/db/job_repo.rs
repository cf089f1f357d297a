//! Job repository: CRUD operations for the `jobs` table.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub owner_id: String,
    pub file_name: String,
    pub file_size_bytes: i64,
    pub file_mime_type: String,
    pub engine: String,
    pub status: String,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub finished_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            file_name: row.get("file_name")?,
            file_size_bytes: row.get("file_size_bytes")?,
            file_mime_type: row.get("file_mime_type")?,
            engine: row.get("engine")?,
            status: row.get("status")?,
            result: row.get("result")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            finished_at: row.get("finished_at")?,
        })
    }
}

/// Fields written by a status transition.
#[derive(Debug, Clone)]
pub struct StatusUpdate<'a> {
    pub status: &'a str,
    pub result: Option<&'a str>,
    pub error: Option<&'a str>,
    pub updated_at: &'a str,
    pub finished_at: Option<&'a str>,
}

/// Inserts a new job row.
pub fn insert(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (id, owner_id, file_name, file_size_bytes, file_mime_type, engine,
         status, result, error, created_at, updated_at, finished_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            job.id,
            job.owner_id,
            job.file_name,
            job.file_size_bytes,
            job.file_mime_type,
            job.engine,
            job.status,
            job.result,
            job.error,
            job.created_at,
            job.updated_at,
            job.finished_at,
        ],
    )?;
    Ok(())
}

/// Finds a job by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM jobs WHERE id = ?1",
            params![id],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Lists jobs newest first (reverse insertion order), optionally for one owner.
pub fn list(conn: &Connection, owner_id: Option<&str>) -> Result<Vec<JobRow>, DatabaseError> {
    let rows = match owner_id {
        Some(owner) => {
            let mut stmt =
                conn.prepare("SELECT * FROM jobs WHERE owner_id = ?1 ORDER BY rowid DESC")?;
            let rows = stmt
                .query_map(params![owner], JobRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare("SELECT * FROM jobs ORDER BY rowid DESC")?;
            let rows = stmt
                .query_map([], JobRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

/// Lists jobs currently in the given status, oldest first.
pub fn find_by_status(conn: &Connection, status: &str) -> Result<Vec<JobRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM jobs WHERE status = ?1 ORDER BY rowid ASC")?;
    let rows = stmt
        .query_map(params![status], JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Applies a status update only if the job is still in `expected_status`.
///
/// Returns the number of rows changed (0 when the status moved on).
pub fn update_status_if(
    conn: &Connection,
    id: &str,
    expected_status: &str,
    update: &StatusUpdate<'_>,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = ?3, result = ?4, error = ?5, updated_at = ?6, finished_at = ?7
         WHERE id = ?1 AND status = ?2",
        params![
            id,
            expected_status,
            update.status,
            update.result,
            update.error,
            update.updated_at,
            update.finished_at,
        ],
    )?;
    Ok(changed)
}

/// Counts jobs grouped by status.
pub fn count_by_status(conn: &Connection) -> Result<Vec<(String, i64)>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Deletes a job. Its logs go with it (`ON DELETE CASCADE`).
pub fn delete(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}
