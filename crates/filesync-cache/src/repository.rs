//! SQLite implementation of ITaskRepository
//!
//! ## Type Mapping
//!
//! | Domain Type     | SQL Type | Strategy                                  |
//! |-----------------|----------|-------------------------------------------|
//! | SpaceId, FileId | TEXT     | `.as_str()` / `::new()`                   |
//! | TaskKind        | TEXT     | `.as_str()` / `FromStr`                   |
//! | DateTime<Utc>   | TEXT     | ISO 8601 via `to_rfc3339()`               |
//! | bool            | INTEGER  | 0 / 1                                     |
//!
//! `Task::revision` is not stored; it only tracks in-process re-requests.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use filesync_core::domain::{FileId, SpaceId, Task, TaskKey, TaskKind};
use filesync_core::ports::ITaskRepository;

use crate::CacheError;

/// SQLite-backed storage for the sync task queue
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    /// Creates a new repository instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

/// Reconstruct a Task from a `sync_tasks` row
fn task_from_row(row: &SqliteRow) -> Result<Task, CacheError> {
    let space_str: String = row.get("space_id");
    let file_str: String = row.get("file_id");
    let kind_str: String = row.get("kind");
    let attempts: i64 = row.get("attempts");

    let space =
        SpaceId::new(space_str).map_err(|e| CacheError::SerializationError(e.to_string()))?;
    let file = FileId::new(file_str).map_err(|e| CacheError::SerializationError(e.to_string()))?;
    let kind = kind_str
        .parse::<TaskKind>()
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;

    Ok(Task {
        key: TaskKey::new(space, file, kind),
        seq: row.get("seq"),
        attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        enqueued_at: parse_datetime(&row.get::<String, _>("enqueued_at"))?,
        updated_at: parse_datetime(&row.get::<String, _>("updated_at"))?,
        next_attempt_at: parse_optional_datetime(row.get("next_attempt_at"))?,
        last_error: row.get("last_error"),
        dead_lettered: row.get::<i64, _>("dead_lettered") != 0,
        revision: 0,
    })
}

// ============================================================================
// ITaskRepository implementation
// ============================================================================

#[async_trait::async_trait]
impl ITaskRepository for SqliteTaskRepository {
    async fn load_all(&self) -> anyhow::Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM sync_tasks ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await?;

        let tasks = rows
            .iter()
            .map(task_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(count = tasks.len(), "Loaded persisted sync tasks");
        Ok(tasks)
    }

    async fn put(&self, task: &Task, replaces: Option<TaskKind>) -> anyhow::Result<()> {
        let space = task.key.space.as_str();
        let file = task.key.file.as_str();

        let mut tx = self.pool.begin().await?;

        if let Some(old_kind) = replaces {
            sqlx::query("DELETE FROM sync_tasks WHERE space_id = ? AND file_id = ? AND kind = ?")
                .bind(space)
                .bind(file)
                .bind(old_kind.as_str())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT OR REPLACE INTO sync_tasks \
             (space_id, file_id, kind, seq, attempts, enqueued_at, updated_at, \
              next_attempt_at, last_error, dead_lettered) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(space)
        .bind(file)
        .bind(task.kind().as_str())
        .bind(task.seq)
        .bind(i64::from(task.attempts))
        .bind(task.enqueued_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .bind(task.next_attempt_at.map(|dt| dt.to_rfc3339()))
        .bind(&task.last_error)
        .bind(i64::from(task.dead_lettered))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::trace!(task = %task.key, seq = task.seq, "Saved sync task");
        Ok(())
    }

    async fn delete(&self, key: &TaskKey) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sync_tasks WHERE space_id = ? AND file_id = ? AND kind = ?")
            .bind(key.space.as_str())
            .bind(key.file.as_str())
            .bind(key.kind.as_str())
            .execute(&self.pool)
            .await?;

        tracing::trace!(task = %key, "Deleted sync task");
        Ok(())
    }
}
