/// Job lifecycle log
///
/// An append-only projection of the in-memory job store, keyed by the same
/// job ids. Never consulted for live status.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use super::now_secs;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobEventKind {
    Created,
    Updated,
}

impl JobEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            JobEventKind::Created => "created",
            JobEventKind::Updated => "updated",
        }
    }
}

/// One persisted lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: i64,
    pub job_id: String,
    pub kind: JobEventKind,
    pub status: String,
    pub progress: Option<f64>,
    pub message: String,
    pub created_at: i64,
}

pub struct JobEventRepository {
    pool: SqlitePool,
}

impl JobEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append_event(
        &self,
        job_id: &str,
        kind: JobEventKind,
        status: &str,
        progress: Option<f64>,
        message: &str,
    ) -> Result<i64> {
        let now = now_secs()?;

        let result = sqlx::query(
            "INSERT INTO job_events (job_id, kind, status, progress, message, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(job_id)
        .bind(kind.as_str())
        .bind(status)
        .bind(progress)
        .bind(message)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to append job event")?;

        Ok(result.last_insert_rowid())
    }

    /// Every event of one job in the order it was recorded
    pub async fn events_for_job(&self, job_id: &str) -> Result<Vec<JobEvent>> {
        let rows = sqlx::query(
            "SELECT id, job_id, kind, status, progress, message, created_at \
             FROM job_events WHERE job_id = ? ORDER BY id ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch job events")?;

        Ok(rows
            .into_iter()
            .map(|r| JobEvent {
                id: r.get("id"),
                job_id: r.get("job_id"),
                kind: match r.get::<String, _>("kind").as_str() {
                    "created" => JobEventKind::Created,
                    _ => JobEventKind::Updated,
                },
                status: r.get("status"),
                progress: r.get("progress"),
                message: r.get("message"),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}
