/// Conversation message log
///
/// Rows are only ever inserted. Reads return messages in insertion order.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use super::now_secs;

/// A persisted conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub model_used: Option<String>,
    pub token_count: Option<i64>,
    pub created_at: i64,
}

pub struct ConversationRepository {
    pool: SqlitePool,
}

const COLUMNS: &str = "id, conversation_id, role, content, model_used, token_count, created_at";

fn from_row(r: sqlx::sqlite::SqliteRow) -> StoredMessage {
    StoredMessage {
        id: r.get("id"),
        conversation_id: r.get("conversation_id"),
        role: r.get("role"),
        content: r.get("content"),
        model_used: r.get("model_used"),
        token_count: r.get("token_count"),
        created_at: r.get("created_at"),
    }
}

impl ConversationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one message and return its row id
    pub async fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        model_used: Option<&str>,
        token_count: Option<u64>,
    ) -> Result<i64> {
        let now = now_secs()?;
        let token_count = token_count.map(|t| t as i64);

        let result = sqlx::query(
            "INSERT INTO messages (conversation_id, role, content, model_used, token_count, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(role)
        .bind(content)
        .bind(model_used)
        .bind(token_count)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to append message")?;

        Ok(result.last_insert_rowid())
    }

    /// Every message of one conversation, oldest first
    pub async fn conversation(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM messages WHERE conversation_id = ? ORDER BY id ASC",
            COLUMNS
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch conversation")?;

        Ok(rows.into_iter().map(from_row).collect())
    }

    /// The last `limit` messages across all conversations, oldest first
    pub async fn recent_messages(&self, limit: i64) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM messages ORDER BY id DESC LIMIT ?",
            COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent messages")?;

        let mut messages: Vec<StoredMessage> = rows.into_iter().map(from_row).collect();
        messages.reverse();
        Ok(messages)
    }
}
