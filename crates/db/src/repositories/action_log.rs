use sqlx::{sqlite::SqliteRow, Row};

use replyflow_core::domain::action_log::{ActionKind, ActionLogEntry, ActionLogId, ActionResult};

use super::automation::parse_timestamp;
use super::{ActionLogRepository, RepositoryError, ACTION_LOG_LIST_LIMIT_MAX};
use crate::DbPool;

pub struct SqlActionLogRepository {
    pool: DbPool,
}

impl SqlActionLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = "SELECT
    id,
    owner_id,
    platform,
    thread_id,
    recipient_id,
    action,
    text,
    result,
    message_id,
    created_at
 FROM action_log";

#[async_trait::async_trait]
impl ActionLogRepository for SqlActionLogRepository {
    async fn append(&self, entry: ActionLogEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO action_log (
                id,
                owner_id,
                platform,
                thread_id,
                recipient_id,
                action,
                text,
                result,
                message_id,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id.0)
        .bind(&entry.owner_id)
        .bind(&entry.platform)
        .bind(&entry.thread_id)
        .bind(&entry.recipient_id)
        .bind(entry.action.as_str())
        .bind(&entry.text)
        .bind(entry.result.as_str())
        .bind(entry.message_id.as_deref())
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_recent(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> Result<Vec<ActionLogEntry>, RepositoryError> {
        let clamped = limit.clamp(1, ACTION_LOG_LIST_LIMIT_MAX);
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE owner_id = ? ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(owner_id)
        .bind(i64::from(clamped))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn get(
        &self,
        owner_id: &str,
        id: &ActionLogId,
    ) -> Result<Option<ActionLogEntry>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE owner_id = ? AND id = ?"))
            .bind(owner_id)
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(entry_from_row).transpose()
    }

    async fn mark_sent(
        &self,
        id: &ActionLogId,
        message_id: Option<String>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE action_log
             SET result = 'sent', message_id = COALESCE(?, message_id)
             WHERE id = ? AND result = 'failed'",
        )
        .bind(message_id.as_deref())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn entry_from_row(row: SqliteRow) -> Result<ActionLogEntry, RepositoryError> {
    let action_raw = row.try_get::<String, _>("action")?;
    let action = ActionKind::parse(&action_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown action kind `{action_raw}`")))?;

    let result_raw = row.try_get::<String, _>("result")?;
    let result = ActionResult::parse(&result_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown action result `{result_raw}`")))?;

    Ok(ActionLogEntry {
        id: ActionLogId(row.try_get("id")?),
        owner_id: row.try_get("owner_id")?,
        platform: row.try_get("platform")?,
        thread_id: row.try_get("thread_id")?,
        recipient_id: row.try_get("recipient_id")?,
        action,
        text: row.try_get("text")?,
        result,
        message_id: row.try_get("message_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
