use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use replyflow_core::domain::automation::{Automation, AutomationId, ResponseType, TriggerScope};
use replyflow_core::errors::DomainError;

use super::{AutomationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAutomationRepository {
    pool: DbPool,
}

impl SqlAutomationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AutomationRepository for SqlAutomationRepository {
    async fn list_active_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<Automation>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                owner_id,
                trigger_word,
                response_type,
                response_content,
                is_active,
                trigger_scope,
                comment_reply_count,
                comment_reply_text,
                expires_at,
                created_at,
                updated_at
             FROM automation
             WHERE owner_id = ? AND is_active = 1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(automation_from_row).collect()
    }

    async fn save(&self, automation: Automation) -> Result<(), RepositoryError> {
        let automation = automation.normalized_for_storage()?;
        sqlx::query(
            "INSERT INTO automation (
                id,
                owner_id,
                trigger_word,
                response_type,
                response_content,
                is_active,
                trigger_scope,
                comment_reply_count,
                comment_reply_text,
                expires_at,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                trigger_word = excluded.trigger_word,
                response_type = excluded.response_type,
                response_content = excluded.response_content,
                is_active = excluded.is_active,
                trigger_scope = excluded.trigger_scope,
                comment_reply_count = excluded.comment_reply_count,
                comment_reply_text = excluded.comment_reply_text,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
        )
        .bind(&automation.id.0)
        .bind(&automation.owner_id)
        .bind(&automation.trigger_word)
        .bind(automation.response_type.as_str())
        .bind(&automation.response_content)
        .bind(i64::from(automation.is_active))
        .bind(automation.trigger_scope.as_str())
        .bind(automation.comment_reply_count.map(i64::from))
        .bind(automation.comment_reply_text.as_deref())
        .bind(automation.expires_at.map(|value| value.to_rfc3339()))
        .bind(automation.created_at.to_rfc3339())
        .bind(automation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn automation_from_row(row: SqliteRow) -> Result<Automation, RepositoryError> {
    let response_type_raw = row.try_get::<String, _>("response_type")?;
    let response_type = ResponseType::parse(&response_type_raw)
        .ok_or_else(|| DomainError::UnknownResponseType(response_type_raw.clone()))?;

    let trigger_scope_raw = row.try_get::<Option<String>, _>("trigger_scope")?;
    let trigger_scope = TriggerScope::parse_or_legacy_default(trigger_scope_raw.as_deref());

    Ok(Automation {
        id: AutomationId(row.try_get("id")?),
        owner_id: row.try_get("owner_id")?,
        trigger_word: row.try_get("trigger_word")?,
        response_type,
        response_content: row.try_get("response_content")?,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        trigger_scope,
        comment_reply_count: row
            .try_get::<Option<i64>, _>("comment_reply_count")?
            .map(|value| parse_u32("comment_reply_count", value))
            .transpose()?,
        comment_reply_text: row.try_get("comment_reply_text")?,
        expires_at: parse_optional_timestamp("expires_at", row.try_get("expires_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}
