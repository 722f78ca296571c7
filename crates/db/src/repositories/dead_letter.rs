use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use super::automation::{parse_timestamp, parse_u32};
use super::{DeadLetterRepository, RepositoryError};
use crate::DbPool;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeadLetterId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeadLetterStatus {
    Pending,
    Delivered,
    Abandoned,
    Failed,
}

impl DeadLetterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Abandoned => "abandoned",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "delivered" => Some(Self::Delivered),
            "abandoned" => Some(Self::Abandoned),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A queued send-failed payload awaiting asynchronous redelivery.
///
/// `payload_json` holds the encoded event; the re-driver decodes it and
/// re-fetches the channel credential by integration id at processing time.
#[derive(Clone, Debug, PartialEq)]
pub struct DeadLetter {
    pub id: DeadLetterId,
    pub payload_json: String,
    pub status: DeadLetterStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn pending(id: DeadLetterId, payload_json: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            payload_json,
            status: DeadLetterStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

pub struct SqlDeadLetterRepository {
    pool: DbPool,
}

impl SqlDeadLetterRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DeadLetterRepository for SqlDeadLetterRepository {
    async fn enqueue(&self, letter: DeadLetter) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO dead_letter (
                id,
                payload_json,
                status,
                attempts,
                last_error,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&letter.id.0)
        .bind(&letter.payload_json)
        .bind(letter.status.as_str())
        .bind(i64::from(letter.attempts))
        .bind(letter.last_error.as_deref())
        .bind(letter.created_at.to_rfc3339())
        .bind(letter.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_pending(&self, limit: u32) -> Result<Vec<DeadLetter>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                payload_json,
                status,
                attempts,
                last_error,
                created_at,
                updated_at
             FROM dead_letter
             WHERE status = 'pending'
             ORDER BY created_at ASC, id ASC
             LIMIT ?",
        )
        .bind(i64::from(limit.max(1)))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(letter_from_row).collect()
    }

    async fn record_outcome(
        &self,
        id: &DeadLetterId,
        status: DeadLetterStatus,
        attempts: u32,
        last_error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE dead_letter
             SET status = ?, attempts = ?, last_error = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(i64::from(attempts))
        .bind(last_error.as_deref())
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn letter_from_row(row: SqliteRow) -> Result<DeadLetter, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = DeadLetterStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown dead letter status `{status_raw}`"))
    })?;

    Ok(DeadLetter {
        id: DeadLetterId(row.try_get("id")?),
        payload_json: row.try_get("payload_json")?,
        status,
        attempts: parse_u32("attempts", row.try_get("attempts")?)?,
        last_error: row.try_get("last_error")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
