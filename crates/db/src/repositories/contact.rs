use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use replyflow_core::domain::contact::{AutoClassification, Contact, ContactId};

use super::automation::{parse_optional_timestamp, parse_timestamp};
use super::{ContactRepository, RepositoryError};
use crate::DbPool;

pub struct SqlContactRepository {
    pool: DbPool,
}

impl SqlContactRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ContactRepository for SqlContactRepository {
    async fn find_by_thread(
        &self,
        owner_id: &str,
        thread_id: &str,
    ) -> Result<Option<Contact>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                owner_id,
                thread_id,
                platform_user_id,
                requires_human_response,
                human_response_set_at,
                last_auto_classification,
                created_at,
                updated_at
             FROM contact
             WHERE owner_id = ? AND thread_id = ?",
        )
        .bind(owner_id)
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(contact_from_row).transpose()
    }

    async fn save(&self, contact: Contact) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO contact (
                id,
                owner_id,
                thread_id,
                platform_user_id,
                requires_human_response,
                human_response_set_at,
                last_auto_classification,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(owner_id, thread_id) DO UPDATE SET
                platform_user_id = excluded.platform_user_id,
                requires_human_response = excluded.requires_human_response,
                human_response_set_at = excluded.human_response_set_at,
                last_auto_classification = excluded.last_auto_classification,
                updated_at = excluded.updated_at",
        )
        .bind(&contact.id.0)
        .bind(&contact.owner_id)
        .bind(&contact.thread_id)
        .bind(&contact.platform_user_id)
        .bind(i64::from(contact.requires_human_response))
        .bind(contact.human_response_set_at.map(|value| value.to_rfc3339()))
        .bind(contact.last_auto_classification.map(|value| value.as_str()))
        .bind(contact.created_at.to_rfc3339())
        .bind(contact.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_classification(
        &self,
        owner_id: &str,
        thread_id: &str,
        classification: AutoClassification,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let outcome = match classification {
            AutoClassification::Hrn => {
                sqlx::query(
                    "UPDATE contact
                     SET requires_human_response = 1,
                         human_response_set_at = ?,
                         last_auto_classification = ?,
                         updated_at = ?
                     WHERE owner_id = ? AND thread_id = ?",
                )
                .bind(now.to_rfc3339())
                .bind(classification.as_str())
                .bind(now.to_rfc3339())
                .bind(owner_id)
                .bind(thread_id)
                .execute(&self.pool)
                .await?
            }
            AutoClassification::AutoOk => {
                sqlx::query(
                    "UPDATE contact
                     SET last_auto_classification = ?, updated_at = ?
                     WHERE owner_id = ? AND thread_id = ?",
                )
                .bind(classification.as_str())
                .bind(now.to_rfc3339())
                .bind(owner_id)
                .bind(thread_id)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(outcome.rows_affected() > 0)
    }

    async fn mark_handled(
        &self,
        owner_id: &str,
        thread_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let outcome = sqlx::query(
            "UPDATE contact
             SET requires_human_response = 0, updated_at = ?
             WHERE owner_id = ? AND thread_id = ?",
        )
        .bind(now.to_rfc3339())
        .bind(owner_id)
        .bind(thread_id)
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() > 0)
    }
}

fn contact_from_row(row: SqliteRow) -> Result<Contact, RepositoryError> {
    let classification = row
        .try_get::<Option<String>, _>("last_auto_classification")?
        .map(|value| {
            AutoClassification::parse(&value).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown auto classification `{value}`"))
            })
        })
        .transpose()?;

    Ok(Contact {
        id: ContactId(row.try_get("id")?),
        owner_id: row.try_get("owner_id")?,
        thread_id: row.try_get("thread_id")?,
        platform_user_id: row.try_get("platform_user_id")?,
        requires_human_response: row.try_get::<i64, _>("requires_human_response")? != 0,
        human_response_set_at: parse_optional_timestamp(
            "human_response_set_at",
            row.try_get("human_response_set_at")?,
        )?,
        last_auto_classification: classification,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use replyflow_core::domain::contact::{AutoClassification, Contact, ContactId};

    use super::SqlContactRepository;
    use crate::migrations;
    use crate::repositories::ContactRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn sample() -> Contact {
        let now = parse_ts("2026-02-23T12:00:00Z");
        Contact {
            id: ContactId("CT-1".to_string()),
            owner_id: "acct-1".to_string(),
            thread_id: "t-100".to_string(),
            platform_user_id: "ig-900".to_string(),
            requires_human_response: false,
            human_response_set_at: None,
            last_auto_classification: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn save_upserts_by_owner_and_thread() {
        let pool = setup_pool().await;
        let repo = SqlContactRepository::new(pool.clone());

        repo.save(sample()).await.expect("save");

        let mut flagged = sample();
        flagged.require_human(parse_ts("2026-02-23T12:10:00Z"));
        repo.save(flagged).await.expect("upsert");

        let found =
            repo.find_by_thread("acct-1", "t-100").await.expect("find").expect("present");
        assert!(found.requires_human_response);
        assert_eq!(found.last_auto_classification, Some(AutoClassification::Hrn));
        assert_eq!(found.human_response_set_at, Some(parse_ts("2026-02-23T12:10:00Z")));

        pool.close().await;
    }

    #[tokio::test]
    async fn auto_ok_classification_touches_only_the_classification_fields() {
        let pool = setup_pool().await;
        let repo = SqlContactRepository::new(pool.clone());

        let mut flagged = sample();
        flagged.require_human(parse_ts("2026-02-23T12:10:00Z"));
        repo.save(flagged).await.expect("save");

        // The human clears the gate while a classification is in flight.
        repo.mark_handled("acct-1", "t-100", parse_ts("2026-02-23T12:15:00Z"))
            .await
            .expect("mark handled");

        let updated = repo
            .record_classification(
                "acct-1",
                "t-100",
                AutoClassification::AutoOk,
                parse_ts("2026-02-23T12:16:00Z"),
            )
            .await
            .expect("record classification");
        assert!(updated);

        let found =
            repo.find_by_thread("acct-1", "t-100").await.expect("find").expect("present");
        assert!(!found.requires_human_response);
        assert_eq!(found.last_auto_classification, Some(AutoClassification::AutoOk));

        pool.close().await;
    }

    #[tokio::test]
    async fn hrn_classification_raises_the_gate_and_reports_missing_threads() {
        let pool = setup_pool().await;
        let repo = SqlContactRepository::new(pool.clone());
        repo.save(sample()).await.expect("save");

        let updated = repo
            .record_classification(
                "acct-1",
                "t-100",
                AutoClassification::Hrn,
                parse_ts("2026-02-23T12:20:00Z"),
            )
            .await
            .expect("record classification");
        assert!(updated);

        let found =
            repo.find_by_thread("acct-1", "t-100").await.expect("find").expect("present");
        assert!(found.requires_human_response);
        assert_eq!(found.human_response_set_at, Some(parse_ts("2026-02-23T12:20:00Z")));
        assert_eq!(found.last_auto_classification, Some(AutoClassification::Hrn));

        let missing = repo
            .record_classification(
                "acct-1",
                "t-unknown",
                AutoClassification::AutoOk,
                parse_ts("2026-02-23T12:20:00Z"),
            )
            .await
            .expect("record classification missing");
        assert!(!missing);

        pool.close().await;
    }

    #[tokio::test]
    async fn mark_handled_clears_the_gate_and_reports_missing_threads() {
        let pool = setup_pool().await;
        let repo = SqlContactRepository::new(pool.clone());

        let mut flagged = sample();
        flagged.require_human(parse_ts("2026-02-23T12:10:00Z"));
        repo.save(flagged).await.expect("save");

        let cleared = repo
            .mark_handled("acct-1", "t-100", parse_ts("2026-02-23T13:00:00Z"))
            .await
            .expect("mark handled");
        assert!(cleared);

        let found =
            repo.find_by_thread("acct-1", "t-100").await.expect("find").expect("present");
        assert!(!found.requires_human_response);
        // The audit timestamp survives the gate being cleared.
        assert_eq!(found.human_response_set_at, Some(parse_ts("2026-02-23T12:10:00Z")));

        let missing = repo
            .mark_handled("acct-1", "t-unknown", parse_ts("2026-02-23T13:00:00Z"))
            .await
            .expect("mark handled missing");
        assert!(!missing);

        pool.close().await;
    }
}
