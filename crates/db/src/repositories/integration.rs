use secrecy::ExposeSecret;
use sqlx::{sqlite::SqliteRow, Row};

use replyflow_core::domain::integration::{Integration, IntegrationId};

use super::automation::{parse_optional_timestamp, parse_timestamp, parse_u32};
use super::{IntegrationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlIntegrationRepository {
    pool: DbPool,
}

impl SqlIntegrationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = "SELECT
    id,
    owner_id,
    external_user_id,
    access_token,
    expires_at,
    sync_interval_hours,
    created_at,
    updated_at
 FROM integration";

#[async_trait::async_trait]
impl IntegrationRepository for SqlIntegrationRepository {
    async fn find_by_id(
        &self,
        id: &IntegrationId,
    ) -> Result<Option<Integration>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(integration_from_row).transpose()
    }

    async fn find_by_external_user_id(
        &self,
        external_user_id: &str,
    ) -> Result<Option<Integration>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE external_user_id = ?"))
            .bind(external_user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(integration_from_row).transpose()
    }

    async fn save(&self, integration: Integration) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO integration (
                id,
                owner_id,
                external_user_id,
                access_token,
                expires_at,
                sync_interval_hours,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                external_user_id = excluded.external_user_id,
                access_token = excluded.access_token,
                expires_at = excluded.expires_at,
                sync_interval_hours = excluded.sync_interval_hours,
                updated_at = excluded.updated_at",
        )
        .bind(&integration.id.0)
        .bind(&integration.owner_id)
        .bind(&integration.external_user_id)
        .bind(integration.access_token.expose_secret())
        .bind(integration.expires_at.map(|value| value.to_rfc3339()))
        .bind(i64::from(integration.sync_interval_hours))
        .bind(integration.created_at.to_rfc3339())
        .bind(integration.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn integration_from_row(row: SqliteRow) -> Result<Integration, RepositoryError> {
    Ok(Integration {
        id: IntegrationId(row.try_get("id")?),
        owner_id: row.try_get("owner_id")?,
        external_user_id: row.try_get("external_user_id")?,
        access_token: row.try_get::<String, _>("access_token")?.into(),
        expires_at: parse_optional_timestamp("expires_at", row.try_get("expires_at")?)?,
        sync_interval_hours: parse_u32(
            "sync_interval_hours",
            row.try_get("sync_interval_hours")?,
        )?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use secrecy::ExposeSecret;

    use replyflow_core::domain::integration::{Integration, IntegrationId};

    use super::SqlIntegrationRepository;
    use crate::migrations;
    use crate::repositories::IntegrationRepository;
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

    fn sample() -> Integration {
        Integration {
            id: IntegrationId("INT-1".to_string()),
            owner_id: "acct-1".to_string(),
            external_user_id: "ig-owner-1".to_string(),
            access_token: "tok-secret".to_string().into(),
            expires_at: Some(parse_ts("2026-06-01T00:00:00Z")),
            sync_interval_hours: 24,
            created_at: parse_ts("2026-02-23T12:00:00Z"),
            updated_at: parse_ts("2026-02-23T12:00:00Z"),
        }
    }

    #[tokio::test]
    async fn lookup_by_id_and_external_user_id() {
        let pool = setup_pool().await;
        let repo = SqlIntegrationRepository::new(pool.clone());

        repo.save(sample()).await.expect("save");

        let by_id = repo
            .find_by_id(&IntegrationId("INT-1".to_string()))
            .await
            .expect("find by id")
            .expect("present");
        assert_eq!(by_id.external_user_id, "ig-owner-1");
        assert_eq!(by_id.access_token.expose_secret(), "tok-secret");

        let by_external = repo
            .find_by_external_user_id("ig-owner-1")
            .await
            .expect("find by external id")
            .expect("present");
        assert_eq!(by_external.id, IntegrationId("INT-1".to_string()));

        let absent = repo.find_by_external_user_id("ig-unknown").await.expect("query");
        assert!(absent.is_none());

        pool.close().await;
    }

    #[tokio::test]
    async fn save_upserts_a_rotated_token() {
        let pool = setup_pool().await;
        let repo = SqlIntegrationRepository::new(pool.clone());

        repo.save(sample()).await.expect("save");

        let mut rotated = sample();
        rotated.access_token = "tok-rotated".to_string().into();
        rotated.updated_at = parse_ts("2026-02-24T12:00:00Z");
        repo.save(rotated).await.expect("update");

        let found = repo
            .find_by_id(&IntegrationId("INT-1".to_string()))
            .await
            .expect("find")
            .expect("present");
        assert_eq!(found.access_token.expose_secret(), "tok-rotated");
        assert_eq!(found.updated_at, parse_ts("2026-02-24T12:00:00Z"));

        pool.close().await;
    }
}
