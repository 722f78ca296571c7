//! Liveness endpoint on its own port, kept off the webhook listener so a
//! wedged delivery path cannot take the health check down with it.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use replyflow_db::DbPool;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DatabaseHealth {
    pub status: &'static str,
    pub detail: String,
    /// Pending dead letters awaiting redelivery; absent when the query failed.
    pub redrive_backlog: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: DatabaseHealth,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn spawn(bind_address: &str, port: u16, db_pool: DbPool) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(db_pool)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                thread_id = "unknown",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

/// The backlog count doubles as the connectivity check: it touches a real
/// table and surfaces a queue that has stopped draining.
async fn database_check(pool: &DbPool) -> DatabaseHealth {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM dead_letter WHERE status = 'pending'")
        .fetch_one(pool)
        .await
    {
        Ok(backlog) => DatabaseHealth {
            status: "ready",
            detail: "database reachable".to_string(),
            redrive_backlog: Some(backlog),
        },
        Err(error) => DatabaseHealth {
            status: "degraded",
            detail: format!("database query failed: {error}"),
            redrive_backlog: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use chrono::Utc;

    use replyflow_db::repositories::{
        DeadLetter, DeadLetterId, DeadLetterRepository, SqlDeadLetterRepository,
    };
    use replyflow_db::{connect_with_settings, migrations, DbPool};

    use crate::health::{health, HealthState};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn health_reports_ready_with_the_redrive_backlog() {
        let pool = setup_pool().await;

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.redrive_backlog, Some(0));

        let repo = SqlDeadLetterRepository::new(pool.clone());
        repo.enqueue(DeadLetter::pending(
            DeadLetterId("DL-1".to_string()),
            "{}".to_string(),
            Utc::now(),
        ))
        .await
        .expect("enqueue");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.database.redrive_backlog, Some(1));

        pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_unavailable() {
        let pool = setup_pool().await;
        pool.close().await;

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert!(payload.database.redrive_backlog.is_none());
    }
}
