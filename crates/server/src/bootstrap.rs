//! Wires configuration, storage, and outbound clients into runnable state.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use replyflow_agent::{HrnClassifier, HttpLlmClient, LlmClient, ReplyComposer};
use replyflow_core::config::AppConfig;
use replyflow_db::repositories::{
    SqlActionLogRepository, SqlAutomationRepository, SqlContactRepository,
    SqlDeadLetterRepository, SqlIntegrationRepository,
};
use replyflow_db::{connect, migrations, DbPool};
use replyflow_instagram::pipeline::TokioSleeper;
use replyflow_instagram::send::GraphSendTransport;

use crate::dashboard::DashboardState;
use crate::webhook::WebhookState;
use crate::worker::RedriveWorker;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub webhook_state: WebhookState,
    pub dashboard_state: DashboardState,
    pub redrive_worker: RedriveWorker,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("outbound client setup failed: {0}")]
    Client(String),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        "replyflow-server bootstrap starting"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;

    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        "database connection pool established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;

    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        "database migrations applied"
    );

    let llm: Arc<dyn LlmClient> = Arc::new(
        HttpLlmClient::new(config.llm.clone()).map_err(|error| BootstrapError::Client(error.to_string()))?,
    );
    let transport = Arc::new(
        GraphSendTransport::new(
            config.instagram.api_base_url.clone(),
            config.instagram.send_timeout_secs,
        )
        .map_err(|error| BootstrapError::Client(error.to_string()))?,
    );
    let sleeper = Arc::new(TokioSleeper);

    let automations = Arc::new(SqlAutomationRepository::new(db_pool.clone()));
    let integrations = Arc::new(SqlIntegrationRepository::new(db_pool.clone()));
    let action_log = Arc::new(SqlActionLogRepository::new(db_pool.clone()));
    let contacts = Arc::new(SqlContactRepository::new(db_pool.clone()));
    let dead_letters = Arc::new(SqlDeadLetterRepository::new(db_pool.clone()));

    let webhook_state = WebhookState {
        automations,
        integrations: integrations.clone(),
        action_log: action_log.clone(),
        contacts: contacts.clone(),
        dead_letters: dead_letters.clone(),
        transport: transport.clone(),
        sleeper: sleeper.clone(),
        composer: Arc::new(ReplyComposer::new(llm.clone())),
        classifier: Arc::new(HrnClassifier::new(llm)),
        app_secret: config.instagram.app_secret.clone(),
        verify_token: config.instagram.verify_token.clone(),
        inline_max_attempts: config.instagram.inline_max_attempts,
    };

    let dashboard_state = DashboardState { action_log: action_log.clone(), contacts };

    let redrive_worker = RedriveWorker::new(
        dead_letters,
        integrations,
        action_log,
        transport,
        sleeper,
        config.worker.batch_size,
        config.instagram.redrive_max_attempts,
    );

    Ok(Application { config, db_pool, webhook_state, dashboard_state, redrive_worker })
}
