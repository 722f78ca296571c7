use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use replyflow_core::domain::action_log::{ActionLogEntry, ActionLogId};
use replyflow_core::domain::automation::Automation;
use replyflow_core::domain::contact::{AutoClassification, Contact};
use replyflow_core::domain::integration::{Integration, IntegrationId};
use replyflow_core::errors::DomainError;

pub mod action_log;
pub mod automation;
pub mod contact;
pub mod dead_letter;
pub mod integration;
pub mod memory;

pub use action_log::SqlActionLogRepository;
pub use automation::SqlAutomationRepository;
pub use contact::SqlContactRepository;
pub use dead_letter::{DeadLetter, DeadLetterId, DeadLetterStatus, SqlDeadLetterRepository};
pub use integration::SqlIntegrationRepository;
pub use memory::{
    InMemoryActionLogRepository, InMemoryAutomationRepository, InMemoryContactRepository,
    InMemoryDeadLetterRepository, InMemoryIntegrationRepository,
};

/// Hard ceiling on page size for the action-log listing endpoint.
pub const ACTION_LOG_LIST_LIMIT_MAX: u32 = 100;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[async_trait]
pub trait AutomationRepository: Send + Sync {
    /// Active automations for one owner, in deterministic storage order
    /// (`created_at`, then id). Trigger matching is first-match-wins, so
    /// this ordering is part of the contract.
    async fn list_active_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<Automation>, RepositoryError>;

    async fn save(&self, automation: Automation) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait IntegrationRepository: Send + Sync {
    async fn find_by_id(&self, id: &IntegrationId)
        -> Result<Option<Integration>, RepositoryError>;

    async fn find_by_external_user_id(
        &self,
        external_user_id: &str,
    ) -> Result<Option<Integration>, RepositoryError>;

    async fn save(&self, integration: Integration) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ActionLogRepository: Send + Sync {
    async fn append(&self, entry: ActionLogEntry) -> Result<(), RepositoryError>;

    /// Most recent entries for one owner, newest first. `limit` is clamped
    /// to [`ACTION_LOG_LIST_LIMIT_MAX`].
    async fn list_recent(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> Result<Vec<ActionLogEntry>, RepositoryError>;

    async fn get(
        &self,
        owner_id: &str,
        id: &ActionLogId,
    ) -> Result<Option<ActionLogEntry>, RepositoryError>;

    /// Flips a failed entry to sent after a successful redelivery. A no-op
    /// when the entry is already sent or does not exist, so redelivery
    /// retries stay idempotent.
    async fn mark_sent(
        &self,
        id: &ActionLogId,
        message_id: Option<String>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn find_by_thread(
        &self,
        owner_id: &str,
        thread_id: &str,
    ) -> Result<Option<Contact>, RepositoryError>;

    async fn save(&self, contact: Contact) -> Result<(), RepositoryError>;

    /// Records the classifier's verdict for a thread. An HRN verdict also
    /// raises the human-response gate; an auto-ok verdict writes only the
    /// classification fields, so it cannot clobber a concurrent mark-handled.
    /// Returns `false` when no contact exists for that thread.
    async fn record_classification(
        &self,
        owner_id: &str,
        thread_id: &str,
        classification: AutoClassification,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Clears the human-response gate for a thread. Returns `false` when no
    /// contact exists for that thread.
    async fn mark_handled(
        &self,
        owner_id: &str,
        thread_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait DeadLetterRepository: Send + Sync {
    async fn enqueue(&self, letter: DeadLetter) -> Result<(), RepositoryError>;

    /// Pending letters, oldest first, at most `limit` of them.
    async fn list_pending(&self, limit: u32) -> Result<Vec<DeadLetter>, RepositoryError>;

    async fn record_outcome(
        &self,
        id: &DeadLetterId,
        status: DeadLetterStatus,
        attempts: u32,
        last_error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}
