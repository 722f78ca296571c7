//! Dead-letter re-driver.
//!
//! Polls the queue for pending send-failed payloads and retries the direct
//! message with a fresh credential, looked up by integration id at
//! processing time. A letter is terminal after one redrive pass: delivered,
//! failed, or abandoned. Failed letters are kept for inspection and are not
//! picked up again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use replyflow_core::domain::send::SendContext;
use replyflow_core::events::SendFailedEvent;
use replyflow_db::repositories::{
    ActionLogRepository, DeadLetter, DeadLetterRepository, DeadLetterStatus, IntegrationRepository,
    RepositoryError,
};
use replyflow_instagram::pipeline::{send_with_retry, Sleeper};
use replyflow_instagram::send::{SendRequest, SendTarget, SendTransport};

pub struct RedriveWorker {
    dead_letters: Arc<dyn DeadLetterRepository>,
    integrations: Arc<dyn IntegrationRepository>,
    action_log: Arc<dyn ActionLogRepository>,
    transport: Arc<dyn SendTransport>,
    sleeper: Arc<dyn Sleeper>,
    batch_size: u32,
    max_attempts: u32,
}

impl RedriveWorker {
    pub fn new(
        dead_letters: Arc<dyn DeadLetterRepository>,
        integrations: Arc<dyn IntegrationRepository>,
        action_log: Arc<dyn ActionLogRepository>,
        transport: Arc<dyn SendTransport>,
        sleeper: Arc<dyn Sleeper>,
        batch_size: u32,
        max_attempts: u32,
    ) -> Self {
        Self { dead_letters, integrations, action_log, transport, sleeper, batch_size, max_attempts }
    }

    pub fn spawn(self, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
        info!(
            event_name = "redrive.worker_started",
            correlation_id = "bootstrap",
            thread_id = "unknown",
            poll_interval_secs = poll_interval.as_secs(),
            "dead-letter re-driver started"
        );

        tokio::spawn(async move {
            loop {
                if let Err(error) = self.run_once().await {
                    error!(
                        event_name = "redrive.poll_failed",
                        error = %error,
                        "dead-letter poll failed"
                    );
                }
                tokio::time::sleep(poll_interval).await;
            }
        })
    }

    /// One poll cycle. Returns how many letters were picked up.
    pub async fn run_once(&self) -> Result<usize, RepositoryError> {
        let letters = self.dead_letters.list_pending(self.batch_size).await?;
        let picked_up = letters.len();

        for letter in letters {
            let letter_id = letter.id.0.clone();
            if let Err(error) = self.process(letter).await {
                error!(
                    event_name = "redrive.letter_failed",
                    dead_letter_id = %letter_id,
                    error = %error,
                    "dead letter processing hit a storage error"
                );
            }
        }

        Ok(picked_up)
    }

    async fn process(&self, letter: DeadLetter) -> Result<(), RepositoryError> {
        let event = match SendFailedEvent::decode(&letter.payload_json) {
            Ok(event) => event,
            Err(error) => {
                error!(
                    event_name = "redrive.payload_abandoned",
                    dead_letter_id = %letter.id.0,
                    error = %error,
                    "undecodable dead-letter payload abandoned"
                );
                return self
                    .dead_letters
                    .record_outcome(
                        &letter.id,
                        DeadLetterStatus::Abandoned,
                        letter.attempts,
                        Some(error.to_string()),
                        Utc::now(),
                    )
                    .await;
            }
        };

        let Some(integration) = self.integrations.find_by_id(&event.integration_id).await? else {
            error!(
                event_name = "redrive.integration_missing",
                dead_letter_id = %letter.id.0,
                integration_id = %event.integration_id.0,
                owner_id = %event.owner_id,
                thread_id = %event.thread_id,
                "integration gone; dead letter abandoned"
            );
            return self
                .dead_letters
                .record_outcome(
                    &letter.id,
                    DeadLetterStatus::Abandoned,
                    letter.attempts,
                    Some("integration not found".to_string()),
                    Utc::now(),
                )
                .await;
        };

        let request = SendRequest {
            target: SendTarget::DirectMessage { recipient_id: event.recipient_id.clone() },
            text: event.text.clone(),
            access_token: integration.access_token.clone(),
        };
        let context = SendContext {
            action: "redrive".to_string(),
            owner_id: event.owner_id.clone(),
            thread_id: event.thread_id.clone(),
            recipient_id: event.recipient_id.clone(),
            correlation_id: letter.id.0.clone(),
        };

        let outcome = send_with_retry(
            self.transport.as_ref(),
            self.sleeper.as_ref(),
            &request,
            &context,
            self.max_attempts,
        )
        .await;
        let total_attempts = letter.attempts + outcome.attempts;

        if outcome.is_success() {
            if let Some(action_log_id) = &event.action_log_id {
                self.action_log.mark_sent(action_log_id, outcome.message_id()).await?;
            }
            info!(
                event_name = "redrive.delivered",
                dead_letter_id = %letter.id.0,
                owner_id = %event.owner_id,
                thread_id = %event.thread_id,
                attempts = total_attempts,
                "queued send delivered"
            );
            self.dead_letters
                .record_outcome(
                    &letter.id,
                    DeadLetterStatus::Delivered,
                    total_attempts,
                    None,
                    Utc::now(),
                )
                .await
        } else {
            error!(
                event_name = "redrive.failed",
                dead_letter_id = %letter.id.0,
                owner_id = %event.owner_id,
                thread_id = %event.thread_id,
                status = outcome.status,
                attempts = total_attempts,
                "queued send failed again; letter kept for inspection"
            );
            self.dead_letters
                .record_outcome(
                    &letter.id,
                    DeadLetterStatus::Failed,
                    total_attempts,
                    Some(format!("send failed with status {}", outcome.status)),
                    Utc::now(),
                )
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use tokio::sync::Mutex;

    use replyflow_core::domain::action_log::{
        ActionKind, ActionLogEntry, ActionLogId, ActionResult,
    };
    use replyflow_core::domain::integration::{Integration, IntegrationId};
    use replyflow_core::events::SendFailedEvent;
    use replyflow_db::repositories::{
        ActionLogRepository, DeadLetter, DeadLetterId, DeadLetterRepository, DeadLetterStatus,
        InMemoryActionLogRepository, InMemoryDeadLetterRepository, InMemoryIntegrationRepository,
        IntegrationRepository,
    };
    use replyflow_instagram::pipeline::Sleeper;
    use replyflow_instagram::send::{SendAttempt, SendRequest, SendTransport, TransportError};

    use super::RedriveWorker;

    struct ScriptedTransport {
        outcomes: Mutex<VecDeque<Result<SendAttempt, TransportError>>>,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<Result<SendAttempt, TransportError>>) -> Self {
            Self { outcomes: Mutex::new(outcomes.into()) }
        }
    }

    #[async_trait]
    impl SendTransport for ScriptedTransport {
        async fn send(&self, _request: &SendRequest) -> Result<SendAttempt, TransportError> {
            self.outcomes
                .lock()
                .await
                .pop_front()
                .expect("transport called more times than scripted")
        }
    }

    struct NoopSleeper;

    #[async_trait]
    impl Sleeper for NoopSleeper {
        async fn sleep(&self, _duration: Duration) {}
    }

    struct Harness {
        worker: RedriveWorker,
        dead_letters: Arc<InMemoryDeadLetterRepository>,
        integrations: Arc<InMemoryIntegrationRepository>,
        action_log: Arc<InMemoryActionLogRepository>,
    }

    fn harness(outcomes: Vec<Result<SendAttempt, TransportError>>) -> Harness {
        let dead_letters = Arc::new(InMemoryDeadLetterRepository::default());
        let integrations = Arc::new(InMemoryIntegrationRepository::default());
        let action_log = Arc::new(InMemoryActionLogRepository::default());

        let worker = RedriveWorker::new(
            dead_letters.clone(),
            integrations.clone(),
            action_log.clone(),
            Arc::new(ScriptedTransport::new(outcomes)),
            Arc::new(NoopSleeper),
            20,
            2,
        );

        Harness { worker, dead_letters, integrations, action_log }
    }

    async fn seed_integration(harness: &Harness) {
        let now = Utc::now();
        harness
            .integrations
            .save(Integration {
                id: IntegrationId("INT-1".to_string()),
                owner_id: "acct-1".to_string(),
                external_user_id: "ig-owner-1".to_string(),
                access_token: "fresh-token".to_string().into(),
                expires_at: None,
                sync_interval_hours: 24,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("save integration");
    }

    fn failed_event(action_log_id: Option<&str>) -> SendFailedEvent {
        SendFailedEvent::new(
            "ig-owner-1",
            "ig-900",
            IntegrationId("INT-1".to_string()),
            "Thanks! Here is the link.",
            "acct-1",
            "ig-900",
            action_log_id.map(|id| ActionLogId(id.to_string())),
        )
    }

    async fn enqueue(harness: &Harness, payload_json: String) -> DeadLetterId {
        let id = DeadLetterId("DL-1".to_string());
        harness
            .dead_letters
            .enqueue(DeadLetter::pending(id.clone(), payload_json, Utc::now()))
            .await
            .expect("enqueue");
        id
    }

    async fn seed_failed_entry(harness: &Harness, id: &str) {
        harness
            .action_log
            .append(ActionLogEntry {
                id: ActionLogId(id.to_string()),
                owner_id: "acct-1".to_string(),
                platform: "instagram".to_string(),
                thread_id: "ig-900".to_string(),
                recipient_id: "ig-900".to_string(),
                action: ActionKind::DmAutomationTriggered,
                text: "Thanks! Here is the link.".to_string(),
                result: ActionResult::Failed,
                message_id: None,
                created_at: Utc::now(),
            })
            .await
            .expect("append");
    }

    #[tokio::test]
    async fn delivered_letters_flip_their_action_log_entry_to_sent() {
        let harness = harness(vec![Ok(SendAttempt {
            status: 200,
            body: Some(json!({"message_id": "mid-redrive"})),
        })]);
        seed_integration(&harness).await;
        seed_failed_entry(&harness, "ALG-1").await;
        enqueue(&harness, failed_event(Some("ALG-1")).encode()).await;

        let picked_up = harness.worker.run_once().await.expect("run");
        assert_eq!(picked_up, 1);

        let letters = harness.dead_letters.snapshot().await;
        assert_eq!(letters[0].status, DeadLetterStatus::Delivered);
        assert_eq!(letters[0].attempts, 1);

        let entry = harness
            .action_log
            .get("acct-1", &ActionLogId("ALG-1".to_string()))
            .await
            .expect("get")
            .expect("entry exists");
        assert_eq!(entry.result, ActionResult::Sent);
        assert_eq!(entry.message_id.as_deref(), Some("mid-redrive"));
    }

    #[tokio::test]
    async fn letters_without_an_integration_are_abandoned() {
        let harness = harness(vec![]);
        enqueue(&harness, failed_event(None).encode()).await;

        harness.worker.run_once().await.expect("run");

        let letters = harness.dead_letters.snapshot().await;
        assert_eq!(letters[0].status, DeadLetterStatus::Abandoned);
        assert_eq!(letters[0].last_error.as_deref(), Some("integration not found"));
    }

    #[tokio::test]
    async fn undecodable_payloads_are_abandoned() {
        let harness = harness(vec![]);
        enqueue(&harness, "{not json".to_string()).await;

        harness.worker.run_once().await.expect("run");

        let letters = harness.dead_letters.snapshot().await;
        assert_eq!(letters[0].status, DeadLetterStatus::Abandoned);
    }

    #[tokio::test]
    async fn exhausted_redrives_mark_the_letter_failed_with_the_last_status() {
        let failure = || Ok(SendAttempt { status: 500, body: Some(json!({"error": "boom"})) });
        let harness = harness(vec![failure(), failure()]);
        seed_integration(&harness).await;
        enqueue(&harness, failed_event(None).encode()).await;

        harness.worker.run_once().await.expect("run");

        let letters = harness.dead_letters.snapshot().await;
        assert_eq!(letters[0].status, DeadLetterStatus::Failed);
        assert_eq!(letters[0].attempts, 2);
        assert_eq!(letters[0].last_error.as_deref(), Some("send failed with status 500"));
    }

    #[tokio::test]
    async fn terminal_letters_are_not_picked_up_again() {
        let harness = harness(vec![]);
        enqueue(&harness, "{not json".to_string()).await;

        harness.worker.run_once().await.expect("first pass");
        let picked_up = harness.worker.run_once().await.expect("second pass");

        assert_eq!(picked_up, 0);
    }
}
