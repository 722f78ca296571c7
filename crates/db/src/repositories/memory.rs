use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use replyflow_core::domain::action_log::{ActionLogEntry, ActionLogId, ActionResult};
use replyflow_core::domain::automation::Automation;
use replyflow_core::domain::contact::{AutoClassification, Contact};
use replyflow_core::domain::integration::{Integration, IntegrationId};

use super::dead_letter::{DeadLetter, DeadLetterId, DeadLetterStatus};
use super::{
    ActionLogRepository, AutomationRepository, ContactRepository, DeadLetterRepository,
    IntegrationRepository, RepositoryError, ACTION_LOG_LIST_LIMIT_MAX,
};

#[derive(Default)]
pub struct InMemoryAutomationRepository {
    automations: RwLock<Vec<Automation>>,
}

#[async_trait::async_trait]
impl AutomationRepository for InMemoryAutomationRepository {
    async fn list_active_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<Automation>, RepositoryError> {
        let automations = self.automations.read().await;
        let mut matching: Vec<Automation> = automations
            .iter()
            .filter(|automation| automation.owner_id == owner_id && automation.is_active)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));
        Ok(matching)
    }

    async fn save(&self, automation: Automation) -> Result<(), RepositoryError> {
        let stored = automation.normalized_for_storage()?;
        let mut automations = self.automations.write().await;
        if let Some(existing) = automations.iter_mut().find(|row| row.id == stored.id) {
            *existing = stored;
        } else {
            automations.push(stored);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryIntegrationRepository {
    integrations: RwLock<HashMap<String, Integration>>,
}

#[async_trait::async_trait]
impl IntegrationRepository for InMemoryIntegrationRepository {
    async fn find_by_id(
        &self,
        id: &IntegrationId,
    ) -> Result<Option<Integration>, RepositoryError> {
        let integrations = self.integrations.read().await;
        Ok(integrations.get(&id.0).cloned())
    }

    async fn find_by_external_user_id(
        &self,
        external_user_id: &str,
    ) -> Result<Option<Integration>, RepositoryError> {
        let integrations = self.integrations.read().await;
        Ok(integrations
            .values()
            .find(|integration| integration.external_user_id == external_user_id)
            .cloned())
    }

    async fn save(&self, integration: Integration) -> Result<(), RepositoryError> {
        let mut integrations = self.integrations.write().await;
        integrations.insert(integration.id.0.clone(), integration);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryActionLogRepository {
    entries: RwLock<Vec<ActionLogEntry>>,
}

#[async_trait::async_trait]
impl ActionLogRepository for InMemoryActionLogRepository {
    async fn append(&self, entry: ActionLogEntry) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.push(entry);
        Ok(())
    }

    async fn list_recent(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> Result<Vec<ActionLogEntry>, RepositoryError> {
        let clamped = limit.clamp(1, ACTION_LOG_LIST_LIMIT_MAX) as usize;
        let entries = self.entries.read().await;
        let mut matching: Vec<ActionLogEntry> =
            entries.iter().filter(|entry| entry.owner_id == owner_id).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        matching.truncate(clamped);
        Ok(matching)
    }

    async fn get(
        &self,
        owner_id: &str,
        id: &ActionLogId,
    ) -> Result<Option<ActionLogEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .find(|entry| entry.owner_id == owner_id && entry.id == *id)
            .cloned())
    }

    async fn mark_sent(
        &self,
        id: &ActionLogId,
        message_id: Option<String>,
    ) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries
            .iter_mut()
            .find(|entry| entry.id == *id && entry.result == ActionResult::Failed)
        {
            entry.result = ActionResult::Sent;
            if entry.message_id.is_none() {
                entry.message_id = message_id;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryContactRepository {
    contacts: RwLock<Vec<Contact>>,
}

#[async_trait::async_trait]
impl ContactRepository for InMemoryContactRepository {
    async fn find_by_thread(
        &self,
        owner_id: &str,
        thread_id: &str,
    ) -> Result<Option<Contact>, RepositoryError> {
        let contacts = self.contacts.read().await;
        Ok(contacts
            .iter()
            .find(|contact| contact.owner_id == owner_id && contact.thread_id == thread_id)
            .cloned())
    }

    async fn save(&self, contact: Contact) -> Result<(), RepositoryError> {
        let mut contacts = self.contacts.write().await;
        if let Some(existing) = contacts
            .iter_mut()
            .find(|row| row.owner_id == contact.owner_id && row.thread_id == contact.thread_id)
        {
            *existing = contact;
        } else {
            contacts.push(contact);
        }
        Ok(())
    }

    async fn record_classification(
        &self,
        owner_id: &str,
        thread_id: &str,
        classification: AutoClassification,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut contacts = self.contacts.write().await;
        match contacts
            .iter_mut()
            .find(|contact| contact.owner_id == owner_id && contact.thread_id == thread_id)
        {
            Some(contact) => {
                match classification {
                    AutoClassification::Hrn => contact.require_human(now),
                    AutoClassification::AutoOk => {
                        contact.last_auto_classification = Some(AutoClassification::AutoOk);
                        contact.updated_at = now;
                    }
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_handled(
        &self,
        owner_id: &str,
        thread_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut contacts = self.contacts.write().await;
        match contacts
            .iter_mut()
            .find(|contact| contact.owner_id == owner_id && contact.thread_id == thread_id)
        {
            Some(contact) => {
                contact.mark_handled(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryDeadLetterRepository {
    letters: RwLock<Vec<DeadLetter>>,
}

impl InMemoryDeadLetterRepository {
    /// Every letter regardless of status, for asserting recorded outcomes.
    pub async fn snapshot(&self) -> Vec<DeadLetter> {
        self.letters.read().await.clone()
    }
}

#[async_trait::async_trait]
impl DeadLetterRepository for InMemoryDeadLetterRepository {
    async fn enqueue(&self, letter: DeadLetter) -> Result<(), RepositoryError> {
        let mut letters = self.letters.write().await;
        letters.push(letter);
        Ok(())
    }

    async fn list_pending(&self, limit: u32) -> Result<Vec<DeadLetter>, RepositoryError> {
        let letters = self.letters.read().await;
        let mut pending: Vec<DeadLetter> = letters
            .iter()
            .filter(|letter| letter.status == DeadLetterStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));
        pending.truncate(limit.max(1) as usize);
        Ok(pending)
    }

    async fn record_outcome(
        &self,
        id: &DeadLetterId,
        status: DeadLetterStatus,
        attempts: u32,
        last_error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut letters = self.letters.write().await;
        if let Some(letter) = letters.iter_mut().find(|letter| letter.id == *id) {
            letter.status = status;
            letter.attempts = attempts;
            letter.last_error = last_error;
            letter.updated_at = now;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use replyflow_core::domain::automation::{
        Automation, AutomationId, ResponseType, TriggerScope,
    };
    use replyflow_core::domain::contact::{AutoClassification, Contact, ContactId};

    use super::{DeadLetter, DeadLetterId, DeadLetterStatus};
    use crate::repositories::{
        AutomationRepository, ContactRepository, DeadLetterRepository,
        InMemoryAutomationRepository, InMemoryContactRepository, InMemoryDeadLetterRepository,
        RepositoryError,
    };

    fn automation(id: &str, trigger_word: &str) -> Automation {
        let now = Utc::now();
        Automation {
            id: AutomationId(id.to_string()),
            owner_id: "acct-1".to_string(),
            trigger_word: trigger_word.to_string(),
            response_type: ResponseType::Fixed,
            response_content: "hello".to_string(),
            is_active: true,
            trigger_scope: TriggerScope::Dm,
            comment_reply_count: None,
            comment_reply_text: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn in_memory_automation_repo_lowercases_and_lists_active() {
        let repo = InMemoryAutomationRepository::default();
        repo.save(automation("A-1", "DEMO")).await.expect("save");

        let mut disabled = automation("A-2", "pricing");
        disabled.is_active = false;
        repo.save(disabled).await.expect("save disabled");

        let listed = repo.list_active_for_owner("acct-1").await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].trigger_word, "demo");

        let error = repo.save(automation("A-3", "  ")).await.expect_err("blank trigger word");
        assert!(matches!(error, RepositoryError::Domain(_)));
    }

    #[tokio::test]
    async fn in_memory_contact_repo_upserts_by_thread() {
        let repo = InMemoryContactRepository::default();
        let now = Utc::now();
        let contact = Contact {
            id: ContactId("CT-1".to_string()),
            owner_id: "acct-1".to_string(),
            thread_id: "t-100".to_string(),
            platform_user_id: "ig-900".to_string(),
            requires_human_response: true,
            human_response_set_at: Some(now),
            last_auto_classification: None,
            created_at: now,
            updated_at: now,
        };
        repo.save(contact).await.expect("save");

        assert!(repo.mark_handled("acct-1", "t-100", Utc::now()).await.expect("mark"));
        let found =
            repo.find_by_thread("acct-1", "t-100").await.expect("find").expect("present");
        assert!(!found.requires_human_response);
    }

    #[tokio::test]
    async fn in_memory_contact_repo_keeps_a_cleared_gate_on_auto_ok() {
        let repo = InMemoryContactRepository::default();
        let now = Utc::now();
        let mut contact = Contact {
            id: ContactId("CT-1".to_string()),
            owner_id: "acct-1".to_string(),
            thread_id: "t-100".to_string(),
            platform_user_id: "ig-900".to_string(),
            requires_human_response: false,
            human_response_set_at: None,
            last_auto_classification: None,
            created_at: now,
            updated_at: now,
        };
        contact.require_human(now);
        repo.save(contact).await.expect("save");

        assert!(repo.mark_handled("acct-1", "t-100", Utc::now()).await.expect("mark"));
        assert!(repo
            .record_classification("acct-1", "t-100", AutoClassification::AutoOk, Utc::now())
            .await
            .expect("record"));

        let found =
            repo.find_by_thread("acct-1", "t-100").await.expect("find").expect("present");
        assert!(!found.requires_human_response);
        assert_eq!(found.last_auto_classification, Some(AutoClassification::AutoOk));

        assert!(!repo
            .record_classification("acct-1", "t-none", AutoClassification::Hrn, Utc::now())
            .await
            .expect("record missing"));
    }

    #[tokio::test]
    async fn in_memory_dead_letter_repo_orders_pending_by_age() {
        let repo = InMemoryDeadLetterRepository::default();
        let base = Utc::now();

        for index in [1, 0] {
            let letter = DeadLetter::pending(
                DeadLetterId(format!("DL-{index}")),
                "{}".to_string(),
                base + Duration::seconds(index),
            );
            repo.enqueue(letter).await.expect("enqueue");
        }

        repo.record_outcome(
            &DeadLetterId("DL-1".to_string()),
            DeadLetterStatus::Delivered,
            1,
            None,
            Utc::now(),
        )
        .await
        .expect("record");

        let pending = repo.list_pending(10).await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, DeadLetterId("DL-0".to_string()));
    }
}
