//! Inbound webhook surface: signature gate, event normalization, trigger
//! matching, and the inline send.
//!
//! The POST handler acknowledges with 200 for everything past the signature
//! gate. Provider deliveries are retried on non-2xx responses, and replaying
//! an already-processed delivery is worse than dropping a malformed one, so
//! per-event failures are logged and swallowed instead of surfaced.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use replyflow_agent::{HrnClassifier, ReplyComposer, ReplyInputs};
use replyflow_core::domain::action_log::{ActionKind, ActionLogEntry, ActionLogId, ActionResult};
use replyflow_core::domain::automation::TriggerScope;
use replyflow_core::domain::contact::{AutoClassification, Contact, ContactId};
use replyflow_core::domain::send::SendContext;
use replyflow_core::errors::InterfaceError;
use replyflow_core::events::SendFailedEvent;
use replyflow_core::signature::verify_signature;
use replyflow_core::trigger::match_automation;
use replyflow_db::repositories::{
    ActionLogRepository, AutomationRepository, ContactRepository, DeadLetter, DeadLetterId,
    DeadLetterRepository, IntegrationRepository,
};
use replyflow_instagram::events::{InboundEvent, WebhookEnvelope};
use replyflow_instagram::pipeline::{send_with_retry, Sleeper};
use replyflow_instagram::send::{SendRequest, SendTarget, SendTransport};

const SIGNATURE_HEADER: &str = "x-hub-signature-256";

#[derive(Clone)]
pub struct WebhookState {
    pub automations: Arc<dyn AutomationRepository>,
    pub integrations: Arc<dyn IntegrationRepository>,
    pub action_log: Arc<dyn ActionLogRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub dead_letters: Arc<dyn DeadLetterRepository>,
    pub transport: Arc<dyn SendTransport>,
    pub sleeper: Arc<dyn Sleeper>,
    pub composer: Arc<ReplyComposer>,
    pub classifier: Arc<HrnClassifier>,
    pub app_secret: SecretString,
    pub verify_token: SecretString,
    pub inline_max_attempts: u32,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhooks/instagram", get(verify_subscription).post(receive_event))
        .with_state(state)
}

/// GET handshake Meta performs when the webhook subscription is created.
pub async fn verify_subscription(
    State(state): State<WebhookState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();

    if mode == Some("subscribe") && token == Some(state.verify_token.expose_secret()) {
        info!(
            event_name = "webhook.subscription_verified",
            correlation_id = "handshake",
            "subscription handshake accepted"
        );
        (StatusCode::OK, challenge)
    } else {
        warn!(
            event_name = "webhook.subscription_rejected",
            correlation_id = "handshake",
            "subscription handshake rejected"
        );
        (StatusCode::FORBIDDEN, "forbidden".to_string())
    }
}

/// POST delivery path. The signature is checked against the raw body before
/// any parsing happens.
pub async fn receive_event(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let correlation_id = Uuid::new_v4().simple().to_string();
    let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());

    if !verify_signature(&body, signature, state.app_secret.expose_secret()) {
        let denied = InterfaceError::Unauthorized {
            message: "webhook signature verification failed".to_string(),
            correlation_id: correlation_id.clone(),
        };
        warn!(
            event_name = "webhook.signature_rejected",
            correlation_id = %correlation_id,
            "webhook signature verification failed"
        );
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": denied.user_message(), "correlation_id": correlation_id})),
        );
    }

    let envelope = match WebhookEnvelope::decode(&body) {
        Ok(envelope) => envelope,
        Err(error) => {
            warn!(
                event_name = "webhook.payload_ignored",
                correlation_id = %correlation_id,
                error = %error,
                "undecodable webhook payload acknowledged and dropped"
            );
            return (StatusCode::OK, Json(json!({"status": "ignored"})));
        }
    };

    if envelope.object != "instagram" {
        warn!(
            event_name = "webhook.payload_ignored",
            correlation_id = %correlation_id,
            object = %envelope.object,
            "webhook for unexpected object acknowledged and dropped"
        );
        return (StatusCode::OK, Json(json!({"status": "ignored"})));
    }

    let events = envelope.events();
    let received = events.len();
    for (channel_user_id, event) in events {
        if let Err(error) = process_event(&state, &channel_user_id, event, &correlation_id).await {
            error!(
                event_name = "webhook.event_failed",
                correlation_id = %correlation_id,
                channel_user_id = %channel_user_id,
                error = %error,
                "inbound event processing failed"
            );
        }
    }

    (StatusCode::OK, Json(json!({"status": "ok", "received": received})))
}

struct EventFields {
    scope: TriggerScope,
    thread_id: String,
    recipient_id: String,
    username: String,
    text: String,
    comment_id: Option<String>,
}

impl EventFields {
    fn from_event(event: InboundEvent) -> Self {
        match event {
            InboundEvent::Dm(dm) => Self {
                scope: TriggerScope::Dm,
                thread_id: dm.sender_id.clone(),
                recipient_id: dm.sender_id.clone(),
                username: dm.sender_id,
                text: dm.text,
                comment_id: None,
            },
            InboundEvent::Comment(comment) => Self {
                scope: TriggerScope::Comment,
                thread_id: comment.commenter_id.clone(),
                recipient_id: comment.commenter_id.clone(),
                username: comment.commenter_username.unwrap_or(comment.commenter_id),
                text: comment.text,
                comment_id: Some(comment.comment_id),
            },
        }
    }
}

async fn process_event(
    state: &WebhookState,
    channel_user_id: &str,
    event: InboundEvent,
    correlation_id: &str,
) -> anyhow::Result<()> {
    let Some(integration) =
        state.integrations.find_by_external_user_id(channel_user_id).await?
    else {
        warn!(
            event_name = "webhook.unknown_account",
            correlation_id = %correlation_id,
            channel_user_id = %channel_user_id,
            "no integration registered for inbound account"
        );
        return Ok(());
    };
    let owner_id = integration.owner_id.clone();
    let inbound = EventFields::from_event(event);

    // Classification runs off the request path; its verdict gates the *next*
    // inbound message on this thread, not the current one.
    spawn_classification(
        state,
        owner_id.clone(),
        inbound.thread_id.clone(),
        inbound.recipient_id.clone(),
        inbound.text.clone(),
        correlation_id.to_string(),
    );

    let gated = state
        .contacts
        .find_by_thread(&owner_id, &inbound.thread_id)
        .await?
        .is_some_and(|contact| contact.requires_human_response);
    if gated {
        info!(
            event_name = "hrn.gate_suppressed",
            correlation_id = %correlation_id,
            owner_id = %owner_id,
            thread_id = %inbound.thread_id,
            "automation suppressed while thread awaits a human"
        );
        return Ok(());
    }

    let candidates = state.automations.list_active_for_owner(&owner_id).await?;
    let now = Utc::now();
    let Some(automation) = match_automation(&candidates, &inbound.text, inbound.scope, now) else {
        debug!(
            event_name = "trigger.no_match",
            correlation_id = %correlation_id,
            owner_id = %owner_id,
            thread_id = %inbound.thread_id,
            "no automation matched the message"
        );
        return Ok(());
    };

    let inputs = ReplyInputs { message_text: &inbound.text, username: &inbound.username };
    let reply = match state.composer.compose(automation, &inputs).await {
        Ok(reply) => reply,
        Err(error) => {
            error!(
                event_name = "compose.failed",
                correlation_id = %correlation_id,
                owner_id = %owner_id,
                thread_id = %inbound.thread_id,
                automation_id = %automation.id.0,
                error = %error,
                "reply composition failed; nothing sent"
            );
            return Ok(());
        }
    };

    // DM replies to DM events log as plain sent replies; comment-triggered
    // flows record which surfaces were reached.
    let mut kind = match inbound.scope {
        TriggerScope::Comment => ActionKind::CommentAutomationTriggered,
        _ => ActionKind::SentReply,
    };

    // Public comment reply is best effort: a failure downgrades the recorded
    // action kind but is never queued for redelivery.
    if let (Some(comment_id), Some(comment_reply)) =
        (&inbound.comment_id, &automation.comment_reply_text)
    {
        let request = SendRequest {
            target: SendTarget::CommentReply { comment_id: comment_id.clone() },
            text: comment_reply.clone(),
            access_token: integration.access_token.clone(),
        };
        let context = SendContext {
            action: "comment_reply".to_string(),
            owner_id: owner_id.clone(),
            thread_id: inbound.thread_id.clone(),
            recipient_id: inbound.recipient_id.clone(),
            correlation_id: correlation_id.to_string(),
        };
        let outcome = send_with_retry(
            state.transport.as_ref(),
            state.sleeper.as_ref(),
            &request,
            &context,
            state.inline_max_attempts,
        )
        .await;
        if outcome.is_success() {
            kind = ActionKind::DmAndCommentAutomationTriggered;
        } else {
            warn!(
                event_name = "send.comment_reply_failed",
                correlation_id = %correlation_id,
                owner_id = %owner_id,
                thread_id = %inbound.thread_id,
                status = outcome.status,
                "public comment reply failed; continuing with the direct message"
            );
        }
    }

    let request = SendRequest {
        target: SendTarget::DirectMessage { recipient_id: inbound.recipient_id.clone() },
        text: reply.clone(),
        access_token: integration.access_token.clone(),
    };
    let context = SendContext {
        action: kind.as_str().to_string(),
        owner_id: owner_id.clone(),
        thread_id: inbound.thread_id.clone(),
        recipient_id: inbound.recipient_id.clone(),
        correlation_id: correlation_id.to_string(),
    };
    let outcome = send_with_retry(
        state.transport.as_ref(),
        state.sleeper.as_ref(),
        &request,
        &context,
        state.inline_max_attempts,
    )
    .await;

    let entry_id = ActionLogId(format!("ALG-{}", Uuid::new_v4().simple()));
    let result = if outcome.is_success() { ActionResult::Sent } else { ActionResult::Failed };
    state
        .action_log
        .append(ActionLogEntry {
            id: entry_id.clone(),
            owner_id: owner_id.clone(),
            platform: "instagram".to_string(),
            thread_id: inbound.thread_id.clone(),
            recipient_id: inbound.recipient_id.clone(),
            action: kind,
            text: reply.clone(),
            result,
            message_id: outcome.message_id(),
            created_at: now,
        })
        .await?;

    if !outcome.is_success() {
        let event = SendFailedEvent::new(
            channel_user_id,
            inbound.recipient_id.clone(),
            integration.id.clone(),
            reply,
            owner_id.clone(),
            inbound.thread_id.clone(),
            Some(entry_id),
        );
        let letter = DeadLetter::pending(
            DeadLetterId(format!("DL-{}", Uuid::new_v4().simple())),
            event.encode(),
            Utc::now(),
        );
        state.dead_letters.enqueue(letter).await?;
        info!(
            event_name = "dead_letter.enqueued",
            correlation_id = %correlation_id,
            owner_id = %owner_id,
            thread_id = %inbound.thread_id,
            status = outcome.status,
            "failed send queued for asynchronous redelivery"
        );
    }

    Ok(())
}

fn spawn_classification(
    state: &WebhookState,
    owner_id: String,
    thread_id: String,
    platform_user_id: String,
    text: String,
    correlation_id: String,
) {
    let classifier = state.classifier.clone();
    let contacts = state.contacts.clone();

    tokio::spawn(async move {
        let verdict = classifier.classify(&text).await;
        let now = Utc::now();
        let classification =
            if verdict.hrn { AutoClassification::Hrn } else { AutoClassification::AutoOk };

        // A targeted column update: an auto-ok verdict touches only the
        // classification fields and never clears the gate; only mark-handled
        // does. A whole-row save here could resurrect a gate state a
        // concurrent mark-handled had already changed.
        let updated = match contacts
            .record_classification(&owner_id, &thread_id, classification, now)
            .await
        {
            Ok(updated) => updated,
            Err(error) => {
                error!(
                    event_name = "hrn.contact_save_failed",
                    correlation_id = %correlation_id,
                    owner_id = %owner_id,
                    thread_id = %thread_id,
                    error = %error,
                    "could not persist classification verdict"
                );
                return;
            }
        };

        if !updated {
            // First message on this thread; create the contact with the
            // verdict already applied.
            let mut contact = Contact {
                id: ContactId(format!("CT-{}", Uuid::new_v4().simple())),
                owner_id: owner_id.clone(),
                thread_id: thread_id.clone(),
                platform_user_id,
                requires_human_response: false,
                human_response_set_at: None,
                last_auto_classification: Some(classification),
                created_at: now,
                updated_at: now,
            };
            if verdict.hrn {
                contact.require_human(now);
            }
            if let Err(error) = contacts.save(contact).await {
                error!(
                    event_name = "hrn.contact_save_failed",
                    correlation_id = %correlation_id,
                    owner_id = %owner_id,
                    thread_id = %thread_id,
                    error = %error,
                    "could not persist classification verdict"
                );
                return;
            }
        }

        if verdict.hrn {
            info!(
                event_name = "hrn.flagged",
                correlation_id = %correlation_id,
                owner_id = %owner_id,
                thread_id = %thread_id,
                confidence = verdict.confidence,
                "thread flagged for human response"
            );
        }
    });
}
