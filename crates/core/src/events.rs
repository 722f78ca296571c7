//! Closed, versioned schema for the send-failed queue event.
//!
//! The producer (inline webhook path) and the consumer (dead-letter
//! re-driver) share this one definition so the payload cannot silently
//! drift. The schema tag is checked on decode and unknown versions are
//! rejected rather than best-effort parsed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::action_log::ActionLogId;
use crate::domain::integration::IntegrationId;

pub const SEND_FAILED_SCHEMA_V1: &str = "send_failed.v1";

/// Published when the inline send attempt for an inbound event fails.
///
/// Deliberately carries the integration *id* and never the access token;
/// the consumer re-fetches the credential from storage when it runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SendFailedEvent {
    pub schema: String,
    pub channel_user_id: String,
    pub recipient_id: String,
    pub integration_id: IntegrationId,
    pub text: String,
    pub owner_id: String,
    pub thread_id: String,
    pub action_log_id: Option<ActionLogId>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventDecodeError {
    #[error("send-failed event is not valid JSON: {0}")]
    Malformed(String),
    #[error("unsupported send-failed schema `{0}`")]
    UnknownSchema(String),
}

impl SendFailedEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channel_user_id: impl Into<String>,
        recipient_id: impl Into<String>,
        integration_id: IntegrationId,
        text: impl Into<String>,
        owner_id: impl Into<String>,
        thread_id: impl Into<String>,
        action_log_id: Option<ActionLogId>,
    ) -> Self {
        Self {
            schema: SEND_FAILED_SCHEMA_V1.to_owned(),
            channel_user_id: channel_user_id.into(),
            recipient_id: recipient_id.into(),
            integration_id,
            text: text.into(),
            owner_id: owner_id.into(),
            thread_id: thread_id.into(),
            action_log_id,
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(raw: &str) -> Result<Self, EventDecodeError> {
        let event: Self = serde_json::from_str(raw)
            .map_err(|error| EventDecodeError::Malformed(error.to_string()))?;
        if event.schema != SEND_FAILED_SCHEMA_V1 {
            return Err(EventDecodeError::UnknownSchema(event.schema));
        }
        Ok(event)
    }
}
