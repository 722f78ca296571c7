use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AutomationId(pub String);

/// How the reply body is produced when an automation fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// `response_content` is sent verbatim.
    Fixed,
    /// `response_content` is a prompt handed to the text-generation client.
    AiPrompt,
    /// `response_content` is a template rendered with event variables.
    GenericTemplate,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::AiPrompt => "ai_prompt",
            Self::GenericTemplate => "generic_template",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(Self::Fixed),
            "ai_prompt" => Some(Self::AiPrompt),
            "generic_template" => Some(Self::GenericTemplate),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerScope {
    Dm,
    Comment,
    Both,
}

impl TriggerScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dm => "dm",
            Self::Comment => "comment",
            Self::Both => "both",
        }
    }

    /// Rows written before the scope column existed carry NULL or empty
    /// strings; those legacy automations apply to DMs only.
    pub fn parse_or_legacy_default(raw: Option<&str>) -> Self {
        match raw.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
            Some("comment") => Self::Comment,
            Some("both") => Self::Both,
            Some("dm") => Self::Dm,
            _ => Self::Dm,
        }
    }

    /// Whether an automation with this scope applies to a `requested` event
    /// scope. `Both` accepts anything; the others require an exact match.
    pub fn accepts(&self, requested: TriggerScope) -> bool {
        matches!(self, Self::Both) || *self == requested
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Automation {
    pub id: AutomationId,
    pub owner_id: String,
    /// Stored lowercased; `(owner_id, trigger_word)` is unique.
    pub trigger_word: String,
    pub response_type: ResponseType,
    pub response_content: String,
    pub is_active: bool,
    pub trigger_scope: TriggerScope,
    pub comment_reply_count: Option<u32>,
    pub comment_reply_text: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Automation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Storage form: the trigger word trimmed and lowercased. An empty
    /// trigger word would match every message, so it is rejected.
    pub fn normalized_for_storage(mut self) -> Result<Self, DomainError> {
        self.trigger_word = self.trigger_word.trim().to_lowercase();
        if self.trigger_word.is_empty() {
            return Err(DomainError::EmptyTriggerWord);
        }
        Ok(self)
    }
}
