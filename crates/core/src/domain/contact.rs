use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoClassification {
    AutoOk,
    Hrn,
}

impl AutoClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoOk => "auto_ok",
            Self::Hrn => "hrn",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "auto_ok" => Some(Self::AutoOk),
            "hrn" => Some(Self::Hrn),
            _ => None,
        }
    }
}

/// Per-thread conversation state, including the human-response gate.
///
/// Exactly two writers may flip `requires_human_response`: the classifier
/// (true) and the explicit mark-handled action (false). Everything on the
/// send path only reads it.
#[derive(Clone, Debug, PartialEq)]
pub struct Contact {
    pub id: ContactId,
    pub owner_id: String,
    pub thread_id: String,
    pub platform_user_id: String,
    pub requires_human_response: bool,
    pub human_response_set_at: Option<DateTime<Utc>>,
    pub last_auto_classification: Option<AutoClassification>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    pub fn require_human(&mut self, now: DateTime<Utc>) {
        self.requires_human_response = true;
        self.human_response_set_at = Some(now);
        self.last_auto_classification = Some(AutoClassification::Hrn);
        self.updated_at = now;
    }

    pub fn mark_handled(&mut self, now: DateTime<Utc>) {
        self.requires_human_response = false;
        self.updated_at = now;
    }
}
