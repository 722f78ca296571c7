use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionLogId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SentReply,
    DmAutomationTriggered,
    CommentAutomationTriggered,
    DmAndCommentAutomationTriggered,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SentReply => "sent_reply",
            Self::DmAutomationTriggered => "dm_automation_triggered",
            Self::CommentAutomationTriggered => "comment_automation_triggered",
            Self::DmAndCommentAutomationTriggered => "dm_and_comment_automation_triggered",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sent_reply" => Some(Self::SentReply),
            "dm_automation_triggered" => Some(Self::DmAutomationTriggered),
            "comment_automation_triggered" => Some(Self::CommentAutomationTriggered),
            "dm_and_comment_automation_triggered" => Some(Self::DmAndCommentAutomationTriggered),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResult {
    Sent,
    Failed,
}

impl ActionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One row of the append-only automation audit trail.
///
/// Entries are never mutated after append, with one exception: a dead-letter
/// redelivery that later succeeds flips `result` from failed to sent, keyed
/// by this entry's id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: ActionLogId,
    pub owner_id: String,
    pub platform: String,
    pub thread_id: String,
    pub recipient_id: String,
    pub action: ActionKind,
    pub text: String,
    pub result: ActionResult,
    pub message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::ActionKind;

    #[test]
    fn action_kind_storage_strings_round_trip() {
        for kind in [
            ActionKind::SentReply,
            ActionKind::DmAutomationTriggered,
            ActionKind::CommentAutomationTriggered,
            ActionKind::DmAndCommentAutomationTriggered,
        ] {
            assert_eq!(ActionKind::parse(kind.as_str()), Some(kind));
        }
    }
}
