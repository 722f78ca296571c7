//! Typed decoding of Meta webhook deliveries.
//!
//! The envelope shape is permissive: unknown fields are ignored and entries
//! that carry neither a usable message nor a usable comment simply produce no
//! events. Rejecting deliveries is the signature check's job, not the
//! decoder's.

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebhookEntry {
    /// Provider-side id of the account this entry belongs to.
    pub id: String,
    #[serde(default)]
    pub messaging: Vec<MessagingItem>,
    #[serde(default)]
    pub changes: Vec<ChangeItem>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessagingItem {
    pub sender: Option<Participant>,
    pub recipient: Option<Participant>,
    pub message: Option<MessagePayload>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Participant {
    pub id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessagePayload {
    pub mid: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub is_echo: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChangeItem {
    pub field: Option<String>,
    pub value: Option<CommentValue>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CommentValue {
    pub id: Option<String>,
    pub text: Option<String>,
    pub from: Option<CommentAuthor>,
    pub media: Option<CommentMedia>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CommentAuthor {
    pub id: String,
    pub username: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CommentMedia {
    pub id: Option<String>,
}

/// One normalized inbound event, detached from the wire envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    Dm(DmEvent),
    Comment(CommentEvent),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DmEvent {
    pub sender_id: String,
    pub recipient_id: String,
    pub message_id: Option<String>,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommentEvent {
    pub comment_id: String,
    pub media_id: Option<String>,
    pub commenter_id: String,
    pub commenter_username: Option<String>,
    pub text: String,
}

impl WebhookEnvelope {
    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Normalized events paired with the entry's account id.
    ///
    /// Echoes of the account's own outbound messages are dropped here, as are
    /// messages and comments without text. Matching a trigger against an
    /// empty message can never succeed, so there is nothing to process.
    pub fn events(&self) -> Vec<(String, InboundEvent)> {
        let mut events = Vec::new();

        for entry in &self.entry {
            for item in &entry.messaging {
                let Some(event) = normalize_message(item) else {
                    continue;
                };
                events.push((entry.id.clone(), InboundEvent::Dm(event)));
            }

            for change in &entry.changes {
                let Some(event) = normalize_comment(change) else {
                    continue;
                };
                events.push((entry.id.clone(), InboundEvent::Comment(event)));
            }
        }

        events
    }
}

fn normalize_message(item: &MessagingItem) -> Option<DmEvent> {
    let message = item.message.as_ref()?;
    if message.is_echo {
        return None;
    }

    let text = message.text.as_deref()?.trim();
    if text.is_empty() {
        return None;
    }

    Some(DmEvent {
        sender_id: item.sender.as_ref()?.id.clone(),
        recipient_id: item.recipient.as_ref()?.id.clone(),
        message_id: message.mid.clone(),
        text: text.to_string(),
    })
}

fn normalize_comment(change: &ChangeItem) -> Option<CommentEvent> {
    if change.field.as_deref() != Some("comments") {
        return None;
    }

    let value = change.value.as_ref()?;
    let text = value.text.as_deref()?.trim();
    if text.is_empty() {
        return None;
    }
    let author = value.from.as_ref()?;

    Some(CommentEvent {
        comment_id: value.id.clone()?,
        media_id: value.media.as_ref().and_then(|media| media.id.clone()),
        commenter_id: author.id.clone(),
        commenter_username: author.username.clone(),
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{InboundEvent, WebhookEnvelope};

    #[test]
    fn dm_delivery_normalizes_to_one_event() {
        let raw = br#"{
            "object": "instagram",
            "entry": [{
                "id": "ig-owner-1",
                "messaging": [{
                    "sender": {"id": "ig-900"},
                    "recipient": {"id": "ig-owner-1"},
                    "message": {"mid": "m-1", "text": "please send demo info"}
                }]
            }]
        }"#;

        let envelope = WebhookEnvelope::decode(raw).expect("decode");
        let events = envelope.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "ig-owner-1");

        let InboundEvent::Dm(ref dm) = events[0].1 else {
            panic!("expected dm event");
        };
        assert_eq!(dm.sender_id, "ig-900");
        assert_eq!(dm.text, "please send demo info");
    }

    #[test]
    fn echoes_of_our_own_messages_are_dropped() {
        let raw = br#"{
            "object": "instagram",
            "entry": [{
                "id": "ig-owner-1",
                "messaging": [{
                    "sender": {"id": "ig-owner-1"},
                    "recipient": {"id": "ig-900"},
                    "message": {"mid": "m-1", "text": "thanks!", "is_echo": true}
                }]
            }]
        }"#;

        let envelope = WebhookEnvelope::decode(raw).expect("decode");
        assert!(envelope.events().is_empty());
    }

    #[test]
    fn comment_changes_normalize_with_author_and_media() {
        let raw = br#"{
            "object": "instagram",
            "entry": [{
                "id": "ig-owner-1",
                "changes": [{
                    "field": "comments",
                    "value": {
                        "id": "c-17",
                        "text": "demo please",
                        "from": {"id": "ig-901", "username": "jordan"},
                        "media": {"id": "media-5"}
                    }
                }]
            }]
        }"#;

        let envelope = WebhookEnvelope::decode(raw).expect("decode");
        let events = envelope.events();
        assert_eq!(events.len(), 1);

        let InboundEvent::Comment(ref comment) = events[0].1 else {
            panic!("expected comment event");
        };
        assert_eq!(comment.comment_id, "c-17");
        assert_eq!(comment.commenter_username.as_deref(), Some("jordan"));
        assert_eq!(comment.media_id.as_deref(), Some("media-5"));
    }

    #[test]
    fn non_comment_changes_and_textless_items_produce_nothing() {
        let raw = br#"{
            "object": "instagram",
            "entry": [{
                "id": "ig-owner-1",
                "messaging": [{
                    "sender": {"id": "ig-900"},
                    "recipient": {"id": "ig-owner-1"},
                    "message": {"mid": "m-1"}
                }],
                "changes": [
                    {"field": "story_insights", "value": {"id": "x"}},
                    {"field": "comments", "value": {"id": "c-1", "text": "  ", "from": {"id": "ig-901"}}}
                ]
            }]
        }"#;

        let envelope = WebhookEnvelope::decode(raw).expect("decode");
        assert!(envelope.events().is_empty());
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let raw = br#"{
            "object": "instagram",
            "entry": [{
                "id": "ig-owner-1",
                "time": 1700000000,
                "hooray": {"new": "field"},
                "messaging": [{
                    "sender": {"id": "ig-900"},
                    "recipient": {"id": "ig-owner-1"},
                    "timestamp": 1700000000,
                    "message": {"mid": "m-1", "text": "hi"}
                }]
            }]
        }"#;

        let envelope = WebhookEnvelope::decode(raw).expect("decode");
        assert_eq!(envelope.events().len(), 1);
    }
}
