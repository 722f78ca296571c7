use serde_json::Value;

/// Return contract of the send pipeline. Ephemeral; the caller records the
/// outcome into an action log entry.
#[derive(Clone, Debug, PartialEq)]
pub struct SendResult {
    /// Final HTTP status, or 0 when the last attempt failed at the
    /// transport level without a response.
    pub status: u16,
    pub data: Option<Value>,
    pub attempts: u32,
}

impl SendResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Provider message id, when the response body carried one.
    pub fn message_id(&self) -> Option<String> {
        self.data
            .as_ref()
            .and_then(|data| data.get("message_id"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}

/// Identifiers threaded through the pipeline so every retry log line can be
/// correlated back to the thread and recipient it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendContext {
    pub action: String,
    pub owner_id: String,
    pub thread_id: String,
    pub recipient_id: String,
    pub correlation_id: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::SendResult;

    #[test]
    fn two_hundreds_are_success_and_edges_are_not() {
        let result = |status| SendResult { status, data: None, attempts: 1 };
        assert!(result(200).is_success());
        assert!(result(299).is_success());
        assert!(!result(199).is_success());
        assert!(!result(300).is_success());
        assert!(!result(0).is_success());
    }

    #[test]
    fn message_id_is_read_from_the_response_body() {
        let result = SendResult {
            status: 200,
            data: Some(json!({"message_id": "mid.123", "recipient_id": "ig-1"})),
            attempts: 1,
        };
        assert_eq!(result.message_id().as_deref(), Some("mid.123"));
    }
}
