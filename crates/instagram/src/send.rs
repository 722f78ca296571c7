use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;

/// Where a reply goes: a DM thread or a public comment thread.
#[derive(Clone, Debug)]
pub enum SendTarget {
    DirectMessage { recipient_id: String },
    CommentReply { comment_id: String },
}

#[derive(Clone, Debug)]
pub struct SendRequest {
    pub target: SendTarget,
    pub text: String,
    pub access_token: SecretString,
}

/// One provider round trip: HTTP status plus whatever JSON came back.
#[derive(Clone, Debug)]
pub struct SendAttempt {
    pub status: u16,
    pub body: Option<Value>,
}

impl SendAttempt {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never reached the provider: connect failure, timeout, or a
/// broken response stream. Distinct from an HTTP error status, which is a
/// completed attempt.
#[derive(Debug, Error)]
#[error("send transport failure: {0}")]
pub struct TransportError(pub String);

#[async_trait]
pub trait SendTransport: Send + Sync {
    async fn send(&self, request: &SendRequest) -> Result<SendAttempt, TransportError>;
}

/// Graph API transport for outbound replies.
pub struct GraphSendTransport {
    http: reqwest::Client,
    base_url: String,
}

impl GraphSendTransport {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|error| TransportError(error.to_string()))?;
        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_string() })
    }

    fn request_parts(&self, request: &SendRequest) -> (String, Value) {
        match &request.target {
            SendTarget::DirectMessage { recipient_id } => (
                format!("{}/me/messages", self.base_url),
                json!({
                    "recipient": {"id": recipient_id},
                    "message": {"text": request.text},
                }),
            ),
            SendTarget::CommentReply { comment_id } => (
                format!("{}/{}/replies", self.base_url, comment_id),
                json!({"message": request.text}),
            ),
        }
    }
}

#[async_trait]
impl SendTransport for GraphSendTransport {
    async fn send(&self, request: &SendRequest) -> Result<SendAttempt, TransportError> {
        let (url, payload) = self.request_parts(request);

        let response = self
            .http
            .post(url)
            .bearer_auth(request.access_token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|error| TransportError(error.to_string()))?;

        let status = response.status().as_u16();
        // Error bodies still carry retry hints; keep whatever parses.
        let body = response.json::<Value>().await.ok();

        Ok(SendAttempt { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::{GraphSendTransport, SendRequest, SendTarget};

    fn request(target: SendTarget) -> SendRequest {
        SendRequest { target, text: "hello".to_string(), access_token: "tok".to_string().into() }
    }

    #[test]
    fn dm_target_posts_to_me_messages() {
        let transport =
            GraphSendTransport::new("https://graph.instagram.com/v21.0/", 10).expect("transport");
        let (url, payload) = transport
            .request_parts(&request(SendTarget::DirectMessage { recipient_id: "ig-900".into() }));

        assert_eq!(url, "https://graph.instagram.com/v21.0/me/messages");
        assert_eq!(payload["recipient"]["id"], "ig-900");
        assert_eq!(payload["message"]["text"], "hello");
    }

    #[test]
    fn comment_target_posts_to_replies() {
        let transport =
            GraphSendTransport::new("https://graph.instagram.com/v21.0", 10).expect("transport");
        let (url, payload) =
            transport.request_parts(&request(SendTarget::CommentReply { comment_id: "c-17".into() }));

        assert_eq!(url, "https://graph.instagram.com/v21.0/c-17/replies");
        assert_eq!(payload["message"], "hello");
    }
}
