//! Instagram channel plumbing: webhook payload decoding, the Graph API send
//! transport, and the bounded-retry send pipeline.

pub mod events;
pub mod pipeline;
pub mod send;

pub use events::{CommentEvent, DmEvent, InboundEvent, WebhookEnvelope};
pub use pipeline::{send_with_retry, Sleeper, TokioSleeper};
pub use send::{GraphSendTransport, SendAttempt, SendRequest, SendTarget, SendTransport, TransportError};
