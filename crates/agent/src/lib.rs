//! LLM-backed text work: reply composition and the human-response classifier.
//!
//! The model is strictly a text producer here. It never decides whether a
//! reply is sent (trigger matching is deterministic) and it never touches
//! credentials or the send pipeline. Classification output feeds a per-thread
//! flag that humans act on; a misclassification degrades routing, not safety.

pub mod classifier;
pub mod composer;
pub mod llm;

pub use classifier::{HrnClassification, HrnClassifier};
pub use composer::{ComposeError, ReplyComposer, ReplyInputs};
pub use llm::{HttpLlmClient, LlmClient};
