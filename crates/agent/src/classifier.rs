use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm::LlmClient;

/// Longest message slice handed to the model, in characters.
const MAX_CLASSIFIER_INPUT_CHARS: usize = 1200;

/// Confidence attached to the fail-open fallback verdict.
const FALLBACK_CONFIDENCE: f32 = 0.2;

/// Verdict on whether an inbound message needs a human response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HrnClassification {
    pub hrn: bool,
    pub confidence: f32,
    #[serde(default)]
    pub signals: Vec<String>,
    #[serde(default)]
    pub reason: String,
}

impl HrnClassification {
    /// Classifier unavailable or incoherent: automation stays on and the
    /// verdict says so, so downstream consumers can tell it apart from a
    /// confident negative.
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            hrn: false,
            confidence: FALLBACK_CONFIDENCE,
            signals: Vec::new(),
            reason: reason.into(),
        }
    }
}

pub struct HrnClassifier {
    llm: Arc<dyn LlmClient>,
}

impl HrnClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Classifies one inbound message. Infallible by design: any model or
    /// parse failure degrades to the fallback verdict instead of blocking
    /// the pipeline that spawned it.
    pub async fn classify(&self, message_text: &str) -> HrnClassification {
        let input = truncate_chars(message_text, MAX_CLASSIFIER_INPUT_CHARS);
        let prompt = build_prompt(input);

        let raw = match self.llm.complete(&prompt).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "hrn.classifier_unavailable",
                    error = %error,
                    "classifier completion failed, falling back to auto-ok"
                );
                return HrnClassification::fallback("classifier unavailable");
            }
        };

        match parse_verdict(&raw) {
            Some(verdict) => verdict,
            None => {
                warn!(
                    event_name = "hrn.classifier_unparseable",
                    raw_length = raw.len(),
                    "classifier output was not valid verdict JSON, falling back to auto-ok"
                );
                HrnClassification::fallback("classifier output unparseable")
            }
        }
    }
}

fn build_prompt(message_text: &str) -> String {
    format!(
        "You triage inbound Instagram messages for a business inbox. Decide whether \
         the message needs a HUMAN response (complaints, refund or cancellation \
         requests, legal threats, complex account issues, distress) or can be \
         handled by automation (greetings, simple product questions, keyword \
         requests).\n\n\
         Reply with JSON only, no prose:\n\
         {{\"hrn\": true|false, \"confidence\": 0.0-1.0, \"signals\": [\"...\"], \"reason\": \"...\"}}\n\n\
         Message:\n{message_text}"
    )
}

/// Parses the model output, tolerating a fenced code block around the JSON.
fn parse_verdict(raw: &str) -> Option<HrnClassification> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();

    let verdict: HrnClassification = serde_json::from_str(body).ok()?;
    if !(0.0..=1.0).contains(&verdict.confidence) {
        return None;
    }
    Some(verdict)
}

/// Truncates to at most `max_chars` characters without splitting a char.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
