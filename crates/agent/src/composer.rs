use std::sync::Arc;

use tera::{Context as TemplateContext, Tera};
use thiserror::Error;

use replyflow_core::domain::automation::{Automation, ResponseType};

use crate::llm::LlmClient;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("reply generation failed: {0}")]
    Generation(String),
    #[error("template rendering failed: {0}")]
    Template(String),
    #[error("composed reply was empty")]
    EmptyReply,
}

/// Event fields a template or prompt may reference.
pub struct ReplyInputs<'a> {
    pub message_text: &'a str,
    pub username: &'a str,
}

/// Turns a matched automation into outgoing reply text.
pub struct ReplyComposer {
    llm: Arc<dyn LlmClient>,
}

impl ReplyComposer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn compose(
        &self,
        automation: &Automation,
        inputs: &ReplyInputs<'_>,
    ) -> Result<String, ComposeError> {
        let reply = match automation.response_type {
            ResponseType::Fixed => automation.response_content.clone(),
            ResponseType::AiPrompt => self.compose_from_prompt(automation, inputs).await?,
            ResponseType::GenericTemplate => render_template(automation, inputs)?,
        };

        let trimmed = reply.trim();
        if trimmed.is_empty() {
            return Err(ComposeError::EmptyReply);
        }
        Ok(trimmed.to_string())
    }

    async fn compose_from_prompt(
        &self,
        automation: &Automation,
        inputs: &ReplyInputs<'_>,
    ) -> Result<String, ComposeError> {
        let prompt = format!(
            "{instructions}\n\n\
             You are replying on behalf of a business Instagram account. Write the \
             reply text only, with no preamble or quotes.\n\n\
             Customer ({username}) wrote:\n{message}",
            instructions = automation.response_content,
            username = inputs.username,
            message = inputs.message_text,
        );

        self.llm
            .complete(&prompt)
            .await
            .map_err(|error| ComposeError::Generation(error.to_string()))
    }
}

fn render_template(
    automation: &Automation,
    inputs: &ReplyInputs<'_>,
) -> Result<String, ComposeError> {
    let mut context = TemplateContext::new();
    context.insert("username", inputs.username);
    context.insert("message_text", inputs.message_text);
    context.insert("trigger_word", &automation.trigger_word);

    Tera::one_off(&automation.response_content, &context, false)
        .map_err(|error| ComposeError::Template(error.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::Utc;

    use replyflow_core::domain::automation::{
        Automation, AutomationId, ResponseType, TriggerScope,
    };

    use super::{ComposeError, ReplyComposer, ReplyInputs};
    use crate::llm::LlmClient;

    struct ScriptedLlm {
        response: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            match self.response {
                Ok(text) => Ok(text.to_string()),
                Err(message) => bail!(message),
            }
        }
    }

    fn automation(response_type: ResponseType, response_content: &str) -> Automation {
        let now = Utc::now();
        Automation {
            id: AutomationId("A-1".to_string()),
            owner_id: "acct-1".to_string(),
            trigger_word: "demo".to_string(),
            response_type,
            response_content: response_content.to_string(),
            is_active: true,
            trigger_scope: TriggerScope::Dm,
            comment_reply_count: None,
            comment_reply_text: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn inputs() -> ReplyInputs<'static> {
        ReplyInputs { message_text: "can I get a demo?", username: "jordan" }
    }

    fn composer(response: Result<&'static str, &'static str>) -> ReplyComposer {
        ReplyComposer::new(Arc::new(ScriptedLlm { response }))
    }

    #[tokio::test]
    async fn fixed_replies_are_sent_verbatim() {
        let composer = composer(Err("llm must not be called"));
        let automation = automation(ResponseType::Fixed, "Here is the demo link!");

        let reply = composer.compose(&automation, &inputs()).await.expect("compose");
        assert_eq!(reply, "Here is the demo link!");
    }

    #[tokio::test]
    async fn ai_prompt_replies_come_from_the_model() {
        let composer = composer(Ok("Sure! Grab a slot at example.com/demo."));
        let automation =
            automation(ResponseType::AiPrompt, "Offer the demo booking link politely.");

        let reply = composer.compose(&automation, &inputs()).await.expect("compose");
        assert_eq!(reply, "Sure! Grab a slot at example.com/demo.");
    }

    #[tokio::test]
    async fn model_failure_surfaces_as_generation_error() {
        let composer = composer(Err("connection refused"));
        let automation = automation(ResponseType::AiPrompt, "Offer the link.");

        let error = composer.compose(&automation, &inputs()).await.expect_err("should fail");
        assert!(matches!(error, ComposeError::Generation(_)));
    }

    #[tokio::test]
    async fn templates_render_event_variables() {
        let composer = composer(Err("llm must not be called"));
        let automation =
            automation(ResponseType::GenericTemplate, "Hey {{ username }}, demo link incoming!");

        let reply = composer.compose(&automation, &inputs()).await.expect("compose");
        assert_eq!(reply, "Hey jordan, demo link incoming!");
    }

    #[tokio::test]
    async fn whitespace_only_replies_are_rejected() {
        let composer = composer(Ok("   \n"));
        let automation = automation(ResponseType::AiPrompt, "Offer the link.");

        let error = composer.compose(&automation, &inputs()).await.expect_err("should fail");
        assert!(matches!(error, ComposeError::EmptyReply));
    }
}
