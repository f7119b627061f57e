//! Remote reply generation for adopted principles.
//!
//! Optional: when absent, failing or returning nothing, the orchestrator
//! uses its templated reply.

use crate::llm_client::{LlmClient, LlmError};
use habit_shared::user_profile::Tone;
use serde::Deserialize;
use std::sync::Arc;

const GENERATOR_SCHEMA: &str = r#"{"reply": "<the message to send to the user>"}"#;

const GENERATOR_SYSTEM_PROMPT: &str = "You are HabitLedger, a warm behavioural-finance coach. \
Write a short reply (under 150 words) that acknowledges the user's situation, \
explains the named principle in plain language and suggests the listed interventions. \
Never mention internal ids, scores or confidence values. End with one follow-up question.";

/// Everything the generator may use for one reply
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationContext {
    pub user_text: String,
    pub principle_name: String,
    pub principle_description: String,
    pub interventions: Vec<String>,
    pub reasoning: String,
    pub tone: Tone,
    /// Recent conversation transcript, may be empty
    pub conversation: String,
}

impl GenerationContext {
    fn to_prompt(&self) -> String {
        let mut prompt = format!(
            "User message: {}\nPrinciple: {} - {}\nWhy it applies: {}\nInterventions:\n{}\nTone: {}",
            self.user_text.trim(),
            self.principle_name,
            self.principle_description,
            self.reasoning,
            self.interventions
                .iter()
                .map(|i| format!("- {}", i))
                .collect::<Vec<_>>()
                .join("\n"),
            self.tone
        );
        if !self.conversation.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&self.conversation);
        }
        prompt
    }
}

/// Produces a coaching reply from a generation context
pub trait ReplyGenerator: Send + Sync {
    fn generate(&self, context: &GenerationContext) -> Result<String, LlmError>;
}

#[derive(Debug, Deserialize)]
struct GeneratorOutput {
    reply: String,
}

/// Generator backed by an `LlmClient`
pub struct LlmReplyGenerator {
    client: Arc<dyn LlmClient>,
}

impl LlmReplyGenerator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

impl ReplyGenerator for LlmReplyGenerator {
    fn generate(&self, context: &GenerationContext) -> Result<String, LlmError> {
        let value = self
            .client
            .call_json(GENERATOR_SYSTEM_PROMPT, &context.to_prompt(), GENERATOR_SCHEMA)?;
        let output: GeneratorOutput = serde_json::from_value(value)
            .map_err(|e| LlmError::InvalidJson(format!("Generator payload rejected: {}", e)))?;

        let reply = output.reply.trim();
        if reply.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(reply.to_string())
    }
}
