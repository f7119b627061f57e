//! Remote principle classifier.
//!
//! Builds a compact prompt from the message and a capped slice of memory,
//! asks the LLM to pick a principle, and deserialises the answer into a
//! strict `ClassifierOutput`. Payloads that don't fit are discarded as
//! `LlmError::InvalidJson`.

use crate::detector::DetectorConfig;
use crate::llm_client::{LlmClient, LlmError};
use habit_shared::knowledge::KnowledgeBase;
use habit_shared::memory::UserMemory;
use habit_shared::streaks::habit_title;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// JSON shape the model must return
pub const CLASSIFIER_SCHEMA: &str = r#"{"principle_id": "<id from the list, or null>", "reasoning": "<one sentence>", "confidence": <0.0-1.0 or null>, "interventions": ["<up to 3 short suggestions>"], "triggers_matched": ["<phrases from the message>"]}"#;

/// Classifier answer, validated for shape but not yet against the knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierOutput {
    pub principle_id: Option<String>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, alias = "confidence")]
    pub confidence_hint: Option<f32>,
    #[serde(default)]
    pub interventions: Vec<String>,
    #[serde(default)]
    pub triggers_matched: Vec<String>,
}

/// Anything that can map a prompt to a principle
pub trait PrincipleClassifier: Send + Sync {
    fn classify(&self, prompt: &str) -> Result<ClassifierOutput, LlmError>;
}

/// Classifier backed by an `LlmClient`
pub struct LlmClassifier {
    client: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl LlmClassifier {
    /// The system prompt lists every principle in `kb`
    pub fn new(client: Arc<dyn LlmClient>, kb: &KnowledgeBase) -> Self {
        Self {
            client,
            system_prompt: build_system_prompt(kb),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

impl PrincipleClassifier for LlmClassifier {
    fn classify(&self, prompt: &str) -> Result<ClassifierOutput, LlmError> {
        let value = self
            .client
            .call_json(&self.system_prompt, prompt, CLASSIFIER_SCHEMA)?;
        parse_classifier_output(value)
    }
}

/// Deserialise a raw payload into the strict output type
pub fn parse_classifier_output(value: serde_json::Value) -> Result<ClassifierOutput, LlmError> {
    let mut output: ClassifierOutput = serde_json::from_value(value)
        .map_err(|e| LlmError::InvalidJson(format!("Classifier payload rejected: {}", e)))?;

    output.principle_id = output
        .principle_id
        .map(|id| id.trim().to_lowercase())
        .filter(|id| !id.is_empty() && id != "null" && id != "none");
    output.interventions.retain(|i| !i.trim().is_empty());
    Ok(output)
}

fn build_system_prompt(kb: &KnowledgeBase) -> String {
    let principles: Vec<String> = kb
        .principles()
        .iter()
        .map(|p| format!("- {}: {} ({})", p.id, p.name, p.description))
        .collect();

    format!(
        r#"You are a behavioural-finance coach. Decide which behavioural-economics principle best explains the user's situation.

Principles:
{}

Rules: pick exactly one id from the list, or null if none applies. Use the user's history only as supporting context.
Output ONLY the JSON object. No explanation, no markdown, no extra text."#,
        principles.join("\n")
    )
}

/// Build the per-turn prompt: the message plus a capped memory summary.
///
/// The result never exceeds `config.max_prompt_bytes`; the memory context
/// is dropped first, then the message itself is truncated.
pub fn build_prompt(text: &str, memory: &UserMemory, config: &DetectorConfig) -> String {
    let message = format!("User message: {}", text.trim());
    let context = memory_context(memory, config);

    let full = if context.is_empty() {
        message.clone()
    } else {
        format!("{}\n\n{}", message, context)
    };

    if full.len() <= config.max_prompt_bytes {
        return full;
    }
    debug!(
        "Classifier prompt is {} bytes, dropping memory context (limit {})",
        full.len(),
        config.max_prompt_bytes
    );
    truncate_bytes(&message, config.max_prompt_bytes)
}

fn memory_context(memory: &UserMemory, config: &DetectorConfig) -> String {
    let mut parts = Vec::new();

    let goals: Vec<String> = memory
        .active_goals()
        .take(config.max_context_goals)
        .map(|g| g.description.clone())
        .collect();
    if !goals.is_empty() {
        parts.push(format!("Active goals: {}", goals.join("; ")));
    }

    let streaks: Vec<String> = memory
        .active_streaks()
        .into_iter()
        .map(|(habit, s)| format!("{} ({} in a row)", habit_title(habit), s.current))
        .collect();
    if !streaks.is_empty() {
        parts.push(format!("Current streaks: {}", streaks.join(", ")));
    }

    let struggles: Vec<String> = memory
        .recent_struggles(config.max_context_struggles)
        .into_iter()
        .map(|s| s.description.clone())
        .collect();
    if !struggles.is_empty() {
        parts.push(format!("Recent struggles: {}", struggles.join("; ")));
    }

    let conversation = memory.conversation_context(config.max_context_turns);
    if !conversation.is_empty() {
        parts.push(conversation);
    }

    if !parts.is_empty() {
        parts.push(format!("Preferred tone: {}", memory.profile.preferred_tone));
    }

    parts.join("\n")
}

/// Truncate to at most `max` bytes on a char boundary
fn truncate_bytes(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::FakeLlmClient;
    use chrono::Utc;
    use habit_shared::memory::Goal;
    use serde_json::json;

    #[test]
    fn test_parse_full_payload() {
        let out = parse_classifier_output(json!({
            "principle_id": " Loss_Aversion ",
            "reasoning": "fear of losing progress",
            "confidence": 0.9,
            "interventions": ["Visualise the loss", ""],
            "triggers_matched": ["lose"]
        }))
        .unwrap();
        assert_eq!(out.principle_id.as_deref(), Some("loss_aversion"));
        assert_eq!(out.confidence_hint, Some(0.9));
        assert_eq!(out.interventions, vec!["Visualise the loss"]);
    }

    #[test]
    fn test_parse_null_principle() {
        let out = parse_classifier_output(json!({"principle_id": null, "reasoning": "chit-chat"})).unwrap();
        assert!(out.principle_id.is_none());
        assert!(out.confidence_hint.is_none());

        let out = parse_classifier_output(json!({"principle_id": "none"})).unwrap();
        assert!(out.principle_id.is_none());
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        let err = parse_classifier_output(json!({"principle_id": 7})).unwrap_err();
        assert!(matches!(err, LlmError::InvalidJson(_)));
        let err = parse_classifier_output(json!({"principle_id": "x", "confidence": "high"})).unwrap_err();
        assert!(matches!(err, LlmError::InvalidJson(_)));
    }

    #[test]
    fn test_llm_classifier_passes_errors_through() {
        let kb = KnowledgeBase::load().unwrap();
        let classifier = LlmClassifier::new(Arc::new(FakeLlmClient::always_error(LlmError::Timeout(5))), &kb);
        assert_eq!(classifier.classify("User message: hi"), Err(LlmError::Timeout(5)));
        assert!(classifier.system_prompt().contains("loss_aversion"));
    }

    #[test]
    fn test_prompt_includes_capped_context() {
        let config = DetectorConfig {
            max_context_goals: 1,
            ..Default::default()
        };
        let mut memory = UserMemory::new("u");
        memory.add_goal(Goal::new("Emergency fund"));
        memory.add_goal(Goal::new("Pay off card"));
        memory.update_streak("no_food_delivery", true, Utc::now());
        memory.record_struggle("Weekend overspending", Utc::now());

        let prompt = build_prompt("I overspent again", &memory, &config);
        assert!(prompt.starts_with("User message: I overspent again"));
        assert!(prompt.contains("Active goals: Emergency fund"));
        assert!(!prompt.contains("Pay off card"));
        assert!(prompt.contains("No Food Delivery (1 in a row)"));
        assert!(prompt.contains("Weekend overspending"));
        assert!(prompt.contains("Preferred tone: supportive"));
    }

    #[test]
    fn test_prompt_respects_byte_limit() {
        let config = DetectorConfig {
            max_prompt_bytes: 64,
            ..Default::default()
        };
        let mut memory = UserMemory::new("u");
        memory.record_struggle(&"x".repeat(200), Utc::now());

        let prompt = build_prompt(&"é".repeat(100), &memory, &config);
        assert!(prompt.len() <= 64);
        assert!(prompt.starts_with("User message: "));
    }

    #[test]
    fn test_prompt_without_memory() {
        let prompt = build_prompt("hello", &UserMemory::new("u"), &DetectorConfig::default());
        assert_eq!(prompt, "User message: hello");
    }
}
