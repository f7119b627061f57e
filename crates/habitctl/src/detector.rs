//! Principle detection: remote classifier, then keyword fallback, then
//! adaptive re-weighting from the user's feedback history.
//!
//! Detection never fails. Every remote problem is logged and turns into a
//! keyword scan; a message that matches nothing yields a null principle
//! with confidence 0.

use crate::classifier::{build_prompt, ClassifierOutput, PrincipleClassifier};
use crate::keyword::{match_keywords, KeywordMatch};
use crate::llm_client::LlmError;
use habit_shared::detection::{clamp_confidence, DetectionResult, DetectionSource};
use habit_shared::knowledge::{BehaviouralPrinciple, KnowledgeBase};
use habit_shared::memory::UserMemory;
use habit_shared::text::preview;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Detector tuning (`[detector]` section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Confidence for a remote match that carries no hint
    pub remote_default_confidence: f32,
    /// Remote hints below this fall back to keywords
    pub min_remote_confidence: f32,
    /// Upper bound for keyword confidence
    pub keyword_confidence_cap: f32,
    pub max_context_goals: usize,
    pub max_context_struggles: usize,
    pub max_context_turns: usize,
    pub max_prompt_bytes: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            remote_default_confidence: 0.85,
            min_remote_confidence: 0.3,
            keyword_confidence_cap: 0.75,
            max_context_goals: 3,
            max_context_struggles: 3,
            max_context_turns: 4,
            max_prompt_bytes: 8192,
        }
    }
}

/// Why a remote attempt was not used
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteFailure {
    /// Client error, timeout, disabled or malformed payload
    Unavailable(LlmError),
    /// Classifier answered with no principle
    NoPrinciple,
    /// Classifier named an id the knowledge base doesn't have
    UnknownPrinciple(String),
    /// Hint below the configured minimum
    LowConfidence(f32),
}

impl std::fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(e) => write!(f, "classifier unavailable: {}", e),
            Self::NoPrinciple => write!(f, "classifier returned no principle"),
            Self::UnknownPrinciple(id) => write!(f, "classifier returned unknown principle '{}'", id),
            Self::LowConfidence(c) => write!(f, "classifier confidence {:.2} below minimum", c),
        }
    }
}

/// Accepted remote answer
#[derive(Debug, Clone)]
struct RemoteMatch<'kb> {
    principle: &'kb BehaviouralPrinciple,
    output: ClassifierOutput,
    confidence: f32,
}

/// Raw outcome before re-weighting
enum Candidate<'kb> {
    Remote(RemoteMatch<'kb>),
    Keyword(KeywordMatch<'kb>),
}

/// Detects the behavioural principle behind a message
pub struct Detector {
    kb: Arc<KnowledgeBase>,
    classifier: Option<Box<dyn PrincipleClassifier>>,
    config: DetectorConfig,
}

impl Detector {
    /// Keyword-only detector
    pub fn new(kb: Arc<KnowledgeBase>, config: DetectorConfig) -> Self {
        Self {
            kb,
            classifier: None,
            config,
        }
    }

    /// Try `classifier` before the keyword matcher
    pub fn with_classifier(mut self, classifier: Box<dyn PrincipleClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect the principle behind `text` given the user's memory
    pub fn detect(&self, text: &str, memory: &UserMemory) -> DetectionResult {
        if text.trim().is_empty() {
            debug!("Empty message, nothing to detect");
            return DetectionResult::no_match("No message was provided, so there was nothing to analyse.");
        }

        let remote = match &self.classifier {
            Some(classifier) => match self.try_remote(classifier.as_ref(), text, memory) {
                Ok(m) => Some(m),
                Err(failure) => {
                    warn!("Remote detection fell back to keywords: {}", failure);
                    None
                }
            },
            None => None,
        };

        let candidate = match remote {
            Some(m) => Candidate::Remote(m),
            None => match match_keywords(text, memory, &self.kb, self.config.keyword_confidence_cap) {
                Some(m) => Candidate::Keyword(m),
                None => {
                    debug!("No triggers matched in '{}'", preview(text, 40));
                    return DetectionResult::no_match(
                        "No behavioural pattern was recognised in the message.",
                    );
                }
            },
        };

        let result = Self::build_result(candidate);
        self.reweight(result, memory)
    }

    fn try_remote<'kb>(
        &'kb self,
        classifier: &dyn PrincipleClassifier,
        text: &str,
        memory: &UserMemory,
    ) -> Result<RemoteMatch<'kb>, RemoteFailure> {
        let prompt = build_prompt(text, memory, &self.config);
        let output = classifier.classify(&prompt).map_err(RemoteFailure::Unavailable)?;

        let id = output.principle_id.clone().ok_or(RemoteFailure::NoPrinciple)?;
        let principle = self
            .kb
            .lookup(&id)
            .ok_or_else(|| RemoteFailure::UnknownPrinciple(id.clone()))?;

        let confidence = match output.confidence_hint {
            Some(hint) => {
                let hint = clamp_confidence(hint);
                if hint < self.config.min_remote_confidence {
                    return Err(RemoteFailure::LowConfidence(hint));
                }
                hint
            }
            None => self.config.remote_default_confidence,
        };

        info!("Remote classifier matched {} ({:.2})", principle.id, confidence);
        Ok(RemoteMatch {
            principle,
            output,
            confidence,
        })
    }

    fn build_result(candidate: Candidate<'_>) -> DetectionResult {
        match candidate {
            Candidate::Remote(m) => {
                let interventions = if m.output.interventions.is_empty() {
                    m.principle.interventions.clone()
                } else {
                    m.output.interventions
                };
                let reasoning = if m.output.reasoning.trim().is_empty() {
                    format!("This sounds related to {}.", m.principle.name)
                } else {
                    m.output.reasoning
                };
                DetectionResult {
                    principle_id: Some(m.principle.id.clone()),
                    confidence: clamp_confidence(m.confidence),
                    interventions,
                    reasoning,
                    triggers_matched: m.output.triggers_matched,
                    source: DetectionSource::Remote,
                    adjusted_by_history: false,
                }
            }
            Candidate::Keyword(m) => {
                info!(
                    "Keyword matcher chose {} ({:.2}, {} trigger(s))",
                    m.principle.id,
                    m.confidence,
                    m.matched.len()
                );
                DetectionResult {
                    principle_id: Some(m.principle.id.clone()),
                    confidence: clamp_confidence(m.confidence),
                    interventions: m.principle.interventions.clone(),
                    reasoning: m.reasoning(),
                    triggers_matched: m.matched,
                    source: DetectionSource::Keyword,
                    adjusted_by_history: false,
                }
            }
        }
    }

    /// Scale confidence by past effectiveness when the user has any
    fn reweight(&self, result: DetectionResult, memory: &UserMemory) -> DetectionResult {
        let Some(id) = result.principle_id.as_deref() else {
            return result;
        };
        let Some(rate) = memory.success_rate_for(id) else {
            return result;
        };

        let raw = result.confidence;
        let adjusted = reweight_confidence(raw, rate);
        debug!("Re-weighted {} from {:.2} to {:.2} (success rate {:.2})", id, raw, adjusted, rate);

        let mut result = result.with_confidence(adjusted);
        result.adjusted_by_history = true;
        result
    }
}

/// raw * (0.5 + 0.5 * rate), clamped to [0, 1]
pub fn reweight_confidence(raw: f32, success_rate: f32) -> f32 {
    let rate = clamp_confidence(success_rate);
    clamp_confidence(clamp_confidence(raw) * (0.5 + 0.5 * rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::LlmClassifier;
    use crate::llm_client::FakeLlmClient;
    use serde_json::json;

    fn kb() -> Arc<KnowledgeBase> {
        Arc::new(KnowledgeBase::load().unwrap())
    }

    fn remote(response: Result<serde_json::Value, LlmError>) -> Detector {
        let kb = kb();
        let classifier = LlmClassifier::new(Arc::new(FakeLlmClient::new(vec![response])), &kb);
        Detector::new(kb, DetectorConfig::default()).with_classifier(Box::new(classifier))
    }

    #[test]
    fn test_remote_match_default_confidence() {
        let detector = remote(Ok(json!({
            "principle_id": "loss_aversion",
            "reasoning": "Worried about losing the streak"
        })));
        let r = detector.detect("I'm scared I'll ruin my savings run", &UserMemory::new("u"));
        assert_eq!(r.principle_id.as_deref(), Some("loss_aversion"));
        assert_eq!(r.source, DetectionSource::Remote);
        assert_eq!(r.confidence, 0.85);
        assert_eq!(r.reasoning, "Worried about losing the streak");
        assert!(!r.interventions.is_empty());
    }

    #[test]
    fn test_remote_hint_used() {
        let detector = remote(Ok(json!({"principle_id": "micro_habits", "confidence": 0.65})));
        let r = detector.detect("it all feels like too much", &UserMemory::new("u"));
        assert_eq!(r.confidence, 0.65);
        assert_eq!(r.source, DetectionSource::Remote);
    }

    #[test]
    fn test_classifier_error_falls_back() {
        let detector = remote(Err(LlmError::HttpError("connection refused".into())));
        let r = detector.detect("I keep ordering food delivery", &UserMemory::new("u"));
        assert_eq!(r.source, DetectionSource::Keyword);
        assert!(r.is_match());
    }

    #[test]
    fn test_unknown_id_falls_back() {
        let detector = remote(Ok(json!({"principle_id": "anchoring", "confidence": 0.9})));
        let r = detector.detect("hello", &UserMemory::new("u"));
        assert_eq!(r.source, DetectionSource::Keyword);
        assert!(!r.is_match());
    }

    #[test]
    fn test_low_hint_falls_back() {
        let detector = remote(Ok(json!({"principle_id": "loss_aversion", "confidence": 0.1})));
        let r = detector.detect("I feel guilty", &UserMemory::new("u"));
        assert_eq!(r.source, DetectionSource::Keyword);
        assert_eq!(r.principle_id.as_deref(), Some("loss_aversion"));
    }

    #[test]
    fn test_null_principle_falls_back() {
        let detector = remote(Ok(json!({"principle_id": null, "reasoning": "small talk"})));
        let r = detector.detect("hello", &UserMemory::new("u"));
        assert_eq!(r.source, DetectionSource::Keyword);
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn test_empty_text_is_no_match() {
        let detector = remote(Ok(json!({"principle_id": "loss_aversion"})));
        let r = detector.detect("   ", &UserMemory::new("u"));
        assert!(!r.is_match());
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.source, DetectionSource::Keyword);
        assert!(r.reasoning.contains("No message"));
    }

    #[test]
    fn test_reweight_with_history() {
        let detector = remote(Ok(json!({"principle_id": "loss_aversion", "confidence": 0.5})));
        let mut memory = UserMemory::new("u");
        for _ in 0..10 {
            memory.record_intervention_feedback("loss_aversion", false);
        }
        let r = detector.detect("I lost my streak", &memory);
        assert_eq!(r.confidence, 0.25);
        assert!(r.adjusted_by_history);
    }

    #[test]
    fn test_reweight_formula_bounds() {
        assert_eq!(reweight_confidence(0.5, 0.0), 0.25);
        assert_eq!(reweight_confidence(0.8, 1.0), 0.8);
        assert!((reweight_confidence(0.6, 0.5) - 0.45).abs() < 1e-6);
        // Not rounded: 0.59775 must stay below a 0.6 threshold
        assert!(reweight_confidence(0.797, 0.5) < 0.6);
        for raw in [-1.0, 0.0, 0.3, 1.0, 2.5, f32::NAN] {
            for rate in [-0.5, 0.0, 0.5, 1.0, 3.0] {
                let c = reweight_confidence(raw, rate);
                assert!((0.0..=1.0).contains(&c), "{} {} -> {}", raw, rate, c);
            }
        }
    }

    #[test]
    fn test_no_history_leaves_confidence() {
        let detector = Detector::new(kb(), DetectorConfig::default());
        let r = detector.detect("I keep ordering food delivery", &UserMemory::new("u"));
        assert!(!r.adjusted_by_history);
        assert!(!detector.has_classifier());
    }
}
