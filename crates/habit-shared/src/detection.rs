//! Detection result produced once per turn by the detector.

use serde::{Deserialize, Serialize};

/// Which strategy produced a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// Remote classifier
    Remote,
    /// Deterministic keyword matcher
    Keyword,
}

impl std::fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote => write!(f, "remote"),
            Self::Keyword => write!(f, "keyword"),
        }
    }
}

/// Outcome of principle detection for a single message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Matched principle, if any
    pub principle_id: Option<String>,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Recommended interventions, best first
    pub interventions: Vec<String>,
    /// Why this principle was (or wasn't) chosen
    pub reasoning: String,
    /// Triggers/phrases that led to the match
    #[serde(default)]
    pub triggers_matched: Vec<String>,
    pub source: DetectionSource,
    /// Whether feedback history changed the confidence
    #[serde(default)]
    pub adjusted_by_history: bool,
}

impl DetectionResult {
    /// No principle applies
    pub fn no_match(reasoning: impl Into<String>) -> Self {
        Self {
            principle_id: None,
            confidence: 0.0,
            interventions: Vec::new(),
            reasoning: reasoning.into(),
            triggers_matched: Vec::new(),
            source: DetectionSource::Keyword,
            adjusted_by_history: false,
        }
    }

    pub fn is_match(&self) -> bool {
        self.principle_id.is_some()
    }

    /// Copy with a different confidence, clamped to [0, 1]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }
}

/// Clamp to [0, 1]; NaN becomes 0
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match() {
        let r = DetectionResult::no_match("nothing");
        assert!(!r.is_match());
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.source, DetectionSource::Keyword);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f32::NAN), 0.0);
        assert_eq!(DetectionResult::no_match("x").with_confidence(3.0).confidence, 1.0);
    }

    #[test]
    fn test_source_serde() {
        assert_eq!(serde_json::to_string(&DetectionSource::Remote).unwrap(), "\"remote\"");
        assert_eq!(DetectionSource::Keyword.to_string(), "keyword");
    }
}
