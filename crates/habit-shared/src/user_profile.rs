//! Coaching profile for a user.
//!
//! Tracks how the user likes to be coached and how quickly they are picking
//! things up. The profile is stored inside `UserMemory`.

use serde::{Deserialize, Serialize};

/// Three-step scale used for engagement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    #[default]
    Medium,
    High,
}

impl Level {
    /// Next step up, saturating at High
    pub fn raised(self) -> Self {
        match self {
            Level::Low => Level::Medium,
            Level::Medium | Level::High => Level::High,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// How fast the user adopts interventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningSpeed {
    Slow,
    #[default]
    Moderate,
    Fast,
}

impl LearningSpeed {
    pub fn raised(self) -> Self {
        match self {
            LearningSpeed::Slow => LearningSpeed::Moderate,
            LearningSpeed::Moderate | LearningSpeed::Fast => LearningSpeed::Fast,
        }
    }
}

impl std::fmt::Display for LearningSpeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slow => write!(f, "slow"),
            Self::Moderate => write!(f, "moderate"),
            Self::Fast => write!(f, "fast"),
        }
    }
}

/// Tone the coach should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Supportive,
    Direct,
    Educational,
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Supportive => write!(f, "supportive"),
            Self::Direct => write!(f, "direct"),
            Self::Educational => write!(f, "educational"),
        }
    }
}

/// User coaching preferences and observed traits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    /// Free-form motivation style ("achievement", "social", ...); "unknown" until learned
    pub motivation_style: String,
    pub risk_tolerance: Level,
    pub engagement_level: Level,
    pub preferred_tone: Tone,
    pub learning_speed: LearningSpeed,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            motivation_style: "unknown".to_string(),
            risk_tolerance: Level::Medium,
            engagement_level: Level::Medium,
            preferred_tone: Tone::Supportive,
            learning_speed: LearningSpeed::Moderate,
        }
    }
}

/// Signals observed after an interaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionOutcome {
    /// User engaged with the suggestion
    pub engaged: bool,
    /// User reported the intervention worked
    pub intervention_successful: bool,
}

impl UserProfile {
    /// Nudge engagement and learning speed upwards from observed signals
    pub fn update_from_interaction(&mut self, outcome: InteractionOutcome) {
        if outcome.engaged {
            self.engagement_level = self.engagement_level.raised();
        }
        if outcome.intervention_successful {
            self.learning_speed = self.learning_speed.raised();
        }
    }
}
