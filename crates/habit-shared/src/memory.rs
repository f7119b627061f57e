//! Per-user memory: goals, streaks, struggles, feedback and conversation.
//!
//! `UserMemory` is the aggregate root for one user. It is owned by whoever
//! is handling that user's turn; the coach never keeps a reference to it.
//! Every field defaults, so partially written or older files still load.

use crate::detection::DetectionSource;
use crate::knowledge::KnowledgeBase;
use crate::streaks::StreakData;
use crate::text::{normalize, preview};
use crate::user_profile::UserProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

/// Maximum characters per turn when building conversation context
pub const MAX_CONVERSATION_CONTEXT_LENGTH: usize = 100;

/// Default minimum uses before a principle counts as "effective"
pub const DEFAULT_MIN_USES: u32 = 2;

/// A financial goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
}

impl Goal {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            target: None,
            created_at: Utc::now(),
            completed: false,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// A recurring difficulty the user mentioned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Struggle {
    pub description: String,
    #[serde(default = "Utc::now")]
    pub first_noted: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_noted: DateTime<Utc>,
    /// Times this struggle was noted
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

/// Success/failure tally for one principle's interventions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterventionFeedback {
    #[serde(default)]
    pub successes: u32,
    #[serde(default)]
    pub failures: u32,
}

impl InterventionFeedback {
    pub fn record(&mut self, success: bool) {
        if success {
            self.successes = self.successes.saturating_add(1);
        } else {
            self.failures = self.failures.saturating_add(1);
        }
    }

    pub fn total(&self) -> u32 {
        self.successes.saturating_add(self.failures)
    }

    /// successes / total, 0 when nothing was recorded
    pub fn success_rate(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.successes as f64 / total as f64) as f32
    }
}

/// An intervention the coach suggested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionRecord {
    pub id: Uuid,
    pub principle_id: String,
    pub description: String,
    pub date: DateTime<Utc>,
}

/// How often a principle has been adopted for this user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviourPattern {
    #[serde(default)]
    pub occurrences: u32,
    #[serde(default = "Utc::now")]
    pub last_detected: DateTime<Utc>,
}

/// Conversation participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "User"),
            Self::Assistant => write!(f, "Coach"),
            Self::System => write!(f, "System"),
        }
    }
}

/// Kind of assistant reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    /// Clarifying question, no principle adopted
    Clarification,
    /// Templated coaching reply
    Coaching,
    /// Reply written by the remote generator
    Generated,
}

/// Structured facts about an assistant turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    pub kind: ReplyKind,
    /// Principle the reply was about (tentative for clarifications)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principle_id: Option<String>,
    /// Index of the clarifying question asked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DetectionSource>,
}

/// One message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TurnMetadata>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: at,
            metadata: None,
        }
    }

    pub fn assistant(content: impl Into<String>, at: DateTime<Utc>, metadata: TurnMetadata) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: at,
            metadata: Some(metadata),
        }
    }
}

/// All state kept for one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserMemory {
    pub user_id: String,
    pub goals: Vec<Goal>,
    /// habit name -> counters
    pub streaks: BTreeMap<String, StreakData>,
    pub struggles: Vec<Struggle>,
    /// principle id -> tally
    pub intervention_feedback: BTreeMap<String, InterventionFeedback>,
    pub interventions: Vec<InterventionRecord>,
    /// principle id -> adoption tally
    pub behaviour_patterns: BTreeMap<String, BehaviourPattern>,
    pub conversation_history: Vec<ConversationTurn>,
    pub profile: UserProfile,
    pub last_check_in: Option<DateTime<Utc>>,
}

impl UserMemory {
    /// Empty memory for a first-contact user
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Nothing recorded beyond conversation
    pub fn is_blank(&self) -> bool {
        self.goals.is_empty()
            && self.streaks.is_empty()
            && self.struggles.is_empty()
            && self.intervention_feedback.is_empty()
            && self.behaviour_patterns.is_empty()
    }

    // === Goals ===

    /// Add a goal, returning its index
    pub fn add_goal(&mut self, goal: Goal) -> usize {
        self.goals.push(goal);
        self.goals.len() - 1
    }

    /// Mark goal at `index` as completed. Returns false if out of range.
    pub fn complete_goal(&mut self, index: usize) -> bool {
        match self.goals.get_mut(index) {
            Some(goal) => {
                goal.completed = true;
                true
            }
            None => false,
        }
    }

    pub fn active_goals(&self) -> impl Iterator<Item = &Goal> {
        self.goals.iter().filter(|g| !g.completed)
    }

    // === Streaks ===

    /// Record a habit check-in; creates the streak on first use
    pub fn update_streak(&mut self, habit: &str, success: bool, at: DateTime<Utc>) -> &StreakData {
        let streak = self.streaks.entry(habit.to_string()).or_default();
        if success {
            streak.record_success(at);
        } else {
            streak.record_miss(at);
        }
        self.last_check_in = Some(at);
        streak
    }

    /// Streaks with current > 0
    pub fn active_streaks(&self) -> Vec<(&str, &StreakData)> {
        self.streaks
            .iter()
            .filter(|(_, s)| s.is_active())
            .map(|(k, s)| (k.as_str(), s))
            .collect()
    }

    /// Streaks at zero that once had a best > 0
    pub fn broken_streaks(&self) -> Vec<(&str, &StreakData)> {
        self.streaks
            .iter()
            .filter(|(_, s)| s.is_broken())
            .map(|(k, s)| (k.as_str(), s))
            .collect()
    }

    // === Struggles ===

    /// Record a struggle, merging with a near-identical existing one
    pub fn record_struggle(&mut self, description: &str, at: DateTime<Utc>) {
        let key = normalize(description);
        if key.is_empty() {
            return;
        }

        if let Some(existing) = self
            .struggles
            .iter_mut()
            .find(|s| normalize(&s.description) == key)
        {
            existing.count = existing.count.saturating_add(1);
            existing.last_noted = at;
            debug!("Struggle merged (count {})", existing.count);
        } else {
            self.struggles.push(Struggle {
                description: description.trim().to_string(),
                first_noted: at,
                last_noted: at,
                count: 1,
            });
        }
        self.last_check_in = Some(at);
    }

    /// Most recently noted struggles first
    pub fn recent_struggles(&self, limit: usize) -> Vec<&Struggle> {
        let mut sorted: Vec<&Struggle> = self.struggles.iter().collect();
        sorted.sort_by(|a, b| b.last_noted.cmp(&a.last_noted));
        sorted.truncate(limit);
        sorted
    }

    // === Feedback ===

    pub fn record_intervention_feedback(&mut self, principle_id: &str, success: bool) {
        self.intervention_feedback
            .entry(principle_id.to_string())
            .or_default()
            .record(success);
    }

    /// Success rate for a principle, only when there is at least one recorded outcome
    pub fn success_rate_for(&self, principle_id: &str) -> Option<f32> {
        self.intervention_feedback
            .get(principle_id)
            .filter(|f| f.total() > 0)
            .map(|f| f.success_rate())
    }

    /// Principles with at least `min_uses` outcomes, best rate first (ties by id)
    pub fn most_effective_principles(&self, min_uses: u32) -> Vec<(String, f32)> {
        let mut ranked: Vec<(String, f32)> = self
            .intervention_feedback
            .iter()
            .filter(|(_, f)| f.total() >= min_uses && f.total() > 0)
            .map(|(id, f)| (id.clone(), f.success_rate()))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked
    }

    /// Number of recorded outcomes for a principle
    pub fn principle_usage_count(&self, principle_id: &str) -> u32 {
        self.intervention_feedback
            .get(principle_id)
            .map(|f| f.total())
            .unwrap_or(0)
    }

    // === Interventions and patterns ===

    pub fn record_intervention(&mut self, principle_id: &str, description: &str, at: DateTime<Utc>) {
        self.interventions.push(InterventionRecord {
            id: Uuid::new_v4(),
            principle_id: principle_id.to_string(),
            description: description.to_string(),
            date: at,
        });
    }

    pub fn record_pattern(&mut self, principle_id: &str, at: DateTime<Utc>) {
        let pattern = self
            .behaviour_patterns
            .entry(principle_id.to_string())
            .or_insert_with(|| BehaviourPattern {
                occurrences: 0,
                last_detected: at,
            });
        pattern.occurrences = pattern.occurrences.saturating_add(1);
        pattern.last_detected = at;
    }

    // === Conversation ===

    /// Append a turn. History is never rewritten.
    pub fn push_turn(&mut self, turn: ConversationTurn) {
        self.last_check_in = Some(turn.timestamp);
        self.conversation_history.push(turn);
    }

    /// Last `n` turns, oldest first
    pub fn recent_turns(&self, n: usize) -> &[ConversationTurn] {
        let start = self.conversation_history.len().saturating_sub(n);
        &self.conversation_history[start..]
    }

    /// Compact transcript of the last `n` turns for prompts
    pub fn conversation_context(&self, n: usize) -> String {
        let turns = self.recent_turns(n);
        if turns.is_empty() {
            return String::new();
        }
        let lines: Vec<String> = turns
            .iter()
            .map(|t| format!("{}: {}", t.role, preview(&t.content, MAX_CONVERSATION_CONTEXT_LENGTH)))
            .collect();
        format!("Recent conversation:\n{}", lines.join("\n"))
    }

    /// Metadata of the latest assistant turn, if that turn was a clarification
    pub fn last_clarification(&self) -> Option<&TurnMetadata> {
        self.conversation_history
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant)
            .and_then(|t| t.metadata.as_ref())
            .filter(|m| m.kind == ReplyKind::Clarification)
    }

    // === Validation ===

    /// Drop feedback, patterns and interventions whose principle id is not in
    /// the knowledge base. Returns how many entries were discarded.
    pub fn discard_unknown_principles(&mut self, kb: &KnowledgeBase) -> usize {
        let before = self.intervention_feedback.len()
            + self.behaviour_patterns.len()
            + self.interventions.len();

        self.intervention_feedback.retain(|id, _| kb.contains(id));
        self.behaviour_patterns.retain(|id, _| kb.contains(id));
        self.interventions.retain(|r| kb.contains(&r.principle_id));

        let after = self.intervention_feedback.len()
            + self.behaviour_patterns.len()
            + self.interventions.len();
        before - after
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_feedback_rate_zero_total() {
        let f = InterventionFeedback::default();
        assert_eq!(f.total(), 0);
        assert_eq!(f.success_rate(), 0.0);
    }

    #[test]
    fn test_feedback_rate_no_successes() {
        let f = InterventionFeedback {
            successes: 0,
            failures: 10,
        };
        assert_eq!(f.success_rate(), 0.0);
    }

    #[test]
    fn test_feedback_mixed() {
        let mut m = UserMemory::new("u");
        for ok in [true, true, false, true] {
            m.record_intervention_feedback("friction_increase", ok);
        }
        let f = m.intervention_feedback["friction_increase"];
        assert_eq!(f.successes, 3);
        assert_eq!(f.failures, 1);
        assert_eq!(f.success_rate(), 0.75);
        assert_eq!(m.principle_usage_count("friction_increase"), 4);
        assert_eq!(m.principle_usage_count("other"), 0);
    }

    #[test]
    fn test_success_rate_for_requires_history() {
        let mut m = UserMemory::new("u");
        m.intervention_feedback
            .insert("loss_aversion".into(), InterventionFeedback::default());
        assert_eq!(m.success_rate_for("loss_aversion"), None);
        m.record_intervention_feedback("loss_aversion", false);
        assert_eq!(m.success_rate_for("loss_aversion"), Some(0.0));
    }

    #[test]
    fn test_most_effective_sorted_and_filtered() {
        let mut m = UserMemory::new("u");
        m.record_intervention_feedback("principle_low", true);
        for ok in [true, true] {
            m.record_intervention_feedback("principle_a", ok);
        }
        for ok in [true, true, true, false] {
            m.record_intervention_feedback("principle_b", ok);
        }
        for ok in [true, false] {
            m.record_intervention_feedback("principle_c", ok);
        }

        let ranked = m.most_effective_principles(DEFAULT_MIN_USES);
        let ids: Vec<&str> = ranked.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["principle_a", "principle_b", "principle_c"]);
        assert_eq!(ranked[1].1, 0.75);
        assert!(m.most_effective_principles(5).is_empty());
    }

    #[test]
    fn test_struggle_merge() {
        let mut m = UserMemory::new("u");
        let t0 = Utc::now();
        let t1 = t0 + Duration::hours(1);
        m.record_struggle("Weekend overspending", t0);
        m.record_struggle("weekend overspending!", t1);
        m.record_struggle("Impulse buying", t1);

        assert_eq!(m.struggles.len(), 2);
        assert_eq!(m.struggles[0].count, 2);
        assert_eq!(m.struggles[0].first_noted, t0);
        assert_eq!(m.struggles[0].last_noted, t1);
        assert_eq!(m.struggles[0].description, "Weekend overspending");
    }

    #[test]
    fn test_blank_struggle_ignored() {
        let mut m = UserMemory::new("u");
        m.record_struggle("  ?! ", Utc::now());
        assert!(m.struggles.is_empty());
    }

    #[test]
    fn test_recent_struggles_order() {
        let mut m = UserMemory::new("u");
        let t0 = Utc::now();
        m.record_struggle("old", t0);
        m.record_struggle("new", t0 + Duration::days(2));
        m.record_struggle("mid", t0 + Duration::days(1));
        let recent: Vec<&str> = m
            .recent_struggles(2)
            .iter()
            .map(|s| s.description.as_str())
            .collect();
        assert_eq!(recent, vec!["new", "mid"]);
    }

    #[test]
    fn test_streak_helpers() {
        let mut m = UserMemory::new("u");
        let now = Utc::now();
        m.update_streak("no_delivery", true, now);
        m.update_streak("save_daily", true, now);
        m.update_streak("save_daily", false, now);
        assert_eq!(m.active_streaks().len(), 1);
        assert_eq!(m.broken_streaks()[0].0, "save_daily");
        assert_eq!(m.last_check_in, Some(now));
    }

    #[test]
    fn test_goals() {
        let mut m = UserMemory::new("u");
        let idx = m.add_goal(Goal::new("Save 5000/month").with_target("60000/year"));
        m.add_goal(Goal::new("Cut delivery"));
        assert!(m.complete_goal(idx));
        assert!(!m.complete_goal(9));
        assert_eq!(m.active_goals().count(), 1);
    }

    #[test]
    fn test_missing_fields_default() {
        let m: UserMemory = serde_json::from_str(r#"{"user_id":"abc","goals":[{"description":"x"}]}"#).unwrap();
        assert_eq!(m.user_id, "abc");
        assert_eq!(m.goals.len(), 1);
        assert!(m.streaks.is_empty());
        assert!(m.last_check_in.is_none());

        let empty: UserMemory = serde_json::from_str("{}").unwrap();
        assert!(empty.is_blank());
    }

    #[test]
    fn test_last_clarification() {
        let mut m = UserMemory::new("u");
        let now = Utc::now();
        assert!(m.last_clarification().is_none());
        m.push_turn(ConversationTurn::user("hi", now));
        m.push_turn(ConversationTurn::assistant(
            "what's up?",
            now,
            TurnMetadata {
                kind: ReplyKind::Clarification,
                principle_id: Some("habit_loops".into()),
                question_index: Some(1),
                confidence: Some(0.3),
                source: Some(DetectionSource::Keyword),
            },
        ));
        assert_eq!(m.last_clarification().and_then(|md| md.question_index), Some(1));

        m.push_turn(ConversationTurn::assistant(
            "try this",
            now,
            TurnMetadata {
                kind: ReplyKind::Coaching,
                principle_id: Some("habit_loops".into()),
                question_index: None,
                confidence: Some(0.8),
                source: Some(DetectionSource::Keyword),
            },
        ));
        assert!(m.last_clarification().is_none());
    }

    #[test]
    fn test_conversation_context_truncates() {
        let mut m = UserMemory::new("u");
        let now = Utc::now();
        m.push_turn(ConversationTurn::user("x".repeat(300), now));
        let ctx = m.conversation_context(5);
        assert!(ctx.starts_with("Recent conversation:"));
        assert!(ctx.len() < 200);
        assert_eq!(UserMemory::new("u").conversation_context(5), "");
    }
}
