//! Coaching service: the load → respond → save boundary.
//!
//! Callers serialise access per user id; the service holds no memory
//! between calls.

use crate::orchestrator::Orchestrator;
use crate::store::{validate_user_id, MemoryStore, StoreError};
use chrono::Utc;
use habit_shared::error::KnowledgeError;
use habit_shared::memory::{Goal, InterventionFeedback, UserMemory};
use habit_shared::streaks::StreakData;
use habit_shared::summary::summarize;
use habit_shared::templates::weekly_review;
use habit_shared::text::preview;
use habit_shared::user_profile::InteractionOutcome;
use thiserror::Error;
use tracing::{info, warn};

/// Shown when a turn fails for a reason the user can't act on
pub const APOLOGY: &str = "Sorry, I couldn't process that just now. Please try again in a moment.";

/// Caller-facing errors
#[derive(Error, Debug)]
pub enum CoachError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown principle: {0}")]
    UnknownPrinciple(String),

    #[error("Knowledge base error: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("Storage error: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for CoachError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidUserId(msg) => CoachError::InvalidInput(msg),
            other => CoachError::Store(other),
        }
    }
}

impl CoachError {
    /// True for errors caused by the caller's input
    pub fn is_user_error(&self) -> bool {
        matches!(self, CoachError::InvalidInput(_) | CoachError::UnknownPrinciple(_))
    }
}

/// Coaching operations over a memory store
pub struct CoachService {
    orchestrator: Orchestrator,
    store: Box<dyn MemoryStore>,
}

impl CoachService {
    pub fn new(orchestrator: Orchestrator, store: Box<dyn MemoryStore>) -> Self {
        Self { orchestrator, store }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Handle one user message and return the reply
    pub fn process_turn(&self, user_id: &str, message: &str) -> Result<String, CoachError> {
        validate_user_id(user_id)?;
        if message.trim().is_empty() {
            return Err(CoachError::InvalidInput("message is empty".to_string()));
        }

        let memory = self.load(user_id)?;
        info!("Turn for {}: '{}'", user_id, preview(message, 60));

        let (reply, memory) = self.orchestrator.respond(message, memory);
        self.store.save(user_id, &memory)?;
        Ok(reply)
    }

    /// Record whether an intervention for `principle_id` worked
    pub fn record_feedback(
        &self,
        user_id: &str,
        principle_id: &str,
        success: bool,
    ) -> Result<InterventionFeedback, CoachError> {
        if !self.orchestrator.knowledge_base().contains(principle_id) {
            return Err(CoachError::UnknownPrinciple(principle_id.to_string()));
        }

        let mut memory = self.load(user_id)?;
        memory.record_intervention_feedback(principle_id, success);
        memory.profile.update_from_interaction(InteractionOutcome {
            engaged: true,
            intervention_successful: success,
        });
        memory.last_check_in = Some(Utc::now());

        let feedback = memory
            .intervention_feedback
            .get(principle_id)
            .copied()
            .unwrap_or_default();
        self.store.save(user_id, &memory)?;
        info!(
            "Feedback for {} on {}: {}/{}",
            user_id,
            principle_id,
            feedback.successes,
            feedback.total()
        );
        Ok(feedback)
    }

    /// Record a habit check-in
    pub fn record_streak(&self, user_id: &str, habit: &str, success: bool) -> Result<StreakData, CoachError> {
        let habit = habit.trim();
        if habit.is_empty() {
            return Err(CoachError::InvalidInput("habit name is empty".to_string()));
        }

        let mut memory = self.load(user_id)?;
        let streak = memory.update_streak(habit, success, Utc::now()).clone();
        self.store.save(user_id, &memory)?;
        Ok(streak)
    }

    /// Add a goal, returning its index
    pub fn add_goal(&self, user_id: &str, description: &str, target: Option<&str>) -> Result<usize, CoachError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(CoachError::InvalidInput("goal description is empty".to_string()));
        }

        let mut memory = self.load(user_id)?;
        let mut goal = Goal::new(description);
        if let Some(target) = target.map(str::trim).filter(|t| !t.is_empty()) {
            goal = goal.with_target(target);
        }
        let index = memory.add_goal(goal);
        self.store.save(user_id, &memory)?;
        Ok(index)
    }

    /// Mark a goal completed
    pub fn complete_goal(&self, user_id: &str, index: usize) -> Result<(), CoachError> {
        let mut memory = self.load(user_id)?;
        if !memory.complete_goal(index) {
            return Err(CoachError::InvalidInput(format!("no goal #{}", index + 1)));
        }
        self.store.save(user_id, &memory)?;
        Ok(())
    }

    /// Note a struggle the user reported
    pub fn record_struggle(&self, user_id: &str, description: &str) -> Result<(), CoachError> {
        if description.trim().is_empty() {
            return Err(CoachError::InvalidInput("struggle description is empty".to_string()));
        }
        let mut memory = self.load(user_id)?;
        memory.record_struggle(description, Utc::now());
        self.store.save(user_id, &memory)?;
        Ok(())
    }

    /// Session summary for a user
    pub fn summary(&self, user_id: &str) -> Result<String, CoachError> {
        Ok(summarize(&self.load(user_id)?))
    }

    /// Weekly review prompt with the user's streaks
    pub fn weekly_review(&self, user_id: &str) -> Result<String, CoachError> {
        Ok(weekly_review(&self.load(user_id)?))
    }

    /// Load memory and drop references to principles that no longer exist
    pub fn load(&self, user_id: &str) -> Result<UserMemory, CoachError> {
        let mut memory = self.store.load(user_id)?;
        let dropped = memory.discard_unknown_principles(self.orchestrator.knowledge_base());
        if dropped > 0 {
            warn!("Discarded {} record(s) with unknown principle ids for {}", dropped, user_id);
        }
        Ok(memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{Detector, DetectorConfig};
    use crate::orchestrator::CoachConfig;
    use crate::store::InMemoryStore;
    use habit_shared::knowledge::KnowledgeBase;
    use std::sync::Arc;

    fn service() -> CoachService {
        let kb = Arc::new(KnowledgeBase::load().unwrap());
        let detector = Detector::new(kb.clone(), DetectorConfig::default());
        let orchestrator = Orchestrator::new(kb, detector, CoachConfig::default());
        CoachService::new(orchestrator, Box::new(InMemoryStore::new()))
    }

    #[test]
    fn test_store_errors_keep_their_cause() {
        use crate::store::JsonFileStore;
        use std::error::Error as _;

        let dir = tempfile::TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        std::fs::write(store.path_for("u1"), "{ nope").unwrap();
        let kb = Arc::new(KnowledgeBase::load().unwrap());
        let detector = Detector::new(kb.clone(), DetectorConfig::default());
        let s = CoachService::new(
            Orchestrator::new(kb, detector, CoachConfig::default()),
            Box::new(store),
        );

        let err = s.summary("u1").unwrap_err();
        assert!(!err.is_user_error());
        let store_err = err.source().unwrap();
        assert!(store_err.to_string().starts_with("Corrupt memory file"));
        assert!(store_err.source().is_some());
    }

    #[test]
    fn test_process_turn_validates_input() {
        let s = service();
        assert!(matches!(s.process_turn("", "hi"), Err(CoachError::InvalidInput(_))));
        assert!(matches!(s.process_turn("u1", "   "), Err(CoachError::InvalidInput(_))));
        assert!(matches!(s.process_turn("../x", "hi"), Err(CoachError::InvalidInput(_))));
        assert!(s.process_turn("u1", "").unwrap_err().is_user_error());
    }

    #[test]
    fn test_process_turn_persists() {
        let s = service();
        let reply = s.process_turn("u1", "hello").unwrap();
        assert!(!reply.is_empty());
        s.process_turn("u1", "hello again").unwrap();
        assert_eq!(s.load("u1").unwrap().conversation_history.len(), 4);
    }

    #[test]
    fn test_feedback_rejects_unknown_principle() {
        let s = service();
        assert!(matches!(
            s.record_feedback("u1", "made_up", true),
            Err(CoachError::UnknownPrinciple(_))
        ));
        let f = s.record_feedback("u1", "loss_aversion", true).unwrap();
        assert_eq!(f.successes, 1);
        let memory = s.load("u1").unwrap();
        assert_eq!(memory.profile.engagement_level.to_string(), "high");
    }

    #[test]
    fn test_streaks_and_goals() {
        let s = service();
        s.record_streak("u1", "no_delivery", true).unwrap();
        let streak = s.record_streak("u1", "no_delivery", false).unwrap();
        assert_eq!((streak.current, streak.best), (0, 1));
        assert!(s.record_streak("u1", " ", true).is_err());

        let idx = s.add_goal("u1", "Save 5000", Some("per month")).unwrap();
        s.complete_goal("u1", idx).unwrap();
        assert!(s.complete_goal("u1", 7).is_err());
        assert!(s.summary("u1").unwrap().contains("✓ done"));
    }
}
