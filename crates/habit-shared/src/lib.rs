//! Shared types and pure logic for HabitLedger components.

pub mod clarify;
pub mod detection;
pub mod error;
pub mod knowledge;
pub mod memory;
pub mod streaks;
pub mod summary;
pub mod templates;
pub mod text;
pub mod user_profile;

pub use detection::{clamp_confidence, DetectionResult, DetectionSource};
pub use error::KnowledgeError;
pub use knowledge::{BehaviouralPrinciple, KnowledgeBase};
pub use memory::{
    ConversationTurn, Goal, InterventionFeedback, ReplyKind, Role, TurnMetadata, UserMemory,
};
pub use streaks::StreakData;
pub use summary::summarize;
pub use user_profile::UserProfile;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
