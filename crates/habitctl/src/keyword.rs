//! Deterministic keyword matcher.
//!
//! Scans the message for every principle's triggers. The principle with the
//! most matched triggers wins; ties go to knowledge-base declaration order.
//! Always available, so it is the last link of the detection chain.

use habit_shared::knowledge::{BehaviouralPrinciple, KnowledgeBase};
use habit_shared::memory::UserMemory;
use habit_shared::text::round2;
use tracing::debug;

/// Weight of the trigger ratio in the keyword confidence
pub const TRIGGER_WEIGHT: f32 = 0.8;

/// Bonus per memory signal (struggle or active goal mentioning a trigger)
pub const MEMORY_SIGNAL_BONUS: f32 = 0.1;

/// Cap on the total memory bonus
pub const MAX_MEMORY_BONUS: f32 = 0.2;

/// Winning principle from the keyword scan
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch<'kb> {
    pub principle: &'kb BehaviouralPrinciple,
    /// Triggers found in the message, in declaration order
    pub matched: Vec<String>,
    /// Struggles and active goals that mention one of the triggers
    pub memory_signals: usize,
    pub confidence: f32,
}

impl KeywordMatch<'_> {
    pub fn reasoning(&self) -> String {
        let mut reason = format!(
            "Matched {} of {} trigger(s) for {}: {}",
            self.matched.len(),
            self.principle.triggers.len(),
            self.principle.name,
            self.matched.join(", ")
        );
        if self.memory_signals > 0 {
            reason.push_str(&format!(
                " (supported by {} earlier note(s) in your history)",
                self.memory_signals
            ));
        }
        reason
    }
}

/// Number of struggles and active goals that mention one of the principle's triggers
pub fn memory_signals(principle: &BehaviouralPrinciple, memory: &UserMemory) -> usize {
    let struggles = memory
        .struggles
        .iter()
        .filter(|s| !principle.matched_triggers(&s.description).is_empty())
        .count();
    let goals = memory
        .active_goals()
        .filter(|g| !principle.matched_triggers(&g.description).is_empty())
        .count();
    struggles + goals
}

/// round2(min(cap, matched/total * 0.8 + bonus))
pub fn keyword_confidence(matched: usize, total: usize, signals: usize, cap: f32) -> f32 {
    if matched == 0 || total == 0 {
        return 0.0;
    }
    let ratio = matched as f32 / total as f32;
    let bonus = (signals as f32 * MEMORY_SIGNAL_BONUS).min(MAX_MEMORY_BONUS);
    round2((ratio * TRIGGER_WEIGHT + bonus).min(cap))
}

/// Best keyword match for `text`, or None when no trigger occurs
pub fn match_keywords<'kb>(
    text: &str,
    memory: &UserMemory,
    kb: &'kb KnowledgeBase,
    cap: f32,
) -> Option<KeywordMatch<'kb>> {
    let mut best: Option<(&BehaviouralPrinciple, Vec<String>)> = None;

    for principle in kb.principles() {
        let matched = principle.matched_triggers(text);
        if matched.is_empty() {
            continue;
        }
        debug!("Keyword scan: {} matched {:?}", principle.id, matched);
        // Strictly greater keeps the earlier principle on ties
        let better = match &best {
            Some((_, current)) => matched.len() > current.len(),
            None => true,
        };
        if better {
            best = Some((principle, matched));
        }
    }

    let (principle, matched) = best?;
    let signals = memory_signals(principle, memory);
    let confidence = keyword_confidence(matched.len(), principle.triggers.len(), signals, cap);

    Some(KeywordMatch {
        principle,
        matched,
        memory_signals: signals,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use habit_shared::memory::Goal;

    fn kb() -> KnowledgeBase {
        KnowledgeBase::from_principles(vec![
            BehaviouralPrinciple::new("habit_loops", "Habit Loops", "cue, routine, reward")
                .with_triggers(["stress", "delivery"])
                .with_interventions(["Identify the cue"]),
            BehaviouralPrinciple::new("friction_increase", "Friction Increase", "make it harder")
                .with_triggers(["delivery", "impulse"])
                .with_interventions(["Delete the app"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_food_delivery_scenario() {
        let kb = kb();
        let m = match_keywords(
            "I keep ordering food delivery every day when I'm stressed after work",
            &UserMemory::new("u"),
            &kb,
            0.75,
        )
        .unwrap();
        assert_eq!(m.principle.id, "habit_loops");
        assert_eq!(m.matched, vec!["stress", "delivery"]);
        assert_eq!(m.confidence, 0.75);
    }

    #[test]
    fn test_tie_goes_to_declaration_order() {
        let kb = kb();
        let m = match_keywords("food delivery again", &UserMemory::new("u"), &kb, 0.75).unwrap();
        assert_eq!(m.principle.id, "habit_loops");
        assert_eq!(m.confidence, 0.4);
    }

    #[test]
    fn test_higher_score_wins_regardless_of_order() {
        let kb = kb();
        let m = match_keywords("impulse delivery", &UserMemory::new("u"), &kb, 0.75).unwrap();
        assert_eq!(m.principle.id, "friction_increase");
    }

    #[test]
    fn test_no_match() {
        assert!(match_keywords("hello", &UserMemory::new("u"), &kb(), 0.75).is_none());
        assert!(match_keywords("", &UserMemory::new("u"), &kb(), 0.75).is_none());
    }

    #[test]
    fn test_memory_bonus_capped() {
        let kb = kb();
        let mut memory = UserMemory::new("u");
        let now = Utc::now();
        memory.record_struggle("impulse purchases at night", now);
        memory.record_struggle("delivery apps", now);
        memory.add_goal(Goal::new("Cut impulse spending"));

        let m = match_keywords("impulse", &memory, &kb, 0.75).unwrap();
        assert_eq!(m.principle.id, "friction_increase");
        assert_eq!(m.memory_signals, 3);
        // 1/2 * 0.8 + 0.2
        assert_eq!(m.confidence, 0.6);
        assert!(m.reasoning().contains("3 earlier note"));
    }

    #[test]
    fn test_completed_goals_are_not_signals() {
        let kb = kb();
        let mut memory = UserMemory::new("u");
        let idx = memory.add_goal(Goal::new("Stop impulse buys"));
        memory.complete_goal(idx);
        let p = kb.lookup("friction_increase").unwrap();
        assert_eq!(memory_signals(p, &memory), 0);
    }

    #[test]
    fn test_confidence_formula() {
        assert_eq!(keyword_confidence(0, 5, 2, 0.75), 0.0);
        assert_eq!(keyword_confidence(1, 3, 0, 0.75), 0.27);
        assert_eq!(keyword_confidence(3, 3, 0, 0.75), 0.75);
        assert_eq!(keyword_confidence(1, 8, 5, 0.75), 0.3);
    }
}
