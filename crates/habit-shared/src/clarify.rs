//! Clarifying questions for low-confidence turns.
//!
//! Each principle has a small fixed set of questions; when nothing matched a
//! generic set is used. The index asked is stored in the assistant turn's
//! metadata, so consecutive clarifications for the same principle walk
//! through the set instead of repeating.

use crate::knowledge::BehaviouralPrinciple;
use crate::memory::{ReplyKind, Role, UserMemory};

/// Open-ended questions when no principle matched
pub const GENERIC_QUESTIONS: &[&str] = &[
    "What financial habit or situation are you trying to change right now?",
    "What would you like to achieve with your money over the next few months?",
    "What's the biggest challenge you face when trying to stick to your plans?",
    "What have you tried so far, and what got in the way?",
];

const LOSS_AVERSION: &[&str] = &[
    "How do you feel when you think about losing the progress you've made so far?",
    "Are you tracking your progress towards a specific savings goal or milestone?",
    "What would it cost you if you stopped now?",
];

const HABIT_LOOPS: &[&str] = &[
    "What usually triggers this behavior? A time of day, a place or a feeling?",
    "Have you noticed a pattern in when this happens, like after work or on weekends?",
    "Which emotion comes right before it: stress, boredom or something else?",
];

const COMMITMENT_DEVICES: &[&str] = &[
    "Have you tried committing to this change in advance, for example with automatic transfers?",
    "Does anyone else know about this goal, someone who could keep you accountable?",
    "Would it help to make breaking the rule a little harder?",
];

const TEMPTATION_BUNDLING: &[&str] = &[
    "What's something you genuinely enjoy that you could pair with this chore?",
    "Which part of managing money feels most like a chore to you?",
    "Could you combine a fun activity with reviewing your budget?",
];

const FRICTION_REDUCTION: &[&str] = &[
    "How many steps does it take right now to do the thing you want to do?",
    "What makes this feel complicated or time-consuming?",
    "If it were as easy as one tap, would you do it more often?",
];

const FRICTION_INCREASE: &[&str] = &[
    "How easy is it right now to make this purchase, in number of taps or steps?",
    "When does the urge feel strongest and hardest to resist?",
    "Do these purchases feel impulsive or planned?",
];

const DEFAULT_EFFECT: &[&str] = &[
    "Do you have to remember to do this manually each time?",
    "Could this happen automatically, for example with a scheduled transfer?",
    "What's your current default when payday arrives?",
];

const MICRO_HABITS: &[&str] = &[
    "What's the smallest version of this habit you could do today?",
    "Does the full goal feel overwhelming right now?",
    "Could you start with something tiny, like saving a small amount each day?",
];

/// Fixed questions for a principle id, if it has its own set
pub fn questions_for(principle_id: &str) -> Option<&'static [&'static str]> {
    let set = match principle_id {
        "loss_aversion" => LOSS_AVERSION,
        "habit_loops" => HABIT_LOOPS,
        "commitment_devices" => COMMITMENT_DEVICES,
        "temptation_bundling" => TEMPTATION_BUNDLING,
        "friction_reduction" => FRICTION_REDUCTION,
        "friction_increase" => FRICTION_INCREASE,
        "default_effect" => DEFAULT_EFFECT,
        "micro_habits" => MICRO_HABITS,
        _ => return None,
    };
    Some(set)
}

/// A question chosen for this turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClarifyingQuestion {
    /// Principle the question is about; None for the generic set
    pub principle_id: Option<String>,
    /// Index within the question set
    pub index: usize,
    pub text: String,
}

/// Index of the next question for `principle_id` given what was asked before.
///
/// Looks for the most recent clarification about the same principle (or the
/// most recent generic one when `principle_id` is None) and moves one step on.
pub fn next_question_index(principle_id: Option<&str>, memory: &UserMemory, set_len: usize) -> usize {
    if set_len == 0 {
        return 0;
    }
    let last = memory
        .conversation_history
        .iter()
        .rev()
        .filter(|t| t.role == Role::Assistant)
        .filter_map(|t| t.metadata.as_ref())
        .filter(|m| m.kind == ReplyKind::Clarification)
        .find(|m| m.principle_id.as_deref() == principle_id)
        .and_then(|m| m.question_index);

    match last {
        Some(idx) => (idx + 1) % set_len,
        None => 0,
    }
}

/// Choose the question to ask.
///
/// A principle without its own set falls back to the generic questions.
pub fn select_question(principle: Option<&BehaviouralPrinciple>, memory: &UserMemory) -> ClarifyingQuestion {
    let specific = principle.and_then(|p| questions_for(&p.id).map(|set| (p.id.as_str(), set)));

    let (principle_id, set) = match specific {
        Some((id, set)) => (Some(id), set),
        None => (None, GENERIC_QUESTIONS),
    };

    let index = next_question_index(principle_id, memory, set.len());
    ClarifyingQuestion {
        principle_id: principle_id.map(str::to_string),
        index,
        text: set[index].to_string(),
    }
}

/// Render the user-facing clarification message
pub fn render_clarification(question: &ClarifyingQuestion, principle: Option<&BehaviouralPrinciple>) -> String {
    let opening = match principle {
        Some(p) if question.principle_id.is_some() => {
            format!("Let me understand better. This might be related to {}.", p.name)
        }
        _ => "Let me understand better.".to_string(),
    };
    format!(
        "{}\n\nCan you tell me more about: {}\n\n💡 The more details you share, the better I can support you.",
        opening, question.text
    )
}
