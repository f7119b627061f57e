//! Session summary: a read-only digest of a user's memory.
//!
//! Output depends only on the memory passed in, so two calls on the same
//! memory give identical text.

use crate::memory::{UserMemory, DEFAULT_MIN_USES};
use crate::streaks::habit_title;

/// Returned when there is nothing to report
pub const EMPTY_SUMMARY: &str = "📊 Session Summary\n\n\
Nothing to summarize yet. Tell me about a money habit you'd like to work on and we'll start from there.";

const RECENT_STRUGGLES: usize = 3;
const TOP_PRINCIPLES: usize = 3;

/// Build the session summary for `memory`
pub fn summarize(memory: &UserMemory) -> String {
    if memory.is_blank() {
        return EMPTY_SUMMARY.to_string();
    }

    let mut sections: Vec<String> = vec!["📊 Session Summary".to_string()];

    if !memory.goals.is_empty() {
        let mut lines = vec!["🎯 Goals".to_string()];
        for goal in &memory.goals {
            let target = goal
                .target
                .as_deref()
                .map(|t| format!(" (target: {})", t))
                .unwrap_or_default();
            let status = if goal.completed { " ✓ done" } else { "" };
            lines.push(format!("  • {}{}{}", goal.description, target, status));
        }
        sections.push(lines.join("\n"));
    }

    let active = memory.active_streaks();
    if !active.is_empty() {
        let mut lines = vec!["🔥 Active Streaks".to_string()];
        for (habit, streak) in active {
            lines.push(format!(
                "  • {}: {} in a row (best {})",
                habit_title(habit),
                streak.current,
                streak.best
            ));
        }
        sections.push(lines.join("\n"));
    }

    let broken = memory.broken_streaks();
    if !broken.is_empty() {
        let mut lines = vec!["🔄 Streaks To Restart".to_string()];
        for (habit, streak) in broken {
            lines.push(format!("  • {}: best was {}", habit_title(habit), streak.best));
        }
        sections.push(lines.join("\n"));
    }

    let struggles = memory.recent_struggles(RECENT_STRUGGLES);
    if !struggles.is_empty() {
        let mut lines = vec!["⚠️ Recent Struggles".to_string()];
        for s in struggles {
            let times = if s.count == 1 {
                String::new()
            } else {
                format!(" (noted {} times)", s.count)
            };
            lines.push(format!("  • {}{}", s.description, times));
        }
        sections.push(lines.join("\n"));
    }

    let effective = memory.most_effective_principles(DEFAULT_MIN_USES);
    if !effective.is_empty() {
        let mut lines = vec!["✨ What Works For You".to_string()];
        for (id, rate) in effective.iter().take(TOP_PRINCIPLES) {
            lines.push(format!(
                "  • {}: {:.0}% success over {} tries",
                habit_title(id),
                rate * 100.0,
                memory.principle_usage_count(id)
            ));
        }
        sections.push(lines.join("\n"));
    }

    if !memory.behaviour_patterns.is_empty() {
        let mut patterns: Vec<(&String, u32)> = memory
            .behaviour_patterns
            .iter()
            .map(|(id, p)| (id, p.occurrences))
            .collect();
        patterns.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut lines = vec!["🔁 Recurring Patterns".to_string()];
        for (id, occurrences) in patterns {
            lines.push(format!("  • {}: seen {} times", habit_title(id), occurrences));
        }
        sections.push(lines.join("\n"));
    }

    sections.push(closing_line(memory).to_string());
    sections.join("\n\n")
}

fn closing_line(memory: &UserMemory) -> &'static str {
    if !memory.active_streaks().is_empty() {
        "💪 Great progress! Keep the streak alive, every small win counts."
    } else if !memory.broken_streaks().is_empty() {
        "🌱 Streaks break, that's part of the journey. Keep going and start a new one today."
    } else {
        "🌱 Every step counts. Keep showing up and the progress will follow."
    }
}
