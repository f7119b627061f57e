//! Fixed interaction scripts: daily check-in and weekly review.

use crate::memory::UserMemory;
use crate::streaks::habit_title;

const DAILY_CHECK_IN: &str = "🌅 Daily Check-In

Let's take a moment to reflect on your financial habits today:

1. Habits: Did you stick to your money habits today?
   Examples: made a savings transfer, avoided impulse purchases,
   tracked expenses, stayed within budget

2. Temptations: Did you face any spending temptations?
   Examples: food delivery apps, online shopping, impulse buys
   How did you handle them?

3. Blockers: What made it hard to stick to your goals today?
   Examples: stress, boredom, social pressure, unclear goals

💬 Share your thoughts, and I'll help you build on successes
   or work through challenges!";

const WEEKLY_REVIEW: &str = "📅 Weekly Review

Let's look back at the past week:

1. Wins: Which money habits did you keep up this week?

2. Slips: When did things not go to plan? What was happening at the time?

3. What worked: Which strategies made the biggest difference?

4. Next week: What's one small change you want to try?";

/// Daily reflection prompt
pub fn daily_check_in() -> &'static str {
    DAILY_CHECK_IN
}

/// Weekly review prompt, followed by the user's current streaks when they have any
pub fn weekly_review(memory: &UserMemory) -> String {
    if memory.streaks.is_empty() {
        return WEEKLY_REVIEW.to_string();
    }

    let lines: Vec<String> = memory
        .streaks
        .iter()
        .map(|(habit, s)| format!("  • {}: {} now, best {}", habit_title(habit), s.current, s.best))
        .collect();
    format!("{}\n\nYour streaks this week:\n{}", WEEKLY_REVIEW, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_daily_check_in_sections() {
        let p = daily_check_in();
        assert!(p.contains("Daily Check-In"));
        assert!(p.contains("Habits"));
        assert!(p.contains("Temptations"));
        assert!(p.contains("Blockers"));
    }

    #[test]
    fn test_weekly_review_plain() {
        assert_eq!(weekly_review(&UserMemory::new("u")), WEEKLY_REVIEW);
    }

    #[test]
    fn test_weekly_review_lists_streaks() {
        let mut m = UserMemory::new("u");
        m.update_streak("no_food_delivery", true, Utc::now());
        let p = weekly_review(&m);
        assert!(p.starts_with("📅 Weekly Review"));
        assert!(p.contains("No Food Delivery: 1 now, best 1"));
    }
}
