//! Habit streak counters.
//!
//! A streak counts consecutive check-ins where the user kept a habit. Every
//! update keeps `best >= current`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Streak counters for one habit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakData {
    /// Current consecutive count
    #[serde(default)]
    pub current: u32,
    /// Best count ever reached
    #[serde(default)]
    pub best: u32,
    /// When the streak was last touched
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl Default for StreakData {
    fn default() -> Self {
        Self {
            current: 0,
            best: 0,
            last_updated: Utc::now(),
        }
    }
}

impl StreakData {
    /// Habit kept: extend the streak
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.current = self.current.saturating_add(1);
        self.best = self.best.max(self.current);
        self.last_updated = at;
    }

    /// Habit missed: reset the current run, keep the best
    pub fn record_miss(&mut self, at: DateTime<Utc>) {
        self.best = self.best.max(self.current);
        self.current = 0;
        self.last_updated = at;
    }

    pub fn is_active(&self) -> bool {
        self.current > 0
    }

    /// Broken streak that was once worth something
    pub fn is_broken(&self) -> bool {
        self.current == 0 && self.best > 0
    }
}

/// Render a snake_case habit key as a title ("no_food_delivery" -> "No Food Delivery")
pub fn habit_title(key: &str) -> String {
    key.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
