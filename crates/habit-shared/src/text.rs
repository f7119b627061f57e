//! Small text utilities shared by memory, prompts and logging.

/// Truncate to at most `max_chars` characters, appending "..." when cut
pub fn preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

/// Normalise free text for near-duplicate comparison.
///
/// Lowercases, drops punctuation and collapses whitespace, so
/// "Weekend overspending!" and "weekend  overspending" compare equal.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Round to two decimals
pub fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}
