//! Per-user context digest injected into the assistant prompt.
//!
//! Produces a short natural-language string from the user's recent mood
//! trend and latest journal excerpts. Advisory prompt material only; nothing
//! downstream branches on its content.

use crate::models::{JournalSummary, MoodTrendPoint};

/// Days of mood history summarized.
pub const MOOD_WINDOW_DAYS: i64 = 7;
/// Journal entries quoted, most recent first.
pub const JOURNAL_LIMIT: i64 = 2;
/// Preview length before an excerpt is cut with an ellipsis.
pub const JOURNAL_PREVIEW_CHARS: usize = 100;

/// Build the digest from a zero-filled mood trend and recent journal
/// excerpts. The mood figure is the most recent day in the window that has
/// entries; zero-filled days are skipped.
pub fn summarize(trend: &[MoodTrendPoint], entries: &[JournalSummary]) -> String {
    format!(
        "Mood data: {}. Journal data: {}.",
        mood_summary(trend),
        journal_summary(entries)
    )
}

fn mood_summary(trend: &[MoodTrendPoint]) -> String {
    let latest = trend.iter().rfind(|p| p.average_mood > 0.0);

    match latest {
        Some(point) => format!(
            "User's average mood in the last 7 days is {:.1}.",
            point.average_mood
        ),
        None => "No recent mood entries available.".to_string(),
    }
}

fn journal_summary(entries: &[JournalSummary]) -> String {
    if entries.is_empty() {
        return "No recent journal entries available.".to_string();
    }

    let parts: Vec<String> = entries
        .iter()
        .map(|entry| {
            let preview = if entry.content.chars().count() > JOURNAL_PREVIEW_CHARS {
                let cut: String = entry.content.chars().take(JOURNAL_PREVIEW_CHARS).collect();
                format!("{}...", cut.replace('\n', " "))
            } else {
                entry.content.clone()
            };
            let title = entry.title.as_deref().unwrap_or("Journal Entry");
            format!("'{}: {}'", title, preview)
        })
        .collect();

    format!("Recent journal entries include: {}", parts.join("; "))
}
