//! Core data models used throughout mindwell.
//!
//! These types represent the persisted records (users, mood entries, journal
//! entries, chat turns), the knowledge-base chunks that flow through the
//! ingestion and retrieval pipeline, and the derived aggregates served by the
//! insights endpoints.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A registered account. `password_hash` never leaves the repo layer; API
/// responses use [`UserProfile`].
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub triggers: Option<String>,
    pub areas_of_focus: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Public view of a [`User`].
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub triggers: Option<String>,
    pub areas_of_focus: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        UserProfile {
            id: u.id,
            email: u.email,
            full_name: u.full_name,
            date_of_birth: u.date_of_birth,
            gender: u.gender,
            triggers: u.triggers,
            areas_of_focus: u.areas_of_focus,
            created_at: u.created_at,
        }
    }
}

/// A single mood reading on a 1-10 scale, optionally annotated with free-form
/// notes and tags.
#[derive(Debug, Clone, Serialize)]
pub struct MoodEntry {
    pub id: i64,
    pub user_id: i64,
    pub mood_value: i64,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// A journal entry with its sentiment annotation. The annotation is computed
/// at creation and recomputed whenever `content` changes; it is absent only
/// for rows written before sentiment analysis existed.
#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub id: i64,
    pub user_id: i64,
    pub title: Option<String>,
    pub content: String,
    pub sentiment_label: Option<SentimentLabel>,
    pub sentiment_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Title/content excerpt of a journal entry, as consumed by the user-context
/// summarizer.
#[derive(Debug, Clone)]
pub struct JournalSummary {
    pub title: Option<String>,
    pub content: String,
}

/// One message in a conversation, tagged with its author direction.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub is_user_message: bool,
    pub timestamp: DateTime<Utc>,
}

/// A (user utterance, assistant utterance) pair reconstructed from adjacent
/// chat turns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPair {
    pub user: String,
    pub assistant: String,
}

/// Sentiment polarity of a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    /// Parses the exact enumerated strings; anything else is rejected.
    pub fn parse(s: &str) -> Option<SentimentLabel> {
        match s {
            "Positive" => Some(SentimentLabel::Positive),
            "Negative" => Some(SentimentLabel::Negative),
            "Neutral" => Some(SentimentLabel::Neutral),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "Positive",
            SentimentLabel::Negative => "Negative",
            SentimentLabel::Neutral => "Neutral",
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A label/score pair describing emotional polarity. Score lies in
/// [-1.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub score: f64,
}

impl Sentiment {
    /// The fallback annotation for empty or unparseable input.
    pub fn neutral() -> Sentiment {
        Sentiment {
            label: SentimentLabel::Neutral,
            score: 0.0,
        }
    }
}

/// Daily mood average over a requested window. Days without entries carry
/// a zero average so the series is continuous.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodTrendPoint {
    pub date: NaiveDate,
    pub average_mood: f64,
}

/// Tag with its occurrence count across a user's mood entries.
#[derive(Debug, Clone, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

/// Average mood for one weekday (only weekdays with data are reported).
#[derive(Debug, Clone, Serialize)]
pub struct WeekdayMood {
    pub weekday: String,
    pub average_mood: f64,
}

/// Distribution of sentiment labels across a user's annotated journal
/// entries.
#[derive(Debug, Clone, Serialize)]
pub struct SentimentSummary {
    pub total_entries: i64,
    pub positive_percentage: f64,
    pub negative_percentage: f64,
    pub neutral_percentage: f64,
    pub most_common_sentiment: String,
}

/// Immutable unit produced at ingestion time and owned by the knowledge
/// store. `chunk_index` is the position within the originating document.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub id: String,
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk returned from similarity retrieval, most similar first.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
    pub chunk_index: i64,
    pub score: f32,
}
