//! Application persistence: users, mood entries, journal entries, chat turns,
//! and the aggregations behind the insights endpoints.
//!
//! The assistant only needs the narrow [`UserData`] view (chat history, mood
//! trend, journal excerpts); it takes that as a trait object so tests can
//! substitute fakes. Everything else is concrete on [`SqliteRepo`].
//!
//! Timestamps are stored as UTC unix seconds; autoincrement ids break
//! ordering ties between rows written in the same second.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};
use crate::models::{
    ChatTurn, JournalEntry, JournalSummary, MoodEntry, MoodTrendPoint, Sentiment, SentimentSummary,
    TagCount, User, WeekdayMood,
};

/// The persistence surface the RAG orchestrator consumes.
#[async_trait]
pub trait UserData: Send + Sync {
    /// The most recent `limit` turns for one user, returned oldest first.
    async fn recent_chat_turns(&self, user_id: i64, limit: usize) -> Result<Vec<ChatTurn>>;
    /// Append one turn. Failure propagates; the orchestrator calls this only
    /// after a successful generation.
    async fn append_chat_turn(
        &self,
        user_id: i64,
        content: &str,
        is_user_message: bool,
    ) -> Result<ChatTurn>;
    /// Daily mood averages over the last `days` days, zero-filled.
    async fn mood_trend(&self, user_id: i64, days: i64) -> Result<Vec<MoodTrendPoint>>;
    /// Title/content excerpts of the newest journal entries.
    async fn recent_journal_summaries(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<JournalSummary>>;
}

/// Fields a profile update may touch. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub triggers: Option<String>,
    pub areas_of_focus: Option<String>,
}

#[derive(Clone)]
pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ============ Users ============

    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        full_name: Option<&str>,
    ) -> Result<User> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, full_name, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(email)
        .bind(password_hash)
        .bind(full_name)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await;

        let result = match result {
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(Error::invalid("email already registered"));
            }
            other => other?,
        };

        self.user_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| Error::NotFound("user"))
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    pub async fn user_by_id(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    pub async fn update_profile(&self, user_id: i64, update: ProfileUpdate) -> Result<User> {
        let user = self
            .user_by_id(user_id)
            .await?
            .ok_or(Error::NotFound("user"))?;

        sqlx::query(
            r#"
            UPDATE users
            SET full_name = ?, date_of_birth = ?, gender = ?, triggers = ?, areas_of_focus = ?
            WHERE id = ?
            "#,
        )
        .bind(update.full_name.or(user.full_name))
        .bind(update.date_of_birth.or(user.date_of_birth))
        .bind(update.gender.or(user.gender))
        .bind(update.triggers.or(user.triggers))
        .bind(update.areas_of_focus.or(user.areas_of_focus))
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        self.user_by_id(user_id)
            .await?
            .ok_or(Error::NotFound("user"))
    }

    // ============ Mood entries ============

    pub async fn create_mood_entry(
        &self,
        user_id: i64,
        mood_value: i64,
        notes: Option<&str>,
        tags: &[String],
    ) -> Result<MoodEntry> {
        if !(1..=10).contains(&mood_value) {
            return Err(Error::invalid("mood_value must be between 1 and 10"));
        }

        let now = Utc::now();
        let tags_json = serde_json::to_string(tags).map_err(anyhow::Error::from)?;
        let result = sqlx::query(
            "INSERT INTO mood_entries (user_id, mood_value, notes, tags, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(mood_value)
        .bind(notes)
        .bind(&tags_json)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(MoodEntry {
            id: result.last_insert_rowid(),
            user_id,
            mood_value,
            notes: notes.map(str::to_string),
            tags: tags.to_vec(),
            timestamp: from_ts(now.timestamp()),
        })
    }

    pub async fn mood_entries(&self, user_id: i64, skip: i64, limit: i64) -> Result<Vec<MoodEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM mood_entries WHERE user_id = ? ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(mood_from_row).collect()
    }

    pub async fn delete_mood_entry(&self, user_id: i64, entry_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM mood_entries WHERE id = ? AND user_id = ?")
            .bind(entry_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("mood entry"));
        }
        Ok(())
    }

    // ============ Journal entries ============

    pub async fn create_journal_entry(
        &self,
        user_id: i64,
        title: Option<&str>,
        content: &str,
        sentiment: Sentiment,
    ) -> Result<JournalEntry> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO journal_entries
                (user_id, title, content, sentiment_label, sentiment_score, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(content)
        .bind(sentiment.label.as_str())
        .bind(sentiment.score)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.journal_entry(user_id, result.last_insert_rowid()).await
    }

    pub async fn journal_entry(&self, user_id: i64, entry_id: i64) -> Result<JournalEntry> {
        let row = sqlx::query("SELECT * FROM journal_entries WHERE id = ? AND user_id = ?")
            .bind(entry_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::NotFound("journal entry"))?;

        journal_from_row(&row)
    }

    pub async fn journal_entries(
        &self,
        user_id: i64,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<JournalEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM journal_entries WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(journal_from_row).collect()
    }

    /// Applies a partial update. The caller passes `sentiment` only when the
    /// content changed and it was re-analyzed.
    pub async fn update_journal_entry(
        &self,
        user_id: i64,
        entry_id: i64,
        title: Option<&str>,
        content: Option<&str>,
        sentiment: Option<Sentiment>,
    ) -> Result<JournalEntry> {
        let existing = self.journal_entry(user_id, entry_id).await?;

        let (label, score) = match sentiment {
            Some(s) => (Some(s.label.as_str().to_string()), Some(s.score)),
            None => (
                existing.sentiment_label.map(|l| l.as_str().to_string()),
                existing.sentiment_score,
            ),
        };

        sqlx::query(
            r#"
            UPDATE journal_entries
            SET title = ?, content = ?, sentiment_label = ?, sentiment_score = ?, updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(title.map(str::to_string).or(existing.title))
        .bind(content.unwrap_or(&existing.content))
        .bind(label)
        .bind(score)
        .bind(Utc::now().timestamp())
        .bind(entry_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        self.journal_entry(user_id, entry_id).await
    }

    pub async fn delete_journal_entry(&self, user_id: i64, entry_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM journal_entries WHERE id = ? AND user_id = ?")
            .bind(entry_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("journal entry"));
        }
        Ok(())
    }

    /// Consecutive calendar days with at least one entry, ending today or
    /// yesterday. Zero when neither day has an entry.
    pub async fn journal_streak(&self, user_id: i64) -> Result<i64> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT date(created_at, 'unixepoch') AS day
            FROM journal_entries WHERE user_id = ?
            ORDER BY day DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let dates: Vec<NaiveDate> = rows
            .iter()
            .filter_map(|r| r.get::<String, _>("day").parse().ok())
            .collect();

        Ok(streak_from_dates(&dates, Utc::now().date_naive()))
    }

    // ============ Insights ============

    pub async fn tag_counts(&self, user_id: i64) -> Result<Vec<TagCount>> {
        let rows = sqlx::query("SELECT tags FROM mood_entries WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        let mut counts: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
        for row in &rows {
            let raw: String = row.get("tags");
            let tags: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
            for tag in tags {
                *counts.entry(tag).or_insert(0) += 1;
            }
        }

        let mut out: Vec<TagCount> = counts
            .into_iter()
            .map(|(tag, count)| TagCount { tag, count })
            .collect();
        out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
        Ok(out)
    }

    /// Average mood per weekday, Monday through Sunday, only for weekdays
    /// that have data.
    pub async fn weekday_mood(&self, user_id: i64) -> Result<Vec<WeekdayMood>> {
        let rows = sqlx::query(
            r#"
            SELECT strftime('%w', timestamp, 'unixepoch') AS dow, AVG(mood_value) AS avg_mood
            FROM mood_entries WHERE user_id = ?
            GROUP BY dow
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        // strftime('%w') is 0=Sunday..6=Saturday.
        let mut by_dow = [None::<f64>; 7];
        for row in &rows {
            let dow: String = row.get("dow");
            let avg: f64 = row.get("avg_mood");
            if let Ok(i) = dow.parse::<usize>() {
                if i < 7 {
                    by_dow[i] = Some(avg);
                }
            }
        }

        const ORDER: [(usize, &str); 7] = [
            (1, "Mon"),
            (2, "Tue"),
            (3, "Wed"),
            (4, "Thu"),
            (5, "Fri"),
            (6, "Sat"),
            (0, "Sun"),
        ];

        Ok(ORDER
            .iter()
            .filter_map(|&(i, name)| {
                by_dow[i].map(|avg| WeekdayMood {
                    weekday: name.to_string(),
                    average_mood: round2(avg),
                })
            })
            .collect())
    }

    pub async fn sentiment_summary(&self, user_id: i64) -> Result<SentimentSummary> {
        let rows = sqlx::query(
            r#"
            SELECT sentiment_label, COUNT(*) AS n
            FROM journal_entries
            WHERE user_id = ? AND sentiment_label IS NOT NULL
            GROUP BY sentiment_label
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut positive = 0i64;
        let mut negative = 0i64;
        let mut neutral = 0i64;
        for row in &rows {
            let label: String = row.get("sentiment_label");
            let n: i64 = row.get("n");
            match label.as_str() {
                "Positive" => positive = n,
                "Negative" => negative = n,
                "Neutral" => neutral = n,
                _ => {}
            }
        }

        let total = positive + negative + neutral;
        let pct = |n: i64| {
            if total == 0 {
                0.0
            } else {
                round1(n as f64 * 100.0 / total as f64)
            }
        };

        let most_common = [("Positive", positive), ("Negative", negative), ("Neutral", neutral)]
            .iter()
            .filter(|(_, n)| *n > 0)
            .max_by_key(|(_, n)| *n)
            .map(|(label, _)| label.to_string())
            .unwrap_or_else(|| "None".to_string());

        Ok(SentimentSummary {
            total_entries: total,
            positive_percentage: pct(positive),
            negative_percentage: pct(negative),
            neutral_percentage: pct(neutral),
            most_common_sentiment: most_common,
        })
    }
}

#[async_trait]
impl UserData for SqliteRepo {
    async fn recent_chat_turns(&self, user_id: i64, limit: usize) -> Result<Vec<ChatTurn>> {
        // Select the window newest-first, then restore ascending order.
        let rows = sqlx::query(
            "SELECT * FROM chat_messages WHERE user_id = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut turns: Vec<ChatTurn> = rows.iter().map(turn_from_row).collect::<Result<_>>()?;
        turns.reverse();
        Ok(turns)
    }

    async fn append_chat_turn(
        &self,
        user_id: i64,
        content: &str,
        is_user_message: bool,
    ) -> Result<ChatTurn> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO chat_messages (user_id, content, is_user_message, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(content)
        .bind(is_user_message)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(ChatTurn {
            id: result.last_insert_rowid(),
            user_id,
            content: content.to_string(),
            is_user_message,
            timestamp: from_ts(now),
        })
    }

    async fn mood_trend(&self, user_id: i64, days: i64) -> Result<Vec<MoodTrendPoint>> {
        let end = Utc::now().date_naive();
        let start = end - Duration::days(days.max(1) - 1);
        let start_ts = start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(0);

        let rows = sqlx::query(
            r#"
            SELECT date(timestamp, 'unixepoch') AS day, AVG(mood_value) AS avg_mood
            FROM mood_entries
            WHERE user_id = ? AND timestamp >= ?
            GROUP BY day
            "#,
        )
        .bind(user_id)
        .bind(start_ts)
        .fetch_all(&self.pool)
        .await?;

        let mut by_day: std::collections::HashMap<NaiveDate, f64> = std::collections::HashMap::new();
        for row in &rows {
            let day: String = row.get("day");
            let avg: f64 = row.get("avg_mood");
            if let Ok(date) = day.parse() {
                by_day.insert(date, avg);
            }
        }

        // Zero-fill so the series is continuous for charting.
        let mut points = Vec::with_capacity(days.max(1) as usize);
        let mut date = start;
        while date <= end {
            points.push(MoodTrendPoint {
                date,
                average_mood: round2(by_day.get(&date).copied().unwrap_or(0.0)),
            });
            date += Duration::days(1);
        }
        Ok(points)
    }

    async fn recent_journal_summaries(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<JournalSummary>> {
        let rows = sqlx::query(
            "SELECT title, content FROM journal_entries WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| JournalSummary {
                title: row.get("title"),
                content: row.get("content"),
            })
            .collect())
    }
}

// ============ Row mapping ============

fn from_ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> std::result::Result<User, sqlx::Error> {
    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        full_name: row.get("full_name"),
        date_of_birth: row.get("date_of_birth"),
        gender: row.get("gender"),
        triggers: row.get("triggers"),
        areas_of_focus: row.get("areas_of_focus"),
        created_at: from_ts(row.get("created_at")),
    })
}

fn mood_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<MoodEntry> {
    let raw: String = row.get("tags");
    Ok(MoodEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        mood_value: row.get("mood_value"),
        notes: row.get("notes"),
        tags: serde_json::from_str(&raw).unwrap_or_default(),
        timestamp: from_ts(row.get("timestamp")),
    })
}

fn journal_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<JournalEntry> {
    let label: Option<String> = row.get("sentiment_label");
    Ok(JournalEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        content: row.get("content"),
        sentiment_label: label.as_deref().and_then(crate::models::SentimentLabel::parse),
        sentiment_score: row.get("sentiment_score"),
        created_at: from_ts(row.get("created_at")),
        updated_at: from_ts(row.get("updated_at")),
    })
}

fn turn_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChatTurn> {
    Ok(ChatTurn {
        id: row.get("id"),
        user_id: row.get("user_id"),
        content: row.get("content"),
        is_user_message: row.get("is_user_message"),
        timestamp: from_ts(row.get("timestamp")),
    })
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Walk distinct entry dates (descending) from today or yesterday, counting
/// consecutive days.
fn streak_from_dates(dates: &[NaiveDate], today: NaiveDate) -> i64 {
    let first = match dates.first() {
        Some(d) => *d,
        None => return 0,
    };

    let mut expected = if first == today {
        today
    } else if first == today - Duration::days(1) {
        first
    } else {
        return 0;
    };

    let mut streak = 0i64;
    for &date in dates {
        if date == expected {
            streak += 1;
            expected -= Duration::days(1);
        } else {
            break;
        }
    }
    streak
}
