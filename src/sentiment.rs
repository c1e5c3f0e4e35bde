//! LLM-backed sentiment classification for journal entries.
//!
//! [`SentimentAnalyzer::analyze`] never fails: empty input short-circuits to
//! a neutral annotation, and every failure past that point — the model call
//! itself, a malformed fence, invalid JSON, an unexpected label — degrades to
//! the same neutral fallback. Sentiment is an enrichment field; a journal
//! write must never block on it.
//!
//! Parsing runs as a pipeline of total functions: strip an optional fenced
//! code block, parse JSON, validate label and score. Each stage returns
//! `Option` and `None` anywhere means fallback.

use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::llm::{ChatModel, ChatRequest};
use crate::models::{Sentiment, SentimentLabel};

const SYSTEM_PROMPT: &str = r#"You are a highly accurate sentiment analysis AI. Analyze the user's journal entry and determine its overall sentiment.
Provide the sentiment label as one of: "Positive", "Negative", or "Neutral".
Also, provide a sentiment score between -1.0 (most negative) and 1.0 (most positive). If sentiment is neutral, score should be 0.0.
Respond ONLY with a JSON object. Ensure the JSON is perfectly valid and contains ONLY the JSON object, nothing else.
No preamble, no explanation, no markdown backticks outside the JSON.
Example for positive: {"sentiment_label": "Positive", "sentiment_score": 0.85}
Example for neutral/mixed: {"sentiment_label": "Neutral", "sentiment_score": 0.1}
Example for negative: {"sentiment_label": "Negative", "sentiment_score": -0.7}"#;

pub struct SentimentAnalyzer {
    model: Arc<dyn ChatModel>,
}

impl SentimentAnalyzer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Classify `text`. Whitespace-only input returns the neutral fallback
    /// without touching the model.
    pub async fn analyze(&self, text: &str) -> Sentiment {
        if text.trim().is_empty() {
            return Sentiment::neutral();
        }

        let request = ChatRequest {
            system: SYSTEM_PROMPT.to_string(),
            history: Vec::new(),
            message: format!("Analyze the sentiment of this text: {}", text),
        };

        match self.model.generate(&request).await {
            Ok(raw) => parse_response(&raw).unwrap_or_else(|| {
                warn!(response = %raw, "unparseable sentiment response, using neutral fallback");
                Sentiment::neutral()
            }),
            Err(e) => {
                warn!(error = %e, "sentiment model call failed, using neutral fallback");
                Sentiment::neutral()
            }
        }
    }
}

#[derive(Deserialize)]
struct SentimentPayload {
    sentiment_label: String,
    sentiment_score: f64,
}

/// The full parse pipeline. `None` means the caller should fall back.
fn parse_response(raw: &str) -> Option<Sentiment> {
    let inner = strip_fence(raw);
    let payload: SentimentPayload = serde_json::from_str(inner).ok()?;
    let label = SentimentLabel::parse(&payload.sentiment_label)?;
    if !payload.sentiment_score.is_finite() {
        return None;
    }
    // The data model constrains scores to [-1, 1]; clamp rather than reject.
    Some(Sentiment {
        label,
        score: payload.sentiment_score.clamp(-1.0, 1.0),
    })
}

/// Remove a surrounding markdown code fence (```json or bare ```) if present.
/// An unterminated fence keeps everything after the opener. Total: unfenced
/// input passes through trimmed.
fn strip_fence(raw: &str) -> &str {
    let trimmed = raw.trim();

    let rest = if let Some(r) = trimmed.strip_prefix("```json") {
        r
    } else if let Some(r) = trimmed.strip_prefix("```") {
        r
    } else {
        return trimmed;
    };

    match rest.find("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    struct CannedModel {
        reply: std::result::Result<String, String>,
    }

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn generate(&self, _request: &ChatRequest) -> Result<String> {
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(anyhow::anyhow!(e.clone())),
            }
        }
    }

    async fn analyze_with(reply: std::result::Result<&str, &str>, text: &str) -> Sentiment {
        let model = CannedModel {
            reply: reply.map(str::to_string).map_err(str::to_string),
        };
        SentimentAnalyzer::new(Arc::new(model)).analyze(text).await
    }

    #[tokio::test]
    async fn empty_and_whitespace_short_circuit() {
        // A model that panics proves no call happens.
        struct PanicModel;
        #[async_trait]
        impl ChatModel for PanicModel {
            async fn generate(&self, _request: &ChatRequest) -> Result<String> {
                panic!("sentiment analysis must not call the model for empty input");
            }
        }
        let analyzer = SentimentAnalyzer::new(Arc::new(PanicModel));
        assert_eq!(analyzer.analyze("").await, Sentiment::neutral());
        assert_eq!(analyzer.analyze("   ").await, Sentiment::neutral());
    }

    #[tokio::test]
    async fn fenced_json_parses() {
        let s = analyze_with(
            Ok("```json\n{\"sentiment_label\":\"Positive\",\"sentiment_score\":0.6}\n```"),
            "great day",
        )
        .await;
        assert_eq!(s.label, SentimentLabel::Positive);
        assert!((s.score - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn bare_fence_and_unfenced_parse() {
        let s = analyze_with(
            Ok("```\n{\"sentiment_label\":\"Negative\",\"sentiment_score\":-0.7}\n```"),
            "rough day",
        )
        .await;
        assert_eq!(s.label, SentimentLabel::Negative);

        let s = analyze_with(
            Ok("{\"sentiment_label\":\"Neutral\",\"sentiment_score\":0.1}"),
            "a day",
        )
        .await;
        assert_eq!(s.label, SentimentLabel::Neutral);
        assert!((s.score - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unterminated_fence_still_parses() {
        let s = analyze_with(
            Ok("```json\n{\"sentiment_label\":\"Positive\",\"sentiment_score\":0.5}"),
            "ok",
        )
        .await;
        assert_eq!(s.label, SentimentLabel::Positive);
    }

    #[tokio::test]
    async fn malformed_responses_fall_back_to_neutral() {
        for bad in [
            "not json at all",
            "{\"sentiment_label\":\"Ecstatic\",\"sentiment_score\":0.9}",
            "{\"sentiment_label\":\"Positive\",\"sentiment_score\":\"high\"}",
            "{\"sentiment_label\":\"Positive\"}",
            "```json\nbroken\n```",
        ] {
            let s = analyze_with(Ok(bad), "text").await;
            assert_eq!(s, Sentiment::neutral(), "input: {}", bad);
        }
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_neutral() {
        let s = analyze_with(Err("connection refused"), "text").await;
        assert_eq!(s, Sentiment::neutral());
    }

    #[test]
    fn scores_clamp_into_range() {
        let s = parse_response("{\"sentiment_label\":\"Positive\",\"sentiment_score\":3.5}")
            .unwrap();
        assert_eq!(s.score, 1.0);
        let s = parse_response("{\"sentiment_label\":\"Negative\",\"sentiment_score\":-2.0}")
            .unwrap();
        assert_eq!(s.score, -1.0);
    }

    #[test]
    fn non_finite_score_is_rejected() {
        assert!(parse_response("{\"sentiment_label\":\"Neutral\",\"sentiment_score\":null}")
            .is_none());
    }
}
