//! In-process end-to-end exercises of the RAG orchestration over a temp
//! SQLite database, with fake embedding and chat-model handles.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use mindwell::assistant::Assistant;
use mindwell::chunk::chunk_text;
use mindwell::db;
use mindwell::embedding::Embedder;
use mindwell::error::Error;
use mindwell::knowledge::KnowledgeBase;
use mindwell::llm::{ChatModel, ChatRequest};
use mindwell::migrate;
use mindwell::repo::{SqliteRepo, UserData};

/// Byte-histogram embedder: deterministic, no model download.
struct FakeEmbedder;

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-histogram"
    }
    fn dims(&self) -> usize {
        16
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 16];
                for b in t.bytes() {
                    v[(b % 16) as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Fake chat model that records every request and can be switched into a
/// failing mode.
struct FakeChat {
    requests: Mutex<Vec<ChatRequest>>,
    fail: AtomicBool,
}

impl FakeChat {
    fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn generate(&self, request: &ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("model endpoint unreachable");
        }
        Ok("It sounds like a lot is on your mind. Try a slow breathing exercise.".to_string())
    }
}

struct Fixture {
    _dir: TempDir,
    repo: Arc<SqliteRepo>,
    model: Arc<FakeChat>,
    assistant: Assistant,
    user_id: i64,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();

    let pool = db::connect(&dir.path().join("app.sqlite3")).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    let repo = Arc::new(SqliteRepo::new(pool));
    let user = repo
        .create_user("test@example.com", "hash", None)
        .await
        .unwrap();

    let embedder = Arc::new(FakeEmbedder);
    let kb = KnowledgeBase::create_or_open(&dir.path().join("knowledge"), embedder, 3)
        .await
        .unwrap();

    let mut chunks = Vec::new();
    for (name, text) in [
        ("anxiety.md", "Grounding techniques help with anxious thoughts."),
        ("sleep.md", "A consistent bedtime supports restful sleep."),
        ("gratitude.md", "Writing three good things builds gratitude."),
        ("breathing.md", "Box breathing slows the nervous system."),
    ] {
        chunks.extend(chunk_text(name, text, 1000, 0));
    }
    kb.ingest(&chunks, 8).await.unwrap();

    let model = Arc::new(FakeChat::new());
    let assistant = Assistant::new(kb, model.clone(), repo.clone(), 10);

    Fixture {
        _dir: dir,
        repo,
        model,
        assistant,
        user_id: user.id,
    }
}

#[tokio::test]
async fn fresh_user_exchange_persists_exactly_two_turns() {
    let fx = fixture().await;

    let reply = fx
        .assistant
        .respond(fx.user_id, "I feel anxious today.")
        .await
        .unwrap();

    assert!(!reply.response.is_empty());
    assert!(reply.sources.len() <= 3);
    assert!(!reply.sources.is_empty());

    // The single LLM call saw empty history and the no-data context digest.
    let requests = fx.model.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].history.is_empty());
    assert!(requests[0].system.contains("No recent mood entries available."));
    assert!(requests[0].system.contains("No recent journal entries available."));
    assert!(requests[0].system.contains("NOT a licensed therapist"));
    drop(requests);

    let turns = fx.repo.recent_chat_turns(fx.user_id, 10).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert!(turns[0].is_user_message);
    assert_eq!(turns[0].content, "I feel anxious today.");
    assert!(!turns[1].is_user_message);
    assert_eq!(turns[1].content, reply.response);
}

#[tokio::test]
async fn second_exchange_carries_reconstructed_history() {
    let fx = fixture().await;

    fx.assistant
        .respond(fx.user_id, "I can't sleep.")
        .await
        .unwrap();
    fx.assistant
        .respond(fx.user_id, "What else can I try?")
        .await
        .unwrap();

    let requests = fx.model.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].history.len(), 1);
    assert_eq!(requests[1].history[0].user, "I can't sleep.");
    assert_eq!(requests[1].message, "What else can I try?");
}

#[tokio::test]
async fn failed_generation_persists_nothing() {
    let fx = fixture().await;
    fx.model.fail.store(true, Ordering::SeqCst);

    let err = fx
        .assistant
        .respond(fx.user_id, "Hello?")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::AssistantUnavailable(_)));

    let turns = fx.repo.recent_chat_turns(fx.user_id, 10).await.unwrap();
    assert!(turns.is_empty(), "a failed call must not record turns");
}

#[tokio::test]
async fn user_context_reflects_recent_mood_and_journal() {
    let fx = fixture().await;

    fx.repo
        .create_mood_entry(fx.user_id, 8, None, &[])
        .await
        .unwrap();
    fx.repo
        .create_journal_entry(
            fx.user_id,
            Some("Morning"),
            "Slept well and went for a walk.",
            mindwell::models::Sentiment::neutral(),
        )
        .await
        .unwrap();

    fx.assistant
        .respond(fx.user_id, "How am I doing lately?")
        .await
        .unwrap();

    let requests = fx.model.requests.lock().unwrap();
    let system = &requests[0].system;
    assert!(system.contains("average mood in the last 7 days is 8.0"));
    assert!(system.contains("'Morning: Slept well and went for a walk.'"));
}

#[tokio::test]
async fn retrieval_is_deterministic_across_exchanges() {
    let fx = fixture().await;

    let first = fx
        .assistant
        .respond(fx.user_id, "help with anxious thoughts")
        .await
        .unwrap();
    let second = fx
        .assistant
        .respond(fx.user_id, "help with anxious thoughts")
        .await
        .unwrap();

    assert_eq!(first.sources.len(), second.sources.len());
    for (a, b) in first.sources.iter().zip(second.sources.iter()) {
        assert_eq!(a.source, b.source);
        assert_eq!(a.chunk_index, b.chunk_index);
        assert_eq!(a.score, b.score);
    }
}
