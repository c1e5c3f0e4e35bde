//! The RAG orchestrator: one user message in, one grounded reply out.
//!
//! A single exchange runs history reconstruction and the user-context digest
//! concurrently, retrieves supporting chunks from the knowledge store,
//! invokes the chat model once, and only then persists the (user, assistant)
//! turn pair. A failed generation persists nothing and surfaces as
//! [`Error::AssistantUnavailable`].

use std::sync::Arc;
use tracing::{debug, error};

use crate::context;
use crate::error::{Error, Result};
use crate::history;
use crate::knowledge::KnowledgeBase;
use crate::llm::{ChatModel, ChatRequest};
use crate::models::RetrievedChunk;
use crate::repo::UserData;

const PERSONA: &str = r#"You are a compassionate, non-judgmental mental health and self-help assistant.
Your goal is to provide supportive, evidence-based self-help strategies, information,
and coping mechanisms based on the provided context documents.
You are NOT a licensed therapist, doctor, or medical professional.
Always encourage users to seek professional help if they are in crisis or need clinical advice.
Respond in a calm, encouraging, and helpful tone."#;

/// One completed exchange: the reply plus the chunks it was grounded on.
#[derive(Debug)]
pub struct AssistantReply {
    pub response: String,
    pub sources: Vec<RetrievedChunk>,
}

pub struct Assistant {
    knowledge: KnowledgeBase,
    model: Arc<dyn ChatModel>,
    repo: Arc<dyn UserData>,
    history_limit: usize,
}

impl Assistant {
    /// The knowledge store must already be open; [`KnowledgeBase::open`]
    /// fails fast at startup when the store is missing, so a constructed
    /// `Assistant` always has context to retrieve from.
    pub fn new(
        knowledge: KnowledgeBase,
        model: Arc<dyn ChatModel>,
        repo: Arc<dyn UserData>,
        history_limit: usize,
    ) -> Self {
        Self {
            knowledge,
            model,
            repo,
            history_limit,
        }
    }

    /// Run one exchange for `user_id`.
    ///
    /// Concurrent calls for the same user are not serialized; if the caller
    /// allows them, turn persistence order is last-write-wins.
    pub async fn respond(&self, user_id: i64, message: &str) -> Result<AssistantReply> {
        // History and the context digest are independent reads.
        let (turns, trend, journals) = tokio::try_join!(
            self.repo.recent_chat_turns(user_id, self.history_limit),
            self.repo.mood_trend(user_id, context::MOOD_WINDOW_DAYS),
            self.repo.recent_journal_summaries(user_id, context::JOURNAL_LIMIT),
        )?;

        let pairs = history::pair_turns(&turns);
        let user_context = context::summarize(&trend, &journals);

        let sources = self
            .knowledge
            .retrieve(message)
            .await
            .map_err(Error::Internal)?;

        debug!(
            user_id,
            history_pairs = pairs.len(),
            sources = sources.len(),
            "assembled chat prompt"
        );

        let request = ChatRequest {
            system: build_system_prompt(&user_context, &sources),
            history: pairs,
            message: message.to_string(),
        };

        let response = match self.model.generate(&request).await {
            Ok(text) => text,
            Err(e) => {
                error!(user_id, error = %e, "chat generation failed");
                return Err(Error::AssistantUnavailable(e));
            }
        };

        // Persist only after a successful generation, user turn first.
        self.repo.append_chat_turn(user_id, message, true).await?;
        self.repo.append_chat_turn(user_id, &response, false).await?;

        Ok(AssistantReply { response, sources })
    }
}

/// The persona, the user-context digest, and the retrieved chunks, combined
/// into one system instruction. History travels separately as structured
/// turns.
fn build_system_prompt(user_context: &str, sources: &[RetrievedChunk]) -> String {
    let mut prompt = String::from(PERSONA);

    prompt.push_str("\n\nHere is recent context about the user from their mood and journal entries:\n");
    prompt.push_str(user_context);

    prompt.push_str("\n\nUse the following retrieved context documents to answer the question:\n");
    if sources.is_empty() {
        prompt.push_str("(no relevant documents found)\n");
    } else {
        for chunk in sources {
            prompt.push_str("---\n");
            prompt.push_str(&chunk.text);
            prompt.push('\n');
        }
    }

    prompt
}
