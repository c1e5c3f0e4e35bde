//! Persisted vector knowledge store.
//!
//! A directory holding one SQLite database of (chunk text, embedding,
//! metadata) rows. [`KnowledgeBase::open`] is the serving path and fails with
//! [`Error::StoreUnavailable`] when the directory or database is absent;
//! [`KnowledgeBase::create_or_open`] is the ingestion path and bootstraps
//! the store.
//!
//! The store records its embedding model at creation. Opening or ingesting
//! with a different model fails rather than mixing vector spaces.
//!
//! Retrieval is brute-force cosine over all stored vectors, which is exact
//! and fast at corpus scale (thousands of chunks, not millions).

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Arc;

use crate::db;
use crate::embedding::{self, Embedder};
use crate::error::{self, Error};
use crate::models::{DocumentChunk, RetrievedChunk};

const STORE_FILE: &str = "knowledge.sqlite3";

pub struct KnowledgeBase {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl KnowledgeBase {
    /// Opens an existing store for serving. The directory and database must
    /// already exist; chat must refuse to run without context rather than
    /// silently retrieving nothing.
    pub async fn open(
        dir: &Path,
        embedder: Arc<dyn Embedder>,
        top_k: usize,
    ) -> error::Result<Self> {
        let db_path = dir.join(STORE_FILE);
        if !db_path.exists() {
            return Err(Error::StoreUnavailable {
                path: dir.to_path_buf(),
            });
        }

        let pool = db::connect(&db_path).await?;
        let kb = Self {
            pool,
            embedder,
            top_k,
        };
        kb.verify_model().await?;
        Ok(kb)
    }

    /// Opens the store for ingestion, creating directory, database, and
    /// schema as needed and stamping the embedding model on first use.
    pub async fn create_or_open(
        dir: &Path,
        embedder: Arc<dyn Embedder>,
        top_k: usize,
    ) -> error::Result<Self> {
        std::fs::create_dir_all(dir).map_err(anyhow::Error::from)?;
        let pool = db::connect(&dir.join(STORE_FILE)).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                hash TEXT NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
            .execute(&pool)
            .await?;

        sqlx::query("INSERT OR IGNORE INTO meta (key, value) VALUES ('embedding_model', ?)")
            .bind(embedder.model_name())
            .execute(&pool)
            .await?;
        sqlx::query("INSERT OR IGNORE INTO meta (key, value) VALUES ('embedding_dims', ?)")
            .bind(embedder.dims() as i64)
            .execute(&pool)
            .await?;

        let kb = Self {
            pool,
            embedder,
            top_k,
        };
        kb.verify_model().await?;
        Ok(kb)
    }

    async fn verify_model(&self) -> error::Result<()> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT value FROM meta WHERE key = 'embedding_model'")
                .fetch_optional(&self.pool)
                .await?;

        match stored {
            Some(model) if model == self.embedder.model_name() => Ok(()),
            Some(model) => Err(Error::ModelMismatch {
                stored: model,
                configured: self.embedder.model_name().to_string(),
            }),
            None => Err(anyhow::anyhow!("Knowledge store is missing its metadata table").into()),
        }
    }

    /// Embeds and persists chunks in batches. Additive: re-ingesting the
    /// same source duplicates its chunks, use [`KnowledgeBase::reset`] first
    /// for a rebuild.
    pub async fn ingest(&self, chunks: &[DocumentChunk], batch_size: usize) -> Result<usize> {
        let mut inserted = 0usize;

        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;

            if vectors.len() != batch.len() {
                bail!(
                    "Embedding provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                );
            }

            for (chunk, vector) in batch.iter().zip(vectors.iter()) {
                if vector.len() != self.embedder.dims() {
                    bail!(
                        "Embedding has {} dimensions, expected {}",
                        vector.len(),
                        self.embedder.dims()
                    );
                }

                sqlx::query(
                    r#"
                    INSERT INTO chunks (id, source, chunk_index, text, hash, embedding)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&chunk.id)
                .bind(&chunk.source)
                .bind(chunk.chunk_index)
                .bind(&chunk.text)
                .bind(&chunk.hash)
                .bind(embedding::vec_to_blob(vector))
                .execute(&self.pool)
                .await?;

                inserted += 1;
            }
        }

        Ok(inserted)
    }

    /// Deletes all stored chunks, keeping the model metadata.
    pub async fn reset(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Returns the `top_k` nearest chunks by cosine similarity, most similar
    /// first. Ties break on (source, chunk_index) so results are stable for
    /// a fixed store state.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let query_vec = embedding::embed_query(self.embedder.as_ref(), query).await?;

        let rows = sqlx::query("SELECT source, chunk_index, text, embedding FROM chunks")
            .fetch_all(&self.pool)
            .await?;

        let mut scored: Vec<RetrievedChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = embedding::blob_to_vec(&blob);
                RetrievedChunk {
                    text: row.get("text"),
                    source: row.get("source"),
                    chunk_index: row.get("chunk_index"),
                    score: embedding::cosine_similarity(&query_vec, &vec),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        scored.truncate(self.top_k);

        Ok(scored)
    }

    /// Number of stored chunks.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_text;
    use async_trait::async_trait;

    /// Deterministic embedder: byte histogram over 16 buckets. Identical
    /// text embeds identically, so a query equal to a stored chunk ranks it
    /// first.
    struct HistogramEmbedder;

    fn histogram(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; 16];
        for b in text.bytes() {
            v[(b % 16) as usize] += 1.0;
        }
        v
    }

    #[async_trait]
    impl Embedder for HistogramEmbedder {
        fn model_name(&self) -> &str {
            "histogram-test"
        }
        fn dims(&self) -> usize {
            16
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| histogram(t)).collect())
        }
    }

    struct RenamedEmbedder;

    #[async_trait]
    impl Embedder for RenamedEmbedder {
        fn model_name(&self) -> &str {
            "other-model"
        }
        fn dims(&self) -> usize {
            16
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| histogram(t)).collect())
        }
    }

    #[tokio::test]
    async fn open_missing_store_is_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = KnowledgeBase::open(&missing, Arc::new(HistogramEmbedder), 3)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn ingest_then_retrieve_ranks_exact_match_first() {
        let dir = tempfile::TempDir::new().unwrap();
        let kb = KnowledgeBase::create_or_open(dir.path(), Arc::new(HistogramEmbedder), 3)
            .await
            .unwrap();

        let mut chunks = chunk_text("calm.txt", "Breathing exercises calm the mind.", 1000, 0);
        chunks.extend(chunk_text("sleep.txt", "zzzz zzzz zzzz zzzz", 1000, 0));
        let inserted = kb.ingest(&chunks, 8).await.unwrap();
        assert_eq!(inserted, 2);

        let results = kb
            .retrieve("Breathing exercises calm the mind.")
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].source, "calm.txt");
        assert!(results[0].score > results[1].score);
        kb.close().await;
    }

    #[tokio::test]
    async fn retrieve_is_deterministic() {
        let dir = tempfile::TempDir::new().unwrap();
        let kb = KnowledgeBase::create_or_open(dir.path(), Arc::new(HistogramEmbedder), 2)
            .await
            .unwrap();

        let mut chunks = Vec::new();
        for (name, text) in [
            ("a.txt", "mindfulness practice"),
            ("b.txt", "gratitude journal"),
            ("c.txt", "sleep hygiene"),
        ] {
            chunks.extend(chunk_text(name, text, 1000, 0));
        }
        kb.ingest(&chunks, 2).await.unwrap();

        let first = kb.retrieve("mindfulness").await.unwrap();
        let second = kb.retrieve("mindfulness").await.unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.source, b.source);
            assert_eq!(a.chunk_index, b.chunk_index);
            assert_eq!(a.score, b.score);
        }
        assert!(first.len() <= 2);
        kb.close().await;
    }

    #[tokio::test]
    async fn reopening_with_different_model_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let kb = KnowledgeBase::create_or_open(dir.path(), Arc::new(HistogramEmbedder), 3)
                .await
                .unwrap();
            kb.close().await;
        }

        let err = KnowledgeBase::open(dir.path(), Arc::new(RenamedEmbedder), 3)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::ModelMismatch { .. }));
    }

    #[tokio::test]
    async fn reset_clears_chunks() {
        let dir = tempfile::TempDir::new().unwrap();
        let kb = KnowledgeBase::create_or_open(dir.path(), Arc::new(HistogramEmbedder), 3)
            .await
            .unwrap();

        let chunks = chunk_text("a.txt", "some corpus text", 1000, 0);
        kb.ingest(&chunks, 8).await.unwrap();
        assert_eq!(kb.count().await.unwrap(), 1);

        kb.reset().await.unwrap();
        assert_eq!(kb.count().await.unwrap(), 0);
        kb.close().await;
    }
}
