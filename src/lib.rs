//! # Mindwell
//!
//! A personal mental-health journaling and mood-tracking service with a
//! retrieval-augmented wellness assistant.
//!
//! The service persists mood entries, journal entries (annotated with
//! LLM-derived sentiment), and chat history in SQLite, and answers chat
//! messages by combining a persisted vector knowledge base, the user's
//! recent conversation, and a digest of their mood/journal data into one
//! grounded LLM call.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────────┐
//! │  corpus  │──▶│   ingest     │──▶│ knowledge store │
//! │ txt/md/  │   │ chunk+embed  │   │ (SQLite+BLOBs) │
//! │   pdf    │   └──────────────┘   └───────┬────────┘
//! └──────────┘                              │ retrieve
//!                 ┌──────────┐      ┌───────▼────────┐
//!                 │ app db   │─────▶│   assistant    │──▶ LLM
//!                 │ (SQLite) │      │ history+context│
//!                 └────▲─────┘      └───────┬────────┘
//!                      │    HTTP API (axum) │
//!                      └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mindwell init                       # write mindwell.toml, create the app db
//! mindwell ingest --corpus ./corpus   # build the knowledge store
//! mindwell search "coping with anxiety"
//! mindwell serve                      # run the HTTP service
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`chunk`] | Boundary-aware text chunking |
//! | [`embedding`] | Embedding provider abstraction (local / Gemini) |
//! | [`knowledge`] | Persisted vector knowledge store |
//! | [`history`] | Conversational memory reconstruction |
//! | [`context`] | Per-user context digest |
//! | [`sentiment`] | Journal sentiment classification with neutral fallback |
//! | [`llm`] | Chat model abstraction (Gemini `generateContent`) |
//! | [`assistant`] | RAG orchestration |
//! | [`repo`] | Application persistence and insights aggregations |
//! | [`auth`] | Password hashing and bearer tokens |
//! | [`server`] | HTTP service |
//! | [`ingest`] | Corpus ingestion ETL |
//! | [`search`] | CLI debug retrieval |

pub mod assistant;
pub mod auth;
pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod history;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod repo;
pub mod search;
pub mod sentiment;
pub mod server;
