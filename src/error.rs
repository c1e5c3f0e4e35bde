//! Error taxonomy for the mindwell service.
//!
//! Startup failures (missing knowledge store, missing credentials) abort the
//! process before any request is served. Per-request failures split into the
//! surfaced kinds mapped to HTTP responses by the server layer and the one
//! sanctioned degradation: sentiment classification, which falls back to a
//! neutral annotation inside its own module and never reaches this enum.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The persisted knowledge store is absent. Raised at startup only; the
    /// service refuses to run rather than answering with no context.
    #[error("knowledge store not found at {path}; run `mindwell ingest` to build it")]
    StoreUnavailable { path: PathBuf },

    /// Vectors from different embedding models must never be compared.
    #[error("knowledge store was built with embedding model '{stored}' but '{configured}' is configured")]
    ModelMismatch { stored: String, configured: String },

    /// A credential named in the configuration is not present in the
    /// environment. Startup-fatal.
    #[error("environment variable {0} is not set")]
    MissingCredential(String),

    /// The language model could not produce a chat response. Surfaced to the
    /// caller as a service-unavailable condition; no turns are persisted.
    #[error("assistant unavailable")]
    AssistantUnavailable(#[source] anyhow::Error),

    /// Authentication failure: bad credentials, bad or expired token.
    #[error("{0}")]
    Unauthorized(&'static str),

    /// The requested record does not exist or belongs to another user.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The request payload fails validation.
    #[error("{0}")]
    Invalid(String),

    #[error("database error")]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::Invalid(msg.into())
    }
}
