//! Error types for the NOUS core library.

use thiserror::Error;

/// Top-level error type for all NOUS operations.
#[derive(Error, Debug)]
pub enum NousError {
    /// SQLite persistence error. Always propagated to the caller.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The concept extractor returned nothing usable.
    ///
    /// The engine treats this as "zero concepts" and carries on.
    #[error("Concept extraction failed: {0}")]
    Extraction(String),

    /// A graph algorithm could not run on the current graph.
    ///
    /// Cascade steps that hit this are skipped, never fatal.
    #[error("Graph algorithm failed: {0}")]
    GraphAlgorithm(String),

    /// The embedding provider failed.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for NousError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, NousError>;
