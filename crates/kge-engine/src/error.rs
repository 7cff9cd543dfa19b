use thiserror::Error;

use crate::triple::Triple;

/// Which index space an out-of-range index belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Entity index (head or tail position).
    Entity,
    /// Relation index.
    Relation,
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKind::Entity => f.write_str("entity"),
            IndexKind::Relation => f.write_str("relation"),
        }
    }
}

/// Errors that can occur in kge-engine.
#[derive(Error, Debug)]
pub enum Error {
    /// A triple references an index outside the declared entity/relation count.
    #[error("Invalid {kind} index {index} in {triple} (count is {bound})")]
    InvalidIndex {
        kind: IndexKind,
        index: u32,
        bound: usize,
        triple: Triple,
    },
    /// The scoring model returned the wrong number of scores.
    #[error("Score count mismatch: expected {expected} scores, model returned {actual}")]
    ScoreCountMismatch { expected: usize, actual: usize },
    /// Configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Entity name not found in the vocabulary.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),
    /// Relation name not found in the vocabulary.
    #[error("Relation not found: {0}")]
    RelationNotFound(String),
    /// Failure reported by a scoring model implementation.
    #[error("Model error: {0}")]
    Model(String),
    /// The operation was cancelled between units of work.
    #[error("Operation cancelled")]
    Cancelled,
    /// The batch preparation thread died.
    #[error("Batch worker failed: {0}")]
    Worker(String),
}

impl Error {
    /// Create a configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Create a model error.
    pub fn model(msg: impl Into<String>) -> Self {
        Error::Model(msg.into())
    }

    /// Whether this error is fatal for the surrounding run.
    ///
    /// Only cancellation is not: the caller asked for it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Cancelled)
    }
}

/// Result type alias for kge-engine.
pub type Result<T> = std::result::Result<T, Error>;
