//! Error types for quizcache

use crate::model::ExerciseId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Submission errors ===
    #[error("Submission already finalized for '{participant}' in exercise {exercise_id}")]
    AlreadySubmitted {
        exercise_id: ExerciseId,
        participant: String,
    },

    #[error("Quiz {0} is not accepting submissions")]
    QuizNotActive(ExerciseId),

    #[error("Exercise not found: {0}")]
    ExerciseNotFound(ExerciseId),

    // === Store errors ===
    #[error("Distributed store not ready: {0}")]
    StoreNotReady(String),

    #[error("Codec error: {0}")]
    Codec(String),

    // === Persistence errors ===
    #[error("Persistence failure: {0}")]
    Persistence(String),

    // === Config errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a retryable error?
    ///
    /// `StoreNotReady` is deliberately not retryable: callers must fall back
    /// to a local store instead of spinning on a dead backend.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Persistence(_))
    }
}

// Implement From for common error types
impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
