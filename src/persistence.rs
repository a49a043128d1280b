//! Collaborator traits for durable storage and grading
//!
//! The cache core never talks to the relational database directly; these
//! seams are implemented by the surrounding application. All save operations
//! must be idempotent on retry.

use crate::model::{
    CachedParticipation, CachedSubmission, ExerciseId, PendingResult, QuizExercise,
};
use async_trait::async_trait;

/// Durable storage of exercise definitions
#[async_trait]
pub trait ExerciseRepository: Send + Sync {
    async fn load_exercise(&self, id: ExerciseId) -> crate::Result<Option<QuizExercise>>;

    /// Exercises whose start time lies in the future, used to re-derive
    /// pending timers after a process restart.
    async fn find_exercises_starting_in_future(&self) -> crate::Result<Vec<QuizExercise>>;
}

/// Durable storage of participations, submissions and results
#[async_trait]
pub trait QuizPersistence: Send + Sync {
    async fn save_participation(&self, participation: &CachedParticipation) -> crate::Result<()>;

    async fn save_submission(
        &self,
        exercise_id: ExerciseId,
        participant: &str,
        submission: &CachedSubmission,
    ) -> crate::Result<()>;

    async fn save_result(&self, exercise_id: ExerciseId, result: &PendingResult)
        -> crate::Result<()>;

    /// Read-back for when no live cache holds the participant's work, e.g.
    /// after the quiz has been finalized and drained.
    async fn load_submission(
        &self,
        exercise_id: ExerciseId,
        participant: &str,
    ) -> crate::Result<Option<CachedSubmission>>;
}

/// Grading collaborator; a pure function over the cached state
pub trait Grader: Send + Sync {
    fn compute_result(
        &self,
        submission: &CachedSubmission,
        exercise: &QuizExercise,
    ) -> PendingResult;
}
