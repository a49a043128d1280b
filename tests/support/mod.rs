//! In-memory collaborator fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use quizcache::{
    CachedParticipation, CachedSubmission, ExerciseId, ExerciseRepository, Grader, PendingResult,
    QuizExercise, QuizPersistence,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Exercise repository backed by a map
#[derive(Default)]
pub struct FakeExercises {
    exercises: Mutex<HashMap<ExerciseId, QuizExercise>>,
}

impl FakeExercises {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, exercise: QuizExercise) {
        self.exercises.lock().unwrap().insert(exercise.id, exercise);
    }
}

#[async_trait]
impl ExerciseRepository for FakeExercises {
    async fn load_exercise(&self, id: ExerciseId) -> quizcache::Result<Option<QuizExercise>> {
        Ok(self.exercises.lock().unwrap().get(&id).cloned())
    }

    async fn find_exercises_starting_in_future(&self) -> quizcache::Result<Vec<QuizExercise>> {
        let now = Utc::now();
        Ok(self
            .exercises
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.start_time > now)
            .cloned()
            .collect())
    }
}

/// Durable storage fake with save-failure injection
#[derive(Default)]
pub struct FakeDurableStore {
    submissions: Mutex<HashMap<(ExerciseId, String), CachedSubmission>>,
    participations: Mutex<HashMap<(ExerciseId, String), CachedParticipation>>,
    results: Mutex<HashMap<(ExerciseId, String), PendingResult>>,
    failures_remaining: AtomicUsize,
    save_delay_ms: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` save calls fail with a persistence error.
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    fn check_failure(&self) -> quizcache::Result<()> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(quizcache::Error::Persistence("injected failure".into()));
        }
        Ok(())
    }

    /// Stall every save call by `ms` virtual milliseconds; 0 disables.
    pub fn slow_saves(&self, ms: u64) {
        self.save_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Highest number of save calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter_save(&self) -> quizcache::Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = self.save_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.check_failure()
    }

    pub fn stored_submission(
        &self,
        exercise_id: ExerciseId,
        participant: &str,
    ) -> Option<CachedSubmission> {
        self.submissions
            .lock()
            .unwrap()
            .get(&(exercise_id, participant.to_string()))
            .cloned()
    }

    pub fn stored_result(
        &self,
        exercise_id: ExerciseId,
        participant: &str,
    ) -> Option<PendingResult> {
        self.results
            .lock()
            .unwrap()
            .get(&(exercise_id, participant.to_string()))
            .cloned()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

#[async_trait]
impl QuizPersistence for FakeDurableStore {
    async fn save_participation(
        &self,
        participation: &CachedParticipation,
    ) -> quizcache::Result<()> {
        self.enter_save().await?;
        self.participations.lock().unwrap().insert(
            (participation.exercise_id, participation.participant.clone()),
            participation.clone(),
        );
        Ok(())
    }

    async fn save_submission(
        &self,
        exercise_id: ExerciseId,
        participant: &str,
        submission: &CachedSubmission,
    ) -> quizcache::Result<()> {
        self.enter_save().await?;
        self.submissions
            .lock()
            .unwrap()
            .insert((exercise_id, participant.to_string()), submission.clone());
        Ok(())
    }

    async fn save_result(
        &self,
        exercise_id: ExerciseId,
        result: &PendingResult,
    ) -> quizcache::Result<()> {
        self.enter_save().await?;
        self.results
            .lock()
            .unwrap()
            .insert((exercise_id, result.participant.clone()), result.clone());
        Ok(())
    }

    async fn load_submission(
        &self,
        exercise_id: ExerciseId,
        participant: &str,
    ) -> quizcache::Result<Option<CachedSubmission>> {
        Ok(self.stored_submission(exercise_id, participant))
    }
}

/// Grader scoring one point per answered question
pub struct CountingGrader;

impl Grader for CountingGrader {
    fn compute_result(
        &self,
        submission: &CachedSubmission,
        _exercise: &QuizExercise,
    ) -> PendingResult {
        let score = submission
            .answers
            .as_object()
            .map(|answers| answers.len() as f64)
            .unwrap_or(0.0);
        PendingResult {
            participant: String::new(),
            score,
            completed_at: Utc::now(),
        }
    }
}

/// A quiz exercise whose window is offset from now by whole seconds
pub fn exercise_with_window(
    id: ExerciseId,
    start_offset_secs: i64,
    end_offset_secs: i64,
) -> QuizExercise {
    let now = Utc::now();
    QuizExercise {
        id,
        title: format!("Quiz {}", id),
        start_time: now + chrono::Duration::seconds(start_offset_secs),
        end_time: now + chrono::Duration::seconds(end_offset_secs),
        questions: serde_json::json!({ "q1": { "type": "multiple-choice" } }),
    }
}

pub fn answer(value: &str) -> CachedSubmission {
    CachedSubmission {
        answers: serde_json::json!({ "q1": value }),
        submitted: false,
        submitted_at: None,
        updated_at: None,
    }
}
