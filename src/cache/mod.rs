//! Per-exercise cache of live quiz state
//!
//! One [`ExerciseCache`] exists per currently live exercise. It bundles the
//! three typed stores (submissions, participations, pending results), a
//! cached copy of the exercise definition, the per-exercise phase, and the
//! outstanding timer handles. The registry owns caches; the scheduler only
//! borrows them.

pub mod registry;

pub use registry::CacheRegistry;

use crate::model::{
    CachedParticipation, CachedSubmission, ExerciseId, PendingResult, QuizExercise, QuizPhase,
};
use crate::scheduler::task::{QuizTransition, ScheduledTask};
use crate::store::TypedStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};

pub struct ExerciseCache {
    exercise_id: ExerciseId,
    exercise: RwLock<Option<QuizExercise>>,
    phase: AtomicU8,
    submissions: TypedStore<CachedSubmission>,
    participations: TypedStore<CachedParticipation>,
    results: TypedStore<PendingResult>,
    tasks: Mutex<HashMap<QuizTransition, Arc<ScheduledTask>>>,
    work: tokio::sync::Mutex<()>,
}

impl ExerciseCache {
    pub fn new(
        exercise_id: ExerciseId,
        submissions: TypedStore<CachedSubmission>,
        participations: TypedStore<CachedParticipation>,
        results: TypedStore<PendingResult>,
    ) -> Self {
        Self {
            exercise_id,
            exercise: RwLock::new(None),
            phase: AtomicU8::new(QuizPhase::Unscheduled.as_u8()),
            submissions,
            participations,
            results,
            tasks: Mutex::new(HashMap::new()),
            work: tokio::sync::Mutex::new(()),
        }
    }

    pub fn exercise_id(&self) -> ExerciseId {
        self.exercise_id
    }

    pub fn phase(&self) -> QuizPhase {
        QuizPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn set_phase(&self, phase: QuizPhase) {
        let old = QuizPhase::from_u8(self.phase.swap(phase.as_u8(), Ordering::SeqCst));
        if old != phase {
            tracing::debug!("exercise {}: {} -> {}", self.exercise_id, old, phase);
        }
    }

    pub fn exercise(&self) -> Option<QuizExercise> {
        self.exercise.read().unwrap().clone()
    }

    /// Cache the exercise definition. Once the quiz is past Pending the
    /// definition is immutable and late writes are dropped.
    pub fn set_exercise(&self, exercise: QuizExercise) {
        if matches!(self.phase(), QuizPhase::Unscheduled | QuizPhase::Pending) {
            *self.exercise.write().unwrap() = Some(exercise);
        } else if self.exercise.read().unwrap().is_none() {
            // lazily created cache for an already running quiz
            *self.exercise.write().unwrap() = Some(exercise);
        } else {
            tracing::warn!(
                "exercise {}: ignoring definition update after quiz start",
                self.exercise_id
            );
        }
    }

    /// Overwrite the cached submission for a participant; last write wins.
    ///
    /// A submission observed as submitted is latched: any later write for
    /// that participant is rejected.
    pub fn update_submission(
        &self,
        participant: &str,
        mut submission: CachedSubmission,
    ) -> crate::Result<()> {
        if let Some(existing) = self.submissions.get(participant)? {
            if existing.submitted {
                return Err(crate::Error::AlreadySubmitted {
                    exercise_id: self.exercise_id,
                    participant: participant.to_string(),
                });
            }
        }
        submission.updated_at = Some(Utc::now());
        if submission.submitted && submission.submitted_at.is_none() {
            submission.submitted_at = submission.updated_at;
        }
        self.submissions.put(participant, &submission)
    }

    /// Total function: returns the cached submission or an empty one, never
    /// an absent value.
    pub fn get_submission(&self, participant: &str) -> CachedSubmission {
        match self.submissions.get(participant) {
            Ok(Some(submission)) => submission,
            Ok(None) => CachedSubmission::empty(),
            Err(e) => {
                tracing::warn!(
                    "exercise {}: undecodable submission for '{}': {}",
                    self.exercise_id,
                    participant,
                    e
                );
                CachedSubmission::empty()
            }
        }
    }

    pub fn add_participation(&self, participation: &CachedParticipation) -> crate::Result<()> {
        self.participations.put(&participation.participant, participation)
    }

    /// Unlike submissions there is no sensible empty participation, so this
    /// stays an Option.
    pub fn get_participation(&self, participant: &str) -> Option<CachedParticipation> {
        match self.participations.get(participant) {
            Ok(participation) => participation,
            Err(e) => {
                tracing::warn!(
                    "exercise {}: undecodable participation for '{}': {}",
                    self.exercise_id,
                    participant,
                    e
                );
                None
            }
        }
    }

    /// Serializes flush/finalize passes over this exercise. A pass holds the
    /// guard for its whole duration; anything that would overlap must wait or
    /// skip.
    pub(crate) fn work_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.work
    }

    pub(crate) fn submissions(&self) -> &TypedStore<CachedSubmission> {
        &self.submissions
    }

    pub(crate) fn participations(&self) -> &TypedStore<CachedParticipation> {
        &self.participations
    }

    pub(crate) fn results(&self) -> &TypedStore<PendingResult> {
        &self.results
    }

    /// Is a timer armed for this transition?
    pub fn has_task(&self, transition: QuizTransition) -> bool {
        self.tasks.lock().unwrap().contains_key(&transition)
    }

    /// Register a timer handle. Idempotent per transition: a duplicate is
    /// canceled and false is returned.
    pub fn register_task(&self, task: Arc<ScheduledTask>) -> bool {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.contains_key(&task.transition()) {
            task.cancel();
            return false;
        }
        tasks.insert(task.transition(), task);
        true
    }

    /// Cancel the start timer if armed; tolerates already-fired and
    /// already-canceled.
    pub fn cancel_start(&self) {
        if let Some(task) = self.tasks.lock().unwrap().remove(&QuizTransition::Start) {
            task.cancel();
        }
    }

    pub(crate) fn cancel_all_tasks(&self) {
        for (_, task) in self.tasks.lock().unwrap().drain() {
            task.cancel();
        }
    }

    /// Number of cached entries across all three stores
    pub fn cached_entries(&self) -> usize {
        self.submissions.len() + self.participations.len() + self.results.len()
    }

    /// Destroy all backing stores and drop the cached definition.
    ///
    /// End-of-quiz flushing should have emptied the stores already; finding
    /// data here signals a processing bug upstream, hence the warning.
    pub fn clear(&self) {
        self.cancel_all_tasks();
        let cached = self.cached_entries();
        if cached > 0 {
            tracing::warn!(
                "exercise {}: clearing {} unflushed cache entries",
                self.exercise_id,
                cached
            );
        }
        self.submissions.clear();
        self.participations.clear();
        self.results.clear();
        *self.exercise.write().unwrap() = None;
        self.set_phase(QuizPhase::Drained);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;

    fn cache(exercise_id: ExerciseId) -> ExerciseCache {
        ExerciseCache::new(
            exercise_id,
            TypedStore::json(Arc::new(LocalStore::new())),
            TypedStore::json(Arc::new(LocalStore::new())),
            TypedStore::json(Arc::new(LocalStore::new())),
        )
    }

    fn submission(answer: &str, submitted: bool) -> CachedSubmission {
        CachedSubmission {
            answers: serde_json::json!({ "q1": answer }),
            submitted,
            submitted_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_last_write_wins_until_submitted() {
        let cache = cache(1);

        cache.update_submission("alice", submission("a", false)).unwrap();
        cache.update_submission("alice", submission("b", false)).unwrap();
        assert_eq!(
            cache.get_submission("alice").answers,
            serde_json::json!({ "q1": "b" })
        );

        cache.update_submission("alice", submission("c", true)).unwrap();
        let latched = cache.get_submission("alice");
        assert!(latched.submitted);
        assert!(latched.submitted_at.is_some());

        // the latch holds against submitted and non-submitted writes alike
        let err = cache
            .update_submission("alice", submission("d", false))
            .unwrap_err();
        assert!(matches!(err, crate::Error::AlreadySubmitted { .. }));
        let err = cache
            .update_submission("alice", submission("d", true))
            .unwrap_err();
        assert!(matches!(err, crate::Error::AlreadySubmitted { .. }));
        assert_eq!(
            cache.get_submission("alice").answers,
            serde_json::json!({ "q1": "c" })
        );
    }

    #[test]
    fn test_get_submission_is_total() {
        let cache = cache(1);
        let s = cache.get_submission("nobody");
        assert!(s.is_empty());
        assert!(!s.submitted);
    }

    #[test]
    fn test_participation_is_optional() {
        let cache = cache(1);
        assert!(cache.get_participation("alice").is_none());

        let p = CachedParticipation {
            participant: "alice".to_string(),
            exercise_id: 1,
            started_at: Utc::now(),
        };
        cache.add_participation(&p).unwrap();
        assert_eq!(cache.get_participation("alice"), Some(p));
    }

    #[test]
    fn test_participants_stay_distinct() {
        let cache = cache(1);
        cache.update_submission("bob", submission("b", false)).unwrap();
        cache.update_submission("carol", submission("c", false)).unwrap();

        assert_eq!(
            cache.get_submission("bob").answers,
            serde_json::json!({ "q1": "b" })
        );
        assert_eq!(
            cache.get_submission("carol").answers,
            serde_json::json!({ "q1": "c" })
        );
        assert_eq!(cache.submissions().len(), 2);
    }

    #[test]
    fn test_clear_empties_everything() {
        let cache = cache(1);
        cache.update_submission("alice", submission("a", false)).unwrap();
        cache.set_phase(QuizPhase::Running);
        assert_eq!(cache.cached_entries(), 1);

        // warns about the unflushed entry, then empties regardless
        cache.clear();
        assert_eq!(cache.cached_entries(), 0);
        assert!(cache.exercise().is_none());
        assert_eq!(cache.phase(), QuizPhase::Drained);
    }

    #[test]
    fn test_register_task_idempotent_per_transition() {
        let cache = cache(1);
        assert!(cache.register_task(ScheduledTask::new(QuizTransition::Start)));

        let duplicate = ScheduledTask::new(QuizTransition::Start);
        assert!(!cache.register_task(duplicate.clone()));
        assert!(duplicate.is_canceled());

        assert!(cache.register_task(ScheduledTask::new(QuizTransition::End)));
        cache.cancel_start();
        assert!(!cache.has_task(QuizTransition::Start));
        assert!(cache.has_task(QuizTransition::End));
    }
}
