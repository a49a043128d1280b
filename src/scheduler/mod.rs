//! Quiz scheduling worker
//!
//! One background worker per process drives the per-exercise state machine
//! (Unscheduled -> Pending -> Running -> Finalizing -> Drained), fires the
//! start/end transitions at their wall-clock instants, and sweeps all live
//! caches on a fixed interval to flush in-flight work into durable storage.
//! Per-exercise work runs in its own task: one slow persistence call never
//! delays another exercise's timers.

pub mod task;

pub use task::{QuizTransition, ScheduledTask};

use crate::cache::{CacheRegistry, ExerciseCache};
use crate::common::{retry_with_backoff, validate_participant_key, Config};
use crate::model::{
    CachedParticipation, CachedSubmission, ExerciseId, QuizExercise, QuizPhase,
};
use crate::persistence::{ExerciseRepository, Grader, QuizPersistence};
use crate::sync::{SyncEvent, SyncService};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct QuizScheduler {
    registry: Arc<CacheRegistry>,
    exercises: Arc<dyn ExerciseRepository>,
    persistence: Arc<dyn QuizPersistence>,
    grader: Arc<dyn Grader>,
    sync: Option<Arc<SyncService>>,
    config: Arc<Config>,
}

impl QuizScheduler {
    pub fn new(
        registry: Arc<CacheRegistry>,
        exercises: Arc<dyn ExerciseRepository>,
        persistence: Arc<dyn QuizPersistence>,
        grader: Arc<dyn Grader>,
        config: Config,
    ) -> Self {
        Self {
            registry,
            exercises,
            persistence,
            grader,
            sync: None,
            config: Arc::new(config),
        }
    }

    /// Attach the cross-instance synchronization service.
    pub fn with_sync(mut self, sync: Arc<SyncService>) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Recover pending timers from durable storage, start the sync listener,
    /// and spawn the periodic sweep loop.
    pub async fn start(&self) -> crate::Result<JoinHandle<()>> {
        self.recover().await?;
        if let Some(sync) = &self.sync {
            sync.listen(self.registry.clone());
        }

        let scheduler = self.clone();
        let period = self.config.sweep_interval();
        tracing::info!("scheduler started, sweeping every {:?}", period);
        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                scheduler.sweep();
            }
        }))
    }

    /// Re-derive Pending state after a restart: timers are not persisted, so
    /// every exercise still starting in the future gets its timer re-armed
    /// from the stored definition.
    pub async fn recover(&self) -> crate::Result<()> {
        let upcoming = self.exercises.find_exercises_starting_in_future().await?;
        if !upcoming.is_empty() {
            tracing::info!("re-arming {} upcoming quiz exercises", upcoming.len());
        }
        for exercise in upcoming {
            self.schedule_quiz_start(exercise);
        }
        Ok(())
    }

    // === Outward operations (consumed by the request layer) ===

    /// Overwrite a participant's cached submission. Rejected outside the
    /// Pending/Running window and after the participant has submitted.
    pub async fn update_submission(
        &self,
        exercise_id: ExerciseId,
        participant: &str,
        submission: CachedSubmission,
    ) -> crate::Result<()> {
        validate_participant_key(participant)?;
        let cache = self.live_cache(exercise_id).await?;
        if !cache.phase().accepts_submissions() {
            return Err(crate::Error::QuizNotActive(exercise_id));
        }
        cache.update_submission(participant, submission)
    }

    /// Total: the cached submission, the durably stored one after a drain, or
    /// an empty submission. Never absent.
    pub async fn get_submission(
        &self,
        exercise_id: ExerciseId,
        participant: &str,
    ) -> crate::Result<CachedSubmission> {
        if let Some(cache) = self.registry.get(exercise_id) {
            return Ok(cache.get_submission(participant));
        }
        if let Some(stored) = self
            .persistence
            .load_submission(exercise_id, participant)
            .await?
        {
            return Ok(stored);
        }
        match self.live_cache(exercise_id).await {
            Ok(cache) => Ok(cache.get_submission(participant)),
            Err(crate::Error::QuizNotActive(_)) | Err(crate::Error::ExerciseNotFound(_)) => {
                Ok(CachedSubmission::empty())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_participation(
        &self,
        exercise_id: ExerciseId,
        participant: &str,
    ) -> crate::Result<Option<CachedParticipation>> {
        Ok(self
            .registry
            .get(exercise_id)
            .and_then(|cache| cache.get_participation(participant)))
    }

    pub async fn add_participation(
        &self,
        exercise_id: ExerciseId,
        participation: CachedParticipation,
    ) -> crate::Result<()> {
        let cache = self.live_cache(exercise_id).await?;
        cache.add_participation(&participation)
    }

    /// Arm the start timer for a quiz. Idempotent: a second call while a
    /// timer is armed is a no-op.
    pub fn schedule_quiz_start(&self, exercise: QuizExercise) {
        let cache = self.registry.get_or_create(exercise.id);
        cache.set_exercise(exercise.clone());
        if cache.phase() == QuizPhase::Unscheduled {
            cache.set_phase(QuizPhase::Pending);
        }
        self.arm(cache, QuizTransition::Start, exercise.start_time);
    }

    /// Cancel the armed start timer, e.g. when an instructor reschedules or
    /// deletes the quiz before it begins. Already-fired and already-canceled
    /// timers are tolerated.
    pub fn cancel_scheduled_quiz_start(&self, exercise_id: ExerciseId) {
        if let Some(cache) = self.registry.get(exercise_id) {
            cache.cancel_start();
            if cache.phase() == QuizPhase::Pending {
                cache.set_phase(QuizPhase::Unscheduled);
            }
        }
    }

    /// Force the end transition now, same path the end timer takes.
    pub async fn end_quiz(&self, exercise_id: ExerciseId) -> crate::Result<()> {
        let cache = self
            .registry
            .get(exercise_id)
            .ok_or(crate::Error::ExerciseNotFound(exercise_id))?;
        self.end_cache(cache).await
    }

    /// Administrative override: drop all cached state for the exercise and
    /// tell the other instances to do the same.
    pub fn clear_quiz_data(&self, exercise_id: ExerciseId) {
        if let Some(cache) = self.registry.remove(exercise_id) {
            cache.clear();
        }
        if let Some(sync) = &self.sync {
            sync.inform_servers(SyncEvent::QuizReset { exercise_id });
        }
    }

    // === Cache lifecycle ===

    /// Fetch the live cache, lazily building it on first reference by
    /// loading the definition and deriving the phase from the clock.
    async fn live_cache(&self, exercise_id: ExerciseId) -> crate::Result<Arc<ExerciseCache>> {
        if let Some(cache) = self.registry.get(exercise_id) {
            return Ok(cache);
        }
        let exercise = self
            .exercises
            .load_exercise(exercise_id)
            .await?
            .ok_or(crate::Error::ExerciseNotFound(exercise_id))?;
        let phase = exercise.phase_at(Utc::now());
        if phase == QuizPhase::Drained {
            return Err(crate::Error::QuizNotActive(exercise_id));
        }

        let cache = self.registry.get_or_create(exercise_id);
        cache.set_exercise(exercise.clone());
        if cache.phase() == QuizPhase::Unscheduled {
            cache.set_phase(phase);
        }
        match phase {
            QuizPhase::Pending => self.arm(cache.clone(), QuizTransition::Start, exercise.start_time),
            QuizPhase::Running => self.arm(cache.clone(), QuizTransition::End, exercise.end_time),
            _ => {}
        }
        Ok(cache)
    }

    // === Timers ===

    fn arm(&self, cache: Arc<ExerciseCache>, transition: QuizTransition, at: DateTime<Utc>) {
        if cache.has_task(transition) {
            return;
        }
        let task = ScheduledTask::new(transition);
        if !cache.register_task(task.clone()) {
            return;
        }

        let scheduler = self.clone();
        let exercise_id = cache.exercise_id();
        tokio::spawn(async move {
            let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if !task.try_fire() {
                        return;
                    }
                    match transition {
                        QuizTransition::Start => scheduler.fire_start(exercise_id),
                        QuizTransition::End => scheduler.fire_end(exercise_id).await,
                    }
                }
                _ = task.wait_canceled() => {}
            }
        });
    }

    fn fire_start(&self, exercise_id: ExerciseId) {
        let Some(cache) = self.registry.get(exercise_id) else {
            return;
        };
        if cache.phase() != QuizPhase::Pending {
            return;
        }
        cache.set_phase(QuizPhase::Running);
        tracing::info!("exercise {}: quiz started", exercise_id);
        if let Some(exercise) = cache.exercise() {
            self.arm(cache, QuizTransition::End, exercise.end_time);
        }
    }

    async fn fire_end(&self, exercise_id: ExerciseId) {
        let Some(cache) = self.registry.get(exercise_id) else {
            return;
        };
        if let Err(e) = self.end_cache(cache).await {
            tracing::error!("exercise {}: end transition failed: {}", exercise_id, e);
        }
    }

    async fn end_cache(&self, cache: Arc<ExerciseCache>) -> crate::Result<()> {
        if cache.phase() == QuizPhase::Drained {
            return Ok(());
        }
        // waits out any in-flight sweep pass; no flush may interleave with
        // finalization
        let _work = cache.work_lock().lock().await;
        if cache.phase() == QuizPhase::Drained {
            return Ok(());
        }
        cache.cancel_all_tasks();
        cache.set_phase(QuizPhase::Finalizing);
        tracing::info!("exercise {}: quiz ended, finalizing", cache.exercise_id());
        self.finalize(cache.clone()).await
    }

    // === Periodic sweep ===

    /// One pass over every live cache. Each exercise gets its own task so a
    /// blocking persistence call cannot stall the others. Per exercise, at
    /// most one pass runs at a time: a tick that finds the previous pass (or
    /// an end transition) still in flight skips the exercise rather than
    /// interleaving with it.
    pub fn sweep(&self) {
        for cache in self.registry.snapshot() {
            let scheduler = self.clone();
            tokio::spawn(async move {
                let Ok(_work) = cache.work_lock().try_lock() else {
                    tracing::debug!(
                        "exercise {}: previous pass still running, skipping",
                        cache.exercise_id()
                    );
                    return;
                };
                match cache.phase() {
                    QuizPhase::Running => {
                        if let Err(e) = scheduler.flush_running(&cache).await {
                            tracing::warn!(
                                "exercise {}: sweep flush failed: {}",
                                cache.exercise_id(),
                                e
                            );
                        }
                    }
                    QuizPhase::Finalizing => {
                        if let Err(e) = scheduler.finalize(cache.clone()).await {
                            tracing::warn!(
                                "exercise {}: finalize retry failed: {}",
                                cache.exercise_id(),
                                e
                            );
                        }
                    }
                    _ => {}
                }
            });
        }
    }

    /// Persist the in-flight work of a running quiz so monitoring views stay
    /// current. The submitted latch is never touched here; that only happens
    /// on the end transition.
    async fn flush_running(&self, cache: &ExerciseCache) -> crate::Result<()> {
        let exercise_id = cache.exercise_id();
        let mut failed = 0usize;
        for participant in cache.submissions().keys() {
            // the end transition owns the cache from Finalizing onward
            if cache.phase() != QuizPhase::Running {
                break;
            }
            let submission = cache.get_submission(&participant);
            if submission.is_empty() {
                continue;
            }
            if let Some(participation) = cache.get_participation(&participant) {
                if let Err(e) = self.persistence.save_participation(&participation).await {
                    failed += 1;
                    tracing::warn!(
                        "exercise {}: flush of '{}' participation failed: {}",
                        exercise_id,
                        participant,
                        e
                    );
                    continue;
                }
            }
            if let Err(e) = self
                .persistence
                .save_submission(exercise_id, &participant, &submission)
                .await
            {
                failed += 1;
                tracing::warn!(
                    "exercise {}: flush of '{}' submission failed: {}",
                    exercise_id,
                    participant,
                    e
                );
            }
        }
        if failed > 0 {
            return Err(crate::Error::Persistence(format!(
                "{} participants not flushed",
                failed
            )));
        }
        Ok(())
    }

    // === Finalization ===

    /// Flush every participant with a cached submission: latch the
    /// submission, compute a result, persist all three records. Failures are
    /// per participant; whoever cannot be persisted stays cached for the next
    /// sweep rather than being dropped.
    async fn finalize(&self, cache: Arc<ExerciseCache>) -> crate::Result<()> {
        let exercise = match cache.exercise() {
            Some(exercise) => exercise,
            None => self
                .exercises
                .load_exercise(cache.exercise_id())
                .await?
                .ok_or(crate::Error::ExerciseNotFound(cache.exercise_id()))?,
        };

        let participants = cache.submissions().keys();
        let total = participants.len();
        let mut failed = 0usize;
        for participant in &participants {
            if let Err(e) = self
                .finalize_participant(&cache, &exercise, participant)
                .await
            {
                failed += 1;
                tracing::error!(
                    "exercise {}: participant '{}' not persisted, kept cached for the next sweep: {}",
                    exercise.id,
                    participant,
                    e
                );
            }
        }

        if failed == 0 {
            cache.set_phase(QuizPhase::Drained);
            self.registry.remove(cache.exercise_id());
            cache.clear();
            tracing::info!(
                "exercise {}: finalized {} participants, cache drained",
                exercise.id,
                total
            );
        } else {
            tracing::warn!(
                "exercise {}: {} of {} participants left cached",
                exercise.id,
                failed,
                total
            );
        }
        Ok(())
    }

    async fn finalize_participant(
        &self,
        cache: &ExerciseCache,
        exercise: &QuizExercise,
        participant: &str,
    ) -> crate::Result<()> {
        let mut submission = cache.get_submission(participant);
        if !submission.submitted {
            submission.submitted = true;
            submission.submitted_at = Some(Utc::now());
            // raw write: the latch guards callers, not the finalizer
            cache.submissions().put(participant, &submission)?;
        }

        let result = match cache.results().get(participant)? {
            // left over from an earlier attempt that failed mid-persist
            Some(result) => result,
            None => {
                let mut result = self.grader.compute_result(&submission, exercise);
                result.participant = participant.to_string();
                cache.results().put(participant, &result)?;
                result
            }
        };

        let participation = cache.get_participation(participant).unwrap_or_else(|| {
            CachedParticipation {
                participant: participant.to_string(),
                exercise_id: exercise.id,
                started_at: Utc::now(),
            }
        });

        let retries = self.config.finalize_max_retries;
        let delay = self.config.finalize_retry_delay();
        retry_with_backoff(
            || self.persistence.save_participation(&participation),
            retries,
            delay,
        )
        .await?;
        retry_with_backoff(
            || {
                self.persistence
                    .save_submission(exercise.id, participant, &submission)
            },
            retries,
            delay,
        )
        .await?;
        retry_with_backoff(
            || self.persistence.save_result(exercise.id, &result),
            retries,
            delay,
        )
        .await?;

        // durably written; drop the participant from the cache
        cache.submissions().delete(participant);
        cache.participations().delete(participant);
        cache.results().delete(participant);
        Ok(())
    }
}
