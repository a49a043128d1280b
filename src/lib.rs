//! # quizcache
//!
//! In-memory scheduling and submission cache for live quiz exercises:
//! - per-exercise caches for participations, submissions and pending results
//! - a scheduler firing quiz start/end at precise wall-clock instants
//! - a periodic sweep flushing cached work into durable storage
//! - pluggable key/value stores: local maps or a distributed store kept
//!   consistent across instances through a replicated log
//! - cross-instance fan-out of administrative events (quiz resets)
//!
//! ## Architecture
//!
//! ```text
//!  student request        ┌──────────────────┐
//!  update_submission ───▶ │  QuizScheduler   │──── timers (start/end)
//!                         │  (facade+worker) │──── periodic sweep
//!                         └────────┬─────────┘
//!                                  │ borrows
//!                         ┌────────▼─────────┐
//!                         │  CacheRegistry   │ one ExerciseCache per
//!                         │  (owns caches)   │ live exercise
//!                         └────────┬─────────┘
//!                                  │
//!                  ┌───────────────┼────────────────┐
//!            ┌─────▼─────┐  ┌──────▼──────┐  ┌──────▼──────┐
//!            │submissions│  │participations│ │   results   │
//!            └─────┬─────┘  └──────┬──────┘  └──────┬──────┘
//!                  └── KeyValueStore: local map or ─┘
//!                      distributed view over a replicated log
//! ```
//!
//! Durable storage and grading stay behind the traits in [`persistence`];
//! the cache never opens a database connection itself.

pub mod cache;
pub mod common;
pub mod model;
pub mod persistence;
pub mod scheduler;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use cache::{CacheRegistry, ExerciseCache};
pub use common::{Config, Error, Result};
pub use model::{
    CachedParticipation, CachedSubmission, ExerciseId, ParticipantKey, PendingResult,
    QuizExercise, QuizPhase,
};
pub use persistence::{ExerciseRepository, Grader, QuizPersistence};
pub use scheduler::QuizScheduler;
pub use store::{KeyValueStore, StoreFactory};
pub use sync::{SyncEvent, SyncService};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
