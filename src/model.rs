//! Domain types shared across quizcache
//!
//! Everything here is serde-serializable: cached values travel over the
//! distributed log, so each type doubles as a wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque exercise identifier
pub type ExerciseId = i64;

/// Student username or team short name, unique within one exercise
pub type ParticipantKey = String;

/// Cached quiz exercise definition, immutable once the quiz starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizExercise {
    pub id: ExerciseId,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Opaque question/config payload; grading lives in a collaborator
    #[serde(default)]
    pub questions: serde_json::Value,
}

impl QuizExercise {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    /// Derive the phase a freshly cached copy of this exercise should be in.
    pub fn phase_at(&self, now: DateTime<Utc>) -> QuizPhase {
        if !self.has_started(now) {
            QuizPhase::Pending
        } else if !self.has_ended(now) {
            QuizPhase::Running
        } else {
            QuizPhase::Drained
        }
    }
}

/// A participant's current answer state for a live quiz.
///
/// At most one exists per (exercise, participant); last write wins until
/// `submitted` flips to true, after which the entry is latched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSubmission {
    /// Opaque answer payload
    #[serde(default)]
    pub answers: serde_json::Value,

    /// One-way latch: once true, no later non-submitted write may replace
    /// this entry
    #[serde(default)]
    pub submitted: bool,

    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for CachedSubmission {
    fn default() -> Self {
        Self {
            answers: serde_json::Value::Null,
            submitted: false,
            submitted_at: None,
            updated_at: None,
        }
    }
}

impl CachedSubmission {
    /// The empty submission handed out when nothing is cached; callers never
    /// see an absent value.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_null() && !self.submitted
    }
}

/// Enrollment record linking a participant to an exercise attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedParticipation {
    pub participant: ParticipantKey,
    pub exercise_id: ExerciseId,
    pub started_at: DateTime<Utc>,
}

/// A computed outcome awaiting persistence; destroyed once durably written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingResult {
    pub participant: ParticipantKey,
    pub score: f64,
    pub completed_at: DateTime<Utc>,
}

/// Per-exercise state machine driven by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizPhase {
    Unscheduled,
    Pending,
    Running,
    Finalizing,
    Drained,
}

impl QuizPhase {
    /// Can students write submissions in this phase?
    pub fn accepts_submissions(&self) -> bool {
        matches!(self, QuizPhase::Pending | QuizPhase::Running)
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            QuizPhase::Unscheduled => 0,
            QuizPhase::Pending => 1,
            QuizPhase::Running => 2,
            QuizPhase::Finalizing => 3,
            QuizPhase::Drained => 4,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => QuizPhase::Pending,
            2 => QuizPhase::Running,
            3 => QuizPhase::Finalizing,
            4 => QuizPhase::Drained,
            _ => QuizPhase::Unscheduled,
        }
    }
}

impl std::fmt::Display for QuizPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuizPhase::Unscheduled => write!(f, "unscheduled"),
            QuizPhase::Pending => write!(f, "pending"),
            QuizPhase::Running => write!(f, "running"),
            QuizPhase::Finalizing => write!(f, "finalizing"),
            QuizPhase::Drained => write!(f, "drained"),
        }
    }
}
