//! Timer handles for quiz transitions
//!
//! One handle exists per armed (exercise, transition) pair. Cancel and fire
//! race through a single atomic state: whichever flips it first wins and the
//! loser becomes a no-op, so neither side ever observes an error.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuizTransition {
    Start,
    End,
}

impl std::fmt::Display for QuizTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuizTransition::Start => write!(f, "start"),
            QuizTransition::End => write!(f, "end"),
        }
    }
}

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CANCELED: u8 = 2;

/// Handle to one armed transition timer
pub struct ScheduledTask {
    transition: QuizTransition,
    state: AtomicU8,
    canceled: Notify,
}

impl ScheduledTask {
    pub fn new(transition: QuizTransition) -> Arc<Self> {
        Arc::new(Self {
            transition,
            state: AtomicU8::new(ARMED),
            canceled: Notify::new(),
        })
    }

    pub fn transition(&self) -> QuizTransition {
        self.transition
    }

    /// Claim the fire slot. Returns true when this call won against any
    /// concurrent cancellation; an in-flight execution that already claimed
    /// it runs to completion.
    pub(crate) fn try_fire(&self) -> bool {
        self.state
            .compare_exchange(ARMED, FIRED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Cancel the timer. Idempotent: already-fired and already-canceled are
    /// both non-error outcomes.
    pub fn cancel(&self) {
        if self
            .state
            .compare_exchange(ARMED, CANCELED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.canceled.notify_waiters();
        }
    }

    pub fn is_fired(&self) -> bool {
        self.state.load(Ordering::SeqCst) == FIRED
    }

    pub fn is_canceled(&self) -> bool {
        self.state.load(Ordering::SeqCst) == CANCELED
    }

    /// Resolves once the task is canceled; used to abandon the sleep early.
    ///
    /// The waiter is registered before the state check, so a cancellation
    /// landing between the two is never missed.
    pub(crate) async fn wait_canceled(&self) {
        let notified = self.canceled.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_canceled() {
            return;
        }
        notified.await;
    }
}
