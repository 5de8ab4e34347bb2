//! Delayed action scheduler.
//!
//! Runs a closure against the round controller after a delay. The timer
//! lives on a spawned tokio task; when it fires, the closure is sent back to
//! the match timeline as [`Command::Deferred`], so it executes under the same
//! single-threaded discipline as every other command.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::PhaseError;

use super::command::{Command, MatchHandle};
use super::controller::{RoundController, Step};

/// Schedules closures to run on the match timeline after a delay.
#[derive(Debug, Clone)]
pub struct DelayedActionScheduler {
    handle: MatchHandle,
    cancel: CancellationToken,
}

impl DelayedActionScheduler {
    /// Creates a scheduler that delivers through `handle`.
    ///
    /// Cancelling `cancel` (or calling [`shutdown`](Self::shutdown)) drops
    /// every pending action.
    #[must_use]
    pub const fn new(handle: MatchHandle, cancel: CancellationToken) -> Self {
        Self { handle, cancel }
    }

    /// Runs `action` after `delay`.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::SchedulerUnavailable` when called outside a
    /// tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, action: F) -> Result<ScheduledAction, PhaseError>
    where
        F: FnOnce(&mut RoundController) -> Step + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| PhaseError::SchedulerUnavailable)?;
        if self.cancel.is_cancelled() {
            return Err(PhaseError::SchedulerUnavailable);
        }

        let token = self.cancel.child_token();
        let task_token = token.clone();
        let handle = self.handle.clone();
        trace!(delay_ms = delay.as_millis(), "scheduling delayed action");

        runtime.spawn(async move {
            tokio::select! {
                () = task_token.cancelled() => {
                    debug!("delayed action cancelled");
                }
                () = tokio::time::sleep(delay) => {
                    if !handle.send(Command::Deferred(Box::new(action))) {
                        debug!("match timeline closed; dropping delayed action");
                    }
                }
            }
        });

        Ok(ScheduledAction { cancel: token })
    }

    /// Cancels every pending action. Later calls to `schedule` fail.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A pending delayed action.
#[derive(Debug)]
pub struct ScheduledAction {
    cancel: CancellationToken,
}

impl ScheduledAction {
    /// Prevents the action from being delivered, if it has not been yet.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the action was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
