//! The match timeline.
//!
//! [`MatchRunner`] is the single task that drives a [`RoundController`]. It
//! waits on three things at once: cancellation, the command inbox, and the
//! deadline of the pending [`Suspension::Delay`]. Exactly one controller
//! operation runs at a time. Commands that arrive during a delay are applied
//! without disturbing the delay.

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::PhaseError;
use crate::observability::metrics;

use super::command::CommandInbox;
use super::controller::{HostRequest, RoundController, Step, Suspension, Wake};
use super::state::{MatchId, MatchSnapshot, Outcome};

/// Why a match stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchExit {
    /// The match asked for a fresh match
    Restart,
    /// The match asked the host to stop
    Exit,
    /// The cancellation token fired
    Cancelled,
}

impl From<HostRequest> for MatchExit {
    fn from(request: HostRequest) -> Self {
        match request {
            HostRequest::Restart => Self::Restart,
            HostRequest::Exit => Self::Exit,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchReport {
    /// The match that ran
    pub match_id: MatchId,
    /// Why it stopped
    pub exit: MatchExit,
    /// Outcome at the time it stopped
    pub outcome: Outcome,
    /// Rounds started
    pub rounds: u32,
}

/// Drives one match on the current task.
#[derive(Debug)]
pub struct MatchRunner {
    controller: RoundController,
    inbox: CommandInbox,
    cancel: CancellationToken,
    pending: Option<(Instant, Wake)>,
}

impl MatchRunner {
    /// Creates a runner for `controller`, fed by `inbox`.
    #[must_use]
    pub const fn new(
        controller: RoundController,
        inbox: CommandInbox,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            controller,
            inbox,
            cancel,
            pending: None,
        }
    }

    /// Activates the match and runs it until it asks to restart or exit, or
    /// until cancellation.
    ///
    /// Every pending delayed action is cancelled before returning.
    ///
    /// # Errors
    ///
    /// Returns an activation error or the first fatal [`PhaseError`];
    /// rejected commands are logged and the match continues.
    pub async fn run(mut self) -> Result<MatchReport, PhaseError> {
        let step = self.controller.activate();
        self.finish("activate", step).await
    }

    /// Restores `snapshot` into the match instead of activating it, then
    /// runs like [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run); a controller that was already activated
    /// cannot be restored.
    pub async fn resume(mut self, snapshot: MatchSnapshot) -> Result<MatchReport, PhaseError> {
        let step = self.controller.restore(&snapshot);
        self.finish("restore", step).await
    }

    async fn finish(
        &mut self,
        origin: &'static str,
        step: Step,
    ) -> Result<MatchReport, PhaseError> {
        let result = self.drive(origin, step).await;
        self.controller.shutdown();
        match &result {
            Ok(report) => info!(
                match_id = %report.match_id,
                exit = ?report.exit,
                outcome = report.outcome.as_str(),
                rounds = report.rounds,
                "match stopped"
            ),
            Err(e) => error!(match_id = %self.controller.id(), error = %e, "match aborted"),
        }
        result
    }

    async fn drive(
        &mut self,
        origin: &'static str,
        step: Step,
    ) -> Result<MatchReport, PhaseError> {
        self.absorb(origin, Ok(step?))?;

        loop {
            if let Some(request) = self.controller.take_host_request() {
                return Ok(self.report(request.into()));
            }

            let deadline = self.pending.map(|(at, _)| at);
            let timer = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    debug!("match cancelled");
                    return Ok(self.report(MatchExit::Cancelled));
                }
                command = self.inbox.recv() => {
                    let Some(command) = command else {
                        debug!("command inbox closed");
                        return Ok(self.report(MatchExit::Exit));
                    };
                    let name = command.name();
                    let step = self.controller.apply(command);
                    self.absorb(name, step)?;
                }
                () = timer => {
                    if let Some((_, wake)) = self.pending.take() {
                        let step = self.controller.wake(wake);
                        self.absorb("wake", step)?;
                    }
                }
            }
        }
    }

    fn absorb(&mut self, origin: &'static str, step: Step) -> Result<(), PhaseError> {
        match step {
            Ok(Some(Suspension::Delay { duration, wake })) => {
                self.pending = Some((Instant::now() + duration, wake));
            }
            Ok(Some(Suspension::Narrative | Suspension::AwaitingPlayer)) => {
                self.pending = None;
            }
            Ok(Some(Suspension::Finished(outcome))) => {
                self.pending = None;
                debug!(outcome = outcome.as_str(), "waiting for after-game action");
            }
            Ok(None) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(command = origin, error = %e, "command rejected");
                metrics::record_command_rejected(origin);
            }
        }
        Ok(())
    }

    fn report(&self, exit: MatchExit) -> MatchReport {
        MatchReport {
            match_id: self.controller.id(),
            exit,
            outcome: self.controller.outcome(),
            rounds: self.controller.round_number(),
        }
    }
}
