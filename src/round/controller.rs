//! Round controller.
//!
//! [`RoundController`] owns the phase state machine of one match. It is
//! synchronous: every operation runs to the next point where the match has
//! to wait and returns that point as a [`Suspension`]. The
//! [`MatchRunner`](super::runner::MatchRunner) turns suspensions into timers
//! and feeds commands back in one at a time.
//!
//! ```text
//! GameStarting ─▶ RoundStarting ─▶ TurnStarting ─▶ TurnActive ─▶ TurnEnding
//!                      ▲                 ▲                           │
//!                      │                 └───────── units left ──────┤
//!                 RoundEnding ◀──────────── every unit ended ────────┘
//! ```
//!
//! Any live phase may move to `GameEnded` once the victory evaluator
//! reports a result.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::error::{ConfigError, PhaseError};
use crate::observability::events::{
    EventKind, ListenerId, MatchEvent, MatchListener, ObserverList,
};
use crate::observability::metrics;
use crate::roster::{
    HookContext, Player, PlayerNumber, TurnView, UnitHook, UnitId, UnitRegistry, UnitSpec,
};

use super::command::Command;
use super::input::{
    BlockedInput, ClickEvent, DefaultInputHandlers, InputAction, InputContext,
    InputHandlerFactory, PhaseInputHandler,
};
use super::narrative::{Interlude, Narrative, NarrativeCue, NoNarrative};
use super::rotation::TurnRotation;
use super::scheduler::{DelayedActionScheduler, ScheduledAction};
use super::state::{MatchId, MatchSnapshot, MatchState, Outcome, Phase};
use super::victory::{LastPlayerStanding, VictoryEvaluator};

// ============================================================================
// Suspensions
// ============================================================================

/// Result of every controller operation.
///
/// `Ok(None)` means the match keeps waiting on whatever it was waiting on.
pub type Step = Result<Option<Suspension>, PhaseError>;

/// What the match waits on next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspension {
    /// Call [`RoundController::wake`] with `wake` once `duration` has elapsed
    Delay {
        /// How long to wait
        duration: Duration,
        /// Which continuation to resume
        wake: Wake,
    },
    /// A narrative interlude is playing
    Narrative,
    /// The player in control has been asked to act
    AwaitingPlayer,
    /// The outcome is decided
    Finished(Outcome),
}

/// Continuation resumed when a [`Suspension::Delay`] elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Enter the first round
    BeginRound,
    /// Reset units and start the round's first turn
    RoundSetup,
    /// Play the narrative, then hand over control
    TurnSetup,
}

// ============================================================================
// Settings
// ============================================================================

/// Pauses between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Pause after activation
    pub game_start: Duration,
    /// Pause after a round starts
    pub round_start: Duration,
    /// Pause after a turn starts
    pub turn_start: Duration,
    /// Pause between the outcome and the after-game action
    pub game_over_linger: Duration,
}

impl Timing {
    /// No pauses at all.
    #[must_use]
    pub const fn instant() -> Self {
        Self {
            game_start: Duration::ZERO,
            round_start: Duration::ZERO,
            turn_start: Duration::ZERO,
            game_over_linger: Duration::ZERO,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            game_start: Duration::from_secs(2),
            round_start: Duration::from_secs(2),
            turn_start: Duration::from_secs(2),
            game_over_linger: Duration::from_secs(5),
        }
    }
}

/// What happens once a match is over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AfterGame {
    /// Load a fresh match
    Restart,
    /// Terminate the host
    #[default]
    Exit,
}

/// Request for the host, collected with [`RoundController::take_host_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostRequest {
    /// Build and run a fresh match
    Restart,
    /// Stop
    Exit,
}

// ============================================================================
// Controller
// ============================================================================

/// Phase state machine of one match.
pub struct RoundController {
    id: MatchId,
    state: MatchState,
    units: UnitRegistry,
    players: BTreeMap<PlayerNumber, Box<dyn Player>>,
    rotation: TurnRotation,
    victory: Box<dyn VictoryEvaluator>,
    narrative: Box<dyn Narrative>,
    inputs: Box<dyn InputHandlerFactory>,
    input: Box<dyn PhaseInputHandler>,
    observers: ObserverList,
    scheduler: DelayedActionScheduler,
    timing: Timing,
    after_game: AfterGame,
    activated: bool,
    expected_wake: Option<Wake>,
    awaiting_narrative: bool,
    narrative_timer: Option<ScheduledAction>,
    after_game_action: Option<ScheduledAction>,
    selected: Option<UnitId>,
    host_request: Option<HostRequest>,
    started_at: Option<Instant>,
}

impl std::fmt::Debug for RoundController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundController")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("units", &self.units.len())
            .field("players", &self.players.len())
            .field("expected_wake", &self.expected_wake)
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

impl RoundController {
    /// Starts building a controller that schedules through `scheduler`.
    #[must_use]
    pub fn builder(scheduler: DelayedActionScheduler) -> RoundControllerBuilder {
        RoundControllerBuilder::new(scheduler)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Identity of this match.
    #[must_use]
    pub const fn id(&self) -> MatchId {
        self.id
    }

    /// Current match state.
    #[must_use]
    pub const fn state(&self) -> &MatchState {
        &self.state
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Rounds started so far.
    #[must_use]
    pub const fn round_number(&self) -> u32 {
        self.state.round_number()
    }

    /// Player in control.
    #[must_use]
    pub const fn current_player(&self) -> PlayerNumber {
        self.state.current_player()
    }

    /// Recorded outcome.
    #[must_use]
    pub const fn outcome(&self) -> Outcome {
        self.state.outcome()
    }

    /// Live roster.
    #[must_use]
    pub const fn units(&self) -> &UnitRegistry {
        &self.units
    }

    /// Unit chosen by the input handler, if any.
    #[must_use]
    pub const fn selected_unit(&self) -> Option<UnitId> {
        self.selected
    }

    /// Number of player records.
    #[must_use]
    pub fn number_of_players(&self) -> u32 {
        self.rotation.number_of_players()
    }

    /// Whether a narrative interlude is holding the hand-over.
    #[must_use]
    pub const fn is_awaiting_narrative(&self) -> bool {
        self.awaiting_narrative
    }

    /// Configured pauses.
    #[must_use]
    pub const fn timing(&self) -> Timing {
        self.timing
    }

    /// Takes the pending restart/exit request, if any.
    pub fn take_host_request(&mut self) -> Option<HostRequest> {
        self.host_request.take()
    }

    /// Adds a lifecycle listener after every listener registered so far.
    pub fn register_listener(&mut self, listener: impl MatchListener + 'static) -> ListenerId {
        self.observers.register(listener)
    }

    /// Removes a lifecycle listener.
    pub fn unregister_listener(&mut self, id: ListenerId) -> bool {
        self.observers.unregister(id)
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Activates the match. Valid once.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::InvalidTransition` on a second call.
    pub fn activate(&mut self) -> Step {
        if self.activated {
            return Err(PhaseError::InvalidTransition(
                "match already activated".to_string(),
            ));
        }
        self.activated = true;
        self.started_at = Some(Instant::now());

        let current = self.state.current_player();
        if !self.units.owns_any(current) {
            match self.rotation.first(&self.units.owners()) {
                Ok(first) => self.state.set_current_player(first),
                Err(e) => debug!(error = %e, "no player owns a unit at activation"),
            }
        }

        info!(
            match_id = %self.id,
            players = self.players.len(),
            units = self.units.len(),
            first_player = %self.state.current_player(),
            "match starting"
        );
        self.emit(EventKind::GameStarted);
        self.units.set_all_interactable(false);
        self.bind_input();
        Ok(Some(self.delay(self.timing.game_start, Wake::BeginRound)))
    }

    /// Resumes after a [`Suspension::Delay`].
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::InvalidTransition` if `wake` is not the pending
    /// continuation, or any error of the resumed phase.
    pub fn wake(&mut self, wake: Wake) -> Step {
        if self.state.outcome().is_decided() {
            return Ok(None);
        }
        if self.expected_wake != Some(wake) {
            return Err(PhaseError::InvalidTransition(format!(
                "unexpected wake {wake:?} in phase {}",
                self.state.phase()
            )));
        }
        self.expected_wake = None;
        match wake {
            Wake::BeginRound => self.start_round(),
            Wake::RoundSetup => self.setup_round(),
            Wake::TurnSetup => self.setup_turn(),
        }
    }

    /// Runs the end-turn routine for the player in control.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::InvalidTransition` outside `TurnActive`.
    pub fn end_turn(&mut self) -> Step {
        if self.state.outcome().is_decided() {
            return Ok(None);
        }
        self.require_phase(Phase::TurnActive, "end_turn")?;
        self.run_end_turn()
    }

    /// Ends every unit of the player in control, then runs end-turn.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::InvalidTransition` outside `TurnActive`.
    pub fn force_end_turn(&mut self) -> Step {
        if self.state.outcome().is_decided() {
            return Ok(None);
        }
        self.require_phase(Phase::TurnActive, "force_end_turn")?;
        let current = self.state.current_player();
        let ended = self.units.end_all_for(current);
        info!(player = %current, units = ended, "turn force-ended");
        self.run_end_turn()
    }

    /// Marks `unit` as having acted, then runs end-turn.
    ///
    /// # Errors
    ///
    /// Rejects the command outside `TurnActive`, for unknown units, for
    /// units of another player, and for units that already acted.
    pub fn finish_unit(&mut self, unit: UnitId) -> Step {
        if self.state.outcome().is_decided() {
            return Ok(None);
        }
        self.require_phase(Phase::TurnActive, "finish_unit")?;
        let current = self.state.current_player();
        let record = self.units.get(unit).ok_or(PhaseError::UnknownUnit(unit))?;
        if record.owner() != current {
            return Err(PhaseError::NotCurrentPlayer {
                unit,
                owner: record.owner(),
                current,
            });
        }
        if record.is_ended() {
            return Err(PhaseError::UnitAlreadyEnded(unit));
        }
        self.units.set_ended(unit, true);
        if self.selected == Some(unit) {
            self.selected = None;
        }
        debug!(%unit, player = %current, "unit finished");
        self.run_end_turn()
    }

    /// Removes a destroyed unit and re-evaluates the match.
    ///
    /// # Errors
    ///
    /// Fatal rotation errors only.
    pub fn destroy_unit(&mut self, unit: UnitId) -> Step {
        let Some(removed) = self.units.remove(unit) else {
            warn!(%unit, "destroy notification for a unit not in the roster");
            return Ok(None);
        };
        info!(%unit, name = removed.name(), owner = %removed.owner(), "unit destroyed");
        if self.selected == Some(unit) {
            self.selected = None;
        }
        if self.state.outcome().is_decided() {
            return Ok(None);
        }
        if let Some(outcome) = self.victory.evaluate(&self.units).outcome() {
            return self.end_game(outcome);
        }

        let current = self.state.current_player();
        if self.state.phase() == Phase::TurnActive {
            if !self.units.has_pending(current) {
                return self.continue_turn();
            }
            if removed.owner() == current && !removed.is_ended() {
                return Ok(Some(self.prompt_player(current)));
            }
        } else if !self.units.owns_any(current) {
            let next = self.rotation.next(current, &self.units.owners())?;
            debug!(from = %current, to = %next, "eliminated player skipped");
            self.state.set_current_player(next);
        }
        Ok(None)
    }

    /// Adds a unit to the running match.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::Roster` if the owner has no player record and
    /// `PhaseError::InvalidTransition` once the match is over.
    pub fn add_unit(&mut self, spec: UnitSpec) -> Result<UnitId, PhaseError> {
        if self.state.phase().is_terminal() {
            return Err(PhaseError::InvalidTransition(
                "cannot add units after the match ended".to_string(),
            ));
        }
        if !self.players.contains_key(&spec.owner) {
            return Err(ConfigError::UnknownOwner {
                unit: spec.name,
                owner: spec.owner,
            }
            .into());
        }
        let owner = spec.owner;
        let id = self.units.insert(spec);
        self.units
            .set_interactable(id, self.state.phase() == Phase::TurnActive);
        info!(unit = %id, %owner, "unit joined");
        Ok(id)
    }

    /// Routes a click to the bound input handler.
    ///
    /// Clicks over a UI overlay or on a non-interactable unit are dropped.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::UnknownUnit` for a unit not in the roster, or
    /// any error of the resulting `finish_unit`.
    pub fn unit_clicked(&mut self, click: ClickEvent) -> Step {
        if click.over_ui {
            trace!(unit = %click.unit, "click over UI dropped");
            return Ok(None);
        }
        let ctx = self.input_context();
        let unit = self
            .units
            .get(click.unit)
            .ok_or(PhaseError::UnknownUnit(click.unit))?;
        if !unit.is_interactable() {
            trace!(unit = %click.unit, "click on non-interactable unit dropped");
            return Ok(None);
        }
        let action = self.input.on_unit_clicked(&unit.info(), &ctx);
        match action {
            InputAction::Ignore => Ok(None),
            InputAction::Select(id) => {
                self.selected = Some(id);
                debug!(unit = %id, "unit selected");
                Ok(None)
            }
            InputAction::Deselect => {
                self.selected = None;
                Ok(None)
            }
            InputAction::FinishUnit(id) => self.finish_unit(id),
        }
    }

    /// Ends the narrative interlude and hands over control.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::InvalidTransition` when no interlude is playing.
    pub fn narrative_finished(&mut self) -> Step {
        if self.state.outcome().is_decided() {
            return Ok(None);
        }
        if !self.awaiting_narrative {
            return Err(PhaseError::InvalidTransition(
                "no narrative interlude is playing".to_string(),
            ));
        }
        self.awaiting_narrative = false;
        if let Some(timer) = self.narrative_timer.take() {
            timer.cancel();
        }
        self.hand_over()
    }

    /// Asks the host for a fresh match.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Step` to share the command signature.
    pub fn restart(&mut self) -> Step {
        info!(match_id = %self.id, "restart requested");
        self.host_request = Some(HostRequest::Restart);
        Ok(None)
    }

    /// Asks the host to stop.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Step` to share the command signature.
    pub fn exit(&mut self) -> Step {
        info!(match_id = %self.id, "exit requested");
        self.host_request = Some(HostRequest::Exit);
        Ok(None)
    }

    /// Applies a queued command.
    ///
    /// # Errors
    ///
    /// Whatever the underlying operation returns.
    pub fn apply(&mut self, command: Command) -> Step {
        match command {
            Command::EndTurn => self.end_turn(),
            Command::ForceEndTurn => self.force_end_turn(),
            Command::FinishUnit(unit) => self.finish_unit(unit),
            Command::DestroyUnit(unit) => self.destroy_unit(unit),
            Command::AddUnit(spec) => self.add_unit(spec).map(|_| None),
            Command::UnitClicked(click) => self.unit_clicked(click),
            Command::NarrativeFinished => self.narrative_finished(),
            Command::Restart => self.restart(),
            Command::Exit => self.exit(),
            Command::Deferred(action) => action(self),
        }
    }

    /// Captures the match state and every unit's `ended` flag.
    #[must_use]
    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            state: self.state.clone(),
            ended: self.units.ended_flags(),
        }
    }

    /// Replaces the match state with `snapshot` and resumes it.
    ///
    /// Meant for a freshly built controller with the same roster, used in
    /// place of [`activate`](Self::activate). The returned step is what the
    /// restored phase waits on: a phase pause starts over in full, a turn
    /// whose narrative was playing replays it, and the player in control of
    /// an active turn is prompted again.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::InvalidTransition` on a controller that is
    /// already running, or any error of the resumed phase.
    pub fn restore(&mut self, snapshot: &MatchSnapshot) -> Step {
        if self.activated {
            return Err(PhaseError::InvalidTransition(
                "cannot restore into a running match".to_string(),
            ));
        }
        self.activated = true;
        self.started_at = Some(Instant::now());
        self.state = snapshot.state.clone();
        self.units.restore_ended(&snapshot.ended);
        self.expected_wake = None;
        self.awaiting_narrative = false;
        self.selected = None;
        self.units
            .set_all_interactable(self.state.phase() == Phase::TurnActive);
        self.bind_input();

        let phase = self.state.phase();
        debug!(
            %phase,
            round = self.state.round_number(),
            player = %self.state.current_player(),
            "match state restored"
        );
        match phase {
            Phase::GameStarting => Ok(Some(self.delay(self.timing.game_start, Wake::BeginRound))),
            Phase::RoundStarting => Ok(Some(self.delay(self.timing.round_start, Wake::RoundSetup))),
            Phase::TurnStarting => Ok(Some(self.delay(self.timing.turn_start, Wake::TurnSetup))),
            Phase::TurnActive => {
                let current = self.state.current_player();
                if self.units.has_pending(current) {
                    Ok(Some(self.prompt_player(current)))
                } else {
                    self.continue_turn()
                }
            }
            Phase::TurnEnding if self.units.any_pending() => self.start_turn(),
            Phase::TurnEnding => self.end_round(),
            Phase::RoundEnding => self.start_round(),
            Phase::GameEnded => {
                self.units.set_all_interactable(false);
                self.schedule_after_game();
                Ok(Some(Suspension::Finished(self.state.outcome())))
            }
        }
    }

    /// Cancels every pending delayed action of this match.
    pub fn shutdown(&mut self) {
        if let Some(action) = self.after_game_action.take() {
            action.cancel();
        }
        self.scheduler.shutdown();
    }

    // ------------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------------

    fn start_round(&mut self) -> Step {
        self.transition(Phase::RoundStarting)?;
        let round = self.state.begin_round()?;
        info!(round, "round started");
        metrics::record_round_started(round);
        self.emit(EventKind::RoundStarted);
        self.units.set_all_interactable(false);
        Ok(Some(self.delay(self.timing.round_start, Wake::RoundSetup)))
    }

    fn setup_round(&mut self) -> Step {
        self.units.reset_ended();
        self.notify_units(UnitHook::RoundStart);
        self.start_turn()
    }

    fn start_turn(&mut self) -> Step {
        self.transition(Phase::TurnStarting)?;
        self.notify_units(UnitHook::TurnStart);
        metrics::record_turn_started();
        debug!(
            round = self.state.round_number(),
            player = %self.state.current_player(),
            "turn started"
        );
        self.emit(EventKind::TurnStarted);
        Ok(Some(self.delay(self.timing.turn_start, Wake::TurnSetup)))
    }

    fn setup_turn(&mut self) -> Step {
        self.units.set_all_interactable(false);
        let cue = NarrativeCue {
            round: self.state.round_number(),
            player: self.state.current_player(),
        };
        match self.narrative.begin(&cue) {
            Interlude::Skip => self.hand_over(),
            Interlude::Timed(duration) => {
                match self
                    .scheduler
                    .schedule(duration, RoundController::narrative_finished)
                {
                    Ok(timer) => {
                        self.awaiting_narrative = true;
                        self.narrative_timer = Some(timer);
                        Ok(Some(Suspension::Narrative))
                    }
                    Err(e) => {
                        warn!(error = %e, "cannot time narrative interlude; handing over now");
                        self.hand_over()
                    }
                }
            }
            Interlude::UntilSignalled => {
                self.awaiting_narrative = true;
                Ok(Some(Suspension::Narrative))
            }
        }
    }

    fn hand_over(&mut self) -> Step {
        self.units.set_all_interactable(true);
        self.transition(Phase::TurnActive)?;
        self.run_end_turn()
    }

    fn run_end_turn(&mut self) -> Step {
        if let Some(outcome) = self.victory.evaluate(&self.units).outcome() {
            return self.end_game(outcome);
        }
        self.continue_turn()
    }

    /// End-turn routine once the match is known to go on.
    fn continue_turn(&mut self) -> Step {
        self.emit(EventKind::UnitEnded);

        let current = self.state.current_player();
        if self.units.has_pending(current) {
            return Ok(Some(self.prompt_player(current)));
        }

        self.transition(Phase::TurnEnding)?;
        let next = self.rotation.next(current, &self.units.owners())?;
        self.state.set_current_player(next);
        self.selected = None;
        self.notify_units(UnitHook::TurnEnd);
        debug!(from = %current, to = %next, "turn ended");
        self.emit(EventKind::TurnEnded);

        if self.units.any_pending() {
            self.start_turn()
        } else {
            self.end_round()
        }
    }

    fn end_round(&mut self) -> Step {
        self.transition(Phase::RoundEnding)?;
        self.notify_units(UnitHook::RoundEnd);
        info!(round = self.state.round_number(), "round ended");
        self.emit(EventKind::RoundEnded);
        self.start_round()
    }

    fn end_game(&mut self, outcome: Outcome) -> Step {
        let from = self.state.phase();
        if !self.state.conclude(outcome) {
            return Ok(None);
        }
        metrics::record_phase_transition(from.as_str(), Phase::GameEnded.as_str());
        self.expected_wake = None;
        self.awaiting_narrative = false;
        self.selected = None;
        if let Some(timer) = self.narrative_timer.take() {
            timer.cancel();
        }
        self.units.set_all_interactable(false);
        self.bind_input();
        self.emit(EventKind::GameEnded);

        let elapsed = self.started_at.map_or(Duration::ZERO, |t| t.elapsed());
        info!(
            match_id = %self.id,
            outcome = outcome.as_str(),
            rounds = self.state.round_number(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "{}",
            outcome.as_str()
        );
        metrics::record_match_finished(outcome.as_str(), elapsed);
        self.schedule_after_game();
        Ok(Some(Suspension::Finished(outcome)))
    }

    fn schedule_after_game(&mut self) {
        let after_game = self.after_game;
        let scheduled = self
            .scheduler
            .schedule(self.timing.game_over_linger, move |controller| match after_game {
                AfterGame::Restart => controller.restart(),
                AfterGame::Exit => controller.exit(),
            });
        match scheduled {
            Ok(action) => self.after_game_action = Some(action),
            Err(e) => warn!(error = %e, ?after_game, "after-game action not scheduled"),
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn prompt_player(&mut self, player: PlayerNumber) -> Suspension {
        let pending = self.units.pending_for(player);
        let view = TurnView {
            player,
            round: self.state.round_number(),
            pending: &pending,
        };
        match self.players.get_mut(&player) {
            Some(record) => record.play(&view),
            None => warn!(%player, "no player record; waiting for external input"),
        }
        Suspension::AwaitingPlayer
    }

    fn delay(&mut self, duration: Duration, wake: Wake) -> Suspension {
        self.expected_wake = Some(wake);
        Suspension::Delay { duration, wake }
    }

    fn transition(&mut self, next: Phase) -> Result<(), PhaseError> {
        let from = self.state.phase();
        self.state.advance_to(next)?;
        metrics::record_phase_transition(from.as_str(), next.as_str());
        trace!(%from, to = %next, "phase transition");
        self.bind_input();
        Ok(())
    }

    fn require_phase(&self, phase: Phase, command: &str) -> Result<(), PhaseError> {
        if self.state.phase() == phase {
            Ok(())
        } else {
            Err(PhaseError::InvalidTransition(format!(
                "{command} is only accepted in {phase}, match is in {}",
                self.state.phase()
            )))
        }
    }

    fn bind_input(&mut self) {
        let phase = self.state.phase();
        let mut next = self.inputs.handler_for(phase);
        self.input.on_exit();
        next.on_enter(phase);
        trace!(%phase, handler = next.name(), "input handler bound");
        self.input = next;
    }

    fn input_context(&self) -> InputContext {
        InputContext {
            phase: self.state.phase(),
            current_player: self.state.current_player(),
            round: self.state.round_number(),
            selected: self.selected,
        }
    }

    fn emit(&mut self, kind: EventKind) {
        let event = MatchEvent {
            kind,
            source: self.id,
            round: self.state.round_number(),
            player: self.state.current_player(),
        };
        let failures = self.observers.notify(&event);
        metrics::record_collaborator_failures("listener", failures);
    }

    fn notify_units(&mut self, hook: UnitHook) {
        let ctx = HookContext {
            round: self.state.round_number(),
            current_player: self.state.current_player(),
        };
        let failures = self.units.notify(hook, &ctx);
        metrics::record_collaborator_failures("unit_hook", failures);
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`RoundController`].
pub struct RoundControllerBuilder {
    scheduler: DelayedActionScheduler,
    timing: Timing,
    players: Vec<Box<dyn Player>>,
    units: Vec<UnitSpec>,
    victory: Box<dyn VictoryEvaluator>,
    narrative: Box<dyn Narrative>,
    inputs: Box<dyn InputHandlerFactory>,
    after_game: AfterGame,
    observers: ObserverList,
}

impl std::fmt::Debug for RoundControllerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundControllerBuilder")
            .field("timing", &self.timing)
            .field("players", &self.players.len())
            .field("units", &self.units)
            .field("after_game", &self.after_game)
            .finish_non_exhaustive()
    }
}

impl RoundControllerBuilder {
    fn new(scheduler: DelayedActionScheduler) -> Self {
        Self {
            scheduler,
            timing: Timing::default(),
            players: Vec::new(),
            units: Vec::new(),
            victory: Box::new(LastPlayerStanding::default()),
            narrative: Box::new(NoNarrative),
            inputs: Box::new(DefaultInputHandlers),
            after_game: AfterGame::default(),
            observers: ObserverList::new(),
        }
    }

    /// Pauses between phases.
    #[must_use]
    pub const fn timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Adds a player record.
    #[must_use]
    pub fn player(mut self, player: impl Player + 'static) -> Self {
        self.players.push(Box::new(player));
        self
    }

    /// Adds a unit to the starting roster.
    #[must_use]
    pub fn unit(mut self, spec: UnitSpec) -> Self {
        self.units.push(spec);
        self
    }

    /// Replaces the victory evaluator.
    #[must_use]
    pub fn victory(mut self, victory: impl VictoryEvaluator + 'static) -> Self {
        self.victory = Box::new(victory);
        self
    }

    /// Replaces the narrative collaborator.
    #[must_use]
    pub fn narrative(mut self, narrative: impl Narrative + 'static) -> Self {
        self.narrative = Box::new(narrative);
        self
    }

    /// Replaces the per-phase input handler factory.
    #[must_use]
    pub fn inputs(mut self, inputs: impl InputHandlerFactory + 'static) -> Self {
        self.inputs = Box::new(inputs);
        self
    }

    /// What to do once the match is over.
    #[must_use]
    pub const fn after_game(mut self, after_game: AfterGame) -> Self {
        self.after_game = after_game;
        self
    }

    /// Registers a lifecycle listener before activation.
    #[must_use]
    pub fn listener(mut self, listener: impl MatchListener + 'static) -> Self {
        self.observers.register(listener);
        self
    }

    /// Builds the controller.
    ///
    /// Units whose owner has no player record are logged and left out.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::Roster` when player numbers repeat or do not
    /// cover `0..N` exactly.
    pub fn build(self) -> Result<RoundController, PhaseError> {
        let mut players: BTreeMap<PlayerNumber, Box<dyn Player>> = BTreeMap::new();
        for player in self.players {
            let number = player.number();
            if players.insert(number, player).is_some() {
                return Err(ConfigError::InvalidValue {
                    field: "players".to_string(),
                    value: number.to_string(),
                    expected: "unique player numbers".to_string(),
                }
                .into());
            }
        }
        let count = u32::try_from(players.len()).map_err(|_| ConfigError::InvalidValue {
            field: "players".to_string(),
            value: players.len().to_string(),
            expected: "fewer players".to_string(),
        })?;
        if let Some((&last, _)) = players.last_key_value() {
            if last.0 != count - 1 {
                return Err(ConfigError::InvalidValue {
                    field: "players".to_string(),
                    value: last.to_string(),
                    expected: format!("player numbers 0..{count} without gaps"),
                }
                .into());
            }
        }

        let mut units = UnitRegistry::new();
        for spec in self.units {
            if players.contains_key(&spec.owner) {
                units.insert(spec);
            } else {
                warn!(unit = %spec.name, owner = %spec.owner, "unit owner has no player record; skipped");
            }
        }

        Ok(RoundController {
            id: MatchId::random(),
            state: MatchState::new(PlayerNumber(0)),
            units,
            players,
            rotation: TurnRotation::new(count),
            victory: self.victory,
            narrative: self.narrative,
            inputs: self.inputs,
            input: Box::new(BlockedInput),
            observers: self.observers,
            scheduler: self.scheduler,
            timing: self.timing,
            after_game: self.after_game,
            activated: false,
            expected_wake: None,
            awaiting_narrative: false,
            narrative_timer: None,
            after_game_action: None,
            selected: None,
            host_request: None,
            started_at: None,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::error::RotationError;
    use crate::observability::events::ListenerError;
    use crate::round::command::{CommandInbox, MatchHandle};
    use crate::round::victory::Verdict;
    use crate::roster::{AutoPlayer, ManualPlayer};

    type Seen = Arc<Mutex<Vec<MatchEvent>>>;

    struct Harness {
        controller: RoundController,
        handle: MatchHandle,
        inbox: CommandInbox,
        events: Seen,
    }

    impl Harness {
        /// Follows delays until the match waits on something else.
        fn settle(&mut self, step: Step) -> Option<Suspension> {
            let mut suspension = step.unwrap();
            while let Some(Suspension::Delay { wake, .. }) = suspension {
                suspension = self.controller.wake(wake).unwrap();
            }
            suspension
        }

        fn start(&mut self) -> Option<Suspension> {
            let step = self.controller.activate();
            self.settle(step)
        }

        /// Applies queued commands until the inbox is empty.
        fn drain(&mut self, limit: usize) -> Option<Suspension> {
            let mut last = None;
            for _ in 0..limit {
                let Some(command) = self.inbox.try_recv() else {
                    return last;
                };
                let step = self.controller.apply(command);
                if let Some(s) = self.settle(step) {
                    last = Some(s);
                }
            }
            last
        }

        fn kinds(&self) -> Vec<EventKind> {
            self.events.lock().unwrap().iter().map(|e| e.kind).collect()
        }

        fn count(&self, kind: EventKind) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.kind == kind)
                .count()
        }

        fn turn_players(&self) -> Vec<(u32, u32)> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.kind == EventKind::TurnStarted)
                .map(|e| (e.round, e.player.0))
                .collect()
        }
    }

    fn recorder(events: &Seen) -> impl MatchListener + 'static {
        let events = Arc::clone(events);
        move |event: &MatchEvent| -> Result<(), ListenerError> {
            events.lock().unwrap().push(*event);
            Ok(())
        }
    }

    /// Manual players for `0..players`, one unit per entry of `owners`.
    fn manual_match(players: u32, owners: &[u32]) -> Harness {
        build(players, owners, false, |b| b)
    }

    fn build(
        players: u32,
        owners: &[u32],
        auto: bool,
        customize: impl FnOnce(RoundControllerBuilder) -> RoundControllerBuilder,
    ) -> Harness {
        let (handle, inbox) = MatchHandle::channel();
        let scheduler = DelayedActionScheduler::new(handle.clone(), CancellationToken::new());
        let events: Seen = Arc::default();
        let mut builder = RoundController::builder(scheduler)
            .timing(Timing::instant())
            .listener(recorder(&events));
        for n in 0..players {
            builder = if auto {
                builder.player(AutoPlayer::new(PlayerNumber(n), format!("p{n}"), handle.clone()))
            } else {
                builder.player(ManualPlayer::new(PlayerNumber(n), format!("p{n}")))
            };
        }
        for (i, owner) in owners.iter().enumerate() {
            builder = builder.unit(UnitSpec::new(format!("u{i}"), PlayerNumber(*owner)));
        }
        let controller = customize(builder).build().unwrap();
        Harness {
            controller,
            handle,
            inbox,
            events,
        }
    }

    fn ended(h: &Harness) -> Vec<bool> {
        h.controller.units().iter().map(|u| u.is_ended()).collect()
    }

    // ------------------------------------------------------------------------
    // Activation and phase guards
    // ------------------------------------------------------------------------

    #[test]
    fn activation_reaches_first_turn() {
        let mut h = manual_match(2, &[0, 1]);
        assert_eq!(h.start(), Some(Suspension::AwaitingPlayer));
        assert_eq!(h.controller.phase(), Phase::TurnActive);
        assert_eq!(h.controller.round_number(), 1);
        assert_eq!(h.controller.current_player(), PlayerNumber(0));
        assert_eq!(
            h.kinds(),
            vec![
                EventKind::GameStarted,
                EventKind::RoundStarted,
                EventKind::TurnStarted,
                EventKind::UnitEnded,
            ]
        );
        assert!(h.controller.units().iter().all(|u| u.is_interactable()));
    }

    #[test]
    fn activate_returns_game_start_delay_and_blocks_units() {
        let mut h = manual_match(2, &[0, 1]);
        let step = h.controller.activate().unwrap();
        assert_eq!(
            step,
            Some(Suspension::Delay {
                duration: Duration::ZERO,
                wake: Wake::BeginRound
            })
        );
        assert!(h.controller.units().iter().all(|u| !u.is_interactable()));
    }

    #[test]
    fn activate_is_not_reentrant() {
        let mut h = manual_match(2, &[0, 1]);
        h.start();
        assert!(matches!(
            h.controller.activate(),
            Err(PhaseError::InvalidTransition(_))
        ));
        assert_eq!(h.count(EventKind::GameStarted), 1);
    }

    #[test]
    fn activation_skips_player_without_units() {
        let mut h = manual_match(3, &[1, 2]);
        h.start();
        assert_eq!(h.controller.current_player(), PlayerNumber(1));
    }

    #[test]
    fn unexpected_wake_is_rejected() {
        let mut h = manual_match(2, &[0, 1]);
        h.controller.activate().unwrap();
        assert!(matches!(
            h.controller.wake(Wake::TurnSetup),
            Err(PhaseError::InvalidTransition(_))
        ));
        assert!(h.controller.wake(Wake::BeginRound).is_ok());
    }

    #[test]
    fn end_turn_outside_turn_active_is_rejected() {
        let mut h = manual_match(2, &[0, 1]);
        h.controller.activate().unwrap();
        let err = h.controller.end_turn().unwrap_err();
        assert!(matches!(err, PhaseError::InvalidTransition(_)));
        assert!(!err.is_fatal());
        assert!(h.controller.force_end_turn().is_err());
        assert!(h.controller.finish_unit(UnitId(0)).is_err());
    }

    #[test]
    fn finish_unit_rejections() {
        let mut h = manual_match(2, &[0, 0, 1]);
        h.start();
        assert!(matches!(
            h.controller.finish_unit(UnitId(9)),
            Err(PhaseError::UnknownUnit(UnitId(9)))
        ));
        assert!(matches!(
            h.controller.finish_unit(UnitId(2)),
            Err(PhaseError::NotCurrentPlayer { .. })
        ));
        assert_eq!(
            h.controller.finish_unit(UnitId(0)).unwrap(),
            Some(Suspension::AwaitingPlayer)
        );
        assert!(matches!(
            h.controller.finish_unit(UnitId(0)),
            Err(PhaseError::UnitAlreadyEnded(UnitId(0)))
        ));
    }

    #[test]
    fn plain_end_turn_with_pending_units_keeps_control() {
        let mut h = manual_match(2, &[0, 1]);
        h.start();
        assert_eq!(h.controller.end_turn().unwrap(), Some(Suspension::AwaitingPlayer));
        assert_eq!(h.controller.current_player(), PlayerNumber(0));
        assert_eq!(h.count(EventKind::UnitEnded), 2);
    }

    // ------------------------------------------------------------------------
    // Scenarios
    // ------------------------------------------------------------------------

    #[test]
    fn one_unit_each_passes_control_then_ends_round() {
        let mut h = manual_match(2, &[0, 1]);
        h.start();

        let step = h.controller.finish_unit(UnitId(0));
        assert_eq!(h.settle(step), Some(Suspension::AwaitingPlayer));
        assert_eq!(h.controller.current_player(), PlayerNumber(1));
        assert_eq!(h.controller.round_number(), 1);
        assert_eq!(h.count(EventKind::RoundEnded), 0);

        let step = h.controller.finish_unit(UnitId(1));
        assert!(matches!(
            step,
            Ok(Some(Suspension::Delay {
                wake: Wake::RoundSetup,
                ..
            }))
        ));
        assert_eq!(h.count(EventKind::RoundEnded), 1);
        assert_eq!(h.controller.round_number(), 2);

        assert_eq!(h.settle(step), Some(Suspension::AwaitingPlayer));
        assert_eq!(ended(&h), vec![false, false]);
        assert_eq!(h.controller.current_player(), PlayerNumber(0));
    }

    #[test]
    fn destroying_last_enemy_unit_wins_immediately() {
        let mut h = manual_match(2, &[0, 0, 1]);
        h.start();
        let turns_before = h.count(EventKind::TurnEnded);

        assert_eq!(
            h.controller.destroy_unit(UnitId(2)).unwrap(),
            Some(Suspension::Finished(Outcome::Win))
        );
        assert_eq!(h.controller.outcome(), Outcome::Win);
        assert_eq!(h.controller.phase(), Phase::GameEnded);
        assert_eq!(h.count(EventKind::GameEnded), 1);
        assert_eq!(h.count(EventKind::TurnEnded), turns_before);
        assert_eq!(h.controller.current_player(), PlayerNumber(0));
    }

    #[test]
    fn force_end_turn_matches_finishing_units_one_by_one() {
        let mut forced = manual_match(2, &[0, 0, 0, 1]);
        forced.start();
        let step = forced.controller.force_end_turn();
        forced.settle(step);

        let mut stepped = manual_match(2, &[0, 0, 0, 1]);
        stepped.start();
        for id in 0..3 {
            let step = stepped.controller.finish_unit(UnitId(id));
            stepped.settle(step);
        }

        assert_eq!(ended(&forced), vec![true, true, true, false]);
        assert_eq!(ended(&forced), ended(&stepped));
        assert_eq!(forced.controller.state(), stepped.controller.state());
        assert_eq!(forced.controller.current_player(), PlayerNumber(1));
        assert_eq!(forced.count(EventKind::TurnEnded), 1);
        assert_eq!(stepped.count(EventKind::TurnEnded), 1);
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    #[test]
    fn game_ended_fires_once_and_nothing_follows() {
        let mut h = manual_match(2, &[0, 1]);
        h.start();
        h.controller.destroy_unit(UnitId(1)).unwrap();
        let events_at_end = h.kinds().len();

        assert_eq!(h.controller.end_turn().unwrap(), None);
        assert_eq!(h.controller.force_end_turn().unwrap(), None);
        assert_eq!(h.controller.wake(Wake::TurnSetup).unwrap(), None);
        assert_eq!(h.controller.destroy_unit(UnitId(0)).unwrap(), None);
        assert_eq!(h.controller.outcome(), Outcome::Win);

        let kinds = h.kinds();
        assert_eq!(kinds.len(), events_at_end);
        assert_eq!(kinds.last(), Some(&EventKind::GameEnded));
        assert_eq!(h.count(EventKind::GameEnded), 1);
    }

    #[test]
    fn round_number_increases_by_exactly_one() {
        let mut h = build(3, &[0, 0, 1, 2, 2], true, |b| b);
        h.start();
        h.drain(100);
        let rounds: Vec<u32> = h
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == EventKind::RoundStarted)
            .map(|e| e.round)
            .collect();
        assert!(rounds.len() >= 5, "only {} rounds played", rounds.len());
        let expected: Vec<u32> = (1..=u32::try_from(rounds.len()).unwrap()).collect();
        assert_eq!(rounds, expected);
    }

    #[test]
    fn rotation_visits_each_living_player_once_per_round() {
        let mut h = build(4, &[0, 2, 2, 3], true, |b| b);
        h.start();
        while h.controller.round_number() < 4 {
            h.drain(50);
        }
        let turns = h.turn_players();
        for round in 1..4 {
            let players: Vec<u32> = turns
                .iter()
                .filter(|(r, _)| *r == round)
                .map(|(_, p)| *p)
                .collect();
            assert_eq!(players, vec![0, 2, 3], "round {round}");
        }
    }

    #[test]
    fn snapshot_round_trip_reproduces_rotation() {
        let mut original = manual_match(3, &[0, 1, 1, 2]);
        original.start();
        let step = original.controller.finish_unit(UnitId(0));
        original.settle(step);
        assert_eq!(original.controller.current_player(), PlayerNumber(1));

        let json = serde_json::to_string(&original.controller.snapshot()).unwrap();
        let snapshot: MatchSnapshot = serde_json::from_str(&json).unwrap();

        let mut restored = manual_match(3, &[0, 1, 1, 2]);
        let step = restored.controller.restore(&snapshot);
        assert_eq!(restored.settle(step), Some(Suspension::AwaitingPlayer));
        assert_eq!(restored.controller.state(), original.controller.state());

        for unit in [1, 2, 3] {
            let a = original.controller.finish_unit(UnitId(unit));
            let a = original.settle(a);
            let b = restored.controller.finish_unit(UnitId(unit));
            let b = restored.settle(b);
            assert_eq!(a, b);
            assert_eq!(
                original.controller.current_player(),
                restored.controller.current_player()
            );
            assert_eq!(ended(&original), ended(&restored));
        }
        assert_eq!(restored.controller.round_number(), 2);
    }

    #[test]
    fn restore_during_turn_start_resumes_the_pause() {
        let mut original = manual_match(2, &[0, 1]);
        original.controller.activate().unwrap();
        original.controller.wake(Wake::BeginRound).unwrap();
        original.controller.wake(Wake::RoundSetup).unwrap();
        assert_eq!(original.controller.phase(), Phase::TurnStarting);
        let snapshot = original.controller.snapshot();

        let mut restored = manual_match(2, &[0, 1]);
        assert_eq!(
            restored.controller.restore(&snapshot).unwrap(),
            Some(Suspension::Delay {
                duration: Duration::ZERO,
                wake: Wake::TurnSetup
            })
        );
        let expected = original.controller.wake(Wake::TurnSetup).unwrap();
        assert_eq!(restored.controller.wake(Wake::TurnSetup).unwrap(), expected);
        assert_eq!(expected, Some(Suspension::AwaitingPlayer));
        assert_eq!(restored.controller.state(), original.controller.state());
    }

    #[test]
    fn restore_during_round_start_resumes_the_pause() {
        let mut original = manual_match(3, &[0, 1, 2]);
        original.start();
        for unit in 0..3 {
            let step = original.controller.finish_unit(UnitId(unit));
            if unit < 2 {
                original.settle(step);
            } else {
                // the round ends; stop in the next round's pause
                assert_eq!(
                    step.unwrap(),
                    Some(Suspension::Delay {
                        duration: Duration::ZERO,
                        wake: Wake::RoundSetup
                    })
                );
            }
        }
        assert_eq!(original.controller.phase(), Phase::RoundStarting);
        assert_eq!(original.controller.round_number(), 2);
        let snapshot = original.controller.snapshot();

        let mut restored = manual_match(3, &[0, 1, 2]);
        let step = restored.controller.restore(&snapshot).unwrap();
        assert_eq!(
            step,
            Some(Suspension::Delay {
                duration: Duration::ZERO,
                wake: Wake::RoundSetup
            })
        );

        let a = original.controller.wake(Wake::RoundSetup);
        let b = restored.controller.wake(Wake::RoundSetup);
        assert_eq!(original.settle(a), restored.settle(b));
        assert_eq!(restored.controller.state(), original.controller.state());
        assert_eq!(ended(&restored), ended(&original));
        assert_eq!(restored.controller.round_number(), 2);
    }

    #[test]
    fn restore_prompts_the_player_in_control() {
        let mut original = build(2, &[0, 1], true, |b| b);
        original.start();
        let snapshot = original.controller.snapshot();
        assert_eq!(snapshot.state.phase(), Phase::TurnActive);

        let mut restored = build(2, &[0, 1], true, |b| b);
        assert_eq!(
            restored.controller.restore(&snapshot).unwrap(),
            Some(Suspension::AwaitingPlayer)
        );
        assert!(matches!(
            restored.inbox.try_recv(),
            Some(Command::FinishUnit(UnitId(0)))
        ));
    }

    #[test]
    fn restore_of_a_finished_match_reports_the_outcome() {
        let mut original = manual_match(2, &[0, 1]);
        original.start();
        let step = original.controller.destroy_unit(UnitId(1));
        assert_eq!(step.unwrap(), Some(Suspension::Finished(Outcome::Win)));

        let mut restored = manual_match(2, &[0, 1]);
        assert_eq!(
            restored.controller.restore(&original.controller.snapshot()).unwrap(),
            Some(Suspension::Finished(Outcome::Win))
        );
        assert_eq!(restored.controller.phase(), Phase::GameEnded);
    }

    #[test]
    fn restore_into_a_running_match_is_rejected() {
        let mut h = manual_match(2, &[0, 1]);
        h.start();
        let snapshot = h.controller.snapshot();
        assert!(matches!(
            h.controller.restore(&snapshot),
            Err(PhaseError::InvalidTransition(_))
        ));
    }

    // ------------------------------------------------------------------------
    // Destroy and add
    // ------------------------------------------------------------------------

    #[test]
    fn destroying_current_players_unit_outside_turn_skips_them() {
        let mut h = manual_match(3, &[0, 1, 2]);
        h.controller.activate().unwrap();
        h.controller.wake(Wake::BeginRound).unwrap();
        h.controller.wake(Wake::RoundSetup).unwrap();
        assert_eq!(h.controller.phase(), Phase::TurnStarting);

        assert_eq!(h.controller.destroy_unit(UnitId(0)).unwrap(), None);
        assert_eq!(h.controller.current_player(), PlayerNumber(1));
        assert_eq!(
            h.controller.wake(Wake::TurnSetup).unwrap(),
            Some(Suspension::AwaitingPlayer)
        );
    }

    #[test]
    fn destroying_a_pending_unit_reprompts_the_player() {
        let mut h = manual_match(2, &[0, 0, 1, 1]);
        h.start();
        assert_eq!(
            h.controller.destroy_unit(UnitId(0)).unwrap(),
            Some(Suspension::AwaitingPlayer)
        );
        assert_eq!(h.controller.current_player(), PlayerNumber(0));
    }

    #[test]
    fn destroying_last_pending_unit_ends_the_turn() {
        let mut h = manual_match(2, &[0, 0, 0, 1]);
        h.start();
        h.controller.finish_unit(UnitId(0)).unwrap();
        h.controller.finish_unit(UnitId(1)).unwrap();
        let step = h.controller.destroy_unit(UnitId(2));
        assert_eq!(h.settle(step), Some(Suspension::AwaitingPlayer));
        assert_eq!(h.controller.current_player(), PlayerNumber(1));
    }

    #[test]
    fn destroying_last_pending_unit_evaluates_victory_once() {
        struct Counting(Arc<AtomicUsize>);
        impl VictoryEvaluator for Counting {
            fn evaluate(&self, units: &UnitRegistry) -> Verdict {
                self.0.fetch_add(1, Ordering::SeqCst);
                LastPlayerStanding::default().evaluate(units)
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let counting = Counting(Arc::clone(&calls));
        let mut h = build(2, &[0, 0, 0, 1], false, |b| b.victory(counting));
        h.start();
        h.controller.finish_unit(UnitId(0)).unwrap();
        h.controller.finish_unit(UnitId(1)).unwrap();

        let before = calls.load(Ordering::SeqCst);
        let step = h.controller.destroy_unit(UnitId(2));
        assert_eq!(calls.load(Ordering::SeqCst), before + 1);
        assert_eq!(h.settle(step), Some(Suspension::AwaitingPlayer));
        assert_eq!(h.controller.current_player(), PlayerNumber(1));
    }

    #[test]
    fn reprompt_after_destroy_does_not_repeat_auto_moves() {
        let mut h = build(2, &[0, 0, 1], true, |b| b);
        h.start();
        // the auto player already chose unit #0; its teammate is destroyed
        assert_eq!(
            h.controller.destroy_unit(UnitId(1)).unwrap(),
            Some(Suspension::AwaitingPlayer)
        );

        let Some(command) = h.inbox.try_recv() else {
            panic!("auto player should have queued a move");
        };
        assert!(matches!(command, Command::FinishUnit(UnitId(0))));
        assert!(h.inbox.try_recv().is_none());
        assert!(h.controller.apply(command).is_ok());
    }

    #[test]
    fn destroying_unknown_unit_is_ignored() {
        let mut h = manual_match(2, &[0, 1]);
        h.start();
        assert_eq!(h.controller.destroy_unit(UnitId(42)).unwrap(), None);
    }

    #[test]
    fn empty_roster_ends_in_loss() {
        let mut h = manual_match(2, &[]);
        assert_eq!(h.start(), Some(Suspension::Finished(Outcome::Loss)));
        assert_eq!(h.count(EventKind::GameEnded), 1);
    }

    #[test]
    fn add_unit_requires_a_player_record() {
        let mut h = manual_match(2, &[0, 1]);
        h.start();
        let err = h
            .controller
            .add_unit(UnitSpec::new("ghost", PlayerNumber(5)))
            .unwrap_err();
        assert!(matches!(err, PhaseError::Roster(ConfigError::UnknownOwner { .. })));

        let id = h
            .controller
            .add_unit(UnitSpec::new("reinforcement", PlayerNumber(1)))
            .unwrap();
        let unit = h.controller.units().get(id).unwrap();
        assert!(unit.is_interactable());
        assert!(!unit.is_ended());
    }

    #[test]
    fn builder_rejects_duplicate_and_gapped_players() {
        let (handle, _inbox) = MatchHandle::channel();
        let scheduler = DelayedActionScheduler::new(handle, CancellationToken::new());
        let duplicate = RoundController::builder(scheduler.clone())
            .player(ManualPlayer::new(PlayerNumber(0), "a"))
            .player(ManualPlayer::new(PlayerNumber(0), "b"))
            .build();
        assert!(matches!(duplicate, Err(PhaseError::Roster(_))));

        let gapped = RoundController::builder(scheduler)
            .player(ManualPlayer::new(PlayerNumber(0), "a"))
            .player(ManualPlayer::new(PlayerNumber(2), "b"))
            .build();
        assert!(matches!(gapped, Err(PhaseError::Roster(_))));
    }

    #[test]
    fn builder_skips_units_without_player_record() {
        let h = manual_match(2, &[0, 7, 1]);
        assert_eq!(h.controller.units().len(), 2);
        assert_eq!(h.controller.number_of_players(), 2);
    }

    #[test]
    fn rotation_failure_is_fatal() {
        struct NeverEnds;
        impl VictoryEvaluator for NeverEnds {
            fn evaluate(&self, _units: &UnitRegistry) -> Verdict {
                Verdict::Ongoing
            }
        }

        let mut h = build(2, &[0], false, |b| b.victory(NeverEnds));
        h.start();
        let err = h.controller.destroy_unit(UnitId(0)).unwrap_err();
        assert!(matches!(
            err,
            PhaseError::Rotation(RotationError::NoEligiblePlayer { .. })
        ));
        assert!(err.is_fatal());
    }

    // ------------------------------------------------------------------------
    // Collaborators
    // ------------------------------------------------------------------------

    #[test]
    fn failing_listener_does_not_stop_the_match() {
        let mut h = manual_match(2, &[0, 1]);
        h.controller
            .register_listener(|_: &MatchEvent| -> Result<(), ListenerError> { panic!("bad listener") });
        let late: Seen = Arc::default();
        let id = h.controller.register_listener(recorder(&late));

        let step = h.controller.activate();
        assert_eq!(h.settle(step), Some(Suspension::AwaitingPlayer));
        assert_eq!(late.lock().unwrap().len(), 4);

        assert!(h.controller.unregister_listener(id));
        h.controller.end_turn().unwrap();
        assert_eq!(late.lock().unwrap().len(), 4);
    }

    #[test]
    fn clicks_select_then_finish() {
        let mut h = manual_match(2, &[0, 0, 1]);
        h.start();

        assert_eq!(h.controller.unit_clicked(ClickEvent::on(UnitId(2))).unwrap(), None);
        assert_eq!(h.controller.selected_unit(), None);

        h.controller.unit_clicked(ClickEvent::on(UnitId(0))).unwrap();
        assert_eq!(h.controller.selected_unit(), Some(UnitId(0)));

        h.controller.unit_clicked(ClickEvent::on(UnitId(0))).unwrap();
        assert!(h.controller.units().get(UnitId(0)).unwrap().is_ended());
        assert_eq!(h.controller.selected_unit(), None);
    }

    #[test]
    fn clicks_over_ui_or_on_blocked_units_are_dropped() {
        let mut h = manual_match(2, &[0, 1]);
        h.controller.activate().unwrap();
        assert_eq!(h.controller.unit_clicked(ClickEvent::on(UnitId(0))).unwrap(), None);
        assert_eq!(h.controller.selected_unit(), None);

        let step = h.controller.wake(Wake::BeginRound);
        h.settle(step);
        assert_eq!(
            h.controller.unit_clicked(ClickEvent::through_ui(UnitId(0))).unwrap(),
            None
        );
        assert_eq!(h.controller.selected_unit(), None);
        assert!(matches!(
            h.controller.unit_clicked(ClickEvent::on(UnitId(9))),
            Err(PhaseError::UnknownUnit(_))
        ));
    }

    #[test]
    fn input_handlers_swap_exit_before_enter() {
        struct Recording {
            log: Arc<Mutex<Vec<String>>>,
            phase: Phase,
        }
        impl PhaseInputHandler for Recording {
            fn name(&self) -> &'static str {
                "recording"
            }
            fn on_enter(&mut self, phase: Phase) {
                self.log.lock().unwrap().push(format!("enter {phase}"));
            }
            fn on_exit(&mut self) {
                self.log.lock().unwrap().push(format!("exit {}", self.phase));
            }
            fn on_unit_clicked(&mut self, _: &crate::roster::UnitInfo<'_>, _: &InputContext) -> InputAction {
                InputAction::Ignore
            }
        }
        struct Factory(Arc<Mutex<Vec<String>>>);
        impl InputHandlerFactory for Factory {
            fn handler_for(&self, phase: Phase) -> Box<dyn PhaseInputHandler> {
                Box::new(Recording {
                    log: Arc::clone(&self.0),
                    phase,
                })
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let factory = Factory(Arc::clone(&log));
        let mut h = build(2, &[0, 1], false, |b| b.inputs(factory));
        h.start();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "enter game_starting",
                "exit game_starting",
                "enter round_starting",
                "exit round_starting",
                "enter turn_starting",
                "exit turn_starting",
                "enter turn_active",
            ]
        );
    }

    struct Signalled;

    impl Narrative for Signalled {
        fn begin(&mut self, _cue: &NarrativeCue) -> Interlude {
            Interlude::UntilSignalled
        }
    }

    #[test]
    fn narrative_holds_hand_over_until_signalled() {
        let mut h = build(2, &[0, 1], false, |b| b.narrative(Signalled));
        assert_eq!(h.start(), Some(Suspension::Narrative));
        assert!(h.controller.is_awaiting_narrative());
        assert_eq!(h.controller.phase(), Phase::TurnStarting);
        assert!(h.controller.units().iter().all(|u| !u.is_interactable()));
        assert!(h.controller.end_turn().is_err());

        assert!(h.handle.narrative_finished());
        assert_eq!(h.drain(1), Some(Suspension::AwaitingPlayer));
        assert_eq!(h.controller.phase(), Phase::TurnActive);
        assert!(h.controller.narrative_finished().is_err());
    }

    #[test]
    fn timed_narrative_without_runtime_hands_over_at_once() {
        struct Timed;
        impl Narrative for Timed {
            fn begin(&mut self, _cue: &NarrativeCue) -> Interlude {
                Interlude::Timed(Duration::from_secs(30))
            }
        }
        let mut h = build(2, &[0, 1], false, |b| b.narrative(Timed));
        assert_eq!(h.start(), Some(Suspension::AwaitingPlayer));
    }

    #[tokio::test]
    async fn timed_narrative_delivers_finish_through_scheduler() {
        struct Timed;
        impl Narrative for Timed {
            fn begin(&mut self, _cue: &NarrativeCue) -> Interlude {
                Interlude::Timed(Duration::from_millis(10))
            }
        }
        let mut h = build(2, &[0, 1], false, |b| b.narrative(Timed));
        assert_eq!(h.start(), Some(Suspension::Narrative));

        let command = tokio::time::timeout(Duration::from_secs(2), h.inbox.recv())
            .await
            .unwrap()
            .unwrap();
        let step = h.controller.apply(command);
        assert_eq!(h.settle(step), Some(Suspension::AwaitingPlayer));
    }

    #[tokio::test]
    async fn after_game_action_requests_restart() {
        let mut h = build(2, &[0, 1], false, |b| b.after_game(AfterGame::Restart));
        h.start();
        h.controller.destroy_unit(UnitId(1)).unwrap();
        assert_eq!(h.controller.take_host_request(), None);

        let command = tokio::time::timeout(Duration::from_secs(2), h.inbox.recv())
            .await
            .unwrap()
            .unwrap();
        h.controller.apply(command).unwrap();
        assert_eq!(h.controller.take_host_request(), Some(HostRequest::Restart));
    }

    #[test]
    fn unit_hooks_see_round_context() {
        struct Counting(Arc<Mutex<Vec<(&'static str, u32)>>>);
        impl crate::roster::UnitHooks for Counting {
            fn on_round_start(
                &mut self,
                _unit: &crate::roster::UnitInfo<'_>,
                ctx: &HookContext,
            ) -> Result<(), crate::roster::HookError> {
                self.0.lock().unwrap().push(("round_start", ctx.round));
                Ok(())
            }
            fn on_round_end(
                &mut self,
                _unit: &crate::roster::UnitInfo<'_>,
                ctx: &HookContext,
            ) -> Result<(), crate::roster::HookError> {
                self.0.lock().unwrap().push(("round_end", ctx.round));
                Ok(())
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = Counting(Arc::clone(&log));
        let mut h = build(2, &[1], false, |b| {
            b.unit(UnitSpec::new("hooked", PlayerNumber(0)).with_hooks(hooks))
        });
        h.start();
        let step = h.controller.finish_unit(UnitId(1));
        h.settle(step);
        let step = h.controller.finish_unit(UnitId(0));
        h.settle(step);

        assert_eq!(
            *log.lock().unwrap(),
            vec![("round_start", 1), ("round_end", 1), ("round_start", 2)]
        );
    }
}
