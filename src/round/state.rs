//! Match state and the phase transition table.
//!
//! [`MatchState`] is owned by the round controller and only changes through
//! [`MatchState::advance_to`], which checks every move against
//! [`Phase::successors`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PhaseError;
use crate::roster::{PlayerNumber, UnitId};

/// Identity of one match; the "source" of every lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub Uuid);

impl MatchId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for MatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stage of the match state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Match activation, once
    GameStarting,
    /// A new round is being set up
    RoundStarting,
    /// A player's turn is being set up
    TurnStarting,
    /// The active player has control
    TurnActive,
    /// Control is leaving the active player
    TurnEnding,
    /// Every unit has acted; the round closes
    RoundEnding,
    /// Terminal
    GameEnded,
}

impl Phase {
    /// Every phase, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::GameStarting,
        Self::RoundStarting,
        Self::TurnStarting,
        Self::TurnActive,
        Self::TurnEnding,
        Self::RoundEnding,
        Self::GameEnded,
    ];

    /// Phases reachable in one step from `self`.
    #[must_use]
    pub const fn successors(self) -> &'static [Self] {
        match self {
            Self::GameStarting => &[Self::RoundStarting, Self::GameEnded],
            Self::RoundStarting => &[Self::TurnStarting, Self::GameEnded],
            Self::TurnStarting => &[Self::TurnActive, Self::GameEnded],
            Self::TurnActive => &[Self::TurnEnding, Self::GameEnded],
            Self::TurnEnding => &[Self::TurnStarting, Self::RoundEnding, Self::GameEnded],
            Self::RoundEnding => &[Self::RoundStarting, Self::GameEnded],
            Self::GameEnded => &[],
        }
    }

    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        self.successors().contains(&next)
    }

    /// Whether no transition leaves this phase.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::GameEnded)
    }

    /// Stable name for logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GameStarting => "game_starting",
            Self::RoundStarting => "round_starting",
            Self::TurnStarting => "turn_starting",
            Self::TurnActive => "turn_active",
            Self::TurnEnding => "turn_ending",
            Self::RoundEnding => "round_ending",
            Self::GameEnded => "game_ended",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a match from the protagonist's point of view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Match still running
    #[default]
    Undetermined,
    /// The protagonist won
    Win,
    /// The protagonist lost
    Loss,
}

impl Outcome {
    /// Whether a result has been recorded.
    #[must_use]
    pub const fn is_decided(self) -> bool {
        !matches!(self, Self::Undetermined)
    }

    /// Stable name for logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Undetermined => "undetermined",
            Self::Win => "win",
            Self::Loss => "loss",
        }
    }
}

/// Phase, round counter, player in control, and outcome of one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    phase: Phase,
    round_number: u32,
    current_player: PlayerNumber,
    outcome: Outcome,
}

impl MatchState {
    /// State of a match that has not been activated yet.
    #[must_use]
    pub const fn new(first_player: PlayerNumber) -> Self {
        Self {
            phase: Phase::GameStarting,
            round_number: 0,
            current_player: first_player,
            outcome: Outcome::Undetermined,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Rounds started so far.
    #[must_use]
    pub const fn round_number(&self) -> u32 {
        self.round_number
    }

    /// Player in control.
    #[must_use]
    pub const fn current_player(&self) -> PlayerNumber {
        self.current_player
    }

    /// Recorded outcome.
    #[must_use]
    pub const fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Moves to `next`, rejecting transitions missing from the table.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::Invariant` for an illegal transition.
    pub fn advance_to(&mut self, next: Phase) -> Result<(), PhaseError> {
        if !self.phase.can_advance_to(next) {
            return Err(PhaseError::Invariant(format!(
                "illegal transition {} -> {}",
                self.phase, next
            )));
        }
        self.phase = next;
        Ok(())
    }

    /// Increments the round counter.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::Invariant` if the counter would overflow.
    pub(crate) fn begin_round(&mut self) -> Result<u32, PhaseError> {
        self.round_number = self
            .round_number
            .checked_add(1)
            .ok_or_else(|| PhaseError::Invariant("round counter overflow".to_string()))?;
        Ok(self.round_number)
    }

    pub(crate) fn set_current_player(&mut self, player: PlayerNumber) {
        self.current_player = player;
    }

    /// Records the outcome and enters `GameEnded`.
    ///
    /// Returns `false` if an outcome was already recorded.
    pub(crate) fn conclude(&mut self, outcome: Outcome) -> bool {
        if self.outcome.is_decided() || self.phase.is_terminal() {
            return false;
        }
        self.outcome = outcome;
        self.phase = Phase::GameEnded;
        true
    }
}

/// Serializable copy of the match state plus every unit's `ended` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    /// Phase, round, player in control, outcome
    pub state: MatchState,
    /// `(unit, ended)` in roster order
    pub ended: Vec<(UnitId, bool)>,
}
