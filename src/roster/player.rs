//! Player collaborators.
//!
//! When the controller hands control to a player it calls [`Player::play`].
//! A player never gets a reference to the controller; it acts by sending
//! commands through the [`MatchHandle`] it was built with.

use tracing::{debug, info, trace};

use crate::round::command::MatchHandle;

use super::{PlayerNumber, UnitId};

/// What a player sees when control is handed to it.
#[derive(Debug, Clone, Copy)]
pub struct TurnView<'a> {
    /// The player in control
    pub player: PlayerNumber,
    /// Current round number
    pub round: u32,
    /// The player's units that have not acted yet, in roster order
    pub pending: &'a [UnitId],
}

/// The `play` contract: called whenever control returns to a player that
/// still has units to act with.
pub trait Player: Send {
    /// Player identity.
    fn number(&self) -> PlayerNumber;

    /// Display name used in logs.
    fn name(&self) -> &str;

    /// Control has been handed to this player.
    fn play(&mut self, turn: &TurnView<'_>);
}

/// A player driven from outside (clicks, host commands). Playing is a no-op.
#[derive(Debug, Clone)]
pub struct ManualPlayer {
    number: PlayerNumber,
    name: String,
}

impl ManualPlayer {
    /// Creates a manual player.
    #[must_use]
    pub fn new(number: PlayerNumber, name: impl Into<String>) -> Self {
        Self {
            number,
            name: name.into(),
        }
    }
}

impl Player for ManualPlayer {
    fn number(&self) -> PlayerNumber {
        self.number
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn play(&mut self, turn: &TurnView<'_>) {
        info!(
            player = %self.number,
            name = %self.name,
            pending = turn.pending.len(),
            "awaiting input"
        );
    }
}

/// Finishes its first pending unit every time it gets control.
///
/// Used for headless matches; it makes no tactical decisions. A prompt
/// whose first pending unit already has a move queued in the same round
/// sends nothing.
#[derive(Debug, Clone)]
pub struct AutoPlayer {
    number: PlayerNumber,
    name: String,
    handle: MatchHandle,
    queued: Option<(u32, UnitId)>,
}

impl AutoPlayer {
    /// Creates an auto player that acts through `handle`.
    #[must_use]
    pub fn new(number: PlayerNumber, name: impl Into<String>, handle: MatchHandle) -> Self {
        Self {
            number,
            name: name.into(),
            handle,
            queued: None,
        }
    }
}

impl Player for AutoPlayer {
    fn number(&self) -> PlayerNumber {
        self.number
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn play(&mut self, turn: &TurnView<'_>) {
        let Some(&unit) = turn.pending.first() else {
            return;
        };
        if self.queued == Some((turn.round, unit)) {
            trace!(player = %self.number, %unit, "move already queued");
            return;
        }
        debug!(player = %self.number, %unit, round = turn.round, "auto player finishing unit");
        if self.handle.finish_unit(unit) {
            self.queued = Some((turn.round, unit));
        } else {
            debug!(player = %self.number, "match timeline closed; dropping move");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::round::command::Command;

    #[test]
    fn auto_player_finishes_first_pending_unit() {
        let (handle, mut inbox) = MatchHandle::channel();
        let mut player = AutoPlayer::new(PlayerNumber(1), "Red", handle);
        let pending = [UnitId(4), UnitId(7)];

        player.play(&TurnView {
            player: PlayerNumber(1),
            round: 2,
            pending: &pending,
        });

        match inbox.try_recv() {
            Some(Command::FinishUnit(unit)) => assert_eq!(unit, UnitId(4)),
            other => panic!("expected FinishUnit, got {other:?}"),
        }
        assert!(inbox.try_recv().is_none());
    }

    #[test]
    fn auto_player_does_not_repeat_a_queued_move() {
        let (handle, mut inbox) = MatchHandle::channel();
        let mut player = AutoPlayer::new(PlayerNumber(0), "Blue", handle);
        let view = |round, pending: &'static [UnitId]| TurnView {
            player: PlayerNumber(0),
            round,
            pending,
        };

        player.play(&view(1, &[UnitId(0), UnitId(1)]));
        player.play(&view(1, &[UnitId(0)]));
        assert!(matches!(inbox.try_recv(), Some(Command::FinishUnit(UnitId(0)))));
        assert!(inbox.try_recv().is_none());

        // same unit in a later round is a new move
        player.play(&view(2, &[UnitId(0)]));
        assert!(matches!(inbox.try_recv(), Some(Command::FinishUnit(UnitId(0)))));
    }

    #[test]
    fn auto_player_with_nothing_pending_sends_nothing() {
        let (handle, mut inbox) = MatchHandle::channel();
        let mut player = AutoPlayer::new(PlayerNumber(0), "Blue", handle);
        player.play(&TurnView {
            player: PlayerNumber(0),
            round: 1,
            pending: &[],
        });
        assert!(inbox.try_recv().is_none());
    }

    #[test]
    fn manual_player_sends_nothing() {
        let (_handle, mut inbox) = MatchHandle::channel();
        let mut player = ManualPlayer::new(PlayerNumber(0), "Blue");
        assert_eq!(player.name(), "Blue");
        player.play(&TurnView {
            player: PlayerNumber(0),
            round: 1,
            pending: &[UnitId(0)],
        });
        assert!(inbox.try_recv().is_none());
    }
}
