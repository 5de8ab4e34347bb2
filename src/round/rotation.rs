//! Turn rotation.
//!
//! Walks the player-number space `0..number_of_players` cyclically and
//! skips players with no living unit. A scan is bounded to one full cycle;
//! finding nobody is reported as an error instead of looping.

use std::collections::BTreeSet;

use crate::error::RotationError;
use crate::roster::PlayerNumber;

/// Computes which player receives control next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnRotation {
    number_of_players: u32,
}

impl TurnRotation {
    /// Creates a rotation over `0..number_of_players`.
    #[must_use]
    pub const fn new(number_of_players: u32) -> Self {
        Self { number_of_players }
    }

    /// Size of the player-number space.
    #[must_use]
    pub const fn number_of_players(&self) -> u32 {
        self.number_of_players
    }

    /// Next player after `current` that appears in `eligible`.
    ///
    /// Probes at most `number_of_players` numbers. `current` itself is the
    /// last number probed, so a lone surviving player gets control back.
    ///
    /// # Errors
    ///
    /// Returns `RotationError::NoEligiblePlayer` if a full cycle finds no
    /// eligible player, or `RotationError::NoPlayers` for an empty space.
    #[allow(clippy::cast_possible_truncation)] // reduced modulo a u32
    pub fn next(
        &self,
        current: PlayerNumber,
        eligible: &BTreeSet<PlayerNumber>,
    ) -> Result<PlayerNumber, RotationError> {
        let n = self.number_of_players;
        if n == 0 {
            return Err(RotationError::NoPlayers);
        }
        for step in 1..=n {
            let candidate =
                PlayerNumber(((u64::from(current.0) + u64::from(step)) % u64::from(n)) as u32);
            if eligible.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(RotationError::NoEligiblePlayer {
            from: current,
            probed: n,
        })
    }

    /// Lowest eligible player number, used when a match is activated.
    ///
    /// # Errors
    ///
    /// Same conditions as [`TurnRotation::next`].
    pub fn first(&self, eligible: &BTreeSet<PlayerNumber>) -> Result<PlayerNumber, RotationError> {
        if self.number_of_players == 0 {
            return Err(RotationError::NoPlayers);
        }
        eligible
            .iter()
            .copied()
            .find(|p| p.0 < self.number_of_players)
            .ok_or(RotationError::NoEligiblePlayer {
                from: PlayerNumber(0),
                probed: self.number_of_players,
            })
    }
}
