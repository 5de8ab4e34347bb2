//! Victory evaluation.

use crate::roster::{PlayerNumber, UnitRegistry};

use super::state::Outcome;

/// Answer of a victory evaluator, from the protagonist's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep playing
    Ongoing,
    /// The protagonist won
    Win,
    /// The protagonist lost
    Loss,
}

impl Verdict {
    /// Outcome to record, or `None` while the match goes on.
    #[must_use]
    pub const fn outcome(self) -> Option<Outcome> {
        match self {
            Self::Ongoing => None,
            Self::Win => Some(Outcome::Win),
            Self::Loss => Some(Outcome::Loss),
        }
    }
}

/// Decides whether the match is over. Must be a pure function of the roster.
pub trait VictoryEvaluator: Send {
    /// Evaluates the current roster.
    fn evaluate(&self, units: &UnitRegistry) -> Verdict;
}

/// The match ends when at most one player has units left.
///
/// One survivor is a win if it is the protagonist and a loss otherwise; no
/// survivors at all is a loss. With `concede_on_elimination` the protagonist
/// also loses as soon as its last unit is gone, however many others remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastPlayerStanding {
    protagonist: PlayerNumber,
    concede_on_elimination: bool,
}

impl LastPlayerStanding {
    /// Evaluator for `protagonist`.
    #[must_use]
    pub const fn new(protagonist: PlayerNumber) -> Self {
        Self {
            protagonist,
            concede_on_elimination: false,
        }
    }

    /// Ends the match when the protagonist is eliminated.
    #[must_use]
    pub const fn concede_on_elimination(mut self, concede: bool) -> Self {
        self.concede_on_elimination = concede;
        self
    }
}

impl Default for LastPlayerStanding {
    fn default() -> Self {
        Self::new(PlayerNumber(0))
    }
}

impl VictoryEvaluator for LastPlayerStanding {
    fn evaluate(&self, units: &UnitRegistry) -> Verdict {
        let alive = units.owners();
        match alive.len() {
            0 => Verdict::Loss,
            1 if alive.contains(&self.protagonist) => Verdict::Win,
            1 => Verdict::Loss,
            _ if self.concede_on_elimination && !alive.contains(&self.protagonist) => Verdict::Loss,
            _ => Verdict::Ongoing,
        }
    }
}
