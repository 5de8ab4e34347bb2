//! Narrative interludes played before a player receives control.

use std::time::Duration;

use tracing::info;

use crate::roster::PlayerNumber;

/// Which turn is about to be handed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NarrativeCue {
    /// Current round number
    pub round: u32,
    /// Player about to receive control
    pub player: PlayerNumber,
}

/// How long the hand-over waits for the narrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interlude {
    /// Nothing to play; hand over immediately
    Skip,
    /// Hand over once the duration has elapsed
    Timed(Duration),
    /// Hand over when a `narrative_finished` command arrives
    UntilSignalled,
}

/// The narrative collaborator.
pub trait Narrative: Send {
    /// Starts whatever plays before `cue.player`'s turn.
    fn begin(&mut self, cue: &NarrativeCue) -> Interlude;
}

/// Never plays anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNarrative;

impl Narrative for NoNarrative {
    fn begin(&mut self, _cue: &NarrativeCue) -> Interlude {
        Interlude::Skip
    }
}

/// Lines to show before one specific turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    /// Round the scene belongs to
    pub round: u32,
    /// Player whose turn it precedes
    pub player: PlayerNumber,
    /// Text lines, written to the log
    pub lines: Vec<String>,
    /// How long the scene holds the hand-over
    pub duration: Duration,
}

/// Plays pre-written scenes keyed by round and player.
///
/// Each scene plays at most once. Lines go to the log at `info`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedNarrative {
    scenes: Vec<Scene>,
}

impl ScriptedNarrative {
    /// Creates a narrative from `scenes`.
    #[must_use]
    pub const fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    /// Scenes that have not played yet.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.scenes.len()
    }
}

impl Narrative for ScriptedNarrative {
    fn begin(&mut self, cue: &NarrativeCue) -> Interlude {
        let Some(index) = self
            .scenes
            .iter()
            .position(|s| s.round == cue.round && s.player == cue.player)
        else {
            return Interlude::Skip;
        };
        let scene = self.scenes.remove(index);
        for line in &scene.lines {
            info!(round = cue.round, player = %cue.player, "{line}");
        }
        if scene.duration.is_zero() {
            Interlude::Skip
        } else {
            Interlude::Timed(scene.duration)
        }
    }
}
