//! Round and turn orchestration.
//!
//! A match moves through game, round, and turn phases under the control of
//! a [`RoundController`]. The controller is synchronous and never sleeps;
//! the [`MatchRunner`] owns the timeline, turns suspensions into timers, and
//! applies [`Command`]s sent through a [`MatchHandle`].
//!
//! Supporting pieces:
//!
//! - [`TurnRotation`] picks the next player with living units
//! - [`VictoryEvaluator`] decides when the match is over
//! - [`PhaseInputHandler`] implementations receive clicks, one per phase
//! - [`Narrative`] may hold the hand-over of control for an interlude
//! - [`DelayedActionScheduler`] runs closures on the timeline after a delay

pub mod command;
pub mod controller;
pub mod input;
pub mod narrative;
pub mod rotation;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod victory;

pub use command::{Command, CommandInbox, MatchHandle};
pub use controller::{
    AfterGame, HostRequest, RoundController, RoundControllerBuilder, Step, Suspension, Timing,
    Wake,
};
pub use input::{
    BlockedInput, ClickEvent, DefaultInputHandlers, InputAction, InputContext,
    InputHandlerFactory, PhaseInputHandler, SelectionInput,
};
pub use narrative::{Interlude, Narrative, NarrativeCue, NoNarrative, Scene, ScriptedNarrative};
pub use rotation::TurnRotation;
pub use runner::{MatchExit, MatchReport, MatchRunner};
pub use scheduler::{DelayedActionScheduler, ScheduledAction};
pub use state::{MatchId, MatchSnapshot, MatchState, Outcome, Phase};
pub use victory::{LastPlayerStanding, Verdict, VictoryEvaluator};
