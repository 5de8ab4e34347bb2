//! Commands and the match handle.
//!
//! Everything that wants to change a running match (players, hosts, the
//! narrative, scheduled actions) sends a [`Command`] through a cloneable
//! [`MatchHandle`]. The runner applies them one at a time on the match
//! timeline, so no command ever runs inside another transition.

use tokio::sync::mpsc;

use crate::roster::{UnitId, UnitSpec};

use super::controller::{RoundController, Step};
use super::input::ClickEvent;

/// Closure delivered by the delayed action scheduler.
pub type DeferredAction = Box<dyn FnOnce(&mut RoundController) -> Step + Send>;

/// A request to the round controller.
pub enum Command {
    /// The active player ends control
    EndTurn,
    /// Administrative skip: end every unit of the active player
    ForceEndTurn,
    /// A unit finished acting
    FinishUnit(UnitId),
    /// A unit was destroyed
    DestroyUnit(UnitId),
    /// A unit joins the match
    AddUnit(UnitSpec),
    /// Pointer input on a unit
    UnitClicked(ClickEvent),
    /// The narrative interlude is over
    NarrativeFinished,
    /// Reload a fresh match
    Restart,
    /// Terminate the host
    Exit,
    /// A scheduled action whose delay elapsed
    Deferred(DeferredAction),
}

impl Command {
    /// Stable command name for logs and metric labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::EndTurn => "end_turn",
            Self::ForceEndTurn => "force_end_turn",
            Self::FinishUnit(_) => "finish_unit",
            Self::DestroyUnit(_) => "destroy_unit",
            Self::AddUnit(_) => "add_unit",
            Self::UnitClicked(_) => "unit_clicked",
            Self::NarrativeFinished => "narrative_finished",
            Self::Restart => "restart",
            Self::Exit => "exit",
            Self::Deferred(_) => "deferred",
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FinishUnit(id) => f.debug_tuple("FinishUnit").field(id).finish(),
            Self::DestroyUnit(id) => f.debug_tuple("DestroyUnit").field(id).finish(),
            Self::AddUnit(spec) => f.debug_tuple("AddUnit").field(spec).finish(),
            Self::UnitClicked(click) => f.debug_tuple("UnitClicked").field(click).finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// Cloneable sender half of a match's command inbox.
#[derive(Debug, Clone)]
pub struct MatchHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl MatchHandle {
    /// Creates a handle and the inbox it feeds.
    #[must_use]
    pub fn channel() -> (Self, CommandInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, CommandInbox { rx })
    }

    /// Enqueues a command. Returns `false` if the match is gone.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }

    /// Requests `EndTurn`.
    pub fn end_turn(&self) -> bool {
        self.send(Command::EndTurn)
    }

    /// Requests `ForceEndTurn`.
    pub fn force_end_turn(&self) -> bool {
        self.send(Command::ForceEndTurn)
    }

    /// Reports that `unit` finished acting.
    pub fn finish_unit(&self, unit: UnitId) -> bool {
        self.send(Command::FinishUnit(unit))
    }

    /// Reports that `unit` was destroyed.
    pub fn destroy_unit(&self, unit: UnitId) -> bool {
        self.send(Command::DestroyUnit(unit))
    }

    /// Adds a unit to the running match.
    pub fn add_unit(&self, spec: UnitSpec) -> bool {
        self.send(Command::AddUnit(spec))
    }

    /// Forwards a click.
    pub fn click(&self, click: ClickEvent) -> bool {
        self.send(Command::UnitClicked(click))
    }

    /// Signals the end of a narrative interlude.
    pub fn narrative_finished(&self) -> bool {
        self.send(Command::NarrativeFinished)
    }

    /// Requests a fresh match.
    pub fn restart(&self) -> bool {
        self.send(Command::Restart)
    }

    /// Requests host termination.
    pub fn exit(&self) -> bool {
        self.send(Command::Exit)
    }

    /// Whether the inbox has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a match's commands.
#[derive(Debug)]
pub struct CommandInbox {
    rx: mpsc::UnboundedReceiver<Command>,
}

impl CommandInbox {
    /// Waits for the next command.
    pub async fn recv(&mut self) -> Option<Command> {
        self.rx.recv().await
    }

    /// Takes the next command if one is queued.
    pub fn try_recv(&mut self) -> Option<Command> {
        self.rx.try_recv().ok()
    }
}
