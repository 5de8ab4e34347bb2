//! Match lifecycle events and their listeners.
//!
//! The round controller publishes a [`MatchEvent`] at every lifecycle
//! boundary through an [`ObserverList`]. Listeners run in registration
//! order; a listener that fails or panics is logged and counted, and the
//! remaining listeners still run.
//!
//! [`EventLog`] is the built-in listener that writes each event as one line
//! of JSON (JSONL) with a monotonically increasing sequence number.

use std::any::Any;
use std::io::{BufWriter, Write};
use std::panic::AssertUnwindSafe;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::roster::PlayerNumber;
use crate::round::MatchId;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The match was activated
    GameStarted,
    /// The outcome was decided
    GameEnded,
    /// A round began
    RoundStarted,
    /// Every unit acted; the round closed
    RoundEnded,
    /// A turn is being set up
    TurnStarted,
    /// Control left a player
    TurnEnded,
    /// The end-turn routine ran
    UnitEnded,
}

impl EventKind {
    /// Stable name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GameStarted => "game_started",
            Self::GameEnded => "game_ended",
            Self::RoundStarted => "round_started",
            Self::RoundEnded => "round_ended",
            Self::TurnStarted => "turn_started",
            Self::TurnEnded => "turn_ended",
            Self::UnitEnded => "unit_ended",
        }
    }
}

/// A lifecycle event, stamped with the match it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchEvent {
    /// What happened
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// The match that published the event
    #[serde(rename = "match_id")]
    pub source: MatchId,
    /// Round number at the time of the event
    pub round: u32,
    /// Player in control at the time of the event
    pub player: PlayerNumber,
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// Error a listener may report. It is logged and never propagated.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    /// Creates an error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<std::io::Error> for ListenerError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}

/// Receives lifecycle events.
pub trait MatchListener: Send {
    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Any error is logged by the observer list.
    fn on_event(&mut self, event: &MatchEvent) -> Result<(), ListenerError>;
}

impl<F> MatchListener for F
where
    F: FnMut(&MatchEvent) -> Result<(), ListenerError> + Send,
{
    fn on_event(&mut self, event: &MatchEvent) -> Result<(), ListenerError> {
        self(event)
    }
}

/// Handle returned by [`ObserverList::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered set of listeners with failure isolation.
#[derive(Default)]
pub struct ObserverList {
    listeners: Vec<(ListenerId, Box<dyn MatchListener>)>,
    next_id: u64,
}

impl std::fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl ObserverList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener at the end of the notification order.
    pub fn register(&mut self, listener: impl MatchListener + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Delivers `event` to every listener in registration order.
    ///
    /// Returns the number of listeners that failed or panicked.
    pub fn notify(&mut self, event: &MatchEvent) -> usize {
        let mut failures = 0;
        for (id, listener) in &mut self.listeners {
            match std::panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!(listener = id.0, event = event.kind.as_str(), error = %e, "listener failed");
                }
                Err(payload) => {
                    failures += 1;
                    warn!(
                        listener = id.0,
                        event = event.kind.as_str(),
                        panic = %panic_message(payload.as_ref()),
                        "listener panicked"
                    );
                }
            }
        }
        failures
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// JSONL event log
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Envelope<'a> {
    sequence: u64,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a MatchEvent,
}

/// Listener that appends each event to a JSONL stream.
pub struct EventLog {
    writer: BufWriter<Box<dyn Write + Send>>,
    sequence: u64,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl EventLog {
    /// Writes to `writer`.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: BufWriter::new(writer),
            sequence: 0,
        }
    }

    /// Writes to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Appends to the file at `path`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Events written so far.
    #[must_use]
    pub const fn event_count(&self) -> u64 {
        self.sequence
    }
}

impl MatchListener for EventLog {
    fn on_event(&mut self, event: &MatchEvent) -> Result<(), ListenerError> {
        let envelope = Envelope {
            sequence: self.sequence,
            timestamp: Utc::now(),
            event,
        };
        let line = serde_json::to_string(&envelope).map_err(|e| ListenerError::new(e.to_string()))?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        self.sequence += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
