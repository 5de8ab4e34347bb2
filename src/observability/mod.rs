//! Observability module
//!
//! Logging, metrics, and the lifecycle event stream of a match.

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{
    EventKind, EventLog, ListenerError, ListenerId, MatchEvent, MatchListener, ObserverList,
};
pub use logging::{LogFormat, init_logging};
pub use metrics::init_metrics;
