//! `run` command handler.
//!
//! Loads a match file and plays headless matches until one asks the host
//! to exit, `--max-matches` is reached, or a shutdown signal arrives.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::args::RunArgs;
use crate::config::{ConfigLoader, MatchConfig, assemble};
use crate::error::SkirmishError;
use crate::observability::{EventLog, ListenerError, MatchEvent, MatchListener, init_metrics};
use crate::round::{
    DelayedActionScheduler, MatchExit, MatchHandle, MatchReport, MatchRunner, Timing,
};

/// Play matches from the configuration file.
///
/// # Errors
///
/// Returns a usage error without `--config`, a config error if loading
/// fails, a phase error if a match aborts, or `Interrupted` on cancellation.
pub async fn run(args: &RunArgs, cancel: CancellationToken) -> Result<(), SkirmishError> {
    let Some(path) = args.config.as_deref() else {
        return Err(SkirmishError::Usage(
            "--config (or SKIRMISH_CONFIG) is required".to_string(),
        ));
    };

    if let Some(port) = args.metrics_port {
        init_metrics(Some(port))?;
        info!(port, "Prometheus metrics endpoint started");
    }

    info!(config = %path.display(), "loading configuration");
    let load_result = ConfigLoader::with_defaults().load(path)?;
    for warning in &load_result.warnings {
        warn!(
            location = warning.location.as_deref().unwrap_or("<unknown>"),
            "{}",
            warning.message
        );
    }
    let config = load_result.config;

    let events = match args.events_file.as_deref() {
        Some(p) if p == Path::new("-") => Some(SharedEventLog::new(EventLog::stdout())),
        Some(p) => Some(SharedEventLog::new(EventLog::from_file(p)?)),
        None => None,
    };

    for number in 1..=args.max_matches {
        info!(name = %config.meta.name, number, "starting match");
        let report = play(&config, args.instant, events.clone(), &cancel).await?;

        match report.exit {
            MatchExit::Cancelled => return Err(SkirmishError::Interrupted),
            MatchExit::Exit => break,
            MatchExit::Restart if number == args.max_matches => {
                info!(max_matches = args.max_matches, "match limit reached; not restarting");
            }
            MatchExit::Restart => info!("restarting with a fresh match"),
        }
    }

    Ok(())
}

/// Plays one match to completion.
async fn play(
    config: &MatchConfig,
    instant: bool,
    events: Option<SharedEventLog>,
    cancel: &CancellationToken,
) -> Result<MatchReport, SkirmishError> {
    let (handle, inbox) = MatchHandle::channel();
    let match_cancel = cancel.child_token();
    let scheduler = DelayedActionScheduler::new(handle.clone(), match_cancel.child_token());

    let mut builder = assemble(config, &handle, scheduler);
    if instant {
        builder = builder.timing(Timing::instant());
    }
    if let Some(events) = events {
        builder = builder.listener(events);
    }
    let controller = builder.build()?;

    // the runner owns the inbox; the handle lives on in collaborators
    drop(handle);
    let report = MatchRunner::new(controller, inbox, match_cancel).run().await?;
    Ok(report)
}

/// One event log shared by every match of a run, so sequence numbers keep
/// increasing across restarts.
#[derive(Clone)]
struct SharedEventLog(Arc<Mutex<EventLog>>);

impl SharedEventLog {
    fn new(log: EventLog) -> Self {
        Self(Arc::new(Mutex::new(log)))
    }
}

impl MatchListener for SharedEventLog {
    fn on_event(&mut self, event: &MatchEvent) -> Result<(), ListenerError> {
        let mut log = self
            .0
            .lock()
            .map_err(|_| ListenerError::new("event log poisoned"))?;
        log.on_event(event)
    }
}
