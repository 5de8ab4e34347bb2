//! Shared integration-test harness: runs the `skirmish` binary as a child
//! process, or plays fixture matches in-process with recorded events.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use skirmish::config::{ConfigLoader, assemble};
use skirmish::observability::{EventKind, ListenerError, MatchEvent};
use skirmish::round::{DelayedActionScheduler, MatchHandle, MatchReport, MatchRunner};
use tokio_util::sync::CancellationToken;

/// Upper bound for a whole fixture match.
pub const MATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Events recorded by a [`FixtureMatch`].
pub type Recorded = Arc<Mutex<Vec<MatchEvent>>>;

/// Helpers for invoking the compiled binary.
pub struct SkirmishProcess;

impl SkirmishProcess {
    /// Runs `skirmish <args>` to completion and returns its output.
    #[allow(clippy::missing_panics_doc)]
    pub fn spawn_command(args: &[&str]) -> Output {
        std::process::Command::new(env!("CARGO_BIN_EXE_skirmish"))
            .args(args)
            .env_remove("SKIRMISH_CONFIG")
            .env_remove("SKIRMISH_LOG_LEVEL")
            .output()
            .expect("failed to run skirmish binary")
    }

    /// Spawns `skirmish <args>` without waiting, for tests that stop it.
    #[allow(clippy::missing_panics_doc)]
    pub fn spawn_child(args: &[&str]) -> tokio::process::Child {
        tokio::process::Command::new(env!("CARGO_BIN_EXE_skirmish"))
            .args(args)
            .env_remove("SKIRMISH_CONFIG")
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .expect("failed to spawn skirmish binary")
    }

    /// Returns the path to a test fixture.
    #[must_use]
    pub fn fixture_path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }
}

/// A fixture match wired for in-process play.
pub struct FixtureMatch {
    pub runner: MatchRunner,
    pub handle: MatchHandle,
    pub cancel: CancellationToken,
    pub events: Recorded,
}

impl FixtureMatch {
    /// Loads `name` from the fixtures directory and builds its match.
    #[allow(clippy::missing_panics_doc)]
    #[must_use]
    pub fn load(name: &str) -> Self {
        Self::from_path(&SkirmishProcess::fixture_path(name))
    }

    #[allow(clippy::missing_panics_doc)]
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let config = ConfigLoader::with_defaults()
            .load(path)
            .expect("fixture should load")
            .config;

        let cancel = CancellationToken::new();
        let (handle, inbox) = MatchHandle::channel();
        let scheduler = DelayedActionScheduler::new(handle.clone(), cancel.child_token());

        let events: Recorded = Arc::default();
        let sink = Arc::clone(&events);
        let controller = assemble(&config, &handle, scheduler)
            .listener(move |event: &MatchEvent| -> Result<(), ListenerError> {
                sink.lock().unwrap().push(*event);
                Ok(())
            })
            .build()
            .expect("fixture should build");

        Self {
            runner: MatchRunner::new(controller, inbox, cancel.clone()),
            handle,
            cancel,
            events,
        }
    }

    /// Plays the match to its end under [`MATCH_TIMEOUT`].
    #[allow(clippy::missing_panics_doc)]
    pub async fn play(self) -> (MatchReport, Vec<MatchEvent>) {
        let report = tokio::time::timeout(MATCH_TIMEOUT, self.runner.run())
            .await
            .expect("match should finish in time")
            .expect("match should not abort");
        let events = self.events.lock().unwrap().clone();
        (report, events)
    }
}

/// Number of events of `kind`.
#[must_use]
pub fn count(events: &[MatchEvent], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}

/// Parses a JSONL events file.
#[allow(clippy::missing_panics_doc)]
#[must_use]
pub fn read_jsonl(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .expect("events file should exist")
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect()
}
