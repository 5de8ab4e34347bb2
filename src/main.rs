//! `skirmish` - headless turn-based match runner

use clap::Parser;
use tokio_util::sync::CancellationToken;

use skirmish::cli::args::{Cli, OutputFormat};
use skirmish::cli::commands;
use skirmish::error::ExitCode;
use skirmish::observability::{LogFormat, init_logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let format = match cli.log_format {
        OutputFormat::Human => LogFormat::Human,
        OutputFormat::Json => LogFormat::Json,
    };
    init_logging(format, cli.verbose, cli.quiet, cli.color);

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    match commands::dispatch(cli, cancel).await {
        Ok(()) => std::process::exit(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

/// First signal cancels the running match; a second one exits immediately.
async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            tracing::warn!("failed to register SIGTERM handler; only Ctrl+C is handled");
            ctrl_c_only(cancel).await;
            return;
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }

        eprintln!("\nShutting down gracefully... (press Ctrl+C again to force)");
        cancel.cancel();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => std::process::exit(ExitCode::INTERRUPTED),
            _ = sigterm.recv() => std::process::exit(ExitCode::TERMINATED),
        }
    }

    #[cfg(not(unix))]
    ctrl_c_only(cancel).await;
}

async fn ctrl_c_only(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("\nShutting down gracefully... (press Ctrl+C again to force)");
        cancel.cancel();
    }
    if tokio::signal::ctrl_c().await.is_ok() {
        std::process::exit(ExitCode::INTERRUPTED);
    }
}
