// SPDX-License-Identifier: MIT
//
// Etikett agent binary.
//
// Reads job events as JSON lines on stdin, dispatches them through the
// job router, and mirrors status lines on stdout. Logs go to stderr so
// stdout stays a clean status channel.

use std::process::ExitCode;
use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use etikett_core::config::AgentConfig;
use etikett_core::error::Result;
use etikett_core::types::{Platform, PrintJob};
use etikett_print::{JobRouter, StatusEvent, StatusSink, SystemPrinterQuery};

/// Inbound job event, one JSON object per line.
#[derive(Debug, Deserialize)]
struct JobEvent {
    otn: String,
    url: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "etikett agent starting");

    if let Err(e) = run().await {
        error!("agent failed: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    };

    let (sink, status_rx) = StatusSink::channel();
    let mut router = JobRouter::new(
        &config,
        Platform::current(),
        Arc::new(SystemPrinterQuery::new()),
        sink,
    )?;

    let mirror_task = tokio::spawn(mirror_status(status_rx, std::io::stdout()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => handle_line(&router, &line).await,
                    Ok(None) => {
                        info!("input closed, shutting down");
                        break;
                    }
                    Err(e) => {
                        error!("reading input: {e}");
                        break;
                    }
                }
            }
        }
    }

    router.shutdown().await?;
    // The router holds the last status sender; dropping it closes the
    // channel so the mirror drains what is buffered and exits.
    drop(router);
    let _ = mirror_task.await;
    Ok(())
}

/// Forward status events to `out`, one line each, until every sender is
/// gone. Lines buffered at shutdown still reach the output.
async fn mirror_status(
    mut events: tokio::sync::mpsc::UnboundedReceiver<StatusEvent>,
    mut out: impl std::io::Write,
) {
    while let Some(event) = events.recv().await {
        let line = match event {
            StatusEvent::Line(line) => line,
            StatusEvent::UsbJobFinished => "USB job finished".to_string(),
        };
        if writeln!(out, "{line}").is_err() {
            break;
        }
    }
}

/// Parse one input line and hand the job to the router.
///
/// Blank lines are skipped; malformed events are logged and skipped so
/// one bad line never takes the agent down. Outcomes reach stdout via
/// the status mirror, so the inline return value is dropped here.
async fn handle_line(router: &JobRouter, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let event: JobEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            warn!("ignoring malformed job event: {e}");
            return;
        }
    };
    let job = PrintJob::from_event(event.otn, event.url);
    info!(job_id = %job.id, otn = %job.order_tracking_number, format = %job.format, "job received");
    let _ = router.submit(job).await;
}
