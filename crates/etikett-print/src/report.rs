// SPDX-License-Identifier: MIT
//
// Outbound status reporting.
//
// Status lines and the USB completion signal are fire-and-forget: job
// processing never blocks on the caller keeping up. Events lost because
// the receiver hung up bump a counter so tests and diagnostics can see
// them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::debug;

use etikett_core::types::DispatchOutcome;

/// A message on the outbound status channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Human-readable progress or outcome line.
    Line(String),
    /// Emitted exactly once per USB-path job, success or failure.
    UsbJobFinished,
}

/// Fire-and-forget sender half of the status channel.
#[derive(Clone)]
pub struct StatusSink {
    tx: mpsc::UnboundedSender<StatusEvent>,
    dropped: Arc<AtomicU64>,
}

impl StatusSink {
    /// Build a sink and its receiving half.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Send a status line.
    pub fn line(&self, line: impl Into<String>) {
        self.send(StatusEvent::Line(line.into()));
    }

    /// Report the outcome of a finished job as its status line.
    pub fn outcome(&self, outcome: &DispatchOutcome) {
        self.line(outcome.to_string());
    }

    /// Signal that a USB-path job reached its terminal state.
    pub fn usb_job_finished(&self) {
        self.send(StatusEvent::UsbJobFinished);
    }

    fn send(&self, event: StatusEvent) {
        if self.tx.send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("status receiver gone; event dropped");
        }
    }

    /// Number of events lost because the receiver was closed.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
