// SPDX-License-Identifier: MIT
//
// Job intake and path selection.
//
// The router is the single entry point for inbound jobs: macOS ZPL
// goes through the serialized USB queue, everything else dispatches
// inline. Inline callers get their outcome back directly; queued jobs
// report through the status sink when their turn completes.

use std::sync::Arc;
use std::time::Duration;

use etikett_core::config::AgentConfig;
use etikett_core::error::Result;
use etikett_core::types::{DispatchOutcome, Platform, PrintJob};

use crate::engine::DispatchEngine;
use crate::report::StatusSink;
use crate::resolve::PrinterQuery;
use crate::scheduler::{JobDispatcher, UsbScheduler};

pub struct JobRouter {
    engine: Arc<DispatchEngine>,
    scheduler: UsbScheduler,
    sink: StatusSink,
}

impl JobRouter {
    /// Build the engine and start the USB scheduler.
    pub fn new(
        config: &AgentConfig,
        platform: Platform,
        printers: Arc<dyn PrinterQuery>,
        sink: StatusSink,
    ) -> Result<Self> {
        let engine = Arc::new(DispatchEngine::new(
            config,
            platform,
            printers,
            sink.clone(),
        )?);
        let mut scheduler =
            UsbScheduler::new(Duration::from_millis(config.usb_poll_interval_ms));
        let dispatcher: Arc<dyn JobDispatcher> = engine.clone();
        scheduler.start(dispatcher, sink.clone())?;
        Ok(Self {
            engine,
            scheduler,
            sink,
        })
    }

    /// Route one job.
    ///
    /// Returns the outcome for inline jobs, `None` for jobs accepted
    /// onto the USB queue. A job the queue refuses fails on the spot,
    /// with the same outcome reporting and completion signal a queued
    /// job would have produced.
    pub async fn submit(&self, job: PrintJob) -> Option<DispatchOutcome> {
        if self.engine.routes_to_usb(job.format) {
            let job_id = job.id;
            match self.scheduler.enqueue(job) {
                Ok(()) => None,
                Err(e) => {
                    let outcome =
                        DispatchOutcome::failure(job_id, e.dispatch_status(), e.to_string());
                    self.sink.outcome(&outcome);
                    // Rejected jobs never reach the poll loop, so the
                    // completion signal comes from here.
                    self.sink.usb_job_finished();
                    Some(outcome)
                }
            }
        } else {
            Some(self.engine.dispatch(&job).await)
        }
    }

    /// Stop the USB scheduler, letting an in-flight job finish.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.stop().await
    }
}
