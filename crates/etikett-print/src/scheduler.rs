// SPDX-License-Identifier: MIT
//
// Serialized scheduling for the USB print path.
//
// A label printer's bulk endpoint handles one stream at a time, so USB
// jobs never run concurrently: they queue in arrival order and a poll
// loop starts the next one only after the previous one reported back.
// Inline dispatch paths do not pass through here. The queue is unbounded
// and there is no watchdog: a dispatch that never returns holds the
// slot, and a producer outpacing the poll cadence grows the queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use etikett_core::error::{EtikettError, Result};
use etikett_core::types::PrintJob;

use crate::report::StatusSink;

/// Something that runs one job to its terminal outcome.
///
/// Outcome reporting happens inside the implementation; the scheduler
/// only cares that the call returning means the job is finished.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch_job(&self, job: PrintJob);
}

/// Owns the USB queue and its poll loop.
///
/// Jobs enqueued before `start` are buffered and dispatched once the
/// loop runs; jobs enqueued after `stop` are never dispatched.
pub struct UsbScheduler {
    poll_interval: Duration,
    intake_tx: mpsc::UnboundedSender<PrintJob>,
    intake_rx: Option<mpsc::UnboundedReceiver<PrintJob>>,
    shutdown: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
}

impl UsbScheduler {
    pub fn new(poll_interval: Duration) -> Self {
        let (intake_tx, intake_rx) = mpsc::unbounded_channel();
        Self {
            // tokio's interval panics on a zero period; a configured 0
            // means the smallest cadence.
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            intake_tx,
            intake_rx: Some(intake_rx),
            shutdown: Arc::new(Notify::new()),
            task_handle: None,
        }
    }

    /// Hand a job to the queue. Returns immediately; the job runs when
    /// its turn comes.
    pub fn enqueue(&self, job: PrintJob) -> Result<()> {
        self.intake_tx
            .send(job)
            .map_err(|e| EtikettError::Scheduler(format!("intake closed: {e}")))?;
        Ok(())
    }

    /// Spawn the poll loop. Fails if called twice.
    pub fn start(&mut self, dispatcher: Arc<dyn JobDispatcher>, sink: StatusSink) -> Result<()> {
        let intake = self
            .intake_rx
            .take()
            .ok_or_else(|| EtikettError::Scheduler("scheduler already started".into()))?;
        let shutdown = Arc::clone(&self.shutdown);
        let poll_interval = self.poll_interval;
        info!(poll_ms = poll_interval.as_millis() as u64, "USB scheduler started");
        self.task_handle = Some(tokio::spawn(poll_loop(
            intake,
            shutdown,
            poll_interval,
            dispatcher,
            sink,
        )));
        Ok(())
    }

    /// Stop the poll loop.
    ///
    /// A job already on the wire is allowed to finish first; jobs still
    /// queued are abandoned and logged.
    pub async fn stop(&mut self) -> Result<()> {
        self.shutdown.notify_one();
        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| EtikettError::Scheduler(format!("poll loop join: {e}")))?;
        }
        info!("USB scheduler stopped");
        Ok(())
    }
}

/// Reports a dispatched job as finished when dropped.
///
/// A panic in the dispatcher unwinds through the spawned task and still
/// drops the guard, so the completion signal and the done notification
/// reach the poll loop on every terminal path.
struct CompletionGuard {
    sink: StatusSink,
    done: mpsc::UnboundedSender<()>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.sink.usb_job_finished();
        let _ = self.done.send(());
    }
}

async fn poll_loop(
    mut intake: mpsc::UnboundedReceiver<PrintJob>,
    shutdown: Arc<Notify>,
    poll_interval: Duration,
    dispatcher: Arc<dyn JobDispatcher>,
    sink: StatusSink,
) {
    let mut pending: VecDeque<PrintJob> = VecDeque::new();
    let mut in_flight = false;
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
    let mut ticker = tokio::time::interval(poll_interval);

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                if in_flight {
                    // A half-streamed label wedges the printer; let the
                    // job on the wire finish.
                    let _ = done_rx.recv().await;
                }
                if !pending.is_empty() {
                    warn!(abandoned = pending.len(), "USB queue dropped on shutdown");
                }
                break;
            }
            Some(job) = intake.recv() => {
                debug!(job_id = %job.id, queued = pending.len() + 1, "USB job queued");
                pending.push_back(job);
            }
            Some(()) = done_rx.recv() => {
                in_flight = false;
            }
            _ = ticker.tick() => {
                if !in_flight {
                    if let Some(job) = pending.pop_front() {
                        in_flight = true;
                        let waited_ms = (chrono::Utc::now() - job.received_at).num_milliseconds();
                        debug!(job_id = %job.id, waited_ms, "USB job dequeued");
                        let dispatcher = Arc::clone(&dispatcher);
                        let guard = CompletionGuard {
                            sink: sink.clone(),
                            done: done_tx.clone(),
                        };
                        tokio::spawn(async move {
                            // Exactly one completion signal per USB job;
                            // the guard fires it even if dispatch panics.
                            let _guard = guard;
                            dispatcher.dispatch_job(job).await;
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::StatusEvent;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct RecordingDispatcher {
        delay: Duration,
        active: AtomicU32,
        max_active: AtomicU32,
        started: AtomicU32,
        completed: AtomicU32,
        order: Mutex<Vec<String>>,
    }

    impl RecordingDispatcher {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                active: AtomicU32::new(0),
                max_active: AtomicU32::new(0),
                started: AtomicU32::new(0),
                completed: AtomicU32::new(0),
                order: Mutex::new(Vec::new()),
            }
        }

        fn max_active(&self) -> u32 {
            self.max_active.load(Ordering::SeqCst)
        }

        fn started(&self) -> u32 {
            self.started.load(Ordering::SeqCst)
        }

        fn completed(&self) -> u32 {
            self.completed.load(Ordering::SeqCst)
        }

        fn order(&self) -> Vec<String> {
            self.order.lock().expect("order lock").clone()
        }
    }

    #[async_trait]
    impl JobDispatcher for RecordingDispatcher {
        async fn dispatch_job(&self, job: PrintJob) {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.order
                .lock()
                .expect("order lock")
                .push(job.order_tracking_number);
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn job(otn: &str) -> PrintJob {
        PrintJob::from_event(otn, "https://labels.example.com/label.zpl")
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_run_one_at_a_time_in_arrival_order() {
        let dispatcher = Arc::new(RecordingDispatcher::new(Duration::from_millis(500)));
        let (sink, mut rx) = StatusSink::channel();
        let mut scheduler = UsbScheduler::new(Duration::from_millis(100));
        scheduler.start(dispatcher.clone(), sink).expect("start");

        for otn in ["OTN1", "OTN2", "OTN3"] {
            scheduler.enqueue(job(otn)).expect("enqueue");
        }

        // Three 500ms jobs plus poll gaps fit well inside 5s of virtual
        // time.
        tokio::time::sleep(Duration::from_secs(5)).await;
        scheduler.stop().await.expect("stop");

        assert_eq!(dispatcher.max_active(), 1, "jobs overlapped");
        assert_eq!(dispatcher.order(), vec!["OTN1", "OTN2", "OTN3"]);

        let mut finished = 0;
        while let Ok(event) = rx.try_recv() {
            if event == StatusEvent::UsbJobFinished {
                finished += 1;
            }
        }
        assert_eq!(finished, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_enqueued_before_start_are_not_lost() {
        let dispatcher = Arc::new(RecordingDispatcher::new(Duration::from_millis(50)));
        let (sink, _rx) = StatusSink::channel();
        let mut scheduler = UsbScheduler::new(Duration::from_millis(100));
        scheduler.enqueue(job("OTN1")).expect("enqueue");
        scheduler.start(dispatcher.clone(), sink).expect("start");

        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.stop().await.expect("stop");

        assert_eq!(dispatcher.completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_finishes_the_job_on_the_wire() {
        let dispatcher = Arc::new(RecordingDispatcher::new(Duration::from_secs(2)));
        let (sink, _rx) = StatusSink::channel();
        let mut scheduler = UsbScheduler::new(Duration::from_millis(100));
        scheduler.start(dispatcher.clone(), sink).expect("start");

        scheduler.enqueue(job("OTN1")).expect("enqueue");
        // Give the poll loop time to pick the job up.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(dispatcher.started(), 1);
        assert_eq!(dispatcher.completed(), 0);

        scheduler.stop().await.expect("stop");
        assert_eq!(dispatcher.completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_abandons_jobs_still_queued() {
        let dispatcher = Arc::new(RecordingDispatcher::new(Duration::from_secs(10)));
        let (sink, _rx) = StatusSink::channel();
        let mut scheduler = UsbScheduler::new(Duration::from_millis(100));
        scheduler.start(dispatcher.clone(), sink).expect("start");

        for otn in ["OTN1", "OTN2", "OTN3"] {
            scheduler.enqueue(job(otn)).expect("enqueue");
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        scheduler.stop().await.expect("stop");

        assert_eq!(dispatcher.completed(), 1);
        assert_eq!(dispatcher.order(), vec!["OTN1"]);
    }

    struct PanickingDispatcher {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl JobDispatcher for PanickingDispatcher {
        async fn dispatch_job(&self, job: PrintJob) {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            panic!("driver crashed on {}", job.order_tracking_number);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_dispatch_frees_the_slot() {
        let dispatcher = Arc::new(PanickingDispatcher {
            attempts: AtomicU32::new(0),
        });
        let (sink, mut rx) = StatusSink::channel();
        let mut scheduler = UsbScheduler::new(Duration::from_millis(100));
        scheduler.start(dispatcher.clone(), sink).expect("start");

        scheduler.enqueue(job("OTN1")).expect("enqueue");
        scheduler.enqueue(job("OTN2")).expect("enqueue");

        tokio::time::sleep(Duration::from_secs(2)).await;
        scheduler.stop().await.expect("stop");

        assert_eq!(
            dispatcher.attempts.load(Ordering::SeqCst),
            2,
            "second job never ran after the first panicked"
        );

        let mut finished = 0;
        while let Ok(event) = rx.try_recv() {
            if event == StatusEvent::UsbJobFinished {
                finished += 1;
            }
        }
        assert_eq!(finished, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_poll_interval_still_dispatches() {
        let dispatcher = Arc::new(RecordingDispatcher::new(Duration::from_millis(10)));
        let (sink, _rx) = StatusSink::channel();
        let mut scheduler = UsbScheduler::new(Duration::ZERO);
        scheduler.start(dispatcher.clone(), sink).expect("start");

        scheduler.enqueue(job("OTN1")).expect("enqueue");
        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.stop().await.expect("stop");

        assert_eq!(dispatcher.completed(), 1);
    }

    #[tokio::test]
    async fn starting_twice_is_an_error() {
        let dispatcher: Arc<dyn JobDispatcher> =
            Arc::new(RecordingDispatcher::new(Duration::ZERO));
        let (sink, _rx) = StatusSink::channel();
        let mut scheduler = UsbScheduler::new(Duration::from_millis(100));
        scheduler
            .start(Arc::clone(&dispatcher), sink.clone())
            .expect("first start");
        assert!(scheduler.start(dispatcher, sink).is_err());
        scheduler.stop().await.expect("stop");
    }
}
