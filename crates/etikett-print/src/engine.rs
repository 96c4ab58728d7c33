// SPDX-License-Identifier: MIT
//
// The dispatch engine: one job in, one outcome out.
//
// Pipeline order is fixed: resolve the default printer from a fresh
// list, fetch and spool the payload, then hand the spool file to the
// strategy for the platform/format pair. Every job ends in exactly one
// outcome, reported through the status sink; errors never escape as
// bare Results.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use etikett_core::config::AgentConfig;
use etikett_core::error::{EtikettError, Result};
use etikett_core::types::{DispatchOutcome, LabelFormat, Platform, PrintJob};

use crate::fetch::LabelFetcher;
use crate::report::StatusSink;
use crate::resolve::{PrinterQuery, find_default};
use crate::scheduler::JobDispatcher;
use crate::strategy::StrategyTable;

pub struct DispatchEngine {
    platform: Platform,
    printers: Arc<dyn PrinterQuery>,
    fetcher: LabelFetcher,
    strategies: StrategyTable,
    sink: StatusSink,
}

impl DispatchEngine {
    pub fn new(
        config: &AgentConfig,
        platform: Platform,
        printers: Arc<dyn PrinterQuery>,
        sink: StatusSink,
    ) -> Result<Self> {
        Ok(Self {
            platform,
            printers,
            fetcher: LabelFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?,
            strategies: StrategyTable::new(config),
            sink,
        })
    }

    /// Redirect spool files into `dir`.
    pub fn with_spool_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.fetcher = self.fetcher.with_spool_dir(dir);
        self
    }

    /// Whether jobs of `format` must go through the serialized USB path
    /// instead of being dispatched inline.
    pub fn routes_to_usb(&self, format: LabelFormat) -> bool {
        self.platform == Platform::MacOs && format == LabelFormat::Zpl
    }

    /// Run `job` to its terminal outcome.
    ///
    /// Infallible by construction: pipeline errors are folded into a
    /// failure outcome carrying the mapped status. The outcome is
    /// reported through the sink before it is returned.
    #[instrument(skip(self, job), fields(job_id = %job.id, otn = %job.order_tracking_number))]
    pub async fn dispatch(&self, job: &PrintJob) -> DispatchOutcome {
        let outcome = match self.run_pipeline(job).await {
            Ok(detail) => DispatchOutcome::success(job.id, detail),
            Err(e) => {
                warn!(status = ?e.dispatch_status(), "dispatch failed: {e}");
                DispatchOutcome::failure(job.id, e.dispatch_status(), e.to_string())
            }
        };
        self.sink.outcome(&outcome);
        outcome
    }

    async fn run_pipeline(&self, job: &PrintJob) -> Result<String> {
        // Listed fresh per job; yesterday's printer may be unplugged today.
        let printers = self.printers.list_printers().await?;
        let default = find_default(&printers)?;
        self.sink.line(format!(
            "Default printer used for printing: {}",
            default.display_name
        ));

        let payload = self.fetcher.fetch(job).await?;
        let spool_path = self.fetcher.persist(job, &payload).await?;

        let strategy = self
            .strategies
            .lookup(self.platform, job.format)
            .ok_or(EtikettError::Unsupported {
                platform: self.platform,
                format: job.format,
            })?;
        let detail = strategy.execute(&spool_path, default).await?;
        info!(printer = %default.name, format = %job.format, "label dispatched");
        Ok(detail)
    }
}

#[async_trait]
impl JobDispatcher for DispatchEngine {
    async fn dispatch_job(&self, job: PrintJob) {
        self.dispatch(&job).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{StatusEvent, StatusSink};
    use etikett_core::types::{DispatchStatus, PrinterDescriptor};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StubPrinterQuery {
        printers: Vec<PrinterDescriptor>,
    }

    #[async_trait]
    impl PrinterQuery for StubPrinterQuery {
        async fn list_printers(&self) -> Result<Vec<PrinterDescriptor>> {
            Ok(self.printers.clone())
        }
    }

    fn printer(name: &str, display_name: &str, is_default: bool) -> PrinterDescriptor {
        PrinterDescriptor {
            name: name.to_string(),
            display_name: display_name.to_string(),
            is_default,
            ..Default::default()
        }
    }

    fn engine_with(
        platform: Platform,
        printers: Vec<PrinterDescriptor>,
        config: &AgentConfig,
    ) -> (DispatchEngine, tokio::sync::mpsc::UnboundedReceiver<StatusEvent>) {
        let (sink, rx) = StatusSink::channel();
        let engine = DispatchEngine::new(
            config,
            platform,
            Arc::new(StubPrinterQuery { printers }),
            sink,
        )
        .expect("engine builds");
        (engine, rx)
    }

    #[tokio::test]
    async fn no_printers_short_circuits_before_any_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (engine, mut rx) = engine_with(Platform::Windows, vec![], &AgentConfig::default());
        let job = PrintJob::from_event("OTN1", format!("{}/label.zpl", server.uri()));

        let outcome = engine.dispatch(&job).await;
        assert_eq!(outcome.status, DispatchStatus::NoPrinters);
        assert_eq!(
            rx.recv().await,
            Some(StatusEvent::Line("No printers found on printing".into()))
        );
    }

    #[tokio::test]
    async fn a_list_without_a_default_is_its_own_failure() {
        let printers = vec![
            printer("a", "Printer A", false),
            printer("b", "Printer B", false),
        ];
        let (engine, mut rx) = engine_with(Platform::Windows, printers, &AgentConfig::default());
        let job = PrintJob::from_event("OTN2", "http://127.0.0.1:1/label.zpl");

        let outcome = engine.dispatch(&job).await;
        assert_eq!(outcome.status, DispatchStatus::NoDefaultPrinter);
        assert_eq!(
            rx.recv().await,
            Some(StatusEvent::Line("The default printer is not found".into()))
        );
    }

    #[tokio::test]
    async fn unsupported_platforms_reject_after_the_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("^XA^XZ"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let printers = vec![printer("q", "Queue", true)];
        let (engine, _rx) = engine_with(Platform::Other, printers, &AgentConfig::default());
        let engine = engine.with_spool_dir(dir.path());
        let job = PrintJob::from_event("OTN3", format!("{}/label.zpl", server.uri()));

        let outcome = engine.dispatch(&job).await;
        assert_eq!(outcome.status, DispatchStatus::UnsupportedPlatformFormat);
        assert_eq!(
            outcome.to_string(),
            "Printing failed: no print path for ZPL on this platform"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zpl_on_windows_goes_through_the_raw_helper() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("^XA^FDOTN123^FS^XZ"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let config = AgentConfig {
            raw_print_helper: "/bin/echo".to_string(),
            ..Default::default()
        };
        let printers = vec![
            printer("Office_Laser", "Office Laser", false),
            printer("Zebra-ZD420", "Zebra ZD420", true),
        ];
        let (engine, mut rx) = engine_with(Platform::Windows, printers, &config);
        let engine = engine.with_spool_dir(dir.path());
        let job = PrintJob::from_event("OTN123", format!("{}/labels/OTN123.zpl", server.uri()));

        let outcome = engine.dispatch(&job).await;
        assert_eq!(outcome.status, DispatchStatus::Success);

        // Helper argv order: printer name, then spool path.
        let (name, path) = outcome.detail.split_once(' ').expect("two echo args");
        assert_eq!(name, "Zebra-ZD420");
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .expect("spool file name");
        assert!(file_name.starts_with("OTN123-"), "got {file_name}");
        assert!(file_name.ends_with(".zpl"), "got {file_name}");
        assert_eq!(
            std::fs::read_to_string(path).expect("spool file"),
            "^XA^FDOTN123^FS^XZ"
        );

        assert_eq!(
            rx.recv().await,
            Some(StatusEvent::Line(
                "Default printer used for printing: Zebra ZD420".into()
            ))
        );
        assert_eq!(
            rx.recv().await,
            Some(StatusEvent::Line(format!(
                "Printing finished: {}",
                outcome.detail
            )))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn helper_failures_surface_as_exec_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("^XA^XZ"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let config = AgentConfig {
            raw_print_helper: "/bin/false".to_string(),
            ..Default::default()
        };
        let printers = vec![printer("q", "Queue", true)];
        let (engine, _rx) = engine_with(Platform::Windows, printers, &config);
        let engine = engine.with_spool_dir(dir.path());
        let job = PrintJob::from_event("OTN4", format!("{}/label.zpl", server.uri()));

        let outcome = engine.dispatch(&job).await;
        assert_eq!(outcome.status, DispatchStatus::ExecFailed);
        assert!(
            outcome.to_string().starts_with("Printing failed:"),
            "got {outcome}"
        );
    }

    #[tokio::test]
    async fn only_macos_zpl_routes_to_usb() {
        let (engine, _rx) = engine_with(Platform::MacOs, vec![], &AgentConfig::default());
        assert!(engine.routes_to_usb(LabelFormat::Zpl));
        assert!(!engine.routes_to_usb(LabelFormat::Pdf));

        let (engine, _rx) = engine_with(Platform::Windows, vec![], &AgentConfig::default());
        assert!(!engine.routes_to_usb(LabelFormat::Zpl));
    }
}
