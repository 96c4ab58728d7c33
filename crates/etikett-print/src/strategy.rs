// SPDX-License-Identifier: MIT
//
// Print strategies and the platform/format dispatch table.
//
// Each supported (platform, format) pair maps to exactly one strategy.
// The table is built once from configuration; a lookup miss means the
// combination has no print path and the job is rejected, never silently
// dropped.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use etikett_core::config::AgentConfig;
use etikett_core::error::Result;
use etikett_core::types::{LabelFormat, Platform, PrinterDescriptor};

use crate::exec::run_command;
use crate::usb::UsbStrategy;

/// One way of getting a spooled label onto paper.
///
/// Strategies consume the spool file, not the in-memory payload, so
/// helper processes and the USB path share one handoff shape. The
/// returned string becomes the success detail of the job's outcome.
#[async_trait]
pub trait PrintStrategy: Send + Sync {
    async fn execute(&self, spool_path: &Path, printer: &PrinterDescriptor) -> Result<String>;
}

/// Windows ZPL path: a helper binary that writes the file raw to a
/// named printer, bypassing the GDI driver.
pub struct RawHelperStrategy {
    helper: String,
}

impl RawHelperStrategy {
    pub fn new(helper: impl Into<String>) -> Self {
        Self {
            helper: helper.into(),
        }
    }
}

#[async_trait]
impl PrintStrategy for RawHelperStrategy {
    async fn execute(&self, spool_path: &Path, printer: &PrinterDescriptor) -> Result<String> {
        let args = [printer.name.clone(), spool_path.display().to_string()];
        Ok(run_command(&self.helper, &args).await?.stdout)
    }
}

/// Windows PDF path: a helper binary that prints a PDF to the default
/// printer without showing a dialog. The helper picks the printer
/// itself, so the resolved descriptor is not passed on.
pub struct PdfHelperStrategy {
    helper: String,
}

impl PdfHelperStrategy {
    pub fn new(helper: impl Into<String>) -> Self {
        Self {
            helper: helper.into(),
        }
    }
}

#[async_trait]
impl PrintStrategy for PdfHelperStrategy {
    async fn execute(&self, spool_path: &Path, _printer: &PrinterDescriptor) -> Result<String> {
        let args = [
            "-print-to-default".to_string(),
            "-silent".to_string(),
            spool_path.display().to_string(),
        ];
        Ok(run_command(&self.helper, &args).await?.stdout)
    }
}

/// macOS PDF path: hand the file to the OS print command addressed at
/// the resolved queue.
pub struct CupsStrategy {
    command: String,
}

impl CupsStrategy {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl PrintStrategy for CupsStrategy {
    async fn execute(&self, spool_path: &Path, printer: &PrinterDescriptor) -> Result<String> {
        let args = [
            "-d".to_string(),
            printer.name.clone(),
            spool_path.display().to_string(),
        ];
        Ok(run_command(&self.command, &args).await?.stdout)
    }
}

/// The full dispatch table.
pub struct StrategyTable {
    table: HashMap<(Platform, LabelFormat), Box<dyn PrintStrategy>>,
}

impl StrategyTable {
    pub fn new(config: &AgentConfig) -> Self {
        let mut table: HashMap<(Platform, LabelFormat), Box<dyn PrintStrategy>> = HashMap::new();
        table.insert(
            (Platform::Windows, LabelFormat::Zpl),
            Box::new(RawHelperStrategy::new(&config.raw_print_helper)),
        );
        table.insert(
            (Platform::Windows, LabelFormat::Pdf),
            Box::new(PdfHelperStrategy::new(&config.pdf_print_helper)),
        );
        table.insert(
            (Platform::MacOs, LabelFormat::Pdf),
            Box::new(CupsStrategy::new(&config.cups_print_command)),
        );
        table.insert(
            (Platform::MacOs, LabelFormat::Zpl),
            Box::new(UsbStrategy::new()),
        );
        Self { table }
    }

    pub fn lookup(&self, platform: Platform, format: LabelFormat) -> Option<&dyn PrintStrategy> {
        self.table.get(&(platform, format)).map(|s| s.as_ref())
    }
}
