// SPDX-License-Identifier: MIT
//
// Core domain types for the Etikett label dispatcher.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload format of a shipping label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabelFormat {
    /// Raw ZPL text, consumed directly by thermal printers.
    Zpl,
    /// Rendered PDF document.
    Pdf,
}

impl LabelFormat {
    /// Classify a label URL by suffix.
    ///
    /// A case-sensitive `.zpl` substring anywhere in the URL selects ZPL;
    /// everything else is treated as PDF. This mirrors the backend contract
    /// (label URLs carry the format in the path). A URL embedding `.zpl` in
    /// a query parameter while serving PDF would be misclassified; known
    /// risk, kept as explicit policy rather than content-type sniffing.
    pub fn classify(url: &str) -> Self {
        if url.contains(".zpl") {
            Self::Zpl
        } else {
            Self::Pdf
        }
    }

    /// File extension used for the spool file.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zpl => "zpl",
            Self::Pdf => "pdf",
        }
    }
}

impl std::fmt::Display for LabelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zpl => write!(f, "ZPL"),
            Self::Pdf => write!(f, "PDF"),
        }
    }
}

/// Host platform, as far as print dispatch is concerned.
///
/// `Other` covers hosts with no implemented print path; jobs arriving there
/// are rejected with an outcome instead of being dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Windows,
    MacOs,
    Other,
}

impl Platform {
    /// The platform this process is running on.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Other
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Windows => write!(f, "Windows"),
            Self::MacOs => write!(f, "macOS"),
            Self::Other => write!(f, "this platform"),
        }
    }
}

/// A shipping-label print job.
///
/// Immutable after creation; consumed exactly once by the dispatch engine
/// and discarded after its terminal outcome is reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: JobId,
    /// Order tracking number, stamped into spool file names and log lines.
    pub order_tracking_number: String,
    /// Where the label payload is fetched from.
    pub source_url: String,
    pub format: LabelFormat,
    pub received_at: DateTime<Utc>,
}

impl PrintJob {
    /// Build a job from an inbound `{otn, url}` event.
    ///
    /// The format is derived from the URL, never carried separately.
    pub fn from_event(otn: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: JobId::new(),
            order_tracking_number: otn.into(),
            format: LabelFormat::classify(&url),
            source_url: url,
            received_at: Utc::now(),
        }
    }
}

/// A printer as reported by the OS print subsystem.
///
/// Always queried fresh per job; printer availability is volatile
/// (devices unplug, queues appear and disappear), so descriptors are
/// never cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrinterDescriptor {
    /// Queue name used when submitting jobs.
    pub name: String,
    /// Human-readable name shown in OS dialogs.
    pub display_name: String,
    pub description: String,
    pub is_default: bool,
    /// Raw driver options (`device-uri` etc.) as reported by the OS.
    pub options: HashMap<String, String>,
}

/// Terminal status of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchStatus {
    Success,
    /// The OS reported no printers at all.
    NoPrinters,
    /// Printers exist but none is flagged as the default.
    NoDefaultPrinter,
    /// HTTP error or non-success status while fetching the label.
    FetchFailed,
    /// A helper process or print command failed.
    ExecFailed,
    /// No print path exists for this platform/format combination.
    UnsupportedPlatformFormat,
    /// No connected USB device matched the printer descriptor.
    NoDeviceFound,
    /// The USB transfer ladder failed after a device was matched.
    UsbProtocolError,
}

/// Outcome of one dispatch, produced exactly once per job.
///
/// Never retried automatically; the caller may resubmit a logically-new
/// job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub job_id: JobId,
    pub status: DispatchStatus,
    /// Helper stdout on success, error detail on failure.
    pub detail: String,
}

impl DispatchOutcome {
    pub fn success(job_id: JobId, detail: impl Into<String>) -> Self {
        Self {
            job_id,
            status: DispatchStatus::Success,
            detail: detail.into(),
        }
    }

    pub fn failure(job_id: JobId, status: DispatchStatus, detail: impl Into<String>) -> Self {
        Self {
            job_id,
            status,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DispatchStatus::Success
    }
}

/// The human-readable status line reported back over the status channel.
impl std::fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            DispatchStatus::Success => {
                if self.detail.is_empty() {
                    write!(f, "Printing finished")
                } else {
                    write!(f, "Printing finished: {}", self.detail)
                }
            }
            DispatchStatus::NoPrinters => write!(f, "No printers found on printing"),
            DispatchStatus::NoDefaultPrinter => write!(f, "The default printer is not found"),
            _ => write!(f, "Printing failed: {}", self.detail),
        }
    }
}
