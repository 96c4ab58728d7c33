// SPDX-License-Identifier: MIT
//
// Unified error types for Etikett.

use thiserror::Error;

use crate::types::{DispatchStatus, LabelFormat, Platform};

/// Top-level error type for all Etikett operations.
#[derive(Debug, Error)]
pub enum EtikettError {
    // -- Printer resolution --
    #[error("printer query failed: {0}")]
    PrinterQuery(String),

    #[error("no printers found")]
    NoPrinters,

    #[error("no default printer")]
    NoDefaultPrinter,

    // -- Label fetching --
    #[error("label fetch failed: {0}")]
    Fetch(String),

    // -- Dispatch --
    #[error("print command failed: {0}")]
    Exec(String),

    #[error("no print path for {format} on {platform}")]
    Unsupported {
        platform: Platform,
        format: LabelFormat,
    },

    // -- USB transport --
    #[error("no matching USB device: {0}")]
    NoDeviceFound(String),

    #[error("USB protocol error: {0}")]
    UsbProtocol(String),

    #[error("USB scheduler error: {0}")]
    Scheduler(String),

    // -- Ambient --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EtikettError {
    /// The outcome status a job failing with this error reports.
    ///
    /// Variants without a 1:1 status map to the nearest reported cause: a
    /// printer-query failure means no usable printer list, spool-file I/O
    /// happens as part of the fetch step, and scheduler failures only
    /// surface on the USB path.
    pub fn dispatch_status(&self) -> DispatchStatus {
        match self {
            Self::NoPrinters | Self::PrinterQuery(_) => DispatchStatus::NoPrinters,
            Self::NoDefaultPrinter => DispatchStatus::NoDefaultPrinter,
            Self::Fetch(_) | Self::Io(_) => DispatchStatus::FetchFailed,
            Self::Exec(_) | Self::Serialization(_) => DispatchStatus::ExecFailed,
            Self::Unsupported { .. } => DispatchStatus::UnsupportedPlatformFormat,
            Self::NoDeviceFound(_) => DispatchStatus::NoDeviceFound,
            Self::UsbProtocol(_) | Self::Scheduler(_) => DispatchStatus::UsbProtocolError,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EtikettError>;
