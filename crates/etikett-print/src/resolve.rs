// SPDX-License-Identifier: MIT
//
// Printer resolution and USB device matching.
//
// Resolution picks the system default printer out of a freshly listed
// set; matching ties that printer to a connected USB device. The match
// rules run strictly in priority order and each rule scans every device
// before the next rule is tried.

use async_trait::async_trait;
use tracing::debug;

use etikett_core::error::{EtikettError, Result};
use etikett_core::types::PrinterDescriptor;

/// Option key under which CUPS records a printer's device URI.
pub const DEVICE_URI_OPTION: &str = "device-uri";

/// Source of the system printer list.
///
/// Implementations query the operating system; tests substitute canned
/// sets. The list is taken fresh for every job so hot-plugged printers
/// are visible without a restart.
#[async_trait]
pub trait PrinterQuery: Send + Sync {
    async fn list_printers(&self) -> Result<Vec<PrinterDescriptor>>;
}

/// Pick the default printer from a listed set.
pub fn find_default(printers: &[PrinterDescriptor]) -> Result<&PrinterDescriptor> {
    if printers.is_empty() {
        return Err(EtikettError::NoPrinters);
    }
    printers
        .iter()
        .find(|p| p.is_default)
        .ok_or(EtikettError::NoDefaultPrinter)
}

/// What a connected USB device reports about itself.
#[derive(Debug, Clone, Default)]
pub struct UsbDeviceSummary {
    pub product: Option<String>,
    pub serial: Option<String>,
    pub manufacturer: Option<String>,
}

/// Find the device backing `printer`, by priority:
///
/// 1. device serial number appears in the printer's device URI
/// 2. device product string appears in the printer's display name
/// 3. device product string appears in the printer's description
///
/// Each rule is checked against every device before falling through to
/// the next, so a serial match on the last device beats a product match
/// on the first. Empty identity strings never match.
pub fn match_device(
    printer: &PrinterDescriptor,
    devices: &[UsbDeviceSummary],
) -> Option<usize> {
    let device_uri = printer
        .options
        .get(DEVICE_URI_OPTION)
        .map(String::as_str)
        .unwrap_or("");

    for (idx, device) in devices.iter().enumerate() {
        if let Some(serial) = device.serial.as_deref() {
            if !serial.is_empty() && device_uri.contains(serial) {
                debug!(rule = "serial-in-device-uri", index = idx, "matched USB device");
                return Some(idx);
            }
        }
    }

    for (idx, device) in devices.iter().enumerate() {
        if let Some(product) = device.product.as_deref() {
            if !product.is_empty() && printer.display_name.contains(product) {
                debug!(rule = "product-in-display-name", index = idx, "matched USB device");
                return Some(idx);
            }
        }
    }

    for (idx, device) in devices.iter().enumerate() {
        if let Some(product) = device.product.as_deref() {
            if !product.is_empty() && printer.description.contains(product) {
                debug!(rule = "product-in-description", index = idx, "matched USB device");
                return Some(idx);
            }
        }
    }

    None
}
