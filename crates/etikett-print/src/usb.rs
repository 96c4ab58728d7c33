// SPDX-License-Identifier: MIT
//
// Direct USB label transfer.
//
// macOS has no raw-print helper, so ZPL is streamed straight to the
// printer's bulk OUT endpoint. The transfer walks an explicit phase
// ladder so logs show exactly how far a failed job got, and every run
// that opens a device ends in Closed, success or not.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use etikett_core::error::{EtikettError, Result};
use etikett_core::types::PrinterDescriptor;

use crate::resolve::{UsbDeviceSummary, match_device};
use crate::strategy::PrintStrategy;

/// Configuration value selected before claiming the interface. Label
/// printers expose a single configuration.
const CONFIGURATION_VALUE: u8 = 1;

/// Standard GET_STATUS request, issued after a failed transfer to bring
/// the device back to a known control state before closing.
#[cfg(not(target_os = "windows"))]
const REQUEST_GET_STATUS: u8 = 0x00;

/// Where a USB transfer currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Idle,
    DeviceSearch,
    Opened,
    ConfigurationSelected,
    InterfaceClaimed,
    Transferring,
    Closed,
}

/// One payload transfer to one matched device.
///
/// Single use: build, `run`, discard.
pub struct UsbTransfer {
    phase: TransferPhase,
}

impl UsbTransfer {
    pub fn new() -> Self {
        Self {
            phase: TransferPhase::Idle,
        }
    }

    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    fn advance(&mut self, phase: TransferPhase) {
        debug!(from = ?self.phase, to = ?phase, "transfer phase");
        self.phase = phase;
    }

    /// Stream `payload` to the device backing `printer`.
    ///
    /// Once a device is opened there is a single exit: any later failure
    /// first probes the device back to a known state, then the handle is
    /// dropped, which releases the interface and closes the device.
    pub async fn run(&mut self, printer: &PrinterDescriptor, payload: &[u8]) -> Result<String> {
        self.advance(TransferPhase::DeviceSearch);
        let info = find_matching_device(printer)?;
        let device = info
            .open()
            .map_err(|e| EtikettError::UsbProtocol(format!("open device: {e}")))?;
        self.advance(TransferPhase::Opened);

        let result = self.stream_payload(&device, payload).await;
        if result.is_err() {
            recover_device(&device).await;
        }
        self.advance(TransferPhase::Closed);
        result
    }

    async fn stream_payload(&mut self, device: &nusb::Device, payload: &[u8]) -> Result<String> {
        device
            .set_configuration(CONFIGURATION_VALUE)
            .map_err(|e| {
                EtikettError::UsbProtocol(format!(
                    "select configuration {CONFIGURATION_VALUE}: {e}"
                ))
            })?;
        let configuration = device
            .active_configuration()
            .map_err(|e| EtikettError::UsbProtocol(format!("read active configuration: {e}")))?;
        self.advance(TransferPhase::ConfigurationSelected);

        let Some(group) = configuration.interfaces().next() else {
            return Err(EtikettError::UsbProtocol(
                "device exposes no interfaces".into(),
            ));
        };
        let interface_number = group.interface_number();
        // Only the address leaves the closure; the descriptor borrows
        // the alternate setting.
        let endpoint = group.alt_settings().next().and_then(|setting| {
            setting
                .endpoints()
                .find(|endpoint| endpoint.direction() == nusb::transfer::Direction::Out)
                .map(|endpoint| endpoint.address())
        });

        let interface = device
            .claim_interface(interface_number)
            .map_err(|e| {
                EtikettError::UsbProtocol(format!("claim interface {interface_number}: {e}"))
            })?;
        self.advance(TransferPhase::InterfaceClaimed);

        let Some(endpoint) = endpoint else {
            return Err(EtikettError::UsbProtocol(format!(
                "no OUT endpoint on interface {interface_number}"
            )));
        };

        self.advance(TransferPhase::Transferring);
        let completion = interface.bulk_out(endpoint, payload.to_vec()).await;
        let buffer = completion
            .into_result()
            .map_err(|e| EtikettError::UsbProtocol(format!("bulk transfer: {e}")))?;
        let written = buffer.actual_length();
        info!(bytes = written, endpoint, "payload streamed to device");
        Ok(format!("{written} bytes sent over USB"))
    }
}

impl Default for UsbTransfer {
    fn default() -> Self {
        Self::new()
    }
}

/// Enumerate connected devices and pick the one backing `printer`.
fn find_matching_device(printer: &PrinterDescriptor) -> Result<nusb::DeviceInfo> {
    let mut devices: Vec<nusb::DeviceInfo> = nusb::list_devices()
        .map_err(|e| EtikettError::UsbProtocol(format!("list USB devices: {e}")))?
        .collect();
    let summaries: Vec<UsbDeviceSummary> = devices.iter().map(device_summary).collect();
    debug!(devices = summaries.len(), "enumerated USB devices");

    let Some(index) = match_device(printer, &summaries) else {
        return Err(EtikettError::NoDeviceFound(printer.display_name.clone()));
    };
    Ok(devices.swap_remove(index))
}

fn device_summary(info: &nusb::DeviceInfo) -> UsbDeviceSummary {
    UsbDeviceSummary {
        product: info.product_string().map(str::to_string),
        serial: info.serial_number().map(str::to_string),
        manufacturer: info.manufacturer_string().map(str::to_string),
    }
}

/// Probe the device with a standard GET_STATUS after a failed transfer.
///
/// The reply is irrelevant; completing any control round-trip clears a
/// wedged control pipe on most label printers. Failures here are logged
/// and swallowed, the job already has its error.
async fn recover_device(device: &nusb::Device) {
    #[cfg(not(target_os = "windows"))]
    {
        use nusb::transfer::{ControlIn, ControlType, Recipient};
        use tracing::warn;

        let completion = device
            .control_in(ControlIn {
                control_type: ControlType::Standard,
                recipient: Recipient::Device,
                request: REQUEST_GET_STATUS,
                value: 0,
                index: 0,
                length: 2,
            })
            .await;
        if let Err(e) = completion.into_result() {
            warn!("device status probe after failed transfer: {e}");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // Device-level control transfers are unavailable here; dropping
        // the handle is the only recovery step taken.
        let _ = device;
    }
}

/// Print strategy that streams the spool file over USB.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsbStrategy;

impl UsbStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PrintStrategy for UsbStrategy {
    async fn execute(&self, spool_path: &Path, printer: &PrinterDescriptor) -> Result<String> {
        let payload = tokio::fs::read(spool_path)
            .await
            .map_err(|e| EtikettError::UsbProtocol(format!("read spool file: {e}")))?;
        let mut transfer = UsbTransfer::new();
        transfer.run(printer, &payload).await
    }
}
