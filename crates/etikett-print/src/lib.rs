// SPDX-License-Identifier: MIT
//
// Etikett — Print dispatch pipeline.
//
// Takes inbound label jobs from intake to a terminal outcome: printer
// resolution, payload fetch and spooling, platform/format strategy
// dispatch, and the serialized USB path for macOS ZPL printing.

pub mod engine;
pub mod exec;
pub mod fetch;
pub mod report;
pub mod resolve;
pub mod router;
pub mod scheduler;
pub mod strategy;
pub mod system;
pub mod usb;

pub use engine::DispatchEngine;
pub use fetch::{LabelFetcher, LabelPayload};
pub use report::{StatusEvent, StatusSink};
pub use resolve::PrinterQuery;
pub use router::JobRouter;
pub use scheduler::{JobDispatcher, UsbScheduler};
pub use strategy::PrintStrategy;
pub use system::SystemPrinterQuery;
