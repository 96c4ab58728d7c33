// SPDX-License-Identifier: MIT
//
// Agent configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Runtime settings for the dispatch agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Path to the raw ZPL print helper invoked on Windows.
    pub raw_print_helper: String,
    /// Path to the PDF print helper invoked on Windows.
    pub pdf_print_helper: String,
    /// OS print command used for PDF labels on CUPS platforms.
    pub cups_print_command: String,
    /// Poll interval of the USB dispatch queue, in milliseconds.
    pub usb_poll_interval_ms: u64,
    /// HTTP timeout for label fetches, in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            raw_print_helper: "rawprint.exe".into(),
            pdf_print_helper: "PDFtoPrinter.exe".into(),
            cups_print_command: "lp".into(),
            usb_poll_interval_ms: 2000,
            fetch_timeout_secs: 30,
        }
    }
}

impl AgentConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the defaults. A present but malformed file
    /// is an error, never a silent fallback to the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = match std::fs::read_to_string(path.as_ref()) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&data)?)
    }

    /// Persist configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }
}
