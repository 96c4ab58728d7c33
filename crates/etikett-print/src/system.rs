// SPDX-License-Identifier: MIT
//
// Operating-system printer queries.
//
// CUPS platforms are queried through lpstat, Windows through a
// PowerShell CIM query. Both paths normalize into PrinterDescriptor so
// the rest of the pipeline never branches on platform for resolution.
// The parsers are split out and run on captured tool output, so they
// are testable without any print system installed.

use async_trait::async_trait;
use serde::Deserialize;

use etikett_core::error::{EtikettError, Result};
use etikett_core::types::PrinterDescriptor;

use crate::exec::{run_command, run_command_env};
use crate::resolve::{DEVICE_URI_OPTION, PrinterQuery};

/// Option key under which the Windows query records the printer port.
const PORT_NAME_OPTION: &str = "port-name";

/// lpstat output is matched against English literals, so the child runs
/// in the untranslated locale.
const CUPS_ENV: &[(&str, &str)] = &[("LC_ALL", "C")];

const CIM_PRINTER_QUERY: &str = "Get-CimInstance Win32_Printer | Select-Object Name,Caption,Comment,Default,PortName | ConvertTo-Json -Compress";

/// Printer listing backed by the host operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPrinterQuery;

impl SystemPrinterQuery {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PrinterQuery for SystemPrinterQuery {
    async fn list_printers(&self) -> Result<Vec<PrinterDescriptor>> {
        if cfg!(target_os = "windows") {
            query_windows().await
        } else {
            query_cups().await
        }
    }
}

// ---------------------------------------------------------------------------
// CUPS (macOS, Linux)
// ---------------------------------------------------------------------------

async fn query_cups() -> Result<Vec<PrinterDescriptor>> {
    let listing = match run_command_env(
        "lpstat",
        &["-l".to_string(), "-p".to_string()],
        CUPS_ENV,
    )
    .await
    {
        Ok(output) => output.stdout,
        // lpstat exits non-zero when CUPS has no queues at all
        Err(EtikettError::Exec(detail)) if detail.contains("No destinations") => {
            return Ok(Vec::new());
        }
        Err(e) => return Err(EtikettError::PrinterQuery(format!("lpstat -p: {e}"))),
    };

    let mut printers = parse_lpstat_printers(&listing);

    let devices = run_command_env("lpstat", &["-v".to_string()], CUPS_ENV)
        .await
        .map_err(|e| EtikettError::PrinterQuery(format!("lpstat -v: {e}")))?;
    apply_device_uris(&mut printers, &devices.stdout);

    let default = run_command_env("lpstat", &["-d".to_string()], CUPS_ENV)
        .await
        .map_err(|e| EtikettError::PrinterQuery(format!("lpstat -d: {e}")))?;
    if let Some(name) = parse_default_destination(&default.stdout) {
        for printer in &mut printers {
            printer.is_default = printer.name == name;
        }
    }

    Ok(printers)
}

/// Parse `lpstat -l -p` output.
///
/// Queue lines start with `printer <name>`; the indented detail block
/// that follows may carry a `Description:` line, which CUPS treats as
/// the human-readable printer name. When present it becomes both the
/// display name and the description; otherwise the queue name stands in.
pub fn parse_lpstat_printers(output: &str) -> Vec<PrinterDescriptor> {
    let mut printers: Vec<PrinterDescriptor> = Vec::new();
    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("printer ") {
            let name = rest.split_whitespace().next().unwrap_or("").to_string();
            if name.is_empty() {
                continue;
            }
            printers.push(PrinterDescriptor {
                display_name: name.clone(),
                name,
                ..Default::default()
            });
        } else if let Some(current) = printers.last_mut() {
            if let Some(description) = line.trim_start().strip_prefix("Description:") {
                let description = description.trim();
                if !description.is_empty() {
                    current.description = description.to_string();
                    current.display_name = description.to_string();
                }
            }
        }
    }
    printers
}

/// Fold `lpstat -v` lines (`device for <name>: <uri>`) into the
/// matching printers' options.
pub fn apply_device_uris(printers: &mut [PrinterDescriptor], output: &str) {
    for line in output.lines() {
        let Some(rest) = line.strip_prefix("device for ") else {
            continue;
        };
        let Some((name, uri)) = rest.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let uri = uri.trim();
        if uri.is_empty() {
            continue;
        }
        for printer in printers.iter_mut() {
            if printer.name == name {
                printer
                    .options
                    .insert(DEVICE_URI_OPTION.to_string(), uri.to_string());
            }
        }
    }
}

/// Extract the queue name from `lpstat -d` output, if a default is set.
pub fn parse_default_destination(output: &str) -> Option<String> {
    for line in output.lines() {
        if let Some(name) = line.strip_prefix("system default destination:") {
            let name = name.trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

async fn query_windows() -> Result<Vec<PrinterDescriptor>> {
    let output = run_command(
        "powershell",
        &[
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            CIM_PRINTER_QUERY.to_string(),
        ],
    )
    .await
    .map_err(|e| EtikettError::PrinterQuery(format!("printer query: {e}")))?;

    parse_cim_printers(&output.stdout)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CimPrinter {
    name: String,
    caption: Option<String>,
    comment: Option<String>,
    default: Option<bool>,
    port_name: Option<String>,
}

/// Parse the JSON emitted by the CIM printer query.
///
/// ConvertTo-Json emits a bare object for a single printer and an array
/// for several; no output at all means no printers are installed.
pub fn parse_cim_printers(json: &str) -> Result<Vec<PrinterDescriptor>> {
    let json = json.trim();
    if json.is_empty() {
        return Ok(Vec::new());
    }

    let parsed: Vec<CimPrinter> = if json.starts_with('[') {
        serde_json::from_str(json)
    } else {
        serde_json::from_str::<CimPrinter>(json).map(|printer| vec![printer])
    }
    .map_err(|e| EtikettError::PrinterQuery(format!("printer query output: {e}")))?;

    Ok(parsed
        .into_iter()
        .map(|printer| {
            let mut descriptor = PrinterDescriptor {
                display_name: printer.caption.unwrap_or_else(|| printer.name.clone()),
                name: printer.name,
                description: printer.comment.unwrap_or_default(),
                is_default: printer.default.unwrap_or(false),
                ..Default::default()
            };
            if let Some(port) = printer.port_name {
                descriptor
                    .options
                    .insert(PORT_NAME_OPTION.to_string(), port);
            }
            descriptor
        })
        .collect())
}
