// SPDX-License-Identifier: MIT
//
// Label payload fetching and spooling.
//
// Every job's payload is fetched over HTTP at dispatch time and written
// to a uniquely named spool file; the print strategies consume the file,
// never the in-memory payload, so helper processes and USB transfers
// share one handoff shape. Spool files are left behind for post-mortem
// inspection and cleaned up by the OS temp policy.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use etikett_core::error::{EtikettError, Result};
use etikett_core::types::{LabelFormat, PrintJob};

const USER_AGENT: &str = concat!("etikett/", env!("CARGO_PKG_VERSION"));

/// A fetched label body, typed by format.
///
/// ZPL is kept as text (it is a line-oriented command stream), PDF as
/// raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelPayload {
    Zpl(String),
    Pdf(Vec<u8>),
}

impl LabelPayload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Zpl(text) => text.as_bytes(),
            Self::Pdf(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// Fetches label payloads and writes spool files.
#[derive(Debug, Clone)]
pub struct LabelFetcher {
    client: reqwest::Client,
    spool_dir: PathBuf,
}

impl LabelFetcher {
    /// Build a fetcher spooling into the OS temp directory.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| EtikettError::Fetch(format!("build HTTP client: {e}")))?;
        Ok(Self {
            client,
            spool_dir: std::env::temp_dir(),
        })
    }

    /// Redirect spool files into `dir` instead of the OS temp directory.
    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = dir.into();
        self
    }

    /// Fetch the label body for `job`.
    pub async fn fetch(&self, job: &PrintJob) -> Result<LabelPayload> {
        let response = self
            .client
            .get(&job.source_url)
            .send()
            .await
            .map_err(|e| EtikettError::Fetch(format!("GET {}: {e}", job.source_url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EtikettError::Fetch(format!(
                "GET {} returned {status}",
                job.source_url
            )));
        }

        match job.format {
            LabelFormat::Zpl => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| EtikettError::Fetch(format!("read body: {e}")))?;
                Ok(LabelPayload::Zpl(text))
            }
            LabelFormat::Pdf => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| EtikettError::Fetch(format!("read body: {e}")))?;
                Ok(LabelPayload::Pdf(bytes.to_vec()))
            }
        }
    }

    /// Write `payload` to a fresh spool file and return its path.
    ///
    /// The name carries the order tracking number plus a random token,
    /// so resubmitting the same order never clobbers an earlier file.
    pub async fn persist(&self, job: &PrintJob, payload: &LabelPayload) -> Result<PathBuf> {
        let path = self
            .spool_dir
            .join(spool_file_name(&job.order_tracking_number, job.format));
        tokio::fs::write(&path, payload.as_bytes()).await?;
        debug!(path = %path.display(), bytes = payload.len(), "spooled label payload");
        Ok(path)
    }
}

fn spool_file_name(otn: &str, format: LabelFormat) -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("{otn}-{}.{}", &token[..8], format.extension())
}
