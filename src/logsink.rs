//! Send log.
//!
//! Every dispatch outcome — sent, simulated, or failed — is appended to a
//! durable log, one JSON record per line. Logging is best-effort at the
//! call site: a failed append is reported upward but never undoes a send.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::LogError;
use crate::pipeline::types::{ApprovedResponse, SendResult};

/// One line in the send log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRecord {
    pub approved: ApprovedResponse,
    pub result: SendResult,
}

/// Append-only sink for send records.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn append(&self, record: &SendRecord) -> Result<(), LogError>;
}

// ── JSONL file sink ─────────────────────────────────────────────────

/// Appends records to a JSON-lines file, creating it (and its parent
/// directory) on first write.
pub struct JsonlLogSink {
    path: PathBuf,
}

impl JsonlLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LogSink for JsonlLogSink {
    async fn append(&self, record: &SendRecord) -> Result<(), LogError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

// ── Null sink ───────────────────────────────────────────────────────

/// Discards all records. For wiring where no log is configured.
pub struct NullLogSink;

#[async_trait]
impl LogSink for NullLogSink {
    async fn append(&self, _record: &SendRecord) -> Result<(), LogError> {
        Ok(())
    }
}
