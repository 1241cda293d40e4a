//! Structured history log with one JSON record per line.

use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use promptrun_core::{Exchange, HistoryStore, SessionId, traits::StorageError};
use serde::{Deserialize, Serialize};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};

/// Current record schema version.
pub const RECORD_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Record {
    v: u32,
    session: String,
    prompt: String,
    artifact: String,
    output: String,
    /// Unix epoch seconds.
    at: u64,
}

/// History store writing versioned JSON-lines records.
pub struct JsonlStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlStore {
    /// Create a store for the log at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Log file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for JsonlStore {
    async fn append(&self, session: &SessionId, exchange: &Exchange) -> Result<(), StorageError> {
        let record = Record {
            v: RECORD_VERSION,
            session: session.to_string(),
            prompt: exchange.prompt.clone(),
            artifact: exchange.artifact.clone(),
            output: exchange.output.clone(),
            at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn recent(&self, session: &SessionId, n: usize) -> Result<Vec<Exchange>, StorageError> {
        let contents = {
            let _guard = self.lock.lock().await;
            match fs::read(&self.path).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), "Failed to read history log: {e}");
                    return Ok(Vec::new());
                }
            }
        };

        let mut exchanges: Vec<Exchange> = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Record>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::debug!("Skipping unreadable history record: {e}");
                    None
                }
            })
            .filter(|record| record.v == RECORD_VERSION && record.session == session.as_str())
            .map(|record| Exchange::new(record.prompt, record.artifact, record.output))
            .collect();

        let keep_from = exchanges.len().saturating_sub(n);
        Ok(exchanges.split_off(keep_from))
    }
}
