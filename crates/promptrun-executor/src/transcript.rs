//! Rolling transcript of executed commands.

use std::{path::PathBuf, sync::Arc};

use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};

/// Append-only record of commands run and their composed output.
///
/// Diagnostic only; nothing reads it back.
#[derive(Debug, Clone)]
pub struct Transcript {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl Transcript {
    /// Create a transcript writing to `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path: Arc::new(path),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Transcript file location.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Append one command and its output.
    ///
    /// # Errors
    /// Returns error if the file cannot be opened or written.
    pub async fn record(&self, command_line: &str, output: &str) -> Result<(), std::io::Error> {
        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_ref())
            .await?;
        file.write_all(format!("\n$ {command_line}\n{output}\n").as_bytes())
            .await?;
        file.flush().await?;
        Ok(())
    }
}
