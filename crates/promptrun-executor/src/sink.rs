//! Best-effort live display of executed artifacts.

use std::{path::Path, process::Stdio};

use async_trait::async_trait;
use promptrun_core::ArtifactKind;
use thiserror::Error;
use tokio::process::Command;

use crate::resolve::resolve_executable_path;

/// Presentation sink error.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("No interactive terminal available")]
    Unsupported,
    #[error("Failed to launch terminal: {0}")]
    Launch(#[from] std::io::Error),
    #[error("Terminal launcher exited with {0}")]
    Launcher(std::process::ExitStatus),
}

/// Trait for mirroring an artifact run into a live display.
///
/// Failures are never allowed to affect the authoritative result.
#[async_trait]
pub trait PresentationSink: Send + Sync {
    /// Show the artifact at `artifact` and run `command_line` for visibility.
    async fn present(
        &self,
        artifact: &Path,
        kind: ArtifactKind,
        command_line: &str,
    ) -> Result<(), SinkError>;

    /// Whether the sink may still read the artifact after `present` returns.
    fn holds_artifact(&self) -> bool {
        false
    }
}

/// Sink that displays nothing.
#[derive(Debug, Default, Clone)]
pub struct NoopSink;

#[async_trait]
impl PresentationSink for NoopSink {
    async fn present(
        &self,
        _artifact: &Path,
        _kind: ArtifactKind,
        _command_line: &str,
    ) -> Result<(), SinkError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Launcher {
    /// macOS Terminal driven through `osascript`.
    AppleTerminal(std::path::PathBuf),
    /// Debian-style `x-terminal-emulator` alternative.
    XTerminal(std::path::PathBuf),
}

/// Sink that opens a terminal window, prints the artifact and runs it there.
#[derive(Debug, Clone)]
pub struct TerminalSink {
    launcher: Launcher,
}

impl TerminalSink {
    /// Detect a terminal launcher for the current host.
    pub async fn detect() -> Option<Self> {
        let launcher = if cfg!(target_os = "macos") {
            Launcher::AppleTerminal(resolve_executable_path("osascript").await?)
        } else if std::env::var_os("DISPLAY").is_some()
            || std::env::var_os("WAYLAND_DISPLAY").is_some()
        {
            Launcher::XTerminal(resolve_executable_path("x-terminal-emulator").await?)
        } else {
            return None;
        };
        tracing::debug!(?launcher, "Terminal mirroring available");
        Some(Self { launcher })
    }
}

#[async_trait]
impl PresentationSink for TerminalSink {
    async fn present(
        &self,
        artifact: &Path,
        _kind: ArtifactKind,
        command_line: &str,
    ) -> Result<(), SinkError> {
        let quoted = shlex::try_quote(artifact.to_string_lossy().as_ref())
            .map_err(|_| SinkError::Unsupported)?
            .into_owned();
        let script = format!("cat {quoted}; {command_line}");

        match &self.launcher {
            Launcher::AppleTerminal(osascript) => {
                let apple_script = format!(
                    "tell application \"Terminal\"\n    activate\n    do script \"{}\"\nend tell",
                    apple_escape(&script)
                );
                let status = Command::new(osascript)
                    .arg("-e")
                    .arg(apple_script)
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .await?;
                if status.success() {
                    Ok(())
                } else {
                    Err(SinkError::Launcher(status))
                }
            }
            Launcher::XTerminal(terminal) => {
                // Detached; the window outlives this call.
                Command::new(terminal)
                    .arg("-e")
                    .arg("sh")
                    .arg("-c")
                    .arg(format!("{script}; exec sh"))
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()?;
                Ok(())
            }
        }
    }

    fn holds_artifact(&self) -> bool {
        true
    }
}

fn apple_escape(script: &str) -> String {
    script.replace('\\', "\\\\").replace('"', "\\\"")
}
