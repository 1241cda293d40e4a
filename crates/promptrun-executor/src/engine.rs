//! Artifact execution engine.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use command_group::AsyncCommandGroup;
use promptrun_core::{ArtifactKind, ExecutionResult, Executor, traits::ExecutorError};
use serde::{Deserialize, Serialize};
use tokio::{fs, process::Command};
use uuid::Uuid;

use crate::{
    command::{CommandBuilder, CommandParts},
    sink::{NoopSink, PresentationSink},
    transcript::Transcript,
};

/// File stem used by [`ArtifactNaming::Fixed`].
pub const FIXED_STEM: &str = "temp_generated_code";

/// File name prefix used by [`ArtifactNaming::Unique`].
pub const UNIQUE_PREFIX: &str = "artifact-";

/// Default retention for artifacts a sink still reads after the run.
pub const DEFAULT_HELD_ARTIFACT_TTL: Duration = Duration::from_secs(600);

/// How working files are named.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactNaming {
    /// A fresh `artifact-<uuid>.<suffix>` per run.
    #[default]
    Unique,
    /// One shared `temp_generated_code.<suffix>` per kind.
    ///
    /// Concurrent runs of the same kind can overwrite each other's file
    /// before the interpreter reads it.
    Fixed,
}

/// Execution engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding working files.
    pub work_dir: PathBuf,
    /// Rolling transcript file.
    pub transcript_path: PathBuf,
    pub naming: ArtifactNaming,
    /// Interpreter for general scripts.
    pub general_interpreter: String,
    /// Interpreter for shell scripts.
    pub shell_interpreter: String,
    /// Age after which sink-held unique artifacts are swept.
    pub held_artifact_ttl: Duration,
}

impl EngineConfig {
    /// Default layout under a data directory.
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            work_dir: data_dir.join("work"),
            transcript_path: data_dir.join("transcript.log"),
            naming: ArtifactNaming::default(),
            general_interpreter: "python3".to_string(),
            shell_interpreter: "sh".to_string(),
            held_artifact_ttl: DEFAULT_HELD_ARTIFACT_TTL,
        }
    }

    /// Set the naming mode.
    #[must_use]
    pub const fn with_naming(mut self, naming: ArtifactNaming) -> Self {
        self.naming = naming;
        self
    }
}

/// Writes artifacts to disk, runs them and records the outcome.
pub struct ExecutionEngine {
    config: EngineConfig,
    sink: Arc<dyn PresentationSink>,
    transcript: Transcript,
}

impl ExecutionEngine {
    /// Create an engine without live display.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::with_sink(config, Arc::new(NoopSink))
    }

    /// Create an engine mirroring runs into `sink`.
    #[must_use]
    pub fn with_sink(config: EngineConfig, sink: Arc<dyn PresentationSink>) -> Self {
        let transcript = Transcript::new(config.transcript_path.clone());
        Self {
            config,
            sink,
            transcript,
        }
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn working_path(&self, kind: ArtifactKind) -> PathBuf {
        let name = match self.config.naming {
            ArtifactNaming::Unique => {
                format!("{UNIQUE_PREFIX}{}.{}", Uuid::new_v4(), kind.suffix())
            }
            ArtifactNaming::Fixed => format!("{FIXED_STEM}.{}", kind.suffix()),
        };
        self.config.work_dir.join(name)
    }

    const fn interpreter(&self, kind: ArtifactKind) -> &String {
        match kind {
            ArtifactKind::GeneralScript => &self.config.general_interpreter,
            ArtifactKind::ShellScript => &self.config.shell_interpreter,
        }
    }

    async fn stage(&self, code: &str, kind: ArtifactKind) -> Result<PathBuf, ExecutorError> {
        let work_dir = &self.config.work_dir;
        fs::create_dir_all(work_dir)
            .await
            .map_err(|source| ExecutorError::WorkDir {
                path: work_dir.display().to_string(),
                source,
            })?;
        if self.config.naming == ArtifactNaming::Unique && self.sink.holds_artifact() {
            self.sweep_held_artifacts().await;
        }

        let path = self.working_path(kind);
        let artifact_err = |source| ExecutorError::Artifact {
            path: path.display().to_string(),
            source,
        };
        fs::write(&path, code).await.map_err(artifact_err)?;
        if kind.needs_exec_bit() {
            make_executable(&path).await.map_err(artifact_err)?;
        }
        Ok(path)
    }

    /// Remove unique artifacts left for the sink once they outlive the TTL.
    async fn sweep_held_artifacts(&self) {
        let Ok(mut entries) = fs::read_dir(&self.config.work_dir).await else {
            return;
        };
        let now = SystemTime::now();
        let mut removed = 0usize;

        while let Ok(Some(entry)) = entries.next_entry().await {
            if !entry.file_name().to_string_lossy().starts_with(UNIQUE_PREFIX) {
                continue;
            }
            let expired = entry
                .metadata()
                .await
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age >= self.config.held_artifact_ttl);
            if expired && fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(removed, "Swept held artifacts");
        }
    }

    /// Run `code` with the interpreter implied by `kind`.
    ///
    /// # Errors
    /// Returns error only if the working directory or artifact file cannot be
    /// created. Launch failures and script errors are reported in the output.
    pub async fn execute(
        &self,
        code: &str,
        kind: ArtifactKind,
    ) -> Result<ExecutionResult, ExecutorError> {
        let path = self.stage(code, kind).await?;

        let parts = CommandBuilder::new(self.interpreter(kind).as_str())
            .params([path.to_string_lossy().into_owned()])
            .build();
        let command_line = parts.as_ref().map_or_else(
            |_| format!("{} {}", self.interpreter(kind), path.display()),
            CommandParts::command_line,
        );

        if let Err(e) = self.sink.present(&path, kind, &command_line).await {
            tracing::debug!(path = %path.display(), "Terminal mirroring skipped: {e}");
        }

        let result = match parts {
            Ok(parts) => match parts.into_resolved().await {
                Ok((program, args)) => run(&program, &args).await,
                Err(e) => ExecutionResult::launch_fault(e),
            },
            Err(e) => ExecutionResult::launch_fault(e),
        };

        tracing::info!(
            ?kind,
            exit_code = ?result.exit_code,
            output_bytes = result.output.len(),
            "Artifact executed"
        );

        if let Err(e) = self.transcript.record(&command_line, &result.output).await {
            tracing::warn!(
                path = %self.transcript.path().display(),
                "Failed to append transcript: {e}"
            );
        }

        if self.config.naming == ArtifactNaming::Unique && !self.sink.holds_artifact() {
            if let Err(e) = fs::remove_file(&path).await {
                tracing::debug!(path = %path.display(), "Failed to remove artifact: {e}");
            }
        }

        Ok(result)
    }
}

#[async_trait]
impl Executor for ExecutionEngine {
    async fn execute(
        &self,
        code: &str,
        kind: ArtifactKind,
    ) -> Result<ExecutionResult, ExecutorError> {
        Self::execute(self, code, kind).await
    }
}

async fn run(program: &Path, args: &[String]) -> ExecutionResult {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = match cmd.group_spawn() {
        Ok(child) => child,
        Err(e) => return ExecutionResult::launch_fault(e),
    };

    match child.wait_with_output().await {
        Ok(output) => ExecutionResult::from_streams(
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
            output.status.code(),
        ),
        Err(e) => ExecutionResult::launch_fault(e),
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<(), std::io::Error> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path).await?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions).await
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<(), std::io::Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use promptrun_core::artifact::{EMPTY_OUTPUT, LAUNCH_FAULT_PREFIX};

    use super::*;
    use crate::sink::SinkError;

    fn engine(dir: &Path, naming: ArtifactNaming) -> ExecutionEngine {
        ExecutionEngine::new(EngineConfig::new(dir).with_naming(naming))
    }

    fn work_files(engine: &ExecutionEngine) -> Vec<PathBuf> {
        std::fs::read_dir(&engine.config().work_dir)
            .map(|rd| rd.filter_map(Result::ok).map(|e| e.path()).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_shell_stdout_captured() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), ArtifactNaming::Unique);

        let result = engine
            .execute("echo hello\n", ArtifactKind::ShellScript)
            .await
            .unwrap();
        assert_eq!(result.output, "hello\n");
        assert_eq!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_empty_output_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), ArtifactNaming::Unique);

        let result = engine.execute(":\n", ArtifactKind::ShellScript).await.unwrap();
        assert_eq!(result.output, EMPTY_OUTPUT);
    }

    #[tokio::test]
    async fn test_stderr_and_exit_code_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), ArtifactNaming::Unique);

        let code = "echo partial\necho broken >&2\nexit 3\n";
        let result = engine.execute(code, ArtifactKind::ShellScript).await.unwrap();

        assert_eq!(result.output, "partial\n\nErrors:\nbroken\n");
        let out = result.output.find("partial").unwrap();
        let marker = result.output.find("Errors:").unwrap();
        let err = result.output.find("broken").unwrap();
        assert!(out < marker && marker < err);
        assert_eq!(result.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_general_script_prints() {
        if which::which("python3").is_err() {
            eprintln!("python3 not on PATH, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), ArtifactNaming::Unique);

        let result = engine
            .execute("print(2)\n", ArtifactKind::GeneralScript)
            .await
            .unwrap();
        assert_eq!(result.output, "2\n");
    }

    #[tokio::test]
    async fn test_missing_interpreter_reported_as_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::new(dir.path());
        config.general_interpreter = "promptrun-missing-interpreter".to_string();
        let engine = ExecutionEngine::new(config);

        let result = engine
            .execute("print(1)\n", ArtifactKind::GeneralScript)
            .await
            .unwrap();
        assert!(result.output.starts_with(LAUNCH_FAULT_PREFIX));
        assert!(result.output.contains("promptrun-missing-interpreter"));
    }

    #[tokio::test]
    async fn test_transcript_records_command_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), ArtifactNaming::Fixed);

        engine
            .execute("echo logged\n", ArtifactKind::ShellScript)
            .await
            .unwrap();

        let transcript = std::fs::read_to_string(&engine.config().transcript_path).unwrap();
        assert!(transcript.starts_with("\n$ sh "));
        assert!(transcript.contains("temp_generated_code.sh"));
        assert!(transcript.ends_with("logged\n\n"));
    }

    #[tokio::test]
    async fn test_fixed_naming_keeps_shared_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), ArtifactNaming::Fixed);

        engine.execute("echo one\n", ArtifactKind::ShellScript).await.unwrap();
        engine.execute("echo two\n", ArtifactKind::ShellScript).await.unwrap();

        let path = engine.config().work_dir.join("temp_generated_code.sh");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "echo two\n");
        assert_eq!(work_files(&engine), vec![path.clone()]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[tokio::test]
    async fn test_unique_naming_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), ArtifactNaming::Unique);

        let (a, b) = tokio::join!(
            engine.execute("echo a\n", ArtifactKind::ShellScript),
            engine.execute("echo b\n", ArtifactKind::ShellScript),
        );
        assert_eq!(a.unwrap().output, "a\n");
        assert_eq!(b.unwrap().output, "b\n");
        assert!(work_files(&engine).is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_work_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut config = EngineConfig::new(dir.path());
        config.work_dir = blocker.join("work");
        let engine = ExecutionEngine::new(config);

        let err = engine
            .execute("echo never\n", ArtifactKind::ShellScript)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::WorkDir { .. }));
    }

    struct FailingSink;

    #[async_trait]
    impl PresentationSink for FailingSink {
        async fn present(
            &self,
            _artifact: &Path,
            _kind: ArtifactKind,
            _command_line: &str,
        ) -> Result<(), SinkError> {
            Err(SinkError::Unsupported)
        }
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_change_result() {
        let dir = tempfile::tempdir().unwrap();
        let engine =
            ExecutionEngine::with_sink(EngineConfig::new(dir.path()), Arc::new(FailingSink));

        let result = engine
            .execute("echo fine\n", ArtifactKind::ShellScript)
            .await
            .unwrap();
        assert_eq!(result.output, "fine\n");
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<(PathBuf, String, bool)>>,
    }

    #[async_trait]
    impl PresentationSink for RecordingSink {
        async fn present(
            &self,
            artifact: &Path,
            _kind: ArtifactKind,
            command_line: &str,
        ) -> Result<(), SinkError> {
            self.seen.lock().unwrap().push((
                artifact.to_path_buf(),
                command_line.to_string(),
                artifact.is_file(),
            ));
            Ok(())
        }

        fn holds_artifact(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_held_artifacts_swept_after_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::new(dir.path());
        config.held_artifact_ttl = Duration::ZERO;
        let engine = ExecutionEngine::with_sink(config, Arc::new(RecordingSink::default()));

        for i in 0..25 {
            engine
                .execute(&format!("echo {i}\n"), ArtifactKind::ShellScript)
                .await
                .unwrap();
        }

        let files = work_files(&engine);
        assert_eq!(files.len(), 1, "only the latest held artifact remains");
        assert_eq!(std::fs::read_to_string(&files[0]).unwrap(), "echo 24\n");
    }

    #[tokio::test]
    async fn test_held_artifacts_kept_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ExecutionEngine::with_sink(
            EngineConfig::new(dir.path()),
            Arc::new(RecordingSink::default()),
        );

        engine.execute("echo a\n", ArtifactKind::ShellScript).await.unwrap();
        engine.execute("echo b\n", ArtifactKind::ShellScript).await.unwrap();
        assert_eq!(work_files(&engine).len(), 2);
    }

    #[tokio::test]
    async fn test_sink_sees_staged_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let engine = ExecutionEngine::with_sink(EngineConfig::new(dir.path()), sink.clone());

        engine.execute("echo shown\n", ArtifactKind::ShellScript).await.unwrap();

        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (path, command_line, existed) = &seen[0];
        assert!(existed);
        assert!(command_line.starts_with("sh "));
        assert!(path.is_file(), "sink-held artifacts are kept");
    }
}
