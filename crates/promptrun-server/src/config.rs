use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use promptrun_completion::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use promptrun_core::traits::DEFAULT_CONTEXT_WINDOW;
use promptrun_executor::{ArtifactNaming, EngineConfig, engine::DEFAULT_HELD_ARTIFACT_TTL};
use promptrun_session::HistoryFormat;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default)]
    pub format: HistoryFormat,
    /// Past exchanges replayed to the completion service.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub naming: ArtifactNaming,
    #[serde(default = "default_general_interpreter")]
    pub general_interpreter: String,
    #[serde(default = "default_shell_interpreter")]
    pub shell_interpreter: String,
    /// Open each run in a terminal window as well.
    #[serde(default)]
    pub mirror_terminal: bool,
    /// Seconds a mirrored artifact is kept before it may be swept.
    #[serde(default = "default_held_artifact_ttl_secs")]
    pub held_artifact_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_file")]
    pub api_key_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            data_dir: default_data_dir(),
            log_filter: default_log_filter(),
            history: HistoryConfig::default(),
            execution: ExecutionConfig::default(),
            completion: CompletionConfig::default(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            format: HistoryFormat::default(),
            context_window: default_context_window(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            naming: ArtifactNaming::default(),
            general_interpreter: default_general_interpreter(),
            shell_interpreter: default_shell_interpreter(),
            mirror_terminal: false,
            held_artifact_ttl_secs: default_held_artifact_ttl_secs(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_file: default_api_key_file(),
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply command-line overrides.
    #[must_use]
    pub fn with_overrides(mut self, bind: Option<SocketAddr>, data_dir: Option<PathBuf>) -> Self {
        if let Some(bind) = bind {
            self.bind = bind;
        }
        if let Some(data_dir) = data_dir {
            self.data_dir = data_dir;
        }
        self
    }
}

impl ExecutionConfig {
    pub fn engine_config(&self, data_dir: &Path) -> EngineConfig {
        let mut config = EngineConfig::new(data_dir).with_naming(self.naming);
        config.general_interpreter.clone_from(&self.general_interpreter);
        config.shell_interpreter.clone_from(&self.shell_interpreter);
        config.held_artifact_ttl = Duration::from_secs(self.held_artifact_ttl_secs);
        config
    }
}

// Default functions
fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir().map_or_else(
        || PathBuf::from("promptrun-data"),
        |dir| dir.join("promptrun"),
    )
}
fn default_log_filter() -> String {
    "info".into()
}
const fn default_context_window() -> usize {
    DEFAULT_CONTEXT_WINDOW
}
fn default_general_interpreter() -> String {
    "python3".into()
}
fn default_shell_interpreter() -> String {
    "sh".into()
}
const fn default_held_artifact_ttl_secs() -> u64 {
    DEFAULT_HELD_ARTIFACT_TTL.as_secs()
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_model() -> String {
    DEFAULT_MODEL.into()
}
fn default_api_key_file() -> PathBuf {
    PathBuf::from("./api_key")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ServerConfig::parse("").unwrap();
        assert_eq!(config.bind, "127.0.0.1:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.history.format, HistoryFormat::Text);
        assert_eq!(config.history.context_window, 3);
        assert_eq!(config.execution.naming, ArtifactNaming::Unique);
        assert!(!config.execution.mirror_terminal);
        assert_eq!(config.execution.held_artifact_ttl_secs, 600);
        assert_eq!(config.completion.model, "o1-mini");
        assert_eq!(config.completion.api_key_file, PathBuf::from("./api_key"));
    }

    #[test]
    fn test_parse_sections() {
        let config = ServerConfig::parse(
            r#"
            bind = "0.0.0.0:8080"
            data_dir = "/srv/promptrun"

            [history]
            format = "jsonl"
            context_window = 5

            [execution]
            naming = "fixed"
            general_interpreter = "python3.12"
            mirror_terminal = true
            held_artifact_ttl_secs = 30

            [completion]
            base_url = "http://localhost:11434/v1"
            model = "local"
            "#,
        )
        .unwrap();

        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.data_dir, PathBuf::from("/srv/promptrun"));
        assert_eq!(config.history.format, HistoryFormat::Jsonl);
        assert_eq!(config.history.context_window, 5);
        assert_eq!(config.execution.naming, ArtifactNaming::Fixed);
        assert_eq!(config.execution.shell_interpreter, "sh");
        assert!(config.execution.mirror_terminal);
        assert_eq!(config.execution.held_artifact_ttl_secs, 30);
        assert_eq!(config.completion.model, "local");
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(ServerConfig::parse("[history]\nformat = \"sqlite\"").is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let config = ServerConfig::parse("bind = \"0.0.0.0:8080\"")
            .unwrap()
            .with_overrides(Some("127.0.0.1:9000".parse().unwrap()), Some("data".into()));
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("promptrun.toml");
        std::fs::write(&path, "log_filter = \"debug\"\n").unwrap();

        let config = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.log_filter, "debug");
        assert!(ServerConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_engine_config_layout() {
        let execution = ExecutionConfig {
            shell_interpreter: "bash".into(),
            ..ExecutionConfig::default()
        };
        let engine = execution.engine_config(Path::new("/data"));
        assert_eq!(engine.work_dir, PathBuf::from("/data/work"));
        assert_eq!(engine.transcript_path, PathBuf::from("/data/transcript.log"));
        assert_eq!(engine.shell_interpreter, "bash");
        assert_eq!(engine.general_interpreter, "python3");
        assert_eq!(engine.held_artifact_ttl, Duration::from_secs(600));
    }
}
