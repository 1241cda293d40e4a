//! Generated artifacts and the results of running them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Output reported when a run produced neither stdout nor stderr.
pub const EMPTY_OUTPUT: &str = "Command executed successfully with no output";

/// Separator placed between stdout and stderr in composed output.
pub const ERRORS_MARKER: &str = "\nErrors:\n";

/// Prefix for host-level launch faults.
pub const LAUNCH_FAULT_PREFIX: &str = "Error executing program: ";

/// Interpreter family an artifact targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// A script for the general-purpose interpreter.
    #[serde(rename = "py", alias = "python")]
    GeneralScript,
    /// A shell script.
    #[serde(rename = "sh", alias = "shell", alias = "bash")]
    ShellScript,
}

impl ArtifactKind {
    /// File suffix used for the working file.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::GeneralScript => "py",
            Self::ShellScript => "sh",
        }
    }

    /// Whether the working file must carry the executable bit.
    #[must_use]
    pub const fn needs_exec_bit(self) -> bool {
        matches!(self, Self::ShellScript)
    }

    /// Pick a kind from a code-fence language tag.
    #[must_use]
    pub fn from_fence_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "sh" | "bash" | "shell" | "zsh" => Self::ShellScript,
            _ => Self::GeneralScript,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Generated code together with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub code: String,
    pub kind: ArtifactKind,
}

impl Artifact {
    /// Create an artifact.
    #[must_use]
    pub fn new(code: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            code: code.into(),
            kind,
        }
    }

    /// Extract an artifact from raw completion text.
    ///
    /// A leading code fence decides the kind through its language tag and is
    /// removed together with a trailing fence. Unfenced text is classified by
    /// its shebang line, defaulting to a general script.
    #[must_use]
    pub fn from_completion(text: &str) -> Self {
        let trimmed = text.trim();

        if let Some(rest) = trimmed.strip_prefix("```") {
            let (tag, body) = rest.split_once('\n').unwrap_or((rest, ""));
            let body = body.trim_end();
            let body = body.strip_suffix("```").unwrap_or(body);
            let body = body.trim_end_matches('\n');
            let kind = if tag.trim().is_empty() {
                kind_from_shebang(body)
            } else {
                ArtifactKind::from_fence_tag(tag)
            };
            return Self::new(format!("{body}\n"), kind);
        }

        Self::new(format!("{trimmed}\n"), kind_from_shebang(trimmed))
    }
}

fn kind_from_shebang(code: &str) -> ArtifactKind {
    let Some(first) = code.lines().next() else {
        return ArtifactKind::GeneralScript;
    };
    let Some(shebang) = first.strip_prefix("#!") else {
        return ArtifactKind::GeneralScript;
    };
    let shell = shebang
        .split(|c: char| c == '/' || c.is_whitespace())
        .any(|word| matches!(word, "sh" | "bash" | "zsh"));
    if shell {
        ArtifactKind::ShellScript
    } else {
        ArtifactKind::GeneralScript
    }
}

/// Captured result of one artifact run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Composed text shown to the user and recorded in history.
    pub output: String,
    /// Process exit code, if the process ran and exited normally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    /// Compose a result from captured streams.
    #[must_use]
    pub fn from_streams(stdout: String, stderr: String, exit_code: Option<i32>) -> Self {
        let output = compose_output(&stdout, &stderr);
        Self {
            stdout,
            stderr,
            output,
            exit_code,
        }
    }

    /// Result for a run that could not be launched at all.
    #[must_use]
    pub fn launch_fault(description: impl fmt::Display) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            output: format!("{LAUNCH_FAULT_PREFIX}{description}"),
            exit_code: None,
        }
    }
}

/// Join stdout and stderr the way results are shown to users.
#[must_use]
pub fn compose_output(stdout: &str, stderr: &str) -> String {
    let mut output = stdout.to_string();
    if !stderr.is_empty() {
        output.push_str(ERRORS_MARKER);
        output.push_str(stderr);
    }
    if output.trim().is_empty() {
        EMPTY_OUTPUT.to_string()
    } else {
        output
    }
}
