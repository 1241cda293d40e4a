//! Session identifiers, exchanges and the context entries built from them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque session identifier carried in the `session_id` cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Maximum accepted identifier length in bytes.
    pub const MAX_LEN: usize = 128;

    /// Wrap an identifier without validation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse an identifier presented by a client.
    ///
    /// Accepts ASCII alphanumerics, `-` and `_` only, so the value can
    /// always be written as a single log header line.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= Self::MAX_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        valid.then(|| Self(raw.to_string()))
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One prompt/artifact/output triple recorded for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    /// The user's instructions.
    pub prompt: String,
    /// The generated code.
    pub artifact: String,
    /// Captured execution output.
    pub output: String,
}

impl Exchange {
    /// Create a new exchange.
    #[must_use]
    pub fn new(
        prompt: impl Into<String>,
        artifact: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            artifact: artifact.into(),
            output: output.into(),
        }
    }

    /// Expand into three ordered context entries: prompt, artifact, output.
    #[must_use]
    pub fn into_context(self) -> [ContextEntry; 3] {
        [
            ContextEntry::new(EntryRole::Prompt, self.prompt),
            ContextEntry::new(EntryRole::Artifact, self.artifact),
            ContextEntry::new(EntryRole::Output, self.output),
        ]
    }
}

/// Which part of an exchange a context entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryRole {
    /// A user prompt.
    Prompt,
    /// Generated code.
    Artifact,
    /// Output of running the generated code.
    Output,
}

/// A single conversational turn handed to the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub role: EntryRole,
    pub content: String,
}

impl ContextEntry {
    /// Create a context entry.
    #[must_use]
    pub fn new(role: EntryRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Flatten exchanges into context entries, oldest first.
#[must_use]
pub fn flatten(exchanges: Vec<Exchange>) -> Vec<ContextEntry> {
    exchanges.into_iter().flat_map(Exchange::into_context).collect()
}
