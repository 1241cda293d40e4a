//! Core traits for history storage, execution and completion.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    Artifact, ArtifactKind, ContextEntry, Exchange, ExecutionResult, SessionId, context::flatten,
};

/// Default number of exchanges loaded as conversational context.
pub const DEFAULT_CONTEXT_WINDOW: usize = 3;

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for session-partitioned, append-only exchange logs.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append an exchange to a session's history.
    async fn append(&self, session: &SessionId, exchange: &Exchange) -> Result<(), StorageError>;

    /// Load the last `n` exchanges of a session, oldest first.
    ///
    /// Missing or malformed backing data yields an empty history.
    async fn recent(&self, session: &SessionId, n: usize) -> Result<Vec<Exchange>, StorageError>;

    /// Load the last `n` exchanges as ordered context entries.
    async fn load_recent(
        &self,
        session: &SessionId,
        n: usize,
    ) -> Result<Vec<ContextEntry>, StorageError> {
        Ok(flatten(self.recent(session, n).await?))
    }
}

#[async_trait]
impl<T: HistoryStore + ?Sized> HistoryStore for Arc<T> {
    async fn append(&self, session: &SessionId, exchange: &Exchange) -> Result<(), StorageError> {
        (**self).append(session, exchange).await
    }

    async fn recent(&self, session: &SessionId, n: usize) -> Result<Vec<Exchange>, StorageError> {
        (**self).recent(session, n).await
    }
}

/// Executor error.
///
/// Only raised when the artifact could not be staged; everything that goes
/// wrong once the interpreter is being launched is reported as output text.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to prepare working directory {path}: {source}")]
    WorkDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write artifact {path}: {source}")]
    Artifact {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Trait for artifact executors.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run `code` with the interpreter implied by `kind`.
    async fn execute(&self, code: &str, kind: ArtifactKind)
    -> Result<ExecutionResult, ExecutorError>;

    /// Run an artifact.
    async fn run(&self, artifact: &Artifact) -> Result<ExecutionResult, ExecutorError> {
        self.execute(&artifact.code, artifact.kind).await
    }
}

#[async_trait]
impl<T: Executor + ?Sized> Executor for Arc<T> {
    async fn execute(
        &self,
        code: &str,
        kind: ArtifactKind,
    ) -> Result<ExecutionResult, ExecutorError> {
        (**self).execute(code, kind).await
    }
}

/// Completion error.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Completion request failed: {0}")]
    Request(String),
    #[error("Completion service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Completion response was empty")]
    Empty,
    #[error("Missing API credential")]
    MissingCredential,
}

/// Trait for services that turn a prompt plus context into code text.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Produce raw completion text for `prompt` given prior `history`.
    async fn complete(
        &self,
        history: &[ContextEntry],
        prompt: &str,
    ) -> Result<String, CompletionError>;
}

#[async_trait]
impl<T: CompletionService + ?Sized> CompletionService for Arc<T> {
    async fn complete(
        &self,
        history: &[ContextEntry],
        prompt: &str,
    ) -> Result<String, CompletionError> {
        (**self).complete(history, prompt).await
    }
}
