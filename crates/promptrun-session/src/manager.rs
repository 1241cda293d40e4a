//! Session manager orchestrating history, completion and execution.

use promptrun_core::{
    Artifact, CompletionService, Exchange, ExecutionResult, Executor, HistoryStore, SessionId,
    traits::{CompletionError, DEFAULT_CONTEXT_WINDOW, ExecutorError, StorageError},
};

use crate::identity::{Identity, SessionIdentity};

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),
    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),
}

/// Result of turning a prompt into a run artifact.
#[derive(Debug, Clone)]
pub struct Generation {
    pub artifact: Artifact,
    pub result: ExecutionResult,
}

/// Session manager for prompt-to-execution requests.
pub struct SessionManager<S, E, C>
where
    S: HistoryStore,
    E: Executor,
    C: CompletionService,
{
    storage: S,
    executor: E,
    completion: C,
    identity: SessionIdentity,
    context_window: usize,
}

impl<S, E, C> SessionManager<S, E, C>
where
    S: HistoryStore,
    E: Executor,
    C: CompletionService,
{
    /// Create a new session manager.
    #[must_use]
    pub fn new(storage: S, executor: E, completion: C) -> Self {
        Self {
            storage,
            executor,
            completion,
            identity: SessionIdentity::new(),
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }

    /// Replace the identity component.
    #[must_use]
    pub fn with_identity(mut self, identity: SessionIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Set how many past exchanges are sent as context.
    #[must_use]
    pub const fn with_context_window(mut self, exchanges: usize) -> Self {
        self.context_window = exchanges;
        self
    }

    /// History storage.
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Completion service.
    pub const fn completion(&self) -> &C {
        &self.completion
    }

    /// Decide the session for a request presenting `token`.
    #[must_use]
    pub fn identify(&self, token: Option<&str>) -> Identity {
        self.identity.identify(token)
    }

    /// Generate, run and record an artifact for `prompt`.
    ///
    /// Nothing is recorded when completion or staging fails.
    ///
    /// # Errors
    /// Returns error if history cannot be read or written, the completion
    /// service fails, or the artifact cannot be staged.
    pub async fn generate(
        &self,
        session: &SessionId,
        prompt: &str,
    ) -> Result<Generation, ManagerError> {
        let history = self
            .storage
            .load_recent(session, self.context_window)
            .await?;

        let text = self.completion.complete(&history, prompt).await?;
        let artifact = Artifact::from_completion(&text);
        let result = self.executor.run(&artifact).await?;

        self.storage
            .append(
                session,
                &Exchange::new(prompt, &artifact.code, &result.output),
            )
            .await?;

        tracing::info!(
            %session,
            kind = ?artifact.kind,
            context_entries = history.len(),
            "Generated and executed artifact"
        );

        Ok(Generation { artifact, result })
    }

    /// Re-run a user-edited artifact without touching history.
    ///
    /// # Errors
    /// Returns error if the artifact cannot be staged.
    pub async fn execute(&self, artifact: &Artifact) -> Result<ExecutionResult, ManagerError> {
        Ok(self.executor.run(artifact).await?)
    }
}
