//! Core abstractions for session-scoped code generation and execution.
//!
//! This crate provides the fundamental building blocks:
//! - `SessionId`, `Exchange`, `ContextEntry` - conversational history types
//! - `ArtifactKind`, `Artifact`, `ExecutionResult` - generated code and its results
//! - `HistoryStore`, `Executor`, `CompletionService` traits

pub mod artifact;
pub mod context;
pub mod traits;

pub use artifact::{Artifact, ArtifactKind, ExecutionResult};
pub use context::{ContextEntry, EntryRole, Exchange, SessionId};
pub use traits::{CompletionService, Executor, HistoryStore};
