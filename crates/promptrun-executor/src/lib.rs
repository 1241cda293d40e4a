//! Artifact execution engine.
//!
//! Provides:
//! - `ExecutionEngine` - stage, run and record generated artifacts
//! - Interpreter command building and lookup
//! - Presentation sinks for best-effort live display
//! - Rolling transcript writer

pub mod command;
pub mod engine;
pub mod resolve;
pub mod sink;
pub mod transcript;

pub use command::{CommandBuilder, CommandParts};
pub use engine::{ArtifactNaming, EngineConfig, ExecutionEngine};
pub use sink::{NoopSink, PresentationSink, TerminalSink};
pub use transcript::Transcript;
