//! Completion service client.
//!
//! Provides:
//! - `OpenAiCompletion` - chat-completions client producing code text
//! - Credential loading from a key file or the environment

pub mod credential;
pub mod openai;

pub use credential::load_credential;
pub use openai::OpenAiCompletion;
