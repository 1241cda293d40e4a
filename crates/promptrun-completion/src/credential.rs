//! API credential loading.

use std::path::Path;

use promptrun_core::traits::CompletionError;

/// Environment variable consulted when the key file is absent or empty.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Read the API credential once at startup.
///
/// The key file wins; the environment is only a fallback.
///
/// # Errors
/// Returns `MissingCredential` if neither source yields a non-empty key.
pub fn load_credential(key_file: &Path) -> Result<String, CompletionError> {
    load_credential_with(key_file, std::env::var(API_KEY_ENV).ok())
}

fn load_credential_with(key_file: &Path, env: Option<String>) -> Result<String, CompletionError> {
    match std::fs::read_to_string(key_file) {
        Ok(contents) if !contents.trim().is_empty() => return Ok(contents.trim().to_string()),
        Ok(_) => tracing::warn!(path = %key_file.display(), "API key file is empty"),
        Err(e) => tracing::debug!(path = %key_file.display(), "API key file unreadable: {e}"),
    }

    env.map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .ok_or(CompletionError::MissingCredential)
}
