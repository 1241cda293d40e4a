//! Wire protocol for browser-server communication.

use promptrun_core::ArtifactKind;
use promptrun_session::Generation;
use serde::{Deserialize, Serialize};

/// Form body of `POST /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateForm {
    #[serde(default)]
    pub prompt: String,
}

/// Reply to `POST /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub code: String,
    pub file_type: ArtifactKind,
    pub output: String,
}

impl From<Generation> for GenerateResponse {
    fn from(generation: Generation) -> Self {
        Self {
            code: generation.artifact.code,
            file_type: generation.artifact.kind,
            output: generation.result.output,
        }
    }
}

/// JSON body of `POST /execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    pub file_type: ArtifactKind,
}

/// Reply to `POST /execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub output: String,
}

/// Error reply for failed requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
