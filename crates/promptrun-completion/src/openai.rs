//! Chat-completions client for OpenAI-compatible endpoints.

use async_trait::async_trait;
use promptrun_core::{CompletionService, ContextEntry, EntryRole, traits::CompletionError};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "o1-mini";

/// Appended to every prompt so replies come back as a single code block.
pub const CODE_INSTRUCTION: &str = "\nPlease return only raw code in a single fenced block tagged \
     `python` or `bash`. No explanations, no docstrings, just raw code.";

/// Prefix for prior execution output replayed as context.
pub const OUTPUT_PREFIX: &str = "Output of the previous program:\n";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Completion service calling `<base_url>/chat/completions`.
pub struct OpenAiCompletion {
    client: Client,
    base_url: String,
    model: String,
    credential: String,
}

impl OpenAiCompletion {
    /// Create a client for the default endpoint and model.
    #[must_use]
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            credential: credential.into(),
        }
    }

    /// Use a custom base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Use a different model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Build the chat transcript sent for `prompt`.
    #[must_use]
    pub fn build_messages(history: &[ContextEntry], prompt: &str) -> Vec<Message> {
        let mut messages: Vec<Message> = history
            .iter()
            .map(|entry| match entry.role {
                EntryRole::Prompt => Message {
                    role: "user",
                    content: entry.content.clone(),
                },
                EntryRole::Artifact => Message {
                    role: "assistant",
                    content: entry.content.clone(),
                },
                EntryRole::Output => Message {
                    role: "user",
                    content: format!("{OUTPUT_PREFIX}{}", entry.content),
                },
            })
            .collect();
        messages.push(Message {
            role: "user",
            content: format!("{prompt}{CODE_INSTRUCTION}"),
        });
        messages
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletion {
    async fn complete(
        &self,
        history: &[ContextEntry],
        prompt: &str,
    ) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: Self::build_messages(history, prompt),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.credential)
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "Completion request rejected");
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Request(e.to_string()))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(CompletionError::Empty)
    }
}
