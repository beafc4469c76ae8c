use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::{Mode, PromptRole};

/// Receives each streamed text fragment, in order, from the client's task.
pub type ChunkCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Error type for provider-protocol calls
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("Connection failed: {0}")]
    ConnectionError(String),
    #[error("Authentication failed: {0}")]
    AuthError(String),
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("Model error: {0}")]
    ModelError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Trait for streaming text responses (chunk by chunk)
#[async_trait::async_trait]
pub trait TextStream: Send {
    /// Get the next text chunk. Returns None when the stream is complete.
    async fn next_chunk(&mut self) -> Option<Result<String, AiError>>;
}

/// A chat message as sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: PromptRole, content: impl Into<String>) -> Self {
        Self {
            role: role.as_str().to_string(),
            content: content.into(),
        }
    }
}

/// Messages for `mode` in its prompt order. Roles without a template are left out.
pub fn prompt_messages(mode: &Mode) -> Vec<ChatMessage> {
    mode.prompt_order
        .iter()
        .filter_map(|&role| mode.template(role).map(|text| ChatMessage::new(role, text)))
        .collect()
}

/// Everything needed to recognize text in one image.
#[derive(Debug, Clone)]
pub struct OcrRequest {
    pub image: Vec<u8>,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub mode: Arc<Mode>,
}

/// A translation call. `mode` already has its language tokens expanded.
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub text: String,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub mode: Mode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IntegrationKind;

    #[test]
    fn prompt_messages_follow_order_and_skip_missing() {
        let mode = Mode {
            system_prompt: Some("sys".into()),
            user_prompt: Some(String::new()),
            assistant_prompt: None,
            prompt_order: vec![PromptRole::User, PromptRole::Assistant, PromptRole::System],
            ..Mode::builtin(IntegrationKind::Translation)
        };
        let messages = prompt_messages(&mode);
        assert_eq!(
            messages,
            vec![
                ChatMessage::new(PromptRole::User, ""),
                ChatMessage::new(PromptRole::System, "sys"),
            ]
        );
    }
}
