use async_trait::async_trait;

pub mod openai_compat;
pub mod types;
pub use types::*;

/// Trait for the provider-protocol client (OpenAI-compatible endpoints, test doubles, ...).
/// Timeouts are the client's own concern; callers add none on top.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Recognize the text in an image. An empty string means the model
    /// answered with no text.
    async fn recognize(&self, request: OcrRequest) -> Result<String, AiError>;

    /// Translate `request.text`. When `on_chunk` is set and the mode streams,
    /// each fragment is passed to it as it arrives; the assembled text is
    /// returned either way.
    async fn translate(
        &self,
        request: TranslationRequest,
        on_chunk: Option<ChunkCallback>,
    ) -> Result<String, AiError>;

    /// Client name for logging
    fn name(&self) -> &str;
}
