// executor.rs - Runs OCR and translation requests against the active selection.
//
// Each call snapshots the selection before doing anything else and runs the
// network request on a spawned tokio task. Failures come back as text; nothing
// here returns an error to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ai::{ChunkCallback, OcrRequest, ProviderClient, TranslationRequest};
use crate::catalog::{IntegrationKind, Mode};
use crate::display::{DisplayContext, OutputHandle};
use crate::manager::SelectionManager;
use crate::placeholder::expand;

pub const CHAT_COMPLETIONS_SUFFIX: &str = "/chat/completions";

pub const NO_OCR_PROVIDER: &str =
    "No AI OCR provider selected. Configure one in the AI provider settings.";
pub const NO_TRANSLATION_PROVIDER: &str =
    "No AI translation provider selected. Configure one in the AI provider settings.";
pub const EMPTY_OCR_RESPONSE: &str = "The AI provider returned an empty response.";

/// `api_url` without trailing slashes, with the chat completions path appended
/// unless it is already there.
pub fn chat_endpoint(api_url: &str) -> String {
    let base = api_url.trim_end_matches('/');
    if base.ends_with(CHAT_COMPLETIONS_SUFFIX) {
        base.to_string()
    } else {
        format!("{}{}", base, CHAT_COMPLETIONS_SUFFIX)
    }
}

/// Copy of `mode` with the language tokens expanded in every template.
/// The original is left untouched.
pub fn prepare_mode(mode: &Mode, from: &str, to: &str) -> Mode {
    Mode {
        system_prompt: expand(mode.system_prompt.as_deref(), from, to),
        user_prompt: expand(mode.user_prompt.as_deref(), from, to),
        assistant_prompt: expand(mode.assistant_prompt.as_deref(), from, to),
        ..mode.clone()
    }
}

/// Callback that forwards streamed chunks to `output` on the display context.
///
/// The first chunk clears the surface, reveals it and disables input before
/// it is appended. Once the surface's token is revoked every job is a no-op.
pub fn streaming_callback(ui: Arc<dyn DisplayContext>, output: OutputHandle) -> ChunkCallback {
    let started = Arc::new(AtomicBool::new(false));
    Arc::new(move |chunk: String| {
        let output = output.clone();
        let started = Arc::clone(&started);
        ui.post(Box::new(move || {
            if !started.swap(true, Ordering::SeqCst) {
                output.with_surface(|s| s.clear());
                output.with_surface(|s| s.reveal());
                output.with_surface(|s| s.set_input_enabled(false));
            }
            output.with_surface(|s| s.append(&chunk));
        }));
    })
}

#[derive(Debug, Clone, Default)]
pub struct TranslationInput {
    pub text: String,
    pub from: String,
    pub to: String,
}

pub struct RequestExecutor {
    manager: Arc<SelectionManager>,
    client: Arc<dyn ProviderClient>,
    ui: Arc<dyn DisplayContext>,
}

impl RequestExecutor {
    pub fn new(
        manager: Arc<SelectionManager>,
        client: Arc<dyn ProviderClient>,
        ui: Arc<dyn DisplayContext>,
    ) -> Self {
        Self {
            manager,
            client,
            ui,
        }
    }

    /// Recognize the text in `image` with the active OCR selection.
    pub async fn recognize(&self, image: Vec<u8>) -> String {
        let Some(selection) = self.manager.snapshot(IntegrationKind::Ocr) else {
            return NO_OCR_PROVIDER.to_string();
        };

        let request = OcrRequest {
            image,
            endpoint: chat_endpoint(&selection.provider.api_url),
            api_key: selection.provider.api_key.clone(),
            model: selection.provider.model_name.clone(),
            mode: Arc::clone(&selection.mode),
        };
        log::info!(
            "OCR request via {} on {} client ({} bytes)",
            selection.label(),
            self.client.name(),
            request.image.len()
        );

        let client = Arc::clone(&self.client);
        match tokio::spawn(async move { client.recognize(request).await }).await {
            Ok(Ok(text)) if text.trim().is_empty() => {
                log::warn!("OCR via {}: empty response", selection.label());
                EMPTY_OCR_RESPONSE.to_string()
            }
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                log::error!("OCR via {} failed: {}", selection.label(), e);
                format!("OCR request failed: {}", e)
            }
            Err(e) => {
                log::error!("OCR task failed: {}", e);
                format!("OCR request failed: {}", e)
            }
        }
    }

    /// Translate `input` with the active translation selection.
    ///
    /// When the mode streams and `output` is given, chunks are written to it
    /// as they arrive. The assembled text is returned in every case.
    pub async fn translate(
        &self,
        input: TranslationInput,
        output: Option<OutputHandle>,
    ) -> String {
        let Some(selection) = self.manager.snapshot(IntegrationKind::Translation) else {
            return NO_TRANSLATION_PROVIDER.to_string();
        };

        let mode = prepare_mode(&selection.mode, &input.from, &input.to);
        let on_chunk = if mode.streaming_enabled() {
            output.map(|output| streaming_callback(Arc::clone(&self.ui), output))
        } else {
            None
        };
        let request = TranslationRequest {
            text: input.text,
            endpoint: chat_endpoint(&selection.provider.api_url),
            api_key: selection.provider.api_key.clone(),
            model: selection.provider.model_name.clone(),
            mode,
        };
        log::info!(
            "Translation request via {} on {} client (streaming={})",
            selection.label(),
            self.client.name(),
            on_chunk.is_some()
        );

        let client = Arc::clone(&self.client);
        match tokio::spawn(async move { client.translate(request, on_chunk).await }).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                log::error!("Translation via {} failed: {}", selection.label(), e);
                format!("Translation failed: {}", e)
            }
            Err(e) => {
                log::error!("Translation task failed: {}", e);
                format!("Translation failed: {}", e)
            }
        }
    }
}
