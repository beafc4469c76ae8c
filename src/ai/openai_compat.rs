use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::{
    prompt_messages, AiError, ChatMessage, ChunkCallback, OcrRequest, ProviderClient, TextStream,
    TranslationRequest,
};
use crate::catalog::PromptRole;

/// Client for OpenAI-compatible `chat/completions` endpoints.
pub struct OpenAiCompatClient {
    client: Client,
}

impl OpenAiCompatClient {
    pub fn new(timeout: Duration) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::ConnectionError(e.to_string()))?;
        Ok(Self { client })
    }

    async fn post(
        &self,
        endpoint: &str,
        api_key: &str,
        body: &Value,
    ) -> Result<reqwest::Response, AiError> {
        let mut req = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/json");
        if !api_key.is_empty() {
            req = req.bearer_auth(api_key);
        }

        let response = req
            .json(body)
            .send()
            .await
            .map_err(|e| AiError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error body".into());
        Err(match status.as_u16() {
            401 | 403 => AiError::AuthError(error_body),
            429 => AiError::RateLimited {
                retry_after_ms: 1000,
            },
            _ => AiError::ConnectionError(format!("HTTP {}: {}", status, error_body)),
        })
    }
}

/// `data:` URL for an image, with the MIME type sniffed from its bytes.
fn image_data_url(image: &[u8]) -> String {
    let mime = image::guess_format(image)
        .map(|format| format.to_mime_type())
        .unwrap_or("image/png");
    format!("data:{};base64,{}", mime, BASE64.encode(image))
}

fn build_ocr_body(request: &OcrRequest) -> Value {
    let mode = &request.mode;
    let image_part = json!({
        "type": "image_url",
        "image_url": { "url": image_data_url(&request.image) }
    });

    let user_message = |text: Option<&str>| {
        let mut parts = Vec::new();
        if let Some(text) = text {
            parts.push(json!({ "type": "text", "text": text }));
        }
        parts.push(image_part.clone());
        json!({ "role": "user", "content": parts })
    };

    let mut messages = Vec::new();
    let mut image_placed = false;
    for &role in &mode.prompt_order {
        match role {
            PromptRole::User if !image_placed => {
                messages.push(user_message(mode.user_prompt.as_deref()));
                image_placed = true;
            }
            PromptRole::User => {}
            other => {
                if let Some(text) = mode.template(other) {
                    messages.push(json!(ChatMessage::new(other, text)));
                }
            }
        }
    }
    if !image_placed {
        messages.push(user_message(None));
    }

    json!({
        "model": request.model,
        "temperature": mode.temperature,
        "messages": messages,
    })
}

fn build_translation_body(request: &TranslationRequest, stream: bool) -> Value {
    let mut messages = prompt_messages(&request.mode);
    messages.push(ChatMessage::new(PromptRole::User, request.text.clone()));
    json!({
        "model": request.model,
        "temperature": request.mode.temperature,
        "messages": messages,
        "stream": stream,
    })
}

fn message_content(body: &Value) -> Result<String, AiError> {
    if let Some(message) = body.pointer("/error/message").and_then(|m| m.as_str()) {
        return Err(AiError::ModelError(message.to_string()));
    }
    body.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| AiError::InvalidResponse("missing choices[0].message.content".into()))
}

#[async_trait]
impl ProviderClient for OpenAiCompatClient {
    async fn recognize(&self, request: OcrRequest) -> Result<String, AiError> {
        let body = build_ocr_body(&request);
        let response = self.post(&request.endpoint, &request.api_key, &body).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(e.to_string()))?;
        message_content(&value)
    }

    async fn translate(
        &self,
        request: TranslationRequest,
        on_chunk: Option<ChunkCallback>,
    ) -> Result<String, AiError> {
        let stream = request.mode.streaming_enabled();
        let body = build_translation_body(&request, stream);
        let response = self.post(&request.endpoint, &request.api_key, &body).await?;

        if !stream {
            let value: Value = response
                .json()
                .await
                .map_err(|e| AiError::InvalidResponse(e.to_string()))?;
            return message_content(&value);
        }

        let mut chunks = ChatCompletionStream::new(response);
        let mut assembled = String::new();
        while let Some(chunk) = chunks.next_chunk().await {
            let chunk = chunk?;
            assembled.push_str(&chunk);
            if let Some(callback) = on_chunk.as_ref() {
                callback(chunk);
            }
        }
        Ok(assembled)
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

/// Streaming SSE reader for chat completions
pub struct ChatCompletionStream {
    // Raw bytes: a UTF-8 sequence may be split across network reads.
    buffer: Vec<u8>,
    done: bool,
    response: Option<reqwest::Response>,
}

impl ChatCompletionStream {
    fn new(response: reqwest::Response) -> Self {
        Self {
            buffer: Vec::new(),
            done: false,
            response: Some(response),
        }
    }
}

/// Parse a single SSE `data:` payload.
enum ParseResult {
    Delta(String),
    Done,
    Skip,
    Error(AiError),
}

fn parse_sse_data(data: &str) -> ParseResult {
    let trimmed = data.trim();
    if trimmed == "[DONE]" {
        return ParseResult::Done;
    }

    let parsed: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            return ParseResult::Error(AiError::InvalidResponse(format!(
                "Invalid JSON in SSE: {}",
                e
            )));
        }
    };

    if let Some(message) = parsed.pointer("/error/message").and_then(|m| m.as_str()) {
        return ParseResult::Error(AiError::ModelError(message.to_string()));
    }

    match parsed
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
    {
        Some(delta) if !delta.is_empty() => ParseResult::Delta(delta.to_string()),
        _ => ParseResult::Skip,
    }
}

fn parse_sse_line(line: &str) -> Option<ParseResult> {
    let data = line.strip_prefix("data:")?;
    Some(parse_sse_data(data))
}

#[async_trait]
impl TextStream for ChatCompletionStream {
    async fn next_chunk(&mut self) -> Option<Result<String, AiError>> {
        if self.done {
            return None;
        }

        loop {
            if let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
                let line = String::from_utf8_lossy(&raw[..newline_pos]);
                let line = line.trim_end_matches('\r');

                // Comments, event:, id: and retry: lines fall through here.
                match parse_sse_line(line) {
                    Some(ParseResult::Delta(text)) => return Some(Ok(text)),
                    Some(ParseResult::Done) => {
                        self.done = true;
                        return None;
                    }
                    Some(ParseResult::Error(e)) => return Some(Err(e)),
                    Some(ParseResult::Skip) | None => continue,
                }
            }

            let response = match self.response.as_mut() {
                Some(r) => r,
                None => {
                    self.done = true;
                    return None;
                }
            };

            match response.chunk().await {
                Ok(Some(bytes)) => {
                    self.buffer.extend_from_slice(&bytes);
                }
                Ok(None) => {
                    self.done = true;
                    let remaining = std::mem::take(&mut self.buffer);
                    let remaining = String::from_utf8_lossy(&remaining);
                    return match parse_sse_line(remaining.trim()) {
                        Some(ParseResult::Delta(text)) => Some(Ok(text)),
                        Some(ParseResult::Error(e)) => Some(Err(e)),
                        _ => None,
                    };
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(AiError::ConnectionError(format!(
                        "Stream read error: {}",
                        e
                    ))));
                }
            }
        }
    }
}
