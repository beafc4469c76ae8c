//! Integration tests for the request executor with mock provider clients.
//! Fully deterministic: no network, the display context is a `UiThread`.
//!
//! Run: cargo test --test executor_test

use async_trait::async_trait;
use lenslate_lib::ai::{AiError, ChunkCallback, OcrRequest, ProviderClient, TranslationRequest};
use lenslate_lib::catalog::{Catalog, IntegrationKind, Mode, ModeKey, Provider};
use lenslate_lib::display::{
    DisplayBridge, DisplayError, LivenessToken, OutputHandle, OutputSurface, UiThread,
};
use lenslate_lib::executor::{
    RequestExecutor, TranslationInput, EMPTY_OCR_RESPONSE, NO_OCR_PROVIDER,
    NO_TRANSLATION_PROVIDER,
};
use lenslate_lib::manager::SelectionManager;
use lenslate_lib::selection::MemorySelectionStore;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

// ---------------------------------------------------------------------------
// Mock implementations
// ---------------------------------------------------------------------------

/// Scripted client: streams `chunks` (when asked to) and records each request.
struct MockClient {
    chunks: Vec<String>,
    ocr_result: Result<String, String>,
    translations: Mutex<Vec<TranslationRequest>>,
    recognitions: Mutex<Vec<OcrRequest>>,
}

impl MockClient {
    fn streaming(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ocr_result: Ok("recognized".into()),
            translations: Mutex::new(Vec::new()),
            recognitions: Mutex::new(Vec::new()),
        }
    }

    fn with_ocr(result: Result<&str, &str>) -> Self {
        Self {
            ocr_result: result.map(String::from).map_err(String::from),
            ..Self::streaming(&[])
        }
    }
}

#[async_trait]
impl ProviderClient for MockClient {
    async fn recognize(&self, request: OcrRequest) -> Result<String, AiError> {
        self.recognitions.lock().push(request);
        self.ocr_result.clone().map_err(AiError::ConnectionError)
    }

    async fn translate(
        &self,
        request: TranslationRequest,
        on_chunk: Option<ChunkCallback>,
    ) -> Result<String, AiError> {
        self.translations.lock().push(request);
        if let Some(on_chunk) = on_chunk {
            for chunk in &self.chunks {
                on_chunk(chunk.clone());
            }
        }
        Ok(self.chunks.concat())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Streams `before`, reports which model it got, blocks until released, then
/// streams `after`.
struct GatedClient {
    before: Vec<String>,
    after: Vec<String>,
    entered: Mutex<Option<oneshot::Sender<String>>>,
    release: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
}

fn gated(
    before: &[&str],
    after: &[&str],
) -> (Arc<GatedClient>, oneshot::Receiver<String>, oneshot::Sender<()>) {
    let (entered_tx, entered_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel();
    let client = Arc::new(GatedClient {
        before: before.iter().map(|c| c.to_string()).collect(),
        after: after.iter().map(|c| c.to_string()).collect(),
        entered: Mutex::new(Some(entered_tx)),
        release: tokio::sync::Mutex::new(Some(release_rx)),
    });
    (client, entered_rx, release_tx)
}

#[async_trait]
impl ProviderClient for GatedClient {
    async fn recognize(&self, _request: OcrRequest) -> Result<String, AiError> {
        Err(AiError::ModelError("unused".into()))
    }

    async fn translate(
        &self,
        request: TranslationRequest,
        on_chunk: Option<ChunkCallback>,
    ) -> Result<String, AiError> {
        let emit = |chunks: &[String]| {
            if let Some(on_chunk) = on_chunk.as_ref() {
                for chunk in chunks {
                    on_chunk(chunk.clone());
                }
            }
        };
        emit(&self.before);
        let entered = self.entered.lock().take();
        if let Some(tx) = entered {
            let _ = tx.send(request.model.clone());
        }
        if let Some(rx) = self.release.lock().await.take() {
            let _ = rx.await;
        }
        emit(&self.after);
        Ok(format!("translated by {}", request.model))
    }

    fn name(&self) -> &str {
        "gated"
    }
}

struct FailingClient;

#[async_trait]
impl ProviderClient for FailingClient {
    async fn recognize(&self, _request: OcrRequest) -> Result<String, AiError> {
        Err(AiError::AuthError("invalid key".into()))
    }

    async fn translate(
        &self,
        _request: TranslationRequest,
        _on_chunk: Option<ChunkCallback>,
    ) -> Result<String, AiError> {
        Err(AiError::ConnectionError("connection refused".into()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SurfaceEvent {
    Clear,
    Reveal,
    Input(bool),
    Append(String),
}

const UI_THREAD: &str = "test-ui";

/// Records every call together with the name of the thread it ran on.
#[derive(Default)]
struct RecordingSurface {
    events: Mutex<Vec<SurfaceEvent>>,
    threads: Mutex<Vec<Option<String>>>,
}

impl RecordingSurface {
    fn record(&self, event: SurfaceEvent) {
        self.events.lock().push(event);
        self.threads
            .lock()
            .push(std::thread::current().name().map(String::from));
    }

    fn ran_only_on_ui_thread(&self) -> bool {
        self.threads
            .lock()
            .iter()
            .all(|name| name.as_deref() == Some(UI_THREAD))
    }
}

impl OutputSurface for RecordingSurface {
    fn clear(&self) {
        self.record(SurfaceEvent::Clear);
    }

    fn reveal(&self) {
        self.record(SurfaceEvent::Reveal);
    }

    fn set_input_enabled(&self, enabled: bool) {
        self.record(SurfaceEvent::Input(enabled));
    }

    fn append(&self, text: &str) {
        self.record(SurfaceEvent::Append(text.to_string()));
    }
}

struct QuietDisplay;

impl DisplayBridge for QuietDisplay {
    fn custom_backend_active(&self, _kind: IntegrationKind) -> bool {
        true
    }

    fn apply_custom_backend(&self, _kind: IntegrationKind) -> Result<(), DisplayError> {
        Ok(())
    }

    fn set_label(&self, _kind: IntegrationKind, _label: &str) -> Result<(), DisplayError> {
        Ok(())
    }

    fn set_checked(
        &self,
        _kind: IntegrationKind,
        _key: ModeKey,
        _checked: bool,
    ) -> Result<(), DisplayError> {
        Ok(())
    }

    fn show_error(&self, title: &str, detail: &str) {
        panic!("unexpected error dialog {}: {}", title, detail);
    }
}

fn provider(name: &str, model: &str) -> Provider {
    Provider {
        name: name.into(),
        api_url: format!("https://{}.example/v1/", name.to_lowercase()),
        api_key: format!("{}-key", name.to_lowercase()),
        model_name: model.into(),
        mode_config_path: None,
    }
}

fn streaming_mode() -> Mode {
    Mode {
        name: "Stream".into(),
        system_prompt: Some("Translate ${fromlang} into ${tolang}.".into()),
        user_prompt: Some("Text follows:".into()),
        streaming: Some(true),
        ..Mode::builtin(IntegrationKind::Translation)
    }
}

/// Manager with translation providers A (streaming) and B, plus one OCR provider.
fn manager() -> Arc<SelectionManager> {
    let manager = Arc::new(SelectionManager::new(
        Arc::new(MemorySelectionStore::new()),
        Arc::new(QuietDisplay),
    ));
    manager.install_catalog(Catalog::from_parts(
        IntegrationKind::Translation,
        vec![
            (provider("A", "model-a"), vec![streaming_mode()]),
            (provider("B", "model-b"), vec![]),
        ],
    ));
    manager.install_catalog(Catalog::from_parts(
        IntegrationKind::Ocr,
        vec![(provider("O", "vision"), vec![])],
    ));
    manager
}

struct Harness {
    manager: Arc<SelectionManager>,
    executor: Arc<RequestExecutor>,
    ui: Arc<UiThread>,
}

fn harness(client: Arc<dyn ProviderClient>) -> Harness {
    let manager = manager();
    let ui = Arc::new(UiThread::spawn(UI_THREAD).unwrap());
    let executor = Arc::new(RequestExecutor::new(
        Arc::clone(&manager),
        client,
        ui.clone(),
    ));
    Harness {
        manager,
        executor,
        ui,
    }
}

fn input(text: &str) -> TranslationInput {
    TranslationInput {
        text: text.into(),
        from: "English".into(),
        to: "German".into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Chunks arrive in order; the surface is prepared once, before the first append.
#[tokio::test]
async fn streamed_chunks_reach_the_surface_in_order() {
    let client = Arc::new(MockClient::streaming(&["He", "llo"]));
    let h = harness(client.clone());
    h.manager
        .switch_to(IntegrationKind::Translation, ModeKey::new(0, 0), true);

    let surface = Arc::new(RecordingSurface::default());
    let output = OutputHandle::new(LivenessToken::new(), surface.clone());
    let result = h.executor.translate(input("hello"), Some(output)).await;
    h.ui.flush().await;

    assert_eq!(result, "Hello");
    assert_eq!(
        *surface.events.lock(),
        vec![
            SurfaceEvent::Clear,
            SurfaceEvent::Reveal,
            SurfaceEvent::Input(false),
            SurfaceEvent::Append("He".into()),
            SurfaceEvent::Append("llo".into()),
        ]
    );
    assert!(surface.ran_only_on_ui_thread());
}

/// A torn-down surface receives nothing, but the text is still returned.
#[tokio::test]
async fn revoked_surface_is_left_alone() {
    let client = Arc::new(MockClient::streaming(&["a", "b"]));
    let h = harness(client);
    h.manager
        .switch_to(IntegrationKind::Translation, ModeKey::new(0, 0), true);

    let token = LivenessToken::new();
    token.revoke();
    let surface = Arc::new(RecordingSurface::default());
    let output = OutputHandle::new(token, surface.clone());
    let result = h.executor.translate(input("x"), Some(output)).await;
    h.ui.flush().await;

    assert_eq!(result, "ab");
    assert!(surface.events.lock().is_empty());
}

/// Closing the window mid-stream stops output after the chunks already shown.
#[tokio::test]
async fn surface_torn_down_mid_stream_drops_later_chunks() {
    let (client, entered, release) = gated(&["first"], &["second", "third"]);
    let h = harness(client);
    h.manager
        .switch_to(IntegrationKind::Translation, ModeKey::new(0, 0), true);

    let token = LivenessToken::new();
    let surface = Arc::new(RecordingSurface::default());
    let output = OutputHandle::new(token.clone(), surface.clone());
    let executor = Arc::clone(&h.executor);
    let task = tokio::spawn(async move { executor.translate(input("x"), Some(output)).await });

    entered.await.unwrap();
    h.ui.flush().await;
    token.revoke();
    release.send(()).unwrap();

    assert_eq!(task.await.unwrap(), "translated by model-a");
    h.ui.flush().await;
    assert_eq!(
        *surface.events.lock(),
        vec![
            SurfaceEvent::Clear,
            SurfaceEvent::Reveal,
            SurfaceEvent::Input(false),
            SurfaceEvent::Append("first".into()),
        ]
    );
    assert!(surface.ran_only_on_ui_thread());
}

/// Non-streaming modes never get a chunk callback.
#[tokio::test]
async fn non_streaming_mode_returns_whole_text() {
    let client = Arc::new(MockClient::streaming(&["whole"]));
    let h = harness(client);
    h.manager
        .switch_to(IntegrationKind::Translation, ModeKey::new(1, 0), true);

    let surface = Arc::new(RecordingSurface::default());
    let output = OutputHandle::new(LivenessToken::new(), surface.clone());
    let result = h.executor.translate(input("x"), Some(output)).await;
    h.ui.flush().await;

    assert_eq!(result, "whole");
    assert!(surface.events.lock().is_empty());
}

/// The request carries expanded templates; the catalog's mode is unchanged.
#[tokio::test]
async fn request_gets_expanded_copy_of_mode() {
    let client = Arc::new(MockClient::streaming(&["ok"]));
    let h = harness(client.clone());
    h.manager
        .switch_to(IntegrationKind::Translation, ModeKey::new(0, 0), true);

    h.executor
        .translate(
            TranslationInput {
                text: "bonjour".into(),
                from: "auto".into(),
                to: String::new(),
            },
            None,
        )
        .await;

    let requests = client.translations.lock();
    let request = &requests[0];
    assert_eq!(request.text, "bonjour");
    assert_eq!(request.endpoint, "https://a.example/v1/chat/completions");
    assert_eq!(request.api_key, "a-key");
    assert_eq!(request.model, "model-a");
    assert_eq!(
        request.mode.system_prompt.as_deref(),
        Some("Translate Auto Detect into Simplified Chinese.")
    );

    let active = h.manager.snapshot(IntegrationKind::Translation).unwrap();
    assert_eq!(
        active.mode.system_prompt.as_deref(),
        Some("Translate ${fromlang} into ${tolang}.")
    );
}

/// Without a selection neither request reaches the client.
#[tokio::test]
async fn missing_selection_returns_guidance() {
    let client = Arc::new(MockClient::streaming(&["unused"]));
    let ui = Arc::new(UiThread::spawn(UI_THREAD).unwrap());
    let manager = Arc::new(SelectionManager::new(
        Arc::new(MemorySelectionStore::new()),
        Arc::new(QuietDisplay),
    ));
    let executor = RequestExecutor::new(manager, client.clone(), ui);

    assert_eq!(executor.translate(input("x"), None).await, NO_TRANSLATION_PROVIDER);
    assert_eq!(executor.recognize(vec![1, 2, 3]).await, NO_OCR_PROVIDER);
    assert!(client.translations.lock().is_empty());
    assert!(client.recognitions.lock().is_empty());
}

#[tokio::test]
async fn ocr_returns_recognized_text() {
    let client = Arc::new(MockClient::with_ocr(Ok("Line 1\nLine 2")));
    let h = harness(client.clone());
    h.manager
        .switch_to(IntegrationKind::Ocr, ModeKey::new(0, 0), true);

    assert_eq!(h.executor.recognize(vec![0x89, b'P']).await, "Line 1\nLine 2");
    let requests = client.recognitions.lock();
    assert_eq!(requests[0].image, vec![0x89, b'P']);
    assert_eq!(requests[0].model, "vision");
    assert_eq!(requests[0].mode.temperature, 0.5);
}

#[tokio::test]
async fn blank_ocr_response_is_reported() {
    let client = Arc::new(MockClient::with_ocr(Ok("  \n ")));
    let h = harness(client);
    h.manager
        .switch_to(IntegrationKind::Ocr, ModeKey::new(0, 0), true);

    assert_eq!(h.executor.recognize(vec![1]).await, EMPTY_OCR_RESPONSE);
}

/// Transport and auth failures come back as readable text.
#[tokio::test]
async fn failures_are_returned_as_text() {
    let h = harness(Arc::new(FailingClient));
    h.manager
        .switch_to(IntegrationKind::Translation, ModeKey::new(0, 0), true);
    h.manager
        .switch_to(IntegrationKind::Ocr, ModeKey::new(0, 0), true);

    let translated = h.executor.translate(input("x"), None).await;
    assert!(translated.starts_with("Translation failed:"));
    assert!(translated.contains("connection refused"));

    let recognized = h.executor.recognize(vec![1]).await;
    assert!(recognized.starts_with("OCR request failed:"));
    assert!(recognized.contains("invalid key"));
}

/// A switch while a request is in flight does not affect that request.
#[tokio::test]
async fn in_flight_request_keeps_its_snapshot() {
    let (client, entered_rx, release_tx) = gated(&[], &[]);
    let h = harness(client);
    h.manager
        .switch_to(IntegrationKind::Translation, ModeKey::new(0, 0), false);

    let executor = Arc::clone(&h.executor);
    let task = tokio::spawn(async move { executor.translate(input("x"), None).await });

    assert_eq!(entered_rx.await.unwrap(), "model-a");
    h.manager
        .switch_to(IntegrationKind::Translation, ModeKey::new(1, 0), false);
    release_tx.send(()).unwrap();

    assert_eq!(task.await.unwrap(), "translated by model-a");
    assert_eq!(
        h.manager
            .snapshot(IntegrationKind::Translation)
            .unwrap()
            .provider
            .name,
        "B"
    );
}
