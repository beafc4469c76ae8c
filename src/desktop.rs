// desktop.rs - Tauri shell: display bridge, commands and app entry point.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tauri::{AppHandle, Emitter, Manager, WindowEvent};
use tauri_plugin_dialog::{DialogExt, MessageDialogKind};

use crate::ai::openai_compat::OpenAiCompatClient;
use crate::bootstrap::{self, Services};
use crate::catalog::{IntegrationKind, ModeKey};
use crate::display::{
    DisplayBridge, DisplayContext, DisplayError, LivenessToken, OutputHandle, OutputSurface, UiJob,
};
use crate::executor::{RequestExecutor, TranslationInput};
use crate::manager::SelectionManager;
use crate::settings::{Backend, Settings, SETTINGS_FILE};
use crate::tray::{self, TrayItems};

pub const OUTPUT_WINDOW: &str = "translation";

/// Payload emitted on `selection:label` events.
#[derive(Clone, Serialize)]
pub struct LabelPayload {
    pub kind: IntegrationKind,
    pub label: String,
}

/// Payload emitted on `backend:changed` events.
#[derive(Clone, Serialize)]
pub struct BackendPayload {
    pub kind: IntegrationKind,
    pub backend: Backend,
}

/// Payload emitted on `translation:chunk` events.
#[derive(Clone, Serialize)]
pub struct ChunkPayload {
    pub text: String,
}

/// Display bridge backed by the tray menu, window events and the settings file.
pub struct TauriDisplay {
    app: AppHandle,
    settings: Arc<Mutex<Settings>>,
    settings_path: PathBuf,
    items: RwLock<TrayItems>,
}

impl TauriDisplay {
    pub fn new(app: AppHandle, settings: Arc<Mutex<Settings>>, settings_path: PathBuf) -> Self {
        Self {
            app,
            settings,
            settings_path,
            items: RwLock::new(TrayItems::default()),
        }
    }

    pub fn replace_items(&self, items: TrayItems) {
        *self.items.write() = items;
    }
}

fn failed(e: impl std::fmt::Display) -> DisplayError {
    DisplayError::Failed(e.to_string())
}

impl DisplayBridge for TauriDisplay {
    fn custom_backend_active(&self, kind: IntegrationKind) -> bool {
        self.settings.lock().backend(kind) == Backend::CustomAi
    }

    fn apply_custom_backend(&self, kind: IntegrationKind) -> Result<(), DisplayError> {
        {
            let mut settings = self.settings.lock();
            settings.set_backend(kind, Backend::CustomAi);
            settings.save(&self.settings_path).map_err(failed)?;
        }
        self.app
            .emit(
                "backend:changed",
                BackendPayload {
                    kind,
                    backend: Backend::CustomAi,
                },
            )
            .map_err(failed)
    }

    fn set_label(&self, kind: IntegrationKind, label: &str) -> Result<(), DisplayError> {
        if let Some(item) = self.items.read().labels.get(&kind) {
            item.set_text(label).map_err(failed)?;
        }
        self.app
            .emit(
                "selection:label",
                LabelPayload {
                    kind,
                    label: label.to_string(),
                },
            )
            .map_err(failed)
    }

    fn set_checked(
        &self,
        kind: IntegrationKind,
        key: ModeKey,
        checked: bool,
    ) -> Result<(), DisplayError> {
        let items = self.items.read();
        let item = items
            .checks
            .get(&(kind, key))
            .ok_or_else(|| DisplayError::MissingElement(crate::context::menu_id(kind, key)))?;
        item.set_checked(checked).map_err(failed)
    }

    fn show_error(&self, title: &str, detail: &str) {
        self.app
            .dialog()
            .message(detail)
            .title(title)
            .kind(MessageDialogKind::Error)
            .show(|_| {});
    }
}

impl DisplayContext for TauriDisplay {
    fn post(&self, job: UiJob) {
        if let Err(e) = self.app.run_on_main_thread(job) {
            log::warn!("Main thread unavailable, dropping UI job: {}", e);
        }
    }
}

/// The translation window, reached through frontend events.
struct WindowSurface {
    app: AppHandle,
}

impl OutputSurface for WindowSurface {
    fn clear(&self) {
        let _ = self.app.emit_to(OUTPUT_WINDOW, "translation:clear", ());
    }

    fn reveal(&self) {
        if let Some(win) = self.app.get_webview_window(OUTPUT_WINDOW) {
            let _ = win.show();
            let _ = win.set_focus();
        }
    }

    fn set_input_enabled(&self, enabled: bool) {
        let _ = self.app.emit_to(OUTPUT_WINDOW, "translation:input", enabled);
    }

    fn append(&self, text: &str) {
        let _ = self.app.emit_to(
            OUTPUT_WINDOW,
            "translation:chunk",
            ChunkPayload {
                text: text.to_string(),
            },
        );
    }
}

pub struct AppState {
    pub manager: Arc<SelectionManager>,
    pub executor: Arc<RequestExecutor>,
    pub display: Arc<TauriDisplay>,
    pub settings: Arc<Mutex<Settings>>,
    pub config_dir: PathBuf,
    output_token: Mutex<LivenessToken>,
}

impl AppState {
    /// Token for the output window. A fresh one is issued once the window
    /// exists again after being destroyed.
    fn output_handle(&self, app: &AppHandle) -> OutputHandle {
        let mut token = self.output_token.lock();
        if !token.is_alive() && app.get_webview_window(OUTPUT_WINDOW).is_some() {
            *token = LivenessToken::new();
        }
        OutputHandle::new(token.clone(), Arc::new(WindowSurface { app: app.clone() }))
    }
}

/// Reload both provider lists, rebuild the tray menu and re-derive checks.
pub fn reload_all(app: &AppHandle) -> Result<[bool; 2], String> {
    let state = app.state::<AppState>();
    let settings = state.settings.lock().clone();
    let catalogs = bootstrap::load_catalogs(&settings, &state.config_dir);

    let (menu, items) =
        tray::build_menu(app, &[&catalogs[0], &catalogs[1]]).map_err(|e| e.to_string())?;
    tray::replace_menu(app, menu).map_err(|e| e.to_string())?;
    state.display.replace_items(items);

    let configured = [!catalogs[0].is_empty(), !catalogs[1].is_empty()];
    for catalog in catalogs {
        state.manager.install_catalog(catalog);
    }
    Ok(configured)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderView {
    pub name: String,
    pub model_name: String,
    pub modes: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionView {
    pub provider: String,
    pub mode: String,
    pub label: String,
}

#[tauri::command]
fn list_providers(
    state: tauri::State<'_, AppState>,
    kind: IntegrationKind,
) -> Vec<ProviderView> {
    state
        .manager
        .catalog(kind)
        .entries()
        .iter()
        .map(|entry| ProviderView {
            name: entry.provider.name.clone(),
            model_name: entry.provider.model_name.clone(),
            modes: entry.modes.iter().map(|m| m.name.clone()).collect(),
        })
        .collect()
}

#[tauri::command]
fn active_selection(
    state: tauri::State<'_, AppState>,
    kind: IntegrationKind,
) -> Option<SelectionView> {
    state.manager.snapshot(kind).map(|sel| SelectionView {
        provider: sel.provider.name.clone(),
        mode: sel.mode.name.clone(),
        label: sel.label(),
    })
}

/// User-driven switch. Sync commands run on the main thread, which keeps
/// every selection write on the display context.
#[tauri::command]
fn switch_selection(
    state: tauri::State<'_, AppState>,
    kind: IntegrationKind,
    provider: usize,
    mode: usize,
) -> Result<(), String> {
    if state.manager.switch_to(kind, ModeKey::new(provider, mode), false) {
        Ok(())
    } else {
        Err(format!("No {} provider/mode at {}:{}", kind, provider, mode))
    }
}

#[tauri::command]
fn reload_providers(app: AppHandle) -> Result<[bool; 2], String> {
    reload_all(&app)
}

#[tauri::command]
async fn recognize(
    state: tauri::State<'_, AppState>,
    image_base64: String,
) -> Result<String, String> {
    let image = BASE64
        .decode(image_base64.trim())
        .map_err(|e| format!("Invalid image data: {}", e))?;
    Ok(state.executor.recognize(image).await)
}

#[tauri::command]
async fn translate(
    app: AppHandle,
    state: tauri::State<'_, AppState>,
    text: String,
    from: String,
    to: String,
) -> Result<String, String> {
    let output = state.output_handle(&app);
    let input = TranslationInput { text, from, to };
    Ok(state.executor.translate(input, Some(output)).await)
}

fn setup(app: &mut tauri::App) -> Result<(), Box<dyn std::error::Error>> {
    let handle = app.handle().clone();
    let config_dir = app.path().app_config_dir()?;
    std::fs::create_dir_all(&config_dir)?;
    let settings_path = config_dir.join(SETTINGS_FILE);
    let settings = Settings::load(&settings_path).unwrap_or_else(|e| {
        log::error!("Falling back to default settings: {}", e);
        Settings::default()
    });

    let catalogs = bootstrap::load_catalogs(&settings, &config_dir);
    let (menu, items) = tray::build_menu(&handle, &[&catalogs[0], &catalogs[1]])?;
    tray::setup_tray(app, &menu)?;

    let client = Arc::new(OpenAiCompatClient::new(settings.request_timeout())?);
    let shared_settings = Arc::new(Mutex::new(settings.clone()));
    let display = Arc::new(TauriDisplay::new(
        handle.clone(),
        Arc::clone(&shared_settings),
        settings_path,
    ));
    display.replace_items(items);

    let Services { manager, executor } = bootstrap::start(
        &settings,
        &config_dir,
        catalogs,
        display.clone(),
        display.clone(),
        client,
    );

    app.manage(AppState {
        manager,
        executor,
        display,
        settings: shared_settings,
        config_dir,
        output_token: Mutex::new(LivenessToken::new()),
    });
    Ok(())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    crate::init_logging();

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .on_window_event(|window, event| {
            if window.label() == OUTPUT_WINDOW && matches!(event, WindowEvent::Destroyed) {
                if let Some(state) = window.try_state::<AppState>() {
                    state.output_token.lock().revoke();
                    log::info!("Output window destroyed, streaming output detached");
                }
            }
        })
        .invoke_handler(tauri::generate_handler![
            list_providers,
            active_selection,
            switch_selection,
            reload_providers,
            recognize,
            translate
        ])
        .setup(setup)
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
