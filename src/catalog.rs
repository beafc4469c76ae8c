// catalog.rs - Loads AI provider and mode definitions for one integration kind.
//
// The primary source is an ordered provider list; each provider may point at a
// secondary mode file. Loading never fails as a whole: a missing or broken
// primary source yields an empty catalog, a broken mode file yields a provider
// with the built-in default mode. Entries are decoded one by one, so a single
// bad entry is skipped without taking its neighbours with it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Which pipeline a provider list feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IntegrationKind {
    Ocr,
    Translation,
}

impl IntegrationKind {
    pub const ALL: [IntegrationKind; 2] = [IntegrationKind::Ocr, IntegrationKind::Translation];

    /// Section name used by the selection state file.
    pub fn section(self) -> &'static str {
        match self {
            IntegrationKind::Ocr => "AiOcr",
            IntegrationKind::Translation => "AiTranslate",
        }
    }

    /// Short id used in menu item ids and event names.
    pub fn id(self) -> &'static str {
        match self {
            IntegrationKind::Ocr => "ocr",
            IntegrationKind::Translation => "translation",
        }
    }
}

impl fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrationKind::Ocr => f.write_str("OCR"),
            IntegrationKind::Translation => f.write_str("Translation"),
        }
    }
}

/// One configured AI backend. `name` is a display key and may repeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub name: String,
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_config_path: Option<PathBuf>,
}

/// A message role, used to order prompt templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    Assistant,
    User,
}

impl PromptRole {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptRole::System => "system",
            PromptRole::Assistant => "assistant",
            PromptRole::User => "user",
        }
    }
}

fn default_prompt_order() -> Vec<PromptRole> {
    vec![PromptRole::System, PromptRole::Assistant, PromptRole::User]
}

/// Sampling temperature for modes that do not set one.
pub fn default_temperature(kind: IntegrationKind) -> f32 {
    match kind {
        IntegrationKind::Ocr => 0.5,
        IntegrationKind::Translation => 1.0,
    }
}

/// A named prompt/parameter template under a provider.
///
/// A `None` template means the role is left out of the request entirely;
/// `Some("")` keeps the role with empty content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mode {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "systemPromptTemplate")]
    pub system_prompt: Option<String>,
    #[serde(default, alias = "userPromptTemplate")]
    pub user_prompt: Option<String>,
    #[serde(default, alias = "assistantPromptTemplate")]
    pub assistant_prompt: Option<String>,
    /// Mode files may leave this out; the catalog fills in the kind's default.
    pub temperature: f32,
    #[serde(default, alias = "streamingEnabled")]
    pub streaming: Option<bool>,
    #[serde(default = "default_prompt_order")]
    pub prompt_order: Vec<PromptRole>,
}

impl Mode {
    /// Template for `role`, if the mode defines one.
    pub fn template(&self, role: PromptRole) -> Option<&str> {
        match role {
            PromptRole::System => self.system_prompt.as_deref(),
            PromptRole::Assistant => self.assistant_prompt.as_deref(),
            PromptRole::User => self.user_prompt.as_deref(),
        }
    }

    pub fn streaming_enabled(&self) -> bool {
        self.streaming.unwrap_or(false)
    }

    /// The built-in mode a provider gets when it has none of its own.
    pub fn builtin(kind: IntegrationKind) -> Self {
        match kind {
            IntegrationKind::Ocr => Mode {
                name: DEFAULT_MODE_NAME.into(),
                description: "Built-in text recognition prompt".into(),
                system_prompt: Some(
                    "You are an OCR engine. Extract all text from the image exactly as it appears, \
                     preserving line breaks. Output only the recognized text without any commentary."
                        .into(),
                ),
                user_prompt: Some("Recognize the text in this image.".into()),
                assistant_prompt: None,
                temperature: default_temperature(kind),
                streaming: None,
                prompt_order: default_prompt_order(),
            },
            IntegrationKind::Translation => Mode {
                name: DEFAULT_MODE_NAME.into(),
                description: "Built-in translation prompt".into(),
                system_prompt: Some(
                    "You are a professional translator. Translate the text from ${fromlang} to \
                     ${tolang}. Output only the translation without any explanation."
                        .into(),
                ),
                user_prompt: None,
                assistant_prompt: None,
                temperature: default_temperature(kind),
                streaming: None,
                prompt_order: default_prompt_order(),
            },
        }
    }
}

pub const DEFAULT_MODE_NAME: &str = "Default";

/// Typed identity of a provider/mode pair inside one catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModeKey {
    pub provider: usize,
    pub mode: usize,
}

impl ModeKey {
    pub fn new(provider: usize, mode: usize) -> Self {
        Self { provider, mode }
    }
}

/// A provider together with its (never empty) mode list.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub provider: Arc<Provider>,
    pub modes: Vec<Arc<Mode>>,
}

/// Ordered providers for one integration kind.
#[derive(Debug, Clone)]
pub struct Catalog {
    kind: IntegrationKind,
    entries: Vec<CatalogEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProviderList {
    Bare(Vec<Value>),
    Wrapped { providers: Vec<Value> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModeList {
    Bare(Vec<Value>),
    Wrapped {
        #[serde(default)]
        modes: Vec<Value>,
    },
}

impl Catalog {
    /// Build a catalog from already-parsed providers and their modes.
    ///
    /// Duplicate mode names inside a provider are dropped after the first,
    /// and a provider without modes receives the built-in default mode.
    pub fn from_parts(kind: IntegrationKind, parts: Vec<(Provider, Vec<Mode>)>) -> Self {
        let entries = parts
            .into_iter()
            .map(|(provider, modes)| {
                let mut seen = HashSet::new();
                let mut unique: Vec<Arc<Mode>> = Vec::with_capacity(modes.len());
                for mode in modes {
                    if seen.insert(mode.name.clone()) {
                        unique.push(Arc::new(mode));
                    } else {
                        log::warn!(
                            "Provider '{}': duplicate mode '{}' ignored",
                            provider.name,
                            mode.name
                        );
                    }
                }
                if unique.is_empty() {
                    unique.push(Arc::new(Mode::builtin(kind)));
                }
                CatalogEntry {
                    provider: Arc::new(provider),
                    modes: unique,
                }
            })
            .collect();
        Self { kind, entries }
    }

    pub fn empty(kind: IntegrationKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Load the provider list at `path` and every referenced mode file.
    ///
    /// Never fails: an empty catalog means "not configured".
    pub fn load(kind: IntegrationKind, path: &Path) -> Self {
        if !path.exists() {
            log::info!("{} provider list {} not found", kind, path.display());
            return Self::empty(kind);
        }
        let raw = match read_document::<ProviderList>(path) {
            Ok(ProviderList::Bare(list)) | Ok(ProviderList::Wrapped { providers: list }) => list,
            Err(e) => {
                log::error!("{} provider list unusable: {}", kind, e);
                return Self::empty(kind);
            }
        };
        let providers: Vec<Provider> = raw
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match decode_entry(value, Map::new()) {
                Ok(provider) => Some(provider),
                Err(e) => {
                    log::warn!("{} provider #{} skipped: {}", kind, index + 1, e);
                    None
                }
            })
            .collect();

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let parts = providers
            .into_iter()
            .map(|provider| {
                let modes = match provider.mode_config_path.as_deref() {
                    Some(mode_path) => {
                        load_modes(kind, &provider.name, &base_dir.join(mode_path))
                    }
                    None => Vec::new(),
                };
                (provider, modes)
            })
            .collect();

        let catalog = Self::from_parts(kind, parts);
        log::info!(
            "Loaded {} {} provider(s) from {}",
            catalog.len(),
            kind,
            path.display()
        );
        catalog
    }

    pub fn kind(&self) -> IntegrationKind {
        self.kind
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: ModeKey) -> Option<(&Arc<Provider>, &Arc<Mode>)> {
        let entry = self.entries.get(key.provider)?;
        let mode = entry.modes.get(key.mode)?;
        Some((&entry.provider, mode))
    }

    /// Every provider/mode pair in catalog order.
    pub fn keys(&self) -> impl Iterator<Item = ModeKey> + '_ {
        self.entries
            .iter()
            .enumerate()
            .flat_map(|(p, entry)| (0..entry.modes.len()).map(move |m| ModeKey::new(p, m)))
    }
}

/// Parse a mode file. An unreadable file yields no modes; an undecodable
/// entry is dropped on its own.
fn load_modes(kind: IntegrationKind, provider_name: &str, path: &Path) -> Vec<Mode> {
    let raw = match read_document::<ModeList>(path) {
        Ok(ModeList::Bare(list)) | Ok(ModeList::Wrapped { modes: list }) => list,
        Err(e) => {
            log::error!("Provider '{}': mode file ignored: {}", provider_name, e);
            return Vec::new();
        }
    };
    let mut defaults = Map::new();
    defaults.insert("temperature".into(), Value::from(default_temperature(kind)));

    raw.into_iter()
        .enumerate()
        .filter_map(|(index, value)| match decode_entry(value, defaults.clone()) {
            Ok(mode) => Some(mode),
            Err(e) => {
                log::warn!(
                    "Provider '{}': mode #{} skipped: {}",
                    provider_name,
                    index + 1,
                    e
                );
                None
            }
        })
        .collect()
}

/// Decode one list entry. `null` fields count as absent, and `defaults`
/// fill keys the entry leaves out.
fn decode_entry<T: DeserializeOwned>(
    mut value: Value,
    defaults: Map<String, Value>,
) -> Result<T, serde_json::Error> {
    if let Value::Object(fields) = &mut value {
        fields.retain(|_, field| !field.is_null());
        for (key, default) in defaults {
            fields.entry(key).or_insert(default);
        }
    }
    serde_json::from_value(value)
}

/// Read a JSON or TOML document, picking the format by file extension.
pub(crate) fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, CatalogError> {
    let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&content).map_err(|source| CatalogError::Toml {
            path: path.to_path_buf(),
            source,
        })
    } else {
        serde_json::from_str(&content).map_err(|source| CatalogError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}
