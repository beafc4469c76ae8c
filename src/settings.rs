use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::IntegrationKind;

/// Engine in effect for one integration kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Backend {
    #[default]
    Builtin,
    CustomAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub ocr_providers_path: PathBuf,
    pub translation_providers_path: PathBuf,
    pub selection_state_path: PathBuf,
    pub ocr_backend: Backend,
    pub translation_backend: Backend,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ocr_providers_path: "ai_ocr_providers.json".into(),
            translation_providers_path: "ai_translate_providers.json".into(),
            selection_state_path: "selection.toml".into(),
            ocr_backend: Backend::Builtin,
            translation_backend: Backend::Builtin,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub const SETTINGS_FILE: &str = "settings.toml";

impl Settings {
    /// Load settings from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(io_err)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Provider list for `kind`, resolved against `config_dir` when relative.
    pub fn providers_path(&self, kind: IntegrationKind, config_dir: &Path) -> PathBuf {
        let path = match kind {
            IntegrationKind::Ocr => &self.ocr_providers_path,
            IntegrationKind::Translation => &self.translation_providers_path,
        };
        config_dir.join(path)
    }

    pub fn selection_state_path(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.selection_state_path)
    }

    pub fn backend(&self, kind: IntegrationKind) -> Backend {
        match kind {
            IntegrationKind::Ocr => self.ocr_backend,
            IntegrationKind::Translation => self.translation_backend,
        }
    }

    pub fn set_backend(&mut self, kind: IntegrationKind, backend: Backend) {
        match kind {
            IntegrationKind::Ocr => self.ocr_backend = backend,
            IntegrationKind::Translation => self.translation_backend = backend,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
