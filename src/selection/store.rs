// store.rs - Durable "last provider / last mode" per integration kind.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::catalog::IntegrationKind;

pub const LAST_PROVIDER_KEY: &str = "LastProvider";
pub const LAST_MODE_KEY: &str = "LastMode";

/// The persisted choice for one integration kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRecord {
    pub kind: IntegrationKind,
    pub provider_name: String,
    pub mode_name: String,
}

impl SelectionRecord {
    pub fn new(
        kind: IntegrationKind,
        provider_name: impl Into<String>,
        mode_name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            provider_name: provider_name.into(),
            mode_name: mode_name.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Selection state I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Selection state {path} is not valid TOML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize selection state: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Key-value store holding one `SelectionRecord` per integration kind.
pub trait SelectionStore: Send + Sync {
    /// The stored record, or `None` when nothing has been saved for `kind`.
    fn load(&self, kind: IntegrationKind) -> Result<Option<SelectionRecord>, StoreError>;

    fn save(&self, record: &SelectionRecord) -> Result<(), StoreError>;
}

/// TOML file with one table per integration kind:
///
/// ```toml
/// [AiOcr]
/// LastProvider = "OpenAI"
/// LastMode = "Default"
/// ```
///
/// Saving rewrites only the affected table; unrelated tables and keys survive.
pub struct TomlSelectionStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TomlSelectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn read_table(&self) -> Result<toml::Table, StoreError> {
        if !self.path.exists() {
            return Ok(toml::Table::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        content
            .parse::<toml::Table>()
            .map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })
    }
}

impl SelectionStore for TomlSelectionStore {
    fn load(&self, kind: IntegrationKind) -> Result<Option<SelectionRecord>, StoreError> {
        let table = self.read_table()?;
        let Some(section) = table.get(kind.section()).and_then(|v| v.as_table()) else {
            return Ok(None);
        };
        let read = |key: &str| {
            section
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let record = SelectionRecord::new(kind, read(LAST_PROVIDER_KEY), read(LAST_MODE_KEY));
        if record.provider_name.is_empty() && record.mode_name.is_empty() {
            return Ok(None);
        }
        Ok(Some(record))
    }

    fn save(&self, record: &SelectionRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut table = self.read_table()?;

        let section = table
            .entry(record.kind.section())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        if !section.is_table() {
            *section = toml::Value::Table(toml::Table::new());
        }
        if let toml::Value::Table(section) = section {
            section.insert(
                LAST_PROVIDER_KEY.into(),
                toml::Value::String(record.provider_name.clone()),
            );
            section.insert(
                LAST_MODE_KEY.into(),
                toml::Value::String(record.mode_name.clone()),
            );
        }

        let content = toml::to_string_pretty(&table)?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, content).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        log::debug!(
            "Saved {} selection {} / {}",
            record.kind,
            record.provider_name,
            record.mode_name
        );
        Ok(())
    }
}

/// In-process store, used when no state file is configured and by tests.
#[derive(Default)]
pub struct MemorySelectionStore {
    records: Mutex<HashMap<IntegrationKind, SelectionRecord>>,
    writes: Mutex<usize>,
}

impl MemorySelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: SelectionRecord) -> Self {
        let store = Self::default();
        store.records.lock().insert(record.kind, record);
        store
    }

    /// Number of `save` calls so far.
    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

impl SelectionStore for MemorySelectionStore {
    fn load(&self, kind: IntegrationKind) -> Result<Option<SelectionRecord>, StoreError> {
        Ok(self.records.lock().get(&kind).cloned())
    }

    fn save(&self, record: &SelectionRecord) -> Result<(), StoreError> {
        self.records.lock().insert(record.kind, record.clone());
        *self.writes.lock() += 1;
        Ok(())
    }
}
