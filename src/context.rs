// context.rs - The active provider/mode for one integration kind.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::catalog::{Catalog, IntegrationKind, Mode, ModeKey, Provider};

/// A provider and one of its modes. Holding both in one value keeps the
/// "both set or both unset" invariant structural.
#[derive(Debug, Clone)]
pub struct Selection {
    pub provider: Arc<Provider>,
    pub mode: Arc<Mode>,
}

impl Selection {
    pub fn new(provider: Arc<Provider>, mode: Arc<Mode>) -> Self {
        Self { provider, mode }
    }

    /// Display label, e.g. `"OpenAI - Literal"`.
    pub fn label(&self) -> String {
        format!("{} - {}", self.provider.name, self.mode.name)
    }
}

/// Mutable holder of the current selection.
///
/// Writes come only from the switch operation; readers call `snapshot` and
/// keep working on their own copy, so a later switch never changes a request
/// that is already in flight.
#[derive(Debug, Default)]
pub struct ActiveContext {
    current: RwLock<Option<Selection>>,
}

impl ActiveContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, selection: Selection) {
        *self.current.write() = Some(selection);
    }

    pub fn snapshot(&self) -> Option<Selection> {
        self.current.read().clone()
    }

    pub fn is_set(&self) -> bool {
        self.current.read().is_some()
    }
}

#[derive(Debug, Clone)]
struct CheckEntry {
    key: ModeKey,
    provider_name: String,
    mode_name: String,
}

/// Every checkable provider/mode pair of one catalog, built once per load.
#[derive(Debug, Clone)]
pub struct CheckRegistry {
    kind: IntegrationKind,
    entries: Vec<CheckEntry>,
}

impl CheckRegistry {
    pub fn build(catalog: &Catalog) -> Self {
        let entries = catalog
            .keys()
            .filter_map(|key| {
                let (provider, mode) = catalog.get(key)?;
                Some(CheckEntry {
                    key,
                    provider_name: provider.name.clone(),
                    mode_name: mode.name.clone(),
                })
            })
            .collect();
        Self {
            kind: catalog.kind(),
            entries,
        }
    }

    pub fn kind(&self) -> IntegrationKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checked state of every registered pair for `active`.
    ///
    /// A mode is checked only under a provider whose name equals the active
    /// provider's name, so equally named modes of other providers stay clear.
    pub fn reconcile<'a>(
        &'a self,
        active: Option<&'a Selection>,
    ) -> impl Iterator<Item = (ModeKey, bool)> + 'a {
        self.entries.iter().map(move |entry| {
            let checked = active.is_some_and(|sel| {
                entry.provider_name == sel.provider.name && entry.mode_name == sel.mode.name
            });
            (entry.key, checked)
        })
    }
}

/// Stable menu id for a provider/mode pair, e.g. `select:ocr:0:2`.
pub fn menu_id(kind: IntegrationKind, key: ModeKey) -> String {
    format!("select:{}:{}:{}", kind.id(), key.provider, key.mode)
}

/// Inverse of `menu_id`.
pub fn parse_menu_id(id: &str) -> Option<(IntegrationKind, ModeKey)> {
    let mut parts = id.strip_prefix("select:")?.split(':');
    let kind = match parts.next()? {
        "ocr" => IntegrationKind::Ocr,
        "translation" => IntegrationKind::Translation,
        _ => return None,
    };
    let provider = parts.next()?.parse().ok()?;
    let mode = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((kind, ModeKey::new(provider, mode)))
}
