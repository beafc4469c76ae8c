// resolver.rs - Reconciles a freshly loaded catalog with the persisted selection.

use crate::catalog::{Catalog, ModeKey};

use super::store::SelectionRecord;

/// Outcome of startup resolution for one integration kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The persisted provider/mode pair exists; restore it silently.
    Restored(ModeKey),
    /// The persisted provider exists but its mode does not; its first mode is
    /// restored silently.
    ModeFallback(ModeKey),
    /// Nothing persisted matched while the AI backend is the active one for
    /// this kind: the first catalog entry is adopted as if the user picked it.
    Adopted(ModeKey),
    /// Nothing matched and the AI backend is not active; leave the context unset.
    Unresolved,
    /// The catalog is empty.
    NotConfigured,
}

impl Resolution {
    pub fn key(&self) -> Option<ModeKey> {
        match *self {
            Resolution::Restored(key)
            | Resolution::ModeFallback(key)
            | Resolution::Adopted(key) => Some(key),
            Resolution::Unresolved | Resolution::NotConfigured => None,
        }
    }

    /// Only an adopted selection is applied with persistence and global side effects.
    pub fn is_silent(&self) -> bool {
        !matches!(self, Resolution::Adopted(_))
    }
}

/// Single deterministic pass over `catalog`.
///
/// Provider names are not deduplicated: scanning in catalog order means the
/// first provider carrying a matching name wins.
pub fn resolve(
    catalog: &Catalog,
    record: Option<&SelectionRecord>,
    ai_backend_active: bool,
) -> Resolution {
    if catalog.is_empty() {
        return Resolution::NotConfigured;
    }

    if let Some(record) = record.filter(|r| !r.provider_name.is_empty()) {
        for (p, entry) in catalog.entries().iter().enumerate() {
            if entry.provider.name != record.provider_name {
                continue;
            }
            if let Some(m) = entry.modes.iter().position(|mode| mode.name == record.mode_name) {
                return Resolution::Restored(ModeKey::new(p, m));
            }
        }

        let fallback = catalog
            .entries()
            .iter()
            .position(|entry| entry.provider.name == record.provider_name && !entry.modes.is_empty());
        if let Some(p) = fallback {
            return Resolution::ModeFallback(ModeKey::new(p, 0));
        }
    }

    if ai_backend_active {
        if let Some(p) = catalog.entries().iter().position(|entry| !entry.modes.is_empty()) {
            return Resolution::Adopted(ModeKey::new(p, 0));
        }
    }

    Resolution::Unresolved
}
