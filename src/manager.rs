// manager.rs - Owns the OCR and translation selections and every write to them.
//
// Startup restoration goes through the resolver; afterwards only `switch`
// changes a selection. Switch side effects report failures through the
// display and never unwind the in-memory assignment.

use parking_lot::RwLock;
use std::error::Error as StdError;
use std::path::Path;
use std::sync::Arc;

use crate::catalog::{Catalog, IntegrationKind, Mode, ModeKey, Provider};
use crate::context::{ActiveContext, CheckRegistry, Selection};
use crate::display::{DisplayBridge, DisplayError};
use crate::selection::{resolve, Resolution, SelectionRecord, SelectionStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("Failed to persist the selection")]
    Persist(#[from] StoreError),
    #[error("Failed to update the display")]
    Display(#[from] DisplayError),
}

/// Per-kind state: the catalog currently installed, its check registry and
/// the active selection.
struct Integration {
    kind: IntegrationKind,
    catalog: RwLock<Arc<Catalog>>,
    registry: RwLock<CheckRegistry>,
    context: ActiveContext,
}

impl Integration {
    fn new(kind: IntegrationKind) -> Self {
        let catalog = Catalog::empty(kind);
        Self {
            kind,
            registry: RwLock::new(CheckRegistry::build(&catalog)),
            catalog: RwLock::new(Arc::new(catalog)),
            context: ActiveContext::new(),
        }
    }
}

pub struct SelectionManager {
    ocr: Integration,
    translation: Integration,
    store: Arc<dyn SelectionStore>,
    display: Arc<dyn DisplayBridge>,
}

impl SelectionManager {
    pub fn new(store: Arc<dyn SelectionStore>, display: Arc<dyn DisplayBridge>) -> Self {
        Self {
            ocr: Integration::new(IntegrationKind::Ocr),
            translation: Integration::new(IntegrationKind::Translation),
            store,
            display,
        }
    }

    fn integration(&self, kind: IntegrationKind) -> &Integration {
        match kind {
            IntegrationKind::Ocr => &self.ocr,
            IntegrationKind::Translation => &self.translation,
        }
    }

    /// Install `catalog` for its kind and rebuild the check registry.
    ///
    /// The active selection is kept as-is. Its checked state is re-derived and,
    /// while the AI backend is in effect, its label is shown again.
    pub fn install_catalog(&self, catalog: Catalog) {
        let kind = catalog.kind();
        let integration = self.integration(kind);
        *integration.registry.write() = CheckRegistry::build(&catalog);
        *integration.catalog.write() = Arc::new(catalog);

        let active = integration.context.snapshot();
        let mut failures = Vec::new();
        if let Some(selection) = active.as_ref() {
            if self.display.custom_backend_active(kind) {
                if let Err(e) = self.display.set_label(kind, &selection.label()) {
                    failures.push(SwitchError::from(e));
                }
            }
        }
        if let Err(e) = self.refresh_checks(integration, active.as_ref()) {
            failures.push(e);
        }
        self.report(kind, "AI provider reload failed", failures);
    }

    /// Load the provider list at `path` and install it. Returns whether any
    /// provider is configured.
    pub fn reload(&self, kind: IntegrationKind, path: &Path) -> bool {
        let catalog = Catalog::load(kind, path);
        let configured = !catalog.is_empty();
        if !configured {
            log::warn!("{} AI providers not configured", kind);
        }
        self.install_catalog(catalog);
        configured
    }

    pub fn catalog(&self, kind: IntegrationKind) -> Arc<Catalog> {
        Arc::clone(&self.integration(kind).catalog.read())
    }

    pub fn snapshot(&self, kind: IntegrationKind) -> Option<Selection> {
        self.integration(kind).context.snapshot()
    }

    /// Startup restoration for `kind` against the installed catalog.
    ///
    /// Restores silently unless nothing persisted matched and the AI backend
    /// is the active one, in which case the first entry is applied as a user
    /// switch (the only path that writes the store at startup). Does nothing
    /// to a context that is already set.
    pub fn restore(&self, kind: IntegrationKind) -> Resolution {
        let integration = self.integration(kind);
        let catalog = self.catalog(kind);

        let record = match self.store.load(kind) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("{}: ignoring unreadable selection state: {}", kind, e);
                None
            }
        };
        let resolution = resolve(
            &catalog,
            record.as_ref(),
            self.display.custom_backend_active(kind),
        );
        log::info!("{}: startup resolution {:?}", kind, resolution);

        if integration.context.is_set() {
            log::debug!("{}: selection already set, skipping restore", kind);
            return resolution;
        }
        if let Some((provider, mode)) = resolution.key().and_then(|key| catalog.get(key)) {
            self.switch(kind, Arc::clone(provider), Arc::clone(mode), resolution.is_silent());
        }
        resolution
    }

    /// Switch to the catalog entry identified by `key`. Returns `false` when
    /// the key does not exist in the installed catalog.
    pub fn switch_to(&self, kind: IntegrationKind, key: ModeKey, silent: bool) -> bool {
        let catalog = self.catalog(kind);
        match catalog.get(key) {
            Some((provider, mode)) => {
                self.switch(kind, Arc::clone(provider), Arc::clone(mode), silent);
                true
            }
            None => {
                log::warn!("{}: no provider/mode at {:?}", kind, key);
                false
            }
        }
    }

    /// Make `provider`/`mode` the active selection for `kind`.
    ///
    /// The assignment always happens first. A non-silent switch also applies
    /// the AI backend globally, persists the record and updates the label. A
    /// silent switch only updates the label, and only when the AI backend is
    /// already in effect. Side-effect failures are shown and swallowed.
    pub fn switch(
        &self,
        kind: IntegrationKind,
        provider: Arc<Provider>,
        mode: Arc<Mode>,
        silent: bool,
    ) {
        let integration = self.integration(kind);
        let selection = Selection::new(provider, mode);
        integration.context.set(selection.clone());
        log::info!(
            "{}: switched to {} ({})",
            kind,
            selection.label(),
            if silent { "silent" } else { "user" }
        );

        let mut failures = Vec::new();
        if let Err(e) = self.apply_side_effects(kind, &selection, silent) {
            failures.push(e);
        }
        if let Err(e) = self.refresh_checks(integration, Some(&selection)) {
            failures.push(e);
        }
        self.report(kind, "AI provider switch failed", failures);
    }

    /// Show each failure with its full source chain.
    fn report(&self, kind: IntegrationKind, title: &str, failures: Vec<SwitchError>) {
        for failure in failures {
            let detail = error_chain(&failure);
            log::error!("{}: {}: {}", kind, title, detail);
            self.display.show_error(title, &detail);
        }
    }

    fn apply_side_effects(
        &self,
        kind: IntegrationKind,
        selection: &Selection,
        silent: bool,
    ) -> Result<(), SwitchError> {
        let label = selection.label();
        if !silent {
            self.display.apply_custom_backend(kind)?;
            self.store.save(&SelectionRecord::new(
                kind,
                selection.provider.name.clone(),
                selection.mode.name.clone(),
            ))?;
            self.display.set_label(kind, &label)?;
        } else if self.display.custom_backend_active(kind) {
            self.display.set_label(kind, &label)?;
        }
        Ok(())
    }

    fn refresh_checks(
        &self,
        integration: &Integration,
        active: Option<&Selection>,
    ) -> Result<(), SwitchError> {
        let registry = integration.registry.read();
        for (key, checked) in registry.reconcile(active) {
            self.display.set_checked(integration.kind, key, checked)?;
        }
        Ok(())
    }
}

/// Render an error with every `source()` beneath it.
pub fn error_chain(err: &dyn StdError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\nCaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
