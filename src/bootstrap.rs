// bootstrap.rs - Startup wiring shared by the desktop shell and tests.

use std::path::Path;
use std::sync::Arc;

use crate::ai::ProviderClient;
use crate::catalog::{Catalog, IntegrationKind};
use crate::display::{DisplayBridge, DisplayContext};
use crate::executor::RequestExecutor;
use crate::manager::SelectionManager;
use crate::selection::{Resolution, TomlSelectionStore};
use crate::settings::Settings;

pub struct Services {
    pub manager: Arc<SelectionManager>,
    pub executor: Arc<RequestExecutor>,
}

/// Load both provider catalogs from the paths in `settings`.
pub fn load_catalogs(settings: &Settings, config_dir: &Path) -> [Catalog; 2] {
    IntegrationKind::ALL.map(|kind| Catalog::load(kind, &settings.providers_path(kind, config_dir)))
}

/// Build the manager and executor, install `catalogs` and restore the
/// persisted selections. The display should already know the catalogs'
/// entries so restored check marks land on real menu items.
pub fn start(
    settings: &Settings,
    config_dir: &Path,
    catalogs: [Catalog; 2],
    display: Arc<dyn DisplayBridge>,
    ui: Arc<dyn DisplayContext>,
    client: Arc<dyn ProviderClient>,
) -> Services {
    let store = Arc::new(TomlSelectionStore::new(
        settings.selection_state_path(config_dir),
    ));
    let manager = Arc::new(SelectionManager::new(store, display));
    for catalog in catalogs {
        manager.install_catalog(catalog);
    }

    for kind in IntegrationKind::ALL {
        match manager.restore(kind) {
            Resolution::NotConfigured => log::warn!("{} AI providers not configured", kind),
            Resolution::Unresolved => log::info!("{}: no AI provider selected", kind),
            _ => {}
        }
    }

    let executor = Arc::new(RequestExecutor::new(Arc::clone(&manager), client, ui));
    log::info!("AI provider services started using {}", config_dir.display());
    Services { manager, executor }
}
