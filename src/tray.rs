// tray.rs - System tray icon with one provider/mode submenu per integration kind.

use std::collections::HashMap;
use tauri::{
    menu::{CheckMenuItem, IsMenuItem, Menu, MenuEvent, MenuItem, PredefinedMenuItem, Submenu},
    tray::TrayIconBuilder,
    AppHandle, Manager, Wry,
};

use crate::catalog::{Catalog, IntegrationKind, ModeKey};
use crate::context::{menu_id, parse_menu_id};

pub const TRAY_ID: &str = "main";

/// Menu items the display bridge updates after a switch.
#[derive(Default)]
pub struct TrayItems {
    pub checks: HashMap<(IntegrationKind, ModeKey), CheckMenuItem<Wry>>,
    pub labels: HashMap<IntegrationKind, MenuItem<Wry>>,
}

fn label_id(kind: IntegrationKind) -> String {
    format!("label:{}", kind.id())
}

fn build_submenu(
    app: &AppHandle,
    catalog: &Catalog,
    items: &mut TrayItems,
) -> tauri::Result<Submenu<Wry>> {
    let kind = catalog.kind();
    let title = format!("AI {}", kind);
    let label = MenuItem::with_id(
        app,
        label_id(kind),
        "No provider selected",
        false,
        None::<&str>,
    )?;
    let separator = PredefinedMenuItem::separator(app)?;

    let mut checks = Vec::new();
    for key in catalog.keys() {
        let Some((provider, mode)) = catalog.get(key) else {
            continue;
        };
        let text = format!("{} - {}", provider.name, mode.name);
        let item =
            CheckMenuItem::with_id(app, menu_id(kind, key), text, true, false, None::<&str>)?;
        items.checks.insert((kind, key), item.clone());
        checks.push(item);
    }

    let empty;
    let mut entries: Vec<&dyn IsMenuItem<Wry>> = vec![&label, &separator];
    if checks.is_empty() {
        empty = MenuItem::with_id(
            app,
            format!("empty:{}", kind.id()),
            "Not configured",
            false,
            None::<&str>,
        )?;
        entries.push(&empty);
    } else {
        entries.extend(checks.iter().map(|item| item as &dyn IsMenuItem<Wry>));
    }
    items.labels.insert(kind, label.clone());
    Submenu::with_items(app, title, true, &entries)
}

/// Build the tray menu for `catalogs` and the items that belong to it.
pub fn build_menu(
    app: &AppHandle,
    catalogs: &[&Catalog],
) -> tauri::Result<(Menu<Wry>, TrayItems)> {
    let mut items = TrayItems::default();
    let mut submenus = Vec::new();
    for catalog in catalogs {
        submenus.push(build_submenu(app, catalog, &mut items)?);
    }
    let separator = PredefinedMenuItem::separator(app)?;
    let reload = MenuItem::with_id(app, "reload", "Reload Providers", true, None::<&str>)?;
    let quit = MenuItem::with_id(app, "quit", "Quit", true, None::<&str>)?;

    let mut entries: Vec<&dyn IsMenuItem<Wry>> = Vec::new();
    for submenu in &submenus {
        entries.push(submenu);
    }
    entries.push(&separator);
    entries.push(&reload);
    entries.push(&quit);
    let menu = Menu::with_items(app, &entries)?;
    Ok((menu, items))
}

/// Call this from `App::setup` to create the system-tray icon.
pub fn setup_tray(
    app: &tauri::App,
    menu: &Menu<Wry>,
) -> Result<(), Box<dyn std::error::Error>> {
    TrayIconBuilder::with_id(TRAY_ID)
        .menu(menu)
        .show_menu_on_left_click(true)
        .on_menu_event(on_menu_event)
        .build(app)?;

    log::info!("System tray created");
    Ok(())
}

/// Replace the tray menu, e.g. after the provider lists were reloaded.
pub fn replace_menu(app: &AppHandle, menu: Menu<Wry>) -> tauri::Result<()> {
    if let Some(tray) = app.tray_by_id(TRAY_ID) {
        tray.set_menu(Some(menu))?;
    }
    Ok(())
}

fn on_menu_event(app: &AppHandle, event: MenuEvent) {
    let id = event.id().as_ref();
    if let Some((kind, key)) = parse_menu_id(id) {
        match app.try_state::<crate::desktop::AppState>() {
            Some(state) => {
                state.manager.switch_to(kind, key, false);
            }
            None => log::warn!("Tray: selection ignored, services not started"),
        }
        return;
    }
    match id {
        "reload" => {
            log::info!("Tray: reload requested");
            if let Err(e) = crate::desktop::reload_all(app) {
                log::error!("Tray: reload failed: {}", e);
            }
        }
        "quit" => {
            log::info!("Tray: quit requested");
            app.exit(0);
        }
        _ => {}
    }
}
