pub mod ai;
pub mod bootstrap;
pub mod catalog;
pub mod context;
pub mod display;
pub mod executor;
pub mod manager;
pub mod placeholder;
pub mod selection;
pub mod settings;

#[cfg(feature = "desktop")]
pub mod desktop;
#[cfg(feature = "desktop")]
mod tray;

#[cfg(feature = "desktop")]
pub use desktop::run;

/// Initialise `env_logger` at `info`, overridable through `RUST_LOG`.
/// Calling it more than once is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
