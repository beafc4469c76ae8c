/// Persisted selections and startup reconciliation against the catalog.
pub mod resolver;
pub mod store;

pub use resolver::{resolve, Resolution};
pub use store::{MemorySelectionStore, SelectionRecord, SelectionStore, StoreError, TomlSelectionStore};
