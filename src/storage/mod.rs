pub mod memory;
pub mod snapshot;

pub use memory::{DefinitionMatch, IndexMetadata, IndexStore, SharedIndex};
pub use snapshot::{load_snapshot, save_snapshot, snapshot_path, Snapshot};
