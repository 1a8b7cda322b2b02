//! Per-execution artifact storage with single-writer ownership.

mod store;

pub use store::{ArtifactStore, InMemoryArtifactStore, StoredArtifact};
