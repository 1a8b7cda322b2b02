//! The artifact store trait and the in-memory implementation.

use crate::core::Artifact;
use crate::errors::ArtifactError;
use crate::utils::iso_timestamp;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// An artifact together with its ownership record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    /// The artifact.
    pub artifact: Artifact,
    /// Name of the action that produced it.
    pub producer: String,
    /// SHA-256 of the content at publish time.
    pub content_hash: String,
    /// True once a downstream action has read it.
    pub sealed: bool,
    /// When it was published (ISO 8601).
    pub published_at: String,
}

/// Durable, versioned storage of the artifacts of each execution.
///
/// Artifacts are identified by name within one execution. Only the first
/// producer of a name may write it, and once fetched it can no longer change.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Publishes an artifact on behalf of `producer`.
    ///
    /// Re-publishing by the same producer replaces the content until the
    /// artifact is sealed.
    async fn publish(
        &self,
        execution_id: Uuid,
        producer: &str,
        artifact: Artifact,
    ) -> Result<StoredArtifact, ArtifactError>;

    /// Reads an artifact and seals it.
    async fn fetch(&self, execution_id: Uuid, name: &str) -> Result<Artifact, ArtifactError>;

    /// Lists the stored artifacts of an execution, ordered by name.
    async fn list(&self, execution_id: Uuid) -> Vec<StoredArtifact>;

    /// Drops every artifact of a finished execution, returning how many were held.
    async fn release(&self, execution_id: Uuid) -> usize;
}

/// An [`ArtifactStore`] backed by a process-local map.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    entries: RwLock<HashMap<Uuid, BTreeMap<String, StoredArtifact>>>,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ownership record of one artifact without sealing it.
    #[must_use]
    pub fn peek(&self, execution_id: Uuid, name: &str) -> Option<StoredArtifact> {
        self.entries
            .read()
            .get(&execution_id)
            .and_then(|artifacts| artifacts.get(name))
            .cloned()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn publish(
        &self,
        execution_id: Uuid,
        producer: &str,
        artifact: Artifact,
    ) -> Result<StoredArtifact, ArtifactError> {
        let mut entries = self.entries.write();
        let artifacts = entries.entry(execution_id).or_default();

        if let Some(existing) = artifacts.get(&artifact.name) {
            if existing.producer != producer {
                return Err(ArtifactError::NotOwner {
                    name: artifact.name.clone(),
                    owner: existing.producer.clone(),
                    writer: producer.to_string(),
                });
            }
            if existing.sealed {
                return Err(ArtifactError::Sealed {
                    name: artifact.name.clone(),
                });
            }
        }

        let stored = StoredArtifact {
            content_hash: artifact.content_hash(),
            producer: producer.to_string(),
            sealed: false,
            published_at: iso_timestamp(),
            artifact,
        };
        artifacts.insert(stored.artifact.name.clone(), stored.clone());
        Ok(stored)
    }

    async fn fetch(&self, execution_id: Uuid, name: &str) -> Result<Artifact, ArtifactError> {
        let mut entries = self.entries.write();
        let stored = entries
            .get_mut(&execution_id)
            .and_then(|artifacts| artifacts.get_mut(name))
            .ok_or_else(|| ArtifactError::NotFound {
                name: name.to_string(),
            })?;
        stored.sealed = true;
        Ok(stored.artifact.clone())
    }

    async fn list(&self, execution_id: Uuid) -> Vec<StoredArtifact> {
        self.entries
            .read()
            .get(&execution_id)
            .map(|artifacts| artifacts.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn release(&self, execution_id: Uuid) -> usize {
        self.entries
            .write()
            .remove(&execution_id)
            .map_or(0, |artifacts| artifacts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::APP_CODE;

    fn app_code(content: &str) -> Artifact {
        Artifact::new(APP_CODE, "abc123").with_file("index.js", content)
    }

    #[tokio::test]
    async fn test_publish_and_fetch() {
        let store = InMemoryArtifactStore::new();
        let id = Uuid::new_v4();

        let stored = store.publish(id, "source", app_code("v1")).await.unwrap();
        assert_eq!(stored.producer, "source");
        assert_eq!(stored.content_hash, app_code("v1").content_hash());
        assert!(!stored.sealed);

        let artifact = store.fetch(id, APP_CODE).await.unwrap();
        assert_eq!(artifact.file("index.js"), Some(b"v1".as_slice()));
        assert!(store.peek(id, APP_CODE).unwrap().sealed);
    }

    #[tokio::test]
    async fn test_only_producer_may_write() {
        let store = InMemoryArtifactStore::new();
        let id = Uuid::new_v4();
        store.publish(id, "source", app_code("v1")).await.unwrap();

        let err = store.publish(id, "test-deploy", app_code("v2")).await.unwrap_err();
        assert_eq!(
            err,
            ArtifactError::NotOwner {
                name: APP_CODE.to_string(),
                owner: "source".to_string(),
                writer: "test-deploy".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_producer_may_replace_until_sealed() {
        let store = InMemoryArtifactStore::new();
        let id = Uuid::new_v4();
        store.publish(id, "source", app_code("v1")).await.unwrap();
        store.publish(id, "source", app_code("v2")).await.unwrap();

        let artifact = store.fetch(id, APP_CODE).await.unwrap();
        assert_eq!(artifact.file("index.js"), Some(b"v2".as_slice()));

        let err = store.publish(id, "source", app_code("v3")).await.unwrap_err();
        assert!(matches!(err, ArtifactError::Sealed { .. }));
    }

    #[tokio::test]
    async fn test_executions_are_isolated() {
        let store = InMemoryArtifactStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        store.publish(first, "source", app_code("v1")).await.unwrap();

        assert!(matches!(
            store.fetch(second, APP_CODE).await,
            Err(ArtifactError::NotFound { .. })
        ));
        assert!(store.publish(second, "other", app_code("v1")).await.is_ok());
        assert_eq!(store.list(first).await.len(), 1);
        assert_eq!(store.release(first).await, 1);
        assert_eq!(store.release(first).await, 0);
        assert!(store.list(first).await.is_empty());
    }
}
