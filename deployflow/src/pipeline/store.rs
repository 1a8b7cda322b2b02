//! Persistence of execution records.

use super::PipelineExecution;
use crate::errors::{DeployflowError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Stores execution records for status queries and audit.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Inserts or replaces a record.
    async fn save(&self, execution: &PipelineExecution) -> Result<()>;

    /// Loads a record by execution ID.
    async fn load(&self, execution_id: Uuid) -> Result<Option<PipelineExecution>>;

    /// Lists every record, oldest first.
    async fn list(&self) -> Result<Vec<PipelineExecution>>;

    /// Lists the records delivering `commit_id`, oldest first.
    async fn list_by_commit(&self, commit_id: &str) -> Result<Vec<PipelineExecution>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|e| e.commit_id.as_deref() == Some(commit_id))
            .collect())
    }
}

fn sort_by_creation(executions: &mut [PipelineExecution]) {
    executions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    executions: RwLock<HashMap<Uuid, PipelineExecution>>,
}

impl InMemoryExecutionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.executions.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executions.read().is_empty()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn save(&self, execution: &PipelineExecution) -> Result<()> {
        self.executions
            .write()
            .insert(execution.execution_id, execution.clone());
        Ok(())
    }

    async fn load(&self, execution_id: Uuid) -> Result<Option<PipelineExecution>> {
        Ok(self.executions.read().get(&execution_id).cloned())
    }

    async fn list(&self) -> Result<Vec<PipelineExecution>> {
        let mut all: Vec<_> = self.executions.read().values().cloned().collect();
        sort_by_creation(&mut all);
        Ok(all)
    }
}

/// Keeps one pretty-printed JSON document per execution in a directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// reader never sees a half-written record.
#[derive(Debug, Clone)]
pub struct FileExecutionStore {
    dir: PathBuf,
}

impl FileExecutionStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be created.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// The directory holding the records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, execution_id: Uuid) -> PathBuf {
        self.dir.join(format!("{execution_id}.json"))
    }
}

#[async_trait]
impl ExecutionStore for FileExecutionStore {
    async fn save(&self, execution: &PipelineExecution) -> Result<()> {
        let path = self.path_for(execution.execution_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(execution)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(execution_id = %execution.execution_id, path = %path.display(), "Execution saved");
        Ok(())
    }

    async fn load(&self, execution_id: Uuid) -> Result<Option<PipelineExecution>> {
        match tokio::fs::read(self.path_for(execution_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<PipelineExecution>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut all = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            let execution: PipelineExecution = serde_json::from_slice(&bytes).map_err(|e| {
                DeployflowError::Store(format!("corrupt record {}: {e}", path.display()))
            })?;
            all.push(execution);
        }
        sort_by_creation(&mut all);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ActionSpec, Pipeline, PipelineBuilder, SourceEvent, StageSpec};
    use crate::testing::RecordingAction;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn pipeline() -> Pipeline {
        PipelineBuilder::new("p")
            .stage(StageSpec::new("Build").with_action(ActionSpec::new(Arc::new(RecordingAction::new("a")), 1)))
            .build()
            .unwrap()
    }

    fn execution(commit: &str) -> PipelineExecution {
        PipelineExecution::new(
            Uuid::new_v4(),
            &pipeline(),
            SourceEvent::push("svc", "main", commit),
            Some(commit.to_string()),
        )
    }

    #[tokio::test]
    async fn test_in_memory_store_queries_by_commit() {
        let store = InMemoryExecutionStore::new();
        let first = execution("abc123");
        let second = execution("def456");
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.load(first.execution_id).await.unwrap(), Some(first.clone()));
        let by_commit = store.list_by_commit("abc123").await.unwrap();
        assert_eq!(by_commit.len(), 1);
        assert_eq!(by_commit[0].execution_id, first.execution_id);
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = execution("abc123");

        let store = FileExecutionStore::open(dir.path()).await.unwrap();
        store.save(&record).await.unwrap();
        record.touch();
        store.save(&record).await.unwrap();

        let reopened = FileExecutionStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.load(record.execution_id).await.unwrap(), Some(record.clone()));
        assert_eq!(reopened.list().await.unwrap().len(), 1);
        assert_eq!(reopened.list_by_commit("abc123").await.unwrap().len(), 1);
        assert!(reopened.list_by_commit("zzz").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_reports_corrupt_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileExecutionStore::open(dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join("broken.json"), b"{").await.unwrap();

        assert!(matches!(store.list().await, Err(DeployflowError::Store(_))));
    }
}
