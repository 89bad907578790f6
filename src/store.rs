//! File-backed task store: one ApprovalTask per JSON file
//!
//! `resourceVersion` is a counter bumped on every write. A write whose
//! expected version differs from the file's is a conflict.

use approver_core::{ApprovalPatch, ApprovalTask};
use approver_engine::{StoreError, TaskStore};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

pub struct FileTaskStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored task regardless of its identity.
    pub async fn load(&self) -> Result<ApprovalTask, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        ApprovalTask::from_json(&content).map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn load_matching(&self, namespace: &str, name: &str) -> Result<ApprovalTask, StoreError> {
        let task = self.load().await?;
        if task.name() != name || task.namespace() != namespace {
            return Err(StoreError::NotFound(format!("{}/{}", namespace, name)));
        }
        Ok(task)
    }

    async fn write(&self, task: &ApprovalTask) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(task)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Next counter value. Non-numeric versions restart at 1.
fn next_version(current: Option<&str>) -> String {
    let n: u64 = current.and_then(|v| v.parse().ok()).unwrap_or(0);
    (n + 1).to_string()
}

#[async_trait::async_trait]
impl TaskStore for FileTaskStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<ApprovalTask, StoreError> {
        self.load_matching(namespace, name).await
    }

    async fn apply_patch(
        &self,
        namespace: &str,
        name: &str,
        expected_version: Option<&str>,
        patch: &ApprovalPatch,
    ) -> Result<ApprovalTask, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut task = self.load_matching(namespace, name).await?;

        if task.resource_version() != expected_version {
            return Err(StoreError::Conflict {
                key: task.key(),
                expected: expected_version.map(str::to_string),
                actual: task.metadata.resource_version.clone(),
            });
        }

        patch.apply_to(&mut task);
        task.metadata.resource_version = Some(next_version(task.resource_version()));
        self.write(&task).await?;
        debug!(
            "Wrote {} at resourceVersion {:?}",
            self.path.display(),
            task.metadata.resource_version
        );
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_counter() {
        assert_eq!(next_version(None), "1");
        assert_eq!(next_version(Some("41")), "42");
        assert_eq!(next_version(Some("abc")), "1");
    }
}
