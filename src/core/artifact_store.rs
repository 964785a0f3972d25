//! Durable storage for generated infrastructure definitions.
//!
//! Layout: `<root>/<run_id>/<provider>/main.tf`. One directory per
//! (run, provider) holding a single Terraform file, which is what
//! `infracost breakdown --path <dir>` expects.

use std::path::PathBuf;

use tokio::fs;
use uuid::Uuid;

use crate::domain::Provider;
use crate::error::{PipelineError, PipelineResult};

/// File name of the persisted definition inside each provider directory
pub const DEFINITION_FILE: &str = "main.tf";

/// Filesystem area holding generated plans, keyed by run and provider
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root`. Nothing is created until the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding every artifact of a run
    pub fn run_dir(&self, run_id: Uuid) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    /// Directory holding a provider's definition for a run.
    ///
    /// Derived purely from `run_id` and `provider`; identical before and
    /// after the artifact is written.
    pub fn location_of(&self, run_id: Uuid, provider: Provider) -> PathBuf {
        self.run_dir(run_id).join(provider.as_str())
    }

    /// Path of the definition file itself
    pub fn definition_path(&self, run_id: Uuid, provider: Provider) -> PathBuf {
        self.location_of(run_id, provider).join(DEFINITION_FILE)
    }

    /// Write a provider's definition, creating directories as needed.
    /// Re-writing the same run/provider overwrites.
    pub async fn write(
        &self,
        run_id: Uuid,
        provider: Provider,
        content: &str,
    ) -> PipelineResult<PathBuf> {
        let location = self.location_of(run_id, provider);

        fs::create_dir_all(&location).await.map_err(|e| {
            PipelineError::persistence(format!("artifact directory {}", location.display()), e)
        })?;

        let path = location.join(DEFINITION_FILE);
        fs::write(&path, content)
            .await
            .map_err(|e| PipelineError::persistence(format!("artifact {}", path.display()), e))?;

        Ok(location)
    }

    /// Read a provider's definition back
    pub async fn read(&self, run_id: Uuid, provider: Provider) -> PipelineResult<Option<String>> {
        let path = self.definition_path(run_id, provider);

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| PipelineError::persistence(format!("artifact {}", path.display()), e))?;

        Ok(Some(content))
    }

    /// Whether any artifact directory exists for this run id
    pub fn contains_run(&self, run_id: Uuid) -> bool {
        self.run_dir(run_id).exists()
    }

    /// Delete every artifact of a run. Missing runs are not an error.
    pub async fn remove_run(&self, run_id: Uuid) -> PipelineResult<()> {
        let dir = self.run_dir(run_id);

        if !dir.exists() {
            return Ok(());
        }

        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| PipelineError::persistence(format!("artifacts {}", dir.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_layout() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let run_id = Uuid::new_v4();

        let location = store.write(run_id, Provider::Aws, "resource {}").await.unwrap();

        assert_eq!(location, temp.path().join(run_id.to_string()).join("aws"));
        assert!(location.join("main.tf").exists());
        assert_eq!(
            store.read(run_id, Provider::Aws).await.unwrap().as_deref(),
            Some("resource {}")
        );
        assert!(store.read(run_id, Provider::Azure).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rewrite_overwrites() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let run_id = Uuid::new_v4();

        store.write(run_id, Provider::Azure, "first").await.unwrap();
        store.write(run_id, Provider::Azure, "second").await.unwrap();

        assert_eq!(
            store.read(run_id, Provider::Azure).await.unwrap().as_deref(),
            Some("second")
        );
    }

    #[tokio::test]
    async fn test_remove_run() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let run_id = Uuid::new_v4();

        store.write(run_id, Provider::Aws, "x").await.unwrap();
        assert!(store.contains_run(run_id));

        store.remove_run(run_id).await.unwrap();
        assert!(!store.contains_run(run_id));

        // Removing again is fine
        store.remove_run(run_id).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_failure_is_persistence_error() {
        // A regular file where the root directory should be
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocked");
        std::fs::write(&blocker, "not a directory").unwrap();

        let store = ArtifactStore::new(&blocker);
        let result = store.write(Uuid::new_v4(), Provider::Aws, "x").await;

        assert!(matches!(result, Err(PipelineError::Persistence { .. })));
    }
}
