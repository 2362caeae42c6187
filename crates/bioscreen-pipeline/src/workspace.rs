//! Per-run scratch directory holding the intermediate artifacts.

use std::path::{Path, PathBuf};

use bioscreen_common::PipelineError;
use tracing::{debug, warn};
use uuid::Uuid;

/// Structures handed to the descriptor tool, tab separated.
pub const MOLECULE_FILE: &str = "molecule.smi";
/// Raw descriptor tool output.
pub const DESCRIPTOR_OUTPUT: &str = "padel_descriptors_output.csv";
/// Joined and projected feature table.
pub const FILTERED_FEATURES: &str = "filtered_combined_descriptors.csv";

pub const RUN_DIR_PREFIX: &str = ".bioscreen-run-";

#[derive(Debug)]
pub struct RunDir {
    path: PathBuf,
}

impl RunDir {
    pub async fn create(base: &Path, run_id: Uuid) -> Result<Self, PipelineError> {
        let path = base.join(format!("{RUN_DIR_PREFIX}{run_id}"));
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| PipelineError::io(&path, e))?;
        debug!(path = %path.display(), "Created run directory");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn molecule_file(&self) -> PathBuf {
        self.path.join(MOLECULE_FILE)
    }

    pub fn descriptor_output(&self) -> PathBuf {
        self.path.join(DESCRIPTOR_OUTPUT)
    }

    pub fn filtered_features(&self) -> PathBuf {
        self.path.join(FILTERED_FEATURES)
    }

    /// Deletes the artifacts and the directory. Failures are logged only.
    pub async fn cleanup(self) {
        for file in [self.filtered_features(), self.molecule_file(), self.descriptor_output()] {
            match tokio::fs::remove_file(&file).await {
                Ok(()) => debug!(path = %file.display(), "Removed artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %file.display(), error = %e, "Failed to remove artifact"),
            }
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove run directory");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cleanup_removes_artifacts_and_dir() {
        let base = tempfile::tempdir().unwrap();
        let run = RunDir::create(base.path(), Uuid::new_v4()).await.unwrap();
        std::fs::write(run.molecule_file(), "CCO\tm1\n").unwrap();
        std::fs::write(run.descriptor_output(), "Name\n").unwrap();
        let dir = run.path().to_path_buf();
        assert!(dir.file_name().unwrap().to_string_lossy().starts_with(RUN_DIR_PREFIX));

        run.cleanup().await;
        assert!(!dir.exists());
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_missing_files() {
        let base = tempfile::tempdir().unwrap();
        let run = RunDir::create(base.path(), Uuid::new_v4()).await.unwrap();
        let dir = run.path().to_path_buf();
        std::fs::remove_dir(&dir).unwrap();
        run.cleanup().await;
        assert!(!dir.exists());
    }
}
