use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dotmac_workflow::WorkflowSnapshot;
use tokio::fs;
use tracing::debug;

use crate::{StateStore, StoreError, require_id};

/// Filesystem-based snapshot store.
///
/// Snapshots are stored as pretty-printed JSON, one file per workflow:
/// ```text
/// {root}/
/// ├── 6f1c2d4e-....json
/// └── review-42.json
/// ```
pub struct FsStateStore {
  root: PathBuf,
}

impl FsStateStore {
  /// Create a store rooted at the given directory. The directory is created
  /// on the first save.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Path of the snapshot file for a workflow ID.
  fn snapshot_path(&self, workflow_id: &str) -> Result<PathBuf, StoreError> {
    let valid = !workflow_id.trim().is_empty()
      && workflow_id != "."
      && workflow_id != ".."
      && !workflow_id.contains(['/', '\\', '\0']);
    if !valid {
      return Err(StoreError::InvalidWorkflowId(workflow_id.to_string()));
    }
    Ok(self.root.join(format!("{workflow_id}.json")))
  }
}

#[async_trait]
impl StateStore for FsStateStore {
  async fn save(&self, snapshot: &WorkflowSnapshot) -> Result<(), StoreError> {
    let workflow_id = require_id(snapshot)?;
    let path = self.snapshot_path(workflow_id)?;

    fs::create_dir_all(&self.root).await?;
    let content = serde_json::to_vec_pretty(snapshot)?;

    // Write then rename so readers never see a partial file.
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, content).await?;
    fs::rename(&tmp_path, &path).await?;

    debug!(workflow_id, path = %path.display(), "snapshot saved");
    Ok(())
  }

  async fn load(&self, workflow_id: &str) -> Result<Option<WorkflowSnapshot>, StoreError> {
    let path = self.snapshot_path(workflow_id)?;
    let content = match fs::read(&path).await {
      Ok(content) => content,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&content)?))
  }

  async fn delete(&self, workflow_id: &str) -> Result<bool, StoreError> {
    let path = self.snapshot_path(workflow_id)?;
    match fs::remove_file(&path).await {
      Ok(()) => Ok(true),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
      Err(e) => Err(e.into()),
    }
  }
}
