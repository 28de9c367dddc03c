use std::collections::HashMap;

use async_trait::async_trait;
use dotmac_workflow::WorkflowSnapshot;
use tokio::sync::RwLock;

use crate::{StateStore, StoreError, require_id};

/// In-memory snapshot store.
///
/// Suitable for tests and single-process use. Loads return clones, so a
/// restored workflow never shares state with the one that was saved.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
  snapshots: RwLock<HashMap<String, WorkflowSnapshot>>,
}

impl InMemoryStateStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of stored snapshots.
  pub async fn len(&self) -> usize {
    self.snapshots.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.snapshots.read().await.is_empty()
  }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
  async fn save(&self, snapshot: &WorkflowSnapshot) -> Result<(), StoreError> {
    let workflow_id = require_id(snapshot)?;
    self
      .snapshots
      .write()
      .await
      .insert(workflow_id.to_string(), snapshot.clone());
    Ok(())
  }

  async fn load(&self, workflow_id: &str) -> Result<Option<WorkflowSnapshot>, StoreError> {
    Ok(self.snapshots.read().await.get(workflow_id).cloned())
  }

  async fn delete(&self, workflow_id: &str) -> Result<bool, StoreError> {
    Ok(self.snapshots.write().await.remove(workflow_id).is_some())
  }
}
