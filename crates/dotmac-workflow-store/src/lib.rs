//! Dotmac Workflow Store
//!
//! This crate provides the persistence boundary for workflow snapshots.
//! A suspended or finished [`Workflow`] is captured as a
//! [`WorkflowSnapshot`] and saved under its workflow ID; loading yields an
//! independent copy that can be bound to an executor and resumed.
//!
//! The [`StateStore`] trait defines three operations:
//! - `save` a snapshot, overwriting any previous one for the same ID
//! - `load` a snapshot by ID
//! - `delete` a snapshot by ID
//!
//! Implementations:
//! - [`InMemoryStateStore`] keeps snapshots in a map (tests, single process)
//! - [`FsStateStore`] writes one JSON file per workflow

mod fs;
mod memory;

pub use fs::FsStateStore;
pub use memory::InMemoryStateStore;

use async_trait::async_trait;
use dotmac_workflow::{
  SnapshotError, StepExecutor, Workflow, WorkflowNotifier, WorkflowSnapshot,
};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The snapshot has no workflow ID to key it by.
  #[error("workflow ID is required to save a snapshot")]
  MissingWorkflowId,

  /// The workflow ID cannot be used as a storage key.
  #[error("invalid workflow ID: {0}")]
  InvalidWorkflowId(String),

  /// A stored snapshot could not be decoded.
  #[error("failed to decode snapshot: {0}")]
  Serialization(#[from] serde_json::Error),

  /// A stored snapshot decoded but does not describe a valid workflow.
  #[error("invalid snapshot: {0}")]
  Snapshot(#[from] SnapshotError),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

/// Storage trait for workflow snapshots.
///
/// Each call is an independent operation; concurrent saves for one ID are
/// last-writer-wins.
#[async_trait]
pub trait StateStore: Send + Sync {
  /// Persist a snapshot under its workflow ID.
  async fn save(&self, snapshot: &WorkflowSnapshot) -> Result<(), StoreError>;

  /// Get the snapshot for a workflow, if one is stored.
  async fn load(&self, workflow_id: &str) -> Result<Option<WorkflowSnapshot>, StoreError>;

  /// Remove a snapshot. Returns whether anything was stored.
  async fn delete(&self, workflow_id: &str) -> Result<bool, StoreError>;
}

/// Save the current state of a live workflow.
pub async fn save_workflow<S, E, N>(store: &S, workflow: &Workflow<E, N>) -> Result<(), StoreError>
where
  S: StateStore + ?Sized,
  E: StepExecutor,
  N: WorkflowNotifier,
{
  store.save(&workflow.to_snapshot()).await
}

/// Load a workflow and bind it to `executor`.
pub async fn load_workflow<S, E>(
  store: &S,
  workflow_id: &str,
  executor: E,
) -> Result<Option<Workflow<E>>, StoreError>
where
  S: StateStore + ?Sized,
  E: StepExecutor,
{
  match store.load(workflow_id).await? {
    Some(snapshot) => Ok(Some(Workflow::from_snapshot(snapshot, executor)?)),
    None => Ok(None),
  }
}

pub(crate) fn require_id(snapshot: &WorkflowSnapshot) -> Result<&str, StoreError> {
  let workflow_id = snapshot.workflow_id.as_str();
  if workflow_id.is_empty() {
    return Err(StoreError::MissingWorkflowId);
  }
  Ok(workflow_id)
}
