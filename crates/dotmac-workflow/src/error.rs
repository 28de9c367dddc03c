//! Engine errors.
//!
//! Ordinary step failures are not errors: they are [`WorkflowResult`]s with
//! `success == false`. The types here cover misconfiguration, illegal
//! operations for the current status, and failures the engine cannot
//! classify as a step outcome.
//!
//! [`WorkflowResult`]: crate::WorkflowResult

use dotmac_config::ConflictingFailurePolicy;

use crate::status::WorkflowStatus;

/// Invalid or self-contradictory workflow setup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
  #[error(transparent)]
  ConflictingFailurePolicy(#[from] ConflictingFailurePolicy),
}

/// An operation that is illegal for the workflow's current status, or an
/// unexpected failure while driving the step loop.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
  /// `execute` was called while the workflow is running or suspended.
  #[error("workflow '{workflow_id}' is already {status}")]
  AlreadyActive {
    workflow_id: String,
    status: WorkflowStatus,
  },

  /// `execute` was called on a workflow in a terminal status.
  #[error("workflow '{workflow_id}' has already finished ({status})")]
  Finished {
    workflow_id: String,
    status: WorkflowStatus,
  },

  /// Approve/reject was called while no approval is pending.
  #[error("workflow '{workflow_id}' is not waiting for approval ({status})")]
  NotWaitingApproval {
    workflow_id: String,
    status: WorkflowStatus,
  },

  /// The step loop failed outside the per-step wrapper (e.g. during rollback).
  #[error("workflow '{workflow_id}' failed at step '{step}'")]
  StepLoop {
    workflow_id: String,
    step: String,
    #[source]
    source: StepError,
  },
}

/// Error returned by a [`StepExecutor`](crate::StepExecutor).
#[derive(Debug, thiserror::Error)]
pub enum StepError {
  /// The executor has no implementation for this step name.
  #[error("step '{step}' is not implemented")]
  NotImplemented { step: String },

  /// The step could not build a valid result.
  #[error(transparent)]
  InvalidResult(#[from] InvalidResult),

  #[error("{0}")]
  Message(String),

  #[error("{0}")]
  Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StepError {
  pub fn not_implemented(step: impl Into<String>) -> Self {
    Self::NotImplemented { step: step.into() }
  }

  pub fn message(message: impl Into<String>) -> Self {
    Self::Message(message.into())
  }

  pub fn other(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
    Self::Other(error.into())
  }
}

/// A [`WorkflowResult`](crate::WorkflowResult) invariant was violated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidResult {
  #[error("result step name must not be empty")]
  EmptyStep,

  #[error("result data must be a key-value mapping, got {kind}")]
  DataNotAMapping { kind: &'static str },
}

/// A snapshot could not be turned back into a workflow.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
  #[error("malformed snapshot: {0}")]
  Malformed(#[from] serde_json::Error),

  #[error("cursor {index} is past the end of {len} steps")]
  CursorOutOfRange { index: usize, len: usize },

  #[error("snapshot is waiting for approval but has no pending step")]
  MissingPendingStep,
}
