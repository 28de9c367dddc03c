//! Workflow instance state and its serializable snapshot.

use chrono::{DateTime, Duration, Utc};
use dotmac_config::FailurePolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SnapshotError;
use crate::result::WorkflowResult;
use crate::status::WorkflowStatus;

/// Everything the engine knows about one workflow instance.
///
/// Only the owning [`Workflow`](crate::Workflow) mutates this; executors and
/// notifiers get read-only access.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowState {
  pub(crate) workflow_id: String,
  pub(crate) steps: Vec<String>,
  pub(crate) metadata: Map<String, Value>,
  pub(crate) status: WorkflowStatus,
  pub(crate) current_step_index: usize,
  pub(crate) results: Vec<WorkflowResult>,
  pub(crate) pending_approval_step: Option<String>,
  pub(crate) approval_data: Option<Map<String, Value>>,
  pub(crate) failure_policy: FailurePolicy,
  pub(crate) require_approval: bool,
  pub(crate) started_at: Option<DateTime<Utc>>,
  pub(crate) completed_at: Option<DateTime<Utc>>,
}

impl WorkflowState {
  pub(crate) fn new(workflow_id: String) -> Self {
    Self {
      workflow_id,
      steps: Vec::new(),
      metadata: Map::new(),
      status: WorkflowStatus::Pending,
      current_step_index: 0,
      results: Vec::new(),
      pending_approval_step: None,
      approval_data: None,
      failure_policy: FailurePolicy::default(),
      require_approval: false,
      started_at: None,
      completed_at: None,
    }
  }

  pub fn workflow_id(&self) -> &str {
    &self.workflow_id
  }

  pub fn steps(&self) -> &[String] {
    &self.steps
  }

  pub fn metadata(&self) -> &Map<String, Value> {
    &self.metadata
  }

  pub fn status(&self) -> WorkflowStatus {
    self.status
  }

  pub fn current_step_index(&self) -> usize {
    self.current_step_index
  }

  /// The step under the cursor, if the cursor has not run off the end.
  pub fn current_step(&self) -> Option<&str> {
    self.steps.get(self.current_step_index).map(String::as_str)
  }

  /// Full execution history, including synthetic rollback and error results.
  pub fn results(&self) -> &[WorkflowResult] {
    &self.results
  }

  pub fn pending_approval_step(&self) -> Option<&str> {
    self.pending_approval_step.as_deref()
  }

  /// Data supplied by the most recent approval.
  pub fn approval_data(&self) -> Option<&Map<String, Value>> {
    self.approval_data.as_ref()
  }

  pub fn failure_policy(&self) -> FailurePolicy {
    self.failure_policy
  }

  pub fn rollback_on_failure(&self) -> bool {
    self.failure_policy.rollback_on_failure()
  }

  pub fn continue_on_step_failure(&self) -> bool {
    self.failure_policy.continue_on_step_failure()
  }

  pub fn require_approval(&self) -> bool {
    self.require_approval
  }

  pub fn started_at(&self) -> Option<DateTime<Utc>> {
    self.started_at
  }

  pub fn completed_at(&self) -> Option<DateTime<Utc>> {
    self.completed_at
  }

  /// Time between start and completion; `None` until the workflow completes.
  pub fn execution_time(&self) -> Option<Duration> {
    Some(self.completed_at? - self.started_at?)
  }

  pub fn is_completed(&self) -> bool {
    self.status == WorkflowStatus::Completed
  }

  pub fn is_failed(&self) -> bool {
    self.status == WorkflowStatus::Failed
  }

  pub fn is_waiting_approval(&self) -> bool {
    self.status == WorkflowStatus::WaitingApproval
  }

  /// Number of failed results in the history.
  pub fn failed_step_count(&self) -> usize {
    self.results.iter().filter(|r| !r.is_success()).count()
  }

  /// Completed, but at least one step failed along the way (continue mode).
  pub fn completed_with_failures(&self) -> bool {
    self.is_completed() && self.failed_step_count() > 0
  }

  /// The base precondition checks every workflow must satisfy before running.
  ///
  /// Custom [`StepExecutor::validate`](crate::StepExecutor::validate)
  /// implementations should call this before adding their own checks.
  pub fn check_preconditions(&self) -> WorkflowResult {
    let failure = |error: &str, message: &str| {
      WorkflowResult::unchecked("validation", false)
        .with_error(error)
        .with_message(message)
    };

    if self.steps.is_empty() {
      return failure("empty_steps", "Workflow has no steps defined");
    }
    if self.workflow_id.is_empty() {
      return failure("missing_id", "Workflow ID is required");
    }
    if let Some(index) = self.steps.iter().position(|s| s.trim().is_empty()) {
      return failure(
        "invalid_step",
        format!("Step {index} has an empty name").as_str(),
      );
    }

    let mut data = Map::new();
    data.insert("validated".to_string(), Value::Bool(true));
    WorkflowResult::unchecked("validation", true).with_data(data)
  }
}

/// Complete, serializable state of a workflow instance.
///
/// Every field is required when deserializing; a partial snapshot is
/// rejected rather than filled with defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
  pub workflow_id: String,
  pub steps: Vec<String>,
  pub metadata: Map<String, Value>,
  pub status: WorkflowStatus,
  pub current_step_index: usize,
  pub results: Vec<WorkflowResult>,
  #[serde(deserialize_with = "Option::deserialize")]
  pub pending_approval_step: Option<String>,
  #[serde(deserialize_with = "Option::deserialize")]
  pub approval_data: Option<Map<String, Value>>,
  pub failure_policy: FailurePolicy,
  pub require_approval: bool,
  #[serde(deserialize_with = "Option::deserialize")]
  pub started_at: Option<DateTime<Utc>>,
  #[serde(deserialize_with = "Option::deserialize")]
  pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowSnapshot {
  /// Generic key-value form for stores that hold JSON documents.
  pub fn to_value(&self) -> Result<Value, SnapshotError> {
    Ok(serde_json::to_value(self)?)
  }

  pub fn from_value(value: Value) -> Result<Self, SnapshotError> {
    Ok(serde_json::from_value(value)?)
  }
}

impl From<&WorkflowState> for WorkflowSnapshot {
  fn from(state: &WorkflowState) -> Self {
    Self {
      workflow_id: state.workflow_id.clone(),
      steps: state.steps.clone(),
      metadata: state.metadata.clone(),
      status: state.status,
      current_step_index: state.current_step_index,
      results: state.results.clone(),
      pending_approval_step: state.pending_approval_step.clone(),
      approval_data: state.approval_data.clone(),
      failure_policy: state.failure_policy,
      require_approval: state.require_approval,
      started_at: state.started_at,
      completed_at: state.completed_at,
    }
  }
}

impl TryFrom<WorkflowSnapshot> for WorkflowState {
  type Error = SnapshotError;

  fn try_from(snapshot: WorkflowSnapshot) -> Result<Self, Self::Error> {
    if snapshot.current_step_index > snapshot.steps.len() {
      return Err(SnapshotError::CursorOutOfRange {
        index: snapshot.current_step_index,
        len: snapshot.steps.len(),
      });
    }
    if snapshot.status == WorkflowStatus::WaitingApproval
      && snapshot.pending_approval_step.is_none()
    {
      return Err(SnapshotError::MissingPendingStep);
    }

    Ok(Self {
      workflow_id: snapshot.workflow_id,
      steps: snapshot.steps,
      metadata: snapshot.metadata,
      status: snapshot.status,
      current_step_index: snapshot.current_step_index,
      results: snapshot.results,
      pending_approval_step: snapshot.pending_approval_step,
      approval_data: snapshot.approval_data,
      failure_policy: snapshot.failure_policy,
      require_approval: snapshot.require_approval,
      started_at: snapshot.started_at,
      completed_at: snapshot.completed_at,
    })
  }
}
