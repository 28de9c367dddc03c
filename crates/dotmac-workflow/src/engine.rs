//! Workflow execution engine.
//!
//! A [`Workflow`] drives its steps strictly in order, one at a time. Each
//! step either completes (successfully or as a captured failure) before the
//! next begins, or suspends the whole instance at an approval gate.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use chrono::Utc;
use dotmac_config::FailurePolicy;
use futures::FutureExt;
use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};

use crate::error::{ConfigurationError, ExecutionError, SnapshotError, StepError};
use crate::events::{NoopNotifier, WorkflowEvent, WorkflowNotifier};
use crate::executor::StepExecutor;
use crate::result::WorkflowResult;
use crate::state::{WorkflowSnapshot, WorkflowState};
use crate::status::WorkflowStatus;

/// A single workflow instance.
///
/// Generic over `E: StepExecutor` for the business action and over
/// `N: WorkflowNotifier` for callbacks. Use [`Workflow::new`] for an instance
/// with no-op notifications and [`Workflow::with_notifier`] to observe it.
///
/// The instance has no internal locking. Driving methods take `&mut self`, so
/// sharing one instance across tasks needs an external mutex.
pub struct Workflow<E, N = NoopNotifier> {
  state: WorkflowState,
  executor: E,
  notifier: N,
}

impl<E: StepExecutor> Workflow<E, NoopNotifier> {
  /// Create an empty workflow with a generated ID.
  pub fn new(executor: E) -> Self {
    Self {
      state: WorkflowState::new(uuid::Uuid::new_v4().to_string()),
      executor,
      notifier: NoopNotifier,
    }
  }

  /// Rebuild a workflow from a snapshot, binding it to `executor`.
  ///
  /// The restored instance shares nothing with whoever produced the snapshot
  /// and resumes exactly where the snapshot left off.
  pub fn from_snapshot(snapshot: WorkflowSnapshot, executor: E) -> Result<Self, SnapshotError> {
    Ok(Self {
      state: WorkflowState::try_from(snapshot)?,
      executor,
      notifier: NoopNotifier,
    })
  }
}

impl<E: StepExecutor, N: WorkflowNotifier> Workflow<E, N> {
  pub fn with_id(mut self, workflow_id: impl Into<String>) -> Self {
    self.state.workflow_id = workflow_id.into();
    self
  }

  /// Set the ordered step list. Order is execution order.
  pub fn with_steps<I, S>(mut self, steps: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.state.steps = steps.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
    self.state.metadata = metadata;
    self
  }

  /// Replace the notifier.
  pub fn with_notifier<M: WorkflowNotifier>(self, notifier: M) -> Workflow<E, M> {
    Workflow {
      state: self.state,
      executor: self.executor,
      notifier,
    }
  }

  /// Set failure handling and approval gating from the legacy flag triple.
  ///
  /// Fails without changing anything when both `rollback_on_failure` and
  /// `continue_on_step_failure` are set.
  pub fn configure(
    &mut self,
    rollback_on_failure: bool,
    continue_on_step_failure: bool,
    require_approval: bool,
  ) -> Result<(), ConfigurationError> {
    let policy = FailurePolicy::from_flags(rollback_on_failure, continue_on_step_failure)?;
    self.state.failure_policy = policy;
    self.state.require_approval = require_approval;
    Ok(())
  }

  pub fn set_failure_policy(&mut self, policy: FailurePolicy) {
    self.state.failure_policy = policy;
  }

  pub fn set_require_approval(&mut self, require_approval: bool) {
    self.state.require_approval = require_approval;
  }

  pub fn state(&self) -> &WorkflowState {
    &self.state
  }

  pub fn workflow_id(&self) -> &str {
    &self.state.workflow_id
  }

  pub fn status(&self) -> WorkflowStatus {
    self.state.status
  }

  pub fn results(&self) -> &[WorkflowResult] {
    &self.state.results
  }

  pub fn executor(&self) -> &E {
    &self.executor
  }

  pub fn executor_mut(&mut self) -> &mut E {
    &mut self.executor
  }

  /// Capture the complete instance state.
  pub fn to_snapshot(&self) -> WorkflowSnapshot {
    WorkflowSnapshot::from(&self.state)
  }

  /// Validate, then run steps from the cursor until completion, failure, or
  /// an approval gate.
  ///
  /// Returns the full result history. Step failures are reported in the
  /// results and the status, not as errors.
  #[instrument(
    name = "workflow_execute",
    skip(self),
    fields(workflow_id = %self.state.workflow_id)
  )]
  pub async fn execute(&mut self) -> Result<Vec<WorkflowResult>, ExecutionError> {
    let status = self.state.status;
    if status.is_active() {
      return Err(ExecutionError::AlreadyActive {
        workflow_id: self.state.workflow_id.clone(),
        status,
      });
    }
    if status.is_terminal() {
      return Err(ExecutionError::Finished {
        workflow_id: self.state.workflow_id.clone(),
        status,
      });
    }

    let validation = self.executor.validate(&self.state).await;
    if !validation.is_success() {
      warn!(
        error = validation.error().unwrap_or_default(),
        "workflow_validation_failed"
      );
      self.state.status = WorkflowStatus::Failed;
      self.state.results = vec![validation];
      return Ok(self.state.results.clone());
    }

    self.state.status = WorkflowStatus::Running;
    self.state.started_at = Some(Utc::now());
    info!(
      steps = self.state.steps.len(),
      start_index = self.state.current_step_index,
      "workflow_started"
    );

    self.drive().await
  }

  /// Accept the pending approval and resume with the next step.
  #[instrument(
    name = "workflow_approve",
    skip(self, approval_data),
    fields(workflow_id = %self.state.workflow_id)
  )]
  pub async fn approve_and_continue(
    &mut self,
    approval_data: Option<Map<String, Value>>,
  ) -> Result<Vec<WorkflowResult>, ExecutionError> {
    self.ensure_waiting_approval()?;

    let step = self.state.pending_approval_step.take();
    info!(step = step.as_deref().unwrap_or_default(), "approval_granted");

    self.state.approval_data = approval_data;
    self.state.current_step_index += 1;
    self.state.status = WorkflowStatus::Running;

    self.drive().await
  }

  /// Reject the pending approval and cancel the workflow.
  #[instrument(
    name = "workflow_reject",
    skip(self),
    fields(workflow_id = %self.state.workflow_id)
  )]
  pub async fn reject_and_cancel(
    &mut self,
    reason: Option<&str>,
  ) -> Result<Vec<WorkflowResult>, ExecutionError> {
    self.ensure_waiting_approval()?;

    let step = self
      .state
      .pending_approval_step
      .take()
      .unwrap_or_else(|| "approval".to_string());

    let mut result = WorkflowResult::unchecked(step.as_str(), false).with_error("approval_rejected");
    match reason {
      Some(reason) => {
        let mut data = Map::new();
        data.insert("reason".to_string(), Value::String(reason.to_string()));
        result = result
          .with_data(data)
          .with_message(format!("Approval rejected: {reason}"));
      }
      None => result = result.with_message("Approval rejected"),
    }

    self.state.status = WorkflowStatus::Cancelled;
    self.state.results.push(result);
    info!(step = %step, reason = reason.unwrap_or_default(), "workflow_cancelled");

    Ok(self.state.results.clone())
  }

  fn ensure_waiting_approval(&self) -> Result<(), ExecutionError> {
    if self.state.status != WorkflowStatus::WaitingApproval {
      return Err(ExecutionError::NotWaitingApproval {
        workflow_id: self.state.workflow_id.clone(),
        status: self.state.status,
      });
    }
    Ok(())
  }

  /// Run the step loop, converting unexpected failures into a failed status
  /// plus a synthetic `execution_error` result.
  async fn drive(&mut self) -> Result<Vec<WorkflowResult>, ExecutionError> {
    if let Err(source) = self.run_loop().await {
      let step = self.state.current_step().unwrap_or("execution").to_string();
      error!(step = %step, error = %source, "workflow_failed");

      self.state.status = WorkflowStatus::Failed;
      self.state.results.push(
        WorkflowResult::unchecked(step.as_str(), false)
          .with_error("execution_error")
          .with_message(format!("Workflow execution failed: {source}")),
      );

      return Err(ExecutionError::StepLoop {
        workflow_id: self.state.workflow_id.clone(),
        step,
        source,
      });
    }

    Ok(self.state.results.clone())
  }

  async fn run_loop(&mut self) -> Result<(), StepError> {
    while let Some(step) = self.state.current_step().map(str::to_owned) {
      let result = self.execute_single_step(&step).await;
      let succeeded = result.is_success();
      let wants_approval = result.requires_approval();
      self.state.results.push(result);

      if self.state.require_approval && wants_approval {
        self.state.status = WorkflowStatus::WaitingApproval;
        self.state.pending_approval_step = Some(step.clone());
        info!(step = %step, "approval_required");
        self.notify(WorkflowEvent::ApprovalRequired {
          workflow_id: self.state.workflow_id.clone(),
          step,
        });
        return Ok(());
      }

      if !succeeded {
        self.handle_step_failure(&step).await?;
        if !self.state.continue_on_step_failure() {
          break;
        }
      }

      self.state.current_step_index += 1;
    }

    if self.state.current_step_index >= self.state.steps.len() {
      self.state.status = WorkflowStatus::Completed;
      self.state.completed_at = Some(Utc::now());
      info!(
        results = self.state.results.len(),
        failed_steps = self.state.failed_step_count(),
        "workflow_completed"
      );
      self.notify(WorkflowEvent::WorkflowCompleted {
        workflow_id: self.state.workflow_id.clone(),
        results: self.state.results.clone(),
      });
    }

    Ok(())
  }

  async fn handle_step_failure(&mut self, step: &str) -> Result<(), StepError> {
    match self.state.failure_policy {
      FailurePolicy::ContinueOnFailure => {
        warn!(step, "step failed, continuing");
      }
      FailurePolicy::RollbackOnFailure => {
        info!(step, "rollback_started");
        self.notify(WorkflowEvent::RollbackStarted {
          workflow_id: self.state.workflow_id.clone(),
          step: step.to_string(),
        });

        let mut rollback_results = Vec::new();
        let outcome = AssertUnwindSafe(
          self
            .executor
            .rollback_steps(&self.state, &mut rollback_results),
        )
        .catch_unwind()
        .await;
        self.state.results.extend(rollback_results);

        match outcome {
          Ok(Ok(())) => {}
          Ok(Err(e)) => return Err(e),
          Err(panic) => {
            return Err(StepError::message(format!(
              "rollback panicked: {}",
              panic_message(panic.as_ref())
            )));
          }
        }
        self.state.status = WorkflowStatus::Failed;
        error!(step, "workflow_failed");
      }
      FailurePolicy::StopOnFailure => {
        self.state.status = WorkflowStatus::Failed;
        error!(step, "workflow_failed");
      }
    }
    Ok(())
  }

  /// Run one step with timing and callbacks. Never fails: errors and panics
  /// from the executor become a failed result.
  async fn execute_single_step(&mut self, step: &str) -> WorkflowResult {
    let started = Instant::now();
    info!(step, "step_started");
    self.notify(WorkflowEvent::StepStarted {
      workflow_id: self.state.workflow_id.clone(),
      step: step.to_string(),
    });

    let outcome = AssertUnwindSafe(self.executor.execute_step(step, &self.state))
      .catch_unwind()
      .await;
    let elapsed = started.elapsed().as_secs_f64();

    let result = match outcome {
      Ok(Ok(result)) => result.with_execution_time(elapsed),
      Ok(Err(e)) => step_execution_error(step, &e.to_string(), elapsed),
      Err(panic) => step_execution_error(step, &panic_message(panic.as_ref()), elapsed),
    };

    if result.is_success() {
      info!(step, execution_time = elapsed, "step_completed");
    } else {
      warn!(
        step,
        error = result.error().unwrap_or_default(),
        execution_time = elapsed,
        "step_failed"
      );
    }

    self.notify(WorkflowEvent::StepCompleted {
      workflow_id: self.state.workflow_id.clone(),
      result: result.clone(),
    });

    result
  }

  /// Deliver an event, swallowing notifier errors and panics.
  fn notify(&self, event: WorkflowEvent) {
    let kind = event.kind();
    match std::panic::catch_unwind(AssertUnwindSafe(|| self.notifier.notify(event))) {
      Ok(Ok(())) => {}
      Ok(Err(e)) => warn!(
        workflow_id = %self.state.workflow_id,
        event = kind,
        error = %e,
        "notifier failed"
      ),
      Err(_) => warn!(
        workflow_id = %self.state.workflow_id,
        event = kind,
        "notifier panicked"
      ),
    }
  }
}

fn step_execution_error(step: &str, detail: &str, elapsed: f64) -> WorkflowResult {
  WorkflowResult::unchecked(step, false)
    .with_error("step_execution_error")
    .with_message(format!("Step execution failed: {detail}"))
    .with_execution_time(elapsed)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "step panicked".to_string()
  }
}
