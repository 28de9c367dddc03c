//! Behavioural tests for the workflow engine.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dotmac_workflow::{
  Callbacks, ChannelNotifier, ConfigurationError, ExecutionError, FailurePolicy, StepError,
  StepExecutor, Workflow, WorkflowEvent, WorkflowResult, WorkflowSnapshot, WorkflowState,
  WorkflowStatus,
};
use serde_json::json;

/// Executor whose behaviour per step name is configured up front.
#[derive(Default)]
struct Steps {
  failing: HashSet<String>,
  erroring: HashSet<String>,
  panicking: HashSet<String>,
  gated: HashSet<String>,
  compensated: HashSet<String>,
  broken_rollback: HashSet<String>,
  calls: Vec<String>,
}

impl Steps {
  fn new() -> Self {
    Self::default()
  }

  fn failing(mut self, step: &str) -> Self {
    self.failing.insert(step.to_string());
    self
  }

  fn erroring(mut self, step: &str) -> Self {
    self.erroring.insert(step.to_string());
    self
  }

  fn panicking(mut self, step: &str) -> Self {
    self.panicking.insert(step.to_string());
    self
  }

  fn gated(mut self, step: &str) -> Self {
    self.gated.insert(step.to_string());
    self
  }

  fn compensated(mut self, step: &str) -> Self {
    self.compensated.insert(step.to_string());
    self
  }

  fn broken_rollback(mut self, step: &str) -> Self {
    self.broken_rollback.insert(step.to_string());
    self
  }
}

#[async_trait]
impl StepExecutor for Steps {
  async fn execute_step(
    &mut self,
    step: &str,
    _state: &WorkflowState,
  ) -> Result<WorkflowResult, StepError> {
    self.calls.push(step.to_string());

    if self.panicking.contains(step) {
      panic!("step {step} exploded");
    }

    if let Some(original) = step.strip_prefix("rollback_") {
      if self.compensated.contains(original) {
        return Ok(WorkflowResult::succeeded(step)?.with_message("compensated"));
      }
      if self.broken_rollback.contains(original) {
        return Err(StepError::message(format!("cannot undo {original}")));
      }
      return Err(StepError::not_implemented(step));
    }

    if self.erroring.contains(step) {
      return Err(StepError::message("database unavailable"));
    }
    if self.failing.contains(step) {
      return Ok(WorkflowResult::failed(step, "business_rule")?);
    }

    let mut result = WorkflowResult::succeeded(step)?.with_data_value(json!({ "step": step }))?;
    if self.gated.contains(step) {
      result = result.requiring_approval();
    }
    Ok(result)
  }
}

fn steps_of(results: &[WorkflowResult]) -> Vec<&str> {
  results.iter().map(|r| r.step()).collect()
}

fn abc(executor: Steps) -> Workflow<Steps> {
  Workflow::new(executor)
    .with_id("wf-abc")
    .with_steps(["a", "b", "c"])
}

#[test]
fn test_configure_mutual_exclusion() {
  for rollback in [false, true] {
    for cont in [false, true] {
      for approval in [false, true] {
        let mut workflow = abc(Steps::new());
        let outcome = workflow.configure(rollback, cont, approval);
        if rollback && cont {
          assert!(matches!(
            outcome,
            Err(ConfigurationError::ConflictingFailurePolicy(_))
          ));
        } else {
          assert!(outcome.is_ok());
          assert_eq!(workflow.state().rollback_on_failure(), rollback);
          assert_eq!(workflow.state().continue_on_step_failure(), cont);
          assert_eq!(workflow.state().require_approval(), approval);
        }
      }
    }
  }
}

#[tokio::test]
async fn test_empty_steps_fail_validation() {
  let mut workflow = Workflow::new(Steps::new()).with_id("wf-empty");
  let results = workflow.execute().await.unwrap();

  assert_eq!(workflow.status(), WorkflowStatus::Failed);
  assert_eq!(results.len(), 1);
  assert!(!results[0].is_success());
  assert_eq!(results[0].step(), "validation");
  assert_eq!(results[0].error(), Some("empty_steps"));
  assert!(workflow.executor().calls.is_empty());
}

#[tokio::test]
async fn test_missing_id_fails_validation() {
  let mut workflow = Workflow::new(Steps::new()).with_id("").with_steps(["a"]);
  let results = workflow.execute().await.unwrap();

  assert_eq!(workflow.status(), WorkflowStatus::Failed);
  assert_eq!(results[0].error(), Some("missing_id"));
  assert!(workflow.executor().calls.is_empty());
}

#[tokio::test]
async fn test_custom_validation_runs_before_steps() {
  struct Strict;

  #[async_trait]
  impl StepExecutor for Strict {
    async fn execute_step(
      &mut self,
      step: &str,
      _state: &WorkflowState,
    ) -> Result<WorkflowResult, StepError> {
      Ok(WorkflowResult::succeeded(step)?)
    }

    async fn validate(&self, state: &WorkflowState) -> WorkflowResult {
      let base = state.check_preconditions();
      if !base.is_success() {
        return base;
      }
      if !state.metadata().contains_key("tenant") {
        return WorkflowResult::failed("validation", "missing_tenant").unwrap();
      }
      base
    }
  }

  let mut workflow = Workflow::new(Strict).with_steps(["a"]);
  workflow.execute().await.unwrap();
  assert_eq!(workflow.results()[0].error(), Some("missing_tenant"));

  let mut metadata = serde_json::Map::new();
  metadata.insert("tenant".to_string(), json!("acme"));
  let mut workflow = Workflow::new(Strict).with_steps(["a"]).with_metadata(metadata);
  workflow.execute().await.unwrap();
  assert!(workflow.state().is_completed());
}

#[tokio::test]
async fn test_sequential_ordering() {
  let mut workflow = abc(Steps::new());
  let results = workflow.execute().await.unwrap();

  assert_eq!(steps_of(&results), vec!["a", "b", "c"]);
  assert!(results.iter().all(WorkflowResult::is_success));
  assert_eq!(workflow.state().current_step_index(), 3);
  assert_eq!(workflow.status(), WorkflowStatus::Completed);
  assert!(!workflow.state().completed_with_failures());
  assert_eq!(workflow.executor().calls, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_rollback_on_failure_by_default() {
  let mut workflow = abc(Steps::new().failing("b"));
  let results = workflow.execute().await.unwrap();

  assert_eq!(workflow.status(), WorkflowStatus::Failed);
  assert_eq!(steps_of(&results), vec!["a", "b", "rollback_a"]);
  assert!(!results[1].is_success());
  // No rollback for "a" exists, which is recorded as a successful no-op.
  assert!(results[2].is_success());
  assert!(results[2].message().unwrap().contains("No rollback"));
  assert_eq!(workflow.state().current_step_index(), 1);
  assert!(!workflow.executor().calls.contains(&"c".to_string()));
}

#[tokio::test]
async fn test_rollback_runs_in_reverse_order() {
  let executor = Steps::new()
    .compensated("a")
    .compensated("b")
    .failing("c");
  let mut workflow = abc(executor);
  let results = workflow.execute().await.unwrap();

  assert_eq!(
    steps_of(&results),
    vec!["a", "b", "c", "rollback_b", "rollback_a"]
  );
  assert_eq!(results[3].message(), Some("compensated"));
  assert_eq!(workflow.status(), WorkflowStatus::Failed);
}

#[tokio::test]
async fn test_stop_on_failure_skips_rollback() {
  let mut workflow = abc(Steps::new().compensated("a").failing("b"));
  workflow.configure(false, false, false).unwrap();
  let results = workflow.execute().await.unwrap();

  assert_eq!(steps_of(&results), vec!["a", "b"]);
  assert_eq!(workflow.status(), WorkflowStatus::Failed);
  assert_eq!(workflow.executor().calls, vec!["a", "b"]);
}

#[tokio::test]
async fn test_continue_on_failure() {
  let mut workflow = abc(Steps::new().failing("b"));
  workflow.set_failure_policy(FailurePolicy::ContinueOnFailure);
  let results = workflow.execute().await.unwrap();

  assert_eq!(steps_of(&results), vec!["a", "b", "c"]);
  assert!(!results[1].is_success());
  assert_eq!(workflow.status(), WorkflowStatus::Completed);
  assert_eq!(workflow.state().current_step_index(), 3);
  assert_eq!(workflow.state().failed_step_count(), 1);
  assert!(workflow.state().completed_with_failures());
}

#[tokio::test]
async fn test_approval_suspends_and_resumes() {
  let mut workflow = abc(Steps::new().gated("b"));
  workflow.configure(true, false, true).unwrap();
  let results = workflow.execute().await.unwrap();

  assert_eq!(steps_of(&results), vec!["a", "b"]);
  assert_eq!(workflow.status(), WorkflowStatus::WaitingApproval);
  assert!(workflow.state().is_waiting_approval());
  assert_eq!(workflow.state().pending_approval_step(), Some("b"));
  assert_eq!(workflow.state().current_step_index(), 1);

  let mut approval = serde_json::Map::new();
  approval.insert("approved_by".to_string(), json!("manager"));
  let results = workflow.approve_and_continue(Some(approval)).await.unwrap();

  assert_eq!(steps_of(&results), vec!["a", "b", "c"]);
  assert_eq!(workflow.status(), WorkflowStatus::Completed);
  assert_eq!(workflow.state().pending_approval_step(), None);
  assert_eq!(
    workflow.state().approval_data().unwrap()["approved_by"],
    "manager"
  );
  assert_eq!(workflow.executor().calls, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_approval_flag_ignored_without_require_approval() {
  let mut workflow = abc(Steps::new().gated("b"));
  workflow.execute().await.unwrap();

  assert_eq!(workflow.status(), WorkflowStatus::Completed);
  assert!(workflow.results()[1].requires_approval());
}

#[tokio::test]
async fn test_reject_cancels() {
  let mut workflow = abc(Steps::new().gated("b"));
  workflow.configure(false, false, true).unwrap();
  workflow.execute().await.unwrap();

  let results = workflow.reject_and_cancel(Some("budget")).await.unwrap();

  assert_eq!(workflow.status(), WorkflowStatus::Cancelled);
  assert_eq!(results.len(), 3);
  let rejection = results.last().unwrap();
  assert_eq!(rejection.step(), "b");
  assert_eq!(rejection.error(), Some("approval_rejected"));
  assert_eq!(rejection.data()["reason"], "budget");
  assert_eq!(workflow.state().pending_approval_step(), None);
  assert!(!workflow.executor().calls.contains(&"c".to_string()));

  assert!(matches!(
    workflow.execute().await,
    Err(ExecutionError::Finished { .. })
  ));
}

#[tokio::test]
async fn test_approve_requires_waiting_status() {
  let mut workflow = abc(Steps::new());

  assert!(matches!(
    workflow.approve_and_continue(None).await,
    Err(ExecutionError::NotWaitingApproval { .. })
  ));
  assert!(matches!(
    workflow.reject_and_cancel(None).await,
    Err(ExecutionError::NotWaitingApproval { .. })
  ));
  assert!(workflow.results().is_empty());
}

#[tokio::test]
async fn test_repeated_gates_suspend_again() {
  let mut workflow = abc(Steps::new().gated("a").gated("c"));
  workflow.set_require_approval(true);

  workflow.execute().await.unwrap();
  assert_eq!(workflow.state().pending_approval_step(), Some("a"));

  workflow.approve_and_continue(None).await.unwrap();
  assert_eq!(workflow.state().pending_approval_step(), Some("c"));
  assert_eq!(workflow.state().current_step_index(), 2);

  workflow.approve_and_continue(None).await.unwrap();
  assert_eq!(workflow.status(), WorkflowStatus::Completed);
  assert_eq!(workflow.state().current_step_index(), 3);
}

#[tokio::test]
async fn test_snapshot_round_trip_while_suspended() {
  let mut workflow = abc(Steps::new().gated("b"));
  workflow.configure(false, false, true).unwrap();
  workflow.execute().await.unwrap();

  let snapshot = workflow.to_snapshot();
  let mut restored = Workflow::from_snapshot(snapshot.clone(), Steps::new()).unwrap();

  assert_eq!(restored.to_snapshot(), snapshot);
  assert_eq!(restored.status(), WorkflowStatus::WaitingApproval);
  assert_eq!(restored.results(), workflow.results());

  let results = restored.approve_and_continue(None).await.unwrap();
  assert_eq!(steps_of(&results), vec!["a", "b", "c"]);
  assert_eq!(restored.executor().calls, vec!["c"]);

  // The original is untouched by the restored copy.
  assert_eq!(workflow.status(), WorkflowStatus::WaitingApproval);
}

#[tokio::test]
async fn test_snapshot_round_trip_through_json() {
  for executor in [
    Steps::new(),
    Steps::new().failing("b"),
    Steps::new().failing("b").compensated("a"),
  ] {
    let mut workflow = abc(executor);
    workflow.execute().await.unwrap();

    let value = workflow.to_snapshot().to_value().unwrap();
    let snapshot = WorkflowSnapshot::from_value(value).unwrap();
    let restored = Workflow::from_snapshot(snapshot, Steps::new()).unwrap();

    assert_eq!(restored.status(), workflow.status());
    assert_eq!(
      restored.state().current_step_index(),
      workflow.state().current_step_index()
    );
    assert_eq!(
      steps_of(restored.results()),
      steps_of(workflow.results())
    );
    assert_eq!(
      restored.state().failure_policy(),
      workflow.state().failure_policy()
    );
  }
}

#[tokio::test]
async fn test_reentrant_execute_is_rejected() {
  let mut workflow = abc(Steps::new().gated("a"));
  workflow.set_require_approval(true);
  workflow.execute().await.unwrap();
  let before = workflow.results().len();

  assert!(matches!(
    workflow.execute().await,
    Err(ExecutionError::AlreadyActive {
      status: WorkflowStatus::WaitingApproval,
      ..
    })
  ));
  assert_eq!(workflow.results().len(), before);

  // A snapshot taken mid-run restores as running and cannot be re-driven.
  let mut snapshot = workflow.to_snapshot();
  snapshot.status = WorkflowStatus::Running;
  snapshot.pending_approval_step = None;
  let mut running = Workflow::from_snapshot(snapshot, Steps::new()).unwrap();

  assert!(matches!(
    running.execute().await,
    Err(ExecutionError::AlreadyActive {
      status: WorkflowStatus::Running,
      ..
    })
  ));
  assert_eq!(running.results().len(), before);
  assert!(running.executor().calls.is_empty());
}

#[tokio::test]
async fn test_step_error_is_contained() {
  let mut workflow = abc(Steps::new().erroring("b"));
  workflow.set_failure_policy(FailurePolicy::ContinueOnFailure);
  let results = workflow.execute().await.unwrap();

  assert_eq!(results[1].error(), Some("step_execution_error"));
  assert!(results[1].message().unwrap().contains("database unavailable"));
  assert!(results[1].execution_time().is_some());
  assert_eq!(workflow.status(), WorkflowStatus::Completed);
}

#[tokio::test]
async fn test_step_panic_is_contained() {
  let mut workflow = abc(Steps::new().panicking("b"));
  workflow.configure(false, false, false).unwrap();
  let results = workflow.execute().await.unwrap();

  assert_eq!(steps_of(&results), vec!["a", "b"]);
  assert_eq!(results[1].error(), Some("step_execution_error"));
  assert!(results[1].message().unwrap().contains("exploded"));
  assert_eq!(workflow.status(), WorkflowStatus::Failed);
}

#[tokio::test]
async fn test_rollback_error_propagates() {
  let mut workflow = abc(Steps::new().broken_rollback("a").failing("b"));
  let err = workflow.execute().await.unwrap_err();

  match err {
    ExecutionError::StepLoop { step, source, .. } => {
      assert_eq!(step, "b");
      assert!(source.to_string().contains("cannot undo a"));
    }
    other => panic!("unexpected error: {other}"),
  }
  assert_eq!(workflow.status(), WorkflowStatus::Failed);
  let last = workflow.results().last().unwrap();
  assert_eq!(last.error(), Some("execution_error"));
  assert_eq!(last.step(), "b");
}

#[tokio::test]
async fn test_rollback_error_keeps_completed_compensations() {
  let mut workflow = abc(
    Steps::new()
      .compensated("b")
      .broken_rollback("a")
      .failing("c"),
  );
  let err = workflow.execute().await.unwrap_err();

  assert!(matches!(err, ExecutionError::StepLoop { ref step, .. } if step == "c"));
  assert_eq!(workflow.status(), WorkflowStatus::Failed);
  assert_eq!(
    steps_of(workflow.results()),
    vec!["a", "b", "c", "rollback_b", "c"]
  );
  assert_eq!(workflow.results()[3].message(), Some("compensated"));
  assert_eq!(workflow.results()[4].error(), Some("execution_error"));
}

#[tokio::test]
async fn test_rollback_panic_fails_workflow() {
  let mut workflow = abc(
    Steps::new()
      .compensated("b")
      .panicking("rollback_a")
      .failing("c"),
  );
  let err = workflow.execute().await.unwrap_err();

  match err {
    ExecutionError::StepLoop { step, source, .. } => {
      assert_eq!(step, "c");
      assert!(source.to_string().contains("rollback_a exploded"));
    }
    other => panic!("unexpected error: {other}"),
  }
  assert_eq!(workflow.status(), WorkflowStatus::Failed);
  assert_eq!(
    steps_of(workflow.results()),
    vec!["a", "b", "c", "rollback_b", "c"]
  );
  assert_eq!(workflow.results()[4].error(), Some("execution_error"));

  // No longer wedged in the running state.
  assert!(matches!(
    workflow.execute().await,
    Err(ExecutionError::Finished { .. })
  ));
}

#[tokio::test]
async fn test_custom_rollback_override() {
  struct Ledger {
    undone: Vec<String>,
  }

  #[async_trait]
  impl StepExecutor for Ledger {
    async fn execute_step(
      &mut self,
      step: &str,
      _state: &WorkflowState,
    ) -> Result<WorkflowResult, StepError> {
      if step == "charge" {
        return Ok(WorkflowResult::failed(step, "declined")?);
      }
      Ok(WorkflowResult::succeeded(step)?)
    }

    async fn rollback_steps(
      &mut self,
      state: &WorkflowState,
      results: &mut Vec<WorkflowResult>,
    ) -> Result<(), StepError> {
      for result in state.results().iter().filter(|r| r.is_success()) {
        self.undone.push(result.step().to_string());
        results.push(WorkflowResult::succeeded(format!("undo_{}", result.step()))?);
      }
      Ok(())
    }
  }

  let mut workflow = Workflow::new(Ledger { undone: Vec::new() })
    .with_steps(["reserve", "invoice", "charge"]);
  let results = workflow.execute().await.unwrap();

  assert_eq!(
    steps_of(&results),
    vec!["reserve", "invoice", "charge", "undo_reserve", "undo_invoice"]
  );
  assert_eq!(workflow.executor().undone, vec!["reserve", "invoice"]);
}

#[tokio::test]
async fn test_notifier_failures_do_not_affect_execution() {
  let callbacks = Callbacks::new()
    .on_step_started(|_| Err("audit log offline".into()))
    .on_step_completed(|_| panic!("ui crashed"))
    .on_workflow_completed(|_| Err("nope".into()));

  let mut workflow = abc(Steps::new()).with_notifier(callbacks);
  let results = workflow.execute().await.unwrap();

  assert_eq!(results.len(), 3);
  assert_eq!(workflow.status(), WorkflowStatus::Completed);
}

#[tokio::test]
async fn test_event_sequence() {
  let (notifier, mut events) = ChannelNotifier::channel();
  let mut workflow = abc(Steps::new().gated("b")).with_notifier(notifier);
  workflow.set_require_approval(true);
  workflow.execute().await.unwrap();
  workflow.approve_and_continue(None).await.unwrap();

  let mut kinds = Vec::new();
  while let Ok(event) = events.try_recv() {
    kinds.push(event.kind());
  }
  assert_eq!(
    kinds,
    vec![
      "step_started",
      "step_completed",
      "step_started",
      "step_completed",
      "approval_required",
      "step_started",
      "step_completed",
      "workflow_completed",
    ]
  );
}

#[tokio::test]
async fn test_rollback_callback_fires() {
  let rollbacks = Arc::new(Mutex::new(Vec::new()));
  let seen = rollbacks.clone();
  let callbacks = Callbacks::new().on_rollback_started(move |step| {
    seen.lock().unwrap().push(step.to_string());
    Ok(())
  });

  let mut workflow = abc(Steps::new().failing("c")).with_notifier(callbacks);
  workflow.execute().await.unwrap();

  assert_eq!(*rollbacks.lock().unwrap(), vec!["c"]);
}

#[tokio::test]
async fn test_completed_event_carries_results() {
  let (notifier, mut events) = ChannelNotifier::channel();
  let mut workflow = abc(Steps::new()).with_notifier(notifier);
  workflow.execute().await.unwrap();

  let mut last = None;
  while let Ok(event) = events.try_recv() {
    last = Some(event);
  }
  match last {
    Some(WorkflowEvent::WorkflowCompleted {
      workflow_id,
      results,
    }) => {
      assert_eq!(workflow_id, "wf-abc");
      assert_eq!(results.len(), 3);
    }
    other => panic!("unexpected final event: {other:?}"),
  }
}
