//! The business-action extension point.

use async_trait::async_trait;
use tracing::debug;

use crate::error::StepError;
use crate::result::WorkflowResult;
use crate::state::WorkflowState;

/// Supplies the behaviour behind each step name.
///
/// The engine is generic over the business action: it handles ordering,
/// timing, approval, rollback and persistence, and calls `execute_step` for
/// the actual work. Unknown step names should return
/// [`StepError::NotImplemented`], which rollback treats as "nothing to undo".
#[async_trait]
pub trait StepExecutor: Send + Sync {
  /// Run one step and report its outcome.
  ///
  /// Business failures should be returned as `Ok` results with
  /// `success == false`. Errors and panics are caught by the engine and
  /// turned into `step_execution_error` results.
  async fn execute_step(
    &mut self,
    step: &str,
    state: &WorkflowState,
  ) -> Result<WorkflowResult, StepError>;

  /// Check preconditions before the first step runs.
  ///
  /// Overrides should start from [`WorkflowState::check_preconditions`].
  async fn validate(&self, state: &WorkflowState) -> WorkflowResult {
    state.check_preconditions()
  }

  /// Undo previously successful steps after a failure.
  ///
  /// Each rollback result is pushed onto `results` as soon as it is known, so
  /// compensations that ran before an error are still recorded. The engine
  /// appends `results` to the workflow history. An error aborts the run with
  /// [`ExecutionError::StepLoop`](crate::ExecutionError).
  async fn rollback_steps(
    &mut self,
    state: &WorkflowState,
    results: &mut Vec<WorkflowResult>,
  ) -> Result<(), StepError> {
    rollback_completed_steps(self, state, results).await
  }
}

/// Default rollback traversal.
///
/// Walks the history newest-first, skipping the failed entry at the end, and
/// runs `rollback_<step>` for every successful result. A `NotImplemented`
/// answer is recorded as a successful no-op; any other error stops the walk
/// and is returned.
pub async fn rollback_completed_steps<E>(
  executor: &mut E,
  state: &WorkflowState,
  results: &mut Vec<WorkflowResult>,
) -> Result<(), StepError>
where
  E: StepExecutor + ?Sized,
{
  let history = state.results();
  let completed = &history[..history.len().saturating_sub(1)];

  for result in completed.iter().rev().filter(|r| r.is_success()) {
    let rollback_step = format!("rollback_{}", result.step());
    debug!(step = %result.step(), rollback_step = %rollback_step, "rolling back step");

    match executor.execute_step(&rollback_step, state).await {
      Ok(rollback_result) => results.push(rollback_result),
      Err(StepError::NotImplemented { .. }) => results.push(
        WorkflowResult::unchecked(rollback_step, true)
          .with_message(format!("No rollback implementation for step {}", result.step())),
      ),
      Err(e) => return Err(e),
    }
  }

  Ok(())
}
