use serde::{Deserialize, Serialize};

/// Returned when both rollback and continue-on-failure are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rollback_on_failure and continue_on_step_failure are mutually exclusive")]
pub struct ConflictingFailurePolicy;

/// What the engine does after a step reports failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
  /// Mark the workflow failed and stop.
  StopOnFailure,
  /// Record the failure and keep executing the remaining steps.
  ContinueOnFailure,
  /// Compensate previously successful steps in reverse order, then fail.
  #[default]
  RollbackOnFailure,
}

impl FailurePolicy {
  /// Build a policy from the legacy pair of boolean flags.
  pub fn from_flags(
    rollback_on_failure: bool,
    continue_on_step_failure: bool,
  ) -> Result<Self, ConflictingFailurePolicy> {
    match (rollback_on_failure, continue_on_step_failure) {
      (true, true) => Err(ConflictingFailurePolicy),
      (true, false) => Ok(Self::RollbackOnFailure),
      (false, true) => Ok(Self::ContinueOnFailure),
      (false, false) => Ok(Self::StopOnFailure),
    }
  }

  pub fn rollback_on_failure(self) -> bool {
    matches!(self, Self::RollbackOnFailure)
  }

  pub fn continue_on_step_failure(self) -> bool {
    matches!(self, Self::ContinueOnFailure)
  }
}
