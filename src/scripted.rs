//! Scripted step execution driven by a workflow definition file.

use async_trait::async_trait;
use dotmac_config::{StepOutcome, WorkflowDef};
use dotmac_workflow::{StepError, StepExecutor, WorkflowResult, WorkflowState};
use tracing::debug;

/// Plays back the outcome each step declares in its definition.
///
/// `rollback_<name>` is implemented only for steps marked `rollback: true`.
pub struct ScriptedExecutor {
  def: WorkflowDef,
}

impl ScriptedExecutor {
  pub fn new(def: WorkflowDef) -> Self {
    Self { def }
  }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
  async fn execute_step(
    &mut self,
    step: &str,
    _state: &WorkflowState,
  ) -> Result<WorkflowResult, StepError> {
    if let Some(original) = step.strip_prefix("rollback_")
      && let Some(def) = self.def.step(original)
    {
      if !def.rollback {
        return Err(StepError::not_implemented(step));
      }
      debug!(step = original, "compensating step");
      return Ok(
        WorkflowResult::succeeded(step)?.with_message(format!("Rolled back {original}")),
      );
    }

    let def = self
      .def
      .step(step)
      .ok_or_else(|| StepError::not_implemented(step))?;

    let mut result = match def.outcome {
      StepOutcome::Succeed => WorkflowResult::succeeded(step)?,
      StepOutcome::Fail => {
        WorkflowResult::failed(step, def.error.as_deref().unwrap_or("step_failed"))?
      }
    }
    .with_data(def.data.clone());

    if let Some(message) = &def.message {
      result = result.with_message(message.clone());
    }
    if def.requires_approval {
      result = result.requiring_approval();
    }
    Ok(result)
  }
}
