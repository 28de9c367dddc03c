use serde::{Deserialize, Serialize};

use crate::policy::FailurePolicy;
use crate::step::StepDef;

/// A workflow definition as loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub workflow_id: Option<String>,
  pub steps: Vec<StepDef>,
  #[serde(default)]
  pub metadata: serde_json::Map<String, serde_json::Value>,
  #[serde(default)]
  pub failure_policy: FailurePolicy,
  #[serde(default)]
  pub require_approval: bool,
}

impl WorkflowDef {
  /// Step names in execution order.
  pub fn step_names(&self) -> Vec<String> {
    self.steps.iter().map(|s| s.name.clone()).collect()
  }

  /// Look up a step by name.
  pub fn step(&self, name: &str) -> Option<&StepDef> {
    self.steps.iter().find(|s| s.name == name)
  }
}
