use serde::{Deserialize, Serialize};

/// Scripted outcome of a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
  #[default]
  Succeed,
  Fail,
}

/// A single step in a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
  pub name: String,
  #[serde(default)]
  pub outcome: StepOutcome,
  /// Whether the step's result asks for sign-off before the next step runs.
  #[serde(default)]
  pub requires_approval: bool,
  /// Whether a compensating `rollback_<name>` action exists for this step.
  #[serde(default)]
  pub rollback: bool,
  #[serde(default)]
  pub data: serde_json::Map<String, serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

impl StepDef {
  /// A step that succeeds with no payload.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      outcome: StepOutcome::Succeed,
      requires_approval: false,
      rollback: false,
      data: serde_json::Map::new(),
      error: None,
      message: None,
    }
  }
}
