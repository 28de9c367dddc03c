//! Step results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::InvalidResult;

/// Outcome of one executed step.
///
/// Results are built once and then only read: the engine appends them to the
/// workflow's history and never touches them again. Business failures are
/// reported here (`success == false` plus an `error` code) rather than as
/// Rust errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ResultRecord")]
pub struct WorkflowResult {
  success: bool,
  step: String,
  data: Map<String, Value>,
  error: Option<String>,
  message: Option<String>,
  execution_time: Option<f64>,
  requires_approval: bool,
}

impl WorkflowResult {
  /// Create a result for `step`. Fails if the step name is blank.
  pub fn new(step: impl Into<String>, success: bool) -> Result<Self, InvalidResult> {
    let step = step.into();
    if step.trim().is_empty() {
      return Err(InvalidResult::EmptyStep);
    }
    Ok(Self::unchecked(step, success))
  }

  pub fn succeeded(step: impl Into<String>) -> Result<Self, InvalidResult> {
    Self::new(step, true)
  }

  pub fn failed(step: impl Into<String>, error: impl Into<String>) -> Result<Self, InvalidResult> {
    Ok(Self::new(step, false)?.with_error(error))
  }

  /// Engine-built results whose step name is known to be non-empty.
  pub(crate) fn unchecked(step: impl Into<String>, success: bool) -> Self {
    Self {
      success,
      step: step.into(),
      data: Map::new(),
      error: None,
      message: None,
      execution_time: None,
      requires_approval: false,
    }
  }

  pub fn with_data(mut self, data: Map<String, Value>) -> Self {
    self.data = data;
    self
  }

  /// Attach an arbitrary JSON payload, which must be an object.
  pub fn with_data_value(self, data: Value) -> Result<Self, InvalidResult> {
    match data {
      Value::Object(map) => Ok(self.with_data(map)),
      other => Err(InvalidResult::DataNotAMapping {
        kind: value_kind(&other),
      }),
    }
  }

  pub fn with_error(mut self, error: impl Into<String>) -> Self {
    self.error = Some(error.into());
    self
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = Some(message.into());
    self
  }

  /// Ask the engine to suspend for sign-off after this step.
  pub fn requiring_approval(mut self) -> Self {
    self.requires_approval = true;
    self
  }

  pub(crate) fn with_execution_time(mut self, seconds: f64) -> Self {
    self.execution_time = Some(seconds);
    self
  }

  pub fn is_success(&self) -> bool {
    self.success
  }

  pub fn step(&self) -> &str {
    &self.step
  }

  pub fn data(&self) -> &Map<String, Value> {
    &self.data
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn message(&self) -> Option<&str> {
    self.message.as_deref()
  }

  /// Wall-clock seconds spent in the step, set by the engine.
  pub fn execution_time(&self) -> Option<f64> {
    self.execution_time
  }

  pub fn requires_approval(&self) -> bool {
    self.requires_approval
  }
}

/// Wire form of [`WorkflowResult`]; invariants are checked on conversion.
#[derive(Deserialize)]
struct ResultRecord {
  success: bool,
  step: String,
  data: Value,
  #[serde(deserialize_with = "Option::deserialize")]
  error: Option<String>,
  #[serde(deserialize_with = "Option::deserialize")]
  message: Option<String>,
  #[serde(deserialize_with = "Option::deserialize")]
  execution_time: Option<f64>,
  requires_approval: bool,
}

impl TryFrom<ResultRecord> for WorkflowResult {
  type Error = InvalidResult;

  fn try_from(record: ResultRecord) -> Result<Self, Self::Error> {
    let mut result = WorkflowResult::new(record.step, record.success)?.with_data_value(record.data)?;
    result.error = record.error;
    result.message = record.message;
    result.execution_time = record.execution_time;
    result.requires_approval = record.requires_approval;
    Ok(result)
  }
}

fn value_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
