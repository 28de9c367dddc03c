use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a workflow instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
  #[default]
  Pending,
  Running,
  Completed,
  Failed,
  Cancelled,
  WaitingApproval,
  Paused,
}

impl WorkflowStatus {
  /// No further execution is permitted from a terminal status.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
  }

  /// A driver currently owns the instance (or it is suspended mid-run).
  pub fn is_active(self) -> bool {
    matches!(self, Self::Running | Self::WaitingApproval)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Running => "running",
      Self::Completed => "completed",
      Self::Failed => "failed",
      Self::Cancelled => "cancelled",
      Self::WaitingApproval => "waiting_approval",
      Self::Paused => "paused",
    }
  }
}

impl fmt::Display for WorkflowStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
