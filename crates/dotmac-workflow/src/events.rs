//! Workflow events and notifiers.
//!
//! The engine emits an event at each callback point: step started, step
//! completed, approval required, rollback started, and workflow completed.
//! Notifier failures (returned errors or panics) are logged and otherwise
//! ignored; they never change what the engine does next.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::result::WorkflowResult;

/// Error type notifiers may return.
pub type NotifyError = Box<dyn std::error::Error + Send + Sync>;

/// Events emitted while a workflow runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkflowEvent {
  /// A step is about to execute.
  StepStarted { workflow_id: String, step: String },

  /// A step finished, successfully or not.
  StepCompleted {
    workflow_id: String,
    result: WorkflowResult,
  },

  /// Every step has been consumed.
  WorkflowCompleted {
    workflow_id: String,
    results: Vec<WorkflowResult>,
  },

  /// Execution suspended until the step is approved or rejected.
  ApprovalRequired { workflow_id: String, step: String },

  /// A failed step triggered rollback of earlier steps.
  RollbackStarted { workflow_id: String, step: String },
}

impl WorkflowEvent {
  /// Short name used in logs.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::StepStarted { .. } => "step_started",
      Self::StepCompleted { .. } => "step_completed",
      Self::WorkflowCompleted { .. } => "workflow_completed",
      Self::ApprovalRequired { .. } => "approval_required",
      Self::RollbackStarted { .. } => "rollback_started",
    }
  }
}

/// Trait for receiving workflow events.
///
/// Implementations decide what to do with events (audit log, UI prompt,
/// persistence, nothing). Returning an error is allowed and has no effect on
/// execution.
pub trait WorkflowNotifier: Send + Sync {
  fn notify(&self, event: WorkflowEvent) -> Result<(), NotifyError>;
}

impl<N: WorkflowNotifier + ?Sized> WorkflowNotifier for Arc<N> {
  fn notify(&self, event: WorkflowEvent) -> Result<(), NotifyError> {
    (**self).notify(event)
  }
}

/// A notifier that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl WorkflowNotifier for NoopNotifier {
  fn notify(&self, _event: WorkflowEvent) -> Result<(), NotifyError> {
    Ok(())
  }
}

/// A notifier that forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never blocks a step. Volume is a handful of
  // events per step.
  sender: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
    Self { sender }
  }

  /// Create a notifier together with the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl WorkflowNotifier for ChannelNotifier {
  fn notify(&self, event: WorkflowEvent) -> Result<(), NotifyError> {
    self
      .sender
      .send(event)
      .map_err(|_| "workflow event receiver dropped".into())
  }
}

type StepCallback = Box<dyn Fn(&str) -> Result<(), NotifyError> + Send + Sync>;
type ResultCallback = Box<dyn Fn(&WorkflowResult) -> Result<(), NotifyError> + Send + Sync>;
type ResultsCallback = Box<dyn Fn(&[WorkflowResult]) -> Result<(), NotifyError> + Send + Sync>;

/// Closure-based notifier with one optional slot per callback point.
///
/// ```ignore
/// let callbacks = Callbacks::new()
///   .on_approval_required(|step| {
///     prompts.push(step.to_string());
///     Ok(())
///   })
///   .on_workflow_completed(|results| audit(results));
/// let workflow = workflow.with_notifier(callbacks);
/// ```
#[derive(Default)]
pub struct Callbacks {
  step_started: Option<StepCallback>,
  step_completed: Option<ResultCallback>,
  workflow_completed: Option<ResultsCallback>,
  approval_required: Option<StepCallback>,
  rollback_started: Option<StepCallback>,
}

impl Callbacks {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn on_step_started<F>(mut self, callback: F) -> Self
  where
    F: Fn(&str) -> Result<(), NotifyError> + Send + Sync + 'static,
  {
    self.step_started = Some(Box::new(callback));
    self
  }

  pub fn on_step_completed<F>(mut self, callback: F) -> Self
  where
    F: Fn(&WorkflowResult) -> Result<(), NotifyError> + Send + Sync + 'static,
  {
    self.step_completed = Some(Box::new(callback));
    self
  }

  pub fn on_workflow_completed<F>(mut self, callback: F) -> Self
  where
    F: Fn(&[WorkflowResult]) -> Result<(), NotifyError> + Send + Sync + 'static,
  {
    self.workflow_completed = Some(Box::new(callback));
    self
  }

  pub fn on_approval_required<F>(mut self, callback: F) -> Self
  where
    F: Fn(&str) -> Result<(), NotifyError> + Send + Sync + 'static,
  {
    self.approval_required = Some(Box::new(callback));
    self
  }

  pub fn on_rollback_started<F>(mut self, callback: F) -> Self
  where
    F: Fn(&str) -> Result<(), NotifyError> + Send + Sync + 'static,
  {
    self.rollback_started = Some(Box::new(callback));
    self
  }
}

impl WorkflowNotifier for Callbacks {
  fn notify(&self, event: WorkflowEvent) -> Result<(), NotifyError> {
    match event {
      WorkflowEvent::StepStarted { step, .. } => match &self.step_started {
        Some(callback) => callback(&step),
        None => Ok(()),
      },
      WorkflowEvent::StepCompleted { result, .. } => match &self.step_completed {
        Some(callback) => callback(&result),
        None => Ok(()),
      },
      WorkflowEvent::WorkflowCompleted { results, .. } => match &self.workflow_completed {
        Some(callback) => callback(&results),
        None => Ok(()),
      },
      WorkflowEvent::ApprovalRequired { step, .. } => match &self.approval_required {
        Some(callback) => callback(&step),
        None => Ok(()),
      },
      WorkflowEvent::RollbackStarted { step, .. } => match &self.rollback_started {
        Some(callback) => callback(&step),
        None => Ok(()),
      },
    }
  }
}
