//! Dotmac Workflow
//!
//! A generic, sequential workflow engine. A [`Workflow`] owns an ordered list
//! of step names and drives them one at a time through a caller-supplied
//! [`StepExecutor`], with approval gating, rollback on failure, and a
//! complete serializable [`WorkflowSnapshot`] so a suspended instance can be
//! persisted and resumed later.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Workflow<E, N>                         │
//! │  - execute() / approve_and_continue() / reject_and_cancel() │
//! │  - cursor, status, append-only results                      │
//! │  - to_snapshot() / from_snapshot()                          │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                   │
//!            ▼                                   ▼
//! ┌──────────────────────────────┐  ┌──────────────────────────────┐
//! │       E: StepExecutor        │  │     N: WorkflowNotifier      │
//! │  - execute_step (required)   │  │  - step started / completed  │
//! │  - validate (optional)       │  │  - approval required         │
//! │  - rollback_steps (optional) │  │  - rollback / completion     │
//! └──────────────────────────────┘  └──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dotmac_workflow::{Workflow, WorkflowStatus};
//!
//! let mut workflow = Workflow::new(MySteps::default())
//!   .with_steps(["collect", "review", "publish"]);
//! workflow.configure(false, false, true)?;
//!
//! let results = workflow.execute().await?;
//! if workflow.status() == WorkflowStatus::WaitingApproval {
//!   store.save(&workflow.to_snapshot()).await?;
//! }
//! ```

mod engine;
mod error;
mod events;
mod executor;
mod result;
mod state;
mod status;

pub use dotmac_config::FailurePolicy;
pub use engine::Workflow;
pub use error::{ConfigurationError, ExecutionError, InvalidResult, SnapshotError, StepError};
pub use events::{
  Callbacks, ChannelNotifier, NoopNotifier, NotifyError, WorkflowEvent, WorkflowNotifier,
};
pub use executor::{StepExecutor, rollback_completed_steps};
pub use result::WorkflowResult;
pub use state::{WorkflowSnapshot, WorkflowState};
pub use status::WorkflowStatus;
