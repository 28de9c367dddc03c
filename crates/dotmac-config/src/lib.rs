//! Dotmac Config
//!
//! This crate contains the serializable configuration types for dotmac
//! workflows. These types describe how a workflow should behave before an
//! engine instance is built from them.
//!
//! Configuration can be loaded from:
//! - JSON files (via the CLI `run` command)
//! - Stored snapshots (the failure policy travels with every snapshot)

mod policy;
mod step;
mod workflow;

pub use policy::{ConflictingFailurePolicy, FailurePolicy};
pub use step::{StepDef, StepOutcome};
pub use workflow::WorkflowDef;
