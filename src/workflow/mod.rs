//! Workflow-level types: the task graph for one objective and the
//! lifecycle of a run.

mod types;

pub use types::{EngineState, Workflow, WorkflowId};
