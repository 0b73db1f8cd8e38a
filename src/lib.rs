pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod workers;
pub mod workflow;

pub use crate::core::{ExecutionContext, Task, TaskId, TaskStatus, WorkflowGraph};
pub use error::{Error, Result};
pub use workflow::{EngineState, Workflow, WorkflowId};
