//! Core domain models for workflow orchestration.
//!
//! This module contains the fundamental data structures used throughout
//! the engine: tasks, the validated task graph and the execution context.

pub mod context;
pub mod dag;
pub mod task;

pub use context::ExecutionContext;
pub use dag::{ready_tasks, validate, WorkflowGraph};
pub use task::{Task, TaskId, TaskStatus};
