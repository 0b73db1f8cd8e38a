//! Orchestration layer: worker registry, task dispatch, the wave engine,
//! progress reporting, planning and the submission service.

mod dispatcher;
mod engine;
mod planner;
mod progress;
mod reasoning;
mod registry;
mod report;
mod service;

pub use dispatcher::{normalize_output, TaskExecutor, DEFAULT_TASK_TIMEOUT_SECS};
pub use engine::{EngineConfig, ExecutionEngine, FailurePolicy};
pub use planner::{extract_json, parse_plan, PlanResponse, PlannedTask, WorkflowPlanner};
pub use progress::{
    ChannelNotifier, LogNotifier, NoopNotifier, ProgressNotifier, StepEvent, StepOutcome,
    StepStatus,
};
pub use reasoning::{CommandReasoningService, ReasoningService, DEFAULT_REASONING_TIMEOUT_SECS};
pub use registry::{
    BuildFailure, BuildReport, ParamBinding, ParamSpec, Worker, WorkerFactory, WorkerParams,
    WorkerRegistry, WorkerStrategy,
};
pub use report::{ExecutionReport, FailureKind, TaskFailure};
pub use service::{StatusSnapshot, WorkflowService};
