//! Built-in workers.
//!
//! - `echo` returns its input and dependency context unchanged.
//! - `command` runs an external program, writes `{input, context}` as JSON
//!   to its stdin and returns what it prints.

use crate::core::ExecutionContext;
use crate::error::{Error, Result};
use crate::orchestration::{ParamBinding, ParamSpec, Worker, WorkerParams, WorkerRegistry};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Register the built-in worker types. Call `WorkerRegistry::build`
/// afterwards to construct them.
pub fn register_builtins(registry: &mut WorkerRegistry) {
    registry.register(
        "echo",
        |_: &WorkerParams| -> Result<Arc<dyn Worker>> { Ok(Arc::new(EchoWorker)) },
        ParamBinding::none(),
    );
    registry.register(
        "command",
        |params: &WorkerParams| -> Result<Arc<dyn Worker>> {
            Ok(Arc::new(CommandWorker::from_params(params)?))
        },
        ParamBinding::new(vec![
            ParamSpec::required("program"),
            ParamSpec::with_default("args", json!([])),
            ParamSpec::optional("cwd"),
        ]),
    );
}

/// Returns `{ "input": .., "context": .. }`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoWorker;

#[async_trait]
impl Worker for EchoWorker {
    async fn execute(&self, input: &Value, context: &ExecutionContext) -> Result<Value> {
        Ok(json!({
            "input": input,
            "context": context.to_json(),
        }))
    }
}

/// Runs an external program once per task.
#[derive(Debug, Clone)]
pub struct CommandWorker {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl CommandWorker {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
            cwd: None,
        }
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }

    pub fn from_params(params: &WorkerParams) -> Result<Self> {
        let program = params.require_str("program")?;
        if program.trim().is_empty() {
            return Err(Error::Config("parameter program must not be empty".to_string()));
        }
        let mut worker = Self::new(program, params.string_list("args")?);
        if let Some(cwd) = params.str("cwd") {
            worker = worker.with_cwd(PathBuf::from(cwd));
        }
        Ok(worker)
    }
}

#[async_trait]
impl Worker for CommandWorker {
    async fn execute(&self, input: &Value, context: &ExecutionContext) -> Result<Value> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        debug!(program = %self.program, "spawning command worker");
        let mut child = command.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(&json!({
                "input": input,
                "context": context.to_json(),
            }))?;
            // The program may exit without reading its input.
            if let Err(e) = stdin.write_all(&payload).await {
                debug!("command worker stdin closed early: {}", e);
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::CommandFailed {
                program: self.program.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        Ok(serde_json::from_str(stdout).unwrap_or_else(|_| Value::String(stdout.to_string())))
    }
}
