//! Reasoning service used by the planner.
//!
//! `CommandReasoningService` runs a headless CLI in print mode with JSON
//! output and returns the result text.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default timeout for one reasoning request (10 minutes).
pub const DEFAULT_REASONING_TIMEOUT_SECS: u64 = 600;

/// Something that answers a free-text prompt with free text.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn request(&self, prompt: &str) -> Result<String>;
}

/// Shape of the CLI's `--output-format json` response.
#[derive(Debug, Deserialize)]
struct RawResponse {
    subtype: Option<String>,
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    is_error: bool,
}

/// Runs `<binary> -p <prompt> --output-format json`.
#[derive(Debug, Clone)]
pub struct CommandReasoningService {
    binary: PathBuf,
    timeout: Duration,
}

impl CommandReasoningService {
    /// Locate `command` on `PATH`.
    pub fn new(command: &str) -> Result<Self> {
        let binary = which::which(command)
            .map_err(|_| Error::Reasoning(format!("'{}' not found on PATH", command)))?;
        Ok(Self::with_binary(binary))
    }

    pub fn with_binary(binary: PathBuf) -> Self {
        Self {
            binary,
            timeout: Duration::from_secs(DEFAULT_REASONING_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Pull the result text out of a JSON response.
    ///
    /// Output that is not a JSON response object is returned trimmed as-is.
    pub fn parse_response(stdout: &str) -> Result<String> {
        let raw: RawResponse = match serde_json::from_str(stdout.trim()) {
            Ok(raw) => raw,
            Err(_) => return Ok(stdout.trim().to_string()),
        };

        let failed = raw.is_error || raw.subtype.as_deref().is_some_and(|s| s.starts_with("error"));
        if failed {
            let message = raw
                .error
                .or(raw.result)
                .unwrap_or_else(|| "reasoning request failed".to_string());
            return Err(Error::Reasoning(message));
        }

        match (raw.result, raw.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(Error::Reasoning(error)),
            (None, None) => Err(Error::Reasoning("response has no result".to_string())),
        }
    }
}

#[async_trait]
impl ReasoningService for CommandReasoningService {
    async fn request(&self, prompt: &str) -> Result<String> {
        debug!(binary = %self.binary.display(), prompt_len = prompt.len(), "reasoning request");
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.binary)
                .arg("-p")
                .arg(prompt)
                .arg("--output-format")
                .arg("json")
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| Error::Timeout(self.timeout))?
        .map_err(Error::Io)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() && stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                format!(
                    "{} exited with code {}",
                    self.binary.display(),
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            };
            return Err(Error::Reasoning(message));
        }

        Self::parse_response(&stdout)
    }
}
