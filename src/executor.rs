//! Runs script code behind a pluggable [`ScriptRunner`] and turns whatever
//! happens into an [`ExecutionOutcome`].

mod process_runner;
mod rhai_runner;

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, warn};

pub use process_runner::ProcessRunner;
pub use rhai_runner::RhaiRunner;

use crate::{
    config::{ExecutorConfig, RunnerConfig},
    database::models::run_status::RunStatus,
};

const STDERR_MARKER: &str = "\n--- stderr ---\n";
const TRUNCATION_MARKER: &str = "\n... [output truncated]";
/// Extra time the runner gets to report its own timeout before it is abandoned.
const TIMEOUT_GRACE: Duration = Duration::from_millis(250);

/// What a runner observed while executing code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerOutput {
    pub stdout: String,
    pub stderr: String,
    /// Why the script failed, if it did.
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("timeout")]
    TimedOut { output: String },
    #[error("failed to launch script: {0}")]
    Launch(String),
}

/// An execution backend.
///
/// Implementations stop the script once `deadline` passes and report
/// [`RunnerError::TimedOut`] with whatever output was captured so far.
/// Each output stream is captured through a [`CappedOutput`] of
/// `max_output_bytes`, so a chatty script never grows the buffer past it.
#[async_trait]
pub trait ScriptRunner: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        code: &str,
        deadline: Instant,
        max_output_bytes: usize,
    ) -> Result<RunnerOutput, RunnerError>;
}

/// Output buffer that stops growing at its limit.
///
/// Keeps one byte past the limit so the later cut is still marked as a
/// truncation; everything after that is dropped on arrival.
#[derive(Debug, Clone, Default)]
pub struct CappedOutput {
    bytes: Vec<u8>,
    limit: usize,
}

impl CappedOutput {
    pub const fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        let room = self
            .limit
            .saturating_add(1)
            .saturating_sub(self.bytes.len());
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub status: RunStatus,
    pub output: String,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl ExecutionOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Success,
            output: output.into(),
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn failure(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            output: output.into(),
            error: Some(error.into()),
            elapsed: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn elapsed_ms(&self) -> i64 {
        i64::try_from(self.elapsed.as_millis()).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    runner: Arc<dyn ScriptRunner>,
    timeout: Duration,
    max_output_bytes: usize,
}

impl ScriptExecutor {
    pub fn new(runner: Arc<dyn ScriptRunner>, timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            runner,
            timeout,
            max_output_bytes,
        }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        let runner: Arc<dyn ScriptRunner> = match &config.runner {
            RunnerConfig::Rhai { max_operations } => Arc::new(RhaiRunner::new(*max_operations)),
            RunnerConfig::Process {
                program,
                args,
                working_dir,
            } => Arc::new(ProcessRunner::new(
                program.clone(),
                args.clone(),
                working_dir.clone(),
            )),
        };

        Self::new(runner, config.timeout(), config.max_output_bytes)
    }

    pub fn runner_name(&self) -> &'static str {
        self.runner.name()
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `code` to completion or until the timeout.
    ///
    /// Never fails: launch errors, script errors, timeouts and runner panics
    /// all end up as a `failed` outcome.
    pub async fn execute(&self, code: &str) -> ExecutionOutcome {
        let started = Instant::now();
        let deadline = started + self.timeout;

        let runner = Arc::clone(&self.runner);
        let code = code.to_string();
        let max_output_bytes = self.max_output_bytes;
        let mut task =
            tokio::spawn(async move { runner.run(&code, deadline, max_output_bytes).await });

        let result = match tokio::time::timeout(self.timeout + TIMEOUT_GRACE, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                error!("💥 Script runner '{}' panicked: {}", self.runner.name(), join_error);
                return self
                    .finish(ExecutionOutcome::failure("", "script runner panicked"))
                    .with_elapsed(started.elapsed());
            }
            Err(_) => {
                warn!(
                    "⏰ Script runner '{}' ignored its deadline, abandoning it",
                    self.runner.name()
                );
                task.abort();
                Err(RunnerError::TimedOut {
                    output: String::new(),
                })
            }
        };

        let outcome = match result {
            Ok(RunnerOutput {
                stdout,
                stderr,
                failure: None,
            }) => ExecutionOutcome::success(with_stderr(stdout, &stderr)),
            Ok(RunnerOutput {
                stdout,
                failure: Some(failure),
                ..
            }) => ExecutionOutcome::failure(stdout, failure),
            Err(RunnerError::TimedOut { output }) => ExecutionOutcome::failure(output, "timeout"),
            Err(e @ RunnerError::Launch(_)) => ExecutionOutcome::failure("", e.to_string()),
        };

        let elapsed = started.elapsed();
        debug!(
            "Script finished with status {} in {:?}",
            outcome.status, elapsed
        );

        self.finish(outcome).with_elapsed(elapsed)
    }

    fn finish(&self, mut outcome: ExecutionOutcome) -> ExecutionOutcome {
        outcome.output = truncate(outcome.output, self.max_output_bytes);
        outcome.error = outcome
            .error
            .map(|error| truncate(error, self.max_output_bytes));
        outcome
    }
}

fn with_stderr(mut stdout: String, stderr: &str) -> String {
    if !stderr.is_empty() {
        stdout.push_str(STDERR_MARKER);
        stdout.push_str(stderr);
    }
    stdout
}

/// Cuts `text` to at most `max_bytes` on a character boundary and marks the cut.
fn truncate(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }

    let mut boundary = max_bytes;
    while !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    text.truncate(boundary);
    text.push_str(TRUNCATION_MARKER);
    text
}
