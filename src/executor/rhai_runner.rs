use std::{
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant as StdInstant},
};

use async_trait::async_trait;
use rhai::{EvalAltResult, Position};
use tokio::time::Instant;

use super::{CappedOutput, RunnerError, RunnerOutput, ScriptRunner};
use crate::sandbox;

/// Runs scripts in an embedded Rhai engine on the blocking pool.
///
/// `print` goes to the captured output, `info`/`warn`/`error` go to the
/// service log, and `sleep(ms)` is available for pacing.
#[derive(Debug, Clone)]
pub struct RhaiRunner {
    max_operations: u64,
}

impl RhaiRunner {
    pub const fn new(max_operations: u64) -> Self {
        Self { max_operations }
    }
}

#[async_trait]
impl ScriptRunner for RhaiRunner {
    fn name(&self) -> &'static str {
        "rhai"
    }

    async fn run(
        &self,
        code: &str,
        deadline: Instant,
        max_output_bytes: usize,
    ) -> Result<RunnerOutput, RunnerError> {
        let code = code.to_string();
        let max_operations = self.max_operations;
        let deadline = deadline.into_std();

        tokio::task::spawn_blocking(move || {
            run_script(&code, max_operations, deadline, max_output_bytes)
        })
            .await
            .map_err(|e| RunnerError::Launch(format!("rhai worker stopped: {e}")))?
    }
}

fn run_script(
    code: &str,
    max_operations: u64,
    deadline: StdInstant,
    max_output_bytes: usize,
) -> Result<RunnerOutput, RunnerError> {
    let output = Arc::new(Mutex::new(CappedOutput::new(max_output_bytes)));
    let mut engine = sandbox::engine(max_operations);

    let printed = Arc::clone(&output);
    engine.on_print(move |text| {
        if let Ok(mut buffer) = printed.lock() {
            buffer.push(text.as_bytes());
            buffer.push(b"\n");
        }
    });

    engine.on_progress(move |_| {
        if StdInstant::now() >= deadline {
            Some("timeout".into())
        } else {
            None
        }
    });

    engine.register_fn("sleep", move |ms: i64| -> Result<(), Box<EvalAltResult>> {
        let requested = Duration::from_millis(u64::try_from(ms).unwrap_or(0));
        let remaining = deadline.saturating_duration_since(StdInstant::now());

        if requested >= remaining {
            thread::sleep(remaining);
            return Err(EvalAltResult::ErrorTerminated("timeout".into(), Position::NONE).into());
        }

        thread::sleep(requested);
        Ok(())
    });

    let result = engine.run(code);
    let stdout = output
        .lock()
        .map(|buffer| buffer.to_string_lossy())
        .unwrap_or_default();

    match result {
        Ok(()) => Ok(RunnerOutput {
            stdout,
            ..Default::default()
        }),
        Err(e) if matches!(*e, EvalAltResult::ErrorTerminated(..)) => {
            Err(RunnerError::TimedOut { output: stdout })
        }
        Err(e) => Ok(RunnerOutput {
            stdout,
            stderr: String::new(),
            failure: Some(e.to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 4096;

    fn runner() -> RhaiRunner {
        RhaiRunner::new(1_000_000)
    }

    fn in_seconds(seconds: u64) -> Instant {
        Instant::now() + Duration::from_secs(seconds)
    }

    #[tokio::test]
    async fn test_print_is_captured() {
        let output = runner()
            .run(
                r#"
                let total = 0;
                for i in 1..=3 { total += i; }
                print("total: " + total);
                info("logged, not captured");
                "#,
                in_seconds(5),
                LIMIT,
            )
            .await
            .unwrap();

        assert_eq!(output.stdout, "total: 6\n");
        assert_eq!(output.failure, None);
    }

    #[tokio::test]
    async fn test_script_error_is_a_failure_with_partial_output() {
        let output = runner()
            .run(
                "print(\"before\"); let x = undefined_variable + 1;",
                in_seconds(5),
                LIMIT,
            )
            .await
            .unwrap();

        assert_eq!(output.stdout, "before\n");
        assert!(output
            .failure
            .is_some_and(|failure| failure.contains("undefined_variable")));
    }

    #[tokio::test]
    async fn test_busy_loop_is_stopped_at_deadline() {
        let runner = RhaiRunner::new(u64::MAX);
        let started = StdInstant::now();

        let result = runner
            .run(
                "print(\"started\"); let x = 0; loop { x += 1; }",
                Instant::now() + Duration::from_millis(200),
                LIMIT,
            )
            .await;

        assert_eq!(
            result,
            Err(RunnerError::TimedOut {
                output: "started\n".to_string()
            })
        );
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_sleep_past_deadline_times_out() {
        let started = StdInstant::now();

        let result = runner()
            .run(
                "sleep(10000);",
                Instant::now() + Duration::from_millis(150),
                LIMIT,
            )
            .await;

        assert!(matches!(result, Err(RunnerError::TimedOut { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_operation_limit_is_a_failure() {
        let output = RhaiRunner::new(500)
            .run("let x = 0; loop { x += 1; }", in_seconds(5), LIMIT)
            .await
            .unwrap();

        assert!(output.failure.is_some());
    }

    #[tokio::test]
    async fn test_print_capture_stops_past_the_limit() {
        let output = runner()
            .run(
                "for i in 0..1000 { print(\"line \" + i); }",
                in_seconds(5),
                16,
            )
            .await
            .unwrap();

        assert_eq!(output.stdout, "line 0\nline 1\nlin");
        assert_eq!(output.failure, None);
    }
}
