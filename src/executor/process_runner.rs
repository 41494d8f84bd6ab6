use std::{
    process::{ExitStatus, Stdio},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, warn};

use super::{CappedOutput, RunnerError, RunnerOutput, ScriptRunner};

/// How long the pipe readers get to hand over buffered output once the
/// script's process group has been killed.
const DRAIN_GRACE: Duration = Duration::from_millis(200);
const READ_CHUNK: usize = 8192;

type SharedOutput = Arc<Mutex<CappedOutput>>;

/// Hands the code to an external interpreter as its last argument,
/// e.g. `sh -c <code>` or `python3 -c <code>`.
///
/// On unix the interpreter leads its own process group, so a timeout takes
/// down anything it started in the background too.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
    args: Vec<String>,
    working_dir: Option<String>,
}

impl ProcessRunner {
    pub const fn new(program: String, args: Vec<String>, working_dir: Option<String>) -> Self {
        Self {
            program,
            args,
            working_dir,
        }
    }
}

#[async_trait]
impl ScriptRunner for ProcessRunner {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn run(
        &self,
        code: &str,
        deadline: Instant,
        max_output_bytes: usize,
    ) -> Result<RunnerOutput, RunnerError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(code)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        if let Some(working_dir) = &self.working_dir {
            command.current_dir(working_dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| RunnerError::Launch(format!("{}: {e}", self.program)))?;

        debug!("Spawned '{}' (pid {:?})", self.program, child.id());

        let stdout: SharedOutput = Arc::new(Mutex::new(CappedOutput::new(max_output_bytes)));
        let stderr: SharedOutput = Arc::new(Mutex::new(CappedOutput::new(max_output_bytes)));
        let mut readers = Vec::with_capacity(2);
        if let Some(pipe) = child.stdout.take() {
            readers.push(tokio::spawn(drain(pipe, Arc::clone(&stdout))));
        }
        if let Some(pipe) = child.stderr.take() {
            readers.push(tokio::spawn(drain(pipe, Arc::clone(&stderr))));
        }

        // Readers finish once every process holding the pipes is gone
        let finished = tokio::time::timeout_at(deadline, async {
            let status = child.wait().await;
            for reader in &mut readers {
                let _ = reader.await;
            }
            status
        })
        .await;

        let status = match finished {
            Ok(status) => status.map_err(|e| RunnerError::Launch(e.to_string()))?,
            Err(_) => {
                kill(&mut child).await;
                settle(readers).await;
                return Err(RunnerError::TimedOut {
                    output: snapshot(&stdout),
                });
            }
        };

        Ok(report(status, snapshot(&stdout), snapshot(&stderr)))
    }
}

/// Reads `pipe` to the end, keeping what fits in `sink`.
async fn drain(mut pipe: impl AsyncRead + Unpin, sink: SharedOutput) {
    let mut chunk = vec![0; READ_CHUNK];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => {
                if let Ok(mut buffer) = sink.lock() {
                    buffer.push(&chunk[..read]);
                }
            }
        }
    }
}

/// Gives the readers a moment to pick up what is left in the pipes, then
/// stops them.
async fn settle(readers: Vec<JoinHandle<()>>) {
    let aborts: Vec<_> = readers.iter().map(JoinHandle::abort_handle).collect();

    let _ = tokio::time::timeout(DRAIN_GRACE, async {
        for reader in readers {
            if !reader.is_finished() {
                let _ = reader.await;
            }
        }
    })
    .await;

    for abort in aborts {
        abort.abort();
    }
}

fn snapshot(output: &SharedOutput) -> String {
    output
        .lock()
        .map(|buffer| buffer.to_string_lossy())
        .unwrap_or_default()
}

#[cfg(unix)]
async fn kill(child: &mut Child) {
    use nix::{
        sys::signal::{killpg, Signal},
        unistd::Pid,
    };

    if let Some(pgid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            debug!("Could not kill process group {}: {}", pgid, e);
        }
    }

    if let Err(e) = child.kill().await {
        warn!("⚠️ Could not kill timed out script process: {}", e);
    }
}

#[cfg(not(unix))]
async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("⚠️ Could not kill timed out script process: {}", e);
    }
}

fn report(status: ExitStatus, stdout: String, stderr: String) -> RunnerOutput {
    if status.success() {
        return RunnerOutput {
            stdout,
            stderr,
            failure: None,
        };
    }

    let failure = if stderr.trim().is_empty() {
        status.code().map_or_else(
            || "terminated by signal".to_string(),
            |code| format!("exit status {code}"),
        )
    } else {
        stderr.trim_end().to_string()
    };

    RunnerOutput {
        stdout,
        stderr,
        failure: Some(failure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 4096;

    fn shell() -> ProcessRunner {
        ProcessRunner::new("sh".to_string(), vec!["-c".to_string()], None)
    }

    fn in_seconds(seconds: u64) -> Instant {
        Instant::now() + Duration::from_secs(seconds)
    }

    fn in_millis(millis: u64) -> Instant {
        Instant::now() + Duration::from_millis(millis)
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let output = shell()
            .run("echo hello; echo careful >&2", in_seconds(5), LIMIT)
            .await
            .unwrap();

        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.stderr, "careful\n");
        assert_eq!(output.failure, None);
    }

    #[tokio::test]
    async fn test_non_zero_exit_uses_stderr_as_failure() {
        let output = shell()
            .run("echo partial; echo 'boom' >&2; exit 2", in_seconds(5), LIMIT)
            .await
            .unwrap();

        assert_eq!(output.stdout, "partial\n");
        assert_eq!(output.failure.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_silent_failure_reports_exit_status() {
        let output = shell().run("exit 3", in_seconds(5), LIMIT).await.unwrap();

        assert_eq!(output.failure.as_deref(), Some("exit status 3"));
    }

    #[tokio::test]
    async fn test_slow_process_is_killed_at_deadline() {
        let started = std::time::Instant::now();

        let result = shell().run("sleep 5", in_millis(200), LIMIT).await;

        assert!(matches!(result, Err(RunnerError::TimedOut { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_timeout_keeps_output_written_before_it() {
        let result = shell()
            .run("echo started; sleep 5", in_millis(300), LIMIT)
            .await;

        assert_eq!(
            result,
            Err(RunnerError::TimedOut {
                output: "started\n".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_large_output_is_drained_but_not_kept() {
        let output = shell()
            .run("yes | head -c 2000000; echo done >&2", in_seconds(5), 1024)
            .await
            .unwrap();

        assert_eq!(output.stdout.len(), 1025);
        assert!(output.stdout.starts_with("y\ny\n"));
        assert_eq!(output.stderr, "done\n");
        assert_eq!(output.failure, None);
    }

    #[tokio::test]
    async fn test_endless_output_is_bounded_until_the_deadline() {
        let result = shell().run("yes", in_millis(300), 1024).await;

        let Err(RunnerError::TimedOut { output }) = &result else {
            panic!("expected a timeout, got {result:?}");
        };
        assert_eq!(output.len(), 1025);
    }

    #[cfg(target_os = "linux")]
    fn is_alive(pid: &str) -> bool {
        // zombies waiting for a reaper count as gone
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                stat.rsplit_once(") ")
                    .map(|(_, rest)| !rest.starts_with('Z'))
            })
            .unwrap_or(false)
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        let started = std::time::Instant::now();

        let result = shell()
            .run("sleep 30 & echo $!; wait", in_millis(300), LIMIT)
            .await;

        let Err(RunnerError::TimedOut { output }) = &result else {
            panic!("expected a timeout, got {result:?}");
        };
        let background = output.trim().to_string();
        assert!(!background.is_empty());
        assert!(started.elapsed() < Duration::from_secs(2));

        let mut alive = is_alive(&background);
        for _ in 0..20 {
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            alive = is_alive(&background);
        }
        assert!(!alive, "background sleep {background} survived the timeout");
    }

    #[tokio::test]
    async fn test_missing_program_is_a_launch_error() {
        let runner = ProcessRunner::new("definitely-not-a-real-interpreter".to_string(), vec![], None);

        let result = runner.run("print(1)", in_seconds(5), LIMIT).await;

        assert!(matches!(result, Err(RunnerError::Launch(_))));
    }
}
