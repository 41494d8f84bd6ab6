use std::{sync::Arc, time::Duration};

use chrono::Duration as ChronoDuration;
use tokio::{spawn, task::JoinHandle, time::sleep};
use tracing::{debug, error, info};

use crate::{
    app::App,
    clock::Clock,
    config::HistoryConfig,
    error::ServiceError,
    recorder::RunRecorder,
    scheduling::scheduler::{Scheduler, SchedulerHandle},
};

const INTERRUPTED_REASON: &str = "interrupted: the service stopped while the script was running";

/// Everything [`script_supervisor`] started.
#[derive(Debug)]
pub struct Supervisor {
    scheduler: SchedulerHandle,
    background: Vec<JoinHandle<()>>,
}

impl Supervisor {
    /// Stops the scheduler and the housekeeping loops.
    pub async fn shutdown(self) {
        self.scheduler.stop().await;

        for task in self.background {
            task.abort();
        }

        info!("🛑 Supervisor stopped");
    }
}

/// Recovers runs left over from a previous process, then starts the scheduler,
/// the stuck-run recovery loop and the history cleanup loop.
pub async fn script_supervisor(app: &App) -> Supervisor {
    match app.runs.fail_interrupted(None, INTERRUPTED_REASON).await {
        Ok(0) => debug!("No interrupted runs to recover"),
        Ok(recovered) => info!("🏥 Recovered {} runs interrupted by the last shutdown", recovered),
        Err(e) => error!("❌ Failed to recover interrupted runs: {}", e),
    }

    let scheduler = Scheduler::from_app(app).start();

    let mut background = vec![start_recovery_task(app)];
    if let Some(cleanup) = start_cleanup_task(app) {
        background.push(cleanup);
    }

    Supervisor {
        scheduler,
        background,
    }
}

fn start_recovery_task(app: &App) -> JoinHandle<()> {
    let recorder = app.runs.clone();
    let clock = Arc::clone(&app.clock);
    let execution_timeout = app.config.executor.timeout();
    let interval = app.config.scheduler.recovery_interval();

    spawn(async move {
        info!("🏥 Starting stuck run recovery");
        loop {
            sleep(interval).await;

            if let Err(e) = recover_stuck_runs(&recorder, clock.as_ref(), execution_timeout).await
            {
                error!("❌ Failed to recover stuck runs: {}", e);
            }
        }
    })
}

fn start_cleanup_task(app: &App) -> Option<JoinHandle<()>> {
    let config = app.config.history.clone();
    if config.retention_seconds == 0 {
        debug!("History retention disabled, keeping every run");
        return None;
    }

    let recorder = app.runs.clone();
    let clock = Arc::clone(&app.clock);

    Some(spawn(async move {
        info!("🧹 Starting run history cleanup");
        loop {
            match cleanup_old_runs(&recorder, clock.as_ref(), &config).await {
                Ok(0) => {}
                Ok(deleted) => info!("🧹 Deleted {} old runs", deleted),
                Err(e) => error!("🧹 Failed to clean up old runs: {}", e),
            }

            sleep(Duration::from_secs(config.cleanup_interval_seconds.max(1))).await;
        }
    }))
}

/// Fails runs that have been `running` for longer than twice the execution
/// timeout. The executor gives up well before that, so such a run can only
/// belong to a task that died.
pub async fn recover_stuck_runs(
    recorder: &RunRecorder,
    clock: &dyn Clock,
    execution_timeout: Duration,
) -> Result<u64, ServiceError> {
    let threshold = ChronoDuration::from_std(execution_timeout * 2)
        .unwrap_or_else(|_| ChronoDuration::hours(1));
    let cutoff = clock.now() - threshold;

    recorder
        .fail_interrupted(
            Some(cutoff),
            &format!(
                "recovered after running longer than {}s",
                threshold.num_seconds()
            ),
        )
        .await
}

/// Deletes finished runs older than the retention period.
pub async fn cleanup_old_runs(
    recorder: &RunRecorder,
    clock: &dyn Clock,
    config: &HistoryConfig,
) -> Result<u64, ServiceError> {
    let Some(cutoff) = i64::try_from(config.retention_seconds)
        .ok()
        .and_then(ChronoDuration::try_seconds)
        .and_then(|retention| clock.now().checked_sub_signed(retention))
    else {
        return Ok(0);
    };

    recorder
        .delete_completed_before(cutoff, config.batch_size)
        .await
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        clock::ManualClock,
        database::models::{run_status::RunStatus, run_trigger::RunTrigger},
        executor::ExecutionOutcome,
        tests::setup_test::test_database,
    };

    async fn recorder_with_clock() -> (RunRecorder, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap());
        let recorder = RunRecorder::new(test_database().await, Arc::new(clock.clone()));
        (recorder, clock)
    }

    #[tokio::test]
    async fn test_only_runs_past_twice_the_timeout_are_recovered() {
        let (recorder, clock) = recorder_with_clock().await;
        let stuck = recorder.start(1, RunTrigger::Scheduled).await.unwrap();
        clock.advance(ChronoDuration::seconds(50));
        let young = recorder.start(2, RunTrigger::Scheduled).await.unwrap();
        clock.advance(ChronoDuration::seconds(15));

        let recovered = recover_stuck_runs(&recorder, &clock, Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(recovered, 1);
        let stuck = recorder.get(stuck.id).await.unwrap();
        assert_eq!(stuck.status, RunStatus::Failed);
        assert_eq!(
            stuck.error.as_deref(),
            Some("recovered after running longer than 60s")
        );
        assert_eq!(
            recorder.get(young.id).await.unwrap().status,
            RunStatus::Running
        );
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired_history() {
        let (recorder, clock) = recorder_with_clock().await;
        let old = recorder.start(1, RunTrigger::Scheduled).await.unwrap();
        recorder
            .complete(old.id, &ExecutionOutcome::success(""))
            .await
            .unwrap();
        clock.advance(ChronoDuration::hours(2));
        let recent = recorder.start(1, RunTrigger::Scheduled).await.unwrap();
        recorder
            .complete(recent.id, &ExecutionOutcome::success(""))
            .await
            .unwrap();

        let config = HistoryConfig {
            retention_seconds: 3600,
            ..HistoryConfig::default()
        };
        let deleted = cleanup_old_runs(&recorder, &clock, &config).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(recorder.get(old.id).await.is_err());
        assert!(recorder.get(recent.id).await.is_ok());
    }
}
