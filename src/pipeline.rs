//! The path every execution takes, whether an operator asked for it or the
//! scheduler found the script due: claim the script, record a `running` run,
//! execute, record the outcome.

mod execution_guard;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub use execution_guard::{ExecutionGuard, ExecutionPermit};

use crate::{
    clock::Clock,
    database::models::{run_status::RunStatus, run_trigger::RunTrigger, script, script_run},
    error::ServiceError,
    executor::ScriptExecutor,
    recorder::RunRecorder,
    store::ScriptStore,
};

#[derive(Debug, Clone)]
pub struct ExecutionPipeline {
    store: ScriptStore,
    recorder: RunRecorder,
    executor: ScriptExecutor,
    guard: ExecutionGuard,
    clock: Arc<dyn Clock>,
}

impl ExecutionPipeline {
    pub fn new(
        store: ScriptStore,
        recorder: RunRecorder,
        executor: ScriptExecutor,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            recorder,
            executor,
            guard: ExecutionGuard::default(),
            clock,
        }
    }

    pub const fn executor(&self) -> &ScriptExecutor {
        &self.executor
    }

    pub const fn guard(&self) -> &ExecutionGuard {
        &self.guard
    }

    /// Runs a script immediately and waits for the finished run.
    ///
    /// Fails fast with [`ServiceError::Busy`] if the script is already
    /// executing. The execution itself runs on a detached task, so it is
    /// recorded to the end even if the caller goes away.
    pub async fn run_now(&self, script_id: i32) -> Result<script_run::Model, ServiceError> {
        let script = self.store.get(script_id).await?;

        let permit = self
            .guard
            .try_acquire(script_id, RunTrigger::Manual)
            .ok_or(ServiceError::Busy(script_id))?;
        let run = self.recorder.start(script_id, RunTrigger::Manual).await?;

        info!("▶️ Manual run {} of script {} ({})", run.id, script.id, script.name);

        let pipeline = self.clone();
        let code = script.code;
        tokio::spawn(async move { pipeline.execute_run(permit, run.id, &code).await })
            .await
            .map_err(|e| ServiceError::InvalidState(format!("run {} was abandoned: {e}", run.id)))?
    }

    /// Starts a scheduled run of `script` in the background.
    ///
    /// Returns `None` without doing anything if the script is still executing;
    /// it stays due and is picked up by a later tick.
    pub fn dispatch_scheduled(&self, script: script::Model) -> Option<JoinHandle<()>> {
        let Some(permit) = self.guard.try_acquire(script.id, RunTrigger::Scheduled) else {
            debug!(
                "⏭️ Script {} is still executing, skipping this tick",
                script.id
            );
            return None;
        };

        let pipeline = self.clone();
        Some(tokio::spawn(async move {
            pipeline.run_scheduled(permit, script).await;
        }))
    }

    async fn run_scheduled(&self, permit: ExecutionPermit, script: script::Model) {
        let run = match self.recorder.start(script.id, RunTrigger::Scheduled).await {
            Ok(run) => run,
            Err(ServiceError::Busy(_)) => {
                debug!(
                    "⏭️ Script {} has a running run recorded elsewhere, skipping",
                    script.id
                );
                return;
            }
            Err(e) => {
                error!(
                    "❌ Could not start scheduled run of script {}: {}",
                    script.id, e
                );
                return;
            }
        };

        info!(
            "📅 Scheduled run {} of script {} ({})",
            run.id, script.id, script.name
        );

        if let Err(e) = self.execute_run(permit, run.id, &script.code).await {
            error!("❌ Could not record run {}: {}", run.id, e);
        }

        match self.store.advance_schedule(script.id, self.clock.now()).await {
            Ok(Some(advanced)) => debug!(
                "📅 Script {} next runs at {:?}",
                advanced.id, advanced.next_run_time
            ),
            Ok(None) => debug!("Script {} was deleted while it ran", script.id),
            Err(e) => error!(
                "❌ Could not advance schedule of script {}: {}",
                script.id, e
            ),
        }
    }

    /// Executes the code of a started run and records the outcome. The permit
    /// is held until the outcome is stored.
    async fn execute_run(
        &self,
        permit: ExecutionPermit,
        run_id: i32,
        code: &str,
    ) -> Result<script_run::Model, ServiceError> {
        let outcome = self.executor.execute(code).await;
        let run = self.recorder.complete(run_id, &outcome).await;
        drop(permit);

        let run = run?;
        match run.status {
            RunStatus::Success => info!(
                "✅ Run {} of script {} succeeded in {}ms",
                run.id,
                run.script_id,
                outcome.elapsed_ms()
            ),
            _ => warn!(
                "⚠️ Run {} of script {} failed in {}ms: {}",
                run.id,
                run.script_id,
                outcome.elapsed_ms(),
                run.error.as_deref().unwrap_or_default()
            ),
        }

        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        clock::ManualClock,
        executor::{ProcessRunner, RhaiRunner},
        store::NewScript,
        tests::setup_test::test_database,
    };

    struct Fixture {
        pipeline: ExecutionPipeline,
        store: ScriptStore,
        recorder: RunRecorder,
    }

    async fn fixture(executor: ScriptExecutor) -> Fixture {
        let db = test_database().await;
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap(),
        ));
        let store = ScriptStore::new(db.clone(), Arc::clone(&clock));
        let recorder = RunRecorder::new(db, Arc::clone(&clock));
        let pipeline = ExecutionPipeline::new(store.clone(), recorder.clone(), executor, clock);

        Fixture {
            pipeline,
            store,
            recorder,
        }
    }

    fn rhai_executor() -> ScriptExecutor {
        ScriptExecutor::new(
            Arc::new(RhaiRunner::new(1_000_000)),
            Duration::from_secs(5),
            4096,
        )
    }

    fn script(code: &str) -> NewScript {
        NewScript {
            name: "pipeline".to_string(),
            code: code.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_run_now_records_success() {
        let fixture = fixture(rhai_executor()).await;
        let script = fixture
            .store
            .create(script("print(\"hello\");"))
            .await
            .unwrap();

        let run = fixture.pipeline.run_now(script.id).await.unwrap();

        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.triggered_by, RunTrigger::Manual);
        assert_eq!(run.output.as_deref(), Some("hello\n"));
        assert!(!fixture.pipeline.guard().is_running(script.id));
    }

    #[tokio::test]
    async fn test_run_now_records_script_errors_as_failed_runs() {
        let fixture = fixture(rhai_executor()).await;
        let script = fixture
            .store
            .create(script("throw \"broken\";"))
            .await
            .unwrap();

        let run = fixture.pipeline.run_now(script.id).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.is_some_and(|error| error.contains("broken")));
    }

    #[tokio::test]
    async fn test_run_now_for_unknown_script() {
        let fixture = fixture(rhai_executor()).await;

        assert!(matches!(
            fixture.pipeline.run_now(42).await,
            Err(ServiceError::NotFound { id: 42, .. })
        ));
    }

    #[tokio::test]
    async fn test_second_manual_run_is_busy_while_first_runs() {
        let executor = ScriptExecutor::new(
            Arc::new(ProcessRunner::new(
                "sh".to_string(),
                vec!["-c".to_string()],
                None,
            )),
            Duration::from_secs(5),
            4096,
        );
        let fixture = fixture(executor).await;
        let script = fixture.store.create(script("sleep 0.5")).await.unwrap();

        let pipeline = fixture.pipeline.clone();
        let first = tokio::spawn(async move { pipeline.run_now(script.id).await });
        while !fixture.pipeline.guard().is_running(script.id) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(matches!(
            fixture.pipeline.run_now(script.id).await,
            Err(ServiceError::Busy(_))
        ));

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.status, RunStatus::Success);
        assert_eq!(
            fixture
                .recorder
                .list_for_script(script.id, 20)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_dispatch_skips_script_that_is_executing() {
        let fixture = fixture(rhai_executor()).await;
        let script = fixture
            .store
            .create(NewScript {
                cron_expression: Some("* * * * *".to_string()),
                ..script("print(1);")
            })
            .await
            .unwrap();
        let _permit = fixture
            .pipeline
            .guard()
            .try_acquire(script.id, RunTrigger::Manual)
            .unwrap();

        assert!(fixture.pipeline.dispatch_scheduled(script).is_none());
    }

    #[tokio::test]
    async fn test_scheduled_run_advances_schedule() {
        let fixture = fixture(rhai_executor()).await;
        let script = fixture
            .store
            .create(NewScript {
                cron_expression: Some("0 10 * * *".to_string()),
                ..script("print(\"tick\");")
            })
            .await
            .unwrap();

        fixture
            .pipeline
            .dispatch_scheduled(script.clone())
            .unwrap()
            .await
            .unwrap();

        let runs = fixture
            .recorder
            .list_for_script(script.id, 20)
            .await
            .unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].triggered_by, RunTrigger::Scheduled);
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(
            fixture.store.get(script.id).await.unwrap().next_run_time,
            Some(Utc.with_ymd_and_hms(2025, 6, 10, 10, 0, 0).unwrap())
        );
    }
}
