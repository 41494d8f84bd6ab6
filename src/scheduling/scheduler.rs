use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    app::App, clock::Clock, error::ServiceError, pipeline::ExecutionPipeline, store::ScriptStore,
};

const MIN_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Finds due scripts on a fixed tick and hands them to the execution pipeline.
///
/// "Now" always comes from the injected [`Clock`], so [`Scheduler::tick`] can
/// be driven directly in tests.
#[derive(Debug, Clone)]
pub struct Scheduler {
    store: ScriptStore,
    pipeline: ExecutionPipeline,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(
        store: ScriptStore,
        pipeline: ExecutionPipeline,
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            store,
            pipeline,
            clock,
            tick_interval: tick_interval.max(MIN_TICK_INTERVAL),
        }
    }

    pub fn from_app(app: &App) -> Self {
        Self::new(
            app.scripts.clone(),
            app.pipeline.clone(),
            Arc::clone(&app.clock),
            app.config.scheduler.tick_interval(),
        )
    }

    /// One scan: dispatches every active script whose `next_run_time` has
    /// passed and repairs scripts that lost theirs.
    ///
    /// Returns the handles of the runs it started.
    pub async fn tick(&self) -> Result<Vec<JoinHandle<()>>, ServiceError> {
        let now = self.clock.now();
        let scripts = self.store.list_active_with_schedule().await?;

        let mut dispatched = HashSet::new();
        let mut handles = Vec::new();

        for script in scripts {
            match script.next_run_time {
                None => {
                    warn!(
                        "🔧 Script {} has no next run time, recomputing it",
                        script.id
                    );
                    if let Err(e) = self.store.advance_schedule(script.id, now).await {
                        error!(
                            "❌ Could not repair schedule of script {}: {}",
                            script.id, e
                        );
                    }
                }
                Some(next_run_time) if next_run_time <= now => {
                    if !dispatched.insert(script.id) {
                        continue;
                    }
                    if let Some(handle) = self.pipeline.dispatch_scheduled(script) {
                        handles.push(handle);
                    }
                }
                Some(_) => {}
            }
        }

        if !handles.is_empty() {
            debug!("📅 Tick at {} started {} runs", now, handles.len());
        }

        Ok(handles)
    }

    /// Runs [`Scheduler::tick`] on the configured interval until stopped.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown, mut shutdown_requested) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!(
                "📅 Scheduler started (tick every {:?})",
                self.tick_interval
            );

            let mut ticker = interval(self.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.tick().await {
                            error!("❌ Scheduler tick failed, retrying next tick: {}", e);
                        }
                    }
                    _ = shutdown_requested.changed() => {
                        info!("📅 Scheduler shutting down");
                        break;
                    }
                }
            }
        });

        SchedulerHandle { shutdown, task }
    }
}

/// Controls a started [`Scheduler`].
///
/// Runs already dispatched keep going after `stop`; they finish and record
/// their outcome on their own tasks.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);

        if let Err(e) = self.task.await {
            error!("💥 Scheduler task ended abnormally: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
