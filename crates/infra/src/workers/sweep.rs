//! Background retry sweep.
//!
//! A single long-lived task per process that polls for due retries and
//! re-runs them through the executor, sequentially within one tick to bound
//! concurrent provider load. The library never starts this on its own: the
//! process bootstrap constructs the sweep, calls [`RetrySweep::start`], and
//! owns shutdown through the returned [`SweepHandle`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use repogauge_core::JobId;
use repogauge_retry::RetryPolicy;

use crate::jobs::executor::{AnalysisExecutor, ExecutorError};
use crate::jobs::scheduler::RetryScheduler;
use crate::jobs::store::JobStore;
use crate::jobs::types::JobStatus;

/// Sweep configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// How often a sweep tick fires.
    pub interval: Duration,
    /// Maximum jobs picked up per tick.
    pub batch_size: usize,
    /// Deadline per executor call; expiry counts as a transient failure.
    pub executor_timeout: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 10,
            executor_timeout: Duration::from_secs(120),
        }
    }
}

/// Counters for one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepStats {
    /// Jobs picked up this tick.
    pub picked: usize,
    pub completed: usize,
    /// Failures re-armed for a later retry.
    pub rearmed: usize,
    /// Failures that became terminal.
    pub exhausted: usize,
    /// Jobs skipped because another instance got there first.
    pub skipped: usize,
}

enum JobOutcome {
    Completed,
    Rearmed,
    Exhausted,
    Skipped,
}

/// Periodic retry sweep over the job store.
pub struct RetrySweep<S: JobStore> {
    store: S,
    scheduler: RetryScheduler<S>,
    executor: Arc<dyn AnalysisExecutor>,
    config: SweepConfig,
    sweeping: AtomicBool,
}

impl<S: JobStore + Clone + 'static> RetrySweep<S> {
    pub fn new(store: S, executor: Arc<dyn AnalysisExecutor>, config: SweepConfig) -> Self {
        Self::with_policy(store, executor, config, RetryPolicy::default())
    }

    pub fn with_policy(
        store: S,
        executor: Arc<dyn AnalysisExecutor>,
        config: SweepConfig,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            scheduler: RetryScheduler::with_policy(store.clone(), policy),
            store,
            executor,
            config,
            sweeping: AtomicBool::new(false),
        }
    }

    /// Spawn the periodic sweep task.
    pub fn start(self: Arc<Self>) -> SweepHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let sweep = self;

        let join = tokio::spawn(async move {
            info!(
                interval_ms = sweep.config.interval.as_millis() as u64,
                batch_size = sweep.config.batch_size,
                "retry sweep started"
            );

            let mut ticker = tokio::time::interval(sweep.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stats = sweep.run_once().await;
                        if stats.picked > 0 {
                            debug!(?stats, "sweep tick finished");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("retry sweep stopped");
        });

        SweepHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }

    /// Run one sweep pass.
    ///
    /// Re-entrant calls are a no-op: if a pass is already in flight (an
    /// overlapping timer tick, or a second process-local caller), the tick
    /// is logged and skipped.
    pub async fn run_once(&self) -> SweepStats {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sweep already in progress, skipping tick");
            return SweepStats::default();
        }

        let stats = self.sweep().await;
        self.sweeping.store(false, Ordering::SeqCst);
        stats
    }

    async fn sweep(&self) -> SweepStats {
        let mut stats = SweepStats::default();

        // At most one provider call in flight per sweep tick.
        for job_id in self
            .scheduler
            .jobs_ready_for_retry(self.config.batch_size)
            .await
        {
            stats.picked += 1;
            match self.process(job_id).await {
                Ok(JobOutcome::Completed) => stats.completed += 1,
                Ok(JobOutcome::Rearmed) => stats.rearmed += 1,
                Ok(JobOutcome::Exhausted) => stats.exhausted += 1,
                Ok(JobOutcome::Skipped) => stats.skipped += 1,
                Err(err) => {
                    // One bad job must not take the sweep down.
                    warn!(%job_id, error = %err, "sweep failed to process job");
                }
            }
        }

        stats
    }

    async fn process(&self, job_id: JobId) -> Result<JobOutcome, String> {
        let job = self.store.get(job_id).await.map_err(|e| e.to_string())?;
        let Some(mut job) = job else {
            return Err("job vanished between poll and pickup".to_string());
        };

        // At-least-once pickup across processes: only run jobs still Pending.
        if job.status != JobStatus::Pending {
            debug!(%job_id, status = %job.status, "job no longer pending, skipping");
            return Ok(JobOutcome::Skipped);
        }

        job.mark_processing();
        self.store.update(&job).await.map_err(|e| e.to_string())?;

        let attempt = job.retry_state().retry_count + 1;
        debug!(%job_id, attempt, "re-executing job");

        let outcome = tokio::time::timeout(self.config.executor_timeout, self.executor.execute(&job))
            .await
            .unwrap_or(Err(ExecutorError::TimedOut));

        match outcome {
            Ok(result) => {
                job.mark_completed(result);
                self.store.update(&job).await.map_err(|e| e.to_string())?;
                info!(%job_id, attempt, "job completed after retry");
                Ok(JobOutcome::Completed)
            }
            Err(err) => {
                let decision = self
                    .scheduler
                    .schedule_retry(job_id, &err.to_string())
                    .await
                    .map_err(|e| e.to_string())?;
                if decision.scheduled {
                    Ok(JobOutcome::Rearmed)
                } else {
                    Ok(JobOutcome::Exhausted)
                }
            }
        }
    }
}

/// Handle to control a running sweep task.
#[derive(Debug)]
pub struct SweepHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Signal shutdown and wait for the in-flight tick to finish.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{json, Value as JsonValue};

    use super::*;
    use repogauge_core::AccountId;
    use repogauge_retry::{RetryMetadata, RetryPolicy};

    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::Job;

    /// Executor stub driven by a script of outcomes, one per call.
    struct ScriptedExecutor {
        script: Mutex<VecDeque<Result<JsonValue, ExecutorError>>>,
        calls: Mutex<Vec<JobId>>,
    }

    impl ScriptedExecutor {
        fn new(script: Vec<Result<JsonValue, ExecutorError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<JobId> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AnalysisExecutor for ScriptedExecutor {
        async fn execute(&self, job: &Job) -> Result<JsonValue, ExecutorError> {
            self.calls.lock().unwrap().push(job.id);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(json!({"status": "ok"})))
        }
    }

    /// A Pending job with an already-elapsed retry deadline. `age_secs`
    /// spreads `created_at` so FIFO ordering is deterministic.
    async fn aged_due_job(store: &Arc<InMemoryJobStore>, age_secs: i64) -> JobId {
        let mut job = Job::new(AccountId::new(), 3, json!({"repo": "x"}));
        job.created_at = Utc::now() - chrono::Duration::seconds(age_secs);
        let mut meta = RetryPolicy::default().next(
            &RetryMetadata::default(),
            "NETWORK_ERROR: connection reset",
            Utc::now(),
        );
        meta.next_retry_at = Some(Utc::now() - chrono::Duration::seconds(1));
        job.apply_retry(meta);
        store.insert(job.clone()).await.unwrap();
        job.id
    }

    async fn due_job(store: &Arc<InMemoryJobStore>) -> JobId {
        aged_due_job(store, 60).await
    }

    fn sweep_over(
        store: Arc<InMemoryJobStore>,
        executor: Arc<dyn AnalysisExecutor>,
    ) -> RetrySweep<Arc<InMemoryJobStore>> {
        RetrySweep::new(store, executor, SweepConfig::default())
    }

    #[tokio::test]
    async fn successful_retry_completes_the_job() {
        let store = InMemoryJobStore::arc();
        let job_id = due_job(&store).await;
        let executor = ScriptedExecutor::new(vec![Ok(json!({"findings": []}))]);
        let sweep = sweep_over(store.clone(), executor.clone());

        let stats = sweep.run_once().await;

        assert_eq!(stats.picked, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(executor.calls(), vec![job_id]);

        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(json!({"findings": []})));
    }

    #[tokio::test]
    async fn transient_failure_rearms_through_the_scheduler() {
        let store = InMemoryJobStore::arc();
        let job_id = due_job(&store).await;
        let executor = ScriptedExecutor::new(vec![Err(ExecutorError::failed(
            "RATE_LIMIT_ERROR: slow down",
        ))]);
        let sweep = sweep_over(store.clone(), executor);

        let stats = sweep.run_once().await;

        assert_eq!(stats.rearmed, 1);
        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_state().retry_count, 2);
        assert!(job.retry_state().next_retry_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn permanent_failure_is_terminal() {
        let store = InMemoryJobStore::arc();
        let job_id = due_job(&store).await;
        let executor = ScriptedExecutor::new(vec![Err(ExecutorError::failed("INVALID_API_KEY"))]);
        let sweep = sweep_over(store.clone(), executor);

        let stats = sweep.run_once().await;

        assert_eq!(stats.exhausted, 1);
        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.retry_state().last_error.as_deref(),
            Some("INVALID_API_KEY")
        );
    }

    #[tokio::test]
    async fn executor_timeout_counts_as_transient() {
        struct HangingExecutor;

        #[async_trait]
        impl AnalysisExecutor for HangingExecutor {
            async fn execute(&self, _job: &Job) -> Result<JsonValue, ExecutorError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(JsonValue::Null)
            }
        }

        let store = InMemoryJobStore::arc();
        let job_id = due_job(&store).await;
        let sweep = RetrySweep::new(
            store.clone(),
            Arc::new(HangingExecutor),
            SweepConfig {
                executor_timeout: Duration::from_millis(20),
                ..SweepConfig::default()
            },
        );

        let stats = sweep.run_once().await;

        assert_eq!(stats.rearmed, 1);
        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job
            .retry_state()
            .last_error
            .unwrap()
            .contains("TIMEOUT_ERROR"));
    }

    #[tokio::test]
    async fn fresh_submissions_are_left_to_the_first_run_path() {
        let store = InMemoryJobStore::arc();
        let job = Job::new(AccountId::new(), 3, json!({}));
        store.insert(job).await.unwrap();

        let executor = ScriptedExecutor::new(vec![]);
        let sweep = sweep_over(store.clone(), executor.clone());

        let stats = sweep.run_once().await;

        assert_eq!(stats.picked, 0);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn batch_is_processed_sequentially_and_capped() {
        let store = InMemoryJobStore::arc();
        for age in 0..4 {
            aged_due_job(&store, 100 - age).await;
        }

        let executor = ScriptedExecutor::new(vec![]);
        let sweep = RetrySweep::new(
            store.clone(),
            executor.clone(),
            SweepConfig {
                batch_size: 3,
                ..SweepConfig::default()
            },
        );

        let stats = sweep.run_once().await;

        assert_eq!(stats.picked, 3);
        assert_eq!(stats.completed, 3);
        assert_eq!(executor.calls().len(), 3);
    }

    #[tokio::test]
    async fn one_failing_job_does_not_halt_the_sweep() {
        let store = InMemoryJobStore::arc();
        let first = aged_due_job(&store, 120).await;
        let second = aged_due_job(&store, 60).await;

        let executor = ScriptedExecutor::new(vec![
            Err(ExecutorError::failed("INVALID_API_KEY")),
            Ok(json!({"findings": []})),
        ]);
        let sweep = sweep_over(store.clone(), executor.clone());

        let stats = sweep.run_once().await;

        assert_eq!(stats.picked, 2);
        assert_eq!(stats.exhausted, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(executor.calls(), vec![first, second]);

        let second_job = store.get(second).await.unwrap().unwrap();
        assert_eq!(second_job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn lifecycle_start_and_stop() {
        let store = InMemoryJobStore::arc();
        let job_id = due_job(&store).await;
        let executor = ScriptedExecutor::new(vec![]);
        let sweep = Arc::new(RetrySweep::new(
            store.clone(),
            executor,
            SweepConfig {
                interval: Duration::from_millis(10),
                ..SweepConfig::default()
            },
        ));

        let handle = sweep.clone().start();

        // First tick fires immediately; give it a moment to land.
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }
}
