//! Recurring-job scheduler with bounded retry.
//!
//! `JobSchedulerService` registers named units of async work on fixed
//! intervals. A failed run is re-attempted after a short delay, up to a
//! per-job maximum, by scheduling a one-shot follow-up under a derived id
//! (`{job_id}_retry_{n}`); registering under an id that is already taken
//! replaces the previous schedule. Work failures never escape the wrapper:
//! they end in either a delayed retry or a terminal log line.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::errors::AppError;
use crate::external::market_data::{MarketDataProvider, NetworkProvider, NewsProvider};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Upper bound on how long `shutdown(wait = true)` blocks on in-flight work.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

// Context passed to job functions
#[derive(Clone)]
pub struct JobContext {
    pub pool: PgPool,
    pub market_data: Arc<dyn MarketDataProvider>,
    pub news: Arc<dyn NewsProvider>,
    pub network: Arc<dyn NetworkProvider>,
    pub settings: Arc<Settings>,
}

#[derive(Debug)]
pub struct JobResult {
    pub items_processed: i32,
    pub items_failed: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// One scheduled re-execution of a previously failed run. The record is the
/// unit of schedule for retries; attempt numbers increase strictly within a
/// chain, starting at 1 for the first retry.
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    pub job_id: String,
    pub attempt_number: u32,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledJobInfo {
    pub job_id: String,
    pub schedule_id: Uuid,
}

type WorkFuture = BoxFuture<'static, Result<JobResult, AppError>>;
type WorkFn = Arc<dyn Fn() -> WorkFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

/// Counts runs currently executing so shutdown can drain them.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    drained: Notify,
}

impl InFlight {
    fn track(this: &Arc<InFlight>) -> InFlightGuard {
        this.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            inner: Arc::clone(this),
        }
    }

    fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    async fn drain(&self) {
        loop {
            if self.len() == 0 {
                return;
            }
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.len() == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct InFlightGuard {
    inner: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}

struct SchedulerCore {
    scheduler: Mutex<JobScheduler>,
    /// job id (or derived retry id) -> schedule uuid. All mutations go
    /// through `upsert`/`discard` so a replaced entry is fully removed
    /// before its successor becomes visible.
    registry: DashMap<String, Uuid>,
    lifecycle: parking_lot::Mutex<Lifecycle>,
    in_flight: Arc<InFlight>,
}

impl SchedulerCore {
    fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    async fn upsert(&self, key: String, job: Job) -> Result<Uuid, AppError> {
        if let Some((_, stale)) = self.registry.remove(&key) {
            let mut scheduler = self.scheduler.lock().await;
            if let Err(e) = scheduler.remove(&stale).await {
                warn!(job_id = %key, error = %e, "failed to remove superseded schedule");
            }
        }

        let schedule_id = self
            .scheduler
            .lock()
            .await
            .add(job)
            .await
            .map_err(|e| AppError::Scheduler(format!("failed to add job {key}: {e}")))?;

        self.registry.insert(key, schedule_id);
        Ok(schedule_id)
    }

    async fn discard(&self, key: &str) {
        if let Some((_, schedule_id)) = self.registry.remove(key) {
            let mut scheduler = self.scheduler.lock().await;
            if let Err(e) = scheduler.remove(&schedule_id).await {
                debug!(job_id = %key, error = %e, "failed to drop schedule");
            }
        }
    }
}

/// Everything a single registered job needs to run and to re-schedule
/// itself after a failure.
struct JobRuntime {
    job_id: String,
    policy: RetryPolicy,
    work: WorkFn,
    /// One permit per job id: an overlapping fire is suppressed, not queued.
    gate: Arc<Semaphore>,
    core: Arc<SchedulerCore>,
}

pub struct JobSchedulerService {
    core: Arc<SchedulerCore>,
}

impl JobSchedulerService {
    pub async fn new() -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Scheduler(format!("failed to create scheduler: {e}")))?;

        Ok(Self {
            core: Arc::new(SchedulerCore {
                scheduler: Mutex::new(scheduler),
                registry: DashMap::new(),
                lifecycle: parking_lot::Mutex::new(Lifecycle::Created),
                in_flight: Arc::new(InFlight::default()),
            }),
        })
    }

    /// Register `work` to run every `interval` with the default retry policy.
    pub async fn register<F, Fut>(
        &self,
        job_id: &str,
        interval: Duration,
        work: F,
    ) -> Result<(), AppError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JobResult, AppError>> + Send + 'static,
    {
        self.register_with_policy(job_id, interval, RetryPolicy::default(), work)
            .await
    }

    /// Register `work` to run every `interval`. Registering an id that is
    /// already taken replaces the previous registration and drops any retry
    /// still pending from it.
    pub async fn register_with_policy<F, Fut>(
        &self,
        job_id: &str,
        interval: Duration,
        policy: RetryPolicy,
        work: F,
    ) -> Result<(), AppError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JobResult, AppError>> + Send + 'static,
    {
        if self.core.lifecycle() == Lifecycle::Stopped {
            return Err(AppError::Scheduler(format!(
                "cannot register job {job_id}: scheduler has been shut down"
            )));
        }
        if interval.as_secs() == 0 {
            return Err(AppError::Validation(format!(
                "job {job_id} interval must be at least one second"
            )));
        }

        let work_fn: WorkFn = Arc::new(move || Box::pin(work()) as WorkFuture);
        let runtime = Arc::new(JobRuntime {
            job_id: job_id.to_string(),
            policy,
            work: work_fn,
            gate: Arc::new(Semaphore::new(1)),
            core: Arc::clone(&self.core),
        });

        // Drop retries left over from a previous registration of this id.
        let retry_prefix = format!("{job_id}_retry_");
        let stale_retries: Vec<String> = self
            .core
            .registry
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| key.starts_with(&retry_prefix))
            .collect();
        for key in stale_retries {
            self.core.discard(&key).await;
        }

        let rt = Arc::clone(&runtime);
        let job = Job::new_repeated_async(interval, move |_uuid, _lock| {
            run_attempt(Arc::clone(&rt), 0)
        })
        .map_err(|e| AppError::Scheduler(format!("failed to create job {job_id}: {e}")))?;

        self.core.upsert(job_id.to_string(), job).await?;

        info!(
            job_id,
            interval_secs = interval.as_secs(),
            max_retries = policy.max_retries,
            retry_delay_secs = policy.retry_delay.as_secs(),
            "registered recurring job"
        );
        Ok(())
    }

    /// Activate the dispatch loop. Valid exactly once per instance.
    pub async fn start(&self) -> Result<(), AppError> {
        {
            let mut lifecycle = self.core.lifecycle.lock();
            match *lifecycle {
                Lifecycle::Created => *lifecycle = Lifecycle::Running,
                Lifecycle::Running => {
                    return Err(AppError::Scheduler("scheduler already started".to_string()))
                }
                Lifecycle::Stopped => {
                    return Err(AppError::Scheduler(
                        "scheduler has been shut down".to_string(),
                    ))
                }
            }
        }

        self.core
            .scheduler
            .lock()
            .await
            .start()
            .await
            .map_err(|e| AppError::Scheduler(format!("failed to start scheduler: {e}")))?;

        info!(jobs = self.core.registry.len(), "job scheduler started");
        Ok(())
    }

    /// Stop dispatch. Future fires are cancelled immediately; with
    /// `wait = true` the call returns only once in-flight work has finished
    /// (bounded by an internal timeout). A stopped scheduler cannot be
    /// restarted.
    pub async fn shutdown(&self, wait: bool) -> Result<(), AppError> {
        {
            let mut lifecycle = self.core.lifecycle.lock();
            if *lifecycle == Lifecycle::Stopped {
                debug!("scheduler already stopped");
                return Ok(());
            }
            *lifecycle = Lifecycle::Stopped;
        }

        self.core
            .scheduler
            .lock()
            .await
            .shutdown()
            .await
            .map_err(|e| AppError::Scheduler(format!("scheduler shutdown failed: {e}")))?;

        if wait
            && tokio::time::timeout(DRAIN_TIMEOUT, self.core.in_flight.drain())
                .await
                .is_err()
        {
            warn!(
                in_flight = self.core.in_flight.len(),
                "drain timed out with work still in flight"
            );
        }

        info!("job scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.core.lifecycle() == Lifecycle::Running
    }

    pub fn state(&self) -> &'static str {
        match self.core.lifecycle() {
            Lifecycle::Created => "created",
            Lifecycle::Running => "running",
            Lifecycle::Stopped => "stopped",
        }
    }

    /// Snapshot of the registry, base jobs and pending retries alike.
    pub fn jobs(&self) -> Vec<ScheduledJobInfo> {
        let mut jobs: Vec<ScheduledJobInfo> = self
            .core
            .registry
            .iter()
            .map(|entry| ScheduledJobInfo {
                job_id: entry.key().clone(),
                schedule_id: *entry.value(),
            })
            .collect();
        jobs.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        jobs
    }
}

/// Derived schedule id for the retry that follows a failure at `attempt`.
fn retry_job_id(job_id: &str, attempt: u32) -> String {
    format!("{job_id}_retry_{attempt}")
}

/// Execute one invocation of a job. `attempt` is 0 for an interval fire and
/// n >= 1 for the n-th retry of a failed run.
fn run_attempt(rt: Arc<JobRuntime>, attempt: u32) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if rt.core.lifecycle() == Lifecycle::Stopped {
            debug!(job_id = %rt.job_id, "scheduler stopped, dropping fire");
            return;
        }

        // A retry fire consumes its one-shot schedule.
        if attempt > 0 {
            rt.core.discard(&retry_job_id(&rt.job_id, attempt - 1)).await;
        }

        let permit = match rt.gate.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(job_id = %rt.job_id, attempt, "previous run still in flight, fire suppressed");
                return;
            }
        };

        let _guard = InFlight::track(&rt.core.in_flight);
        let started = std::time::Instant::now();
        let result = (rt.work)().await;
        drop(permit);

        match result {
            Ok(outcome) => {
                info!(
                    job_id = %rt.job_id,
                    attempt,
                    items_processed = outcome.items_processed,
                    items_failed = outcome.items_failed,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "job completed"
                );
            }
            Err(err) => handle_failure(Arc::clone(&rt), attempt, err).await,
        }
    })
}

async fn handle_failure(rt: Arc<JobRuntime>, attempt: u32, err: AppError) {
    if attempt < rt.policy.max_retries {
        let next = RetryAttempt {
            job_id: rt.job_id.clone(),
            attempt_number: attempt + 1,
            scheduled_at: Utc::now()
                + chrono::Duration::milliseconds(rt.policy.retry_delay.as_millis() as i64),
        };
        warn!(
            job_id = %rt.job_id,
            attempt,
            error = %err,
            retry_at = %next.scheduled_at,
            "job failed, scheduling retry"
        );
        if let Err(e) = schedule_retry(Arc::clone(&rt), next).await {
            error!(job_id = %rt.job_id, error = %e, "failed to schedule retry");
        }
    } else {
        error!(
            job_id = %rt.job_id,
            attempt,
            max_retries = rt.policy.max_retries,
            error = %err,
            "job failed after all retries, giving up"
        );
    }
}

/// Schedule a one-shot re-execution. The derived id uses the pre-increment
/// attempt number, so consecutive retries of one chain never collide, while
/// a retry from a newer chain replaces a stale pending one at the same depth.
async fn schedule_retry(rt: Arc<JobRuntime>, next: RetryAttempt) -> Result<(), AppError> {
    if rt.core.lifecycle() == Lifecycle::Stopped {
        debug!(job_id = %rt.job_id, "scheduler stopped, dropping retry");
        return Ok(());
    }

    let retry_id = retry_job_id(&next.job_id, next.attempt_number - 1);
    let attempt_number = next.attempt_number;
    let runtime = Arc::clone(&rt);
    let job = Job::new_one_shot_async(rt.policy.retry_delay, move |_uuid, _lock| {
        run_attempt(Arc::clone(&runtime), attempt_number)
    })
    .map_err(|e| AppError::Scheduler(format!("failed to create retry for {}: {e}", rt.job_id)))?;

    rt.core.upsert(retry_id, job).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32};

    fn quick_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            retry_delay: Duration::from_millis(100),
        }
    }

    fn runtime_for(
        svc: &JobSchedulerService,
        job_id: &str,
        policy: RetryPolicy,
        work: WorkFn,
    ) -> Arc<JobRuntime> {
        Arc::new(JobRuntime {
            job_id: job_id.to_string(),
            policy,
            work,
            gate: Arc::new(Semaphore::new(1)),
            core: Arc::clone(&svc.core),
        })
    }

    #[test]
    fn test_retry_ids_do_not_collide_across_attempts() {
        assert_eq!(retry_job_id("ping", 0), "ping_retry_0");
        assert_eq!(retry_job_id("ping", 1), "ping_retry_1");
        assert_ne!(retry_job_id("ping", 0), retry_job_id("ping", 1));
        assert_ne!(retry_job_id("ping", 0), retry_job_id("pong", 0));
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.retry_delay, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_always_failing_work_retries_then_gives_up() {
        let svc = JobSchedulerService::new().await.unwrap();
        svc.start().await.unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let work: WorkFn = Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::External("boom".to_string()))
            }) as WorkFuture
        });

        let rt = runtime_for(&svc, "ping", quick_policy(2), work);
        run_attempt(rt, 0).await;

        // The scheduler tick is coarse; leave room for both retries to fire.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3, "initial run plus 2 retries");

        // No further attempts after the chain gave up.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        svc.shutdown(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_max_retries_fails_terminally_on_first_error() {
        let svc = JobSchedulerService::new().await.unwrap();
        svc.start().await.unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let work: WorkFn = Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::External("boom".to_string()))
            }) as WorkFuture
        });

        let rt = runtime_for(&svc, "once", quick_policy(0), work);
        run_attempt(rt, 0).await;

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        svc.shutdown(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_interval_job_fires_without_overlap() {
        let svc = JobSchedulerService::new().await.unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let current = Arc::new(AtomicI32::new(0));
        let max_concurrent = Arc::new(AtomicI32::new(0));

        let (c, cur, max) = (calls.clone(), current.clone(), max_concurrent.clone());
        svc.register("tick", Duration::from_secs(1), move || {
            let (c, cur, max) = (c.clone(), cur.clone(), max.clone());
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                let now = cur.fetch_add(1, Ordering::SeqCst) + 1;
                max.fetch_max(now, Ordering::SeqCst);
                // Runs longer than the interval to provoke overlapping fires.
                tokio::time::sleep(Duration::from_millis(1500)).await;
                cur.fetch_sub(1, Ordering::SeqCst);
                Ok(JobResult {
                    items_processed: 1,
                    items_failed: 0,
                })
            }
        })
        .await
        .unwrap();

        svc.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        svc.shutdown(true).await.unwrap();

        assert!(calls.load(Ordering::SeqCst) >= 2, "job should fire repeatedly");
        assert_eq!(
            max_concurrent.load(Ordering::SeqCst),
            1,
            "same job id must never run concurrently"
        );
    }

    #[tokio::test]
    async fn test_reregistration_replaces_previous_schedule() {
        let svc = JobSchedulerService::new().await.unwrap();

        let first_calls = Arc::new(AtomicU32::new(0));
        let second_calls = Arc::new(AtomicU32::new(0));

        let counter = first_calls.clone();
        svc.register("dup", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(JobResult {
                    items_processed: 0,
                    items_failed: 0,
                })
            }
        })
        .await
        .unwrap();

        let counter = second_calls.clone();
        svc.register("dup", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(JobResult {
                    items_processed: 0,
                    items_failed: 0,
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(svc.jobs().len(), 1, "latest registration wins");

        svc.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2600)).await;
        svc.shutdown(true).await.unwrap();

        assert_eq!(
            first_calls.load(Ordering::SeqCst),
            0,
            "stale registration must not fire"
        );
        assert!(second_calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let svc = JobSchedulerService::new().await.unwrap();
        svc.start().await.unwrap();

        let err = svc.start().await.unwrap_err();
        assert!(matches!(err, AppError::Scheduler(_)));

        svc.shutdown(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_register_after_shutdown_is_rejected() {
        let svc = JobSchedulerService::new().await.unwrap();
        svc.start().await.unwrap();
        svc.shutdown(false).await.unwrap();

        let err = svc
            .register("late", Duration::from_secs(1), || async {
                Ok(JobResult {
                    items_processed: 0,
                    items_failed: 0,
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Scheduler(_)));
    }

    #[tokio::test]
    async fn test_start_after_shutdown_is_rejected() {
        let svc = JobSchedulerService::new().await.unwrap();
        svc.start().await.unwrap();
        svc.shutdown(false).await.unwrap();

        let err = svc.start().await.unwrap_err();
        assert!(matches!(err, AppError::Scheduler(_)));
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let svc = JobSchedulerService::new().await.unwrap();
        let err = svc
            .register("instant", Duration::ZERO, || async {
                Ok(JobResult {
                    items_processed: 0,
                    items_failed: 0,
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_work() {
        let svc = JobSchedulerService::new().await.unwrap();

        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicU32::new(0));

        let (s, f, c) = (started.clone(), finished.clone(), calls.clone());
        svc.register("slow", Duration::from_secs(1), move || {
            let (s, f, c) = (s.clone(), f.clone(), c.clone());
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                s.store(true, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1200)).await;
                f.store(true, Ordering::SeqCst);
                Ok(JobResult {
                    items_processed: 1,
                    items_failed: 0,
                })
            }
        })
        .await
        .unwrap();

        svc.start().await.unwrap();

        // Wait for the first fire to begin.
        let mut waited = Duration::ZERO;
        while !started.load(Ordering::SeqCst) {
            assert!(waited < Duration::from_secs(5), "job never started");
            tokio::time::sleep(Duration::from_millis(50)).await;
            waited += Duration::from_millis(50);
        }

        svc.shutdown(true).await.unwrap();
        assert!(
            finished.load(Ordering::SeqCst),
            "shutdown(wait) must return only after in-flight work completes"
        );

        // No new fires after shutdown returned.
        let after = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after);
    }
}
