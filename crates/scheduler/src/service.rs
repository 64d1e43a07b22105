//! Core scheduler: trigger registration, timer loop, execution safety.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    chrono::{DateTime, Local, Utc},
    tokio::{
        sync::{Mutex, Notify, RwLock},
        task::JoinHandle,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    error::{Error, Result},
    parse::parse_one_shot_time,
    schedule::{Trigger, next_run, parse_trigger},
    store::JobStore,
    types::{Job, JobType},
};

/// Callback invoked when a job fires.
///
/// Receives a snapshot of the job and a cancellation token that trips on
/// execution timeout and on scheduler shutdown; handlers are expected to
/// honor it. The returned string is the handler's result summary; only
/// errors are recorded on the job.
pub type JobHandler = Arc<
    dyn Fn(Job, CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send>>
        + Send
        + Sync,
>;

/// Tunables for execution and shutdown.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on one handler invocation.
    pub job_timeout: Duration,
    /// How long [`Scheduler::stop`] waits for in-flight executions.
    pub shutdown_grace: Duration,
    /// Timer-loop poll fallback when no job has a computed next run.
    pub idle_poll: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(5 * 60),
            shutdown_grace: Duration::from_secs(10),
            idle_poll: Duration::from_secs(60),
        }
    }
}

/// In-memory registration state for one job.
struct JobEntry {
    job: Job,
    /// Recurring trigger; `None` for disabled, one-shot, or unparsable jobs.
    trigger: Option<Trigger>,
    next_run_at: Option<DateTime<Utc>>,
    /// Overlap guard: at most one concurrent execution per job.
    running: bool,
    /// Pending one-shot timer task, aborted on removal.
    oneshot: Option<JoinHandle<()>>,
}

/// The job scheduler.
///
/// Owns the job registry, drives a timer loop for recurring jobs and a
/// dedicated timer task per one-shot job, and mirrors every change through
/// the [`JobStore`]. Distinct jobs execute concurrently; each job is
/// serialized only against itself.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    handler: JobHandler,
    config: SchedulerConfig,
    jobs: RwLock<HashMap<String, JobEntry>>,
    running: RwLock<bool>,
    wake: Notify,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown: Mutex<CancellationToken>,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl Scheduler {
    pub fn new(store: Arc<dyn JobStore>, handler: JobHandler) -> Arc<Self> {
        Self::with_config(store, handler, SchedulerConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn JobStore>,
        handler: JobHandler,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            handler,
            config,
            jobs: RwLock::new(HashMap::new()),
            running: RwLock::new(false),
            wake: Notify::new(),
            timer_handle: Mutex::new(None),
            shutdown: Mutex::new(CancellationToken::new()),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        })
    }

    /// Load persisted jobs, register triggers for the enabled ones, and
    /// start the timer loop.
    ///
    /// A persisted schedule that no longer parses is skipped with a warning;
    /// the job stays visible but gets no trigger.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let loaded = self.store.load_all().await?;
        info!(count = loaded.len(), "loaded persisted jobs");

        *self.shutdown.lock().await = CancellationToken::new();
        {
            let mut jobs = self.jobs.write().await;
            jobs.clear();
            for job in loaded {
                jobs.insert(job.id.clone(), JobEntry {
                    job,
                    trigger: None,
                    next_run_at: None,
                    running: false,
                    oneshot: None,
                });
            }
        }
        *self.running.write().await = true;

        let ids: Vec<String> = self.jobs.read().await.keys().cloned().collect();
        for id in ids {
            let enabled = self
                .jobs
                .read()
                .await
                .get(&id)
                .is_some_and(|e| e.job.enabled);
            if !enabled {
                continue;
            }
            if let Err(e) = self.register_trigger(&id).await {
                warn!(job_id = %id, error = %e, "persisted schedule no longer parses, job left unscheduled");
            }
        }

        let svc = Arc::clone(self);
        let handle = tokio::spawn(async move { svc.timer_loop().await });
        *self.timer_handle.lock().await = Some(handle);
        info!("scheduler started");
        Ok(())
    }

    /// Stop the timer loop and wait up to the shutdown grace for in-flight
    /// executions. Always returns; a timeout is logged, not an error.
    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.shutdown.lock().await.cancel();
        self.wake.notify_one();

        if let Some(handle) = self.timer_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "timer loop task failed");
            }
        }

        let drain = async {
            loop {
                if self.in_flight.load(Ordering::SeqCst) == 0 {
                    break;
                }
                let notified = self.drained.notified();
                if self.in_flight.load(Ordering::SeqCst) == 0 {
                    break;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(self.config.shutdown_grace, drain)
            .await
            .is_err()
        {
            warn!(
                in_flight = self.in_flight.load(Ordering::SeqCst),
                "shutdown grace expired with executions still running"
            );
        }
        info!("scheduler stopped");
    }

    /// Add a job.
    ///
    /// Rejects an empty id, an empty or unparsable schedule, and a duplicate
    /// id (the existing job is left untouched). When the scheduler is
    /// running and the job is enabled, the trigger is registered
    /// immediately. The job is then persisted; a store failure is logged
    /// but does not roll back the in-memory add.
    pub async fn add(self: &Arc<Self>, mut job: Job) -> Result<Job> {
        if job.id.trim().is_empty() {
            return Err(Error::invalid_job("empty job id"));
        }
        if job.schedule.trim().is_empty() {
            return Err(Error::invalid_schedule("empty schedule"));
        }
        // Validate up front: an unparsable schedule rejects the add with
        // nothing stored.
        match job.kind {
            JobType::At => {
                parse_one_shot_time(&job.schedule, Local::now())?;
            }
            kind => {
                parse_trigger(kind, &job.schedule)?;
            }
        }
        job.created_at = Utc::now();

        {
            let mut jobs = self.jobs.write().await;
            if jobs.contains_key(&job.id) {
                return Err(Error::duplicate_job(&job.id));
            }
            jobs.insert(job.id.clone(), JobEntry {
                job: job.clone(),
                trigger: None,
                next_run_at: None,
                running: false,
                oneshot: None,
            });
        }

        if *self.running.read().await && job.enabled {
            if let Err(e) = self.register_trigger(&job.id).await {
                self.jobs.write().await.remove(&job.id);
                return Err(e);
            }
        }

        if let Err(e) = self.store.save(&job).await {
            warn!(job_id = %job.id, error = %e, "failed to persist job, keeping in-memory copy");
        }
        info!(job_id = %job.id, kind = ?job.kind, schedule = %job.schedule, "job added");
        Ok(job)
    }

    /// Remove a job, cancelling a pending one-shot timer if it has one.
    ///
    /// Errors on an unknown id; a store failure is logged, not propagated.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let entry = self
            .jobs
            .write()
            .await
            .remove(id)
            .ok_or_else(|| Error::job_not_found(id))?;
        if let Some(handle) = entry.oneshot {
            handle.abort();
        }
        if let Err(e) = self.store.delete(id).await {
            warn!(job_id = %id, error = %e, "failed to delete persisted job");
        }
        self.wake.notify_one();
        info!(job_id = %id, "job removed");
        Ok(())
    }

    /// Snapshot of all registered jobs, sorted by id.
    pub async fn list(&self) -> Vec<Job> {
        let jobs = self.jobs.read().await;
        let mut all: Vec<Job> = jobs.values().map(|e| e.job.clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Snapshot of one job.
    pub async fn get(&self, id: &str) -> Option<Job> {
        self.jobs.read().await.get(id).map(|e| e.job.clone())
    }

    // ── Internal ────────────────────────────────────────────────────────

    /// Translate the job's schedule and register its trigger: recurring jobs
    /// get a `next_run_at` for the timer loop, one-shot jobs get their own
    /// timer task.
    async fn register_trigger(self: &Arc<Self>, id: &str) -> Result<()> {
        let (kind, schedule) = {
            let jobs = self.jobs.read().await;
            let entry = jobs.get(id).ok_or_else(|| Error::job_not_found(id))?;
            (entry.job.kind, entry.job.schedule.clone())
        };

        match kind {
            JobType::At => {
                let fire_at = parse_one_shot_time(&schedule, Local::now())?;
                let handle = self.spawn_one_shot(id.to_string(), fire_at).await;
                if let Some(entry) = self.jobs.write().await.get_mut(id) {
                    entry.next_run_at = Some(fire_at);
                    entry.oneshot = Some(handle);
                }
                debug!(job_id = %id, fire_at = %fire_at, "one-shot timer registered");
            }
            kind => {
                let trigger = parse_trigger(kind, &schedule)?;
                let next = next_run(&trigger, Utc::now());
                if let Some(entry) = self.jobs.write().await.get_mut(id) {
                    entry.trigger = Some(trigger);
                    entry.next_run_at = next;
                }
                debug!(job_id = %id, next_run = ?next, "recurring trigger registered");
                self.wake.notify_one();
            }
        }
        Ok(())
    }

    /// Timer task for a one-shot job: wait for the instant (an instant
    /// already past fires immediately), re-validate the job still exists,
    /// execute, then self-remove. Strictly single-fire.
    async fn spawn_one_shot(self: &Arc<Self>, id: String, fire_at: DateTime<Utc>) -> JoinHandle<()> {
        let svc = Arc::clone(self);
        let shutdown = self.shutdown.lock().await.clone();
        tokio::spawn(async move {
            let delay = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                () = shutdown.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            // The job may have been removed while the timer was pending.
            if !svc.jobs.read().await.contains_key(&id) {
                return;
            }
            svc.execute(&id).await;
            // Clear our own handle so remove() doesn't abort a live task.
            if let Some(entry) = svc.jobs.write().await.get_mut(&id) {
                entry.oneshot = None;
            }
            match svc.remove(&id).await {
                Ok(()) => info!(job_id = %id, "one-shot job removed after firing"),
                Err(e) => debug!(job_id = %id, error = %e, "one-shot job already gone"),
            }
        })
    }

    async fn timer_loop(self: &Arc<Self>) {
        loop {
            if !*self.running.read().await {
                break;
            }
            let sleep_for = self.until_next_wake().await;
            tokio::select! {
                () = tokio::time::sleep(sleep_for) => {}
                () = self.wake.notified() => continue,
            }
            if !*self.running.read().await {
                break;
            }
            self.dispatch_due().await;
        }
        debug!("timer loop stopped");
    }

    async fn until_next_wake(&self) -> Duration {
        let jobs = self.jobs.read().await;
        let now = Utc::now();
        jobs.values()
            .filter(|e| e.job.enabled && e.trigger.is_some())
            .filter_map(|e| e.next_run_at)
            .map(|t| (t - now).to_std().unwrap_or(Duration::ZERO))
            .min()
            .unwrap_or(self.config.idle_poll)
    }

    /// Dispatch every recurring job whose next run has arrived.
    ///
    /// The tick is consumed under the write lock whether or not the job can
    /// run: a firing that overlaps a still-running execution is skipped, not
    /// queued, so a long run misses ticks rather than replaying them.
    async fn dispatch_due(self: &Arc<Self>) {
        let now = Utc::now();
        let due: Vec<String> = {
            let mut jobs = self.jobs.write().await;
            let mut due = Vec::new();
            for entry in jobs.values_mut() {
                let ready = entry.job.enabled
                    && entry.trigger.is_some()
                    && entry.next_run_at.is_some_and(|t| t <= now);
                if !ready {
                    continue;
                }
                entry.next_run_at = entry.trigger.as_ref().and_then(|t| next_run(t, now));
                due.push(entry.job.id.clone());
            }
            due
        };

        for id in due {
            let svc = Arc::clone(self);
            tokio::spawn(async move { svc.execute(&id).await });
        }
    }

    /// Run one firing of a job through the safety path.
    ///
    /// Sets the per-job running flag under the registry lock (skipping the
    /// firing if it is already set), records the attempt, invokes the
    /// handler with timeout and panic isolation, records the outcome, and
    /// persists the job unconditionally.
    async fn execute(self: &Arc<Self>, id: &str) {
        {
            let mut jobs = self.jobs.write().await;
            let Some(entry) = jobs.get_mut(id) else {
                return;
            };
            if entry.running {
                warn!(job_id = %id, "previous run still in progress, skipping this firing");
                return;
            }
            entry.running = true;
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let started = Utc::now();

        // Record the attempt before the handler runs.
        let job = {
            let mut jobs = self.jobs.write().await;
            match jobs.get_mut(id) {
                Some(entry) => {
                    entry.job.last_run_at = Some(started);
                    entry.job.run_count += 1;
                    entry.job.clone()
                }
                None => {
                    self.finish_in_flight();
                    return;
                }
            }
        };
        info!(job_id = %id, run = job.run_count, "executing job");

        let cancel = self.shutdown.lock().await.child_token();
        let fut = (self.handler)(job, cancel.clone());
        let mut task = tokio::spawn(fut);
        let outcome: std::result::Result<String, String> =
            match tokio::time::timeout(self.config.job_timeout, &mut task).await {
                Err(_) => {
                    // Cooperative: the abort lands at the handler's next
                    // await point; a handler that never yields runs on.
                    cancel.cancel();
                    task.abort();
                    Err(format!(
                        "timed out after {}s",
                        self.config.job_timeout.as_secs()
                    ))
                }
                Ok(Err(join_err)) if join_err.is_panic() => {
                    let msg = panic_message(join_err.into_panic());
                    error!(job_id = %id, panic = %msg, "job handler panicked");
                    Err(format!("handler panicked: {msg}"))
                }
                Ok(Err(join_err)) => Err(format!("handler task failed: {join_err}")),
                Ok(Ok(Err(e))) => Err(e.to_string()),
                Ok(Ok(Ok(output))) => Ok(output),
            };

        // Record the outcome and release the overlap flag in every path.
        let persisted = {
            let mut jobs = self.jobs.write().await;
            match jobs.get_mut(id) {
                Some(entry) => {
                    entry.running = false;
                    entry.job.last_error = outcome.as_ref().err().cloned();
                    Some(entry.job.clone())
                }
                // Removed while running; nothing left to persist.
                None => None,
            }
        };

        match &outcome {
            Ok(output) => debug!(job_id = %id, output = %output, "job finished"),
            Err(e) => warn!(job_id = %id, error = %e, "job failed"),
        }
        if let Some(job) = persisted {
            if let Err(e) = self.store.save(&job).await {
                warn!(job_id = %id, error = %e, "failed to persist job state");
            }
        }
        self.finish_in_flight();
    }

    fn finish_in_flight(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_memory::MemoryStore;

    fn test_job(id: &str, kind: JobType, schedule: &str) -> Job {
        Job {
            id: id.to_string(),
            schedule: schedule.to_string(),
            kind,
            command: "ping".to_string(),
            channel: "telegram".to_string(),
            chat_id: "42".to_string(),
            enabled: true,
            created_by: String::new(),
            created_at: Utc::now(),
            last_run_at: None,
            last_error: None,
            run_count: 0,
        }
    }

    fn counting_handler(calls: Arc<AtomicUsize>) -> JobHandler {
        Arc::new(move |_job, _cancel| {
            let calls = Arc::clone(&calls);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("done".to_string())
            })
        })
    }

    fn noop_handler() -> JobHandler {
        Arc::new(|_job, _cancel| Box::pin(async { Ok("done".to_string()) }))
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_id_and_keeps_original() {
        let scheduler = Scheduler::new(Arc::new(MemoryStore::new()), noop_handler());
        let mut first = test_job("j1", JobType::Every, "1h");
        first.command = "original".to_string();
        scheduler.add(first).await.unwrap();

        let mut second = test_job("j1", JobType::Every, "5m");
        second.command = "changed".to_string();
        let err = scheduler.add(second).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateJob { .. }));

        let kept = scheduler.get("j1").await.unwrap();
        assert_eq!(kept.command, "original");
        assert_eq!(kept.schedule, "1h");
    }

    #[tokio::test]
    async fn test_add_rejects_empty_id_and_schedule() {
        let scheduler = Scheduler::new(Arc::new(MemoryStore::new()), noop_handler());

        let err = scheduler
            .add(test_job("  ", JobType::Every, "1h"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidJob { .. }));

        let err = scheduler
            .add(test_job("j1", JobType::Cron, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSchedule { .. }));
    }

    #[tokio::test]
    async fn test_add_rejects_unparsable_cron_with_nothing_stored() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::new(Arc::clone(&store) as Arc<dyn JobStore>, noop_handler());
        scheduler.start().await.unwrap();

        let err = scheduler
            .add(test_job("j2", JobType::Cron, "not a cron expression"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSchedule { .. }));
        assert!(scheduler.list().await.is_empty());
        assert!(store.load_all().await.unwrap().is_empty());

        scheduler.stop().await;
    }

    // The recurring-job tests run under real time: due-ness is computed
    // from the wall clock, which tokio's paused test clock does not move.
    #[tokio::test]
    async fn test_interval_job_fires_repeatedly() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(
            Arc::new(MemoryStore::new()),
            counting_handler(Arc::clone(&calls)),
        );
        scheduler.start().await.unwrap();
        scheduler
            .add(test_job("j1", JobType::Every, "@every 1s"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;

        let job = scheduler.get("j1").await.unwrap();
        assert!(
            (3..=4).contains(&job.run_count),
            "expected 3-4 runs, got {}",
            job.run_count
        );
        assert_eq!(job.last_error, None);
        assert!(job.last_run_at.is_some());
        assert_eq!(calls.load(Ordering::SeqCst) as u32, job.run_count);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_overlapping_firing_is_skipped_not_queued() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let handler: JobHandler = {
            let calls = Arc::clone(&calls);
            let gate = Arc::clone(&gate);
            Arc::new(move |_job, _cancel| {
                let calls = Arc::clone(&calls);
                let gate = Arc::clone(&gate);
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    gate.notified().await;
                    Ok("done".to_string())
                })
            })
        };
        let scheduler = Scheduler::new(Arc::new(MemoryStore::new()), handler);
        scheduler.start().await.unwrap();
        scheduler
            .add(test_job("slow", JobType::Every, "@every 1s"))
            .await
            .unwrap();

        // First firing blocks on the gate; the next ticks must be skipped.
        tokio::time::sleep(Duration::from_millis(3200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.get("slow").await.unwrap().run_count, 1);

        // Release the first run; the following tick fires normally.
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.get("slow").await.unwrap().run_count, 2);

        gate.notify_one();
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_panicking_handler_is_recovered_into_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler: JobHandler = {
            let calls = Arc::clone(&calls);
            Arc::new(move |_job, _cancel| {
                let calls = Arc::clone(&calls);
                Box::pin(async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("boom");
                    }
                    Ok("recovered".to_string())
                })
            })
        };
        let scheduler = Scheduler::new(Arc::new(MemoryStore::new()), handler);
        scheduler.start().await.unwrap();
        scheduler
            .add(test_job("flaky", JobType::Every, "@every 1s"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let job = scheduler.get("flaky").await.unwrap();
        assert_eq!(job.run_count, 1);
        let err = job.last_error.unwrap();
        assert!(err.contains("panicked") && err.contains("boom"), "{err}");

        // The scheduler survives the panic and the next run clears the error.
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let job = scheduler.get("flaky").await.unwrap();
        assert_eq!(job.run_count, 2);
        assert_eq!(job.last_error, None);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_handler_timeout_recorded_as_error() {
        let handler: JobHandler = Arc::new(|_job, cancel| {
            Box::pin(async move {
                cancel.cancelled().await;
                Ok("never".to_string())
            })
        });
        let scheduler = Scheduler::with_config(
            Arc::new(MemoryStore::new()),
            handler,
            SchedulerConfig {
                job_timeout: Duration::from_millis(500),
                ..SchedulerConfig::default()
            },
        );
        scheduler.start().await.unwrap();
        scheduler
            .add(test_job("stuck", JobType::Every, "@every 1s"))
            .await
            .unwrap();

        // First firing at ~1s times out at ~1.5s; check before the 2s tick.
        tokio::time::sleep(Duration::from_millis(1800)).await;
        let job = scheduler.get("stuck").await.unwrap();
        assert_eq!(job.run_count, 1);
        assert!(job.last_error.unwrap().contains("timed out"));

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_fires_once_then_self_removes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            counting_handler(Arc::clone(&calls)),
        );
        scheduler.start().await.unwrap();

        let epoch = (Utc::now().timestamp() + 2).to_string();
        scheduler
            .add(test_job("once", JobType::At, &epoch))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(scheduler.get("once").await.is_none());
        assert!(store.load_all().await.unwrap().is_empty());

        // No second firing.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_pending_one_shot_never_fires() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(
            Arc::new(MemoryStore::new()),
            counting_handler(Arc::clone(&calls)),
        );
        scheduler.start().await.unwrap();

        let epoch = (Utc::now().timestamp() + 3600).to_string();
        scheduler
            .add(test_job("later", JobType::At, &epoch))
            .await
            .unwrap();
        scheduler.remove("later").await.unwrap();

        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(scheduler.list().await.is_empty());

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_start_reloads_persisted_jobs() {
        let store = Arc::new(MemoryStore::new());
        store
            .save(&test_job("good", JobType::Every, "@every 1s"))
            .await
            .unwrap();
        store
            .save(&test_job("broken", JobType::Cron, "garbage"))
            .await
            .unwrap();
        let mut disabled = test_job("off", JobType::Every, "@every 1s");
        disabled.enabled = false;
        store.save(&disabled).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            counting_handler(Arc::clone(&calls)),
        );
        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(scheduler.list().await.len(), 3);
        assert!(scheduler.get("good").await.unwrap().run_count >= 2);
        // The unparsable job stays listed but never fires.
        assert_eq!(scheduler.get("broken").await.unwrap().run_count, 0);
        assert_eq!(scheduler.get("off").await.unwrap().run_count, 0);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_remove_unknown_job_errors() {
        let scheduler = Scheduler::new(Arc::new(MemoryStore::new()), noop_handler());
        let err = scheduler.remove("ghost").await.unwrap_err();
        assert!(matches!(err, Error::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn test_store_failure_does_not_roll_back_add() {
        struct FailingStore;

        #[async_trait::async_trait]
        impl JobStore for FailingStore {
            async fn save(&self, _job: &Job) -> Result<()> {
                Err(Error::Io(std::io::Error::other("disk full")))
            }

            async fn delete(&self, _id: &str) -> Result<()> {
                Ok(())
            }

            async fn load_all(&self) -> Result<Vec<Job>> {
                Ok(Vec::new())
            }
        }

        let scheduler = Scheduler::new(Arc::new(FailingStore), noop_handler());
        scheduler
            .add(test_job("j1", JobType::Every, "1h"))
            .await
            .unwrap();
        assert!(scheduler.get("j1").await.is_some());
    }

    #[tokio::test]
    async fn test_stop_then_restart_cycle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            counting_handler(Arc::clone(&calls)),
        );

        scheduler.start().await.unwrap();
        scheduler
            .add(test_job("j1", JobType::Every, "@every 1s"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        scheduler.stop().await;
        let after_stop = calls.load(Ordering::SeqCst);
        assert!(after_stop >= 1);

        // Nothing fires while stopped.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);

        // Restart reloads from the store and resumes firing.
        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(calls.load(Ordering::SeqCst) > after_stop);
        scheduler.stop().await;
    }
}
