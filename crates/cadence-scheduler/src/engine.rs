use std::collections::{BTreeMap, HashMap};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use std::time::{Duration, Instant};

use cadence_core::config::SchedulerConfig;
use chrono::{DateTime, FixedOffset, Local, Utc};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::{
    clock::{Clock, SystemClock},
    error::{Result, SchedulerError},
    handler::TaskHandler,
    schedule::{compute_next_run, parse_interval},
    types::{Job, Registration, TaskInvocation, TaskSummary, Trigger},
};

/// Recurring task scheduler: an in-memory job table plus one background loop.
///
/// The table may be read and modified from any task while the loop runs.
/// Handlers fire one at a time, in `(next_run, task_id)` order, on the loop's
/// own worker; the table lock is never held while a handler runs.
pub struct Scheduler {
    shared: Arc<Shared>,
    worker: tokio::sync::Mutex<Option<Worker>>,
    running: AtomicBool,
}

/// Handle to the spawned tick loop.
struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// State shared between the control surface and the tick loop.
struct Shared {
    jobs: Mutex<HashMap<String, Job>>,
    clock: Arc<dyn Clock>,
    wall_clock: WallClock,
    tick_interval: Duration,
    task_timeout: Duration,
    generation: AtomicU64,
}

impl Scheduler {
    /// Create a stopped scheduler driven by the wall clock.
    pub fn new(config: &SchedulerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a stopped scheduler driven by `clock`.
    pub fn with_clock(config: &SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        let wall_clock = resolve_wall_clock(config.utc_offset_minutes);
        Self {
            shared: Arc::new(Shared {
                jobs: Mutex::new(HashMap::new()),
                clock,
                wall_clock,
                tick_interval: Duration::from_millis(config.tick_interval_ms.max(1)),
                task_timeout: Duration::from_secs(config.task_timeout_secs),
                generation: AtomicU64::new(0),
            }),
            worker: tokio::sync::Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Spawn the tick loop. No-op if it is already running.
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            debug!("scheduler already running");
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(Arc::clone(&self.shared), shutdown_rx));
        *worker = Some(Worker { shutdown, handle });
        self.running.store(true, Ordering::SeqCst);
        info!(
            tick_ms = self.shared.tick_interval.as_millis() as u64,
            "task scheduler started"
        );
    }

    /// Signal the loop to exit and wait for it. No task fires after this returns.
    /// An in-flight handler is allowed to finish. No-op if already stopped.
    pub async fn stop(&self) {
        let mut worker = self.worker.lock().await;
        let Some(Worker { shutdown, handle }) = worker.take() else {
            return;
        };

        let _ = shutdown.send(true);
        // Cleared before the join so a dropped stop() never leaves it set.
        self.running.store(false, Ordering::SeqCst);
        if let Err(e) = handle.await {
            error!("scheduler loop ended abnormally: {e}");
        }
        info!("task scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register `task_id`, replacing any existing task with the same id.
    ///
    /// Returns `false` (and logs the reason) when the id is empty or the
    /// interval spec does not parse.
    pub fn add_task(
        &self,
        task_id: &str,
        handler: Arc<dyn TaskHandler>,
        interval: &str,
        task_type: &str,
        parameters: Map<String, Value>,
    ) -> bool {
        match self.try_add_task(task_id, handler, interval, task_type, parameters) {
            Ok(_) => true,
            Err(e) => {
                error!(%task_id, code = e.code(), "error adding task: {e}");
                false
            }
        }
    }

    /// Typed form of [`Scheduler::add_task`].
    pub fn try_add_task(
        &self,
        task_id: &str,
        handler: Arc<dyn TaskHandler>,
        interval: &str,
        task_type: &str,
        parameters: Map<String, Value>,
    ) -> Result<Registration> {
        if task_id.is_empty() {
            return Err(SchedulerError::EmptyTaskId);
        }
        let trigger = parse_interval(interval)?;

        let now = self.shared.clock.now();
        let next_run = self.shared.wall_clock.next_run(&trigger, now);
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let description = trigger.to_string();

        let job = Job {
            task_id: task_id.to_string(),
            trigger,
            handler,
            task_type: task_type.to_string(),
            parameters,
            next_run,
            last_run: None,
            run_count: 0,
            failure_count: 0,
            created_at: now,
            generation,
        };

        let previous = self.shared.lock_jobs().insert(task_id.to_string(), job);
        let registration = match previous {
            Some(_) => Registration::Replaced,
            None => Registration::Inserted,
        };

        info!(
            %task_id,
            %task_type,
            trigger = %description,
            next_run = %next_run.to_rfc3339(),
            replaced = previous.is_some(),
            "task added"
        );
        Ok(registration)
    }

    /// Remove `task_id`. Returns `false` if no such task exists.
    pub fn remove_task(&self, task_id: &str) -> bool {
        match self.try_remove_task(task_id) {
            Ok(()) => true,
            Err(e) => {
                debug!(%task_id, "remove skipped: {e}");
                false
            }
        }
    }

    /// Typed form of [`Scheduler::remove_task`].
    pub fn try_remove_task(&self, task_id: &str) -> Result<()> {
        if self.shared.lock_jobs().remove(task_id).is_none() {
            return Err(SchedulerError::TaskNotFound {
                id: task_id.to_string(),
            });
        }
        info!(%task_id, "task removed");
        Ok(())
    }

    /// `task_id → trigger description`, e.g. `"every 5 minutes"` or `"daily at 14:30"`.
    pub fn get_tasks(&self) -> BTreeMap<String, String> {
        self.shared
            .lock_jobs()
            .iter()
            .map(|(id, job)| (id.clone(), job.trigger.to_string()))
            .collect()
    }

    /// Detailed view of every task, sorted by id.
    pub fn snapshot(&self) -> Vec<TaskSummary> {
        let mut tasks: Vec<TaskSummary> =
            self.shared.lock_jobs().values().map(Job::summary).collect();
        tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        tasks
    }

    pub fn task_count(&self) -> usize {
        self.shared.lock_jobs().len()
    }

    /// Run one tick by hand: fire every task that is due at the clock's current time.
    /// Returns the number of handlers invoked.
    pub async fn run_pending(&self) -> usize {
        self.shared.run_pending(None).await
    }
}

/// Zone that daily `HH:MM` triggers are read in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WallClock {
    /// Configured `utc_offset_minutes`.
    Fixed(FixedOffset),
    /// Host time zone, looked up on every computation so DST changes apply.
    Local,
}

impl WallClock {
    fn next_run(&self, trigger: &Trigger, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            WallClock::Fixed(offset) => compute_next_run(trigger, from, offset),
            WallClock::Local => compute_next_run(trigger, from, &Local),
        }
    }
}

fn resolve_wall_clock(minutes: Option<i32>) -> WallClock {
    let Some(m) = minutes else {
        return WallClock::Local;
    };
    match FixedOffset::east_opt(m.saturating_mul(60)) {
        Some(offset) => WallClock::Fixed(offset),
        None => {
            warn!(utc_offset_minutes = m, "utc offset out of range, using local time zone");
            WallClock::Local
        }
    }
}

impl Shared {
    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<String, Job>> {
        // A handler never runs under this lock, so a poisoned table is still consistent.
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fire every due task once. Stops early if `shutdown` is raised between fires.
    async fn run_pending(&self, shutdown: Option<&watch::Receiver<bool>>) -> usize {
        let now = self.clock.now();
        let mut fired = 0;

        for (task_id, generation) in self.due_tasks(now) {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                debug!("shutdown requested, leaving remaining due tasks");
                break;
            }
            let Some((handler, invocation)) = self.claim(&task_id, generation) else {
                // removed or replaced while an earlier handler ran
                continue;
            };

            fired += 1;
            let outcome = self.invoke(handler, invocation).await;
            self.finish(&task_id, generation, outcome);
        }

        fired
    }

    /// Ids (with generation) of every task due at `now`, in fire order.
    fn due_tasks(&self, now: DateTime<Utc>) -> Vec<(String, u64)> {
        let jobs = self.lock_jobs();
        let mut due: Vec<(DateTime<Utc>, String, u64)> = jobs
            .values()
            .filter(|job| job.next_run <= now)
            .map(|job| (job.next_run, job.task_id.clone(), job.generation))
            .collect();
        due.sort();
        due.into_iter().map(|(_, id, generation)| (id, generation)).collect()
    }

    /// Re-check a due task under the lock and advance its `next_run` before it fires,
    /// so a concurrent tick can never fire it twice. The clock is read per task
    /// since earlier handlers in the tick take time.
    fn claim(
        &self,
        task_id: &str,
        generation: u64,
    ) -> Option<(Arc<dyn TaskHandler>, TaskInvocation)> {
        let now = self.clock.now();
        let mut jobs = self.lock_jobs();
        let job = jobs
            .get_mut(task_id)
            .filter(|job| job.generation == generation && job.next_run <= now)?;

        job.next_run = self.wall_clock.next_run(&job.trigger, now);
        job.last_run = Some(now);
        debug!(%task_id, next_run = %job.next_run.to_rfc3339(), "firing task");
        Some((Arc::clone(&job.handler), job.invocation(now)))
    }

    /// Run a handler on the blocking pool. Errors and panics both come back as
    /// `CallbackFailure`; neither escapes the loop.
    async fn invoke(
        &self,
        handler: Arc<dyn TaskHandler>,
        invocation: TaskInvocation,
    ) -> Result<()> {
        let task_id = invocation.task_id.clone();
        let started = Instant::now();
        let joined = tokio::task::spawn_blocking(move || handler.run(&invocation)).await;

        let elapsed = started.elapsed();
        if elapsed > self.task_timeout {
            warn!(
                %task_id,
                elapsed_ms = elapsed.as_millis() as u64,
                limit_secs = self.task_timeout.as_secs(),
                "task handler overran its time budget"
            );
        }

        let reason = match joined {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(e) if e.is_panic() => format!("panicked: {}", panic_message(e.into_panic())),
            Err(e) => e.to_string(),
        };
        Err(SchedulerError::CallbackFailure {
            id: task_id,
            reason,
        })
    }

    /// Record the outcome against the task, unless it was removed or replaced meanwhile.
    /// A handler that outlived its period pushes `next_run` past the time it returned.
    fn finish(&self, task_id: &str, generation: u64, outcome: Result<()>) {
        if let Err(e) = &outcome {
            warn!(%task_id, code = e.code(), "{e}");
        }

        let mut jobs = self.lock_jobs();
        let Some(job) = jobs
            .get_mut(task_id)
            .filter(|job| job.generation == generation)
        else {
            return;
        };
        job.run_count += 1;
        if outcome.is_err() {
            job.failure_count += 1;
        }

        let earliest = self.wall_clock.next_run(&job.trigger, self.clock.now());
        if earliest > job.next_run {
            debug!(%task_id, next_run = %earliest.to_rfc3339(), "handler overran, rescheduling");
            job.next_run = earliest;
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Tick loop. Polls at the configured interval until `shutdown` is raised or
/// its sender is dropped.
async fn run_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    info!("scheduler loop started");

    let mut interval = tokio::time::interval(shared.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let fired = shared.run_pending(Some(&shutdown)).await;
        if fired > 0 {
            debug!(fired, "tick complete");
        }
    }

    info!("scheduler loop shutting down");
}
