//! Recurring action runs.
//!
//! Each schedule entry owns one timer task. On every tick the task tries to
//! claim the job's busy flag; if the previous invocation is still running the
//! tick is dropped, never queued. The busy flag is keyed by job id and
//! outlives the timer, so replacing a schedule cannot start a second copy of
//! a run that is still in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use opsctl_core::config::ScheduleConfig;
use opsctl_core::error::{OpsError, Result};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::engine::{Engine, RunOptions};

/// Longest accepted interval: one leap year.
pub const MAX_INTERVAL_MINUTES: u64 = 366 * 24 * 60;

/// Job id for the schedule of `action_id`. One job per action.
pub fn job_id_for(action_id: &str) -> String {
    format!("run-{action_id}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleInfo {
    pub job_id: String,
    pub action_id: String,
    pub interval_minutes: u64,
    pub next_run_time: DateTime<Utc>,
}

struct Job {
    action_id: String,
    interval_minutes: u64,
    next_run: Arc<Mutex<DateTime<Utc>>>,
    task: JoinHandle<()>,
}

impl Job {
    fn info(&self, job_id: &str) -> ScheduleInfo {
        ScheduleInfo {
            job_id: job_id.to_string(),
            action_id: self.action_id.clone(),
            interval_minutes: self.interval_minutes,
            next_run_time: *lock(&self.next_run),
        }
    }
}

pub struct Scheduler {
    engine: Arc<Engine>,
    jobs: Mutex<HashMap<String, Job>>,
    busy: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            jobs: Mutex::new(HashMap::new()),
            busy: Mutex::new(HashMap::new()),
        }
    }

    /// Run `action_id` every `interval_minutes`, replacing any existing
    /// schedule for it. The first run happens one interval from now.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self, action_id: &str, interval_minutes: u64) -> Result<ScheduleInfo> {
        let period = Duration::from_secs(interval_minutes.min(MAX_INTERVAL_MINUTES) * 60);
        self.schedule_with_period(action_id, interval_minutes, period)
    }

    /// Like [`schedule`](Self::schedule) with an explicit tick period.
    /// `interval_minutes` is what gets reported back in listings.
    pub fn schedule_with_period(
        &self,
        action_id: &str,
        interval_minutes: u64,
        period: Duration,
    ) -> Result<ScheduleInfo> {
        if !self.engine.registry().contains(action_id) {
            return Err(OpsError::UnknownAction(action_id.to_string()));
        }
        if interval_minutes == 0 || interval_minutes > MAX_INTERVAL_MINUTES || period.is_zero() {
            return Err(OpsError::InvalidInterval(interval_minutes));
        }

        let job_id = job_id_for(action_id);
        let next_run = Arc::new(Mutex::new(after(period)));
        let busy = self.busy_flag(&job_id);

        let mut jobs = lock(&self.jobs);
        let task = tokio::spawn(tick_loop(
            self.engine.clone(),
            action_id.to_string(),
            job_id.clone(),
            period,
            busy,
            next_run.clone(),
        ));
        let job = Job {
            action_id: action_id.to_string(),
            interval_minutes,
            next_run,
            task,
        };
        let info = job.info(&job_id);
        if let Some(old) = jobs.insert(job_id.clone(), job) {
            old.task.abort();
            info!(job_id = %job_id, interval_minutes, "schedule replaced");
        } else {
            info!(job_id = %job_id, interval_minutes, "schedule added");
        }
        Ok(info)
    }

    /// Remove the schedule for `action_id`, returning its job id.
    ///
    /// A run already in flight is left to finish.
    pub fn unschedule(&self, action_id: &str) -> Result<String> {
        let job_id = job_id_for(action_id);
        match lock(&self.jobs).remove(&job_id) {
            Some(job) => {
                job.task.abort();
                info!(job_id = %job_id, "schedule removed");
                Ok(job_id)
            }
            None => Err(OpsError::NoActiveSchedule(action_id.to_string())),
        }
    }

    /// All active schedules, ordered by job id.
    pub fn list(&self) -> Vec<ScheduleInfo> {
        let jobs = lock(&self.jobs);
        let mut out: Vec<ScheduleInfo> = jobs.iter().map(|(id, job)| job.info(id)).collect();
        out.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        out
    }

    pub fn get(&self, action_id: &str) -> Option<ScheduleInfo> {
        let job_id = job_id_for(action_id);
        lock(&self.jobs).get(&job_id).map(|job| job.info(&job_id))
    }

    /// Whether a run for `action_id`'s job is executing right now.
    pub fn is_running(&self, action_id: &str) -> bool {
        lock(&self.busy)
            .get(&job_id_for(action_id))
            .is_some_and(|b| b.load(Ordering::Acquire))
    }

    /// Install the startup heartbeat, if one is configured.
    pub fn install_default(&self, heartbeat: Option<&ScheduleConfig>) -> Result<Option<ScheduleInfo>> {
        let Some(hb) = heartbeat else {
            return Ok(None);
        };
        self.schedule(&hb.action, hb.interval_minutes).map(Some)
    }

    /// Stop every timer. In-flight runs are left to finish.
    pub fn shutdown(&self) {
        for (job_id, job) in lock(&self.jobs).drain() {
            job.task.abort();
            debug!(job_id = %job_id, "schedule stopped");
        }
    }

    fn busy_flag(&self, job_id: &str) -> Arc<AtomicBool> {
        lock(&self.busy)
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Clears a job's busy flag when the run finishes, however it finishes.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn tick_loop(
    engine: Arc<Engine>,
    action_id: String,
    job_id: String,
    period: Duration,
    busy: Arc<AtomicBool>,
    next_run: Arc<Mutex<DateTime<Utc>>>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        *lock(&next_run) = after(period);

        if busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(job_id = %job_id, "previous run still in flight; skipping tick");
            continue;
        }

        let guard = BusyGuard(busy.clone());
        let engine = engine.clone();
        let action_id = action_id.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move {
            let _guard = guard;
            match engine.execute_with(&action_id, RunOptions::scheduled()).await {
                Ok(rec) => debug!(
                    job_id = %job_id,
                    run_id = %rec.id,
                    status = %rec.status,
                    "scheduled run finished"
                ),
                Err(e) => warn!(job_id = %job_id, error = %e, "scheduled run rejected"),
            }
        });
    }
}

fn after(period: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(period)
        .ok()
        .and_then(|d| Utc::now().checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// Job state stays valid across a panicking holder, so poisoning is ignored.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineSettings;
    use crate::metrics::Metrics;
    use crate::runner::{CommandSpec, ProcessRunner};
    use async_trait::async_trait;
    use opsctl_core::config::Config;
    use opsctl_core::ledger::RunLedger;
    use opsctl_core::registry::ActionRegistry;
    use opsctl_core::run::{RunOutcome, RunStatus};
    use std::sync::atomic::AtomicUsize;

    /// Sleeps for `delay` and tracks how many runs overlap.
    struct SlowRunner {
        delay: Duration,
        active: AtomicUsize,
        max_active: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SlowRunner {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ProcessRunner for SlowRunner {
        async fn run(&self, _spec: &CommandSpec, _timeout: Duration) -> RunOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            RunOutcome::Exited {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            }
        }
    }

    fn scheduler(runner: Arc<dyn ProcessRunner>) -> (Scheduler, Arc<Engine>) {
        let config = Config::default();
        let engine = Arc::new(Engine::new(
            Arc::new(ActionRegistry::from_config(&config).unwrap()),
            Arc::new(RunLedger::default()),
            Arc::new(Metrics::new()),
            runner,
            EngineSettings::from_config(std::path::Path::new("/srv/ops"), &config),
        ));
        (Scheduler::new(engine.clone()), engine)
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_previous_entry() {
        let (sched, _) = scheduler(SlowRunner::new(Duration::ZERO));

        sched.schedule("ping", 5).unwrap();
        sched.schedule("ping", 10).unwrap();

        let list = sched.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].job_id, "run-ping");
        assert_eq!(list[0].action_id, "ping");
        assert_eq!(list[0].interval_minutes, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_action_is_rejected() {
        let (sched, engine) = scheduler(SlowRunner::new(Duration::ZERO));
        let err = sched.schedule("launch-missiles", 5).unwrap_err();
        assert!(matches!(err, OpsError::UnknownAction(_)));
        assert!(sched.list().is_empty());
        assert!(engine.ledger().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_rejected() {
        let (sched, _) = scheduler(SlowRunner::new(Duration::ZERO));
        assert!(matches!(
            sched.schedule("ping", 0),
            Err(OpsError::InvalidInterval(0))
        ));
        assert!(matches!(
            sched.schedule("ping", MAX_INTERVAL_MINUTES + 1),
            Err(OpsError::InvalidInterval(_))
        ));
        assert!(sched.list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unschedule_without_schedule_is_error() {
        let (sched, engine) = scheduler(SlowRunner::new(Duration::ZERO));
        assert!(matches!(
            sched.unschedule("ping"),
            Err(OpsError::NoActiveSchedule(_))
        ));
        assert!(engine.ledger().is_empty());
        assert!(engine.registry().contains("ping"));
    }

    #[tokio::test(start_paused = true)]
    async fn unschedule_removes_entry() {
        let (sched, _) = scheduler(SlowRunner::new(Duration::ZERO));
        sched.schedule("ping", 5).unwrap();
        assert_eq!(sched.unschedule("ping").unwrap(), "run-ping");
        assert!(sched.list().is_empty());
        assert!(sched.get("ping").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_runs_are_flagged_and_recorded() {
        let runner = SlowRunner::new(Duration::from_millis(10));
        let (sched, engine) = scheduler(runner.clone());
        sched
            .schedule_with_period("ping", 1, Duration::from_millis(100))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;

        let runs = engine.ledger().list();
        assert!(runs.len() >= 2, "expected several runs, got {}", runs.len());
        assert!(runs.iter().all(|r| r.scheduled && r.action_id == "ping"));
        assert!(runs.iter().all(|r| r.status == RunStatus::Success));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_job_never_overlaps_itself() {
        // Each run takes 2.5 ticks.
        let runner = SlowRunner::new(Duration::from_millis(250));
        let (sched, engine) = scheduler(runner.clone());
        sched
            .schedule_with_period("ping", 1, Duration::from_millis(100))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(runner.max_active.load(Ordering::SeqCst), 1);
        let calls = runner.calls.load(Ordering::SeqCst);
        assert!(calls >= 2, "expected repeated runs, got {calls}");
        // 20 ticks elapsed; most must have been skipped.
        assert!(calls < 10, "ticks were queued instead of skipped: {calls}");
        assert!(engine.metrics().in_progress() <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_schedule_does_not_overlap_in_flight_run() {
        let runner = SlowRunner::new(Duration::from_millis(500));
        let (sched, _) = scheduler(runner.clone());
        sched
            .schedule_with_period("ping", 1, Duration::from_millis(100))
            .unwrap();

        // First run starts at 100ms and is still going at 150ms.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(sched.is_running("ping"));
        sched
            .schedule_with_period("ping", 1, Duration::from_millis(100))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(runner.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn install_default_schedules_heartbeat() {
        let (sched, _) = scheduler(SlowRunner::new(Duration::ZERO));
        let info = sched
            .install_default(Config::default().default_schedule.as_ref())
            .unwrap()
            .unwrap();
        assert_eq!(info.job_id, "run-ping");
        assert_eq!(info.interval_minutes, 5);
        assert!(info.next_run_time > Utc::now());

        assert!(sched.install_default(None).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_clears_all_jobs() {
        let (sched, _) = scheduler(SlowRunner::new(Duration::ZERO));
        sched.schedule("ping", 5).unwrap();
        sched.schedule("submit-job", 60).unwrap();
        assert_eq!(sched.list().len(), 2);
        sched.shutdown();
        assert!(sched.list().is_empty());
    }
}
