//! Scheduler module for running one watcher per target.

mod signal;
mod watcher;

pub use signal::*;
pub use watcher::*;

use crate::probe::{HttpProber, ProbeError, PROBE_TIMEOUT};
use crate::store::{InvalidConfig, Snapshot, Store, Target, TargetSpec};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Scheduler error types.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    InvalidConfig(#[from] InvalidConfig),
    #[error("monitoring is already running")]
    AlreadyRunning,
    #[error("monitoring is not running")]
    NotRunning,
    #[error("target {0} is already being watched")]
    AlreadyWatching(String),
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Running,
}

/// Public view of the run state.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub phase: RunPhase,
    pub run_id: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub watching: Vec<String>,
}

struct WatcherHandle {
    token: u64,
    stop: StopHandle,
    task: JoinHandle<()>,
}

/// Lifecycle of the current run and the watchers it owns.
struct RunState {
    phase: RunPhase,
    run_id: u64,
    started_at: Option<DateTime<Utc>>,
    stop: StopHandle,
    watchers: HashMap<String, WatcherHandle>,
    /// Tasks already signalled to stop that may still be finishing a probe.
    retired: Vec<JoinHandle<()>>,
    next_token: u64,
}

impl RunState {
    fn new() -> Self {
        let stop = StopHandle::new();
        stop.trigger();
        Self {
            phase: RunPhase::Idle,
            run_id: 0,
            started_at: None,
            stop,
            watchers: HashMap::new(),
            retired: Vec::new(),
            next_token: 0,
        }
    }

    fn prune_retired(&mut self) {
        self.retired.retain(|task| !task.is_finished());
    }

    fn finish(&mut self) {
        self.stop.trigger();
        self.phase = RunPhase::Idle;
        self.prune_retired();
        self.retired
            .extend(self.watchers.drain().map(|(_, watcher)| watcher.task));
    }
}

/// Owns every watcher and the shared cancellation signal of the current run.
///
/// `start`, `stop`, `add_target` and `remove_target` must be called from
/// within a tokio runtime.
pub struct Scheduler {
    store: Arc<Store>,
    prober: HttpProber,
    state: Arc<Mutex<RunState>>,
}

impl Scheduler {
    /// Create a new scheduler writing into `store`.
    pub fn new(store: Arc<Store>) -> Result<Self, SchedulerError> {
        Ok(Self {
            store,
            prober: HttpProber::new(PROBE_TIMEOUT)?,
            state: Arc::new(Mutex::new(RunState::new())),
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// Start a run with one watcher per target. Returns the run id.
    ///
    /// Targets are validated before anything is spawned. Each target's
    /// history is cleared so the run starts from sequence 1.
    pub fn start(&self, specs: Vec<TargetSpec>) -> Result<u64, SchedulerError> {
        let targets = Target::from_specs(specs)?;

        let mut state = self.state.lock();
        if state.phase == RunPhase::Running {
            return Err(SchedulerError::AlreadyRunning);
        }

        state.run_id += 1;
        state.stop = StopHandle::new();
        state.phase = RunPhase::Running;
        state.started_at = Some(Utc::now());

        tracing::info!(
            "Scheduler: starting run {} with {} targets",
            state.run_id,
            targets.len()
        );

        for target in targets {
            self.store.reset(&target);
            self.spawn_watcher(&mut state, target);
        }

        Ok(state.run_id)
    }

    /// Signal every watcher of the current run to stop.
    ///
    /// Returns without waiting for watchers to exit; a probe already in
    /// flight finishes on its own timeout and its result is dropped.
    /// Returns whether a run was active.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        if state.phase == RunPhase::Idle {
            return false;
        }

        tracing::info!("Scheduler: stopping run {}", state.run_id);
        state.finish();
        true
    }

    /// Stop and wait up to `grace` for watchers to exit.
    pub async fn shutdown(&self, grace: Duration) {
        self.stop();

        let tasks = std::mem::take(&mut self.state.lock().retired);
        let deadline = tokio::time::Instant::now() + grace;
        for task in tasks {
            if tokio::time::timeout_at(deadline, task).await.is_err() {
                tracing::warn!("Scheduler: watchers still running after {:?}", grace);
                break;
            }
        }
    }

    /// Add a watcher to the running run.
    pub fn add_target(&self, spec: TargetSpec) -> Result<(), SchedulerError> {
        let target = Target::from_spec(spec)?;

        let mut state = self.state.lock();
        if state.phase == RunPhase::Idle {
            return Err(SchedulerError::NotRunning);
        }
        if state.watchers.contains_key(&target.id) {
            return Err(SchedulerError::AlreadyWatching(target.id));
        }

        tracing::info!("Scheduler: adding target {}", target.id);
        self.store.reset(&target);
        self.spawn_watcher(&mut state, target);
        Ok(())
    }

    /// Stop a single watcher. Its history stays in the store.
    pub fn remove_target(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        let Some(watcher) = state.watchers.remove(id) else {
            return false;
        };

        watcher.stop.trigger();
        state.prune_retired();
        state.retired.push(watcher.task);
        tracing::info!("Scheduler: removed target {}", id);
        true
    }

    pub fn status(&self) -> RunStatus {
        let state = self.state.lock();
        let mut watching: Vec<String> = state.watchers.keys().cloned().collect();
        watching.sort();

        RunStatus {
            phase: state.phase,
            run_id: state.run_id,
            started_at: state.started_at,
            watching,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().phase == RunPhase::Running
    }

    fn spawn_watcher(&self, state: &mut RunState, target: Target) {
        let target = Arc::new(target);
        let own = StopHandle::new();
        let signal = StopSignal::new(&state.stop, &own);

        state.next_token += 1;
        let token = state.next_token;
        let run_id = state.run_id;

        let shared = self.state.clone();
        let store = self.store.clone();
        let prober = self.prober.clone();
        let watched = target.clone();

        let task = tokio::spawn(async move {
            let exit = run_watch_loop(watched.clone(), prober, store, signal).await;
            tracing::info!("Scheduler: watcher for {} exited ({:?})", watched.id, exit);
            finish_watcher(&shared, &watched.id, token, run_id);
        });

        state.watchers.insert(target.id.clone(), WatcherHandle { token, stop: own, task });
    }
}

/// Drop a finished watcher's handle and end the run once none remain.
fn finish_watcher(state: &Mutex<RunState>, id: &str, token: u64, run_id: u64) {
    let mut state = state.lock();

    if state.watchers.get(id).is_some_and(|w| w.token == token) {
        state.watchers.remove(id);
    }
    state.prune_retired();

    if state.run_id == run_id && state.phase == RunPhase::Running && state.watchers.is_empty() {
        tracing::info!("Scheduler: run {} finished, no watchers left", run_id);
        state.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::test_support::spawn_test_server;
    use tokio_test::{assert_err, assert_ok};

    const DEAD: &str = "http://127.0.0.1:1";

    fn spec(id: &str, url: &str, interval: f64, duration: Option<f64>) -> TargetSpec {
        TargetSpec {
            id: Some(id.to_string()),
            url: url.to_string(),
            interval_secs: interval,
            duration_secs: duration,
        }
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(Arc::new(Store::new())).unwrap()
    }

    async fn sleep_secs(secs: f64) {
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_start_rejects_empty_targets() {
        let scheduler = scheduler();
        let err = assert_err!(scheduler.start(Vec::new()));
        assert!(matches!(err, SchedulerError::InvalidConfig(_)));

        let status = scheduler.status();
        assert_eq!(status.phase, RunPhase::Idle);
        assert!(status.watching.is_empty());
        assert!(scheduler.store().target_ids().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_start_rejects_bad_interval() {
        let scheduler = scheduler();
        let err = assert_err!(scheduler.start(vec![
            spec("a", DEAD, 1.0, None),
            spec("b", DEAD, 0.0, None),
        ]));
        assert!(matches!(err, SchedulerError::InvalidConfig(_)));
        assert!(!scheduler.is_running());
        assert!(scheduler.store().target_ids().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_start_twice_is_rejected() {
        let scheduler = scheduler();
        let run_id = assert_ok!(scheduler.start(vec![spec("a", DEAD, 0.5, None)]));
        assert_eq!(run_id, 1);

        let err = assert_err!(scheduler.start(vec![spec("a", DEAD, 0.5, None)]));
        assert!(matches!(err, SchedulerError::AlreadyRunning));
        assert_eq!(scheduler.status().watching, vec!["a".to_string()]);

        assert!(scheduler.stop());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sample_count_follows_interval() {
        let scheduler = scheduler();
        assert_ok!(scheduler.start(vec![spec("a", DEAD, 0.2, None)]));
        sleep_secs(1.0).await;
        scheduler.stop();

        // floor(1.0 / 0.2) = 5, plus or minus one tick
        let count = scheduler.store().history("a").unwrap().len();
        assert!((4..=6).contains(&count), "got {} samples", count);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sequences_have_no_gaps_across_targets() {
        let scheduler = scheduler();
        let specs = (0..5)
            .map(|i| spec(&format!("t{}", i), DEAD, 0.05, None))
            .collect();
        assert_ok!(scheduler.start(specs));
        sleep_secs(0.6).await;
        scheduler.stop();

        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.targets.len(), 5);
        for history in snapshot.targets.values() {
            assert!(history.len() >= 5);
            for (i, sample) in history.samples.iter().enumerate() {
                assert_eq!(sample.sequence, i as u64 + 1);
                assert_eq!(sample.status_name, "Request Failed");
            }
            let elapsed: Vec<f64> = history.samples.iter().map(|s| s.elapsed_secs).collect();
            assert!(elapsed.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stop_freezes_histories() {
        let scheduler = scheduler();
        assert_ok!(scheduler.start(vec![
            spec("a", DEAD, 0.05, None),
            spec("b", DEAD, 0.05, None),
        ]));
        sleep_secs(0.3).await;

        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert_eq!(scheduler.status().phase, RunPhase::Idle);

        sleep_secs(0.2).await;
        let first = scheduler.snapshot();
        sleep_secs(0.3).await;
        let second = scheduler.snapshot();

        for (id, history) in &first.targets {
            assert!(!history.is_empty());
            assert_eq!(history.samples, second.get(id).unwrap().samples);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_duration_caps_are_independent() {
        let scheduler = scheduler();
        assert_ok!(scheduler.start(vec![
            spec("short", DEAD, 0.1, Some(0.3)),
            spec("long", DEAD, 0.1, Some(1.2)),
        ]));

        sleep_secs(0.7).await;
        let status = scheduler.status();
        assert_eq!(status.phase, RunPhase::Running);
        assert_eq!(status.watching, vec!["long".to_string()]);

        let short = scheduler.store().history("short").unwrap();
        assert!(short.elapsed_secs <= 0.3 + 0.1 + 0.05);
        let frozen = short.len();

        sleep_secs(1.3).await;
        assert_eq!(scheduler.status().phase, RunPhase::Idle);
        assert_eq!(scheduler.store().history("short").unwrap().len(), frozen);

        let long = scheduler.store().history("long").unwrap();
        assert!(long.len() > frozen);
        assert!(long.elapsed_secs <= 1.2 + 0.1 + 0.05);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_restart_clears_history() {
        let scheduler = scheduler();
        assert_ok!(scheduler.start(vec![spec("a", DEAD, 0.05, None)]));
        sleep_secs(0.4).await;
        scheduler.stop();
        sleep_secs(0.1).await;
        let first_len = scheduler.store().history("a").unwrap().len();
        assert!(first_len > 2);

        let run_id = assert_ok!(scheduler.start(vec![spec("a", DEAD, 10.0, None)]));
        assert_eq!(run_id, 2);
        sleep_secs(0.2).await;

        let history = scheduler.store().history("a").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.samples[0].sequence, 1);
        scheduler.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_add_and_remove_single_targets() {
        let scheduler = scheduler();
        let err = assert_err!(scheduler.add_target(spec("x", DEAD, 0.1, None)));
        assert!(matches!(err, SchedulerError::NotRunning));

        assert_ok!(scheduler.start(vec![spec("a", DEAD, 0.05, None)]));
        assert_ok!(scheduler.add_target(spec("b", DEAD, 0.05, None)));
        let err = assert_err!(scheduler.add_target(spec("b", DEAD, 0.05, None)));
        assert!(matches!(err, SchedulerError::AlreadyWatching(_)));

        sleep_secs(0.3).await;
        assert!(scheduler.remove_target("b"));
        assert!(!scheduler.remove_target("b"));
        sleep_secs(0.1).await;

        let b_len = scheduler.store().history("b").unwrap().len();
        let a_len = scheduler.store().history("a").unwrap().len();
        sleep_secs(0.3).await;
        assert_eq!(scheduler.store().history("b").unwrap().len(), b_len);
        assert!(scheduler.store().history("a").unwrap().len() > a_len);
        assert_eq!(scheduler.status().watching, vec!["a".to_string()]);

        // Removing the last watcher ends the run.
        assert!(scheduler.remove_target("a"));
        sleep_secs(0.2).await;
        assert_eq!(scheduler.status().phase, RunPhase::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_target_churn_does_not_accumulate_tasks() {
        let scheduler = scheduler();
        assert_ok!(scheduler.start(vec![spec("steady", DEAD, 10.0, None)]));

        for _ in 0..20 {
            assert_ok!(scheduler.add_target(spec("churn", DEAD, 10.0, None)));
            sleep_secs(0.02).await;
            assert!(scheduler.remove_target("churn"));
            sleep_secs(0.03).await;
        }

        let retired = scheduler.state.lock().retired.len();
        assert!(retired <= 2, "{} retired tasks kept", retired);
        assert_eq!(scheduler.status().watching, vec!["steady".to_string()]);
        scheduler.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_named_target_history_keeps_url() {
        let scheduler = scheduler();
        assert_ok!(scheduler.start(vec![spec("home", DEAD, 10.0, None)]));
        let history = scheduler.store().history("home").unwrap();
        assert_eq!(history.url.as_deref(), Some(DEAD));
        scheduler.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_error_status_is_recorded() {
        let addr = spawn_test_server().await;
        let scheduler = scheduler();
        assert_ok!(scheduler.start(vec![
            spec("missing", &format!("http://{}/missing", addr), 0.1, None),
            spec("root", &format!("http://{}/", addr), 0.1, None),
        ]));
        sleep_secs(0.35).await;
        scheduler.shutdown(Duration::from_secs(6)).await;

        let snapshot = scheduler.snapshot();
        let missing = snapshot.get("missing").unwrap().latest().unwrap();
        assert_eq!(missing.status_code, Some(404));
        assert_eq!(missing.status_name, "Not Found");
        assert!(missing.latency_secs > 0.0);

        let root = snapshot.get("root").unwrap().latest().unwrap();
        assert_eq!(root.status_code, Some(200));
        assert_eq!(root.status_name, "OK");
    }
}
