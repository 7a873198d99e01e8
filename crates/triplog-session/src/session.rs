//! Per-session tracking worker.
//!
//! One worker task owns the [`TripDetector`] and its buffer. Adapters push
//! samples into a bounded queue through a [`SessionHandle`] without blocking;
//! the worker processes them in arrival order and forwards commits, in order,
//! to a writer task that calls the persistence gateway. A slow or failing
//! gateway therefore never stalls ingestion.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use triplog_core::{
    ActivityHint, Commit, ConfigError, InertialSample, MotionHintEstimator, PersistenceGateway,
    Phase, PositionSample, TrackingConfig, TripDetector,
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session has stopped")]
    Stopped,

    #[error("session queue is full, sample dropped")]
    QueueFull,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

enum Input {
    Position(PositionSample, Option<ActivityHint>),
    Inertial(InertialSample),
    /// Answered once every earlier input has been processed.
    Barrier(oneshot::Sender<()>),
}

/// Counters published by the worker and writer tasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub positions: u64,
    pub inertial: u64,
    pub rejected: u64,
    pub dropped: u64,
    pub buffered: usize,
    pub evicted: u64,
    pub commits_issued: u64,
    pub commits_written: u64,
    pub write_failures: u64,
    pub consecutive_write_failures: u32,
    pub trips: u64,
    pub phase: Phase,
    /// Set while consecutive write failures reach the configured limit.
    pub degraded: bool,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            positions: 0,
            inertial: 0,
            rejected: 0,
            dropped: 0,
            buffered: 0,
            evicted: 0,
            commits_issued: 0,
            commits_written: 0,
            write_failures: 0,
            consecutive_write_failures: 0,
            trips: 0,
            phase: Phase::Idle,
            degraded: false,
        }
    }
}

type SharedStats = Arc<Mutex<SessionStats>>;

fn update_stats(stats: &SharedStats, f: impl FnOnce(&mut SessionStats)) {
    if let Ok(mut s) = stats.lock() {
        f(&mut s);
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Caller-owned session. Dropping it stops the worker the same way
/// [`SessionHandle::stop`] does, without waiting for it.
pub struct SessionHandle {
    input_tx: mpsc::Sender<Input>,
    config_tx: watch::Sender<TrackingConfig>,
    stop_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    stats: SharedStats,
}

pub struct Session;

impl Session {
    /// Validate `config` and spawn the worker and writer tasks on the
    /// current Tokio runtime.
    pub fn start(
        config: TrackingConfig,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Result<SessionHandle, SessionError> {
        config.validate()?;

        let (input_tx, input_rx) = mpsc::channel(config.queue_capacity);
        let (commit_tx, commit_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (config_tx, config_rx) = watch::channel(config.clone());
        let stats: SharedStats = Arc::default();

        let worker = Worker {
            detector: TripDetector::new(&config),
            hints: MotionHintEstimator::default(),
            commit_tx,
            stats: stats.clone(),
        };
        let worker = tokio::spawn(worker.run(input_rx, config_rx.clone(), stop_rx));
        let writer = tokio::spawn(run_writer(gateway, commit_rx, config_rx, stats.clone()));

        info!(
            threshold = config.tracking_speed_threshold,
            sample_rate = config.sample_rate,
            capacity = config.ring_buffer_capacity,
            "tracking session started"
        );

        Ok(SessionHandle {
            input_tx,
            config_tx,
            stop_tx: Some(stop_tx),
            worker: Some(worker),
            writer: Some(writer),
            stats,
        })
    }
}

impl SessionHandle {
    /// Enqueue a position sample. Never waits: a full queue drops the sample.
    pub fn on_position_sample(
        &self,
        sample: PositionSample,
        hint: Option<ActivityHint>,
    ) -> Result<(), SessionError> {
        self.enqueue(Input::Position(sample, hint))
    }

    pub fn on_inertial_sample(&self, sample: InertialSample) -> Result<(), SessionError> {
        self.enqueue(Input::Inertial(sample))
    }

    fn enqueue(&self, input: Input) -> Result<(), SessionError> {
        match self.input_tx.try_send(input) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                update_stats(&self.stats, |s| s.dropped += 1);
                warn!("session queue full, dropping sample");
                Err(SessionError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SessionError::Stopped),
        }
    }

    /// Wait until every sample enqueued so far has been processed.
    pub async fn sync(&self) -> Result<(), SessionError> {
        barrier(&self.input_tx).await
    }

    /// Cloneable view for waiting on and reading the session without owning
    /// it. Does not keep the worker alive past `stop`.
    pub fn monitor(&self) -> SessionMonitor {
        SessionMonitor {
            input_tx: self.input_tx.clone(),
            stats: self.stats.clone(),
        }
    }

    /// Replace the running configuration. Applied between samples.
    pub fn update_config(&self, config: TrackingConfig) -> Result<(), SessionError> {
        config.validate()?;
        self.config_tx
            .send(config)
            .map_err(|_| SessionError::Stopped)
    }

    pub fn config(&self) -> TrackingConfig {
        self.config_tx.borrow().clone()
    }

    pub fn stats(&self) -> SessionStats {
        snapshot(&self.stats)
    }

    /// Stop consuming samples. Buffered records are discarded; commits
    /// already issued are still written. Returns the final counters.
    pub async fn stop(mut self) -> SessionStats {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!(error = %e, "session worker panicked");
            }
        }
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                warn!(error = %e, "session writer panicked");
            }
        }
        let stats = self.stats();
        info!(
            positions = stats.positions,
            commits = stats.commits_written,
            trips = stats.trips,
            "tracking session stopped"
        );
        stats
    }
}

#[derive(Clone)]
pub struct SessionMonitor {
    input_tx: mpsc::Sender<Input>,
    stats: SharedStats,
}

impl SessionMonitor {
    /// Same as [`SessionHandle::sync`].
    pub async fn sync(&self) -> Result<(), SessionError> {
        barrier(&self.input_tx).await
    }

    pub fn stats(&self) -> SessionStats {
        snapshot(&self.stats)
    }
}

async fn barrier(input_tx: &mpsc::Sender<Input>) -> Result<(), SessionError> {
    let (tx, rx) = oneshot::channel();
    input_tx
        .send(Input::Barrier(tx))
        .await
        .map_err(|_| SessionError::Stopped)?;
    rx.await.map_err(|_| SessionError::Stopped)
}

fn snapshot(stats: &SharedStats) -> SessionStats {
    stats.lock().map(|s| s.clone()).unwrap_or_default()
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct Worker {
    detector: TripDetector,
    hints: MotionHintEstimator,
    commit_tx: mpsc::UnboundedSender<Commit>,
    stats: SharedStats,
}

impl Worker {
    async fn run(
        mut self,
        mut input_rx: mpsc::Receiver<Input>,
        mut config_rx: watch::Receiver<TrackingConfig>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        let mut config_open = true;
        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                changed = config_rx.changed(), if config_open => {
                    if changed.is_err() {
                        config_open = false;
                        continue;
                    }
                    let cfg = config_rx.borrow_and_update().clone();
                    let evicted = self.detector.set_config(&cfg);
                    info!(
                        threshold = cfg.tracking_speed_threshold,
                        sample_rate = cfg.sample_rate,
                        capacity = cfg.ring_buffer_capacity,
                        "session config reloaded"
                    );
                    let buffered = self.detector.buffered();
                    update_stats(&self.stats, |s| {
                        s.evicted += evicted.len() as u64;
                        s.buffered = buffered;
                    });
                }
                input = input_rx.recv() => match input {
                    Some(input) => self.handle(input),
                    None => break,
                },
            }
        }

        // Buffered-but-unflushed records are dropped on stop.
        let discarded = self.detector.reset();
        self.hints.reset();
        if discarded > 0 {
            info!(discarded, "discarding buffered records on stop");
        }
        update_stats(&self.stats, |s| {
            s.buffered = 0;
            s.phase = Phase::Idle;
        });
    }

    fn handle(&mut self, input: Input) {
        match input {
            Input::Inertial(sample) => {
                self.hints.push(&sample);
                update_stats(&self.stats, |s| s.inertial += 1);
            }
            Input::Position(sample, hint) => {
                let hint = hint.or_else(|| self.hints.hint());
                match self.detector.process_position(&sample, hint) {
                    Ok(step) => {
                        let issued = step.commits.len() as u64;
                        for commit in step.commits {
                            if self.commit_tx.send(commit).is_err() {
                                warn!("session writer gone, commit lost");
                            }
                        }
                        let buffered = self.detector.buffered();
                        let trips = self.detector.trips();
                        update_stats(&self.stats, |s| {
                            s.positions += 1;
                            s.commits_issued += issued;
                            s.evicted += step.evicted.is_some() as u64;
                            s.buffered = buffered;
                            s.trips = trips;
                            s.phase = step.phase;
                        });
                    }
                    Err(_) => update_stats(&self.stats, |s| s.rejected += 1),
                }
            }
            Input::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

async fn run_writer(
    gateway: Arc<dyn PersistenceGateway>,
    mut commit_rx: mpsc::UnboundedReceiver<Commit>,
    config_rx: watch::Receiver<TrackingConfig>,
    stats: SharedStats,
) {
    // One append at a time keeps the store in commit order.
    while let Some(commit) = commit_rx.recv().await {
        let timestamp = commit.record.timestamp;
        let gw = gateway.clone();
        let result = tokio::task::spawn_blocking(move || gw.append(&commit.record)).await;
        let error = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) => Some(format!("append task failed: {e}")),
        };

        let limit = config_rx.borrow().degraded_after_failures;
        match error {
            None => {
                debug!(timestamp, "record committed");
                update_stats(&stats, |s| {
                    s.commits_written += 1;
                    s.consecutive_write_failures = 0;
                    s.degraded = false;
                });
            }
            Some(error) => {
                warn!(timestamp, %error, "persistence write failed");
                update_stats(&stats, |s| {
                    s.write_failures += 1;
                    s.consecutive_write_failures += 1;
                    s.degraded = limit > 0 && s.consecutive_write_failures >= limit;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use triplog_core::CommittedRecord;

    fn config(sample_rate: u32) -> TrackingConfig {
        TrackingConfig {
            sample_rate,
            ..TrackingConfig::default()
        }
    }

    fn at(t: f64, speed: f64) -> PositionSample {
        PositionSample::new(t, 52.52, 13.40 + t * 1e-4, speed)
    }

    fn timestamps(records: &[CommittedRecord]) -> Vec<f64> {
        records.iter().map(|r| r.timestamp).collect()
    }

    #[tokio::test]
    async fn test_trip_flushes_then_downsamples() {
        let store = Arc::new(MemoryStore::new());
        let handle = Session::start(config(3), store.clone()).unwrap();

        for i in 0..5 {
            handle.on_position_sample(at(i as f64, 0.0), None).unwrap();
        }
        for i in 5..15 {
            handle.on_position_sample(at(i as f64, 12.0), None).unwrap();
        }
        handle.sync().await.unwrap();
        let stats = handle.stop().await;

        // Five buffered samples, then the 3rd, 6th and 9th active samples.
        assert_eq!(
            timestamps(&store.records()),
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 7.0, 10.0, 13.0]
        );
        assert_eq!(stats.positions, 15);
        assert_eq!(stats.commits_written, 8);
        assert_eq!(stats.trips, 1);
    }

    #[tokio::test]
    async fn test_stop_discards_buffered_records() {
        let store = Arc::new(MemoryStore::new());
        let handle = Session::start(config(3), store.clone()).unwrap();
        for i in 0..5 {
            handle.on_position_sample(at(i as f64, 0.5), None).unwrap();
        }
        handle.sync().await.unwrap();
        assert_eq!(handle.stats().buffered, 5);

        let stats = handle.stop().await;
        assert!(store.is_empty());
        assert_eq!(stats.buffered, 0);
        assert_eq!(stats.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn test_invalid_samples_are_counted_not_processed() {
        let store = Arc::new(MemoryStore::new());
        let handle = Session::start(config(1), store.clone()).unwrap();
        handle.on_position_sample(at(0.0, -1.0), None).unwrap();
        handle.on_position_sample(at(1.0, 0.0), None).unwrap();
        handle.sync().await.unwrap();
        let stats = handle.stats();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.positions, 1);
        assert_eq!(stats.buffered, 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let store = Arc::new(MemoryStore::new());
        let cfg = TrackingConfig {
            queue_capacity: 2,
            ..TrackingConfig::default()
        };
        let handle = Session::start(cfg, store).unwrap();
        // Current-thread runtime: the worker cannot drain until we yield.
        handle.on_position_sample(at(0.0, 0.0), None).unwrap();
        handle.on_position_sample(at(1.0, 0.0), None).unwrap();
        assert!(matches!(
            handle.on_position_sample(at(2.0, 0.0), None),
            Err(SessionError::QueueFull)
        ));
        assert_eq!(handle.stats().dropped, 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_write_failures_mark_session_degraded() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next(3);
        let cfg = TrackingConfig {
            sample_rate: 1,
            degraded_after_failures: 3,
            ..TrackingConfig::default()
        };
        let handle = Session::start(cfg, store.clone()).unwrap();
        for i in 0..3 {
            handle.on_position_sample(at(i as f64, 20.0), None).unwrap();
        }
        handle.sync().await.unwrap();
        let stats = handle.stop().await;
        assert_eq!(stats.write_failures, 3);
        assert!(stats.degraded);
        assert_eq!(stats.positions, 3);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_degraded_clears_after_success() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next(2);
        let cfg = TrackingConfig {
            sample_rate: 1,
            degraded_after_failures: 2,
            ..TrackingConfig::default()
        };
        let handle = Session::start(cfg, store.clone()).unwrap();
        for i in 0..3 {
            handle.on_position_sample(at(i as f64, 20.0), None).unwrap();
        }
        handle.sync().await.unwrap();
        let stats = handle.stop().await;
        assert_eq!(stats.write_failures, 2);
        assert!(!stats.degraded);
        assert_eq!(timestamps(&store.records()), vec![2.0]);
    }

    #[tokio::test]
    async fn test_hot_reload_applies_between_samples() {
        let store = Arc::new(MemoryStore::new());
        let handle = Session::start(config(100), store.clone()).unwrap();
        for i in 0..3 {
            handle.on_position_sample(at(i as f64, 20.0), None).unwrap();
        }
        handle.sync().await.unwrap();
        assert_eq!(handle.stats().commits_issued, 0);

        handle.update_config(config(1)).unwrap();
        handle.on_position_sample(at(3.0, 20.0), None).unwrap();
        handle.sync().await.unwrap();
        let stats = handle.stop().await;
        assert_eq!(stats.commits_written, 1);
        assert_eq!(timestamps(&store.records()), vec![3.0]);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let store = Arc::new(MemoryStore::new());
        assert!(matches!(
            Session::start(config(0), store.clone()),
            Err(SessionError::Config(_))
        ));
        let handle = Session::start(config(1), store).unwrap();
        assert!(handle.update_config(config(0)).is_err());
        assert_eq!(handle.config().sample_rate, 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_monitor_syncs_and_outlives_handle() {
        let store = Arc::new(MemoryStore::new());
        let handle = Session::start(config(1), store).unwrap();
        let monitor = handle.monitor();
        for i in 0..3 {
            handle.on_position_sample(at(i as f64, 0.0), None).unwrap();
        }
        monitor.sync().await.unwrap();
        assert_eq!(monitor.stats().positions, 3);
        assert_eq!(monitor.stats().buffered, 3);

        handle.stop().await;
        assert!(matches!(monitor.sync().await, Err(SessionError::Stopped)));
        assert_eq!(monitor.stats().buffered, 0);
    }

    #[tokio::test]
    async fn test_samples_after_stop_are_refused() {
        let store = Arc::new(MemoryStore::new());
        let handle = Session::start(config(1), store).unwrap();
        let tx = handle.input_tx.clone();
        handle.stop().await;
        assert!(tx
            .try_send(Input::Position(at(0.0, 0.0), None))
            .is_err());
    }
}
