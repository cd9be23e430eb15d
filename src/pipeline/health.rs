//! Health monitoring and metrics for pipeline

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Health metrics for a pipeline run
///
/// Tracks per-stage counters and the time of the last activity.
/// All fields use atomic operations for thread-safe access.
pub struct PipelineHealth {
    /// Events taken from the input sequence by the source
    pub events_emitted: AtomicU64,

    /// Motion events handed to the processing function
    pub motions_processed: AtomicU64,

    /// Detection events put on the logging queue
    pub detections_forwarded: AtomicU64,

    /// Events handed to the recorder, sentinels included
    pub events_recorded: AtomicU64,

    /// Stop sentinels handed to the recorder
    pub sentinels_recorded: AtomicU64,

    /// Microseconds since `base` at the last activity in any stage
    pub last_activity: AtomicU64,

    /// Reference point for `last_activity`, on the runtime clock
    base: Instant,
}

impl PipelineHealth {
    /// Create a new health metrics instance
    pub fn new() -> Self {
        Self {
            events_emitted: AtomicU64::new(0),
            motions_processed: AtomicU64::new(0),
            detections_forwarded: AtomicU64::new(0),
            events_recorded: AtomicU64::new(0),
            sentinels_recorded: AtomicU64::new(0),
            last_activity: AtomicU64::new(0),
            base: Instant::now(),
        }
    }

    fn elapsed_micros(&self) -> u64 {
        self.base.elapsed().as_micros() as u64
    }

    /// Mark progress without counting anything
    pub fn touch(&self) {
        self.last_activity.store(self.elapsed_micros(), Ordering::Relaxed);
    }

    pub fn record_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn record_processed(&self) {
        self.motions_processed.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn record_forwarded(&self) {
        self.detections_forwarded.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn record_recorded(&self, is_sentinel: bool) {
        self.events_recorded.fetch_add(1, Ordering::Relaxed);
        if is_sentinel {
            self.sentinels_recorded.fetch_add(1, Ordering::Relaxed);
        }
        self.touch();
    }

    pub fn events_emitted(&self) -> u64 {
        self.events_emitted.load(Ordering::Relaxed)
    }

    pub fn motions_processed(&self) -> u64 {
        self.motions_processed.load(Ordering::Relaxed)
    }

    pub fn detections_forwarded(&self) -> u64 {
        self.detections_forwarded.load(Ordering::Relaxed)
    }

    pub fn events_recorded(&self) -> u64 {
        self.events_recorded.load(Ordering::Relaxed)
    }

    pub fn sentinels_recorded(&self) -> u64 {
        self.sentinels_recorded.load(Ordering::Relaxed)
    }

    /// Time since any stage last made progress
    pub fn idle_time(&self) -> Duration {
        let last = self.last_activity.load(Ordering::Relaxed);
        Duration::from_micros(self.elapsed_micros().saturating_sub(last))
    }

    /// Check if the pipeline has stalled (no activity for given duration)
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        self.idle_time() > threshold
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            events_emitted: self.events_emitted(),
            motions_processed: self.motions_processed(),
            detections_forwarded: self.detections_forwarded(),
            events_recorded: self.events_recorded(),
            sentinels_recorded: self.sentinels_recorded(),
        }
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSummary {
    pub events_emitted: u64,
    pub motions_processed: u64,
    pub detections_forwarded: u64,
    pub events_recorded: u64,
    pub sentinels_recorded: u64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} emitted, {} processed, {} detections forwarded, {} recorded ({} sentinels)",
            self.events_emitted,
            self.motions_processed,
            self.detections_forwarded,
            self.events_recorded,
            self.sentinels_recorded
        )
    }
}

/// Health alert types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAlert {
    /// No stage has made progress for at least the stall threshold
    Stalled { idle: Duration },

    /// Progress resumed after a stall was reported
    Recovered,
}

impl std::fmt::Display for HealthAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthAlert::Stalled { idle } => write!(f, "Pipeline stalled for {:?}", idle),
            HealthAlert::Recovered => write!(f, "Pipeline recovered"),
        }
    }
}

/// Health monitoring service
///
/// Periodically checks pipeline health and sends an alert when the pipeline
/// stalls and again when it recovers. Each stall is reported once.
pub struct HealthMonitor {
    health: Arc<PipelineHealth>,
    alert_tx: mpsc::Sender<HealthAlert>,
    check_interval: Duration,
    stall_threshold: Duration,
}

impl HealthMonitor {
    /// Create a new health monitor
    pub fn new(health: Arc<PipelineHealth>, alert_tx: mpsc::Sender<HealthAlert>) -> Self {
        Self {
            health,
            alert_tx,
            check_interval: Duration::from_secs(5),
            stall_threshold: Duration::from_secs(5),
        }
    }

    /// Configure the check interval
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Configure the stall threshold
    pub fn with_stall_threshold(mut self, threshold: Duration) -> Self {
        self.stall_threshold = threshold;
        self
    }

    /// Run the health monitor until the alert receiver is dropped
    pub async fn run(&self) {
        // tokio rejects a zero period
        let period = self.check_interval.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        // First tick completes immediately
        interval.tick().await;
        let mut stalled = false;

        loop {
            interval.tick().await;
            debug!("Pipeline {}", self.health.summary());

            let alert = match (self.health.is_stalled(self.stall_threshold), stalled) {
                (true, false) => {
                    let idle = self.health.idle_time();
                    warn!(
                        "Pipeline stalled: no progress for {:?} ({})",
                        idle,
                        self.health.summary()
                    );
                    stalled = true;
                    HealthAlert::Stalled { idle }
                }
                (false, true) => {
                    info!("Pipeline progressing again ({})", self.health.summary());
                    stalled = false;
                    HealthAlert::Recovered
                }
                _ => continue,
            };

            if self.alert_tx.send(alert).await.is_err() {
                return;
            }
        }
    }
}
