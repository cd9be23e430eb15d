//! Pipeline coordinator
//!
//! Wires Source → {detection, logging} → Transform → logging → Sink, runs
//! each stage as its own task and supervises all three. A run is cut short
//! only when a stage fails or when no stage makes progress for
//! `stage_timeout`; a slow but steady run may take as long as it needs.

use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::{Id, JoinError, JoinSet};

use crate::config::PipelineConfig;
use crate::pipeline::PipelineStage;
use crate::pipeline::error::{PipelineError, StageError, StageFailure};
use crate::pipeline::health::{HealthAlert, HealthMonitor, HealthSummary, PipelineHealth};
use crate::pipeline::input::validate_sequence;
use crate::pipeline::processing::ProcessMotion;
use crate::pipeline::queue::{ChannelQueue, Queue};
use crate::pipeline::recorder::Recorder;
use crate::pipeline::sink_stage::SinkStage;
use crate::pipeline::source_stage::SourceStage;
use crate::pipeline::stage::StageOutcome;
use crate::pipeline::state::PipelineState;
use crate::pipeline::transform_stage::TransformStage;
use crate::pipeline::types::Event;

/// Producers writing to the logging queue: the source and the transform
const LOGGING_PRODUCERS: usize = 2;

/// Health checks per stall window
const CHECKS_PER_TIMEOUT: u32 = 4;

/// Result of a run in which every stage completed normally
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Outcomes in topology order: source, transform, sink
    pub outcomes: Vec<StageOutcome>,
    /// Messages left on the detection queue after all stages joined
    pub detection_backlog: usize,
    /// Messages left on the logging queue after all stages joined
    pub logging_backlog: usize,
    pub health: HealthSummary,
    pub elapsed: Duration,
}

impl PipelineReport {
    /// Outcome of the stage called `name`
    pub fn outcome(&self, name: &str) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage == name)
    }
}

/// Why the coordinator cancelled the stages still running
#[derive(Debug, Clone, Copy)]
enum Interrupt {
    UpstreamFailure,
    Stalled(Duration),
}

/// Coordinates one run of the three-stage pipeline
pub struct PipelineCoordinator {
    config: PipelineConfig,
    health: Arc<PipelineHealth>,
    state: PipelineState,
}

impl PipelineCoordinator {
    /// Create a new pipeline coordinator
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            health: Arc::new(PipelineHealth::new()),
            state: PipelineState::Idle,
        }
    }

    /// Get current pipeline state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run the pipeline over `events` and wait for every stage.
    ///
    /// `events` must be motion events followed by exactly one stop sentinel;
    /// anything else is rejected before a stage is started.
    pub async fn run(
        &mut self,
        events: Vec<Event>,
        processor: Box<dyn ProcessMotion>,
        recorder: Box<dyn Recorder>,
    ) -> Result<PipelineReport, PipelineError> {
        validate_sequence(&events)?;

        // Both queues exist before any stage starts and outlive every stage
        let detection = Arc::new(ChannelQueue::new("detection"));
        let logging = Arc::new(ChannelQueue::new("logging"));

        let source = SourceStage::new(
            events,
            detection.clone(),
            logging.clone(),
            self.health.clone(),
        )
        .with_emit_interval(self.config.emit_interval);
        let transform = TransformStage::new(
            detection.clone(),
            logging.clone(),
            processor,
            self.health.clone(),
        );
        let sink = SinkStage::new(logging.clone(), recorder, self.health.clone())
            .with_expected_stops(LOGGING_PRODUCERS);
        let pipeline: [Box<dyn PipelineStage>; 3] =
            [Box::new(source), Box::new(transform), Box::new(sink)];
        let topology: Vec<&'static str> = pipeline.iter().map(|s| s.name()).collect();

        let started_at = Instant::now();
        self.state = PipelineState::Running { started_at };
        info!("PipelineCoordinator: starting stages");

        let timeout = self.config.stage_timeout;
        let (alert_tx, mut alert_rx) = mpsc::channel(4);
        let monitor = HealthMonitor::new(self.health.clone(), alert_tx)
            .with_check_interval(self.config.health_interval.min(timeout / CHECKS_PER_TIMEOUT))
            .with_stall_threshold(timeout);
        self.health.touch();
        let monitor = tokio::spawn(async move { monitor.run().await });

        // Consumers first so they are already waiting when the source emits
        let mut stages = JoinSet::new();
        let mut names = HashMap::new();
        for mut stage in pipeline.into_iter().rev() {
            let name = stage.name();
            let handle = stages.spawn(async move { stage.run().await });
            names.insert(handle.id(), name);
        }

        let mut outcomes = Vec::with_capacity(names.len());
        let mut failures = Vec::new();
        let mut interrupt = None;

        loop {
            tokio::select! {
                joined = stages.join_next_with_id() => {
                    let Some(joined) = joined else { break };
                    let (id, joined) = match joined {
                        Ok((id, result)) => (id, Ok(result)),
                        Err(e) => (e.id(), Err(e)),
                    };
                    let stage = stage_name(&names, id);
                    match classify(stage, joined, interrupt) {
                        Ok(outcome) => {
                            info!("PipelineCoordinator: {}", outcome);
                            outcomes.push(outcome);
                        }
                        Err(failure) => {
                            if interrupt.is_none() {
                                warn!("PipelineCoordinator: {} failed, stopping the rest", stage);
                                interrupt = Some(Interrupt::UpstreamFailure);
                                stages.abort_all();
                            }
                            failures.push(failure);
                        }
                    }
                }
                Some(alert) = alert_rx.recv(), if interrupt.is_none() => {
                    if let HealthAlert::Stalled { idle } = alert {
                        warn!(
                            "PipelineCoordinator: no progress for {:?}, aborting {} stage(s)",
                            idle,
                            stages.len()
                        );
                        interrupt = Some(Interrupt::Stalled(idle));
                        stages.abort_all();
                    }
                }
            }
        }
        monitor.abort();

        // Report in topology order
        let rank = |stage: &str| topology.iter().position(|s| *s == stage);
        outcomes.sort_by_key(|o| rank(o.stage));
        failures.sort_by_key(|f| rank(f.stage()));
        let elapsed = self.state.running_duration().unwrap_or_default();

        if !failures.is_empty() {
            self.state = PipelineState::Failed;
            for failure in &failures {
                error!("PipelineCoordinator: {}", failure);
            }
            return Err(PipelineError::StagesFailed { failures });
        }

        self.state = PipelineState::Completed;
        let report = PipelineReport {
            outcomes,
            detection_backlog: detection.len(),
            logging_backlog: logging.len(),
            health: self.health.summary(),
            elapsed,
        };
        info!(
            "PipelineCoordinator: all stages stopped in {:?}. {}",
            report.elapsed, report.health
        );
        Ok(report)
    }
}

fn stage_name(names: &HashMap<Id, &'static str>, id: Id) -> &'static str {
    names.get(&id).copied().unwrap_or("unknown stage")
}

/// Turn a joined stage task into its outcome or the reason it failed
fn classify(
    stage: &'static str,
    joined: Result<Result<StageOutcome, StageError>, JoinError>,
    interrupt: Option<Interrupt>,
) -> Result<StageOutcome, StageFailure> {
    match joined {
        Ok(Ok(outcome)) if outcome.sentinel_seen => Ok(outcome),
        Ok(Ok(_)) => Err(StageFailure::SentinelMissed { stage }),
        Ok(Err(source)) => Err(StageFailure::Errored { stage, source }),
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(StageFailure::Panicked { stage, message })
        }
        Err(_) => match interrupt {
            Some(Interrupt::Stalled(idle)) => Err(StageFailure::Stalled { stage, idle }),
            _ => Err(StageFailure::Aborted { stage }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::input::motion_sequence;
    use crate::pipeline::processing::StaticClassifier;
    use crate::pipeline::recorder::MemoryRecorder;
    use crate::pipeline::types::{
        BoundingBox, DetectionEvent, Envelope, EventKind, MotionEvent, Velocity,
    };
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> PipelineConfig {
        PipelineConfig::default()
            .with_stage_timeout(Duration::from_secs(5))
            .with_emit_interval(Duration::ZERO)
    }

    fn count(events: &[Event], kind: EventKind) -> usize {
        events.iter().filter(|e| e.kind() == kind).count()
    }

    struct CountingProcessor {
        calls: Arc<AtomicUsize>,
    }

    impl ProcessMotion for CountingProcessor {
        fn process(&self, motion: &MotionEvent) -> anyhow::Result<DetectionEvent> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            StaticClassifier::default().process(motion)
        }
    }

    struct FailingProcessor;

    impl ProcessMotion for FailingProcessor {
        fn process(&self, _motion: &MotionEvent) -> anyhow::Result<DetectionEvent> {
            anyhow::bail!("classifier offline")
        }
    }

    struct SlowProcessor {
        delay: Duration,
    }

    impl ProcessMotion for SlowProcessor {
        fn process(&self, motion: &MotionEvent) -> anyhow::Result<DetectionEvent> {
            std::thread::sleep(self.delay);
            StaticClassifier::default().process(motion)
        }
    }

    struct PanickingProcessor;

    impl ProcessMotion for PanickingProcessor {
        fn process(&self, _motion: &MotionEvent) -> anyhow::Result<DetectionEvent> {
            panic!("classifier crashed")
        }
    }

    #[tokio::test]
    async fn test_single_motion_scenario() {
        let recorder = MemoryRecorder::new();
        let motion = MotionEvent::new(
            Envelope::new(1625077800.0, 1, BoundingBox::new(10, 20, 50, 50)),
            Velocity { vx: 1.5, vy: 2.5 },
        );
        let mut coordinator = PipelineCoordinator::new(config());

        let report = coordinator
            .run(
                vec![motion.clone().into(), Event::stop()],
                Box::new(StaticClassifier::default()),
                Box::new(recorder.clone()),
            )
            .await
            .unwrap();

        assert_eq!(coordinator.state(), PipelineState::Completed);
        assert_eq!(report.detection_backlog, 0);
        assert_eq!(report.logging_backlog, 0);

        let transform = report.outcome("TransformStage").unwrap();
        assert_eq!(transform.received, 2);
        assert_eq!(transform.sent, 2);

        let recorded = recorder.events();
        assert_eq!(recorded.len(), 4);
        assert_eq!(count(&recorded, EventKind::Motion), 1);
        assert_eq!(count(&recorded, EventKind::Detection), 1);
        assert_eq!(count(&recorded, EventKind::Stop), 2);
        assert!(recorded.last().unwrap().is_stop());

        for event in &recorded {
            if let Event::Detection(d) = event {
                assert!(d.envelope.same_identity(&motion.envelope));
            }
        }
    }

    #[tokio::test]
    async fn test_sentinel_only_scenario() {
        let recorder = MemoryRecorder::new();
        let mut coordinator = PipelineCoordinator::new(config());

        let report = coordinator
            .run(
                vec![Event::stop()],
                Box::new(StaticClassifier::default()),
                Box::new(recorder.clone()),
            )
            .await
            .unwrap();

        assert_eq!(recorder.events(), vec![Event::stop(), Event::stop()]);
        assert_eq!(report.health.detections_forwarded, 0);
        assert_eq!(report.detection_backlog, 0);
    }

    #[tokio::test]
    async fn test_sink_records_two_n_plus_two() {
        let recorder = MemoryRecorder::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut rng = StdRng::seed_from_u64(5);
        let events = motion_sequence(5, &mut rng);
        let mut coordinator = PipelineCoordinator::new(config());

        let report = coordinator
            .run(
                events.clone(),
                Box::new(CountingProcessor {
                    calls: calls.clone(),
                }),
                Box::new(recorder.clone()),
            )
            .await
            .unwrap();

        let recorded = recorder.events();
        assert_eq!(recorded.len(), 12);
        assert_eq!(count(&recorded, EventKind::Motion), 5);
        assert_eq!(count(&recorded, EventKind::Detection), 5);
        assert_eq!(count(&recorded, EventKind::Stop), 2);
        assert!(recorded.last().unwrap().is_stop());
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        assert_eq!(report.detection_backlog, 0);
        assert_eq!(report.health.events_recorded, 12);
        assert_eq!(report.outcome("SourceStage").unwrap().sent, 12);
        assert_eq!(report.outcome("SinkStage").unwrap().received, 12);

        // Source copies reach the sink in input order
        let motions: Vec<_> = recorded
            .iter()
            .filter(|e| e.kind() == EventKind::Motion)
            .cloned()
            .collect();
        assert_eq!(motions, events[..5].to_vec());
    }

    #[tokio::test]
    async fn test_paced_run_may_outlast_stage_timeout() {
        let recorder = MemoryRecorder::new();
        let mut rng = StdRng::seed_from_u64(9);
        let mut coordinator = PipelineCoordinator::new(
            config()
                .with_emit_interval(Duration::from_millis(10))
                .with_stage_timeout(Duration::from_millis(300)),
        );

        let report = coordinator
            .run(
                motion_sequence(40, &mut rng),
                Box::new(StaticClassifier::default()),
                Box::new(recorder.clone()),
            )
            .await
            .unwrap();

        assert!(report.elapsed > Duration::from_millis(300));
        assert_eq!(recorder.len(), 82);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_pacing_with_many_events() {
        // 400 events at 100 ms take 40 s against a 30 s inactivity limit
        let recorder = MemoryRecorder::new();
        let mut rng = StdRng::seed_from_u64(21);
        let mut coordinator = PipelineCoordinator::new(
            PipelineConfig::default()
                .with_emit_interval(Duration::from_millis(100))
                .with_stage_timeout(Duration::from_secs(30)),
        );
        let started = tokio::time::Instant::now();

        let report = coordinator
            .run(
                motion_sequence(400, &mut rng),
                Box::new(StaticClassifier::default()),
                Box::new(recorder.clone()),
            )
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(39));
        assert_eq!(coordinator.state(), PipelineState::Completed);
        assert_eq!(report.health.events_recorded, 802);
        assert_eq!(recorder.len(), 802);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stalled_pipeline_is_aborted() {
        let recorder = MemoryRecorder::new();
        let mut rng = StdRng::seed_from_u64(19);
        let mut coordinator = PipelineCoordinator::new(
            config()
                .with_stage_timeout(Duration::from_millis(200))
                .with_health_interval(Duration::from_millis(20)),
        );

        let err = coordinator
            .run(
                motion_sequence(1, &mut rng),
                Box::new(SlowProcessor {
                    delay: Duration::from_millis(1500),
                }),
                Box::new(recorder.clone()),
            )
            .await
            .unwrap_err();

        assert_eq!(coordinator.state(), PipelineState::Failed);
        let PipelineError::StagesFailed { failures } = err else {
            panic!("expected stage failures");
        };
        assert!(failures.iter().any(|f| matches!(
            f,
            StageFailure::Stalled { stage: "SinkStage", idle }
                if *idle > Duration::from_millis(200)
        )));
        assert!(
            failures
                .iter()
                .all(|f| matches!(f, StageFailure::Stalled { .. }))
        );
        assert_eq!(count(&recorder.events(), EventKind::Detection), 0);
    }

    #[tokio::test]
    async fn test_processing_failure_reports_transform() {
        let recorder = MemoryRecorder::new();
        let mut rng = StdRng::seed_from_u64(11);
        let mut coordinator =
            PipelineCoordinator::new(config().with_stage_timeout(Duration::from_secs(30)));
        let started = Instant::now();

        let err = coordinator
            .run(
                motion_sequence(2, &mut rng),
                Box::new(FailingProcessor),
                Box::new(recorder.clone()),
            )
            .await
            .unwrap_err();

        // The sink is stopped right away rather than left waiting
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(coordinator.state(), PipelineState::Failed);
        let PipelineError::StagesFailed { failures } = err else {
            panic!("expected stage failures");
        };
        assert!(failures.iter().any(|f| matches!(
            f,
            StageFailure::Errored {
                stage: "TransformStage",
                source: StageError::Processing { .. },
            }
        )));
        assert!(matches!(
            failures.last(),
            Some(StageFailure::Aborted { stage: "SinkStage" })
        ));

        // The sink saw the source's sentinel but never the transform's
        assert!(
            recorder
                .events()
                .iter()
                .all(|e| e.kind() != EventKind::Detection)
        );
    }

    #[tokio::test]
    async fn test_panicking_stage_is_reported() {
        let mut rng = StdRng::seed_from_u64(13);
        let mut coordinator =
            PipelineCoordinator::new(config().with_stage_timeout(Duration::from_secs(30)));

        let err = coordinator
            .run(
                motion_sequence(1, &mut rng),
                Box::new(PanickingProcessor),
                Box::new(MemoryRecorder::new()),
            )
            .await
            .unwrap_err();

        let PipelineError::StagesFailed { failures } = err else {
            panic!("expected stage failures");
        };
        assert!(failures.iter().any(|f| matches!(
            f,
            StageFailure::Panicked { stage: "TransformStage", message }
                if message == "classifier crashed"
        )));
        assert!(
            failures
                .iter()
                .any(|f| matches!(f, StageFailure::Aborted { stage: "SinkStage" }))
        );
    }

    #[tokio::test]
    async fn test_malformed_input_is_rejected() {
        let recorder = MemoryRecorder::new();
        let mut rng = StdRng::seed_from_u64(17);
        let mut events = motion_sequence(2, &mut rng);
        events.pop();
        let mut coordinator = PipelineCoordinator::new(config());

        let err = coordinator
            .run(
                events,
                Box::new(StaticClassifier::default()),
                Box::new(recorder.clone()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::MalformedInput(_)));
        assert_eq!(coordinator.state(), PipelineState::Idle);
        assert!(recorder.is_empty());
    }
}
