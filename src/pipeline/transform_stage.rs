//! Transform stage
//!
//! Consumes the detection queue, classifies each motion event and forwards
//! the resulting detection to the logging queue. The stop sentinel is
//! forwarded unchanged and ends the stage.

use async_trait::async_trait;
use log::{debug, error, info};
use std::sync::Arc;

use crate::pipeline::PipelineStage;
use crate::pipeline::error::StageError;
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::processing::ProcessMotion;
use crate::pipeline::queue::Queue;
use crate::pipeline::stage::StageOutcome;
use crate::pipeline::state::StageState;
use crate::pipeline::types::{Event, MotionEvent};

/// What the loop should do after handling one message
enum Step {
    Continue,
    Stop,
}

/// Transform stage: MotionEvent → DetectionEvent
///
/// Every message taken from the detection queue produces exactly one message
/// on the logging queue. If that cannot be honoured the stage fails instead
/// of dropping or substituting anything.
pub struct TransformStage {
    detection: Arc<dyn Queue>,
    logging: Arc<dyn Queue>,
    processor: Box<dyn ProcessMotion>,
    health: Arc<PipelineHealth>,
    state: StageState,
}

impl TransformStage {
    /// Create a new transform stage
    pub fn new(
        detection: Arc<dyn Queue>,
        logging: Arc<dyn Queue>,
        processor: Box<dyn ProcessMotion>,
        health: Arc<PipelineHealth>,
    ) -> Self {
        Self {
            detection,
            logging,
            processor,
            health,
            state: StageState::Idle,
        }
    }

    fn classify(&self, motion: &MotionEvent) -> Result<Event, StageError> {
        let frame_id = motion.envelope.frame_id;
        let detection = self
            .processor
            .process(motion)
            .map_err(|e| StageError::Processing {
                frame_id,
                reason: format!("{:#}", e),
            })?;
        self.health.record_processed();

        if !detection.envelope.same_identity(&motion.envelope) {
            return Err(StageError::IdentityMismatch { frame_id });
        }
        Ok(detection.into())
    }

    fn handle(&self, event: Event, outcome: &mut StageOutcome) -> Result<Step, StageError> {
        match event {
            Event::Stop(_) => {
                self.logging.put(event)?;
                outcome.sent += 1;
                outcome.sentinel_seen = true;
                Ok(Step::Stop)
            }
            Event::Motion(motion) => {
                let detection = self.classify(&motion)?;
                debug!("TransformStage: {}", detection);
                self.logging.put(detection)?;
                outcome.sent += 1;
                self.health.record_forwarded();
                Ok(Step::Continue)
            }
            Event::Detection(_) => Err(StageError::UnexpectedEvent {
                kind: event.kind(),
                queue: self.detection.name(),
            }),
        }
    }

    async fn consume(&mut self, outcome: &mut StageOutcome) -> Result<(), StageError> {
        loop {
            let event = self.detection.get().await?;
            outcome.received += 1;

            if let Step::Stop = self.handle(event, outcome)? {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl PipelineStage for TransformStage {
    async fn run(&mut self) -> Result<StageOutcome, StageError> {
        self.state.start()?;
        info!("TransformStage: started");

        let mut outcome = StageOutcome::new(self.name());
        if let Err(e) = self.consume(&mut outcome).await {
            error!(
                "TransformStage: aborting after {} messages: {}",
                outcome.received, e
            );
            self.state.fail();
            return Err(e);
        }

        self.state.stop()?;
        info!(
            "TransformStage: finished, {} detections forwarded",
            outcome.sent.saturating_sub(1)
        );
        Ok(outcome)
    }

    fn name(&self) -> &'static str {
        "TransformStage"
    }

    fn state(&self) -> StageState {
        self.state
    }
}
