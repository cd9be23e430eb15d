//! Source stage
//!
//! Walks the pre-built input sequence and fans every event out to the
//! detection queue and the logging queue, in that order.

use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::PipelineStage;
use crate::pipeline::error::StageError;
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::queue::Queue;
use crate::pipeline::stage::StageOutcome;
use crate::pipeline::state::StageState;
use crate::pipeline::types::Event;

/// Source stage: emits the input sequence to both downstream queues
///
/// The sequence must end with the stop sentinel; the stage does not check
/// this and has no termination action of its own beyond running out of
/// events.
pub struct SourceStage {
    events: Vec<Event>,
    detection: Arc<dyn Queue>,
    logging: Arc<dyn Queue>,
    health: Arc<PipelineHealth>,
    /// Pause between consecutive events
    emit_interval: Duration,
    state: StageState,
}

impl SourceStage {
    /// Create a new source stage owning `events`
    pub fn new(
        events: Vec<Event>,
        detection: Arc<dyn Queue>,
        logging: Arc<dyn Queue>,
        health: Arc<PipelineHealth>,
    ) -> Self {
        Self {
            events,
            detection,
            logging,
            health,
            emit_interval: Duration::ZERO,
            state: StageState::Idle,
        }
    }

    /// Pace emission by sleeping between events
    pub fn with_emit_interval(mut self, interval: Duration) -> Self {
        self.emit_interval = interval;
        self
    }

    async fn emit_all(&mut self, outcome: &mut StageOutcome) -> Result<(), StageError> {
        let events = std::mem::take(&mut self.events);
        let total = events.len();

        for (i, event) in events.into_iter().enumerate() {
            let is_stop = event.is_stop();
            debug!("SourceStage: emitting {}", event);

            self.detection.put(event.clone())?;
            self.logging.put(event)?;
            outcome.received += 1;
            outcome.sent += 2;
            self.health.record_emitted();

            if is_stop {
                outcome.sentinel_seen = true;
            }

            if !self.emit_interval.is_zero() && i + 1 < total {
                tokio::time::sleep(self.emit_interval).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineStage for SourceStage {
    async fn run(&mut self) -> Result<StageOutcome, StageError> {
        self.state.start()?;
        info!("SourceStage: started ({} events)", self.events.len());

        let mut outcome = StageOutcome::new(self.name());
        if let Err(e) = self.emit_all(&mut outcome).await {
            self.state.fail();
            return Err(e);
        }

        self.state.stop()?;
        info!(
            "SourceStage: finished, {} events fanned out to '{}' and '{}'",
            outcome.received,
            self.detection.name(),
            self.logging.name()
        );
        Ok(outcome)
    }

    fn name(&self) -> &'static str {
        "SourceStage"
    }

    fn state(&self) -> StageState {
        self.state
    }
}
