//! Sink stage
//!
//! Terminal consumer of the logging queue. Records every message, including
//! the stop sentinels, so an observer can confirm termination was seen.

use async_trait::async_trait;
use log::{error, info};
use std::sync::Arc;

use crate::pipeline::PipelineStage;
use crate::pipeline::error::StageError;
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::queue::Queue;
use crate::pipeline::recorder::Recorder;
use crate::pipeline::stage::StageOutcome;
use crate::pipeline::state::StageState;

/// Sink stage: records everything from the logging queue
///
/// The logging queue has one producer per upstream stage and each of them
/// ends its stream with a sentinel. The sink stops once it has recorded one
/// sentinel per producer, which is the point after which per-producer FIFO
/// guarantees nothing else is in flight.
pub struct SinkStage {
    logging: Arc<dyn Queue>,
    recorder: Box<dyn Recorder>,
    health: Arc<PipelineHealth>,
    /// Number of producers feeding the logging queue
    expected_stops: usize,
    state: StageState,
}

impl SinkStage {
    /// Create a new sink stage expecting a single sentinel
    pub fn new(
        logging: Arc<dyn Queue>,
        recorder: Box<dyn Recorder>,
        health: Arc<PipelineHealth>,
    ) -> Self {
        Self {
            logging,
            recorder,
            health,
            expected_stops: 1,
            state: StageState::Idle,
        }
    }

    /// Set how many upstream producers write to the logging queue
    pub fn with_expected_stops(mut self, producers: usize) -> Self {
        self.expected_stops = producers.max(1);
        self
    }

    async fn consume(&mut self, outcome: &mut StageOutcome) -> Result<(), StageError> {
        let mut stops = 0usize;

        loop {
            let event = self.logging.get().await?;
            outcome.received += 1;

            self.recorder
                .record(&event)
                .map_err(|e| StageError::Recorder(format!("{:#}", e)))?;
            self.health.record_recorded(event.is_stop());

            if event.is_stop() {
                stops += 1;
                if stops >= self.expected_stops {
                    outcome.sentinel_seen = true;
                    return Ok(());
                }
            }
        }
    }
}

#[async_trait]
impl PipelineStage for SinkStage {
    async fn run(&mut self) -> Result<StageOutcome, StageError> {
        self.state.start()?;
        info!(
            "SinkStage: started (waiting for {} sentinel(s))",
            self.expected_stops
        );

        let mut outcome = StageOutcome::new(self.name());
        if let Err(e) = self.consume(&mut outcome).await {
            error!(
                "SinkStage: aborting after {} messages: {}",
                outcome.received, e
            );
            self.state.fail();
            return Err(e);
        }

        self.state.stop()?;
        info!("SinkStage: finished, {} events recorded", outcome.received);
        Ok(outcome)
    }

    fn name(&self) -> &'static str {
        "SinkStage"
    }

    fn state(&self) -> StageState {
        self.state
    }
}
