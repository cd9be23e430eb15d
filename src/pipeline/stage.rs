//! Pipeline stage trait
//!
//! Defines the interface shared by the source, transform and sink stages.

use async_trait::async_trait;

use super::error::StageError;
use super::state::StageState;

/// What a stage did during its run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOutcome {
    /// Stage name, for reporting
    pub stage: &'static str,
    /// Messages taken from the stage's input
    pub received: u64,
    /// Messages put on the stage's output queue(s)
    pub sent: u64,
    /// Whether the stage observed (or, for the source, emitted) the sentinel
    pub sentinel_seen: bool,
}

impl StageOutcome {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            received: 0,
            sent: 0,
            sentinel_seen: false,
        }
    }
}

impl std::fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} received, {} sent, sentinel {}",
            self.stage,
            self.received,
            self.sent,
            if self.sentinel_seen { "seen" } else { "missed" }
        )
    }
}

/// Trait for pipeline stages
///
/// Each stage runs as its own task and exchanges events with its neighbours
/// only through the queues it was built with.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Run the stage until it observes the stop sentinel or hits a fatal error
    async fn run(&mut self) -> Result<StageOutcome, StageError>;

    /// Get the name of this stage for logging
    fn name(&self) -> &'static str;

    /// Current state of the stage
    fn state(&self) -> StageState;
}
