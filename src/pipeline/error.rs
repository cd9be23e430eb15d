//! Error types for the pipeline.
//!
//! Errors are split by layer: the queue transport, a single stage, and the
//! pipeline as seen by the coordinator. Every stage error is fatal to the
//! stage that raised it; nothing is retried.

use std::time::Duration;

use thiserror::Error;

use super::types::EventKind;

/// Errors raised by a queue transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue no longer accepts messages
    #[error("queue '{queue}' is closed")]
    Closed { queue: &'static str },

    /// The transport is gone and nothing is left to receive
    #[error("queue '{queue}' is disconnected")]
    Disconnected { queue: &'static str },
}

/// Errors that terminate a single stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// The stage could not read from or write to one of its queues
    #[error("transport failure: {0}")]
    Transport(#[from] QueueError),

    /// The processing function failed on a motion event
    #[error("processing failed for frame {frame_id}: {reason}")]
    Processing { frame_id: u64, reason: String },

    /// The processing function altered the identity fields of its input
    #[error("processing altered identity of frame {frame_id}")]
    IdentityMismatch { frame_id: u64 },

    /// A message of a kind this stage never consumes
    #[error("unexpected {kind} event on '{queue}'")]
    UnexpectedEvent {
        kind: EventKind,
        queue: &'static str,
    },

    /// The recorder could not record an event
    #[error("recorder failed: {0}")]
    Recorder(String),

    /// A state change the stage state machine does not allow
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Why a stage did not complete normally
#[derive(Debug, Error)]
pub enum StageFailure {
    #[error("{stage} failed: {source}")]
    Errored {
        stage: &'static str,
        #[source]
        source: StageError,
    },

    #[error("{stage} panicked: {message}")]
    Panicked { stage: &'static str, message: String },

    /// Still running when the pipeline made no progress for `idle`
    #[error("{stage} made no progress for {idle:?}")]
    Stalled { stage: &'static str, idle: Duration },

    /// Cancelled because another stage failed first
    #[error("{stage} aborted after an upstream failure")]
    Aborted { stage: &'static str },

    #[error("{stage} exited without observing the stop sentinel")]
    SentinelMissed { stage: &'static str },
}

impl StageFailure {
    /// Name of the stage that failed
    pub fn stage(&self) -> &'static str {
        match self {
            StageFailure::Errored { stage, .. }
            | StageFailure::Panicked { stage, .. }
            | StageFailure::Stalled { stage, .. }
            | StageFailure::Aborted { stage }
            | StageFailure::SentinelMissed { stage } => *stage,
        }
    }
}

/// Errors reported by the pipeline coordinator
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source sequence breaks the caller contract
    #[error("malformed input sequence: {0}")]
    MalformedInput(String),

    /// One or more stages did not complete normally
    #[error("{} stage(s) failed: {}", .failures.len(), describe(.failures))]
    StagesFailed { failures: Vec<StageFailure> },
}

fn describe(failures: &[StageFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
