//! Motion detection pipeline
//!
//! Three stages cooperate through two shared queues:
//! - Source: emits the input sequence to the detection and logging queues
//! - Transform: classifies motion from the detection queue into detections
//!   on the logging queue
//! - Sink: records everything that reaches the logging queue
//!
//! # Architecture
//!
//! - Each stage runs in its own async task and implements `PipelineStage`
//! - Stages share nothing but the queues they were built with
//! - End of stream is the stop sentinel, an ordinary `Event` variant; queues
//!   are never closed to signal it
//! - The coordinator wires the stages, joins them and reports which stage
//!   failed, if any

pub mod coordinator;
pub mod error;
pub mod health;
pub mod input;
pub mod processing;
pub mod queue;
pub mod recorder;
pub mod sink_stage;
pub mod source_stage;
pub mod stage;
pub mod state;
pub mod transform_stage;
pub mod types;

pub use coordinator::PipelineCoordinator;
pub use error::PipelineError;
pub use stage::PipelineStage;
