//! Motion classification used by the transform stage

use anyhow::Result;

use super::types::{Classification, DetectionEvent, MotionEvent};

/// Turns a motion event into a detection event.
///
/// Implementations must copy the identity fields (timestamp, frame id,
/// bounding box) of their input unchanged and may only add classifications.
/// An error is fatal to the transform stage; there is no retry or skip.
pub trait ProcessMotion: Send + Sync {
    fn process(&self, motion: &MotionEvent) -> Result<DetectionEvent>;
}

/// Classifier returning the same labels for every motion event
pub struct StaticClassifier {
    classifications: Vec<Classification>,
}

impl StaticClassifier {
    pub fn new(classifications: Vec<Classification>) -> Self {
        Self { classifications }
    }
}

impl Default for StaticClassifier {
    fn default() -> Self {
        Self::new(vec![
            Classification::new("cat", 80.1),
            Classification::new("human", 10.5),
        ])
    }
}

impl ProcessMotion for StaticClassifier {
    fn process(&self, motion: &MotionEvent) -> Result<DetectionEvent> {
        Ok(DetectionEvent::from_motion(
            motion,
            self.classifications.clone(),
        ))
    }
}
