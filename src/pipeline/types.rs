//! Core types for the pipeline system
//!
//! Every message that travels through a queue is an [`Event`]. The set of
//! variants is closed: stages pattern-match on the variant and never inspect
//! anything else to decide what a message is.

use serde::{Deserialize, Serialize};

/// Rectangle in frame coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@({},{})", self.width, self.height, self.x, self.y)
    }
}

/// Apparent motion of a bounding box, in pixels per frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
}

/// A single label produced by the processing function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    /// Confidence in percent, 0.0..=100.0
    pub confidence: f64,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Identity fields shared by every event variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub frame_id: u64,
    pub bounding_box: BoundingBox,
}

impl Envelope {
    pub fn new(timestamp: f64, frame_id: u64, bounding_box: BoundingBox) -> Self {
        Self {
            timestamp,
            frame_id,
            bounding_box,
        }
    }

    /// Whether two envelopes describe the same observation.
    ///
    /// Timestamps are compared bit-for-bit: identity fields are copied, never
    /// recomputed, so any difference means the producer altered them.
    pub fn same_identity(&self, other: &Envelope) -> bool {
        self.timestamp.to_bits() == other.timestamp.to_bits()
            && self.frame_id == other.frame_id
            && self.bounding_box == other.bounding_box
    }
}

/// Motion observed by the source, not yet classified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionEvent {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub velocity: Velocity,
}

impl MotionEvent {
    pub fn new(envelope: Envelope, velocity: Velocity) -> Self {
        Self { envelope, velocity }
    }
}

/// Classified motion produced by the transform stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    #[serde(flatten)]
    pub envelope: Envelope,
    /// In the order the processing function produced them
    pub classifications: Vec<Classification>,
}

impl DetectionEvent {
    /// Build a detection carrying the identity of `motion` unchanged
    pub fn from_motion(motion: &MotionEvent, classifications: Vec<Classification>) -> Self {
        Self {
            envelope: motion.envelope,
            classifications,
        }
    }
}

/// Kind of event, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Stop,
    Motion,
    Detection,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Stop => write!(f, "Stop"),
            EventKind::Motion => write!(f, "Motion"),
            EventKind::Detection => write!(f, "Detection"),
        }
    }
}

/// Message flowing through the pipeline queues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// End-of-stream sentinel. Its envelope carries no meaning.
    Stop(Envelope),
    Motion(MotionEvent),
    Detection(DetectionEvent),
}

impl Event {
    /// The termination sentinel
    pub fn stop() -> Self {
        Event::Stop(Envelope::default())
    }

    pub fn envelope(&self) -> &Envelope {
        match self {
            Event::Stop(envelope) => envelope,
            Event::Motion(motion) => &motion.envelope,
            Event::Detection(detection) => &detection.envelope,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Stop(_) => EventKind::Stop,
            Event::Motion(_) => EventKind::Motion,
            Event::Detection(_) => EventKind::Detection,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Event::Stop(_))
    }
}

impl From<MotionEvent> for Event {
    fn from(motion: MotionEvent) -> Self {
        Event::Motion(motion)
    }
}

impl From<DetectionEvent> for Event {
    fn from(detection: DetectionEvent) -> Self {
        Event::Detection(detection)
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Stop(_) => write!(f, "Stop"),
            Event::Motion(motion) => write!(
                f,
                "Motion frame={} t={:.3} box={} v=({:.2}, {:.2})",
                motion.envelope.frame_id,
                motion.envelope.timestamp,
                motion.envelope.bounding_box,
                motion.velocity.vx,
                motion.velocity.vy
            ),
            Event::Detection(detection) => {
                write!(
                    f,
                    "Detection frame={} t={:.3} box={} [",
                    detection.envelope.frame_id,
                    detection.envelope.timestamp,
                    detection.envelope.bounding_box
                )?;
                for (i, class) in detection.classifications.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {:.1}%", class.label, class.confidence)?;
                }
                write!(f, "]")
            }
        }
    }
}
