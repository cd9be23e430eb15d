//! Input sequence for the source stage

use rand::Rng;

use super::error::PipelineError;
use super::types::{BoundingBox, Envelope, Event, MotionEvent, Velocity};

/// How far back generated timestamps may reach, in seconds
const TIMESTAMP_WINDOW_SECS: f64 = 1000.0;

/// Build `count` random motion events followed by the stop sentinel.
///
/// Timestamps fall within the last [`TIMESTAMP_WINDOW_SECS`] seconds.
pub fn motion_sequence<R: Rng>(count: usize, rng: &mut R) -> Vec<Event> {
    let now = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;

    let mut events: Vec<Event> = (0..count)
        .map(|_| {
            let envelope = Envelope::new(
                rng.gen_range(now - TIMESTAMP_WINDOW_SECS..=now),
                rng.gen_range(0..=100),
                BoundingBox::new(
                    rng.gen_range(0..=200),
                    rng.gen_range(0..=200),
                    rng.gen_range(0..=100),
                    rng.gen_range(0..=100),
                ),
            );
            let velocity = Velocity {
                vx: rng.gen_range(0.0..5.0),
                vy: rng.gen_range(0.0..5.0),
            };
            MotionEvent::new(envelope, velocity).into()
        })
        .collect();

    events.push(Event::stop());
    events
}

/// Check the source contract: only motion events, then exactly one
/// trailing stop sentinel.
pub fn validate_sequence(events: &[Event]) -> Result<(), PipelineError> {
    let Some((last, body)) = events.split_last() else {
        return Err(PipelineError::MalformedInput(
            "sequence is empty, expected a trailing stop sentinel".into(),
        ));
    };

    if !last.is_stop() {
        return Err(PipelineError::MalformedInput(format!(
            "sequence ends with a {} event, expected a stop sentinel",
            last.kind()
        )));
    }

    for (index, event) in body.iter().enumerate() {
        match event {
            Event::Motion(_) => {}
            Event::Stop(_) => {
                return Err(PipelineError::MalformedInput(format!(
                    "extra stop sentinel at position {}",
                    index
                )));
            }
            Event::Detection(_) => {
                return Err(PipelineError::MalformedInput(format!(
                    "detection event at position {}, the source only emits motion",
                    index
                )));
            }
        }
    }
    Ok(())
}
