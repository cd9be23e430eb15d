//! Recorders used by the sink stage

use anyhow::{Context, Result};
use log::info;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use super::types::Event;

/// Records every event the sink receives.
///
/// Implementations may have side effects but must not block indefinitely.
pub trait Recorder: Send + Sync {
    fn record(&mut self, event: &Event) -> Result<()>;
}

/// Writes each event through the `log` facade
#[derive(Default)]
pub struct LogRecorder;

impl Recorder for LogRecorder {
    fn record(&mut self, event: &Event) -> Result<()> {
        info!("{}", event);
        Ok(())
    }
}

/// Writes one JSON object per line
pub struct JsonLinesRecorder<W> {
    writer: W,
}

impl<W: Write + Send + Sync> JsonLinesRecorder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send + Sync> Recorder for JsonLinesRecorder<W> {
    fn record(&mut self, event: &Event) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event).context("Failed to serialize event")?;
        self.writer.write_all(b"\n")?;
        // The stream ends with the sentinel; make sure it reaches the medium
        if event.is_stop() {
            self.writer.flush()?;
        }
        Ok(())
    }
}

/// Keeps recorded events in memory.
///
/// Clones share one buffer, so a clone kept by the caller sees everything
/// the sink recorded.
#[derive(Clone, Default)]
pub struct MemoryRecorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Recorder for MemoryRecorder {
    fn record(&mut self, event: &Event) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{BoundingBox, Envelope, MotionEvent, Velocity};

    fn motion() -> Event {
        MotionEvent::new(
            Envelope::new(1625077800.0, 1, BoundingBox::new(10, 20, 50, 50)),
            Velocity { vx: 1.5, vy: 2.5 },
        )
        .into()
    }

    #[test]
    fn test_json_lines() {
        let mut recorder = JsonLinesRecorder::new(Vec::new());
        recorder.record(&motion()).unwrap();
        recorder.record(&Event::stop()).unwrap();

        let output = String::from_utf8(recorder.into_inner()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["kind"], "motion");
        assert_eq!(first["bounding_box"]["width"], 50);
        let last: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(last["kind"], "stop");
    }

    #[test]
    fn test_memory_recorder_is_shared() {
        let observer = MemoryRecorder::new();
        let mut recorder = observer.clone();

        recorder.record(&motion()).unwrap();
        recorder.record(&Event::stop()).unwrap();

        assert_eq!(observer.len(), 2);
        assert_eq!(observer.events()[0], motion());
        assert!(observer.events()[1].is_stop());
    }
}
