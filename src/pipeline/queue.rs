//! Shared FIFO transport between stages
//!
//! A queue is created before any stage starts and is shared through an
//! `Arc` by the stages that produce into it and the single stage that
//! consumes from it. End of stream is signalled in-band by the stop sentinel,
//! never by closing the queue.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

use super::error::QueueError;
use super::types::Event;

/// Ordered, unbounded, blocking-on-empty transport for events
#[async_trait]
pub trait Queue: Send + Sync {
    /// Enqueue an event. Never waits: capacity is unbounded.
    fn put(&self, event: Event) -> Result<(), QueueError>;

    /// Wait until an event is available and return it in FIFO order
    async fn get(&self) -> Result<Event, QueueError>;

    /// Number of events enqueued but not yet taken
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue name for logging
    fn name(&self) -> &'static str;
}

/// Queue backed by an unbounded tokio mpsc channel
///
/// Any number of producers may `put` concurrently; per-producer order is
/// preserved, interleaving across producers is not defined. Only one
/// consumer may be waiting in `get` at a time.
pub struct ChannelQueue {
    name: &'static str,
    tx: Mutex<Option<mpsc::UnboundedSender<Event>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Event>>,
    pending: AtomicUsize,
}

impl ChannelQueue {
    /// Create a new, open queue
    pub fn new(name: &'static str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name,
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            pending: AtomicUsize::new(0),
        }
    }

    /// Drop the transport's sending side.
    ///
    /// Later `put`s fail; `get` drains what is already queued and then
    /// reports the queue as disconnected.
    pub fn close(&self) {
        let mut tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if tx.take().is_some() {
            log::debug!("Queue '{}': closed", self.name);
        }
    }
}

#[async_trait]
impl Queue for ChannelQueue {
    fn put(&self, event: Event) -> Result<(), QueueError> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = tx.as_ref().ok_or(QueueError::Closed { queue: self.name })?;

        self.pending.fetch_add(1, Ordering::SeqCst);
        tx.send(event).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            QueueError::Closed { queue: self.name }
        })
    }

    async fn get(&self) -> Result<Event, QueueError> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(event) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Ok(event)
            }
            None => Err(QueueError::Disconnected { queue: self.name }),
        }
    }

    fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
