//! Device event bus
//!
//! Device wrappers announce the start and end of long-running operations
//! (slews, focuser and rotator moves, exposures, readouts) on a broadcast
//! channel. Each published event gets a monotonically increasing id.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::trace;

/// Default event buffer size.
///
/// A receiver that falls more than this many events behind gets a `Lagged`
/// error and skips ahead.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// How an operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Ok,
    Aborted,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceEvent {
    // Telescope
    SlewBegin { ra: f64, dec: f64 },
    SlewComplete { ra: f64, dec: f64, status: OperationStatus },
    TrackingStarted,
    TrackingStopped,

    // Focuser
    FocuserMoveBegin { target: i32 },
    FocuserMoveComplete { position: i32 },

    // Rotator
    RotatorMoveBegin { target: f64 },
    RotatorMoveComplete { angle: f64 },

    // Camera
    ExposeBegin { exptime: f64 },
    ExposeComplete { status: OperationStatus },
    ReadoutBegin,
    ReadoutComplete { path: Option<PathBuf>, status: OperationStatus },
    FilterChanged { filter: String },
}

/// An event as delivered to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwopeEvent {
    /// Unique event ID (monotonically increasing sequence number)
    pub event_id: u64,
    /// Milliseconds since Unix epoch
    pub timestamp: i64,
    /// Name of the publishing device
    pub device: String,
    pub event: DeviceEvent,
}

pub struct EventBus {
    sender: broadcast::Sender<SwopeEvent>,
    sequence: AtomicU64,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: AtomicU64::new(1),
            capacity,
        }
    }

    /// Publish an event to all subscribers
    /// Returns the event ID assigned to the published event
    pub fn publish(&self, device: &str, event: DeviceEvent) -> u64 {
        let event_id = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event = SwopeEvent {
            event_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
            device: device.to_string(),
            event,
        };

        if self.sender.send(event).is_err() {
            trace!(event_id, "No event subscribers");
        }

        event_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SwopeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

/// Drain every event currently queued on a receiver
#[cfg(test)]
pub(crate) fn drain(rx: &mut broadcast::Receiver<SwopeEvent>) -> Vec<DeviceEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event.event);
    }
    events
}
