//! # Event Bus System
//!
//! Broadcasts import run progress and library changes using
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The synchronisation coordinator emits an [`ImportEvent`] when a run starts,
//! as items are processed, and when the run completes, fails or is cancelled.
//! Each applied item additionally produces a [`LibraryEvent`]. Hosts subscribe
//! to refresh views or show progress; emitting with no subscriber is not an
//! error for the engine (it calls `.ok()` on the result).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_runtime::events::{CoreEvent, EventBus, EventStream};
//!
//! let event_bus = EventBus::new(100);
//! let mut imports = EventStream::new(event_bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Import(_)));
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = imports.recv().await {
//!         println!("{}", event.description());
//!     }
//! });
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep
//!   receiving.
//! - **`RecvError::Closed`**: every sender was dropped; treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Import run lifecycle events
    Import(ImportEvent),
    /// Library content changes
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Import(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Import(ImportEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Import(ImportEvent::Cancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Import(ImportEvent::Completed { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Import(ImportEvent::Started { .. })
            | CoreEvent::Import(ImportEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Import Events
// ============================================================================

/// Events describing one synchronisation run of an import.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ImportEvent {
    /// Run initiated.
    Started {
        /// Unique identifier of this run.
        run_id: String,
        /// Source identifier of the import.
        source: String,
        /// Grouped media types of the import, e.g. "tvshow,season,episode".
        media_types: String,
        /// Number of incoming items handed to the run.
        total_items: u64,
    },
    /// Progress after each applied item.
    Progress {
        run_id: String,
        items_processed: u64,
        total_items: u64,
        /// Progress percentage (0-100).
        percent: u8,
        /// Current phase (e.g., "changeset", "apply", "cleanup").
        phase: String,
    },
    /// Run committed.
    Completed {
        run_id: String,
        added: u64,
        updated: u64,
        removed: u64,
        unchanged: u64,
        /// Items skipped after a per-item failure.
        failed: u64,
        duration_ms: u64,
    },
    /// Run rolled back after a structural failure.
    Failed {
        run_id: String,
        message: String,
        items_processed: u64,
    },
    /// Run rolled back after cancellation.
    Cancelled { run_id: String, items_processed: u64 },
}

impl ImportEvent {
    fn description(&self) -> &str {
        match self {
            ImportEvent::Started { .. } => "Import started",
            ImportEvent::Progress { .. } => "Import in progress",
            ImportEvent::Completed { .. } => "Import completed",
            ImportEvent::Failed { .. } => "Import failed",
            ImportEvent::Cancelled { .. } => "Import cancelled",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Events describing library items written by an import run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    ItemAdded {
        media_type: String,
        item_id: i64,
        label: String,
    },
    ItemUpdated {
        media_type: String,
        item_id: i64,
        label: String,
    },
    ItemRemoved {
        media_type: String,
        item_id: i64,
        label: String,
    },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::ItemAdded { .. } => "Item added to library",
            LibraryEvent::ItemUpdated { .. } => "Library item updated",
            LibraryEvent::ItemRemoved { .. } => "Item removed from library",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus yields another producer for the same channel; every
/// `subscribe()` creates an independent receiver.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber receiving all future events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> CoreEvent {
        CoreEvent::Import(ImportEvent::Started {
            run_id: "run-1".to_string(),
            source: "upnp://server-1/".to_string(),
            media_types: "movie,set".to_string(),
            total_items: 3,
        })
    }

    fn completed(failed: u64) -> CoreEvent {
        CoreEvent::Import(ImportEvent::Completed {
            run_id: "run-1".to_string(),
            added: 2,
            updated: 1,
            removed: 0,
            unchanged: 0,
            failed,
            duration_ms: 12,
        })
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(started()).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        assert_eq!(bus.emit(started()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), started());
        assert_eq!(sub2.recv().await.unwrap(), started());
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Import(_)));

        bus.emit(CoreEvent::Library(LibraryEvent::ItemAdded {
            media_type: "movie".to_string(),
            item_id: 1,
            label: "Alien".to_string(),
        }))
        .ok();
        bus.emit(started()).ok();

        assert_eq!(stream.recv().await.unwrap(), started());
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for _ in 0..5 {
            bus.emit(started()).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(started().severity(), EventSeverity::Info);
        assert_eq!(completed(0).severity(), EventSeverity::Info);
        assert_eq!(completed(2).severity(), EventSeverity::Warning);

        let failed = CoreEvent::Import(ImportEvent::Failed {
            run_id: "run-1".to_string(),
            message: "commit failed".to_string(),
            items_processed: 4,
        });
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(failed.description(), "Import failed");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Import(ImportEvent::Progress {
            run_id: "run-123".to_string(),
            items_processed: 5,
            total_items: 10,
            percent: 50,
            phase: "apply".to_string(),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("run-123"));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}
