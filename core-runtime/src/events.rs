//! # Event Bus System
//!
//! Broadcast channel carrying library and enrichment notifications, built on
//! `tokio::sync::broadcast`.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EnrichmentEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Enrichment(EnrichmentEvent::Started {
//!     track_key: "9f2c...".to_string(),
//!     fields: vec!["lyrics".to_string()],
//! }))
//! .ok();
//!
//! let event = rx.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Enrichment(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events and may continue.
//! - **`RecvError::Closed`**: every sender is gone; treat it as shutdown.
//!
//! Emitting with no subscribers returns `Err`; producers ignore it with `.ok()`.

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

/// Top-level event enum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Library(LibraryEvent),
    Enrichment(EnrichmentEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Library(e) => e.description(),
            CoreEvent::Enrichment(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Enrichment(EnrichmentEvent::Failed { .. }) => EventSeverity::Warning,
            CoreEvent::Enrichment(EnrichmentEvent::Dropped { .. }) => EventSeverity::Warning,
            CoreEvent::Library(LibraryEvent::ScanCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Enrichment(EnrichmentEvent::Completed { .. }) => EventSeverity::Info,
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
// Library Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// A scan of the music root started
    ScanStarted { root: String },
    /// A scan finished; `skipped` counts unreadable entries
    ScanCompleted { tracks: usize, skipped: usize },
}

impl LibraryEvent {
    pub fn description(&self) -> &str {
        match self {
            LibraryEvent::ScanStarted { .. } => "Library scan started",
            LibraryEvent::ScanCompleted { .. } => "Library scan completed",
        }
    }
}

// ============================================================================
// Enrichment Events
// ============================================================================

/// Lifecycle of a background fetch. `track_key` is the hex track identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum EnrichmentEvent {
    Started {
        track_key: String,
        fields: Vec<String>,
    },
    Completed {
        track_key: String,
        lyrics_found: bool,
        cover_found: bool,
    },
    /// The worker queue was full; nothing was fetched
    Dropped { track_key: String },
    /// The fetch ended without merging (merge error or panic)
    Failed { track_key: String, message: String },
}

impl EnrichmentEvent {
    pub fn description(&self) -> &str {
        match self {
            EnrichmentEvent::Started { .. } => "Enrichment started",
            EnrichmentEvent::Completed { .. } => "Enrichment completed",
            EnrichmentEvent::Dropped { .. } => "Enrichment dropped",
            EnrichmentEvent::Failed { .. } => "Enrichment failed",
        }
    }

    pub fn track_key(&self) -> &str {
        match self {
            EnrichmentEvent::Started { track_key, .. }
            | EnrichmentEvent::Completed { track_key, .. }
            | EnrichmentEvent::Dropped { track_key }
            | EnrichmentEvent::Failed { track_key, .. } => track_key,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast bus. Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event, returning the number of subscribers reached.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

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
