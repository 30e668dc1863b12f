//! The session's event bus.
//!
//! The original design inherits from a custom event-emitter base class.
//! Composition is the idiomatic Rust rendition (spec §9): a [`Session`]
//! owns an `EventBus` and callers subscribe with [`EventBus::subscribe`]
//! rather than registering named listeners.
//!
//! [`Session`]: crate::session::Session

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::error::Error;
use crate::response::Response;

const CHANNEL_CAPACITY: usize = 64;

/// Which operation a [`Progress`] event reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferAction {
    /// A `get`/`RETR` download.
    Get,
    /// A `put`/`STOR` upload.
    Put,
}

/// Progress reported during a data transfer. `total` is `None` when the
/// byte count isn't known ahead of time (e.g. a streaming `put` source).
#[derive(Debug, Clone)]
pub struct Progress {
    /// Remote filename the transfer targets.
    pub filename: String,
    /// Which direction the transfer is going.
    pub action: TransferAction,
    /// Total size, if known.
    pub total: Option<u64>,
    /// Bytes moved so far.
    pub transferred: u64,
}

/// Session-level notifications, delivered independently of any one
/// command's own completion.
#[derive(Debug, Clone)]
pub enum Event {
    /// The control socket finished connecting.
    Connect,
    /// A socket (control or data) fired its idle timeout.
    Timeout,
    /// A transport-level error occurred outside of any single command's
    /// callback (e.g. an unsolicited socket error).
    Error(Arc<Error>),
    /// A raw response as it was parsed off the wire, regardless of
    /// whether it was paired with a queued command.
    Data(Response),
    /// Progress during a `get`/`put`.
    Progress(Progress),
}

/// A broadcast-backed event bus. Cloning an `EventBus` shares the same
/// underlying channel, mirroring a single embedded emitter.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

/// Handle returned by [`EventBus::subscribe`].
pub type EventReceiver = broadcast::Receiver<Event>;

impl EventBus {
    /// Create a fresh bus with no subscribers.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        EventBus { sender }
    }

    /// Subscribe to future events. Events emitted before a given
    /// subscription are not replayed to it.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all current subscribers. A no-op if nobody is
    /// listening.
    pub fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new()
    }
}
