//! Reload events
//!
//! Both threads publish to an [`EventBus`]; any number of subscribers receive
//! their own copy over a bounded channel. Sending never blocks: a subscriber
//! whose queue is full misses the event, and subscribers that hang up are
//! dropped on the next publish.

use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use tracing::debug;

use super::watcher::Version;

/// Hot-reload event
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReloadEvent {
    /// A watched source was edited
    SourceChanged { path: PathBuf, version: Version },
    /// The build command is about to run
    RebuildStarted,
    /// The build command returned
    RebuildFinished { duration: Duration },
    /// A new artifact version was observed and a reload is pending
    ArtifactChanged { previous: Version, current: Version },
    /// Slots were rebound to a new version
    ReloadCompleted {
        version: Version,
        symbols: usize,
        duration: Duration,
    },
    /// Binding a new version failed; the host keeps running
    ReloadFailed { version: Version, error: String },
}

/// Events queued per subscriber before new ones are dropped.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Fan-out publisher for [`ReloadEvent`]s.
#[derive(Debug)]
pub struct EventBus {
    capacity: usize,
    subscribers: Mutex<Vec<Sender<ReloadEvent>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Open a new subscription.
    ///
    /// Each receiver queues at most `capacity` events. One that is kept but
    /// never drained stops receiving once full; drop it to unsubscribe.
    pub fn subscribe(&self) -> Receiver<ReloadEvent> {
        let (tx, rx) = bounded(self.capacity);
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: ReloadEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                debug!("Subscriber queue full; dropping {:?}", dropped);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
