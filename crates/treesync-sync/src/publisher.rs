//! Explicit publish/subscribe for committed deltas.
//!
//! The producer owns one [`Publisher`]; anything interested in committed
//! deltas (a network sink, a logger, a test recorder) registers a handler with it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::messages::DeltaMessage;

/// Receives every delta the producer commits, in commit order.
///
/// Handlers run on the committing task and must not block.
pub trait DeltaHandler: Send + Sync {
    fn handle(&self, message: &DeltaMessage);
}

impl<F> DeltaHandler for F
where
    F: Fn(&DeltaMessage) + Send + Sync,
{
    fn handle(&self, message: &DeltaMessage) {
        self(message)
    }
}

/// Identifies a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

/// Ordered collection of delta handlers.
#[derive(Default)]
pub struct Publisher {
    handlers: Mutex<Vec<(HandlerId, Arc<dyn DeltaHandler>)>>,
    next_id: AtomicU64,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. Handlers are notified in registration order.
    pub fn register(&self, handler: impl DeltaHandler + 'static) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(handler)));
        tracing::debug!(%id, "delta handler registered");
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut handlers = self.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Deliver `message` to every handler.
    pub fn notify_all(&self, message: &DeltaMessage) {
        // Call outside the lock so a handler may register or unregister.
        let handlers: Vec<Arc<dyn DeltaHandler>> =
            self.lock().iter().map(|(_, h)| Arc::clone(h)).collect();

        for handler in handlers {
            handler.handle(message);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(HandlerId, Arc<dyn DeltaHandler>)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("handlers", &self.len())
            .finish()
    }
}
