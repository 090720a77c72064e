//! Subscriber registry for push frames.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::frame::{EventKind, PushFrame};

/// Callback invoked for every matching frame.
pub type Handler = Arc<dyn Fn(&PushFrame) + Send + Sync>;

/// What a handler listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// One recognised frame kind.
    Kind(EventKind),
    /// Every frame, recognised or not.
    All,
}

impl From<EventKind> for Topic {
    fn from(kind: EventKind) -> Self {
        Self::Kind(kind)
    }
}

struct Registration {
    id: u64,
    topic: Topic,
    handler: Handler,
}

/// Handlers in registration order.
#[derive(Default)]
pub struct Registry {
    next_id: u64,
    entries: Vec<Registration>,
}

impl Registry {
    fn insert(&mut self, topic: Topic, handler: Handler) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Registration { id, topic, handler });
        id
    }

    fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|r| r.id != id);
        self.entries.len() != before
    }

    /// Handlers for a frame: kind-specific ones first, then wildcards, each in
    /// registration order.
    fn matching(&self, frame: &PushFrame) -> Vec<Handler> {
        let kind = frame.event_kind();
        let specific = self
            .entries
            .iter()
            .filter(|r| kind.is_some_and(|k| r.topic == Topic::Kind(k)));
        let wildcard = self.entries.iter().filter(|r| r.topic == Topic::All);
        specific
            .chain(wildcard)
            .map(|r| Arc::clone(&r.handler))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared handle to a registry.
#[derive(Clone, Default)]
pub struct SharedRegistry(Arc<Mutex<Registry>>);

impl SharedRegistry {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a handler; the returned handle removes exactly this entry.
    pub fn subscribe(&self, topic: Topic, handler: Handler) -> Subscription {
        let id = self.lock().insert(topic, handler);
        Subscription {
            registry: Arc::downgrade(&self.0),
            id,
            topic,
        }
    }

    /// Deliver a frame to every matching handler.
    ///
    /// The lock is released before handlers run, so a handler may subscribe or
    /// unsubscribe without deadlocking.
    pub fn dispatch(&self, frame: &PushFrame) -> usize {
        let handlers = self.lock().matching(frame);
        for handler in &handlers {
            handler(frame);
        }
        handlers.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping it leaves the registration in place; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    id: u64,
    topic: Topic,
}

impl Subscription {
    /// Remove this registration. Safe to call any number of times.
    ///
    /// Returns whether anything was removed by this call.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.remove(self.id)
    }

    pub const fn topic(&self) -> Topic {
        self.topic
    }
}
