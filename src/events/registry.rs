use super::{Listener, SessionEvent};

/// Listeners owned by one [`SessionManager`](crate::SessionManager).
///
/// Build it before constructing the manager and hand it over with
/// [`SessionManager::with_events`](crate::SessionManager::with_events).
/// An empty registry makes dispatch a no-op.
#[derive(Default)]
pub struct EventRegistry {
    listeners: Vec<Box<dyn Listener>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener to receive events.
    ///
    /// Listeners are called in the order they are registered.
    pub fn listen(&mut self, listener: impl Listener) -> &mut Self {
        self.listeners.push(Box::new(listener));
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub async fn dispatch(&self, event: SessionEvent) {
        for listener in &self.listeners {
            listener.handle(&event).await;
        }
    }
}
