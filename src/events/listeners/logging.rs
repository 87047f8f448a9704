use async_trait::async_trait;

use crate::events::{Listener, SessionEvent};

/// Logs all session events using the `log` crate.
///
/// # Example
///
/// ```rust,ignore
/// use latchkey::events::{EventRegistry, listeners::LoggingListener};
///
/// let mut events = EventRegistry::new();
/// events.listen(LoggingListener::new());
/// ```
pub struct LoggingListener {
    level: log::Level,
}

impl LoggingListener {
    /// Creates a new logging listener at INFO level.
    pub fn new() -> Self {
        Self {
            level: log::Level::Info,
        }
    }

    /// Creates a new logging listener at the specified level.
    pub fn with_level(level: log::Level) -> Self {
        Self { level }
    }
}

impl Default for LoggingListener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Listener for LoggingListener {
    async fn handle(&self, event: &SessionEvent) {
        log::log!(
            target: "latchkey::events",
            self.level,
            "event={} {:?}",
            event.name(),
            event
        );
    }
}
