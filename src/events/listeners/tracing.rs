use async_trait::async_trait;

use crate::events::{Listener, SessionEvent};

/// Emits session events as tracing events.
///
/// Requires the `tracing` feature to be enabled.
pub struct TracingListener;

#[async_trait]
impl Listener for TracingListener {
    async fn handle(&self, event: &SessionEvent) {
        tracing::info!(
            target: "latchkey::events",
            event_name = event.name(),
            user_id = event.user_id(),
            ?event,
            "session event"
        );
    }
}
