use async_trait::async_trait;

use super::SessionEvent;

/// Trait for handling session events asynchronously.
///
/// # Example
///
/// ```rust,ignore
/// use latchkey::events::{SessionEvent, Listener};
/// use async_trait::async_trait;
///
/// struct ActiveUsersGauge;
///
/// #[async_trait]
/// impl Listener for ActiveUsersGauge {
///     async fn handle(&self, event: &SessionEvent) {
///         match event {
///             SessionEvent::Created { .. } | SessionEvent::Revived { .. } => { /* inc */ }
///             SessionEvent::Destroyed { .. } | SessionEvent::Expired { .. } => { /* dec */ }
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Called for every event the owning manager dispatches.
    async fn handle(&self, event: &SessionEvent);
}
