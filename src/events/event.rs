use chrono::{DateTime, Utc};

/// Lifecycle events emitted by the session manager.
///
/// Keys are carried as an 8-character prefix so listeners that log events
/// never see a usable token.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A new session was minted on login.
    Created {
        user_id: i64,
        key_prefix: String,
        ip: u32,
        at: DateTime<Utc>,
    },
    /// A session missing from memory was rebuilt from the durable store.
    Revived {
        user_id: i64,
        key_prefix: String,
        at: DateTime<Utc>,
    },
    /// A session was removed explicitly (logout or owner change).
    Destroyed {
        user_id: i64,
        key_prefix: String,
        at: DateTime<Utc>,
    },
    /// A sweep evicted an idle session.
    Expired {
        key_prefix: String,
        at: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Returns a dot-separated event name for logging/tracing.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "session.created",
            Self::Revived { .. } => "session.revived",
            Self::Destroyed { .. } => "session.destroyed",
            Self::Expired { .. } => "session.expired",
        }
    }

    /// Returns the timestamp when this event occurred.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Created { at, .. }
            | Self::Revived { at, .. }
            | Self::Destroyed { at, .. }
            | Self::Expired { at, .. } => *at,
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        match self {
            Self::Created { user_id, .. }
            | Self::Revived { user_id, .. }
            | Self::Destroyed { user_id, .. } => Some(*user_id),
            Self::Expired { .. } => None,
        }
    }
}
