//! Session lifecycle events.
//!
//! The manager dispatches a [`SessionEvent`] whenever a session is created,
//! revived, destroyed or swept. Listeners live in an [`EventRegistry`] owned
//! by the manager; with no listeners registered, dispatch does nothing.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use latchkey::events::{EventRegistry, listeners::LoggingListener};
//! use latchkey::SessionManager;
//!
//! let mut events = EventRegistry::new();
//! events.listen(LoggingListener::new());
//!
//! let manager = SessionManager::with_events(&providers, config, sessions, users, events)?;
//! ```

mod event;
mod listener;
mod registry;

pub mod listeners;

pub use event::SessionEvent;
pub use listener::Listener;
pub use registry::EventRegistry;
