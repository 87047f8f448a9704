//! Durable store traits and data types.
//!
//! The session manager only talks to the relational store through these
//! traits. Implement them to back sessions with your own database.
//!
//! # Traits
//!
//! | Trait | Description |
//! |-------|-------------|
//! | [`SessionRecordRepository`] | Committed session rows: lookup, insert, archive |
//! | [`UserRepository`] | User lookup by id for session revival |
//!
//! # Data Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SessionRecord`] | A persisted session row |
//! | [`AuthUser`] | The user attributes a session denormalizes |
//!
//! # Mock Implementations
//!
//! Enable the `mocks` feature for in-memory implementations useful for testing:
//!
//! - [`MockSessionRecordRepository`]
//! - [`MockUserRepository`]

mod session_record;
mod user;

#[cfg(any(test, feature = "mocks"))]
mod session_record_mock;
#[cfg(any(test, feature = "mocks"))]
mod user_mock;

pub use session_record::SessionRecord;
pub use session_record::SessionRecordRepository;
pub use session_record::flags;
pub use user::AuthUser;
pub use user::UserRepository;

#[cfg(any(test, feature = "mocks"))]
pub use session_record_mock::MockSessionRecordRepository;
#[cfg(any(test, feature = "mocks"))]
pub use user_mock::MockUserRepository;
