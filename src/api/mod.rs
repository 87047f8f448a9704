//! HTTP framework integration.
//!
//! With the `actix` feature, [`actix`] provides a request context adapter,
//! a [`SessionUser`](actix::SessionUser) extractor and ready-made routes.

mod types;

pub use types::*;

pub mod actix;
