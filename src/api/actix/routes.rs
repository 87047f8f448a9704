use actix_web::web;

use super::handlers::{session_logout, session_me};
use crate::{SessionRecordRepository, UserRepository};

/// Mounts the session routes under `/session`.
///
/// # Routes
///
/// - `GET /session/me` - Owner of the current session
/// - `POST /session/logout` - Destroy the current session
///
/// Login is left to the application, which authenticates the user and
/// then calls [`start_session`](super::start_session).
pub fn session_routes<S, U>(cfg: &mut web::ServiceConfig)
where
    S: SessionRecordRepository + 'static,
    U: UserRepository + 'static,
{
    cfg.service(
        web::scope("/session")
            .route("/me", web::get().to(session_me::<S, U>))
            .route("/logout", web::post().to(session_logout::<S, U>)),
    );
}
