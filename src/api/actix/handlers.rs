use actix_web::{HttpRequest, HttpResponse, web};

use super::context::ActixRequestContext;
use super::extractor::{SessionRejection, SessionUser};
use crate::api::{ErrorResponse, MessageResponse, SessionUserResponse};
use crate::{AuthUser, SessionManager, SessionRecordRepository, UserRepository};

/// Starts (or reuses) a session for an already authenticated `user` and
/// builds the response carrying the session cookie.
///
/// Call this from the application's login handler once credentials have
/// been checked.
///
/// # Errors
///
/// Returns a rejection that renders as 403 for deactivated users and 503
/// when the durable store is down.
pub async fn start_session<S, U>(
    req: &HttpRequest,
    manager: &SessionManager<S, U>,
    user: &AuthUser,
) -> Result<HttpResponse, SessionRejection>
where
    S: SessionRecordRepository + 'static,
    U: UserRepository + 'static,
{
    let mut ctx = ActixRequestContext::new(req);
    let session = manager.session_start(&mut ctx, user).await?;

    let mut response = HttpResponse::Ok();
    ctx.apply(&mut response);
    Ok(response.json(SessionUserResponse::from(session.snapshot())))
}

pub async fn session_logout<S, U>(
    req: HttpRequest,
    manager: web::Data<SessionManager<S, U>>,
) -> HttpResponse
where
    S: SessionRecordRepository + 'static,
    U: UserRepository + 'static,
{
    let mut ctx = ActixRequestContext::new(&req);
    let result = manager.session_destroy(&mut ctx).await;

    match result {
        Ok(()) => {
            let mut response = HttpResponse::Ok();
            ctx.apply(&mut response);
            response.json(MessageResponse {
                message: "Successfully logged out".to_owned(),
            })
        }
        Err(err) => {
            log::warn!(target: "latchkey", "msg=\"logout could not archive session\" error=\"{err}\"");
            let mut response = HttpResponse::ServiceUnavailable();
            ctx.apply(&mut response);
            response.json(ErrorResponse::from(err))
        }
    }
}

pub async fn session_me<S, U>(user: SessionUser<S, U>) -> HttpResponse
where
    S: SessionRecordRepository + 'static,
    U: UserRepository + 'static,
{
    HttpResponse::Ok().json(SessionUserResponse::from(user.snapshot()))
}
