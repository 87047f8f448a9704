use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use actix_web::dev::Payload;
use actix_web::http::StatusCode;
use actix_web::{FromRequest, HttpRequest, HttpResponse, ResponseError, web};

use super::context::ActixRequestContext;
use crate::api::ErrorResponse;
use crate::{
    Permission, SessionError, SessionManager, SessionRecordRepository, SessionRef,
    SessionSnapshot, UserRepository,
};

/// Why a request was refused a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionRejection {
    /// No live or revivable session for the request.
    Unauthenticated,
    /// The session's permission is below the required level.
    Forbidden(Permission),
    /// The manager reported an error.
    Session(SessionError),
    /// No `SessionManager` registered as app data.
    Misconfigured,
}

impl std::fmt::Display for SessionRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionRejection::Unauthenticated => write!(f, "Authentication required"),
            SessionRejection::Forbidden(required) => {
                write!(f, "Requires {required:?} permission")
            }
            SessionRejection::Session(e) => write!(f, "{e}"),
            SessionRejection::Misconfigured => write!(f, "Session manager not configured"),
        }
    }
}

impl From<SessionError> for SessionRejection {
    fn from(err: SessionError) -> Self {
        SessionRejection::Session(err)
    }
}

impl ResponseError for SessionRejection {
    fn status_code(&self) -> StatusCode {
        match self {
            SessionRejection::Unauthenticated => StatusCode::UNAUTHORIZED,
            SessionRejection::Forbidden(_) | SessionRejection::Session(SessionError::InactiveUser(_)) => {
                StatusCode::FORBIDDEN
            }
            SessionRejection::Session(SessionError::StoreUnavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SessionRejection::Session(_) | SessionRejection::Misconfigured => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            SessionRejection::Session(e) => ErrorResponse::from(e.clone()),
            SessionRejection::Unauthenticated => ErrorResponse {
                error: self.to_string(),
                code: "UNAUTHENTICATED".to_owned(),
            },
            SessionRejection::Forbidden(_) => ErrorResponse {
                error: self.to_string(),
                code: "FORBIDDEN".to_owned(),
            },
            SessionRejection::Misconfigured => ErrorResponse {
                error: self.to_string(),
                code: "CONFIGURATION_ERROR".to_owned(),
            },
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

/// Extractor for the request's session. Rejects anonymous requests with 401.
///
/// Requires `web::Data<SessionManager<S, U>>` in app data.
pub struct SessionUser<S, U> {
    session: SessionRef,
    _marker: PhantomData<(S, U)>,
}

impl<S, U> SessionUser<S, U> {
    pub fn session(&self) -> &SessionRef {
        &self.session
    }

    pub fn into_inner(self) -> SessionRef {
        self.session
    }

    pub fn user_id(&self) -> i64 {
        self.session.user_id()
    }

    pub fn perm(&self) -> Permission {
        self.session.perm()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Fails with 403 unless the session holds at least `required`.
    pub fn require(&self, required: Permission) -> Result<(), SessionRejection> {
        if self.perm().allows(required) {
            Ok(())
        } else {
            log::debug!(
                target: "latchkey",
                "msg=\"permission denied\" user_id={} required={required:?}",
                self.user_id()
            );
            Err(SessionRejection::Forbidden(required))
        }
    }
}

impl<S, U> FromRequest for SessionUser<S, U>
where
    S: SessionRecordRepository + 'static,
    U: UserRepository + 'static,
{
    type Error = SessionRejection;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let manager = req.app_data::<web::Data<SessionManager<S, U>>>().cloned();
        let ctx = ActixRequestContext::new(req);

        Box::pin(async move {
            let manager = manager.ok_or_else(|| {
                log::error!(target: "latchkey", "msg=\"SessionManager not found in app data\"");
                SessionRejection::Misconfigured
            })?;

            let session = manager
                .session_get(&ctx)
                .await
                .ok_or(SessionRejection::Unauthenticated)?;

            Ok(SessionUser {
                session,
                _marker: PhantomData,
            })
        })
    }
}
