use serde::Serialize;

use crate::{Permission, SessionError, SessionSnapshot};

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Public view of a session's owner.
#[derive(Debug, Serialize)]
pub struct SessionUserResponse {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub perm: Permission,
}

impl From<SessionSnapshot> for SessionUserResponse {
    fn from(snapshot: SessionSnapshot) -> Self {
        SessionUserResponse {
            user_id: snapshot.user_id,
            name: snapshot.name,
            email: snapshot.email,
            perm: snapshot.perm,
        }
    }
}

impl From<SessionError> for ErrorResponse {
    fn from(err: SessionError) -> Self {
        let code = match &err {
            SessionError::ProviderNotRegistered(_) => "PROVIDER_NOT_REGISTERED",
            SessionError::DuplicateProviderRegistration(_) => "DUPLICATE_PROVIDER",
            SessionError::InvalidProviderName => "INVALID_PROVIDER_NAME",
            SessionError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            SessionError::InactiveUser(_) => "INACTIVE_USER",
            SessionError::InvalidConfiguration(_) => "CONFIGURATION_ERROR",
        };

        ErrorResponse {
            error: err.to_string(),
            code: code.to_owned(),
        }
    }
}
