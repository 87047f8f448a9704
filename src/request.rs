//! The slice of an HTTP request the session manager needs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// A cookie the manager wants set on the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub domain: Option<String>,
    pub http_only: bool,
    pub expires: DateTime<Utc>,
}

impl SessionCookie {
    /// Returns true if this cookie tells the client to drop the session.
    pub fn is_removal(&self) -> bool {
        self.value.is_empty()
    }
}

/// Access to the inbound request and the outbound cookie jar.
///
/// Implemented by [`RequestParts`] and, with the `actix` feature, by
/// `api::actix::ActixRequestContext`.
pub trait RequestContext: Send {
    /// Value of the cookie called `name`, if sent.
    fn cookie(&self, name: &str) -> Option<String>;

    /// Peer address as `ip:port` or a bare IP.
    fn remote_addr(&self) -> Option<String>;

    /// Queues a cookie for the response.
    fn set_cookie(&mut self, cookie: SessionCookie);
}

/// Plain request context for frameworks without an adapter, and tests.
#[derive(Debug, Clone, Default)]
pub struct RequestParts {
    cookies: HashMap<String, String>,
    remote_addr: Option<String>,
    issued: Vec<SessionCookie>,
}

impl RequestParts {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Cookies queued by the manager, in order.
    pub fn issued_cookies(&self) -> &[SessionCookie] {
        &self.issued
    }

    /// The last cookie queued under `name`.
    pub fn issued_cookie(&self, name: &str) -> Option<&SessionCookie> {
        self.issued.iter().rev().find(|c| c.name == name)
    }

    pub fn take_issued_cookies(&mut self) -> Vec<SessionCookie> {
        std::mem::take(&mut self.issued)
    }
}

impl RequestContext for RequestParts {
    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.get(name).cloned()
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.clone()
    }

    fn set_cookie(&mut self, cookie: SessionCookie) {
        self.issued.push(cookie);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str, value: &str) -> SessionCookie {
        SessionCookie {
            name: name.to_owned(),
            value: value.to_owned(),
            path: "/".to_owned(),
            domain: None,
            http_only: true,
            expires: Utc::now(),
        }
    }

    #[test]
    fn test_request_parts_cookies() {
        let parts = RequestParts::new()
            .with_cookie("sid", "abc")
            .with_remote_addr("10.0.0.1:4000");

        assert_eq!(parts.cookie("sid").as_deref(), Some("abc"));
        assert_eq!(parts.cookie("other"), None);
        assert_eq!(parts.remote_addr().as_deref(), Some("10.0.0.1:4000"));
    }

    #[test]
    fn test_issued_cookie_returns_latest() {
        let mut parts = RequestParts::new();
        parts.set_cookie(cookie("sid", "first"));
        parts.set_cookie(cookie("sid", "second"));

        assert_eq!(parts.issued_cookies().len(), 2);
        assert_eq!(parts.issued_cookie("sid").unwrap().value, "second");

        let taken = parts.take_issued_cookies();
        assert_eq!(taken.len(), 2);
        assert!(parts.issued_cookies().is_empty());
    }

    #[test]
    fn test_removal_cookie() {
        assert!(cookie("sid", "").is_removal());
        assert!(!cookie("sid", "abc").is_removal());
    }
}
