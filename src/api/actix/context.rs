use std::collections::HashMap;

use actix_web::cookie::Cookie;
use actix_web::cookie::time::{Duration as CookieDuration, OffsetDateTime};
use actix_web::{HttpRequest, HttpResponseBuilder};

use crate::{RequestContext, SessionCookie};

/// [`RequestContext`] built from an actix request.
///
/// Copies the cookies and peer address out of the request so the context
/// can be held across awaits. Cookies queued by the manager are written to
/// the response with [`apply`](Self::apply).
#[derive(Debug, Default)]
pub struct ActixRequestContext {
    cookies: HashMap<String, String>,
    remote_addr: Option<String>,
    issued: Vec<SessionCookie>,
}

impl ActixRequestContext {
    pub fn new(req: &HttpRequest) -> Self {
        let cookies = req
            .cookies()
            .map(|jar| {
                jar.iter()
                    .map(|c| (c.name().to_owned(), c.value().to_owned()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            cookies,
            remote_addr: req.peer_addr().map(|addr| addr.to_string()),
            issued: Vec::new(),
        }
    }

    pub fn issued_cookies(&self) -> &[SessionCookie] {
        &self.issued
    }

    /// Writes queued cookies to `response`.
    pub fn apply(&self, response: &mut HttpResponseBuilder) {
        for cookie in &self.issued {
            response.cookie(to_actix_cookie(cookie));
        }
    }
}

impl RequestContext for ActixRequestContext {
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

pub fn to_actix_cookie(cookie: &SessionCookie) -> Cookie<'static> {
    let mut builder = Cookie::build(cookie.name.clone(), cookie.value.clone())
        .path(cookie.path.clone())
        .http_only(cookie.http_only);

    if let Ok(expires) = OffsetDateTime::from_unix_timestamp(cookie.expires.timestamp()) {
        builder = builder.expires(expires);
    }

    let mut out = builder.finish();

    if let Some(domain) = &cookie.domain {
        out.set_domain(domain.clone());
    }
    if cookie.is_removal() {
        out.set_max_age(CookieDuration::ZERO);
    }

    out
}
