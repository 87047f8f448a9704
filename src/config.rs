//! Configuration for the session manager.
//!
//! # Example
//!
//! ```rust
//! use latchkey::SessionConfig;
//! use chrono::Duration;
//!
//! // Use defaults
//! let config = SessionConfig::default();
//!
//! // Or customize
//! let config = SessionConfig {
//!     cookie_name: "app_session".to_owned(),
//!     cookie_domain: Some("example.com".to_owned()),
//!     session_lifetime: Duration::hours(8),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use chrono::Duration;

use crate::SessionError;

/// Name of the provider registered by default.
pub const DEFAULT_PROVIDER: &str = "memory";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Name of the cookie carrying the session key.
    pub cookie_name: String,

    /// Optional `Domain` attribute for the cookie.
    pub cookie_domain: Option<String>,

    /// `Path` attribute for the cookie.
    ///
    /// Default: `/`
    pub cookie_path: String,

    /// Idle time after which a live session is swept, and the cookie
    /// expiry offset.
    ///
    /// Default: 24 hours
    pub session_lifetime: Duration,

    /// How often the background sweep runs.
    ///
    /// Default: 5 minutes
    pub gc_interval: Duration,

    /// Registered provider the manager should use.
    pub provider: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "latchkey_session".to_owned(),
            cookie_domain: None,
            cookie_path: "/".to_owned(),
            session_lifetime: Duration::hours(24),
            gc_interval: Duration::minutes(5),
            provider: DEFAULT_PROVIDER.to_owned(),
        }
    }
}

impl SessionConfig {
    /// Builds a configuration from `LATCHKEY_*` environment variables.
    ///
    /// Unset variables keep their default value.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `LATCHKEY_COOKIE_NAME` | `cookie_name` |
    /// | `LATCHKEY_COOKIE_DOMAIN` | `cookie_domain` |
    /// | `LATCHKEY_SESSION_LIFETIME_SECS` | `session_lifetime` |
    /// | `LATCHKEY_GC_INTERVAL_SECS` | `gc_interval` |
    /// | `LATCHKEY_PROVIDER` | `provider` |
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidConfiguration` if a numeric variable
    /// does not parse or the result fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, SessionError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SessionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("LATCHKEY_COOKIE_NAME") {
            config.cookie_name = name;
        }
        if let Some(domain) = lookup("LATCHKEY_COOKIE_DOMAIN") {
            config.cookie_domain = Some(domain).filter(|d| !d.is_empty());
        }
        if let Some(secs) = lookup("LATCHKEY_SESSION_LIFETIME_SECS") {
            config.session_lifetime = parse_seconds("LATCHKEY_SESSION_LIFETIME_SECS", &secs)?;
        }
        if let Some(secs) = lookup("LATCHKEY_GC_INTERVAL_SECS") {
            config.gc_interval = parse_seconds("LATCHKEY_GC_INTERVAL_SECS", &secs)?;
        }
        if let Some(provider) = lookup("LATCHKEY_PROVIDER") {
            config.provider = provider;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can drive a manager.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.cookie_name.is_empty() {
            return Err(SessionError::InvalidConfiguration(
                "cookie_name must not be empty".to_owned(),
            ));
        }
        if self.session_lifetime <= Duration::zero() {
            return Err(SessionError::InvalidConfiguration(
                "session_lifetime must be positive".to_owned(),
            ));
        }
        if self.gc_interval <= Duration::zero() {
            return Err(SessionError::InvalidConfiguration(
                "gc_interval must be positive".to_owned(),
            ));
        }
        if self.provider.is_empty() {
            return Err(SessionError::InvalidProviderName);
        }
        Ok(())
    }
}

fn parse_seconds(name: &str, value: &str) -> Result<Duration, SessionError> {
    value
        .trim()
        .parse::<i64>()
        .map(Duration::seconds)
        .map_err(|_| SessionError::InvalidConfiguration(format!("{name} is not a number: {value}")))
}
