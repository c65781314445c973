//! Client configuration
//!
//! Credentials and endpoint settings, loadable from the environment.

use std::env;
use std::fmt;
use std::time::Duration;

use crate::b2::B2Error;

/// B2 API URL for authorization (v3 for nested apiInfo structure)
pub const DEFAULT_AUTH_URL: &str = "https://api.backblazeb2.com/b2api/v3/b2_authorize_account";

/// HTTP client timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for the HTTP transport
#[derive(Clone)]
pub struct B2Config {
    /// B2 application key ID
    pub key_id: String,
    /// B2 application key
    pub key: String,
    /// Authorization endpoint
    pub auth_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl B2Config {
    pub fn new(key_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key: key.into(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Load configuration from the process environment
    ///
    /// Reads `B2_KEY_ID`, `B2_KEY`, and optionally `B2_AUTH_URL` and
    /// `B2_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, B2Error> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, B2Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key_id = lookup("B2_KEY_ID")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| B2Error::Config("B2_KEY_ID is not set".to_string()))?;
        let key = lookup("B2_KEY")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| B2Error::Config("B2_KEY is not set".to_string()))?;

        let mut config = Self::new(key_id, key);
        if let Some(url) = lookup("B2_AUTH_URL").filter(|v| !v.is_empty()) {
            config.auth_url = url;
        }
        if let Some(secs) = lookup("B2_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| B2Error::Config(format!("invalid B2_TIMEOUT_SECS: {}", secs)))?;
            config.request_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

// Keep the application key out of logs
impl fmt::Debug for B2Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("B2Config")
            .field("key_id", &self.key_id)
            .field("key", &"<redacted>")
            .field("auth_url", &self.auth_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
