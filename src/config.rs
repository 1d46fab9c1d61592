//! Client configuration
//!
//! Endpoints are supplied by the environment the dashboards are deployed in.

use std::time::Duration;

use url::Url;

use crate::{ClientError, Result};

/// Default storage key of the persisted session blob
pub const DEFAULT_SESSION_KEY: &str = "userData";

/// GraphQL client configuration.
///
/// The API endpoint is the only required field and is a constructor parameter.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    api_url: Url,
    ws_url: Option<Url>,
    site_url: Option<Url>,
    oauth_client_id: Option<String>,
    request_timeout: Option<Duration>,
    session_key: String,
}

impl ClientConfig {
    /// Create a config for the given GraphQL endpoint.
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            ws_url: None,
            site_url: None,
            oauth_client_id: None,
            request_timeout: None,
            session_key: DEFAULT_SESSION_KEY.to_string(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `API_URL`: GraphQL endpoint
    ///
    /// # Optional env vars
    /// - `WS_URL`: GraphQL subscriptions endpoint
    /// - `SITE_URL`: public URL of the dashboards
    /// - `OAUTH_CLIENT_ID`: OAuth client id used by social login
    /// - `REQUEST_TIMEOUT_SECS`: transport timeout, unset means none
    /// - `SESSION_KEY`: storage key of the session blob (default `userData`)
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if `API_URL` is missing or a value does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = lookup("API_URL")
            .ok_or_else(|| ClientError::Config("API_URL is required".into()))?;
        let mut config = Self::new(parse_url("API_URL", &api_url)?);

        if let Some(ws) = lookup("WS_URL") {
            config = config.with_ws_url(parse_url("WS_URL", &ws)?);
        }
        if let Some(site) = lookup("SITE_URL") {
            config = config.with_site_url(parse_url("SITE_URL", &site)?);
        }
        if let Some(client_id) = lookup("OAUTH_CLIENT_ID") {
            config = config.with_oauth_client_id(client_id);
        }
        if let Some(secs) = lookup("REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| ClientError::Config(format!("REQUEST_TIMEOUT_SECS: {e}")))?;
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(key) = lookup("SESSION_KEY") {
            config = config.with_session_key(key);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_ws_url(mut self, url: Url) -> Self {
        self.ws_url = Some(url);
        self
    }

    #[must_use]
    pub fn with_site_url(mut self, url: Url) -> Self {
        self.site_url = Some(url);
        self
    }

    #[must_use]
    pub fn with_oauth_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.oauth_client_id = Some(client_id.into());
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = key.into();
        self
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn ws_url(&self) -> Option<&Url> {
        self.ws_url.as_ref()
    }

    pub fn site_url(&self) -> Option<&Url> {
        self.site_url.as_ref()
    }

    pub fn oauth_client_id(&self) -> Option<&str> {
        self.oauth_client_id.as_deref()
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }
}

fn parse_url(name: &str, value: &str) -> Result<Url> {
    value
        .parse()
        .map_err(|e| ClientError::Config(format!("{name}: {e}")))
}
