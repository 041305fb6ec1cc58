use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{SyncError, SyncResult};

const DEFAULT_API_URL: &str = "http://localhost:8080";
const DEFAULT_API_PREFIX: &str = "/api/v1";
const DEFAULT_MATCH_PATH: &str = "/ws/match";
const DEFAULT_CSRF_HEADER: &str = "X-CSRF-Token";
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Match-a-lot client configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Origin of the REST API, e.g. `https://api.match-a-lot.store`
    pub api_url: Url,
    /// Path prefix prepended to every endpoint
    pub api_prefix: String,
    /// Matching WebSocket endpoint; the user id is appended as `userId`
    pub match_ws_url: Url,
    /// Fixed delay before either channel reconnects
    pub reconnect_delay: Duration,
    pub request_timeout: Duration,
    /// Header carrying the anti-forgery token on mutating requests
    pub csrf_header: String,
    /// Optional `name=value` cookie seeded into the jar (CLI sessions)
    pub session_cookie: Option<String>,
}

impl SyncConfig {
    pub fn new(api_url: Url) -> SyncResult<Self> {
        let match_ws_url = derive_ws_url(&api_url)?;
        Ok(Self {
            api_url,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            match_ws_url,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            csrf_header: DEFAULT_CSRF_HEADER.to_string(),
            session_cookie: None,
        })
    }

    /// Load configuration from `MATCHALOT_*` environment variables
    pub fn from_env() -> SyncResult<Self> {
        let api_url = env::var("MATCHALOT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let api_url = Url::parse(&api_url)
            .map_err(|err| SyncError::Config(format!("invalid MATCHALOT_API_URL: {err}")))?;
        let mut config = Self::new(api_url)?;

        if let Some(prefix) = non_empty_var("MATCHALOT_API_PREFIX") {
            config.api_prefix = prefix;
        }
        if let Some(ws) = non_empty_var("MATCHALOT_WS_URL") {
            config.match_ws_url = Url::parse(&ws)
                .map_err(|err| SyncError::Config(format!("invalid MATCHALOT_WS_URL: {err}")))?;
        }
        if let Some(ms) = non_empty_var("MATCHALOT_RECONNECT_MS") {
            let ms: u64 = ms.parse().map_err(|err| {
                SyncError::Config(format!("invalid MATCHALOT_RECONNECT_MS '{ms}': {err}"))
            })?;
            config.reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = non_empty_var("MATCHALOT_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|err| {
                SyncError::Config(format!(
                    "invalid MATCHALOT_REQUEST_TIMEOUT_SECS '{secs}': {err}"
                ))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(header) = non_empty_var("MATCHALOT_CSRF_HEADER") {
            config.csrf_header = header;
        }
        config.session_cookie = non_empty_var("MATCHALOT_SESSION_COOKIE");
        Ok(config)
    }

    /// Points the client at another API origin. The match socket URL is re-derived from it.
    pub fn with_api_url(mut self, api_url: Url) -> SyncResult<Self> {
        self.match_ws_url = derive_ws_url(&api_url)?;
        self.api_url = api_url;
        Ok(self)
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_match_ws_url(mut self, url: Url) -> Self {
        self.match_ws_url = url;
        self
    }

    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    /// Resolve an endpoint path (e.g. `/notifications/stream`) against the API origin.
    pub fn endpoint(&self, path: &str) -> SyncResult<Url> {
        let prefix = self.api_prefix.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let joined = if prefix.is_empty() {
            format!("/{path}")
        } else if prefix.starts_with('/') {
            format!("{prefix}/{path}")
        } else {
            format!("/{prefix}/{path}")
        };
        Ok(self.api_url.join(&joined)?)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn derive_ws_url(api_url: &Url) -> SyncResult<Url> {
    let scheme = match api_url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(SyncError::Config(format!(
                "unsupported api url scheme '{other}'"
            )))
        }
    };
    let mut url = api_url.join(DEFAULT_MATCH_PATH)?;
    url.set_scheme(scheme)
        .map_err(|_| SyncError::Config(format!("cannot derive websocket url from {api_url}")))?;
    Ok(url)
}
