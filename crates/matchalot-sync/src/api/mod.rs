//! HTTP client for the Match-a-lot REST API.
//!
//! Every request carries the session cookies. Mutating requests outside the
//! `/auth` tree also carry the CSRF token; a 403 on such a request invalidates
//! the token and replays the request exactly once.

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::csrf::{CsrfTokenCache, HttpTokenSource};
use crate::error::{SyncError, SyncResult};

pub mod admin;
pub mod analytics;
pub mod auth;
pub mod matches;
pub mod materials;
pub mod notifications;

/// Decoded body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Json(Value),
    Text(String),
}

impl ApiResponse {
    async fn from_response(response: Response) -> SyncResult<Self> {
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("application/json") || value.contains("+json"))
            .unwrap_or(false);
        let text = response.text().await?;
        if is_json && !text.trim().is_empty() {
            Ok(ApiResponse::Json(serde_json::from_str(&text)?))
        } else {
            Ok(ApiResponse::Text(text))
        }
    }

    /// JSON value of the body; plain text bodies become JSON strings, empty bodies `null`.
    pub fn into_value(self) -> Value {
        match self {
            ApiResponse::Json(value) => value,
            ApiResponse::Text(text) if text.is_empty() => Value::Null,
            ApiResponse::Text(text) => Value::String(text),
        }
    }

    pub fn into_typed<T: DeserializeOwned>(self) -> SyncResult<T> {
        match self {
            ApiResponse::Json(value) => Ok(serde_json::from_value(value)?),
            ApiResponse::Text(text) => Ok(serde_json::from_str(&text)?),
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: Arc<SyncConfig>,
    csrf: Arc<CsrfTokenCache>,
    jar: Arc<Jar>,
}

impl ApiClient {
    pub fn new(config: SyncConfig) -> SyncResult<Self> {
        let jar = Arc::new(Jar::default());
        if let Some(cookie) = config.session_cookie.as_deref() {
            jar.add_cookie_str(cookie, &config.api_url);
        }
        // No total timeout on the client: the notification stream shares it.
        let http = Client::builder()
            .cookie_provider(jar.clone())
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|err| SyncError::Config(err.to_string()))?;
        let source = HttpTokenSource::new(http.clone(), config.endpoint("/auth/csrf-token")?);
        let csrf = Arc::new(CsrfTokenCache::new(Arc::new(source)));
        Ok(Self {
            http,
            config: Arc::new(config),
            csrf,
            jar,
        })
    }

    /// Replaces the token cache, e.g. to share one cache between clients.
    pub fn with_csrf_cache(mut self, csrf: Arc<CsrfTokenCache>) -> Self {
        self.csrf = csrf;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn csrf(&self) -> &Arc<CsrfTokenCache> {
        &self.csrf
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// `Cookie` header value the jar would send to `url`.
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        self.jar
            .cookies(url)
            .and_then(|value| value.to_str().ok().map(str::to_owned))
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        headers: Option<HeaderMap>,
    ) -> SyncResult<ApiResponse> {
        let url = self.config.endpoint(path)?;
        let guarded = requires_csrf(&method, path);
        let mut retried = false;

        loop {
            let mut builder = self
                .http
                .request(method.clone(), url.clone())
                .timeout(self.config.request_timeout)
                .header(ACCEPT, "application/json");
            if let Some(headers) = &headers {
                builder = builder.headers(headers.clone());
            }
            if let Some(body) = body {
                builder = builder.json(body);
            }
            if guarded {
                if let Some(token) = self.csrf.get().await {
                    builder = builder.header(self.config.csrf_header.as_str(), token);
                }
            }

            let response = builder.send().await?;
            let status = response.status();
            debug!(
                target = "matchalot::api",
                %method,
                path,
                status = status.as_u16(),
                retried,
                "api response"
            );

            if status == StatusCode::UNAUTHORIZED {
                return Err(SyncError::Unauthorized);
            }
            if status == StatusCode::FORBIDDEN && guarded && !retried {
                warn!(
                    target = "matchalot::api",
                    %method,
                    path,
                    "request rejected; refreshing csrf token and retrying once"
                );
                self.csrf.invalidate();
                retried = true;
                continue;
            }
            // Only a guarded call that already replayed with a fresh token is a token rejection.
            if status == StatusCode::FORBIDDEN && retried {
                let body = response.text().await.unwrap_or_default();
                return Err(SyncError::Forbidden { body });
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SyncError::UnexpectedStatus { status, body });
            }
            return ApiResponse::from_response(response).await;
        }
    }

    pub async fn get(&self, path: &str) -> SyncResult<ApiResponse> {
        self.request(Method::GET, path, None, None).await
    }

    pub async fn post(&self, path: &str, body: Option<&Value>) -> SyncResult<ApiResponse> {
        self.request(Method::POST, path, body, None).await
    }

    pub async fn put(&self, path: &str, body: Option<&Value>) -> SyncResult<ApiResponse> {
        self.request(Method::PUT, path, body, None).await
    }

    pub async fn patch(&self, path: &str, body: Option<&Value>) -> SyncResult<ApiResponse> {
        self.request(Method::PATCH, path, body, None).await
    }

    pub async fn delete(&self, path: &str) -> SyncResult<ApiResponse> {
        self.request(Method::DELETE, path, None, None).await
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_url", &self.config.api_url.as_str())
            .field("csrf", &self.csrf)
            .finish()
    }
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn is_auth_path(path: &str) -> bool {
    let path = path.trim_start_matches('/');
    path == "auth" || path.starts_with("auth/") || path.starts_with("auth?")
}

pub(crate) fn requires_csrf(method: &Method, path: &str) -> bool {
    is_mutating(method) && !is_auth_path(path)
}

/// Appends `pairs` as a query string, skipping absent values.
pub(crate) fn with_query(path: &str, pairs: &[(&str, Option<String>)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (key, value) in pairs {
        if let Some(value) = value {
            serializer.append_pair(key, value);
            any = true;
        }
    }
    if !any {
        return path.to_string();
    }
    format!("{path}?{}", serializer.finish())
}
