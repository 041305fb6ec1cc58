//! Anti-forgery token cache with single-flight fetching.
//!
//! At most one fetch is in flight: concurrent callers share the same pending
//! future. A failed fetch resolves to `None` and logs a warning instead of
//! failing the caller, so mutating requests are still attempted without the
//! header and the server decides whether the token was required.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::SyncResult;

#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> SyncResult<String>;
}

/// Fetches tokens from `GET {prefix}/auth/csrf-token`, sharing the session cookie jar.
#[derive(Debug, Clone)]
pub struct HttpTokenSource {
    http: reqwest::Client,
    url: Url,
}

#[derive(Debug, Deserialize)]
struct CsrfTokenBody {
    #[serde(default)]
    token: String,
}

impl HttpTokenSource {
    pub fn new(http: reqwest::Client, url: Url) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch_token(&self) -> SyncResult<String> {
        let body = self
            .http
            .get(self.url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .json::<CsrfTokenBody>()
            .await?;
        Ok(body.token)
    }
}

type PendingFetch = Shared<BoxFuture<'static, Option<String>>>;

enum Slot {
    Empty,
    Pending { epoch: u64, fetch: PendingFetch },
    Ready(String),
}

struct CacheState {
    slot: Slot,
    /// Bumped on every invalidation; fetches started under an older epoch never repopulate the slot.
    epoch: u64,
}

pub struct CsrfTokenCache {
    source: Arc<dyn TokenSource>,
    state: Mutex<CacheState>,
}

impl CsrfTokenCache {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            state: Mutex::new(CacheState {
                slot: Slot::Empty,
                epoch: 0,
            }),
        }
    }

    /// Returns the cached token, joining or starting a fetch when none is cached.
    pub async fn get(&self) -> Option<String> {
        let (epoch, fetch) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            match &state.slot {
                Slot::Ready(token) => return Some(token.clone()),
                Slot::Pending { epoch, fetch } => (*epoch, fetch.clone()),
                Slot::Empty => {
                    let fetch = self.start_fetch();
                    state.slot = Slot::Pending {
                        epoch: state.epoch,
                        fetch: fetch.clone(),
                    };
                    (state.epoch, fetch)
                }
            }
        };

        let token = fetch.await;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.epoch == epoch && matches!(state.slot, Slot::Pending { .. }) {
            state.slot = match &token {
                Some(token) => Slot::Ready(token.clone()),
                None => Slot::Empty,
            };
        }
        token
    }

    /// Drops the cached token and forgets any pending fetch. Does not refetch.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.epoch += 1;
        state.slot = Slot::Empty;
        debug!(target = "matchalot::csrf", epoch = state.epoch, "csrf token invalidated");
    }

    /// Cached token without triggering a fetch.
    pub fn peek(&self) -> Option<String> {
        match &self.state.lock().slot {
            Slot::Ready(token) => Some(token.clone()),
            _ => None,
        }
    }

    fn start_fetch(&self) -> PendingFetch {
        let source = Arc::clone(&self.source);
        async move {
            match source.fetch_token().await {
                Ok(token) if !token.is_empty() => {
                    debug!(target = "matchalot::csrf", "csrf token fetched");
                    Some(token)
                }
                Ok(_) => {
                    warn!(target = "matchalot::csrf", "csrf endpoint returned an empty token");
                    None
                }
                Err(err) => {
                    warn!(
                        target = "matchalot::csrf",
                        error = %err,
                        "failed to fetch csrf token; continuing without it"
                    );
                    None
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl std::fmt::Debug for CsrfTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfTokenCache")
            .field("cached", &self.peek().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSource {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingSource {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self) -> SyncResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(SyncError::Config("csrf endpoint down".into()));
            }
            Ok(format!("token-{n}"))
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let source = CountingSource::new(Duration::from_millis(50));
        let cache = CsrfTokenCache::new(source.clone());

        let results = futures::future::join_all((0..8).map(|_| cache.get())).await;

        assert_eq!(source.calls(), 1);
        assert!(results.iter().all(|t| t.as_deref() == Some("token-1")));
        assert_eq!(cache.peek().as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn cached_token_is_reused_until_invalidated() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = CsrfTokenCache::new(source.clone());

        assert_eq!(cache.get().await.as_deref(), Some("token-1"));
        assert_eq!(cache.get().await.as_deref(), Some("token-1"));
        assert_eq!(source.calls(), 1);

        cache.invalidate();
        assert!(cache.peek().is_none());
        assert_eq!(source.calls(), 1, "invalidate must not refetch by itself");

        assert_eq!(cache.get().await.as_deref(), Some("token-2"));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn invalidate_during_fetch_discards_result() {
        let source = CountingSource::new(Duration::from_millis(30));
        let cache = Arc::new(CsrfTokenCache::new(source.clone()));

        let early = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.invalidate();

        let fresh = cache.get().await;
        let _ = early.await.unwrap();

        assert_eq!(fresh.as_deref(), Some("token-2"));
        assert_eq!(cache.peek().as_deref(), Some("token-2"));
    }

    #[tokio::test]
    async fn failed_fetch_yields_none_and_is_not_cached() {
        let source = CountingSource::failing();
        let cache = CsrfTokenCache::new(source.clone());

        assert!(cache.get().await.is_none());
        assert!(cache.get().await.is_none());
        assert_eq!(source.calls(), 2);
    }
}
