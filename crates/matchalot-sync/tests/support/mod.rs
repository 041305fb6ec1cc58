//! In-process Match-a-lot backend used by the integration tests.
//!
//! Serves the REST endpoints the client touches, a controllable SSE stream and
//! the matching WebSocket, counting every connection and request so tests can
//! assert on what actually went over the wire.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering::SeqCst};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::header::COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout};
use tokio_stream::wrappers::UnboundedReceiverStream;
use url::Url;

use matchalot_sync::SyncConfig;

pub const USER_ID: i64 = 42;
pub const SESSION_COOKIE: &str = "SESSION=test-session";
const CSRF_HEADER: &str = "x-csrf-token";

type SseSender = mpsc::UnboundedSender<Result<Event, Infallible>>;

pub enum WsControl {
    Send(String),
    Close,
}

#[derive(Default)]
pub struct MockState {
    pub csrf_fetches: AtomicUsize,
    pub csrf_delay_ms: AtomicU64,
    pub fail_csrf: AtomicBool,
    pub me_calls: AtomicUsize,
    pub fail_me: AtomicBool,
    pub match_requests: AtomicUsize,
    /// Number of upcoming `POST /match/request` calls answered with 403.
    pub forbidden_responses: AtomicUsize,
    pub tokens_seen: Mutex<Vec<Option<String>>>,
    pub notifications: Mutex<Vec<Value>>,
    pub fail_mark_read: AtomicBool,
    pub fail_read_all: AtomicBool,
    /// Answer `DELETE /notifications/:id` with 409.
    pub fail_delete: AtomicBool,
    pub unread_count: AtomicU64,
    pub forbidden_reads: AtomicUsize,
    pub stats_resets: AtomicUsize,
    pub analytics_queries: Mutex<Vec<HashMap<String, String>>>,
    pub sse_connects: AtomicUsize,
    sse_streams: Mutex<Vec<SseSender>>,
    pub ws_connects: AtomicUsize,
    pub ws_live: AtomicUsize,
    pub ws_user_ids: Mutex<Vec<String>>,
    pub ws_cookies: Mutex<Vec<Option<String>>>,
    pub ws_frames: Mutex<Vec<String>>,
    ws_controls: Mutex<Vec<mpsc::UnboundedSender<WsControl>>>,
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockServer {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let router = Router::new()
            .route("/api/v1/auth/csrf-token", get(csrf_token))
            .route("/api/v1/auth/me", get(me))
            .route("/api/v1/auth/logout", post(logout))
            .route("/api/v1/match/request", post(match_request))
            .route("/api/v1/notifications", get(list_notifications))
            .route("/api/v1/notifications/stream", get(notification_stream))
            .route("/api/v1/notifications/unread-count", get(unread_count))
            .route("/api/v1/notifications/read-all", put(mark_all_read))
            .route("/api/v1/notifications/:id", delete(delete_notification))
            .route("/api/v1/notifications/:id/read", put(mark_read))
            .route("/api/v1/admin/users", get(admin_users))
            .route("/api/v1/analytics/hourly", get(hourly_stats))
            .route("/api/v1/analytics/users", get(user_stats))
            .route("/api/v1/analytics/reset", post(reset_stats))
            .route("/api/v1/teapot", get(teapot))
            .route("/api/v1/plain", get(plain_text))
            .route("/ws/match", get(match_socket))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn config(&self, reconnect_delay: Duration) -> SyncConfig {
        let api_url = Url::parse(&format!("http://{}", self.addr)).expect("api url");
        SyncConfig::new(api_url)
            .expect("config")
            .with_reconnect_delay(reconnect_delay)
            .with_session_cookie(SESSION_COOKIE)
    }

    pub fn set_notifications(&self, notifications: Vec<Value>) {
        *self.state.notifications.lock() = notifications;
    }

    /// Sends a `notification` event on every open stream.
    pub fn push_notification(&self, payload: &Value) {
        self.push_event("notification", payload.to_string());
    }

    pub fn push_event(&self, name: &str, data: String) {
        self.state
            .sse_streams
            .lock()
            .retain(|tx| tx.send(Ok(Event::default().event(name).data(&data))).is_ok());
    }

    /// Ends every open event stream from the server side.
    pub fn drop_streams(&self) {
        self.state.sse_streams.lock().clear();
    }

    pub fn ws_push(&self, text: &str) {
        self.state
            .ws_controls
            .lock()
            .retain(|tx| tx.send(WsControl::Send(text.to_string())).is_ok());
    }

    /// Sends a close frame on every open socket.
    pub fn ws_close_all(&self) {
        for tx in self.state.ws_controls.lock().drain(..) {
            let _ = tx.send(WsControl::Close);
        }
    }

    pub fn ws_frames(&self) -> Vec<String> {
        self.state.ws_frames.lock().clone()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub fn notification_json(id: i64, is_read: bool) -> Value {
    json!({
        "id": id,
        "type": "MATCH_REQUEST_RECEIVED",
        "title": format!("notification {id}"),
        "message": "someone wants to swap notes",
        "isRead": is_read,
        "createdAt": "2025-05-01T09:30:12",
        "relatedEntityId": id.to_string()
    })
}

pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let waited = timeout(Duration::from_secs(5), async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if waited.is_err() {
        panic!("timed out waiting for {what}");
    }
}

async fn csrf_token(State(state): State<Arc<MockState>>) -> Response {
    let n = state.csrf_fetches.fetch_add(1, SeqCst) + 1;
    let delay = state.csrf_delay_ms.load(SeqCst);
    if delay > 0 {
        sleep(Duration::from_millis(delay)).await;
    }
    if state.fail_csrf.load(SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({ "token": format!("token-{n}") })).into_response()
}

async fn me(State(state): State<Arc<MockState>>) -> Response {
    state.me_calls.fetch_add(1, SeqCst);
    if state.fail_me.load(SeqCst) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "Id": USER_ID,
        "nickname": "tester",
        "email": "tester@example.com",
        "trustScore": 50,
        "role": "USER"
    }))
    .into_response()
}

async fn logout() -> StatusCode {
    StatusCode::UNAUTHORIZED
}

async fn match_request(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.match_requests.fetch_add(1, SeqCst);
    let token = headers
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    state.tokens_seen.lock().push(token);

    let forbid = state
        .forbidden_responses
        .fetch_update(SeqCst, SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if forbid {
        return (StatusCode::FORBIDDEN, "invalid csrf token").into_response();
    }
    Json(json!({ "id": 900, "status": "PENDING", "request": body })).into_response()
}

async fn list_notifications(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<Value>> {
    let unread_only = params.get("unread").map(String::as_str) == Some("true");
    let notifications = state
        .notifications
        .lock()
        .iter()
        .filter(|n| !unread_only || n["isRead"] == json!(false))
        .cloned()
        .collect();
    Json(notifications)
}

async fn mark_read(State(state): State<Arc<MockState>>, Path(id): Path<i64>) -> StatusCode {
    if state.fail_mark_read.load(SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    for notification in state.notifications.lock().iter_mut() {
        if notification["id"] == json!(id) {
            notification["isRead"] = json!(true);
        }
    }
    StatusCode::OK
}

async fn mark_all_read(State(state): State<Arc<MockState>>) -> StatusCode {
    if state.fail_read_all.load(SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    for notification in state.notifications.lock().iter_mut() {
        notification["isRead"] = json!(true);
    }
    StatusCode::OK
}

async fn delete_notification(
    State(state): State<Arc<MockState>>,
    Path(id): Path<i64>,
) -> Response {
    if state.fail_delete.load(SeqCst) {
        return (StatusCode::CONFLICT, "notification is locked").into_response();
    }
    state.notifications.lock().retain(|n| n["id"] != json!(id));
    StatusCode::NO_CONTENT.into_response()
}

async fn unread_count(State(state): State<Arc<MockState>>) -> Json<Value> {
    Json(json!({ "unreadCount": state.unread_count.load(SeqCst) }))
}

/// Non-admin view of an admin route.
async fn admin_users(State(state): State<Arc<MockState>>) -> Response {
    state.forbidden_reads.fetch_add(1, SeqCst);
    (StatusCode::FORBIDDEN, "admin only").into_response()
}

async fn hourly_stats(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.analytics_queries.lock().push(params);
    Json(json!({ "peakHour": "14", "peakCount": 9 }))
}

async fn user_stats(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.analytics_queries.lock().push(params);
    Json(json!({ "topActiveUsers": {} }))
}

async fn reset_stats(State(state): State<Arc<MockState>>, headers: HeaderMap) -> StatusCode {
    state.stats_resets.fetch_add(1, SeqCst);
    let token = headers
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    state.tokens_seen.lock().push(token);
    StatusCode::OK
}

async fn teapot() -> Response {
    (StatusCode::IM_A_TEAPOT, "short and stout").into_response()
}

async fn plain_text() -> &'static str {
    "pong"
}

async fn notification_stream(
    State(state): State<Arc<MockState>>,
) -> Sse<UnboundedReceiverStream<Result<Event, Infallible>>> {
    state.sse_connects.fetch_add(1, SeqCst);
    let (tx, rx) = mpsc::unbounded_channel();
    state.sse_streams.lock().push(tx);
    Sse::new(UnboundedReceiverStream::new(rx))
        .keep_alive(KeepAlive::new().interval(Duration::from_millis(100)))
}

async fn match_socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.ws_connects.fetch_add(1, SeqCst);
    state
        .ws_user_ids
        .lock()
        .push(params.get("userId").cloned().unwrap_or_default());
    state.ws_cookies.lock().push(
        headers
            .get(COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned),
    );
    ws.on_upgrade(move |socket| serve_socket(state, socket))
}

async fn serve_socket(state: Arc<MockState>, mut socket: WebSocket) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.ws_controls.lock().push(tx);
    state.ws_live.fetch_add(1, SeqCst);
    loop {
        tokio::select! {
            control = rx.recv() => match control {
                Some(WsControl::Send(text)) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(WsControl::Close) | None => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => state.ws_frames.lock().push(text),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    state.ws_live.fetch_sub(1, SeqCst);
}
