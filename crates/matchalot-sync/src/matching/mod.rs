//! Matching WebSocket bound to the signed-in user.
//!
//! Every `connect()` re-resolves the session identity before dialing, because
//! the socket URL carries the user id and the session may have changed since
//! the last attempt. Outbound commands are fire-and-forget: while the socket is
//! not connected they are refused, never queued.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, COOKIE};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::api::ApiClient;
use crate::connection::{ChannelError, ConnectionSlot, ConnectionStatus};
use crate::error::{SyncError, SyncResult};
use crate::identity::{IdentityProvider, SessionUser};

mod envelope;

pub use envelope::{MatchAction, MatchCommand, MatchEvent, MatchRequest, MatchResponse};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchState {
    pub status: ConnectionStatus,
    /// Oldest first, in arrival order.
    pub events: Vec<MatchEvent>,
    pub error: Option<ChannelError>,
    /// Identity used for the most recent successful resolution.
    pub user: Option<SessionUser>,
}

#[derive(Clone)]
pub struct MatchChannel {
    inner: Arc<Inner>,
}

struct Inner {
    identity: Arc<dyn IdentityProvider>,
    api: ApiClient,
    ws_url: Url,
    reconnect_delay: Duration,
    state: watch::Sender<MatchState>,
    slot: Mutex<ConnectionSlot>,
    outbound: Mutex<Option<Outbound>>,
}

struct Outbound {
    generation: u64,
    tx: mpsc::UnboundedSender<String>,
}

impl MatchChannel {
    /// Uses `api` both for the session cookie and for identity resolution.
    pub fn new(api: ApiClient) -> Self {
        let identity: Arc<dyn IdentityProvider> = Arc::new(api.clone());
        Self::with_identity(api, identity)
    }

    pub fn with_identity(api: ApiClient, identity: Arc<dyn IdentityProvider>) -> Self {
        let ws_url = api.config().match_ws_url.clone();
        let reconnect_delay = api.config().reconnect_delay;
        let (state, _) = watch::channel(MatchState::default());
        Self {
            inner: Arc::new(Inner {
                identity,
                api,
                ws_url,
                reconnect_delay,
                state,
                slot: Mutex::new(ConnectionSlot::default()),
                outbound: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<MatchState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> MatchState {
        self.inner.state.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.borrow().status
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.inner.state.borrow().user.clone()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.inner.slot.lock().has_pending_reconnect()
    }

    /// Resolves the current user, then replaces any existing socket with a new one.
    ///
    /// Returns once the dial has been started; observe [`MatchState::status`] for the
    /// outcome. An identity failure is returned here and does not schedule a reconnect.
    pub async fn connect(&self) -> SyncResult<()> {
        self.inner.connect().await
    }

    /// Serializes and transmits `command` if the socket is connected.
    pub fn send(&self, command: &MatchCommand) -> SyncResult<()> {
        self.inner.send(command)
    }

    pub fn request_match(
        &self,
        material_id: i64,
        receiver_id: i64,
        requester_material_id: i64,
    ) -> SyncResult<()> {
        self.send(&MatchCommand::MatchRequest(MatchRequest {
            material_id,
            receiver_id,
            requester_material_id,
        }))
    }

    pub fn accept_match(&self, match_id: i64) -> SyncResult<()> {
        self.send(&MatchCommand::respond(match_id, MatchAction::Accept))
    }

    pub fn reject_match(&self, match_id: i64) -> SyncResult<()> {
        self.send(&MatchCommand::respond(match_id, MatchAction::Reject))
    }

    pub fn complete_match(&self, match_id: i64) -> SyncResult<()> {
        self.send(&MatchCommand::respond(match_id, MatchAction::Complete))
    }

    pub fn clear_events(&self) {
        self.inner.state.send_modify(|state| state.events.clear());
    }

    /// Removes the event at `index`; out-of-range indices are ignored.
    pub fn remove_event(&self, index: usize) {
        self.inner.state.send_if_modified(|state| {
            if index < state.events.len() {
                state.events.remove(index);
                true
            } else {
                false
            }
        });
    }

    /// Closes the socket and cancels a pending reconnect. The channel cannot be reused.
    pub fn teardown(&self) {
        self.inner.slot.lock().teardown();
        self.inner.outbound.lock().take();
        self.inner.state.send_modify(|state| {
            state.status = ConnectionStatus::Disconnected;
        });
        info!(target = "matchalot::matching", "match channel torn down");
    }
}

impl Inner {
    async fn connect(self: &Arc<Self>) -> SyncResult<()> {
        if self.slot.lock().is_torn_down() {
            return Err(SyncError::TornDown);
        }

        let user = match self.identity.current_user().await {
            Ok(user) => user,
            Err(err) => {
                warn!(
                    target = "matchalot::matching",
                    error = %err,
                    "cannot resolve current user; match socket not opened"
                );
                if !self.slot.lock().is_torn_down() {
                    self.state.send_modify(|state| {
                        state.error = Some(ChannelError::new(
                            "could not load your account; sign in and try again",
                        ));
                    });
                }
                return Err(SyncError::Identity(err.to_string()));
            }
        };

        let request = self.handshake_request(&user)?;

        let Some(generation) = self.slot.lock().begin() else {
            return Err(SyncError::TornDown);
        };
        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock() = Some(Outbound { generation, tx });
        self.state.send_modify(|state| {
            state.status = ConnectionStatus::Connecting;
            state.user = Some(user.clone());
        });
        debug!(
            target = "matchalot::matching",
            generation,
            user_id = user.id,
            url = %self.ws_url,
            "opening match socket"
        );

        let task = tokio::spawn(run_socket(Arc::downgrade(self), generation, request, rx));
        self.slot.lock().install(generation, task);
        Ok(())
    }

    fn handshake_request(&self, user: &SessionUser) -> SyncResult<Request> {
        let mut url = self.ws_url.clone();
        url.query_pairs_mut()
            .append_pair("userId", &user.id.to_string());
        let mut request = url.as_str().into_client_request()?;
        if let Some(cookie) = self.api.cookie_header(&self.api.config().api_url) {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    request.headers_mut().insert(COOKIE, value);
                }
                Err(err) => {
                    warn!(target = "matchalot::matching", error = %err, "session cookie not usable in handshake");
                }
            }
        }
        Ok(request)
    }

    fn send(&self, command: &MatchCommand) -> SyncResult<()> {
        if self.slot.lock().is_torn_down() {
            return Err(SyncError::TornDown);
        }
        let text = serde_json::to_string(command)?;
        let connected = self.state.borrow().status.is_connected();
        let delivered = connected
            && self
                .outbound
                .lock()
                .as_ref()
                .map(|outbound| outbound.tx.send(text).is_ok())
                .unwrap_or(false);
        if delivered {
            debug!(target = "matchalot::matching", ?command, "match command sent");
            return Ok(());
        }

        warn!(target = "matchalot::matching", ?command, "match socket not connected; command dropped");
        self.state.send_modify(|state| {
            state.error = Some(ChannelError::new(
                "not connected to the match server; please try again",
            ));
        });
        Err(SyncError::NotConnected)
    }

    fn on_open(&self, generation: u64) -> bool {
        if !self.slot.lock().is_current(generation) {
            return false;
        }
        info!(target = "matchalot::matching", generation, "match socket connected");
        self.state.send_modify(|state| {
            state.status = ConnectionStatus::Connected;
            state.error = None;
        });
        true
    }

    fn on_text(&self, generation: u64, text: &str) {
        if !self.slot.lock().is_current(generation) {
            return;
        }
        match MatchEvent::parse(text) {
            Ok(event) => {
                debug!(target = "matchalot::matching", kind = %event.kind, "match event received");
                self.state.send_modify(|state| state.events.push(event));
            }
            Err(err) => {
                warn!(
                    target = "matchalot::matching",
                    error = %err,
                    len = text.len(),
                    "dropping malformed match frame"
                );
            }
        }
    }

    /// Reports a transport error. Reconnection is left to [`Inner::on_close`].
    fn on_error(&self, generation: u64, err: &tungstenite::Error) {
        if !self.slot.lock().is_current(generation) {
            return;
        }
        warn!(target = "matchalot::matching", error = %err, "match socket error");
        self.state.send_modify(|state| {
            state.error = Some(ChannelError::new(
                "a match server connection error occurred",
            ));
        });
    }

    fn on_close(self: &Arc<Self>, generation: u64) {
        if !self.slot.lock().is_current(generation) {
            return;
        }
        {
            let mut outbound = self.outbound.lock();
            if outbound.as_ref().map(|o| o.generation) == Some(generation) {
                outbound.take();
            }
        }
        info!(
            target = "matchalot::matching",
            delay_ms = self.reconnect_delay.as_millis() as u64,
            "match socket closed; scheduling reconnect"
        );
        self.state.send_modify(|state| state.status = ConnectionStatus::Disconnected);
        self.schedule_reconnect(generation);
    }

    fn schedule_reconnect(self: &Arc<Self>, generation: u64) {
        let weak = Arc::downgrade(self);
        let delay = self.reconnect_delay;
        let mut slot = self.slot.lock();
        if !slot.is_current(generation) || slot.has_pending_reconnect() {
            return;
        }
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(channel) = weak.upgrade() else {
                return;
            };
            if !channel.slot.lock().claim_reconnect(generation) {
                return;
            }
            if channel.state.borrow().status.is_connected() {
                return;
            }
            info!(target = "matchalot::matching", "reconnecting match socket");
            if let Err(err) = channel.connect().await {
                debug!(target = "matchalot::matching", error = %err, "reconnect attempt failed");
            }
        });
        slot.arm_reconnect(generation, timer);
    }
}

async fn run_socket(
    channel: Weak<Inner>,
    generation: u64,
    request: Request,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let stream = match connect_async(request).await {
        Ok((stream, _)) => stream,
        Err(err) => {
            if let Some(inner) = channel.upgrade() {
                inner.on_error(generation, &err);
                inner.on_close(generation);
            }
            return;
        }
    };
    match channel.upgrade() {
        Some(inner) if inner.on_open(generation) => {}
        _ => return,
    }

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            next = outbound.recv() => {
                let Some(text) = next else { break };
                if let Err(err) = write.send(Message::Text(text)).await {
                    if let Some(inner) = channel.upgrade() {
                        inner.on_error(generation, &err);
                    }
                    break;
                }
            }
            frame = read.next() => {
                let Some(inner) = channel.upgrade() else { break };
                match frame {
                    Some(Ok(Message::Text(text))) => inner.on_text(generation, &text),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => inner.on_text(generation, &text),
                        Err(_) => warn!(target = "matchalot::matching", "dropping non-utf8 match frame"),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        inner.on_error(generation, &err);
                        break;
                    }
                }
            }
        }
    }

    let _ = write.close().await;
    if let Some(inner) = channel.upgrade() {
        inner.on_close(generation);
    }
}
