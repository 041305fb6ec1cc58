//! Server-sent notification stream.
//!
//! The channel owns one `EventSource` at a time, keeps a newest-first log plus
//! an unread counter, and reconnects after a fixed delay whenever the stream
//! errors or ends. Read/delete actions go through the CSRF-aware [`ApiClient`]
//! and only touch local state once the server has confirmed them.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::header::ACCEPT;
use reqwest_eventsource::retry::Never;
use reqwest_eventsource::{Event, EventSource};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::api::ApiClient;
use crate::connection::{ChannelError, ConnectionSlot, ConnectionStatus};
use crate::error::{SyncError, SyncResult};

pub mod model;
pub mod toast;

pub use model::{Notification, NotificationKind};
pub use toast::{FileShownIdStore, MemoryShownIdStore, ShownIdStore, ToastPresenter};

const STREAM_PATH: &str = "/notifications/stream";
const NOTIFICATION_EVENT: &str = "notification";
const HEARTBEAT_EVENT: &str = "heartbeat";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationState {
    pub status: ConnectionStatus,
    /// Newest first.
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
    pub error: Option<ChannelError>,
}

#[derive(Clone)]
pub struct NotificationChannel {
    inner: Arc<Inner>,
}

struct Inner {
    api: ApiClient,
    stream_url: Url,
    reconnect_delay: Duration,
    state: watch::Sender<NotificationState>,
    slot: Mutex<ConnectionSlot>,
}

impl NotificationChannel {
    pub fn new(api: ApiClient) -> SyncResult<Self> {
        let stream_url = api.config().endpoint(STREAM_PATH)?;
        let reconnect_delay = api.config().reconnect_delay;
        let (state, _) = watch::channel(NotificationState::default());
        Ok(Self {
            inner: Arc::new(Inner {
                api,
                stream_url,
                reconnect_delay,
                state,
                slot: Mutex::new(ConnectionSlot::default()),
            }),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<NotificationState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> NotificationState {
        self.inner.state.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.borrow().status
    }

    pub fn reconnect_pending(&self) -> bool {
        self.inner.slot.lock().has_pending_reconnect()
    }

    /// Opens the stream, closing any previous one first. Must run inside a Tokio runtime.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Closes the stream and cancels a pending reconnect. The channel cannot be reused.
    pub fn teardown(&self) {
        self.inner.slot.lock().teardown();
        self.inner.state.send_modify(|state| {
            state.status = ConnectionStatus::Disconnected;
        });
        info!(target = "matchalot::notifications", "notification channel torn down");
    }

    pub async fn fetch_all(&self, unread_only: bool) -> SyncResult<()> {
        let notifications = self
            .inner
            .api
            .list_notifications(unread_only)
            .await
            .map_err(|err| self.inner.record_failure("load notifications", err))?;
        self.inner.apply(|state| {
            state.unread_count = notifications.iter().filter(|n| !n.is_read).count() as u64;
            state.notifications = notifications;
        });
        Ok(())
    }

    pub async fn fetch_unread_count(&self) -> SyncResult<u64> {
        let count = self
            .inner
            .api
            .unread_notification_count()
            .await
            .map_err(|err| self.inner.record_failure("load unread count", err))?;
        self.inner.apply(|state| state.unread_count = count);
        Ok(count)
    }

    pub async fn mark_as_read(&self, id: i64) -> SyncResult<()> {
        self.inner
            .api
            .mark_notification_read(id)
            .await
            .map_err(|err| self.inner.record_failure("mark notification read", err))?;
        self.inner.apply(|state| {
            match state.notifications.iter_mut().find(|n| n.id == id) {
                Some(notification) if notification.is_read => {}
                Some(notification) => {
                    notification.is_read = true;
                    state.unread_count = state.unread_count.saturating_sub(1);
                }
                // Not in the local log; trust the server-side count we were given.
                None => state.unread_count = state.unread_count.saturating_sub(1),
            }
        });
        Ok(())
    }

    pub async fn mark_all_as_read(&self) -> SyncResult<()> {
        self.inner
            .api
            .mark_all_notifications_read()
            .await
            .map_err(|err| self.inner.record_failure("mark all notifications read", err))?;
        self.inner.apply(|state| {
            for notification in &mut state.notifications {
                notification.is_read = true;
            }
            state.unread_count = 0;
        });
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> SyncResult<()> {
        self.inner
            .api
            .delete_notification(id)
            .await
            .map_err(|err| self.inner.record_failure("delete notification", err))?;
        self.inner.apply(|state| {
            if let Some(index) = state.notifications.iter().position(|n| n.id == id) {
                let removed = state.notifications.remove(index);
                if !removed.is_read {
                    state.unread_count = state.unread_count.saturating_sub(1);
                }
            }
        });
        Ok(())
    }
}

impl Inner {
    fn connect(self: &Arc<Self>) {
        let Some(generation) = self.slot.lock().begin() else {
            debug!(target = "matchalot::notifications", "connect after teardown ignored");
            return;
        };

        let request = self
            .api
            .http()
            .get(self.stream_url.clone())
            .header(ACCEPT, "text/event-stream");
        let mut source = match EventSource::new(request) {
            Ok(source) => source,
            Err(err) => {
                warn!(
                    target = "matchalot::notifications",
                    error = ?err,
                    "cannot build notification stream request"
                );
                self.state.send_modify(|state| {
                    state.status = ConnectionStatus::Disconnected;
                    state.error = Some(ChannelError::new(format!(
                        "cannot open notification stream: {err:?}"
                    )));
                });
                return;
            }
        };
        // Reconnects are owned by this channel, not by the event source.
        source.set_retry_policy(Box::new(Never));

        self.state.send_modify(|state| state.status = ConnectionStatus::Connecting);
        debug!(target = "matchalot::notifications", generation, url = %self.stream_url, "opening notification stream");

        let task = tokio::spawn(run_stream(Arc::downgrade(self), generation, source));
        self.slot.lock().install(generation, task);
    }

    fn on_open(&self) {
        info!(target = "matchalot::notifications", "notification stream connected");
        self.state.send_modify(|state| {
            state.status = ConnectionStatus::Connected;
            state.error = None;
        });
    }

    fn on_message(&self, event: &str, data: &str) {
        match event {
            NOTIFICATION_EVENT => match serde_json::from_str::<Notification>(data) {
                Ok(notification) => {
                    debug!(
                        target = "matchalot::notifications",
                        id = notification.id,
                        kind = ?notification.kind,
                        "notification received"
                    );
                    self.state.send_modify(|state| {
                        state.notifications.insert(0, notification);
                        state.unread_count += 1;
                    });
                }
                Err(err) => {
                    warn!(
                        target = "matchalot::notifications",
                        error = %err,
                        "dropping malformed notification event"
                    );
                }
            },
            HEARTBEAT_EVENT => {
                trace!(target = "matchalot::notifications", "heartbeat");
            }
            other => {
                debug!(target = "matchalot::notifications", event = other, "ignoring unknown event");
            }
        }
    }

    fn on_drop(self: &Arc<Self>, generation: u64, reason: String) {
        if !self.slot.lock().is_current(generation) {
            return;
        }
        warn!(
            target = "matchalot::notifications",
            reason = %reason,
            delay_ms = self.reconnect_delay.as_millis() as u64,
            "notification stream dropped; scheduling reconnect"
        );
        self.state.send_modify(|state| {
            state.status = ConnectionStatus::Disconnected;
            state.error = Some(ChannelError::new(format!(
                "notification stream disconnected: {reason}"
            )));
        });
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
            info!(target = "matchalot::notifications", "reconnecting notification stream");
            channel.connect();
        });
        slot.arm_reconnect(generation, timer);
    }

    fn apply(&self, update: impl FnOnce(&mut NotificationState)) {
        if self.slot.lock().is_torn_down() {
            debug!(target = "matchalot::notifications", "discarding result after teardown");
            return;
        }
        self.state.send_modify(update);
    }

    fn record_failure(&self, action: &str, err: SyncError) -> SyncError {
        warn!(target = "matchalot::notifications", action, error = %err, "notification request failed");
        if !self.slot.lock().is_torn_down() {
            let message = format!("failed to {action}: {err}");
            self.state.send_modify(|state| state.error = Some(ChannelError::new(message)));
        }
        err
    }
}

async fn run_stream(channel: Weak<Inner>, generation: u64, mut source: EventSource) {
    while let Some(event) = source.next().await {
        let Some(inner) = channel.upgrade() else {
            break;
        };
        if !inner.slot.lock().is_current(generation) {
            break;
        }
        match event {
            Ok(Event::Open) => inner.on_open(),
            Ok(Event::Message(message)) => inner.on_message(&message.event, &message.data),
            Err(err) => {
                source.close();
                inner.on_drop(generation, err.to_string());
                return;
            }
        }
    }
    source.close();
    if let Some(inner) = channel.upgrade() {
        inner.on_drop(generation, "stream ended".to_string());
    }
}
