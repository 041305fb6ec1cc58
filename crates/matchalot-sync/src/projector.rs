//! Read-only view over both channels.
//!
//! The projector holds no state of its own: every [`ConnectionProjector::snapshot`]
//! is derived from the channels' current watch values, so it can never lag behind them.

use tokio::sync::watch;

use crate::connection::ChannelError;
use crate::matching::{MatchChannel, MatchEvent, MatchState};
use crate::notifications::{Notification, NotificationChannel, NotificationState};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionView {
    pub notifications_connected: bool,
    pub match_connected: bool,
    pub unread_count: u64,
    /// Newest first.
    pub notifications: Vec<Notification>,
    pub match_events: Vec<MatchEvent>,
    /// Most recent error raised by either channel.
    pub error: Option<String>,
}

pub struct ConnectionProjector {
    notifications: watch::Receiver<NotificationState>,
    matching: watch::Receiver<MatchState>,
}

impl ConnectionProjector {
    pub fn new(notifications: &NotificationChannel, matching: &MatchChannel) -> Self {
        Self::from_receivers(notifications.subscribe(), matching.subscribe())
    }

    pub fn from_receivers(
        notifications: watch::Receiver<NotificationState>,
        matching: watch::Receiver<MatchState>,
    ) -> Self {
        Self {
            notifications,
            matching,
        }
    }

    pub fn snapshot(&self) -> ConnectionView {
        let notifications = self.notifications.borrow();
        let matching = self.matching.borrow();
        project(&notifications, &matching)
    }

    /// Waits until either channel publishes a new state. Returns `false` once both
    /// channels have been dropped.
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            result = self.notifications.changed() => {
                result.is_ok() || self.matching.changed().await.is_ok()
            }
            result = self.matching.changed() => {
                result.is_ok() || self.notifications.changed().await.is_ok()
            }
        }
    }
}

fn project(notifications: &NotificationState, matching: &MatchState) -> ConnectionView {
    ConnectionView {
        notifications_connected: notifications.status.is_connected(),
        match_connected: matching.status.is_connected(),
        unread_count: notifications.unread_count,
        notifications: notifications.notifications.clone(),
        match_events: matching.events.clone(),
        error: latest_error(notifications.error.as_ref(), matching.error.as_ref())
            .map(|err| err.message.clone()),
    }
}

fn latest_error<'a>(
    left: Option<&'a ChannelError>,
    right: Option<&'a ChannelError>,
) -> Option<&'a ChannelError> {
    match (left, right) {
        (Some(a), Some(b)) => Some(if b.raised_at >= a.raised_at { b } else { a }),
        (a, b) => a.or(b),
    }
}
