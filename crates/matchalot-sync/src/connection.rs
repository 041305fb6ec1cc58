//! Connection bookkeeping shared by the notification and matching channels.
//!
//! Each channel owns exactly one [`ConnectionSlot`]. Every `connect()` opens a
//! new generation and aborts whatever the previous generation left running, so
//! events from a superseded socket can be recognised and discarded.

use std::time::Instant;

use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// Human-readable failure surfaced to the UI, stamped so the projector can pick the latest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelError {
    pub message: String,
    pub raised_at: Instant,
}

impl ChannelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            raised_at: Instant::now(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ConnectionSlot {
    generation: u64,
    task: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    torn_down: bool,
}

impl ConnectionSlot {
    /// Starts a new generation, closing the live connection and any pending reconnect.
    /// Returns `None` once the slot has been torn down.
    pub(crate) fn begin(&mut self) -> Option<u64> {
        if self.torn_down {
            return None;
        }
        self.abort_all();
        self.generation += 1;
        Some(self.generation)
    }

    pub(crate) fn install(&mut self, generation: u64, task: JoinHandle<()>) {
        if self.torn_down || generation != self.generation {
            task.abort();
            return;
        }
        if let Some(previous) = self.task.replace(task) {
            previous.abort();
        }
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        !self.torn_down && self.generation == generation
    }

    pub(crate) fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Records the pending reconnect for `generation`. At most one timer exists at a time.
    pub(crate) fn arm_reconnect(&mut self, generation: u64, timer: JoinHandle<()>) -> bool {
        if !self.is_current(generation) || self.reconnect.is_some() {
            timer.abort();
            return false;
        }
        self.reconnect = Some(timer);
        true
    }

    /// Called by the timer itself when it fires. Detaches the handle without aborting
    /// the running timer task and reports whether the reconnect should proceed.
    pub(crate) fn claim_reconnect(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.reconnect.take().is_some()
    }

    pub(crate) fn has_pending_reconnect(&self) -> bool {
        self.reconnect.is_some()
    }

    pub(crate) fn teardown(&mut self) {
        self.torn_down = true;
        self.abort_all();
    }

    fn abort_all(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(timer) = self.reconnect.take() {
            timer.abort();
        }
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.abort_all();
    }
}
