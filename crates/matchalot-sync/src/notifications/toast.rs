//! Toast presentation with de-duplication across restarts.
//!
//! The notification channel delivers each push once, but a consumer that is
//! recreated will see the same entries again from a list fetch. The presenter
//! keeps a persisted set of ids it has already shown and never toasts one twice.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::warn;

use super::Notification;
use crate::error::SyncResult;

pub const MAX_VISIBLE_TOASTS: usize = 3;
/// Ids are server-assigned and increasing, so only the newest are kept.
pub const MAX_REMEMBERED_IDS: usize = 200;

pub trait ShownIdStore: Send + Sync {
    fn load(&self) -> SyncResult<BTreeSet<i64>>;
    fn save(&self, ids: &BTreeSet<i64>) -> SyncResult<()>;
}

/// JSON array of ids on disk. A missing file is an empty set.
#[derive(Debug, Clone)]
pub struct FileShownIdStore {
    path: PathBuf,
}

impl FileShownIdStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ShownIdStore for FileShownIdStore {
    fn load(&self) -> SyncResult<BTreeSet<i64>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeSet::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, ids: &BTreeSet<i64>) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec(ids)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryShownIdStore {
    ids: Mutex<BTreeSet<i64>>,
}

impl ShownIdStore for MemoryShownIdStore {
    fn load(&self) -> SyncResult<BTreeSet<i64>> {
        Ok(self.ids.lock().clone())
    }

    fn save(&self, ids: &BTreeSet<i64>) -> SyncResult<()> {
        *self.ids.lock() = ids.clone();
        Ok(())
    }
}

pub struct ToastPresenter<S: ShownIdStore> {
    store: S,
    shown: BTreeSet<i64>,
    toasts: Vec<Notification>,
}

impl<S: ShownIdStore> ToastPresenter<S> {
    pub fn new(store: S) -> SyncResult<Self> {
        let shown = store.load()?;
        Ok(Self {
            store,
            shown,
            toasts: Vec::new(),
        })
    }

    /// Feeds the current newest-first log. Returns the notification that became a
    /// toast, if any, and drops toasts whose notification has since been read.
    pub fn observe(&mut self, notifications: &[Notification]) -> Option<Notification> {
        self.toasts.retain(|toast| {
            notifications
                .iter()
                .find(|n| n.id == toast.id)
                .map(|n| !n.is_read)
                .unwrap_or(true)
        });

        let latest = notifications.first()?;
        if latest.is_read || self.shown.contains(&latest.id) {
            return None;
        }

        self.shown.insert(latest.id);
        while self.shown.len() > MAX_REMEMBERED_IDS {
            self.shown.pop_first();
        }
        if let Err(err) = self.store.save(&self.shown) {
            warn!(
                target = "matchalot::notifications",
                error = %err,
                "failed to persist shown notification ids"
            );
        }
        self.toasts.insert(0, latest.clone());
        self.toasts.truncate(MAX_VISIBLE_TOASTS);
        Some(latest.clone())
    }

    pub fn dismiss(&mut self, id: i64) {
        self.toasts.retain(|toast| toast.id != id);
    }

    /// Newest first, at most [`MAX_VISIBLE_TOASTS`].
    pub fn visible(&self) -> &[Notification] {
        &self.toasts
    }

    pub fn was_shown(&self, id: i64) -> bool {
        self.shown.contains(&id)
    }
}
