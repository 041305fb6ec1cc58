//! Match-a-lot sync: the client-side real-time layer shared by Match-a-lot frontends.
//!
//! Responsibilities:
//! - issuing HTTP calls with a cached, single-flight CSRF token and one retry on rejection
//! - owning the server-sent notification stream (unread counts, newest-first log)
//! - owning the matching WebSocket bound to the signed-in user
//! - projecting both channels into a single view for UI consumption

pub mod api;
pub mod config;
pub mod connection;
pub mod csrf;
pub mod error;
pub mod identity;
pub mod matching;
pub mod notifications;
pub mod projector;

pub use api::{ApiClient, ApiResponse};
pub use config::SyncConfig;
pub use connection::{ChannelError, ConnectionStatus};
pub use csrf::{CsrfTokenCache, HttpTokenSource, TokenSource};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use identity::{IdentityProvider, SessionUser};
pub use matching::{
    MatchAction, MatchChannel, MatchCommand, MatchEvent, MatchRequest, MatchResponse, MatchState,
};
pub use notifications::{
    FileShownIdStore, MemoryShownIdStore, Notification, NotificationChannel, NotificationKind,
    NotificationState, ShownIdStore, ToastPresenter,
};
pub use projector::{ConnectionProjector, ConnectionView};
