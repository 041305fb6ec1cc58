use std::io;

use reqwest::StatusCode;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("session is not authenticated")]
    Unauthorized,
    #[error("request forbidden after csrf refresh: {body}")]
    Forbidden { body: String },
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tungstenite::Error>),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("could not resolve current user: {0}")]
    Identity(String),
    #[error("not connected to the match server")]
    NotConnected,
    #[error("channel has been torn down")]
    TornDown,
}

/// Coarse classification used by UI layers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 401: redirect to login, never retried.
    Authentication,
    /// 403 that survived the single token refresh.
    TokenRejected,
    /// 400/409 or another business rejection; show verbatim.
    Rejected,
    Transport,
    Identity,
    NotConnected,
    Internal,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Unauthorized => ErrorKind::Authentication,
            SyncError::Forbidden { .. } => ErrorKind::TokenRejected,
            SyncError::UnexpectedStatus { status, .. } if status.is_client_error() => {
                ErrorKind::Rejected
            }
            SyncError::UnexpectedStatus { .. }
            | SyncError::Http(_)
            | SyncError::WebSocket(_)
            | SyncError::Io(_) => ErrorKind::Transport,
            SyncError::Identity(_) => ErrorKind::Identity,
            SyncError::NotConnected => ErrorKind::NotConnected,
            SyncError::Url(_)
            | SyncError::Json(_)
            | SyncError::Config(_)
            | SyncError::TornDown => ErrorKind::Internal,
        }
    }

    /// Status code carried by HTTP-level failures.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            SyncError::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            SyncError::Forbidden { .. } => Some(StatusCode::FORBIDDEN),
            SyncError::UnexpectedStatus { status, .. } => Some(*status),
            SyncError::Http(err) => err.status(),
            _ => None,
        }
    }
}

impl From<tungstenite::Error> for SyncError {
    fn from(value: tungstenite::Error) -> Self {
        SyncError::WebSocket(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_http_failures() {
        assert_eq!(SyncError::Unauthorized.kind(), ErrorKind::Authentication);
        assert_eq!(
            SyncError::Forbidden { body: String::new() }.kind(),
            ErrorKind::TokenRejected
        );
        let conflict = SyncError::UnexpectedStatus {
            status: StatusCode::CONFLICT,
            body: "already matched".into(),
        };
        assert_eq!(conflict.kind(), ErrorKind::Rejected);
        assert_eq!(conflict.status(), Some(StatusCode::CONFLICT));

        let outage = SyncError::UnexpectedStatus {
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        };
        assert_eq!(outage.kind(), ErrorKind::Transport);
    }

    #[test]
    fn channel_conditions_have_their_own_kinds() {
        assert_eq!(SyncError::NotConnected.kind(), ErrorKind::NotConnected);
        assert_eq!(
            SyncError::Identity("401".into()).kind(),
            ErrorKind::Identity
        );
        assert_eq!(SyncError::TornDown.kind(), ErrorKind::Internal);
    }
}
