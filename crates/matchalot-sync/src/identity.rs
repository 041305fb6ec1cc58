use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::ApiClient;
use crate::error::SyncResult;

/// The signed-in user as reported by `GET /auth/me`. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    #[serde(rename = "Id", alias = "id")]
    pub id: i64,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub trust_score: i64,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl SessionUser {
    pub fn is_admin(&self) -> bool {
        self.role
            .as_deref()
            .map(|role| role.eq_ignore_ascii_case("ADMIN"))
            .unwrap_or(false)
    }
}

/// Resolves the current session identity. The matching channel re-resolves it on
/// every connect because the session may have changed between reconnects.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> SyncResult<SessionUser>;
}

#[async_trait]
impl IdentityProvider for ApiClient {
    async fn current_user(&self) -> SyncResult<SessionUser> {
        ApiClient::current_user(self).await
    }
}
