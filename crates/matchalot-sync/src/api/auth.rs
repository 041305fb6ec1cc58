use serde_json::Value;
use tracing::debug;

use super::ApiClient;
use crate::error::{SyncError, SyncResult};
use crate::identity::SessionUser;

impl ApiClient {
    pub async fn current_user(&self) -> SyncResult<SessionUser> {
        self.get("/auth/me").await?.into_typed()
    }

    /// Ends the session. An already-expired session is not an error here.
    pub async fn logout(&self) -> SyncResult<()> {
        let result = self.post("/auth/logout", None).await;
        self.csrf().invalidate();
        match result {
            Ok(_) => Ok(()),
            Err(SyncError::Unauthorized) => {
                debug!(target = "matchalot::api", "logout on expired session");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn handle_callback(&self) -> SyncResult<Value> {
        Ok(self.get("/auth/callback").await?.into_value())
    }

    /// Raw token endpoint; mutating calls go through the cache instead.
    pub async fn csrf_token(&self) -> SyncResult<Value> {
        Ok(self.get("/auth/csrf-token").await?.into_value())
    }

    pub async fn delete_account(&self) -> SyncResult<()> {
        self.delete("/auth/me").await?;
        self.csrf().invalidate();
        Ok(())
    }
}
