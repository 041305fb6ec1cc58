use super::{with_query, ApiClient};
use crate::error::SyncResult;
use crate::notifications::model::UnreadCountBody;
use crate::notifications::Notification;

impl ApiClient {
    pub async fn list_notifications(&self, unread_only: bool) -> SyncResult<Vec<Notification>> {
        let unread = unread_only.then(|| "true".to_string());
        let path = with_query("/notifications", &[("unread", unread)]);
        self.get(&path).await?.into_typed()
    }

    pub async fn unread_notification_count(&self) -> SyncResult<u64> {
        let body: UnreadCountBody = self.get("/notifications/unread-count").await?.into_typed()?;
        Ok(body.unread_count)
    }

    pub async fn mark_notification_read(&self, id: i64) -> SyncResult<()> {
        self.put(&format!("/notifications/{id}/read"), None).await?;
        Ok(())
    }

    pub async fn mark_all_notifications_read(&self) -> SyncResult<()> {
        self.put("/notifications/read-all", None).await?;
        Ok(())
    }

    pub async fn delete_notification(&self, id: i64) -> SyncResult<()> {
        self.delete(&format!("/notifications/{id}")).await?;
        Ok(())
    }
}
