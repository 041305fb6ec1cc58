use serde_json::Value;

use super::{with_query, ApiClient};
use crate::error::SyncResult;

// Match-event statistics for the admin dashboard.
impl ApiClient {
    pub async fn match_statistics(&self) -> SyncResult<Value> {
        Ok(self.get("/analytics/statistics").await?.into_value())
    }

    /// Per-hour event counts for `date` (`YYYY-MM-DD`), or today when absent.
    pub async fn hourly_statistics(&self, date: Option<&str>) -> SyncResult<Value> {
        let path = with_query("/analytics/hourly", &[("date", date.map(str::to_owned))]);
        Ok(self.get(&path).await?.into_value())
    }

    pub async fn user_statistics(&self, limit: u32) -> SyncResult<Value> {
        let path = with_query("/analytics/users", &[("limit", Some(limit.to_string()))]);
        Ok(self.get(&path).await?.into_value())
    }

    pub async fn match_success_rate(&self) -> SyncResult<Value> {
        Ok(self.get("/analytics/success-rate").await?.into_value())
    }

    pub async fn reset_statistics(&self) -> SyncResult<()> {
        self.post("/analytics/reset", None).await?;
        Ok(())
    }
}
