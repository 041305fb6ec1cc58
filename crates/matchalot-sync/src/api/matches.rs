use serde_json::Value;

use super::ApiClient;
use crate::error::SyncResult;
use crate::matching::{MatchAction, MatchRequest};

impl ApiClient {
    /// REST counterpart of the WebSocket `MATCH_REQUEST`.
    pub async fn request_match(&self, request: &MatchRequest) -> SyncResult<Value> {
        let body = serde_json::to_value(request)?;
        Ok(self.post("/match/request", Some(&body)).await?.into_value())
    }

    pub async fn potential_partners(&self, material_id: i64) -> SyncResult<Value> {
        Ok(self
            .get(&format!("/match/potential/{material_id}"))
            .await?
            .into_value())
    }

    /// REST counterpart of the WebSocket `MATCH_RESPONSE`.
    pub async fn respond_to_match(&self, match_id: i64, action: MatchAction) -> SyncResult<Value> {
        let path = format!("/match/{match_id}/{}", action.path_segment());
        Ok(self.put(&path, None).await?.into_value())
    }

    pub async fn received_matches(&self) -> SyncResult<Value> {
        Ok(self.get("/match/received").await?.into_value())
    }

    pub async fn sent_matches(&self) -> SyncResult<Value> {
        Ok(self.get("/match/sent").await?.into_value())
    }

    pub async fn my_matches(&self) -> SyncResult<Value> {
        Ok(self.get("/match/my").await?.into_value())
    }

    pub async fn active_matches(&self) -> SyncResult<Value> {
        Ok(self.get("/match/active").await?.into_value())
    }

    pub async fn cleanup_matches(&self) -> SyncResult<Value> {
        Ok(self.post("/match/cleanup", None).await?.into_value())
    }
}
