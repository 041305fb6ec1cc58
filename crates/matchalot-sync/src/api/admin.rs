use serde_json::{json, Value};

use super::ApiClient;
use crate::error::SyncResult;

// Approval and trust-score rules live server-side; these are thin passthroughs.
impl ApiClient {
    pub async fn pending_materials(&self) -> SyncResult<Value> {
        Ok(self.get("/admin/materials/pending").await?.into_value())
    }

    pub async fn all_users(&self) -> SyncResult<Value> {
        Ok(self.get("/admin/users").await?.into_value())
    }

    pub async fn approve_material(&self, material_id: i64) -> SyncResult<Value> {
        Ok(self
            .put(&format!("/admin/materials/{material_id}/approve"), None)
            .await?
            .into_value())
    }

    pub async fn reject_material(&self, material_id: i64, reason: &str) -> SyncResult<Value> {
        let body = json!({ "reason": reason });
        Ok(self
            .put(&format!("/admin/materials/{material_id}/reject"), Some(&body))
            .await?
            .into_value())
    }

    pub async fn force_delete_user(&self, user_id: i64, reason: &str) -> SyncResult<Value> {
        let body = json!({ "reason": reason });
        Ok(self
            .request(
                reqwest::Method::DELETE,
                &format!("/admin/users/{user_id}"),
                Some(&body),
                None,
            )
            .await?
            .into_value())
    }
}
