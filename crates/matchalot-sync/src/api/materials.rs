use serde_json::Value;

use super::{with_query, ApiClient};
use crate::error::SyncResult;

impl ApiClient {
    /// Lists study materials; absent filter values are left out of the query.
    pub async fn list_materials(&self, filters: &[(&str, Option<String>)]) -> SyncResult<Value> {
        let path = with_query("/study-materials", filters);
        Ok(self.get(&path).await?.into_value())
    }

    pub async fn material(&self, id: i64) -> SyncResult<Value> {
        Ok(self.get(&format!("/study-materials/{id}")).await?.into_value())
    }

    pub async fn my_materials(&self) -> SyncResult<Value> {
        Ok(self.get("/study-materials/my").await?.into_value())
    }

    pub async fn upload_material(&self, body: &Value) -> SyncResult<Value> {
        Ok(self.post("/study-materials", Some(body)).await?.into_value())
    }

    pub async fn update_material(&self, id: i64, body: &Value) -> SyncResult<Value> {
        Ok(self
            .put(&format!("/study-materials/{id}"), Some(body))
            .await?
            .into_value())
    }

    pub async fn delete_material(&self, id: i64) -> SyncResult<()> {
        self.delete(&format!("/study-materials/{id}")).await?;
        Ok(())
    }

    pub async fn subjects(&self) -> SyncResult<Value> {
        Ok(self.get("/study-materials/subjects").await?.into_value())
    }

    pub async fn exam_types(&self) -> SyncResult<Value> {
        Ok(self.get("/study-materials/exam-types").await?.into_value())
    }
}
