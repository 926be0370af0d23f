use super::error::SyncError;
use super::models::EntityKind;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The tracker API calls the sync manager replays operations through.
#[async_trait]
pub trait TrackerApi: Send + Sync {
    /// Creates the record and returns the server's copy.
    async fn create(&self, kind: EntityKind, payload: &Value) -> Result<Value, SyncError>;

    async fn update(
        &self,
        kind: EntityKind,
        server_id: &str,
        payload: &Value,
    ) -> Result<Value, SyncError>;

    async fn delete(&self, kind: EntityKind, server_id: &str) -> Result<(), SyncError>;

    async fn list_task_groups(&self) -> Result<Vec<Value>, SyncError>;
}

#[async_trait]
impl<T: TrackerApi + ?Sized> TrackerApi for Arc<T> {
    async fn create(&self, kind: EntityKind, payload: &Value) -> Result<Value, SyncError> {
        (**self).create(kind, payload).await
    }

    async fn update(
        &self,
        kind: EntityKind,
        server_id: &str,
        payload: &Value,
    ) -> Result<Value, SyncError> {
        (**self).update(kind, server_id, payload).await
    }

    async fn delete(&self, kind: EntityKind, server_id: &str) -> Result<(), SyncError> {
        (**self).delete(kind, server_id).await
    }

    async fn list_task_groups(&self) -> Result<Vec<Value>, SyncError> {
        (**self).list_task_groups().await
    }
}

/// [`TrackerApi`] over HTTP against this crate's own server routes.
pub struct HttpTrackerApi {
    client: Client,
    base_url: String,
}

impl HttpTrackerApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SyncError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(HttpTrackerApi {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        let path = match kind {
            EntityKind::TaskGroup => "task-groups",
            EntityKind::TaskCompletion => "task-completions",
        };
        format!("{}/api/{}", self.base_url, path)
    }

    async fn checked(response: Response) -> Result<Response, SyncError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);
        Err(SyncError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl TrackerApi for HttpTrackerApi {
    async fn create(&self, kind: EntityKind, payload: &Value) -> Result<Value, SyncError> {
        let response = self
            .client
            .post(self.collection_url(kind))
            .json(payload)
            .send()
            .await?;
        Ok(Self::checked(response).await?.json().await?)
    }

    async fn update(
        &self,
        kind: EntityKind,
        server_id: &str,
        payload: &Value,
    ) -> Result<Value, SyncError> {
        let request = match kind {
            EntityKind::TaskGroup => self
                .client
                .put(format!("{}/{}", self.collection_url(kind), server_id)),
            // Completions are upserted by (taskId, date).
            EntityKind::TaskCompletion => self.client.post(self.collection_url(kind)),
        };
        let response = request.json(payload).send().await?;
        Ok(Self::checked(response).await?.json().await?)
    }

    async fn delete(&self, kind: EntityKind, server_id: &str) -> Result<(), SyncError> {
        if kind == EntityKind::TaskCompletion {
            return Err(SyncError::Unsupported(kind));
        }
        let response = self
            .client
            .delete(format!("{}/{}", self.collection_url(kind), server_id))
            .send()
            .await?;
        Self::checked(response).await?;
        Ok(())
    }

    async fn list_task_groups(&self) -> Result<Vec<Value>, SyncError> {
        let response = self
            .client
            .get(self.collection_url(EntityKind::TaskGroup))
            .send()
            .await?;
        Ok(Self::checked(response).await?.json().await?)
    }
}
