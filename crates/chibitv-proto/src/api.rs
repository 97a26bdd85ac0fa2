//! HTTP client for the chibitv API.
//!
//! [`ViewerApi`] is the seam the session reconciler and the shell talk to;
//! [`HttpApi`] is the reqwest-backed implementation.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::model::{RawEvent, Service, ServiceId, StreamState, StreamUpdate};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status} for {path}")]
    Status { status: StatusCode, path: String },
    #[error("stream {0} not found")]
    StreamNotFound(u32),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Operations the viewer needs from the server.
#[async_trait]
pub trait ViewerApi: Send + Sync {
    /// `GET /services`
    async fn services(&self) -> ApiResult<Vec<Service>>;

    /// `GET /services/{id}/events`
    async fn events(&self, service_id: ServiceId) -> ApiResult<Vec<RawEvent>>;

    /// `GET /streams/{id}`
    async fn stream(&self, stream_id: u32) -> ApiResult<StreamState>;

    /// `PATCH /streams/{id}` with `{service_id}`
    async fn select_service(&self, stream_id: u32, service_id: ServiceId) -> ApiResult<()>;

    /// URL of the continuous MPEG-TS payload for `stream_id`.
    fn stream_url(&self, stream_id: u32) -> String;
}

pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("chibitv-viewer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        debug!("GET {}", path);
        let resp = self.client.get(self.url(path)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status,
                path: path.to_string(),
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl ViewerApi for HttpApi {
    async fn services(&self) -> ApiResult<Vec<Service>> {
        self.get_json("/services").await
    }

    async fn events(&self, service_id: ServiceId) -> ApiResult<Vec<RawEvent>> {
        self.get_json(&format!("/services/{}/events", service_id))
            .await
    }

    async fn stream(&self, stream_id: u32) -> ApiResult<StreamState> {
        match self.get_json(&format!("/streams/{}", stream_id)).await {
            Err(ApiError::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                Err(ApiError::StreamNotFound(stream_id))
            }
            other => other,
        }
    }

    async fn select_service(&self, stream_id: u32, service_id: ServiceId) -> ApiResult<()> {
        let path = format!("/streams/{}", stream_id);
        debug!("PATCH {} service_id={}", path, service_id);
        let resp = self
            .client
            .patch(self.url(&path))
            .json(&StreamUpdate { service_id })
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ApiError::Status { status, path })
        }
    }

    fn stream_url(&self, stream_id: u32) -> String {
        self.url(&format!("/streams/{}/stream.ts", stream_id))
    }
}
