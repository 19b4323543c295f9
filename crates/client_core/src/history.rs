use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use shared::{domain::MessageId, protocol::HistoryEntry};

use crate::error::HistoryError;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Recently recorded clips, most recent first.
    async fn fetch_recent(&self) -> Result<Vec<HistoryEntry>, HistoryError>;
    async fn fetch_clip(&self, id: MessageId) -> Result<Vec<u8>, HistoryError>;
}

pub struct MissingHistoryStore;

#[async_trait]
impl HistoryStore for MissingHistoryStore {
    async fn fetch_recent(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        Err(HistoryError::Unavailable)
    }

    async fn fetch_clip(&self, _id: MessageId) -> Result<Vec<u8>, HistoryError> {
        Err(HistoryError::Unavailable)
    }
}

pub struct HttpHistoryStore {
    http: Client,
    server_url: String,
}

impl HttpHistoryStore {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_client(http: Client, server_url: impl Into<String>) -> Self {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        Self { http, server_url }
    }

    fn recent_path() -> &'static str {
        "/api/history"
    }

    fn clip_path(id: MessageId) -> String {
        format!("/api/history/{id}/audio")
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, HistoryError> {
        let res = self
            .http
            .get(format!("{}{path}", self.server_url))
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            return Err(HistoryError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        Ok(res)
    }
}

#[async_trait]
impl HistoryStore for HttpHistoryStore {
    async fn fetch_recent(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let res = self.get(Self::recent_path()).await?;
        Ok(res.json().await?)
    }

    async fn fetch_clip(&self, id: MessageId) -> Result<Vec<u8>, HistoryError> {
        match self.get(&Self::clip_path(id)).await {
            Ok(res) => Ok(res.bytes().await?.to_vec()),
            Err(HistoryError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Err(HistoryError::MissingClip(id))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
