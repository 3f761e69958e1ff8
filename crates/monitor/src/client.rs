//! HTTP client for the execution engine API.

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use sendwatch_core::{CampaignId, CampaignListing, JobStatus};

use crate::config::MonitorConfig;
use crate::engine::{CommandAck, EngineError, SendEngine};

/// [`SendEngine`] over the engine's JSON API.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl HttpEngine {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Build a client honoring the configured URL, token and request timeout.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EngineError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.auth_token.clone(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn campaign_url(&self, id: CampaignId, action: Option<&str>) -> String {
        match action {
            Some(action) => format!("{}/api/campaigns/{}/{}", self.api_url, id, action),
            None => format!("{}/api/campaigns/{}", self.api_url, id),
        }
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn execute(&self, req: RequestBuilder) -> Result<Response, EngineError> {
        let resp = self
            .authed(req)
            .send()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::Api {
                status,
                message: error_message(&body, status),
            });
        }

        Ok(resp)
    }

    async fn json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, EngineError> {
        self.execute(req)
            .await?
            .json::<T>()
            .await
            .map_err(|e| EngineError::Parse(e.to_string()))
    }

    async fn command(&self, id: CampaignId, action: &str) -> Result<CommandAck, EngineError> {
        let url = self.campaign_url(id, Some(action));
        self.json(self.client.post(url)).await
    }
}

#[async_trait::async_trait]
impl SendEngine for HttpEngine {
    async fn campaigns(&self) -> Result<Vec<CampaignListing>, EngineError> {
        let url = format!("{}/api/campaigns", self.api_url);
        self.json(self.client.get(url)).await
    }

    async fn job_status(&self, id: CampaignId) -> Result<JobStatus, EngineError> {
        let url = self.campaign_url(id, Some("job-status"));
        self.json(self.client.get(url)).await
    }

    async fn send(&self, id: CampaignId) -> Result<CommandAck, EngineError> {
        self.command(id, "send").await
    }

    async fn pause(&self, id: CampaignId) -> Result<CommandAck, EngineError> {
        self.command(id, "pause").await
    }

    async fn unschedule(&self, id: CampaignId) -> Result<CommandAck, EngineError> {
        self.command(id, "unschedule").await
    }

    async fn delete(&self, id: CampaignId) -> Result<(), EngineError> {
        let url = self.campaign_url(id, None);
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }
}

/// Extract the server-provided message from an error body.
///
/// Prefers a JSON `message`, then `error`, then the raw body, then the status.
fn error_message(body: &str, status: u16) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                if !msg.trim().is_empty() {
                    return msg.to_string();
                }
            }
        }
    }

    let body = body.trim();
    if body.is_empty() {
        format!("request failed with status {status}")
    } else {
        body.to_string()
    }
}
