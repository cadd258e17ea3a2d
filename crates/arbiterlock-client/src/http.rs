//! Thin HTTP transport over the façade (spec §4.3). One reqwest client per
//! [`ArbiterLockClient`], pooled and reused across calls the way the host
//! codebase's own HTTP client wraps `reqwest::Client` (see
//! `BatataHttpClient`) — no retry/failover here since the façade is a
//! single logical endpoint, unlike the multi-server Nacos client this was
//! patterned on.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "http://127.0.0.1:8080".to_string(),
            connect_timeout_ms: 5_000,
            read_timeout_ms: 30_000,
        }
    }
}

impl ClientConfig {
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            ..Default::default()
        }
    }

    pub fn with_timeouts(mut self, connect_ms: u64, read_ms: u64) -> Self {
        self.connect_timeout_ms = connect_ms;
        self.read_timeout_ms = read_ms;
        self
    }
}

pub(crate) struct Transport {
    client: Client,
    base_url: String,
}

impl Transport {
    pub(crate) fn new(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.server_addr.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let url = self.url(path);
        debug!(%url, "POST");
        let response = self.client.post(&url).json(body).send().await?;
        decode(response).await
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self.client.get(&url).send().await?;
        decode(response).await
    }
}

/// Engine-level failures ride back with transport 200 and a `{status:
/// "error", ...}` body (spec §4.3); only non-2xx means a transport-level
/// failure (malformed JSON on our side, or a 503 when the façade itself
/// cannot reach the store).
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
    if response.status() == StatusCode::SERVICE_UNAVAILABLE {
        let message = response.text().await.unwrap_or_default();
        return Err(ClientError::Engine(
            arbiterlock_common::EngineError::Internal(message),
        ));
    }

    let value: serde_json::Value = response.json().await?;

    if value.get("status").and_then(|s| s.as_str()) == Some("error") {
        let code = value
            .get("code")
            .and_then(|c| c.as_str())
            .unwrap_or("internal")
            .to_string();
        let message = value
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();
        return Err(ClientError::Engine(crate::error::engine_error_from_code(
            &code, message,
        )));
    }

    Ok(serde_json::from_value(value)?)
}
