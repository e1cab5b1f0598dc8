//! HTTP client for communicating with llmd.

use anyhow::{anyhow, Context, Result};
use llm_common::{
    ErrorResponse, HealthResponse, LifecycleOp, LifecycleResponse, ServiceStatus,
    ServicesStatusResponse,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Covers a full restart: both scripts plus the start polling window
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Result of a lifecycle request the daemon answered
pub type LifecycleReply = std::result::Result<LifecycleResponse, ErrorResponse>;

/// Client for the llmd HTTP API
pub struct LlmdClient {
    http: reqwest::Client,
    base_url: String,
}

impl LlmdClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/health").await
    }

    pub async fn status_all(&self) -> Result<ServicesStatusResponse> {
        self.get("/services/status").await
    }

    pub async fn status(&self, name: &str) -> Result<ServiceStatus> {
        self.get(&format!("/services/{}/status", name)).await
    }

    /// Run a lifecycle operation; daemon-side failures come back as `Err` in the reply
    pub async fn lifecycle(&self, name: &str, op: LifecycleOp) -> Result<LifecycleReply> {
        let url = self.url(&format!("/services/{}/{}", name, op));
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| unreachable_daemon(&self.base_url, e))?;

        if response.status() == StatusCode::OK {
            let body = response
                .json::<LifecycleResponse>()
                .await
                .context("Invalid lifecycle response from llmd")?;
            Ok(Ok(body))
        } else {
            let status = response.status();
            let body = response
                .json::<ErrorResponse>()
                .await
                .with_context(|| format!("llmd returned {} with an unreadable body", status))?;
            Ok(Err(body))
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| unreachable_daemon(&self.base_url, e))?;

        let status = response.status();
        if !status.is_success() {
            return match response.json::<ErrorResponse>().await {
                Ok(err) => Err(anyhow!("{}", err.error)),
                Err(_) => Err(anyhow!("llmd returned {}", status)),
            };
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Invalid response from {}", path))
    }
}

fn unreachable_daemon(base_url: &str, err: reqwest::Error) -> anyhow::Error {
    anyhow!(
        "Cannot reach llmd at {}: {}\n\n\
         Check that the daemon is running:\n\
         sudo systemctl status llmd",
        base_url,
        err
    )
}
