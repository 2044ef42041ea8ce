use std::future::Future;
use std::time::Duration;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::protocol::{
    FETCH_ERROR_STATUS, HEALTH_PATH, SERVER_HEALTH_PATH, VERSION_HEADER, VERSION_HEADER_ANY,
};
use shared::types::{Address, HealthErrorResponse, HealthResponse, ServerHealthResponse};

/// Fetches the two health endpoints of a robot.
///
/// Failures are returned as data: an HTTP error response carries its status
/// and body, anything that never produced a response carries
/// [`FETCH_ERROR_STATUS`].
pub trait HealthTransport: Send + Sync + 'static {
    fn fetch_health(
        &self,
        address: &Address,
    ) -> impl Future<Output = std::result::Result<HealthResponse, HealthErrorResponse>> + Send;

    fn fetch_server_health(
        &self,
        address: &Address,
    ) -> impl Future<Output = std::result::Result<ServerHealthResponse, HealthErrorResponse>> + Send;
}

/// [`HealthTransport`] over a pooled `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        address: &Address,
        path: &str,
    ) -> std::result::Result<T, HealthErrorResponse> {
        let url = health_url(address, path);

        let response = self
            .http
            .get(&url)
            .header(VERSION_HEADER, VERSION_HEADER_ANY)
            .send()
            .await
            .map_err(|e| fetch_error(&e))?;

        let status = i32::from(response.status().as_u16());
        let success = response.status().is_success();
        let text = response.text().await.map_err(|e| fetch_error(&e))?;

        if !success {
            let body = match serde_json::from_str::<Value>(&text) {
                Ok(json) => json,
                Err(_) => Value::String(text),
            };
            tracing::trace!("GET {} returned {}", url, status);
            return Err(HealthErrorResponse { status, body });
        }

        serde_json::from_str(&text).map_err(|e| HealthErrorResponse {
            status,
            body: Value::String(format!("Invalid response body: {}", e)),
        })
    }
}

impl HealthTransport for ReqwestTransport {
    fn fetch_health(
        &self,
        address: &Address,
    ) -> impl Future<Output = std::result::Result<HealthResponse, HealthErrorResponse>> + Send {
        self.get_json(address, HEALTH_PATH)
    }

    fn fetch_server_health(
        &self,
        address: &Address,
    ) -> impl Future<Output = std::result::Result<ServerHealthResponse, HealthErrorResponse>> + Send {
        self.get_json(address, SERVER_HEALTH_PATH)
    }
}

/// IPv6 literals need brackets inside a URL
pub fn health_url(address: &Address, path: &str) -> String {
    if address.ip.contains(':') {
        format!("http://[{}]:{}{}", address.ip, address.port, path)
    } else {
        format!("http://{}:{}{}", address.ip, address.port, path)
    }
}

fn fetch_error(e: &reqwest::Error) -> HealthErrorResponse {
    HealthErrorResponse {
        status: FETCH_ERROR_STATUS,
        body: Value::String(e.to_string()),
    }
}
