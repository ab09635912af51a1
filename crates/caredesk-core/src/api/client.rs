//! API client for the care team REST backend.
//!
//! Every endpoint lives under `/teams/{team_id}/...`. Reads go through
//! `get_json`; the write helpers are used by `TeamActions`.

use std::time::Duration;

use reqwest::{header, Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::ApiError;

/// Connect timeout for the underlying connection pool.
/// Requests themselves only get a deadline when the caller asks for one.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// API client for the care team backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client rooted at `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(header::ACCEPT, "application/json");
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn send(request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request.send().await.map_err(ApiError::from_transport)?;
        Self::check_response(response).await
    }

    /// Read the body as JSON. An empty body is treated as `null`.
    async fn read_json(response: reqwest::Response) -> Result<Value, ApiError> {
        let text = response.text().await.map_err(ApiError::from_transport)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Malformed JSON: {}", e)))
    }

    /// Issue exactly one GET and parse the body as JSON.
    ///
    /// `timeout` bounds the whole request; `None` leaves it to the transport.
    pub async fn get_json(&self, path: &str, timeout: Option<Duration>) -> Result<Value, ApiError> {
        let url = self.url(path);
        debug!(url = %url, ?timeout, "GET");

        let mut request = self.authorize(self.client.get(&url));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = Self::send(request).await?;
        Self::read_json(response).await
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, ApiError> {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let response = Self::send(self.authorize(self.client.post(&url)).json(body)).await?;
        Self::read_json(response).await
    }

    pub async fn patch_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, ApiError> {
        let url = self.url(path);
        debug!(url = %url, "PATCH");
        let response = Self::send(self.authorize(self.client.patch(&url)).json(body)).await?;
        Self::read_json(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let url = self.url(path);
        debug!(url = %url, "DELETE");
        Self::send(self.authorize(self.client.delete(&url))).await?;
        Ok(())
    }
}
