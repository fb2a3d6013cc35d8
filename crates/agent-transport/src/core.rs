//! Transport core: issue one HTTP request and decode its JSON body.

use std::time::Duration;

use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ProblemDetails, TransportError};

/// Per-request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Issues a single HTTPS request against a fixed base URL with an injected
/// bearer credential and `content-type: application/json`.
#[derive(Clone)]
pub struct TransportCore {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl TransportCore {
    pub fn new(base_url: Url, api_key: &str) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, api_key, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: Url,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|err| TransportError::Network(err.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;

        Ok(TransportCore {
            http,
            base_url,
            timeout,
        })
    }

    /// Issue a request and decode a JSON response body into `T`.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<T, TransportError> {
        let raw = self.execute_raw(method, path, body).await?;
        serde_json::from_str(&raw).map_err(|err| TransportError::Network(err.to_string()))
    }

    /// Issue a request and discard a successful response body — used for
    /// `complete`/`fail`/`signal` endpoints whose body carries nothing the
    /// caller needs.
    pub async fn execute_discard(
        &self,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<(), TransportError> {
        self.execute_raw(method, path, body).await.map(|_| ())
    }

    async fn execute_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<String, TransportError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|err| TransportError::Network(err.to_string()))?;

        let mut req = self.http.request(method.clone(), url);
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = tokio::time::timeout(self.timeout, req.send())
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(TransportError::from)?;

        let status = response.status();
        tracing::debug!(method = %method, path, status = status.as_u16(), "control-plane call");

        if status.is_success() {
            Ok(response.text().await.unwrap_or_default())
        } else {
            Err(self.decode_error(status, response).await)
        }
    }

    async fn decode_error(&self, status: StatusCode, response: reqwest::Response) -> TransportError {
        let is_problem = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/problem+json"))
            .unwrap_or(false);

        let text = response.text().await.unwrap_or_default();

        if is_problem {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
                let title = value.get("title").and_then(|v| v.as_str()).map(str::to_string);
                let detail = value.get("detail").and_then(|v| v.as_str()).map(str::to_string);
                let body = detail.clone().or_else(|| title.clone()).unwrap_or_default();
                return TransportError::Http {
                    status: status.as_u16(),
                    problem: Some(ProblemDetails { title, detail }),
                    body,
                };
            }
        }

        let body = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value) => serde_json::to_string_pretty(&value).unwrap_or(text),
            Err(_) => text,
        };

        TransportError::Http {
            status: status.as_u16(),
            problem: None,
            body,
        }
    }
}
