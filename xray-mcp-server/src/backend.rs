//! HTTP client bound to one backend base address
//!
//! Both the Jira REST API and the Xray Cloud API are reached through this
//! type. It owns the base URL, the per-request timeout and any fixed headers,
//! and maps non-2xx responses to [`XrayMcpError::Upstream`] with the most
//! useful detail the backend returned.

use crate::error::{extract_error_detail, XrayMcpError, XrayMcpResult};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Body of an outgoing request
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Raw {
        content_type: &'static str,
        body: String,
    },
}

/// A single request against a [`BackendClient`]
#[derive(Debug, Clone)]
pub struct BackendRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: RequestBody,
    bearer: Option<String>,
}

impl BackendRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn raw(mut self, content_type: &'static str, body: impl Into<String>) -> Self {
        self.body = RequestBody::Raw {
            content_type,
            body: body.into(),
        };
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// Pre-configured HTTP client for one backend
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Create a client for `base_url` with a bounded per-request timeout
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        default_headers: HeaderMap,
    ) -> XrayMcpResult<Self> {
        let mut headers = default_headers;
        headers
            .entry(ACCEPT)
            .or_insert(HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| XrayMcpError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a client that sends a fixed Authorization header on every call
    pub fn with_authorization(
        base_url: impl Into<String>,
        timeout: Duration,
        authorization: &str,
    ) -> XrayMcpResult<Self> {
        let mut value = HeaderValue::from_str(authorization)
            .map_err(|_| XrayMcpError::config("Authorization header contains invalid characters"))?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Self::new(base_url, timeout, headers)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and fail on any non-2xx status
    pub async fn send(&self, request: BackendRequest) -> XrayMcpResult<Response> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!("{} {}", request.method, request.path);

        let mut builder = self.http.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(&body),
            RequestBody::Raw { content_type, body } => {
                builder.header(CONTENT_TYPE, content_type).body(body)
            }
        };

        let response = builder.send().await.map_err(|e| {
            warn!("{} {} failed: {}", request.method, request.path, e);
            XrayMcpError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = extract_error_detail(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
        });
        warn!(
            "{} {} returned {}: {}",
            request.method, request.path, status, detail
        );

        Err(XrayMcpError::upstream(Some(status.as_u16()), detail))
    }

    /// Send a request and decode a JSON response body
    pub async fn send_json<T: DeserializeOwned>(&self, request: BackendRequest) -> XrayMcpResult<T> {
        let response = self.send(request).await?;
        read_json(response).await
    }

    /// Send a request and return the response body as text
    pub async fn send_text(&self, request: BackendRequest) -> XrayMcpResult<String> {
        let response = self.send(request).await?;
        Ok(response.text().await?)
    }

    /// Send a request and discard the response body
    pub async fn send_empty(&self, request: BackendRequest) -> XrayMcpResult<()> {
        self.send(request).await?;
        Ok(())
    }
}

/// Decode a JSON body, reporting the payload shape on failure
pub async fn read_json<T: DeserializeOwned>(response: Response) -> XrayMcpResult<T> {
    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| XrayMcpError::internal(format!("Unexpected response format: {}", e)))
}

/// Decode a JSON body that may legitimately be empty
pub async fn read_json_or_default<T: DeserializeOwned + Default>(
    response: Response,
) -> XrayMcpResult<T> {
    let body = response.text().await?;
    if body.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&body)
        .map_err(|e| XrayMcpError::internal(format!("Unexpected response format: {}", e)))
}
