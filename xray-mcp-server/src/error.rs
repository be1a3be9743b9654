//! Error types and handling for the Xray MCP Server
//!
//! Provides structured error types that map to MCP JSON-RPC error codes
//! and converts error types from dependencies into MCP-compatible errors.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Message shown whenever an Xray Cloud operation runs without credentials
pub const XRAY_NOT_CONFIGURED_MESSAGE: &str = "Xray Cloud API not configured. Please set XRAY_CLIENT_ID and XRAY_CLIENT_SECRET environment variables.";

/// Longest raw response body echoed back in an error message
const MAX_RAW_DETAIL_LEN: usize = 300;

/// Custom error types for the Xray MCP Server
#[derive(Debug, Error)]
pub enum XrayMcpError {
    /// Configuration errors (-32001)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Xray Cloud credentials are absent (-32002)
    #[error("{}", XRAY_NOT_CONFIGURED_MESSAGE)]
    AuthNotConfigured,

    /// The Xray authentication call itself failed (-32002)
    #[error("Failed to authenticate with Xray Cloud: {message}")]
    AuthRequest { message: String },

    /// Xray Cloud rejected the bearer token (-32002)
    #[error("Xray Cloud rejected the access token: {message}")]
    AuthorizationExpired { message: String },

    /// Non-2xx or transport failure from either backend (-32003)
    #[error("{}", upstream_display(*status, message))]
    Upstream { status: Option<u16>, message: String },

    /// Resource not found errors (-32005)
    #[error("Not found: {resource} '{key}' not found")]
    NotFound { resource: String, key: String },

    /// Invalid parameter errors (-32006)
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Tool name outside the registry (-32601)
    #[error("Unknown tool: {name}")]
    UnknownOperation { name: String },

    /// Internal server errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn upstream_display(status: Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("Request failed with status {}: {}", status, message),
        None => format!("Request failed: {}", message),
    }
}

impl XrayMcpError {
    /// Get the MCP JSON-RPC error code for this error
    pub fn error_code(&self) -> i32 {
        match self {
            XrayMcpError::Configuration { .. } => -32001,
            XrayMcpError::AuthNotConfigured => -32002,
            XrayMcpError::AuthRequest { .. } => -32002,
            XrayMcpError::AuthorizationExpired { .. } => -32002,
            XrayMcpError::Upstream { .. } => -32003,
            XrayMcpError::NotFound { .. } => -32005,
            XrayMcpError::InvalidParameter { .. } => -32006,
            XrayMcpError::UnknownOperation { .. } => -32601, // Method not found
            XrayMcpError::Internal { .. } => -32603,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            XrayMcpError::Configuration { .. } => "configuration",
            XrayMcpError::AuthNotConfigured => "auth_not_configured",
            XrayMcpError::AuthRequest { .. } => "auth_request",
            XrayMcpError::AuthorizationExpired { .. } => "authorization_expired",
            XrayMcpError::Upstream { .. } => "upstream",
            XrayMcpError::NotFound { .. } => "not_found",
            XrayMcpError::InvalidParameter { .. } => "invalid_parameter",
            XrayMcpError::UnknownOperation { .. } => "unknown_operation",
            XrayMcpError::Internal { .. } => "internal",
        }
    }

    /// Get additional error data for MCP error responses
    pub fn error_data(&self) -> Option<Value> {
        let mut data = serde_json::Map::new();
        data.insert(
            "category".to_string(),
            Value::String(self.category().to_string()),
        );

        match self {
            XrayMcpError::Upstream {
                status: Some(status),
                ..
            } => {
                data.insert("status".to_string(), Value::Number((*status).into()));
            }
            XrayMcpError::NotFound { resource, key } => {
                data.insert("resource".to_string(), Value::String(resource.clone()));
                data.insert("key".to_string(), Value::String(key.clone()));
            }
            XrayMcpError::InvalidParameter { parameter, .. } => {
                data.insert("parameter".to_string(), Value::String(parameter.clone()));
            }
            XrayMcpError::UnknownOperation { name } => {
                data.insert("tool".to_string(), Value::String(name.clone()));
            }
            _ => {}
        }

        Some(Value::Object(data))
    }

    /// Text shown to the user when a tool fails
    ///
    /// Upstream failures show only the backend detail, everything else its
    /// full display form.
    pub fn user_message(&self) -> String {
        match self {
            XrayMcpError::Upstream { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// True for a 401 from a backend call
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            XrayMcpError::Upstream {
                status: Some(401),
                ..
            }
        )
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        XrayMcpError::Configuration {
            message: message.into(),
        }
    }

    /// Create an authentication request error
    pub fn auth_request(message: impl Into<String>) -> Self {
        XrayMcpError::AuthRequest {
            message: message.into(),
        }
    }

    /// Create an authorization expired error
    pub fn authorization_expired(message: impl Into<String>) -> Self {
        XrayMcpError::AuthorizationExpired {
            message: message.into(),
        }
    }

    /// Create an upstream error
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        XrayMcpError::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>, key: impl Into<String>) -> Self {
        XrayMcpError::NotFound {
            resource: resource.into(),
            key: key.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_param(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        XrayMcpError::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an unknown operation error
    pub fn unknown_operation(name: impl Into<String>) -> Self {
        XrayMcpError::UnknownOperation { name: name.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        XrayMcpError::Internal {
            message: message.into(),
        }
    }
}

/// Error body shapes returned by Jira and Xray
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    #[serde(default)]
    pub error_messages: Option<Vec<String>>,

    #[serde(default)]
    pub errors: Option<Value>,

    #[serde(default)]
    pub error: Option<Value>,

    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorPayload {
    /// Most specific human-readable detail in the payload, if any
    pub fn detail(&self) -> Option<String> {
        let messages = self.error_messages.as_deref().unwrap_or_default();
        if let Some(first) = messages.iter().find(|m| !m.trim().is_empty()) {
            return Some(first.clone());
        }

        if let Some(errors) = &self.errors {
            let non_empty = match errors {
                Value::Object(map) => !map.is_empty(),
                Value::Array(items) => !items.is_empty(),
                Value::Null => false,
                _ => true,
            };
            if non_empty {
                return Some(errors.to_string());
            }
        }

        match &self.error {
            Some(Value::String(error)) if !error.trim().is_empty() => return Some(error.clone()),
            Some(Value::String(_)) | Some(Value::Null) | None => {}
            Some(other) => return Some(other.to_string()),
        }

        self.message.clone().filter(|m| !m.trim().is_empty())
    }
}

/// Best-effort detail from a failed response body
///
/// Tries the structured payload first, then a truncated raw body.
pub fn extract_error_detail(body: &str) -> Option<String> {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        if let Some(detail) = payload.detail() {
            return Some(detail);
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.starts_with('{') || trimmed.starts_with('<') {
        return None;
    }

    Some(truncate_chars(trimmed, MAX_RAW_DETAIL_LEN))
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Convert from reqwest transport errors
impl From<reqwest::Error> for XrayMcpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            XrayMcpError::upstream(None, format!("Request timed out: {}", err))
        } else if err.is_decode() {
            XrayMcpError::internal(format!("Failed to decode response: {}", err))
        } else {
            XrayMcpError::upstream(err.status().map(|s| s.as_u16()), err.to_string())
        }
    }
}

/// Convert from serde_json errors
impl From<serde_json::Error> for XrayMcpError {
    fn from(err: serde_json::Error) -> Self {
        XrayMcpError::internal(format!("JSON error: {}", err))
    }
}

/// Convert from TOML parsing errors
impl From<toml::de::Error> for XrayMcpError {
    fn from(err: toml::de::Error) -> Self {
        XrayMcpError::config(format!("TOML parsing error: {}", err))
    }
}

/// Convert from generic anyhow errors
///
/// anyhow only reaches this crate from configuration loading, so everything
/// it carries is a configuration problem.
impl From<anyhow::Error> for XrayMcpError {
    fn from(err: anyhow::Error) -> Self {
        XrayMcpError::config(format!("{:#}", err))
    }
}

/// Result type alias for Xray MCP operations
pub type XrayMcpResult<T> = Result<T, XrayMcpError>;
