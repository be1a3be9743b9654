//! Configuration management for the Xray MCP Server
//!
//! Handles loading configuration from environment variables, TOML files,
//! and provides sensible defaults for all optional settings.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default Xray Cloud API base address
pub const DEFAULT_XRAY_BASE_URL: &str = "https://xray.cloud.getxray.app/api/v2";

/// Main configuration structure for the Xray MCP Server
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct XrayConfig {
    /// Jira Cloud base URL (required), e.g. https://your-domain.atlassian.net
    pub jira_base_url: String,

    /// Account email used for Jira Basic authentication (required)
    pub jira_email: String,

    /// Jira API token (required)
    pub jira_api_token: String,

    /// Xray Cloud API credentials (optional, gates import/export and steps)
    pub xray: XrayCredentials,

    /// Xray Cloud API base URL (default: https://xray.cloud.getxray.app/api/v2)
    pub xray_base_url: String,

    /// HTTP request timeout in seconds (default: 30)
    pub request_timeout_seconds: u64,

    /// Metadata cache TTL in seconds (default: 300 = 5 minutes)
    pub cache_ttl_seconds: u64,

    /// Issue type names used by the Xray app in this Jira site
    pub issue_types: IssueTypeNames,
}

/// Candidate Jira issue type names for each Xray issue kind
///
/// The first name is used in JQL searches. Creation picks the first issue
/// type of the project whose name is in the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueTypeNames {
    pub test: Vec<String>,
    pub test_execution: Vec<String>,
    pub test_plan: Vec<String>,
    pub test_set: Vec<String>,
}

impl Default for IssueTypeNames {
    fn default() -> Self {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            test: names(&["Xray Test", "Test"]),
            test_execution: names(&["Xray Test Execution", "Test Execution"]),
            test_plan: names(&["Xray Test Plan", "Test Plan"]),
            test_set: names(&["Xray Test Set", "Test Set"]),
        }
    }
}

impl IssueTypeNames {
    /// Name used in JQL for the given kind list: the first non-blank entry
    pub fn search_name(names: &[String]) -> &str {
        names
            .iter()
            .map(|name| name.trim())
            .find(|name| !name.is_empty())
            .unwrap_or_default()
    }
}

/// Xray Cloud API key pair
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XrayCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl XrayCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
        }
    }

    /// True iff both the client id and the secret are non-empty
    pub fn is_configured(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        present(&self.client_id) && present(&self.client_secret)
    }
}

impl fmt::Debug for XrayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XrayCredentials")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl fmt::Debug for XrayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XrayConfig")
            .field("jira_base_url", &self.jira_base_url)
            .field("jira_email", &self.jira_email)
            .field("jira_api_token", &"<redacted>")
            .field("xray", &self.xray)
            .field("xray_base_url", &self.xray_base_url)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("cache_ttl_seconds", &self.cache_ttl_seconds)
            .field("issue_types", &self.issue_types)
            .finish()
    }
}

impl Default for XrayConfig {
    fn default() -> Self {
        Self {
            jira_base_url: String::new(),
            jira_email: String::new(),
            jira_api_token: String::new(),
            xray: XrayCredentials::default(),
            xray_base_url: DEFAULT_XRAY_BASE_URL.to_string(),
            request_timeout_seconds: 30,
            cache_ttl_seconds: 300, // 5 minutes
            issue_types: IssueTypeNames::default(),
        }
    }
}

impl XrayConfig {
    /// Load configuration from environment variables, TOML file, and defaults
    /// Priority: env vars > TOML file > defaults
    pub fn load() -> Result<Self> {
        let mut config = if let Ok(file_config) = Self::load_from_file("config/xray-mcp-config.toml")
        {
            info!("Loaded configuration from TOML file");
            file_config
        } else if let Ok(file_config) = Self::load_from_file("xray-mcp-config.toml") {
            info!("Loaded configuration from TOML file in current directory");
            file_config
        } else {
            debug!("No TOML configuration file found, using defaults and environment variables");
            Self::default()
        };

        // Override with environment variables
        config.load_from_env()?;

        config.normalize();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load configuration from environment variables
    fn load_from_env(&mut self) -> Result<()> {
        if let Ok(url) = env::var("JIRA_BASE_URL") {
            self.jira_base_url = url;
            debug!("Loaded JIRA_BASE_URL from environment");
        }

        if let Ok(email) = env::var("JIRA_EMAIL") {
            self.jira_email = email;
            debug!("Loaded JIRA_EMAIL from environment");
        }

        if let Ok(token) = env::var("JIRA_API_TOKEN") {
            self.jira_api_token = token;
            debug!("Loaded JIRA_API_TOKEN from environment");
        }

        if let Ok(client_id) = env::var("XRAY_CLIENT_ID") {
            self.xray.client_id = Some(client_id);
            debug!("Loaded XRAY_CLIENT_ID from environment");
        }

        if let Ok(client_secret) = env::var("XRAY_CLIENT_SECRET") {
            self.xray.client_secret = Some(client_secret);
            debug!("Loaded XRAY_CLIENT_SECRET from environment");
        }

        if let Ok(url) = env::var("XRAY_BASE_URL") {
            self.xray_base_url = url;
            debug!("Loaded XRAY_BASE_URL from environment");
        }

        if let Ok(timeout) = env::var("XRAY_REQUEST_TIMEOUT") {
            let timeout_seconds = timeout
                .parse::<u64>()
                .with_context(|| format!("XRAY_REQUEST_TIMEOUT must be a number, got '{}'", timeout))?;
            self.request_timeout_seconds = timeout_seconds;
            debug!(
                "Set request timeout to {} seconds from environment",
                timeout_seconds
            );
        }

        if let Ok(ttl) = env::var("XRAY_CACHE_TTL") {
            if let Ok(ttl_seconds) = ttl.parse::<u64>() {
                self.cache_ttl_seconds = ttl_seconds;
                debug!("Set cache TTL to {} seconds from environment", ttl_seconds);
            } else {
                warn!("Ignoring invalid XRAY_CACHE_TTL: {}", ttl);
            }
        }

        Ok(())
    }

    /// Trim whitespace and trailing slashes so paths can be appended directly
    fn normalize(&mut self) {
        self.jira_base_url = self.jira_base_url.trim().trim_end_matches('/').to_string();
        self.xray_base_url = self.xray_base_url.trim().trim_end_matches('/').to_string();
        self.jira_email = self.jira_email.trim().to_string();
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.jira_base_url.is_empty() {
            return Err(anyhow::anyhow!(
                "Jira base URL is required. Set JIRA_BASE_URL environment variable or configure in TOML file."
            ));
        }

        if !is_http_url(&self.jira_base_url) {
            return Err(anyhow::anyhow!(
                "JIRA_BASE_URL must start with http:// or https://. Got: {}",
                self.jira_base_url
            ));
        }

        if self.jira_email.is_empty() {
            return Err(anyhow::anyhow!(
                "Jira email is required. Set JIRA_EMAIL environment variable."
            ));
        }

        if !self.jira_email.contains('@') {
            return Err(anyhow::anyhow!(
                "JIRA_EMAIL must be a valid email address. Got: {}",
                self.jira_email
            ));
        }

        if self.jira_api_token.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "Jira API token is required. Set JIRA_API_TOKEN environment variable."
            ));
        }

        if !is_http_url(&self.xray_base_url) {
            return Err(anyhow::anyhow!(
                "XRAY_BASE_URL must start with http:// or https://. Got: {}",
                self.xray_base_url
            ));
        }

        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("request_timeout_seconds must be greater than 0"));
        }

        for (kind, names) in [
            ("test", &self.issue_types.test),
            ("test_execution", &self.issue_types.test_execution),
            ("test_plan", &self.issue_types.test_plan),
            ("test_set", &self.issue_types.test_set),
        ] {
            if names.is_empty() {
                return Err(anyhow::anyhow!(
                    "issue_types.{} must name at least one issue type",
                    kind
                ));
            }
            if names.iter().any(|name| name.trim().is_empty()) {
                return Err(anyhow::anyhow!(
                    "issue_types.{} must not contain blank names",
                    kind
                ));
            }
        }

        if self.xray.is_configured() {
            info!("Xray Cloud API credentials configured");
        } else {
            info!("Xray Cloud API credentials not set - import, export and test step tools are disabled");
        }

        if self.cache_ttl_seconds > 3600 {
            warn!("Cache TTL is set to more than 1 hour, this may cause stale issue type data");
        }

        info!("Configuration validation successful");
        Ok(())
    }

    /// Authorization header value for the Jira REST API
    pub fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.jira_email, self.jira_api_token);
        format!("Basic {}", BASE64.encode(raw))
    }

    /// Browser link for an issue
    pub fn browse_url(&self, issue_key: &str) -> String {
        format!("{}/browse/{}", self.jira_base_url, issue_key)
    }

    /// Per-request timeout for both backends
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
