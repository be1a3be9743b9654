//! Xray Cloud bearer-token cache
//!
//! Holds at most one access token obtained from `POST {xray}/authenticate`.
//! A token is reused while more than [`TOKEN_REFRESH_MARGIN`] remains before
//! its locally computed expiry. Expiry is always [`TOKEN_VALIDITY_WINDOW`]
//! after the moment the token was stored; the backend never reports one.
//!
//! Refreshes are single-flight: concurrent callers that find no valid token
//! queue on one refresh lock and re-check the cache once they hold it, so a
//! burst of expired-token callers produces one authentication call.

use crate::config::{XrayConfig, XrayCredentials};
use crate::error::{extract_error_detail, XrayMcpError, XrayMcpResult};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// A token is refreshed once less than this remains before expiry
pub const TOKEN_REFRESH_MARGIN: TimeDelta = TimeDelta::minutes(5);

/// Lifetime assumed for every freshly issued token
pub const TOKEN_VALIDITY_WINDOW: TimeDelta = TimeDelta::minutes(50);

/// Source of bearer tokens for the Xray Cloud API
#[async_trait]
pub trait BearerTokenSource: Send + Sync {
    /// Whether credentials are present at all
    fn is_configured(&self) -> bool;

    /// Return a usable token, refreshing it if needed
    async fn authenticate(&self) -> XrayMcpResult<String>;

    /// Drop the held token so the next call re-authenticates
    fn invalidate(&self);
}

/// An access token and the instant it stops being usable
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Token obtained at `now`, expiring one validity window later
    pub fn issued_at(token: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::new(token, now + TOKEN_VALIDITY_WINDOW)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Strictly more than the refresh margin must remain at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now > TOKEN_REFRESH_MARGIN
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Snapshot of the token cache for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct TokenCacheStats {
    pub configured: bool,
    pub has_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub authentication_count: u64,
}

#[derive(Serialize)]
struct AuthenticateRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
}

/// Process-wide holder of the Xray Cloud access token
pub struct XrayTokenCache {
    credentials: XrayCredentials,
    authenticate_url: String,
    http: reqwest::Client,
    token: RwLock<Option<CachedToken>>,
    refresh_lock: Mutex<()>,
    authentication_count: AtomicU64,
}

impl XrayTokenCache {
    /// Create an empty cache for the given credentials and Xray base URL
    pub fn new(
        credentials: XrayCredentials,
        xray_base_url: &str,
        timeout: Duration,
    ) -> XrayMcpResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| XrayMcpError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            authenticate_url: format!("{}/authenticate", xray_base_url.trim_end_matches('/')),
            http,
            token: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            authentication_count: AtomicU64::new(0),
        })
    }

    pub fn from_config(config: &XrayConfig) -> XrayMcpResult<Self> {
        Self::new(
            config.xray.clone(),
            &config.xray_base_url,
            config.request_timeout(),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_configured()
    }

    /// Return a valid token, contacting the backend only when none is held
    #[instrument(skip(self))]
    pub async fn authenticate(&self) -> XrayMcpResult<String> {
        if !self.is_configured() {
            return Err(XrayMcpError::AuthNotConfigured);
        }

        if let Some(token) = self.valid_token(Utc::now()) {
            debug!("Using cached Xray access token");
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // A queued caller may find the token another caller just stored
        if let Some(token) = self.valid_token(Utc::now()) {
            debug!("Xray access token refreshed while waiting");
            return Ok(token);
        }

        let token = self.request_token().await?;
        let cached = CachedToken::issued_at(token.clone(), Utc::now());
        info!("Obtained Xray access token, valid until {}", cached.expires_at());
        self.store(cached);

        Ok(token)
    }

    /// Drop the held token, if any
    pub fn invalidate(&self) {
        let mut slot = self.token.write().unwrap_or_else(PoisonError::into_inner);
        if slot.take().is_some() {
            debug!("Xray access token invalidated");
        }
    }

    pub fn stats(&self) -> TokenCacheStats {
        let slot = self.token.read().unwrap_or_else(PoisonError::into_inner);
        TokenCacheStats {
            configured: self.is_configured(),
            has_token: slot.is_some(),
            expires_at: slot.as_ref().map(CachedToken::expires_at),
            authentication_count: self.authentication_count.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn store(&self, token: CachedToken) {
        let mut slot = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(token);
    }

    fn valid_token(&self, now: DateTime<Utc>) -> Option<String> {
        let slot = self.token.read().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .filter(|cached| cached.is_valid_at(now))
            .map(|cached| cached.token.clone())
    }

    async fn request_token(&self) -> XrayMcpResult<String> {
        let request = AuthenticateRequest {
            client_id: self.credentials.client_id.as_deref().unwrap_or_default(),
            client_secret: self.credentials.client_secret.as_deref().unwrap_or_default(),
        };

        self.authentication_count.fetch_add(1, Ordering::Relaxed);
        debug!("POST {}", self.authenticate_url);

        let response = self
            .http
            .post(&self.authenticate_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("Xray authentication request failed: {}", e);
                if e.is_timeout() {
                    XrayMcpError::auth_request(format!("request timed out: {}", e))
                } else {
                    XrayMcpError::auth_request(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| XrayMcpError::auth_request(e.to_string()))?;

        if !status.is_success() {
            let detail = extract_error_detail(&body)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            warn!("Xray authentication rejected with {}: {}", status, detail);
            return Err(XrayMcpError::auth_request(detail));
        }

        parse_token(&body).ok_or_else(|| {
            XrayMcpError::auth_request("authentication response did not contain a token")
        })
    }
}

#[async_trait]
impl BearerTokenSource for XrayTokenCache {
    fn is_configured(&self) -> bool {
        XrayTokenCache::is_configured(self)
    }

    async fn authenticate(&self) -> XrayMcpResult<String> {
        XrayTokenCache::authenticate(self).await
    }

    fn invalidate(&self) {
        XrayTokenCache::invalidate(self)
    }
}

/// The authenticate endpoint answers with a JSON string literal
fn parse_token(body: &str) -> Option<String> {
    let token = match serde_json::from_str::<String>(body) {
        Ok(token) => token,
        Err(_) => body.trim().trim_matches('"').to_string(),
    };
    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        None
    } else {
        Some(token.to_string())
    }
}
