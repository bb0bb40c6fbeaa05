//! Credential collaborator: bearer tokens for the completion API.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::AuthError;

pub const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
pub const GENERATIVE_LANGUAGE_SCOPE: &str = "https://www.googleapis.com/auth/generative-language";

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}

/// A fixed token from configuration.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into().trim().to_string(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, AuthError> {
        if self.token.is_empty() {
            return Err(AuthError::Missing);
        }
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: i64,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Token from the instance metadata server, cached until shortly before expiry.
pub struct MetadataServerToken {
    client: reqwest::Client,
    url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataServerToken {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<CachedToken, AuthError> {
        let res = self
            .client
            .get(&self.url)
            .query(&[("scopes", GENERATIVE_LANGUAGE_SCOPE)])
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(AuthError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: MetadataTokenResponse =
            serde_json::from_str(&text).map_err(|e| AuthError::Parse(e.to_string()))?;
        let token = parsed
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AuthError::Parse("missing access_token".into()))?;

        Ok(CachedToken {
            token,
            expires_at: Utc::now() + Duration::seconds(parsed.expires_in - EXPIRY_MARGIN_SECS),
        })
    }
}

impl Default for MetadataServerToken {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_TOKEN_URL)
    }
}

#[async_trait]
impl TokenProvider for MetadataServerToken {
    async fn access_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(c) = cached.as_ref() {
            if c.expires_at > Utc::now() {
                return Ok(c.token.clone());
            }
        }
        let fresh = self.fetch().await?;
        tracing::debug!("[AUTH] Metadata token refreshed, expires {}", fresh.expires_at);
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}
