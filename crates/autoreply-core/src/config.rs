//! Application configuration: optional TOML file layered with `AUTOREPLY_*` environment.
//!
//! | Key | Env | Default |
//! |-----|-----|---------|
//! | server.host | AUTOREPLY_SERVER__HOST | 0.0.0.0 |
//! | server.port | AUTOREPLY_SERVER__PORT or PORT | 3000 |
//! | presence.initial | AUTOREPLY_PRESENCE__INITIAL | offline |
//! | completion.endpoint | AUTOREPLY_COMPLETION__ENDPOINT | gemini-1.5-flash-latest generateContent |
//! | completion.request_timeout_secs | AUTOREPLY_COMPLETION__REQUEST_TIMEOUT_SECS | none |
//! | credentials.source | AUTOREPLY_CREDENTIALS__SOURCE | static |
//! | credentials.token | AUTOREPLY_CREDENTIALS__TOKEN | none |
//! | credentials.metadata_url | AUTOREPLY_CREDENTIALS__METADATA_URL | metadata server |
//! | bridge.base_url | AUTOREPLY_BRIDGE__BASE_URL | none (loopback dry run) |
//! | bridge.token | AUTOREPLY_BRIDGE__TOKEN | none |
//! | sessions.ttl_secs | AUTOREPLY_SESSIONS__TTL_SECS | none (never expire) |
//! | knowledge_path | AUTOREPLY_KNOWLEDGE_PATH | built-in profile |

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::credentials::DEFAULT_METADATA_TOKEN_URL;
use crate::error::ConfigError;
use crate::knowledge::KnowledgeBase;
use crate::presence::Presence;
use crate::responder::DEFAULT_COMPLETION_ENDPOINT;

const DEFAULT_CONFIG_PATH: &str = "autoreply.toml";

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_endpoint() -> String {
    DEFAULT_COMPLETION_ENDPOINT.to_string()
}

fn default_metadata_url() -> String {
    DEFAULT_METADATA_TOKEN_URL.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresenceConfig {
    #[serde(default)]
    pub initial: Presence,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_secs: None,
        }
    }
}

impl CompletionConfig {
    /// `None` (or 0) means no timeout.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    #[default]
    Static,
    Metadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub source: CredentialSource,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            source: CredentialSource::default(),
            token: None,
            metadata_url: default_metadata_url(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionsConfig {
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl SessionsConfig {
    pub fn ttl(&self) -> Option<chrono::Duration> {
        self.ttl_secs
            .filter(|s| *s > 0)
            .and_then(|s| chrono::Duration::try_seconds(s as i64))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub knowledge_path: Option<String>,
}

impl AppConfig {
    /// Load from `AUTOREPLY_CONFIG` (or `autoreply.toml` when present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("AUTOREPLY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Some(Path::new(&path)))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            // PORT is honoured for compatibility with common hosting platforms.
            .set_override_option(
                "server.port",
                std::env::var("PORT").ok().and_then(|p| p.trim().parse::<i64>().ok()),
            )?;

        let builder = match path {
            Some(p) if p.exists() => builder.add_source(config::File::from(p)),
            _ => builder,
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("AUTOREPLY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: AppConfig = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.completion.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("completion.endpoint is empty".into()));
        }
        if self.credentials.source == CredentialSource::Static
            && self.credentials.token.as_deref().map(str::trim).unwrap_or("").is_empty()
        {
            // Not fatal: every AI reply will fall back until a token is configured.
            tracing::warn!("[CONFIG] credentials.token is not set; AI replies will use the fallback text");
        }
        Ok(())
    }

    /// The configured knowledge base, or the built-in profile.
    pub fn knowledge(&self) -> Result<KnowledgeBase, ConfigError> {
        match self.knowledge_path.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => KnowledgeBase::load(p),
            _ => Ok(KnowledgeBase::default()),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_original_deployment() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.presence.initial, Presence::Offline);
        assert_eq!(cfg.completion.endpoint, DEFAULT_COMPLETION_ENDPOINT);
        assert_eq!(cfg.completion.request_timeout(), None);
        assert_eq!(cfg.sessions.ttl(), None);
        assert_eq!(cfg.knowledge().unwrap(), KnowledgeBase::default());
    }

    #[test]
    fn loads_sections_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 8080

[presence]
initial = "online"

[completion]
request_timeout_secs = 30

[credentials]
source = "metadata"

[bridge]
base_url = "http://127.0.0.1:3100"

[sessions]
ttl_secs = 86400
"#
        )
        .unwrap();

        let cfg = AppConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.presence.initial, Presence::Online);
        assert_eq!(cfg.completion.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.credentials.source, CredentialSource::Metadata);
        assert_eq!(cfg.credentials.metadata_url, DEFAULT_METADATA_TOKEN_URL);
        assert_eq!(cfg.bridge.base_url.as_deref(), Some("http://127.0.0.1:3100"));
        assert_eq!(cfg.sessions.ttl(), Some(chrono::Duration::seconds(86400)));
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let cfg = AppConfig::load_from(Some(Path::new("/nonexistent/autoreply.toml"))).unwrap();
        assert!(!cfg.completion.endpoint.is_empty());
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let c = CompletionConfig {
            request_timeout_secs: Some(0),
            ..CompletionConfig::default()
        };
        assert_eq!(c.request_timeout(), None);
    }
}
