//! Error types for the autoreply core.
//!
//! Only [`ConfigError`] can stop the process (at startup). Everything else is
//! logged where the inbound message is handled and then dropped.

use thiserror::Error;

/// Fallback sent when the model answered but no reply text could be extracted.
pub const NO_REPLY_FALLBACK: &str = "Sorry, I couldn’t think of a reply just now!";

/// Fallback sent when the completion call itself failed.
pub const CONNECTION_FALLBACK: &str = "Sorry, I’m having trouble connecting right now.";

/// Messaging bridge failures (send, history fetch).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("bridge request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("bridge returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("bridge url: {0}")]
    Url(String),

    #[error("bridge history parse: {0}")]
    Parse(String),

    #[error("messenger closed: {0}")]
    Closed(String),
}

/// Access-token acquisition failures.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("no access token configured")]
    Missing,

    #[error("token endpoint request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("token response parse: {0}")]
    Parse(String),
}

/// Completion pipeline failures. Every variant maps to a user-visible fallback
/// through [`ResponderError::fallback_text`].
#[derive(Error, Debug)]
pub enum ResponderError {
    #[error("auth: {0}")]
    Auth(#[from] AuthError),

    #[error("completion request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("completion API {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("completion response parse: {0}")]
    Parse(String),

    #[error("completion response had no candidate text")]
    EmptyReply,
}

impl ResponderError {
    /// The single place where failures become reply text.
    pub fn fallback_text(&self) -> &'static str {
        match self {
            ResponderError::EmptyReply => NO_REPLY_FALLBACK,
            ResponderError::Auth(_)
            | ResponderError::Request(_)
            | ResponderError::Upstream { .. }
            | ResponderError::Parse(_) => CONNECTION_FALLBACK,
        }
    }
}

/// Failure while handling one inbound message.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("sending greeting to {conversation}: {source}")]
    Greeting {
        conversation: String,
        #[source]
        source: TransportError,
    },

    #[error("fetching history for {conversation}: {source}")]
    History {
        conversation: String,
        #[source]
        source: TransportError,
    },

    #[error("sending reply to {conversation}: {source}")]
    Reply {
        conversation: String,
        #[source]
        source: TransportError,
    },
}

/// Pairing code could not be turned into a QR image.
#[derive(Error, Debug)]
pub enum PairingError {
    #[error("pairing code cannot be encoded as QR: {0}")]
    Encode(String),
}

/// Startup configuration failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config: {0}")]
    Load(#[from] config::ConfigError),

    #[error("knowledge base {path}: {source}")]
    KnowledgeRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("knowledge base {path}: {source}")]
    KnowledgeParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
