//! Autoreply — Core library.
//! Offline autoresponse policy: presence gate, one-time greeting per conversation,
//! and knowledge-grounded AI replies with bounded context.

pub mod bridge;
pub mod config;
pub mod context;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod knowledge;
pub mod messaging;
pub mod pairing;
pub mod presence;
pub mod responder;
pub mod router;
pub mod session;

pub use bridge::{BridgeEvent, BridgeIngress, BridgeMessenger, BRIDGE_TOKEN_HEADER};
pub use config::{AppConfig, CredentialSource};
pub use context::{assemble_context, render_transcript, Speaker, TranscriptEntry, CONTEXT_WINDOW};
pub use credentials::{MetadataServerToken, StaticToken, TokenProvider};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{
    AuthError, ConfigError, DispatchError, PairingError, ResponderError, TransportError,
    CONNECTION_FALLBACK, NO_REPLY_FALLBACK,
};
pub use knowledge::{Fact, KnowledgeBase, Pronouns};
pub use messaging::{
    is_group_conversation, HistoryMessage, InboundMessage, LifecycleEvent, LoopbackMessenger,
    Messenger,
};
pub use pairing::PairingState;
pub use presence::{Presence, PresenceFlag};
pub use responder::{CompletionBackend, GeminiCompletion, KnowledgeResponder};
pub use router::ConversationRouter;
pub use session::{SessionRecord, SessionRegistry};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
