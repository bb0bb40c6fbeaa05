//! Messaging collaborator seam: inbound events, outbound replies, history.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::TransportError;

/// One inbound message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub conversation_id: String,
    pub is_group: bool,
    pub sender_is_owner: bool,
    pub body: String,
}

impl InboundMessage {
    /// Direct message from a counterparty; `is_group` is derived from the id.
    pub fn direct(conversation_id: impl Into<String>, body: impl Into<String>) -> Self {
        let conversation_id = conversation_id.into();
        Self {
            is_group: is_group_conversation(&conversation_id),
            conversation_id,
            sender_is_owner: false,
            body: body.into(),
        }
    }
}

/// History entry, oldest → newest as returned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub from_me: bool,
    #[serde(default)]
    pub body: String,
}

/// Transport lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    PairingCode(String),
    Connected,
}

/// Group chats and broadcast lists never reach the dispatch policy.
pub fn is_group_conversation(conversation_id: &str) -> bool {
    conversation_id.contains("@g.us") || conversation_id.contains("@broadcast")
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_reply(&self, conversation: &str, text: &str) -> Result<(), TransportError>;

    async fn fetch_recent_messages(
        &self,
        conversation: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, TransportError>;
}

/// In-process messenger: keeps per-conversation history and records what was sent.
/// Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct LoopbackMessenger {
    history: Mutex<HashMap<String, Vec<HistoryMessage>>>,
    sent: Mutex<Vec<(String, String)>>,
    fail_sends: bool,
}

impl LoopbackMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messenger whose sends always fail with a transport error.
    pub fn failing() -> Self {
        Self {
            fail_sends: true,
            ..Self::default()
        }
    }

    /// Record an inbound message in the conversation history.
    pub fn record_inbound(&self, conversation: &str, body: &str) {
        self.push(conversation, false, body);
    }

    /// Record a message the owner sent from their own device.
    pub fn record_outbound(&self, conversation: &str, body: &str) {
        self.push(conversation, true, body);
    }

    /// Everything sent so far as `(conversation, text)`.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, conversation: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| c == conversation)
            .map(|(_, t)| t)
            .collect()
    }

    fn push(&self, conversation: &str, from_me: bool, body: &str) {
        if let Ok(mut h) = self.history.lock() {
            h.entry(conversation.to_string())
                .or_default()
                .push(HistoryMessage {
                    from_me,
                    body: body.to_string(),
                });
        }
    }
}

#[async_trait]
impl Messenger for LoopbackMessenger {
    async fn send_reply(&self, conversation: &str, text: &str) -> Result<(), TransportError> {
        if self.fail_sends {
            return Err(TransportError::Closed(format!(
                "loopback send to {} refused",
                conversation
            )));
        }
        tracing::info!("[LOOPBACK] To {}: {}", conversation, text);
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((conversation.to_string(), text.to_string()));
        }
        self.push(conversation, true, text);
        Ok(())
    }

    async fn fetch_recent_messages(
        &self,
        conversation: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, TransportError> {
        let history = self
            .history
            .lock()
            .map_err(|e| TransportError::Closed(e.to_string()))?;
        let all = history.get(conversation).cloned().unwrap_or_default();
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }
}
