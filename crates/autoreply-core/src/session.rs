//! Session registry: which conversations have already received the greeting.
//! In-memory only; records live for the process lifetime unless a TTL is configured.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Marker that a conversation has been introduced to the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRecord {
    pub introduced_at: DateTime<Utc>,
}

/// Conversation id → session record.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionRecord>,
    ttl: Option<Duration>,
}

impl SessionRegistry {
    /// Unbounded registry (records are never removed).
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose records expire `ttl` after the greeting was sent.
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Atomically create the record if absent (or expired).
    /// Returns `true` when this call created it, i.e. the caller owes the greeting.
    pub fn claim(&self, conversation: &str) -> bool {
        self.claim_at(conversation, Utc::now())
    }

    pub fn claim_at(&self, conversation: &str, now: DateTime<Utc>) -> bool {
        let record = SessionRecord { introduced_at: now };
        match self.sessions.entry(conversation.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
            Entry::Occupied(mut slot) => {
                if self.is_expired(slot.get(), now) {
                    slot.insert(record);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Undo a claim whose greeting could not be delivered.
    pub fn release(&self, conversation: &str) {
        self.sessions.remove(conversation);
    }

    /// True when a live record exists for the conversation.
    pub fn is_introduced(&self, conversation: &str) -> bool {
        let now = Utc::now();
        self.sessions
            .get(conversation)
            .map(|r| !self.is_expired(r.value(), now))
            .unwrap_or(false)
    }

    pub fn get(&self, conversation: &str) -> Option<SessionRecord> {
        self.sessions.get(conversation).map(|r| *r.value())
    }

    pub fn prune(&self) -> usize {
        self.prune_expired(Utc::now())
    }

    /// Drop expired records. No-op without a TTL. Returns the number removed.
    pub fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let before = self.sessions.len();
        self.sessions.retain(|_, r| !self.is_expired(r, now));
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn is_expired(&self, record: &SessionRecord, now: DateTime<Utc>) -> bool {
        match self.ttl {
            Some(ttl) => now - record.introduced_at >= ttl,
            None => false,
        }
    }
}
