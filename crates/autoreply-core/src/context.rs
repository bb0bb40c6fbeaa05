//! Context assembly: the last few messages of a conversation as a role-tagged transcript.

use crate::error::TransportError;
use crate::messaging::{HistoryMessage, Messenger};

/// Most messages ever fetched or rendered for one reply.
pub const CONTEXT_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Owner,
    Counterparty,
}

impl Speaker {
    pub fn label(self) -> &'static str {
        match self {
            Speaker::Owner => "You",
            Speaker::Counterparty => "User",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

impl From<HistoryMessage> for TranscriptEntry {
    fn from(m: HistoryMessage) -> Self {
        Self {
            speaker: if m.from_me {
                Speaker::Owner
            } else {
                Speaker::Counterparty
            },
            text: m.body,
        }
    }
}

/// Render `Label: body` lines, newest [`CONTEXT_WINDOW`] only, oldest first.
/// Bodies are passed through untouched.
pub fn render_transcript(entries: &[TranscriptEntry]) -> String {
    let skip = entries.len().saturating_sub(CONTEXT_WINDOW);
    entries[skip..]
        .iter()
        .map(|e| format!("{}: {}", e.speaker.label(), e.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fetch the recent window for `conversation` and render it.
pub async fn assemble_context(
    messenger: &dyn Messenger,
    conversation: &str,
) -> Result<String, TransportError> {
    let history = messenger
        .fetch_recent_messages(conversation, CONTEXT_WINDOW)
        .await?;
    let entries: Vec<TranscriptEntry> = history.into_iter().map(TranscriptEntry::from).collect();
    Ok(render_transcript(&entries))
}
