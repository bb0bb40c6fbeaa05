//! Knowledge-grounded responder: prompt assembly, one completion call, reply extraction.
//! `reply` is total: every failure becomes one of the fixed fallback strings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::credentials::TokenProvider;
use crate::error::ResponderError;
use crate::knowledge::KnowledgeBase;

pub const DEFAULT_COMPLETION_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash-latest:generateContent";

/// Text completion service. Returns [`ResponderError::EmptyReply`] when the response
/// carries no candidate text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ResponderError>;
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Pull `candidates[0].content.parts[0].text`, treating blank text as absent.
fn first_candidate_text(body: &str) -> Result<String, ResponderError> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| ResponderError::Parse(e.to_string()))?;
    parsed
        .candidates
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.content)
        .and_then(|c| c.parts)
        .and_then(|p| p.into_iter().next())
        .and_then(|p| p.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or(ResponderError::EmptyReply)
}

/// `generateContent` over HTTPS with a bearer token per call.
pub struct GeminiCompletion {
    client: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenProvider>,
}

impl GeminiCompletion {
    /// `timeout = None` leaves the call unbounded.
    pub fn new(endpoint: impl Into<String>, tokens: Arc<dyn TokenProvider>, timeout: Option<Duration>) -> Self {
        let client = match timeout {
            Some(t) => reqwest::Client::builder()
                .timeout(t)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            None => reqwest::Client::new(),
        };
        Self {
            client,
            endpoint: endpoint.into(),
            tokens,
        }
    }
}

#[async_trait]
impl CompletionBackend for GeminiCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, ResponderError> {
        let token = self.tokens.access_token().await?;

        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let res = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(ResponderError::Upstream {
                status: status.as_u16(),
                body: text,
            });
        }

        first_candidate_text(&text)
    }
}

/// Answers on the owner's behalf from the knowledge base only.
pub struct KnowledgeResponder {
    knowledge: Arc<KnowledgeBase>,
    backend: Arc<dyn CompletionBackend>,
}

impl KnowledgeResponder {
    pub fn new(knowledge: Arc<KnowledgeBase>, backend: Arc<dyn CompletionBackend>) -> Self {
        Self { knowledge, backend }
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub async fn try_reply(&self, transcript: &str) -> Result<String, ResponderError> {
        let prompt = self.knowledge.build_prompt(transcript);
        self.backend.complete(&prompt).await
    }

    /// Never fails; errors are logged and replaced by their fallback text.
    pub async fn reply(&self, transcript: &str) -> String {
        match self.try_reply(transcript).await {
            Ok(text) => text,
            Err(e) => {
                match &e {
                    ResponderError::EmptyReply => tracing::warn!("[RESPONDER] {}", e),
                    _ => tracing::error!("[RESPONDER] Completion API error: {}", e),
                }
                e.fallback_text().to_string()
            }
        }
    }
}
