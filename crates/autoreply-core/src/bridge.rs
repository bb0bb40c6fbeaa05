//! Messaging bridge adapter. The bridge sidecar holds the paired device session; we talk to
//! it over HTTP for sends and history, and it posts events back to the gateway webhook.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::messaging::{is_group_conversation, HistoryMessage, InboundMessage, LifecycleEvent, Messenger};

/// Header carrying the shared secret between gateway and bridge.
pub const BRIDGE_TOKEN_HEADER: &str = "X-Bridge-Token";

/// Event posted by the bridge to `/bridge/events`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    Qr {
        code: String,
    },
    Ready,
    Message {
        from: String,
        #[serde(default)]
        from_me: bool,
        #[serde(default)]
        is_group: bool,
        #[serde(default)]
        body: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeIngress {
    Lifecycle(LifecycleEvent),
    Message(InboundMessage),
}

impl From<BridgeEvent> for BridgeIngress {
    fn from(event: BridgeEvent) -> Self {
        match event {
            BridgeEvent::Qr { code } => BridgeIngress::Lifecycle(LifecycleEvent::PairingCode(code)),
            BridgeEvent::Ready => BridgeIngress::Lifecycle(LifecycleEvent::Connected),
            BridgeEvent::Message {
                from,
                from_me,
                is_group,
                body,
            } => BridgeIngress::Message(InboundMessage {
                is_group: is_group || is_group_conversation(&from),
                conversation_id: from,
                sender_is_owner: from_me,
                body,
            }),
        }
    }
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    text: &'a str,
}

/// HTTP client for the bridge sidecar.
pub struct BridgeMessenger {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BridgeMessenger {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    /// `{base}/chats/{conversation}/messages`, with the id escaped as a single path segment.
    fn messages_url(&self, conversation: &str) -> Result<reqwest::Url, TransportError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| TransportError::Url(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| TransportError::Url(format!("{}: cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["chats", conversation, "messages"]);
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.header(BRIDGE_TOKEN_HEADER, t),
            None => req,
        }
    }
}

async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Messenger for BridgeMessenger {
    async fn send_reply(&self, conversation: &str, text: &str) -> Result<(), TransportError> {
        let req = self
            .client
            .post(self.messages_url(conversation)?)
            .json(&SendMessageBody { text });
        let res = self.authorize(req).send().await?;
        check_status(res).await?;
        Ok(())
    }

    async fn fetch_recent_messages(
        &self,
        conversation: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, TransportError> {
        let req = self
            .client
            .get(self.messages_url(conversation)?)
            .query(&[("limit", limit)]);
        let res = check_status(self.authorize(req).send().await?).await?;
        let text = res.text().await?;
        serde_json::from_str(&text).map_err(|e| TransportError::Parse(e.to_string()))
    }
}
