//! Dispatch policy: per inbound message, ignore, greet once, or answer via the responder.

use std::sync::Arc;

use crate::context::assemble_context;
use crate::error::DispatchError;
use crate::messaging::{InboundMessage, Messenger};
use crate::presence::{Presence, PresenceFlag};
use crate::responder::KnowledgeResponder;
use crate::session::SessionRegistry;

/// What the policy did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Owner is online and handling chats personally.
    OwnerOnline,
    /// Authored by the owner's own account.
    OwnMessage,
    /// Group or broadcast conversation that slipped past ingress filtering.
    GroupIgnored,
    Greeted,
    Replied,
}

/// Owns the decision; shares presence and sessions with the control surface.
pub struct Dispatcher {
    presence: Arc<PresenceFlag>,
    sessions: Arc<SessionRegistry>,
    messenger: Arc<dyn Messenger>,
    responder: Arc<KnowledgeResponder>,
}

impl Dispatcher {
    pub fn new(
        presence: Arc<PresenceFlag>,
        sessions: Arc<SessionRegistry>,
        messenger: Arc<dyn Messenger>,
        responder: Arc<KnowledgeResponder>,
    ) -> Self {
        Self {
            presence,
            sessions,
            messenger,
            responder,
        }
    }

    pub fn presence(&self) -> &Arc<PresenceFlag> {
        &self.presence
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// At most one send and one registry mutation per message.
    pub async fn on_message(&self, msg: &InboundMessage) -> Result<DispatchOutcome, DispatchError> {
        if msg.is_group {
            return Ok(DispatchOutcome::GroupIgnored);
        }
        if msg.sender_is_owner {
            return Ok(DispatchOutcome::OwnMessage);
        }
        if self.presence.get() == Presence::Online {
            return Ok(DispatchOutcome::OwnerOnline);
        }

        let conversation = msg.conversation_id.as_str();

        if self.sessions.claim(conversation) {
            let greeting = self.responder.knowledge().greeting();
            if let Err(source) = self.messenger.send_reply(conversation, &greeting).await {
                // A failed greeting leaves the conversation unseen, so the next message retries it.
                self.sessions.release(conversation);
                return Err(DispatchError::Greeting {
                    conversation: conversation.to_string(),
                    source,
                });
            }
            tracing::info!("[DISPATCH] Greeted new conversation {}", conversation);
            return Ok(DispatchOutcome::Greeted);
        }

        let transcript = assemble_context(self.messenger.as_ref(), conversation)
            .await
            .map_err(|source| DispatchError::History {
                conversation: conversation.to_string(),
                source,
            })?;

        let reply = self.responder.reply(&transcript).await;

        self.messenger
            .send_reply(conversation, &reply)
            .await
            .map_err(|source| DispatchError::Reply {
                conversation: conversation.to_string(),
                source,
            })?;
        tracing::info!("[DISPATCH] Replied to {}", conversation);
        Ok(DispatchOutcome::Replied)
    }

    /// Top-level handling point: errors are logged and the message counts as handled.
    pub async fn handle(&self, msg: InboundMessage) -> Option<DispatchOutcome> {
        tracing::info!("[INBOUND] Message from {}: {}", msg.conversation_id, msg.body);
        match self.on_message(&msg).await {
            Ok(outcome) => {
                tracing::debug!("[DISPATCH] {} -> {:?}", msg.conversation_id, outcome);
                Some(outcome)
            }
            Err(e) => {
                tracing::error!("[DISPATCH] Error handling message: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ResponderError, TransportError, CONNECTION_FALLBACK};
    use crate::knowledge::KnowledgeBase;
    use crate::messaging::{HistoryMessage, LoopbackMessenger};
    use crate::responder::CompletionBackend;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Echoes the prompt it received so tests can inspect it.
    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
        reply: Result<String, ()>,
    }

    impl RecordingModel {
        fn answering(reply: &str) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                reply: Ok(reply.to_string()),
            }
        }

        fn broken() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                reply: Err(()),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for RecordingModel {
        async fn complete(&self, prompt: &str) -> Result<String, ResponderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .clone()
                .map_err(|_| ResponderError::Parse("stub failure".into()))
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        messenger: Arc<LoopbackMessenger>,
        model: Arc<RecordingModel>,
    }

    fn fixture_with(messenger: LoopbackMessenger, model: RecordingModel, presence: Presence) -> Fixture {
        let messenger = Arc::new(messenger);
        let model = Arc::new(model);
        let responder = Arc::new(KnowledgeResponder::new(
            Arc::new(KnowledgeBase::default()),
            model.clone(),
        ));
        let dispatcher = Dispatcher::new(
            Arc::new(PresenceFlag::new(presence)),
            Arc::new(SessionRegistry::new()),
            messenger.clone(),
            responder,
        );
        Fixture {
            dispatcher,
            messenger,
            model,
        }
    }

    fn fixture(presence: Presence) -> Fixture {
        fixture_with(
            LoopbackMessenger::new(),
            RecordingModel::answering("He is an IT undergraduate."),
            presence,
        )
    }

    async fn deliver(f: &Fixture, conversation: &str, body: &str) -> Result<DispatchOutcome, DispatchError> {
        f.messenger.record_inbound(conversation, body);
        f.dispatcher
            .on_message(&InboundMessage::direct(conversation, body))
            .await
    }

    #[tokio::test]
    async fn first_message_greets_and_second_asks_the_model() {
        let f = fixture(Presence::Offline);
        let greeting = KnowledgeBase::default().greeting();

        assert_eq!(deliver(&f, "a@c.us", "hey").await.unwrap(), DispatchOutcome::Greeted);
        assert_eq!(f.messenger.sent_to("a@c.us"), vec![greeting.clone()]);
        assert!(f.dispatcher.sessions().is_introduced("a@c.us"));

        assert_eq!(
            deliver(&f, "a@c.us", "what do you study?").await.unwrap(),
            DispatchOutcome::Replied
        );
        let sent = f.messenger.sent_to("a@c.us");
        assert_eq!(sent.len(), 2);
        assert_eq!(sent.iter().filter(|s| **s == greeting).count(), 1);
        assert_eq!(sent[1], "He is an IT undergraduate.");
    }

    #[tokio::test]
    async fn model_sees_bounded_role_tagged_transcript() {
        let f = fixture(Presence::Offline);
        deliver(&f, "a@c.us", "hey").await.unwrap();
        deliver(&f, "a@c.us", "what do you study?").await.unwrap();

        let prompts = f.model.prompts.lock().unwrap().clone();
        assert_eq!(prompts.len(), 1);
        let expected = format!(
            "Conversation:\nUser: hey\nYou: {}\nUser: what do you study?\n\nReply:",
            KnowledgeBase::default().greeting()
        );
        assert!(prompts[0].ends_with(&expected), "{}", prompts[0]);
    }

    #[tokio::test]
    async fn online_owner_means_no_outbound_messages() {
        let f = fixture(Presence::Online);
        for body in ["hi", "hello?", "anyone there"] {
            assert_eq!(
                deliver(&f, "a@c.us", body).await.unwrap(),
                DispatchOutcome::OwnerOnline
            );
        }
        assert!(f.messenger.sent().is_empty());
        assert!(f.dispatcher.sessions().is_empty());
    }

    #[tokio::test]
    async fn going_online_silences_known_conversations_too() {
        let f = fixture(Presence::Offline);
        deliver(&f, "a@c.us", "hi").await.unwrap();
        f.dispatcher.presence().toggle();
        assert_eq!(
            deliver(&f, "a@c.us", "still there?").await.unwrap(),
            DispatchOutcome::OwnerOnline
        );
        assert_eq!(f.messenger.sent().len(), 1);
    }

    #[tokio::test]
    async fn own_and_group_messages_are_ignored() {
        let f = fixture(Presence::Offline);
        let mut own = InboundMessage::direct("a@c.us", "note to self");
        own.sender_is_owner = true;
        assert_eq!(
            f.dispatcher.on_message(&own).await.unwrap(),
            DispatchOutcome::OwnMessage
        );
        assert_eq!(
            f.dispatcher
                .on_message(&InboundMessage::direct("12036@g.us", "hi all"))
                .await
                .unwrap(),
            DispatchOutcome::GroupIgnored
        );
        assert!(f.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn model_failure_still_sends_fallback() {
        let f = fixture_with(LoopbackMessenger::new(), RecordingModel::broken(), Presence::Offline);
        deliver(&f, "a@c.us", "hi").await.unwrap();
        assert_eq!(deliver(&f, "a@c.us", "q").await.unwrap(), DispatchOutcome::Replied);
        assert_eq!(f.messenger.sent_to("a@c.us")[1], CONNECTION_FALLBACK);
    }

    #[tokio::test]
    async fn failed_greeting_is_reported_and_not_recorded() {
        let f = fixture_with(
            LoopbackMessenger::failing(),
            RecordingModel::answering("x"),
            Presence::Offline,
        );
        let err = deliver(&f, "a@c.us", "hi").await.unwrap_err();
        assert!(matches!(err, DispatchError::Greeting { .. }));
        assert!(!f.dispatcher.sessions().is_introduced("a@c.us"));
        // handle() swallows the same failure
        assert_eq!(
            f.dispatcher.handle(InboundMessage::direct("a@c.us", "hi")).await,
            None
        );
    }

    struct NoHistory;

    #[async_trait]
    impl Messenger for NoHistory {
        async fn send_reply(&self, _: &str, _: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn fetch_recent_messages(
            &self,
            _: &str,
            _: usize,
        ) -> Result<Vec<HistoryMessage>, TransportError> {
            Err(TransportError::Status {
                status: 502,
                body: "bridge down".into(),
            })
        }
    }

    #[tokio::test]
    async fn history_failure_is_a_dispatch_error() {
        let model = Arc::new(RecordingModel::answering("x"));
        let responder = Arc::new(KnowledgeResponder::new(
            Arc::new(KnowledgeBase::default()),
            model.clone(),
        ));
        let dispatcher = Dispatcher::new(
            Arc::new(PresenceFlag::new(Presence::Offline)),
            Arc::new(SessionRegistry::new()),
            Arc::new(NoHistory),
            responder,
        );
        dispatcher
            .on_message(&InboundMessage::direct("a@c.us", "hi"))
            .await
            .unwrap();
        let err = dispatcher
            .on_message(&InboundMessage::direct("a@c.us", "again"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::History { .. }));
        assert!(model.prompts.lock().unwrap().is_empty());
    }
}
