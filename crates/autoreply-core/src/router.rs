//! Conversation router: one sequential worker task per conversation.
//!
//! Messages of one conversation are dispatched in arrival order, one at a time. Different
//! conversations run concurrently, so a slow completion call only delays its own sender.
//! Workers live as long as their conversation's session; `prune_idle_workers` drops the rest.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::dispatch::Dispatcher;
use crate::messaging::InboundMessage;

struct Worker {
    tx: mpsc::UnboundedSender<InboundMessage>,
    /// Messages queued or in flight.
    pending: Arc<AtomicUsize>,
}

pub struct ConversationRouter {
    dispatcher: Arc<Dispatcher>,
    workers: DashMap<String, Worker>,
}

impl ConversationRouter {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            workers: DashMap::new(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Queue a message on its conversation's worker. Must be called inside a Tokio runtime.
    pub fn route(&self, msg: InboundMessage) {
        if msg.is_group {
            tracing::debug!("[ROUTER] Dropping group message from {}", msg.conversation_id);
            return;
        }
        let key = msg.conversation_id.clone();
        // The entry guard is held across the send so pruning never sees a half-queued message.
        let mut worker = self
            .workers
            .entry(key.clone())
            .or_insert_with(|| self.spawn_worker(&key));
        worker.pending.fetch_add(1, Ordering::SeqCst);

        if let Err(mpsc::error::SendError(msg)) = worker.tx.send(msg) {
            tracing::warn!("[ROUTER] Worker for {} stopped, restarting", key);
            *worker = self.spawn_worker(&key);
            worker.pending.fetch_add(1, Ordering::SeqCst);
            let _ = worker.tx.send(msg);
        }
    }

    /// Drop idle workers whose conversation has no live session. Returns the number removed.
    /// A dropped worker's task ends once its channel closes.
    pub fn prune_idle_workers(&self) -> usize {
        let sessions = self.dispatcher.sessions();
        let before = self.workers.len();
        self.workers.retain(|conversation, worker| {
            worker.pending.load(Ordering::SeqCst) > 0 || sessions.is_introduced(conversation)
        });
        before - self.workers.len()
    }

    pub fn active_conversations(&self) -> usize {
        self.workers.len()
    }

    fn spawn_worker(&self, conversation: &str) -> Worker {
        let (tx, mut rx) = mpsc::unbounded_channel::<InboundMessage>();
        let pending = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::clone(&self.dispatcher);
        let in_flight = Arc::clone(&pending);
        let conversation = conversation.to_string();
        tokio::spawn(async move {
            tracing::debug!("[ROUTER] Worker started for {}", conversation);
            while let Some(msg) = rx.recv().await {
                dispatcher.handle(msg).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            tracing::debug!("[ROUTER] Worker stopped for {}", conversation);
        });
        Worker { tx, pending }
    }
}
