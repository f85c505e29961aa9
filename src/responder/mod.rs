//! Message Router
//!
//! `MessageHandler` that sits between a transport and the engine: the
//! owner's slash commands go to the command front-end, everything else is
//! evaluated for an automatic reply and scheduled on the dispatcher.

use crate::autoreply::{Decision, ResponseEngine};
use crate::channels::{IncomingMessage, MessageHandler, Transport};
use crate::commands::{self, Command};
use crate::messages::Dispatcher;
use async_trait::async_trait;
use std::sync::Arc;

/// Routes incoming messages to commands or auto-reply decisions
pub struct Responder {
    engine: Arc<ResponseEngine>,
    dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn Transport>,
}

impl Responder {
    pub fn new(
        engine: Arc<ResponseEngine>,
        dispatcher: Arc<Dispatcher>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            engine,
            dispatcher,
            transport,
        }
    }

    pub fn engine(&self) -> &Arc<ResponseEngine> {
        &self.engine
    }

    async fn handle_owner_message(&self, message: &IncomingMessage) {
        if !message.text.trim_start().starts_with('/') {
            return;
        }

        let outcome = commands::handle(&self.engine, &message.text, message.received_at);

        if outcome.ok
            && outcome.command == Some(Command::Autoresponder(false))
            && self.engine.options().cancel_pending_on_disable
        {
            let dropped = self.dispatcher.cancel_all();
            if dropped > 0 {
                tracing::info!(dropped, "pending auto-responses cancelled on disable");
            }
        }

        if let Err(e) = self.transport.send(&message.scope_id, &outcome.reply).await {
            tracing::warn!(scope_id = %message.scope_id, error = %e, "failed to deliver command reply");
        }
    }

    /// Evaluate a contact's message and schedule the reply if one is due
    pub fn respond_to(&self, message: &IncomingMessage) -> Decision {
        let decision = self.engine.decide(message, message.received_at);
        tracing::debug!(
            scope_id = %message.scope_id,
            chat_kind = %message.chat_kind,
            reason = ?decision.reason,
            "auto-reply decision"
        );
        if decision.send {
            self.dispatcher.schedule(&message.scope_id, &decision);
        }
        decision
    }
}

#[async_trait]
impl MessageHandler for Responder {
    async fn handle_message(&self, message: IncomingMessage) {
        if message.from_self {
            self.handle_owner_message(&message).await;
        } else {
            self.respond_to(&message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoreply::{DecisionReason, EngineOptions};
    use crate::channels::{ChatKind, DeliveryError};
    use crate::store::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, scope_id: &str, body: &str) -> Result<(), DeliveryError> {
            self.sent.lock().push((scope_id.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn responder(options: EngineOptions) -> (Responder, Arc<RecordingTransport>, Arc<Dispatcher>) {
        let engine = Arc::new(ResponseEngine::open(Arc::new(MemoryStore::new()), options).unwrap());
        let dispatcher = Arc::new(Dispatcher::new());
        let transport = Arc::new(RecordingTransport::default());
        (
            Responder::new(engine, dispatcher.clone(), transport.clone()),
            transport,
            dispatcher,
        )
    }

    fn owner(text: &str, at: i64) -> IncomingMessage {
        IncomingMessage::new("me", ChatKind::Personal, text, ts(at)).from_owner()
    }

    #[tokio::test]
    async fn test_owner_command_gets_reply() {
        let (responder, transport, _) = responder(EngineOptions::default());
        responder.handle_message(owner("/autoresponder on", 0)).await;

        let sent = transport.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "me");
        assert!(sent[0].1.ends_with("Autoresponder on."));
        assert!(responder.engine().snapshot().enabled);
    }

    #[tokio::test]
    async fn test_owner_plain_text_ignored() {
        let (responder, transport, dispatcher) = responder(EngineOptions::default());
        responder.handle_message(owner("/autoresponder on", 0)).await;
        responder.handle_message(owner("note to self", 1)).await;

        assert_eq!(transport.sent.lock().len(), 1);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_contact_message_scheduled() {
        let (responder, transport, dispatcher) = responder(EngineOptions::default());
        responder.handle_message(owner("/autoresponder on", 0)).await;
        responder.handle_message(owner("/setdelay 60", 0)).await;

        let msg = IncomingMessage::new("alice", ChatKind::Personal, "hi", ts(100));
        responder.handle_message(msg.clone()).await;
        responder.handle_message(msg).await;

        assert_eq!(dispatcher.pending(), 1);
        assert_eq!(dispatcher.next_fire_at(), Some(ts(160)));
        // only the two command replies went out directly
        assert_eq!(transport.sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_disable_keeps_pending_by_default() {
        let (responder, _, dispatcher) = responder(EngineOptions::default());
        responder.handle_message(owner("/autoresponder on", 0)).await;
        responder.handle_message(owner("/setdelay 60", 0)).await;
        responder
            .handle_message(IncomingMessage::new("alice", ChatKind::Personal, "hi", ts(1)))
            .await;
        responder.handle_message(owner("/autoresponder off", 2)).await;

        assert_eq!(dispatcher.pending(), 1);
    }

    #[tokio::test]
    async fn test_disable_cancels_pending_when_configured() {
        let (responder, _, dispatcher) =
            responder(EngineOptions::default().with_cancel_pending_on_disable(true));
        responder.handle_message(owner("/autoresponder on", 0)).await;
        responder.handle_message(owner("/setdelay 60", 0)).await;
        responder
            .handle_message(IncomingMessage::new("alice", ChatKind::Personal, "hi", ts(1)))
            .await;
        responder.handle_message(owner("/autoresponder off", 2)).await;

        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_respond_to_reports_reason() {
        let (responder, _, _) = responder(EngineOptions::default());
        let decision =
            responder.respond_to(&IncomingMessage::new("alice", ChatKind::Personal, "hi", ts(0)));
        assert_eq!(decision.reason, DecisionReason::Inactive);
    }
}
