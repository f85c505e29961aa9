//! Message delivery worker.
//!
//! Background loop that fires scheduled auto-responses once their `fire_at`
//! passes. Wakes on `Notify`, at the next fire time (at most every 5
//! seconds), or on shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::autoreply::ResponseEngine;
use crate::channels::Transport;
use crate::messages::outbound::{Dispatcher, ScheduledSend};

const IDLE_POLL: Duration = Duration::from_secs(5);

/// Run the delivery worker loop until `shutdown` is cancelled.
pub async fn delivery_loop(
    dispatcher: Arc<Dispatcher>,
    engine: Arc<ResponseEngine>,
    transport: Arc<dyn Transport>,
    shutdown: CancellationToken,
) {
    loop {
        let wait = next_wait(&dispatcher);

        tokio::select! {
            _ = dispatcher.notifier().notified() => {}
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.cancelled() => {
                break;
            }
        }

        for send in dispatcher.pop_due(Utc::now()) {
            deliver(&engine, transport.as_ref(), send).await;
        }
    }

    let dropped = dispatcher.pending();
    if dropped > 0 {
        warn!(dropped, "delivery loop stopped with sends still queued");
    }
}

fn next_wait(dispatcher: &Dispatcher) -> Duration {
    match dispatcher.next_fire_at() {
        Some(fire_at) => (fire_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(IDLE_POLL),
        None => IDLE_POLL,
    }
}

/// Record the response and hand it to the transport.
///
/// A transport failure is logged; the cooldown and statistics stand.
async fn deliver(engine: &ResponseEngine, transport: &dyn Transport, send: ScheduledSend) {
    engine.record_dispatch(&send.scope_id, send.source.clone(), &send.body, Utc::now());

    match transport.send(&send.scope_id, &send.body).await {
        Ok(()) => {
            debug!(id = %send.id, scope_id = %send.scope_id, "auto-response sent");
        }
        Err(e) => {
            warn!(id = %send.id, scope_id = %send.scope_id, error = %e, "auto-response delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoreply::{Decision, DecisionReason, EngineOptions, ResponseSource};
    use crate::channels::DeliveryError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
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

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn send(&self, _scope_id: &str, _body: &str) -> Result<(), DeliveryError> {
            Err(DeliveryError::NotConnected)
        }
    }

    fn engine() -> Arc<ResponseEngine> {
        Arc::new(ResponseEngine::open(Arc::new(MemoryStore::new()), EngineOptions::default()).unwrap())
    }

    fn decision_in(body: &str, millis: i64) -> Decision {
        Decision {
            send: true,
            body: body.to_string(),
            fire_at: Utc::now() + chrono::Duration::milliseconds(millis),
            reason: DecisionReason::Respond,
            source: Some(ResponseSource::Literal),
        }
    }

    #[tokio::test]
    async fn test_fires_no_earlier_than_fire_at() {
        let dispatcher = Arc::new(Dispatcher::new());
        let engine = engine();
        let transport = Arc::new(RecordingTransport::default());
        let shutdown = CancellationToken::new();

        let worker = tokio::spawn(delivery_loop(
            dispatcher.clone(),
            engine.clone(),
            transport.clone(),
            shutdown.clone(),
        ));

        dispatcher.schedule("alice", &decision_in("Away", 400));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(transport.sent.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(
            transport.sent.lock().clone(),
            vec![("alice".to_string(), "Away".to_string())]
        );
        assert_eq!(engine.stats(Utc::now()).total, 1);

        shutdown.cancel();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_delivery_error_keeps_statistics() {
        let dispatcher = Arc::new(Dispatcher::new());
        let engine = engine();
        let shutdown = CancellationToken::new();

        let worker = tokio::spawn(delivery_loop(
            dispatcher.clone(),
            engine.clone(),
            Arc::new(FailingTransport),
            shutdown.clone(),
        ));

        dispatcher.schedule("alice", &decision_in("Away", 0));
        dispatcher.schedule("bob", &decision_in("Away", 0));
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(dispatcher.pending(), 0);
        assert_eq!(engine.stats(Utc::now()).total, 2);

        shutdown.cancel();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let dispatcher = Arc::new(Dispatcher::new());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        tokio::time::timeout(
            Duration::from_secs(1),
            delivery_loop(
                dispatcher,
                engine(),
                Arc::new(RecordingTransport::default()),
                shutdown,
            ),
        )
        .await
        .unwrap();
    }
}
