//! Stdio Channel
//!
//! JSON-lines transport: one `IncomingMessage` per line on the input side,
//! one `{"scope_id": .., "body": ..}` object per line for every reply.

use super::{DeliveryError, IncomingMessage, MessageHandler, Transport};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

#[derive(Serialize)]
struct OutboundLine<'a> {
    scope_id: &'a str,
    body: &'a str,
}

/// Transport that writes replies as JSON lines
pub struct StdioTransport {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StdioTransport {
    /// Write replies to stdout
    pub fn new() -> Self {
        Self::with_writer(tokio::io::stdout())
    }

    /// Write replies to an arbitrary sink
    pub fn with_writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, scope_id: &str, body: &str) -> Result<(), DeliveryError> {
        let mut line = serde_json::to_vec(&OutboundLine { scope_id, body })
            .map_err(|e| DeliveryError::SendFailed(e.to_string()))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| DeliveryError::SendFailed(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| DeliveryError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

/// Handler tasks spawned by the pump, reaped as they finish
#[derive(Default)]
struct HandlerTasks {
    set: JoinSet<()>,
}

impl HandlerTasks {
    fn spawn(&mut self, handler: Arc<dyn MessageHandler>, message: IncomingMessage) {
        self.set.spawn(async move {
            handler.handle_message(message).await;
        });
    }

    /// Collect every task that has already finished
    fn reap(&mut self) {
        while let Some(finished) = self.set.try_join_next() {
            log_task_result(finished);
        }
    }

    fn in_flight(&self) -> usize {
        self.set.len()
    }

    async fn drain(mut self) {
        tracing::debug!(in_flight = self.in_flight(), "waiting for message handlers");
        while let Some(finished) = self.set.join_next().await {
            log_task_result(finished);
        }
    }
}

fn log_task_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "message handler task failed");
    }
}

/// Read JSON-lines messages and hand each one to `handler` on its own task.
///
/// Returns the number of accepted messages once the reader hits EOF or
/// `shutdown` is cancelled. Malformed lines are logged and skipped. Handlers
/// already running are awaited before returning, also on a read error.
pub async fn pump_messages<R>(
    reader: R,
    handler: Arc<dyn MessageHandler>,
    shutdown: CancellationToken,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut accepted = 0usize;
    let mut tasks = HandlerTasks::default();
    let mut read_error = None;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown.cancelled() => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                read_error = Some(e);
                break;
            }
        };

        let trimmed = line.trim();
        if !trimmed.is_empty() {
            match serde_json::from_str::<IncomingMessage>(trimmed) {
                Ok(message) => {
                    accepted += 1;
                    tasks.spawn(handler.clone(), message);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed inbound line");
                }
            }
        }
        tasks.reap();
    }

    tasks.drain().await;

    match read_error {
        Some(e) => Err(e),
        None => Ok(accepted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;

    #[derive(Default)]
    struct CollectingHandler {
        seen: SyncMutex<Vec<IncomingMessage>>,
    }

    #[async_trait]
    impl MessageHandler for CollectingHandler {
        async fn handle_message(&self, message: IncomingMessage) {
            self.seen.lock().push(message);
        }
    }

    #[tokio::test]
    async fn test_pump_skips_malformed_lines() {
        let input: &[u8] = b"{\"scope_id\":\"alice\",\"chat_kind\":\"personal\",\"text\":\"hi\"}\n\
not json\n\
\n\
{\"scope_id\":\"team\",\"chat_kind\":\"group\",\"text\":\"yo\"}\n";
        let handler = Arc::new(CollectingHandler::default());

        let accepted = pump_messages(input, handler.clone(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(accepted, 2);
        let mut scopes: Vec<String> = handler
            .seen
            .lock()
            .iter()
            .map(|m| m.scope_id.clone())
            .collect();
        scopes.sort();
        assert_eq!(scopes, vec!["alice".to_string(), "team".to_string()]);
    }

    #[tokio::test]
    async fn test_pump_stops_on_cancel() {
        let (_writer, reader) = tokio::io::duplex(64);
        let reader = tokio::io::BufReader::new(reader);
        let handler = Arc::new(CollectingHandler::default());
        let token = CancellationToken::new();
        token.cancel();

        let accepted = pump_messages(reader, handler, token).await.unwrap();
        assert_eq!(accepted, 0);
    }

    #[tokio::test]
    async fn test_stdio_send_writes_json_line() {
        let (writer, reader) = tokio::io::duplex(256);
        let transport = StdioTransport::with_writer(writer);
        transport.send("alice", "Away").await.unwrap();
        drop(transport);

        let mut lines = tokio::io::BufReader::new(reader).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["scope_id"], "alice");
        assert_eq!(value["body"], "Away");
    }

    #[tokio::test]
    async fn test_finished_handler_tasks_are_reaped() {
        let handler: Arc<dyn MessageHandler> = Arc::new(CollectingHandler::default());
        let mut tasks = HandlerTasks::default();
        for i in 0..20 {
            let message = IncomingMessage::new(
                format!("scope-{}", i),
                crate::channels::ChatKind::Personal,
                "hi",
                chrono::Utc::now(),
            );
            tasks.spawn(handler.clone(), message);
        }

        for _ in 0..50 {
            tasks.reap();
            if tasks.in_flight() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(tasks.in_flight(), 0);
    }
}
