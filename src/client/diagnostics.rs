//! Lifecycle events published for every public operation. Observability
//! only: nothing in the client changes behavior based on them, and tests
//! hook the channel instead of racing on future resolution order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::errors::Error;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticPhase {
    /// The operation was accepted.
    Start,
    /// The operation began awaiting broker responses.
    AsyncStart,
    /// The operation completed.
    AsyncEnd,
    /// The operation failed; `detail` carries the error text.
    Failure,
}

#[derive(Clone, Debug)]
pub struct DiagnosticEvent {
    pub client_id: Option<String>,
    pub operation: &'static str,
    pub operation_id: u64,
    pub phase: DiagnosticPhase,
    pub detail: Option<String>,
}

struct Shared {
    client_id: Option<String>,
    sender: broadcast::Sender<DiagnosticEvent>,
    sequence: AtomicU64,
}

#[derive(Clone)]
pub struct Diagnostics {
    shared: Arc<Shared>,
}

impl Diagnostics {
    pub fn new(client_id: Option<String>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Diagnostics {
            shared: Arc::new(Shared {
                client_id,
                sender,
                sequence: AtomicU64::new(0),
            }),
        }
    }

    /// A receiver of all events emitted from now on; lagging receivers drop
    /// the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosticEvent> {
        self.shared.sender.subscribe()
    }

    pub fn begin(&self, operation: &'static str) -> OperationSpan {
        let operation_id = self.shared.sequence.fetch_add(1, Ordering::Relaxed);
        let span = OperationSpan {
            diagnostics: self.clone(),
            operation,
            operation_id,
        };
        span.emit(DiagnosticPhase::Start, None);
        span
    }

    fn emit(&self, event: DiagnosticEvent) {
        // no receivers is the normal case
        let _ = self.shared.sender.send(event);
    }
}

/// One public operation's lifetime on the diagnostic channel.
pub struct OperationSpan {
    diagnostics: Diagnostics,
    operation: &'static str,
    operation_id: u64,
}

impl OperationSpan {
    pub fn operation_id(&self) -> u64 {
        self.operation_id
    }

    pub fn async_start(&self) {
        self.emit(DiagnosticPhase::AsyncStart, None);
    }

    pub fn finish(&self) {
        self.emit(DiagnosticPhase::AsyncEnd, None);
    }

    pub fn fail(&self, error: &Error) {
        self.emit(DiagnosticPhase::Failure, Some(error.to_string()));
    }

    fn emit(&self, phase: DiagnosticPhase, detail: Option<String>) {
        self.diagnostics.emit(DiagnosticEvent {
            client_id: self.diagnostics.shared.client_id.clone(),
            operation: self.operation,
            operation_id: self.operation_id,
            phase,
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_span_emits_lifecycle() {
        let diagnostics = Diagnostics::new(Some("c1".into()));
        let mut events = diagnostics.subscribe();

        let span = diagnostics.begin("create_topics");
        span.async_start();
        span.finish();

        let start = events.recv().await.unwrap();
        assert_eq!(start.phase, DiagnosticPhase::Start);
        assert_eq!(start.operation, "create_topics");
        assert_eq!(start.client_id.as_deref(), Some("c1"));

        assert_eq!(events.recv().await.unwrap().phase, DiagnosticPhase::AsyncStart);
        assert_eq!(events.recv().await.unwrap().phase, DiagnosticPhase::AsyncEnd);
    }

    #[tokio::test]
    async fn test_operation_ids_are_unique() {
        let diagnostics = Diagnostics::new(None);
        let first = diagnostics.begin("a");
        let second = diagnostics.begin("b");
        assert_ne!(first.operation_id(), second.operation_id());
    }
}
