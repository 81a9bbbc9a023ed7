//! Non-blocking audit writes.
//!
//! The trade path must never wait on the audit sink, so records go over an
//! unbounded channel to a background task. `flush` is a barrier for tick
//! boundaries and tests; sink failures are logged, never propagated.

use folio_positions::{AuditRecord, AuditSink};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::error;

enum Msg {
    Record(Box<AuditRecord>),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct AuditWriter {
    tx: mpsc::UnboundedSender<Msg>,
}

impl AuditWriter {
    /// Spawns the background writer task over the given sink.
    #[must_use]
    pub fn spawn(sink: Arc<dyn AuditSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    Msg::Record(record) => {
                        if let Err(e) = sink.append(*record).await {
                            error!("Failed to append audit record: {e:#}");
                        }
                    }
                    Msg::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });
        Self { tx }
    }

    /// Enqueues one record without waiting.
    pub fn record(&self, record: AuditRecord) {
        if self.tx.send(Msg::Record(Box::new(record))).is_err() {
            error!("Audit writer task is gone, dropping record");
        }
    }

    /// Waits until everything enqueued so far has reached the sink.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Msg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}
