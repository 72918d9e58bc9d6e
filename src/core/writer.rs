use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::runtime::store::BlockGateway;
use crate::schemas::BlockRecord;

enum WriteOp {
    Upsert(BlockRecord),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Bounded queue in front of the gateway, drained by a single writer task.
///
/// Producers wait when the queue is full. Write failures are logged by the writer and never
/// reach the producer.
pub struct WriteQueue {
    tx: mpsc::Sender<WriteOp>,
}

impl WriteQueue {
    /// Spawn the writer on the current tokio runtime.
    pub fn spawn<G: BlockGateway>(gateway: Arc<G>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_writer(gateway, rx));
        Self { tx }
    }

    pub async fn enqueue(&self, record: BlockRecord) {
        let height = record.height;
        if self.tx.send(WriteOp::Upsert(record)).await.is_err() {
            warn!(height, "[writer] queue closed, dropping write");
        }
    }

    /// Resolves once every write enqueued before this call has been applied (or failed).
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(WriteOp::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Apply every write enqueued before this call, then stop the writer. Writes that race in
    /// behind the shutdown marker, and any enqueued after it, are dropped with a warning.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(WriteOp::Shutdown(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

async fn run_writer<G: BlockGateway>(gateway: Arc<G>, mut rx: mpsc::Receiver<WriteOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Upsert(record) => {
                let height = record.height;
                let gw = gateway.clone();
                match tokio::task::spawn_blocking(move || gw.upsert(&record)).await {
                    Ok(Ok(_)) => debug!(height, "[writer] stored block"),
                    Ok(Err(e)) => error!(height, error = %e, "[writer] failed to store block"),
                    Err(e) => error!(height, error = %e, "[writer] upsert task panicked"),
                }
            }
            WriteOp::Flush(ack) => {
                let _ = ack.send(());
            }
            WriteOp::Shutdown(ack) => {
                rx.close();
                let mut dropped = 0usize;
                while let Ok(op) = rx.try_recv() {
                    match op {
                        WriteOp::Upsert(_) => dropped += 1,
                        WriteOp::Flush(ack) | WriteOp::Shutdown(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
                if dropped > 0 {
                    warn!(dropped, "[writer] discarded writes queued behind shutdown");
                }
                let _ = ack.send(());
                break;
            }
        }
    }
    debug!("[writer] stopped");
}
