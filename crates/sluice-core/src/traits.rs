//! Source/Transform/Sink adapter traits, generalized from the teacher's
//! `rde_core::{Operator, Source, Transform, Sink}` to move `Capsule`s of
//! JSON-text events instead of Arrow `RecordBatch`es.

use crate::capsule::Capsule;
use crate::event::EventBatch;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub type CapsuleTx = mpsc::Sender<Capsule>;
pub type CapsuleRx = mpsc::Receiver<Capsule>;

/// Common metadata every adapter exposes.
pub trait Operator: Send + Sync {
    fn name(&self) -> &str;
}

/// Whether a source drives its own schedule (`push`) or is invoked on an
/// interval by the Source Worker (`pull`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pull,
    Push,
}

/// A pluggable event producer. `read` is invoked by the Source Worker for
/// pull sources; push sources spawn their own producer task the first time
/// `read` is called and return immediately, matching
/// `HTTPServerSource.Read`'s "starts a goroutine, returns `[]string{}`"
/// shape.
#[async_trait]
pub trait Source: Operator {
    fn kind(&self) -> SourceKind;

    /// For pull sources, performs one read and returns the batch. For push
    /// sources, starts the producer (writing onto `tx` itself) and returns
    /// an empty batch.
    async fn read(&mut self, tx: &CapsuleTx) -> anyhow::Result<EventBatch>;

    /// Runs once per pipeline shutdown, on every exit path.
    async fn clean_up(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Runs a pull source's interval loop until cancellation, matching the
/// Source Worker's pull-loop `select!` in spec.md §4.2.
pub async fn run_pull_source(
    mut source: Box<dyn Source>,
    tx: CapsuleTx,
    interval: std::time::Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = source.clean_up().await;
                return;
            }
            _ = async {
                let started = tokio::time::Instant::now();
                match source.read(&tx).await {
                    Ok(events) if !events.is_empty() => {
                        let capsule = Capsule { sink_id: None, prefix: None, events };
                        if tx.send(capsule).await.is_err() {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "source read failed, yielding empty batch"),
                }
                let elapsed = started.elapsed();
                let sleep_for = interval.saturating_sub(elapsed);
                tokio::time::sleep(sleep_for).await;
            } => {}
        }
    }
}

/// Runs a push source: calls `read` once to let it start its own producer,
/// then waits for cancellation before cleaning up.
pub async fn run_push_source(mut source: Box<dyn Source>, tx: CapsuleTx, cancel: CancellationToken) {
    if let Err(e) = source.read(&tx).await {
        tracing::error!(error = %e, "push source failed to start");
        return;
    }
    cancel.cancelled().await;
    let _ = source.clean_up().await;
}

/// A pure, synchronous per-batch transform. All dispatch (operator-name ->
/// function) lives in `sluice-tx`; this trait exists so the runtime can
/// treat built-ins and any future dynamically-loaded transform uniformly.
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, events: EventBatch) -> EventBatch;
}

/// A sink's durable write-out contract: `(filename, prefix, events)`.
#[async_trait]
pub trait Sink: Operator + Send + Sync {
    async fn init(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn flush(&mut self, filename: &str, prefix: &str, events: &[crate::event::Event]) -> anyhow::Result<()>;
}
