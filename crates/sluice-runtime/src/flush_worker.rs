//! Flush Worker: one per sink op, reading flushed buffers off its flush
//! channel and invoking `Sink::flush`. Grounded on
//! `original_source/execute/sinkNode.go`'s `flushNode`.

use sluice_core::{FlushCapsule, Sink};
use tokio::sync::mpsc;

/// Spawns a flush worker that drains `flush_rx` until the channel closes.
/// Sink errors are logged and do not propagate — at this layer the
/// pipeline is best-effort at-least-once, per spec.md §4.6/§7 kind 2. An
/// empty event list (a shutdown flush of a buffer nothing was ever written
/// to) is not forwarded to the sink.
pub fn spawn_flush_worker(mut sink: Box<dyn Sink>, mut flush_rx: mpsc::Receiver<FlushCapsule>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = sink.init().await {
            tracing::error!(sink = sink.name(), error = %e, "sink failed to initialize");
            return;
        }

        while let Some(capsule) = flush_rx.recv().await {
            if capsule.events.is_empty() {
                continue;
            }
            if let Err(e) = sink.flush(&capsule.filename, &capsule.prefix, &capsule.events).await {
                tracing::error!(
                    sink = sink.name(),
                    prefix = %capsule.prefix,
                    filename = %capsule.filename,
                    error = %e,
                    "sink flush failed"
                );
            }
        }

        tracing::info!(sink = sink.name(), "flush worker exiting, channel closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sluice_core::{Event, Operator};
    use std::sync::{Arc, Mutex};

    struct RecordingSink {
        flushes: Arc<Mutex<Vec<(String, String, usize)>>>,
    }

    impl Operator for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn flush(&mut self, filename: &str, prefix: &str, events: &[Event]) -> anyhow::Result<()> {
            self.flushes.lock().unwrap().push((filename.to_string(), prefix.to_string(), events.len()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn empty_event_list_is_not_forwarded_to_the_sink() {
        let flushes = Arc::new(Mutex::new(Vec::new()));
        let sink = Box::new(RecordingSink { flushes: flushes.clone() });
        let (tx, rx) = mpsc::channel(4);
        let handle = spawn_flush_worker(sink, rx);

        tx.send(FlushCapsule { filename: "a".into(), prefix: "p".into(), events: vec![] }).await.unwrap();
        tx.send(FlushCapsule { filename: "b".into(), prefix: "p".into(), events: vec![Event::new("{}")] }).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let recorded = flushes.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0], ("b".to_string(), "p".to_string(), 1));
    }
}
