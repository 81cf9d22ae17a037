//! Timer Service: schedules a delayed flush-hint message for a newly
//! created buffer, grounded on `original_source/execute/sinkNode.go`'s
//! `startSinkTimer` (sleep-then-send). Fire-and-forget: the sink batcher
//! discards any timer whose buffer has since been replaced (see
//! `sink_batcher`'s epoch check).

use sluice_core::{OpId, TimerMessage};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Spawns a one-shot timer task that sleeps for `batch_max_time` and then
/// sends `(sink_id, prefix, epoch)` on `timer_tx`, matching spec.md §4.5.
/// The send is best-effort: a closed channel (pipeline shutting down)
/// means there is nothing left to notify.
pub fn schedule_flush_timer(
    timer_tx: mpsc::Sender<TimerMessage>,
    sink_id: OpId,
    prefix: String,
    epoch: Instant,
    batch_max_time: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(batch_max_time).await;
        let message = TimerMessage { sink_id, prefix, last_flush: epoch };
        let _ = timer_tx.send(message).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timer_fires_after_configured_duration() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink_id = OpId::new();
        let epoch = Instant::now();
        schedule_flush_timer(tx, sink_id, "2026/07/28".to_string(), epoch, Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(5)).await;
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.sink_id, sink_id);
        assert_eq!(msg.last_flush, epoch);
    }
}
