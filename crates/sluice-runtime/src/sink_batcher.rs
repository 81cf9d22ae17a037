//! Sink Batcher: the central hard part. One worker per pipeline, owning
//! every sink's `SinkConfig` and the per-prefix `BatchBuffer`s underneath
//! it. Grounded 1:1 on `original_source/execute/sinkNode.go`'s
//! `sinkBatch`/`sinkAddToBuffer`/`flushSinkBuffer`/`handleSinkTimer`:
//! buffers are destroyed and recreated on every flush (never reset in
//! place), and a timer message only has effect if the buffer it names has
//! not been replaced since the timer was scheduled (spec.md §9's resolved
//! Open Question).

use chrono::{DateTime, Utc};
use sluice_core::traits::CapsuleRx;
use sluice_core::{Event, EventBatch, FlushCapsule, Op, OpId, OpKind, Sink, TimerMessage};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::flush_worker::spawn_flush_worker;
use crate::timer_service::schedule_flush_timer;

/// One sink's batching state: the fields spec.md §3 lists, plus the
/// buffer map it owns directly (spec.md: "per-prefix buffer map" is a
/// Sink Config field, not a separate structure).
pub struct SinkConfig {
    pub id: OpId,
    pub operator: String,
    pub flush_tx: mpsc::Sender<FlushCapsule>,
    pub batch_max_bytes: usize,
    pub batch_max_time: Duration,
    pub prefix_pattern: String,
    pub filename_pattern: String,
    pub timestamp_path: String,
    pub timestamp_format: String,
    buffers: HashMap<String, BatchBuffer>,
}

/// A live batch for one (sink, prefix) pair. `epoch` is the buffer's
/// creation instant, doubling as the snapshot its scheduled timer carries;
/// it is never updated in place, only replaced wholesale on flush.
struct BatchBuffer {
    events: EventBatch,
    size: usize,
    epoch: Instant,
}

impl BatchBuffer {
    fn new() -> Self {
        Self { events: Vec::new(), size: 0, epoch: Instant::now() }
    }
}

impl SinkConfig {
    fn from_op(op: &Op, flush_tx: mpsc::Sender<FlushCapsule>) -> Self {
        Self {
            id: op.id,
            operator: op.operator.clone(),
            flush_tx,
            batch_max_bytes: op.int_arg("batch_max_bytes").unwrap_or(2_500).max(1) as usize,
            batch_max_time: Duration::from_secs(op.int_arg("batch_max_time_secs").unwrap_or(2).max(1) as u64),
            prefix_pattern: op.str_arg("prefix_pattern").unwrap_or("%Y/%m/%H").to_string(),
            filename_pattern: op.str_arg("filename_pattern").unwrap_or("%s.log").to_string(),
            timestamp_path: op.str_arg("timestamp_path").unwrap_or("time").to_string(),
            timestamp_format: op.str_arg("timestamp_format").unwrap_or("rfc3339").to_string(),
            buffers: HashMap::new(),
        }
    }
}

/// Recursively collects every sink op reachable from `ops`, including
/// those nested inside (possibly nested) branches, matching spec.md §3's
/// "every event path terminates at exactly one sink op."
fn collect_sink_ops(ops: &[Op], out: &mut Vec<Op>) {
    for op in ops {
        match op.kind {
            OpKind::Sink => out.push(op.clone()),
            OpKind::Branch => {
                for child in &op.branches {
                    collect_sink_ops(child, out);
                }
            }
            _ => {}
        }
    }
}

/// Builds one `SinkConfig` (and spawns its flush worker) per sink op in
/// the task graph. `chan_buffer_len` sizes each flush channel, matching
/// `settings.DefChanBufferLen` sizing `FlushChan` in the original.
fn build_sink_configs(ops: &[Op], chan_buffer_len: usize) -> (HashMap<OpId, SinkConfig>, Vec<tokio::task::JoinHandle<()>>) {
    let mut sink_ops = Vec::new();
    collect_sink_ops(ops, &mut sink_ops);

    let mut configs = HashMap::new();
    let mut handles = Vec::new();
    for op in &sink_ops {
        let sink: Box<dyn Sink> = match sluice_io::build_sink(op) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::error!(error = %e, operator = %op.operator, "failed to build sink adapter, skipping");
                continue;
            }
        };
        let (flush_tx, flush_rx) = mpsc::channel(chan_buffer_len);
        handles.push(spawn_flush_worker(sink, flush_rx));
        configs.insert(op.id, SinkConfig::from_op(op, flush_tx));
    }
    (configs, handles)
}

/// Runs the sink batcher until `tn_rx` closes, at which point every
/// remaining buffer of every sink is flushed (in deterministic sink-id
/// then prefix order) and every flush channel is closed, letting flush
/// workers drain and exit. Like the transform worker, there is no direct
/// cancellation signal here: `tn_rx` closing (propagated from upstream) is
/// the only shutdown trigger, so every capsule already in the channel is
/// routed and every live buffer is flushed before this returns.
pub async fn run_sink_batcher(ops: Vec<Op>, mut tn_rx: CapsuleRx, chan_buffer_len: usize) {
    let (mut configs, flush_handles) = build_sink_configs(&ops, chan_buffer_len);
    let (timer_tx, mut timer_rx) = mpsc::channel::<TimerMessage>(chan_buffer_len);

    loop {
        tokio::select! {
            biased;
            timer = timer_rx.recv() => {
                match timer {
                    Some(timer) => handle_timer(&mut configs, timer).await,
                    None => break,
                }
            }
            capsule = tn_rx.recv() => {
                match capsule {
                    Some(capsule) => {
                        if let Some(sink_id) = capsule.sink_id {
                            route_events(&mut configs, sink_id, capsule.events, &timer_tx).await;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    // Drain anything already queued, then shut down: flush every buffer of
    // every sink config in deterministic (sink id, prefix) order.
    while let Ok(capsule) = tn_rx.try_recv() {
        if let Some(sink_id) = capsule.sink_id {
            route_events(&mut configs, sink_id, capsule.events, &timer_tx).await;
        }
    }

    let mut sink_ids: Vec<OpId> = configs.keys().copied().collect();
    sink_ids.sort();
    for sink_id in sink_ids {
        if let Some(config) = configs.get_mut(&sink_id) {
            let mut prefixes: Vec<String> = config.buffers.keys().cloned().collect();
            prefixes.sort();
            for prefix in prefixes {
                flush_prefix(config, &prefix).await;
            }
        }
    }
    // Dropping `configs` here drops every `flush_tx`, closing each flush
    // channel so its flush worker drains and exits.
    drop(configs);
    for handle in flush_handles {
        let _ = handle.await;
    }
}

/// Routes each event in a just-arrived batch to its (sink, prefix)
/// buffer, computing the prefix from the event's own timestamp field per
/// spec.md §4.4 step (1)-(3). Events whose timestamp is missing or
/// unparseable are dropped with a log, matching §7 error kind 3.
async fn route_events(configs: &mut HashMap<OpId, SinkConfig>, sink_id: OpId, events: EventBatch, timer_tx: &mpsc::Sender<TimerMessage>) {
    let Some(config) = configs.get_mut(&sink_id) else {
        tracing::error!(%sink_id, "received capsule for unknown sink id");
        return;
    };

    for event in events {
        let Some(timestamp) = event_timestamp(&event, &config.timestamp_path, &config.timestamp_format) else {
            tracing::warn!(path = %config.timestamp_path, "event missing/unparseable timestamp, dropping");
            continue;
        };
        let prefix = render_strftime(&config.prefix_pattern, timestamp);
        append_event(config, &prefix, event, timer_tx).await;
    }
}

/// Appends one event to its buffer, flushing first if the event would
/// overflow `batch_max_bytes`, matching spec.md §4.4's append policy
/// exactly.
async fn append_event(config: &mut SinkConfig, prefix: &str, event: Event, timer_tx: &mpsc::Sender<TimerMessage>) {
    if !config.buffers.contains_key(prefix) {
        create_buffer(config, prefix, timer_tx);
    }

    let event_size = event.byte_len();
    let fits = {
        let buffer = config.buffers.get(prefix).expect("just created above");
        event_size + buffer.size <= config.batch_max_bytes
    };

    if !fits {
        tracing::info!(sink_id = %config.id, prefix, "flush: max bytes");
        flush_prefix(config, prefix).await;
        create_buffer(config, prefix, timer_tx);
    }

    let buffer = config.buffers.get_mut(prefix).expect("just ensured above");
    buffer.events.push(event);
    buffer.size += event_size;
}

/// Creates a fresh, empty buffer for `prefix` and schedules its expiry
/// timer. Invariant: at most one live buffer per (sink, prefix) exists at
/// any instant, so this must only be called when none already does.
fn create_buffer(config: &mut SinkConfig, prefix: &str, timer_tx: &mpsc::Sender<TimerMessage>) {
    let buffer = BatchBuffer::new();
    let epoch = buffer.epoch;
    config.buffers.insert(prefix.to_string(), buffer);
    schedule_flush_timer(timer_tx.clone(), config.id, prefix.to_string(), epoch, config.batch_max_time);
}

/// Flushes and destroys the buffer for `prefix`, if one exists. Destroying
/// (rather than resetting in place) is what makes the timer epoch check
/// sound: a stale timer snapshot can never equal a freshly created
/// buffer's epoch, because the old buffer no longer exists to compare
/// against. An empty buffer still sends a capsule on the flush channel,
/// but flush workers must not forward an empty event list to the sink
/// (spec.md §8 boundary behavior).
async fn flush_prefix(config: &mut SinkConfig, prefix: &str) {
    let Some(buffer) = config.buffers.remove(prefix) else { return };
    let filename = derive_filename(config, &buffer.events);
    let capsule = FlushCapsule { filename, prefix: prefix.to_string(), events: buffer.events };
    if config.flush_tx.send(capsule).await.is_err() {
        tracing::warn!(sink_id = %config.id, prefix, "flush channel closed, dropping buffer");
    }
}

/// Handles a delayed flush-hint: ignored unless the named buffer still
/// exists *and* its current epoch still matches the timer's snapshot,
/// matching spec.md §4.4/§4.5/§9 exactly.
async fn handle_timer(configs: &mut HashMap<OpId, SinkConfig>, timer: TimerMessage) {
    let Some(config) = configs.get_mut(&timer.sink_id) else { return };
    let still_current = config.buffers.get(&timer.prefix).map(|b| b.epoch) == Some(timer.last_flush);
    if still_current {
        tracing::info!(sink_id = %timer.sink_id, prefix = %timer.prefix, "flush: max time");
        flush_prefix(config, &timer.prefix).await;
    }
}

/// Reparses the last event's timestamp through `filename_pattern`; falls
/// back to a fresh UUID when the buffer is empty or parsing fails,
/// matching spec.md §4.6.
fn derive_filename(config: &SinkConfig, events: &[Event]) -> String {
    events
        .last()
        .and_then(|e| event_timestamp(e, &config.timestamp_path, &config.timestamp_format))
        .map(|ts| render_strftime(&config.filename_pattern, ts))
        .unwrap_or_else(|| format!("{}.log", uuid::Uuid::new_v4()))
}

fn event_timestamp(event: &Event, path: &str, format: &str) -> Option<DateTime<Utc>> {
    let raw = event.get_string(path)?;
    parse_timestamp(&raw, format)
}

fn parse_timestamp(raw: &str, format: &str) -> Option<DateTime<Utc>> {
    if format.eq_ignore_ascii_case("rfc3339") {
        DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
    } else {
        DateTime::parse_from_str(raw, format)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw, format).map(|naive| naive.and_utc()))
            .ok()
    }
}

/// Renders a strftime-style pattern against `timestamp`. `chrono`'s own
/// format specifiers (`%Y`, `%m`, `%H`, ...) are already strftime
/// compatible; the one extension spec.md calls for, a literal Unix-seconds
/// token (`%s`), is substituted by hand before the rest of the pattern is
/// handed to `chrono::DateTime::format`.
fn render_strftime(pattern: &str, timestamp: DateTime<Utc>) -> String {
    let with_unix_seconds = pattern.replace("%s", &timestamp.timestamp().to_string());
    timestamp.format(&with_unix_seconds).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::OpKind;

    fn sink_op(id: OpId, max_bytes: i64, max_time: i64) -> Op {
        Op {
            id,
            kind: OpKind::Sink,
            operator: "stdout".into(),
            args: serde_json::Map::from_iter([
                ("batch_max_bytes".into(), serde_json::json!(max_bytes)),
                ("batch_max_time_secs".into(), serde_json::json!(max_time)),
                ("prefix_pattern".into(), serde_json::json!("%Y/%m/%H")),
            ]),
            secret: None,
            branches: vec![],
        }
    }

    #[test]
    fn render_strftime_substitutes_unix_seconds_and_calendar_fields() {
        let ts = DateTime::parse_from_rfc3339("2026-07-28T09:00:00Z").unwrap().with_timezone(&Utc);
        let rendered = render_strftime("%Y/%m/%H-%s", ts);
        assert_eq!(rendered, format!("2026/07/09-{}", ts.timestamp()));
    }

    #[tokio::test]
    async fn s1_batch_by_size_flushes_in_order_at_exactly_30_bytes() {
        let (tx, mut rx) = mpsc::channel(8);
        let id = OpId::new();
        let mut config = SinkConfig::from_op(&sink_op(id, 30, 3600), tx);
        let (timer_tx, _timer_rx) = mpsc::channel(8);

        // Four 10-byte events sharing one prefix: the third fills the
        // buffer to exactly batch_max_bytes (no flush yet, per spec.md
        // §8's boundary behavior), the fourth overflows it.
        let events: Vec<Event> = (0..4u32).map(ten_byte_event).collect();
        for event in events {
            append_event(&mut config, "2026/07/28/09", event, &timer_tx).await;
        }
        // Simulate the end of the scenario (e.g. shutdown) flushing what's left.
        flush_prefix(&mut config, "2026/07/28/09").await;

        let first_flush = rx.recv().await.unwrap();
        assert_eq!(first_flush.events.len(), 3);
        let second_flush = rx.try_recv().unwrap();
        assert_eq!(second_flush.events.len(), 1);
    }

    fn ten_byte_event(n: u32) -> Event {
        // 10 ASCII bytes exactly: "evt_000001" style, padded/truncated to 10.
        let raw = format!("evt_{n:06}");
        assert_eq!(raw.len(), 10);
        Event::new(raw)
    }

    #[tokio::test]
    async fn timer_with_stale_epoch_is_ignored_after_a_mid_byte_flush() {
        let (tx, mut rx) = mpsc::channel(8);
        let id = OpId::new();
        let mut config = SinkConfig::from_op(&sink_op(id, 10, 3600), tx);
        let (timer_tx, _timer_rx) = mpsc::channel(8);

        create_buffer(&mut config, "p", &timer_tx);
        let stale_epoch = config.buffers.get("p").unwrap().epoch;
        let stale_timer = TimerMessage { sink_id: id, prefix: "p".to_string(), last_flush: stale_epoch };

        // A size-triggered flush destroys the buffer and creates a fresh one.
        append_event(&mut config, "p", ten_byte_event(0), &timer_tx).await;
        append_event(&mut config, "p", ten_byte_event(1), &timer_tx).await;

        let mut configs = HashMap::new();
        configs.insert(id, config);
        handle_timer(&mut configs, stale_timer).await;

        // The stale timer must not have triggered an extra flush: exactly
        // one flush (the max-bytes one) should be observed.
        assert_eq!(rx.recv().await.unwrap().events.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn shutdown_sends_empty_capsule_for_untouched_prefix() {
        // Buffer created but never written to: flushing it on shutdown
        // must still send a capsule (possibly empty) rather than silently
        // dropping it, per spec.md §8's empty-buffer boundary behavior.
        let (tx, mut rx) = mpsc::channel(8);
        let id = OpId::new();
        let mut config = SinkConfig::from_op(&sink_op(id, 10, 3600), tx);
        let (timer_tx, _timer_rx) = mpsc::channel(8);
        create_buffer(&mut config, "p", &timer_tx);

        flush_prefix(&mut config, "p").await;
        let flushed = rx.recv().await.unwrap();
        assert!(flushed.events.is_empty());
    }
}
