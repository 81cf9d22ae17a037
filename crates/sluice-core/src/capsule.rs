//! Channel message types carried between the three pipeline workers.
//!
//! Mirrors `capsule.Capsule` / `capsule.SinkTimerCapsule` one-for-one: a
//! capsule optionally carries a sink identity (set once it is routed to a
//! specific sink) and a prefix (set once it is routed to a specific flush
//! channel).

use crate::event::EventBatch;
use crate::op::OpId;
use std::time::Instant;

/// A batch of events in flight between workers, optionally tagged with the
/// sink it is destined for and/or the time-bucket prefix it was routed to.
#[derive(Debug, Clone)]
pub struct Capsule {
    pub sink_id: Option<OpId>,
    pub prefix: Option<String>,
    pub events: EventBatch,
}

impl Capsule {
    pub fn for_sink(sink_id: OpId, events: EventBatch) -> Self {
        Self { sink_id: Some(sink_id), prefix: None, events }
    }
}

/// The message unit on a flush channel: a flushed buffer plus the filename
/// and prefix the batcher derived for it. Distinct from `Capsule` since a
/// flush worker never needs a sink identity (it owns exactly one sink) but
/// does need the filename the batcher computed at flush time.
#[derive(Debug, Clone)]
pub struct FlushCapsule {
    pub filename: String,
    pub prefix: String,
    pub events: EventBatch,
}

/// A delayed flush hint emitted by the Timer Service. `last_flush` is the
/// epoch of the buffer at the moment the timer was scheduled; the sink
/// batcher ignores the message if the buffer's current epoch no longer
/// matches it.
#[derive(Debug, Clone)]
pub struct TimerMessage {
    pub sink_id: OpId,
    pub prefix: String,
    pub last_flush: Instant,
}
