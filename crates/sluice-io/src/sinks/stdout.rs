//! Sink that writes flushed batches to standard output, grounded on
//! `integrations/sinks/sink_stdout.go`. Mostly useful for local testing of
//! a task graph end to end.

use async_trait::async_trait;
use sluice_core::{Event, Operator, Sink};

#[derive(Default)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

impl Operator for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }
}

#[async_trait]
impl Sink for StdoutSink {
    async fn flush(&mut self, _filename: &str, prefix: &str, events: &[Event]) -> anyhow::Result<()> {
        tracing::info!(prefix, "flush to stdout");
        let joined = events.iter().map(Event::as_str).collect::<Vec<_>>().join("\n");
        println!("{joined}");
        Ok(())
    }
}
