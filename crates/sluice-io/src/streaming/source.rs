//! Adapts any `ShardedStream` into a pull `Source`, persisting the durable
//! cursor after every read cycle the way `KinesisService` callers are
//! expected to call `SaveCursor` after `ReadStream` returns.

use async_trait::async_trait;
use sluice_core::traits::CapsuleTx;
use sluice_core::{EventBatch, Operator, Source, SourceKind};

use super::kinesis::KinesisShardedStream;
use super::ShardedStream;

pub struct StreamingSource {
    name: String,
    stream: KinesisShardedStream,
    authorized: bool,
}

impl StreamingSource {
    pub fn new(name: impl Into<String>, stream: KinesisShardedStream) -> Self {
        Self {
            name: name.into(),
            stream,
            authorized: false,
        }
    }
}

impl Operator for StreamingSource {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Source for StreamingSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Pull
    }

    async fn read(&mut self, _tx: &CapsuleTx) -> anyhow::Result<EventBatch> {
        if !self.authorized {
            self.stream.load_cursor(false);
            self.stream.authorize().await?;
            self.authorized = true;
        }

        let events = if self.stream.does_listen() {
            self.stream.listen_once().await?
        } else {
            self.stream.poll_once().await?
        };

        if let Err(e) = self.stream.save_cursor() {
            tracing::error!(error = %e, "failed to persist streaming cursor");
        }

        Ok(events)
    }
}
