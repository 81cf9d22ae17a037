//! Kinesis-shaped `ShardedStream`, grounded directly on
//! `gocdk/kinesis.go`'s `KinesisService`. Both of the original's read modes
//! are preserved: polling via `GetShardIterator`/`GetRecords` and listening
//! via `SubscribeToShard`, selected by `kinesis_do_listen` the same way the
//! original branches in `ReadStream`.

use async_trait::async_trait;
use aws_sdk_kinesis::types::{ShardIteratorType, StartingPosition};
use aws_sdk_kinesis::Client;
use sluice_core::Event;
use std::time::Duration;

use super::cursor::{CursorValue, LocalFileCursor, ShardInfo};
use super::ShardedStream;

/// How many consecutive empty `GetRecords` responses a polled shard
/// tolerates before the poll loop considers it drained for this cycle.
/// `GetRecords` may legitimately return zero records even when more data
/// exists, so a hard iterator-exhausted check alone is insufficient; this
/// mirrors the original's own comment: "the right solution is to use a
/// listener, not a poller; as a workaround, heuristic 100 calls in a row."
const EMPTY_RESPONSE_HEURISTIC: u32 = 100;

pub struct KinesisShardedStream {
    client: Option<Client>,
    name: String,
    region: String,
    stream_arn: String,
    shard_id: String,
    all_shards: bool,
    do_listen: bool,
    consumer_name: String,

    shard_list: Vec<ShardInfo>,
    consumer_arn: String,
    consumer_seq_no: String,
    cursor_restart: bool,
}

impl KinesisShardedStream {
    pub fn new(name: impl Into<String>, region: impl Into<String>, stream_arn: impl Into<String>) -> Self {
        Self {
            client: None,
            name: name.into(),
            region: region.into(),
            stream_arn: stream_arn.into(),
            shard_id: String::new(),
            all_shards: true,
            do_listen: false,
            consumer_name: String::new(),
            shard_list: Vec::new(),
            consumer_arn: String::new(),
            consumer_seq_no: String::new(),
            cursor_restart: true,
        }
    }

    pub fn with_single_shard(mut self, shard_id: impl Into<String>) -> Self {
        self.shard_id = shard_id.into();
        self.all_shards = false;
        self
    }

    pub fn with_listen(mut self, consumer_name: impl Into<String>) -> Self {
        self.do_listen = true;
        self.consumer_name = consumer_name.into();
        self
    }

    fn cursor_file_name(&self) -> String {
        format!("{}_kinesis", self.name)
    }

    /// Loads the durable cursor the way `LoadCursor` does: if a saved file
    /// exists, cursor_restart stays false and the saved values are used;
    /// otherwise this is a fresh start.
    pub fn load_cursor(&mut self, force_restart: bool) {
        let mut cursor = LocalFileCursor::new(&self.cursor_file_name());
        if !force_restart && cursor.exists() && cursor.deserialize().is_ok() {
            if self.do_listen {
                self.consumer_arn = cursor.get_string("consumerArn").unwrap_or_default();
                self.consumer_seq_no = cursor.get_string("consumerSeqNo").unwrap_or_default();
            } else if let Some(list) = cursor.get_shard_list("shardList") {
                self.shard_list = list;
            }
            self.cursor_restart = false;
        } else {
            self.cursor_restart = true;
        }
    }

    pub fn save_cursor(&self) -> anyhow::Result<()> {
        let mut cursor = LocalFileCursor::new(&self.cursor_file_name());
        if self.do_listen {
            cursor.set("consumerArn", CursorValue::Str(self.consumer_arn.clone()));
            cursor.set("consumerSeqNo", CursorValue::Str(self.consumer_seq_no.clone()));
        } else {
            cursor.set("shardList", CursorValue::ShardList(self.shard_list.clone()));
        }
        cursor.serialize()
    }

    /// Consumes `cursor_restart` for one `poll_once` call: the very first
    /// poll after construction/reload reads `AtSequenceNumber` (the loaded
    /// or initial starting sequence is itself the first unread record),
    /// every later poll reads `AfterSequenceNumber` against the
    /// previously-observed max sequence. Clearing the flag here rather
    /// than setting it back to `true` once the shard loop completes is
    /// what keeps a resumed poll from re-delivering its most recent record
    /// forever.
    fn take_poll_iterator_type(&mut self) -> ShardIteratorType {
        let restart = self.cursor_restart;
        self.cursor_restart = false;
        if restart {
            ShardIteratorType::AtSequenceNumber
        } else {
            ShardIteratorType::AfterSequenceNumber
        }
    }
}

#[async_trait]
impl ShardedStream for KinesisShardedStream {
    async fn authorize(&mut self) -> anyhow::Result<()> {
        let cfg = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_kinesis::config::Region::new(self.region.clone()))
            .load()
            .await;
        let client = Client::new(&cfg);

        let shards = client
            .list_shards()
            .stream_arn(&self.stream_arn)
            .send()
            .await?;

        let mut shard_list = Vec::new();
        for shard in shards.shards() {
            let id = shard.shard_id().to_string();
            if !self.all_shards && id != self.shard_id {
                continue;
            }
            let Some(range) = shard.sequence_number_range() else { continue };
            let ending_present = range.ending_sequence_number().is_some();
            shard_list.push(ShardInfo {
                shard_id: id,
                starting_sequence_number: range.starting_sequence_number().to_string(),
                max_sequence_present: ending_present,
                ending_sequence_number: range.ending_sequence_number().unwrap_or("").to_string(),
            });
        }

        if !shard_list.is_empty() {
            self.shard_list = shard_list;
        }
        self.client = Some(client);
        Ok(())
    }

    /// Mirrors `readStreamPoll`: for each tracked shard, get an iterator at
    /// or after its last-known sequence number, then loop `GetRecords`
    /// until the iterator is exhausted (`NextShardIterator` is null) or the
    /// shard has returned `EMPTY_RESPONSE_HEURISTIC` consecutive empty
    /// responses. Both exit conditions are checked every iteration, not
    /// just one, so a shard with a sparse but nonzero trickle of records
    /// still terminates this poll cycle.
    ///
    /// `cursor_restart` is consumed here, at the top of the call: the AT-vs-
    /// AFTER distinction applies only to the very first poll after
    /// construction/reload, so the flag is cleared before the shard loop
    /// runs rather than being set back to `true` once the loop completes
    /// (that would re-arm AT on every subsequent call and re-deliver the
    /// most recently observed record each cycle).
    async fn poll_once(&mut self) -> anyhow::Result<Vec<Event>> {
        let client = self.client.as_ref().expect("authorize() must run first").clone();
        let mut out = Vec::new();
        let iterator_type = self.take_poll_iterator_type();

        for shard in self.shard_list.iter_mut() {
            let shard_iter = client
                .get_shard_iterator()
                .stream_arn(&self.stream_arn)
                .shard_id(&shard.shard_id)
                .shard_iterator_type(iterator_type.clone())
                .starting_sequence_number(&shard.starting_sequence_number)
                .send()
                .await?;

            let mut iterator = shard_iter.shard_iterator().map(str::to_string);
            let mut null_count: u32 = 0;
            let mut max_seq = String::new();

            while let Some(itr) = iterator {
                let data = client
                    .get_records()
                    .stream_arn(&self.stream_arn)
                    .shard_iterator(&itr)
                    .send()
                    .await?;

                let records = data.records();
                if records.is_empty() {
                    null_count += 1;
                } else {
                    null_count = 0;
                }

                for record in records {
                    let seq = record.sequence_number();
                    if max_seq.is_empty() || max_seq.as_str() < seq {
                        max_seq = seq.to_string();
                    }
                    let payload = String::from_utf8_lossy(record.data().as_ref()).into_owned();
                    out.push(Event::new(payload));
                }

                tokio::time::sleep(Duration::from_secs(1)).await;
                iterator = data.next_shard_iterator().map(str::to_string);

                if iterator.is_none() || null_count >= EMPTY_RESPONSE_HEURISTIC {
                    break;
                }
            }

            if !max_seq.is_empty() {
                shard.starting_sequence_number = max_seq;
            }
        }

        Ok(out)
    }

    /// Mirrors `readStreamListen`: register a stream consumer if none is
    /// cached, poll for the stream and consumer to reach ACTIVE (10
    /// attempts, 1s apart, matching the original), then subscribe to the
    /// shard and drain its ~5-minute event window.
    async fn listen_once(&mut self) -> anyhow::Result<Vec<Event>> {
        let client = self.client.as_ref().expect("authorize() must run first").clone();

        if self.consumer_arn.is_empty() {
            let resp = client
                .register_stream_consumer()
                .stream_arn(&self.stream_arn)
                .consumer_name(&self.consumer_name)
                .send()
                .await?;
            self.consumer_arn = resp
                .consumer()
                .and_then(|c| c.consumer_arn())
                .unwrap_or_default()
                .to_string();
            tracing::info!(
                stream_arn = %self.stream_arn,
                consumer_name = %self.consumer_name,
                consumer_arn = %self.consumer_arn,
                "registered kinesis stream consumer"
            );
        }

        for _ in 0..10 {
            let resp = client.describe_stream_summary().stream_arn(&self.stream_arn).send().await;
            if let Ok(resp) = resp {
                if resp.stream_description_summary().map(|s| s.stream_status().as_str()) == Some("ACTIVE") {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        for _ in 0..10 {
            let resp = client.describe_stream_consumer().consumer_arn(&self.consumer_arn).send().await;
            if let Ok(resp) = resp {
                if resp.consumer_description().map(|c| c.consumer_status().as_str()) == Some("ACTIVE") {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        let starting_position = if self.cursor_restart {
            StartingPosition::builder().r#type(aws_sdk_kinesis::types::ShardIteratorType::TrimHorizon).build()?
        } else {
            StartingPosition::builder()
                .r#type(aws_sdk_kinesis::types::ShardIteratorType::AfterSequenceNumber)
                .sequence_number(self.consumer_seq_no.clone())
                .build()?
        };

        let mut response = client
            .subscribe_to_shard()
            .consumer_arn(&self.consumer_arn)
            .shard_id(&self.shard_id)
            .starting_position(starting_position)
            .send()
            .await?;

        let mut out = Vec::new();
        while let Ok(Some(event)) = response.event_stream.recv().await {
            if let aws_sdk_kinesis::types::SubscribeToShardEventStream::SubscribeToShardEvent(payload) = event {
                for record in payload.records() {
                    out.push(Event::new(String::from_utf8_lossy(record.data().as_ref()).into_owned()));
                }
                if let Some(seq) = payload.continuation_sequence_number() {
                    self.consumer_seq_no = seq.to_string();
                }
            }
        }

        self.cursor_restart = false;
        Ok(out)
    }

    fn does_listen(&self) -> bool {
        self.do_listen
    }

    fn cursor_name(&self) -> &str {
        &self.name
    }
}
