//! S3 sink. `integrations/sinks/sink_s3.go` is a stub ("Replace here"), so
//! this is built directly to the runtime contract in spec.md §6: concatenate
//! events with newlines and write the result to `<prefix>/<filename>` in a
//! configured bucket, mirroring how `S3Source` already talks to the same
//! service for reads.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sluice_core::{Event, Operator, Sink};

pub struct S3Sink {
    bucket: String,
    region: Option<String>,
    client: Option<Client>,
}

impl S3Sink {
    pub fn new(bucket: impl Into<String>, region: Option<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region,
            client: None,
        }
    }

    async fn client(&mut self) -> &Client {
        if self.client.is_none() {
            let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
            if let Some(region) = &self.region {
                loader = loader.region(aws_sdk_s3::config::Region::new(region.clone()));
            }
            let cfg = loader.load().await;
            self.client = Some(Client::new(&cfg));
        }
        self.client.as_ref().expect("initialized above")
    }
}

impl Operator for S3Sink {
    fn name(&self) -> &str {
        "s3"
    }
}

#[async_trait]
impl Sink for S3Sink {
    async fn flush(&mut self, filename: &str, prefix: &str, events: &[Event]) -> anyhow::Result<()> {
        tracing::info!(prefix, filename, "flush to s3");
        let body = events.iter().map(Event::as_str).collect::<Vec<_>>().join("\n");
        let key = format!("{}/{}", prefix.trim_end_matches('/'), filename);
        let bucket = self.bucket.clone();
        let client = self.client().await.clone();
        client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .body(ByteStream::from(body.into_bytes()))
            .send()
            .await?;
        Ok(())
    }
}
