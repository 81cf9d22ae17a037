//! Pull source reading newline-delimited events out of an S3 prefix,
//! grounded on `integrations/sources/source_s3.go`.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use sluice_core::traits::CapsuleTx;
use sluice_core::{Event, EventBatch, Operator, Source, SourceKind};

pub struct S3Source {
    name: String,
    bucket: String,
    prefix: String,
    client: Option<Client>,
    region: Option<String>,
}

impl S3Source {
    pub fn new(name: impl Into<String>, bucket: impl Into<String>, prefix: impl Into<String>, region: Option<String>) -> Self {
        Self {
            name: name.into(),
            bucket: bucket.into(),
            prefix: prefix.into(),
            client: None,
            region,
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

impl Operator for S3Source {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Source for S3Source {
    fn kind(&self) -> SourceKind {
        SourceKind::Pull
    }

    async fn read(&mut self, _tx: &CapsuleTx) -> anyhow::Result<EventBatch> {
        let bucket = self.bucket.clone();
        let prefix = self.prefix.clone();
        let client = self.client().await.clone();

        let mut events = EventBatch::new();

        let listing = client
            .list_objects_v2()
            .bucket(&bucket)
            .prefix(&prefix)
            .send()
            .await;
        let listing = match listing {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = %e, bucket, "couldn't list objects in bucket");
                return Ok(events);
            }
        };

        for object in listing.contents() {
            let Some(key) = object.key() else { continue };
            match client.get_object().bucket(&bucket).key(key).send().await {
                Ok(output) => match output.body.collect().await {
                    Ok(bytes) => {
                        let content = String::from_utf8_lossy(&bytes.into_bytes()).into_owned();
                        events.extend(content.lines().map(Event::new));
                    }
                    Err(e) => tracing::error!(error = %e, bucket, key, "couldn't read object body"),
                },
                Err(e) => tracing::error!(error = %e, bucket, key, "couldn't get object"),
            }
        }

        Ok(events)
    }
}
