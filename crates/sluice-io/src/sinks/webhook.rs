//! Datadog, Elastic and Splunk sinks. The corresponding originals
//! (`sink_datadog.go`, `sink_elastic.go`, `sink_splunk.go`) are all stub
//! printers with a literal "Replace here" comment where the real HTTP call
//! would go, so these are kept at the same stub fidelity: a structured log
//! line recording what *would* be shipped, rather than an invented wire
//! format for a vendor the originals never actually integrated.

use async_trait::async_trait;
use sluice_core::{Event, Operator, Sink};

macro_rules! webhook_sink {
    ($name:ident, $label:expr) => {
        pub struct $name {
            pub endpoint: String,
        }

        impl $name {
            pub fn new(endpoint: impl Into<String>) -> Self {
                Self { endpoint: endpoint.into() }
            }
        }

        impl Operator for $name {
            fn name(&self) -> &str {
                $label
            }
        }

        #[async_trait]
        impl Sink for $name {
            async fn flush(&mut self, _filename: &str, prefix: &str, events: &[Event]) -> anyhow::Result<()> {
                tracing::info!(prefix, endpoint = %self.endpoint, events = events.len(), concat!("flush to ", $label));
                Ok(())
            }
        }
    };
}

webhook_sink!(DatadogSink, "datadog");
webhook_sink!(ElasticSink, "elastic");
webhook_sink!(SplunkSink, "splunk");
