//! A canned demo/test source, grounded on
//! `integrations/sources/source_random.go`: a fixed set of log-flavored
//! events with a live timestamp, useful for exercising a pipeline without a
//! real upstream.

use async_trait::async_trait;
use chrono::Utc;
use sluice_core::traits::CapsuleTx;
use sluice_core::{Event, EventBatch, Operator, Source, SourceKind};

pub struct RandomSource {
    name: String,
}

impl RandomSource {
    pub fn new() -> Self {
        Self { name: "random".to_string() }
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for RandomSource {
    fn name(&self) -> &str {
        &self.name
    }
}

const TEMPLATES: &[(&str, &str, &str)] = &[
    ("Alderaan", "Toto, I've got a feeling we're not in Kansas anymore", "info"),
    ("Bantha", "Here's looking at you, kid", "debug"),
    ("Cantina", "Go ahead, make my day", "alert"),
    ("Dagobah", "The stuff that dreams are made of", "warning"),
    ("Endor", "Louis, I think this is the beginning of a beautiful friendship", "alert"),
    ("Falcon", "There's no place like home", "info"),
    ("Greedo", "Today, I consider myself the luckiest man on the face of the earth", "warning"),
    ("Hoth", "Every time a bell rings an angel gets his wings", "info"),
];

#[async_trait]
impl Source for RandomSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Pull
    }

    async fn read(&mut self, _tx: &CapsuleTx) -> anyhow::Result<EventBatch> {
        let now = Utc::now().to_rfc3339();
        let events = TEMPLATES
            .iter()
            .map(|(hostname, msg, severity)| {
                Event::new(
                    serde_json::json!({
                        "hostname": hostname,
                        "t": true,
                        "f": false,
                        "msg": msg,
                        "severity": severity,
                        "time": now,
                    })
                    .to_string(),
                )
            })
            .collect();
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_returns_eight_events_with_time_field() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let mut source = RandomSource::new();
        let batch = source.read(&tx).await.unwrap();
        assert_eq!(batch.len(), 8);
        assert!(batch[0].get("time").is_some());
    }
}
