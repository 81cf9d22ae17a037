pub mod external_process;
pub mod http_push;
pub mod random;
pub mod s3;
pub mod util;

use external_process::ExternalProcessSource;
use http_push::HttpPushSource;
use random::RandomSource;
use s3::S3Source;
use sluice_core::{Op, Source, SluiceError};

use crate::streaming::kinesis::KinesisShardedStream;
use crate::streaming::source::StreamingSource;

/// Builds a source adapter from a source op, dispatching on the operator
/// name the way `identifySource`/`initSinkNode` dispatch on `taskGraph[0].Op`
/// for sources and sink types. Used both at Source Worker startup and by
/// the Secret Refresher's rebuild path.
pub fn build_source(op: &Op) -> Result<Box<dyn Source>, SluiceError> {
    match op.operator.as_str() {
        "random" => Ok(Box::new(RandomSource::new())),
        "s3" => {
            let bucket = op
                .str_arg("bucket")
                .ok_or_else(|| SluiceError::Configuration("s3 source missing args.bucket".into()))?;
            let prefix = op.str_arg("prefix").unwrap_or("").to_string();
            let region = op.str_arg("region").map(str::to_string);
            Ok(Box::new(S3Source::new(op.operator.clone(), bucket, prefix, region)))
        }
        "http" => {
            let endpoint = op.str_arg("endpoint").unwrap_or("/events").to_string();
            let port = op.int_arg("port").unwrap_or(8088) as u16;
            Ok(Box::new(HttpPushSource::new(op.operator.clone(), endpoint, port)))
        }
        "external-process" => {
            let command = op
                .str_arg("command")
                .ok_or_else(|| SluiceError::Configuration("external-process source missing args.command".into()))?
                .to_string();
            let args = op
                .args
                .get("args")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            let interpreter_path = op.str_arg("interpreter_path").unwrap_or("").to_string();
            Ok(Box::new(ExternalProcessSource::new(op.operator.clone(), command, args, interpreter_path)))
        }
        "kinesis" => {
            let region = op
                .str_arg("region")
                .ok_or_else(|| SluiceError::Configuration("kinesis source missing args.region".into()))?;
            let stream_arn = op
                .str_arg("stream_arn")
                .ok_or_else(|| SluiceError::Configuration("kinesis source missing args.stream_arn".into()))?;
            let all_shards = op.args.get("all_shards").and_then(|v| v.as_bool()).unwrap_or(true);
            let shard_id = op.str_arg("shard_id");
            let listen = op.str_arg("consumer_name");

            if listen.is_some() {
                // Listen mode subscribes to exactly one shard via
                // SubscribeToShard, so "all shards" and "no shard id" are
                // both invalid, matching CheckValidConfig's
                // KinesisDoListen branch.
                if all_shards {
                    return Err(SluiceError::Configuration(
                        "kinesis source: listen mode (consumer_name) and all_shards are mutually exclusive".into(),
                    ));
                }
                if shard_id.is_none() {
                    return Err(SluiceError::Configuration(
                        "kinesis source: listen mode (consumer_name) requires args.shard_id".into(),
                    ));
                }
            } else if !all_shards && shard_id.is_none() {
                return Err(SluiceError::Configuration(
                    "kinesis source: all_shards=false requires args.shard_id".into(),
                ));
            }

            let mut stream = KinesisShardedStream::new(op.operator.clone(), region, stream_arn);
            if let Some(shard_id) = shard_id {
                stream = stream.with_single_shard(shard_id);
            }
            if let Some(consumer_name) = listen {
                stream = stream.with_listen(consumer_name);
            }
            Ok(Box::new(StreamingSource::new(op.operator.clone(), stream)))
        }
        other => Err(SluiceError::Configuration(format!("unknown source operator: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::{OpId, OpKind};

    fn kinesis_op(args: serde_json::Value) -> Op {
        Op {
            id: OpId::new(),
            kind: OpKind::Source,
            operator: "kinesis".into(),
            args: args.as_object().cloned().unwrap_or_default(),
            secret: None,
            branches: vec![],
        }
    }

    #[test]
    fn listen_mode_with_all_shards_is_rejected() {
        let op = kinesis_op(serde_json::json!({
            "region": "us-east-1",
            "stream_arn": "arn:aws:kinesis:us-east-1:1:stream/orders",
            "all_shards": true,
            "shard_id": "shardId-000000000000",
            "consumer_name": "my-consumer",
        }));
        assert!(build_source(&op).is_err());
    }

    #[test]
    fn listen_mode_without_shard_id_is_rejected() {
        let op = kinesis_op(serde_json::json!({
            "region": "us-east-1",
            "stream_arn": "arn:aws:kinesis:us-east-1:1:stream/orders",
            "all_shards": false,
            "consumer_name": "my-consumer",
        }));
        assert!(build_source(&op).is_err());
    }

    #[test]
    fn listen_mode_with_single_shard_is_accepted() {
        let op = kinesis_op(serde_json::json!({
            "region": "us-east-1",
            "stream_arn": "arn:aws:kinesis:us-east-1:1:stream/orders",
            "all_shards": false,
            "shard_id": "shardId-000000000000",
            "consumer_name": "my-consumer",
        }));
        assert!(build_source(&op).is_ok());
    }

    #[test]
    fn poll_mode_single_shard_without_shard_id_is_rejected() {
        let op = kinesis_op(serde_json::json!({
            "region": "us-east-1",
            "stream_arn": "arn:aws:kinesis:us-east-1:1:stream/orders",
            "all_shards": false,
        }));
        assert!(build_source(&op).is_err());
    }

    #[test]
    fn poll_mode_all_shards_is_accepted() {
        let op = kinesis_op(serde_json::json!({
            "region": "us-east-1",
            "stream_arn": "arn:aws:kinesis:us-east-1:1:stream/orders",
        }));
        assert!(build_source(&op).is_ok());
    }
}
