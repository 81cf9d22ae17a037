pub mod s3;
pub mod stdout;
pub mod webhook;

use s3::S3Sink;
use sluice_core::{Op, Sink, SluiceError};
use stdout::StdoutSink;
use webhook::{DatadogSink, ElasticSink, SplunkSink};

/// Builds a sink adapter from a sink op, dispatching on operator name the
/// same way `identifySink` in the original's `sinkNode.go` switches on
/// `op.Op` to pick a `Sink` implementation.
pub fn build_sink(op: &Op) -> Result<Box<dyn Sink>, SluiceError> {
    match op.operator.as_str() {
        "stdout" => Ok(Box::new(StdoutSink::new())),
        "s3" => {
            let bucket = op
                .str_arg("bucket")
                .ok_or_else(|| SluiceError::Configuration("s3 sink missing args.bucket".into()))?;
            let region = op.str_arg("region").map(str::to_string);
            Ok(Box::new(S3Sink::new(bucket, region)))
        }
        "datadog" => Ok(Box::new(DatadogSink::new(op.str_arg("endpoint").unwrap_or("")))),
        "elastic" => Ok(Box::new(ElasticSink::new(op.str_arg("endpoint").unwrap_or("")))),
        "splunk" => Ok(Box::new(SplunkSink::new(op.str_arg("endpoint").unwrap_or("")))),
        other => Err(SluiceError::Configuration(format!("unknown sink operator: {other}"))),
    }
}
