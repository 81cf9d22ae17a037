//! Task Graph Loader: parses the JSON document emitted by the external
//! declaration compiler into a `Vec<Op>`.
//!
//! The wire format mixes two descriptor shapes in one top-level array — a
//! plain object, or a nested array denoting a branch — which is awkward to
//! express as a single `#[derive(Deserialize)]`. This mirrors
//! `execute.OpTask`'s `mapstructure` decoding with a hand-written recursive
//! walk over `serde_json::Value` instead.

use crate::error::SluiceError;
use crate::op::{Op, OpId, OpKind};
use serde_json::Value;

/// Parses a task graph document and validates it enough to start a
/// pipeline: the top level must be a non-empty array whose first element is
/// a source op.
pub fn load(document: &str) -> Result<Vec<Op>, SluiceError> {
    let top: Value = serde_json::from_str(document)
        .map_err(|e| SluiceError::Configuration(format!("invalid task graph JSON: {e}")))?;

    let array = top
        .as_array()
        .ok_or_else(|| SluiceError::Configuration("task graph document is not a JSON array".into()))?;

    if array.is_empty() {
        return Err(SluiceError::Configuration("task graph is empty".into()));
    }

    let ops = parse_ops(array);

    match ops.first() {
        Some(op) if op.kind == OpKind::Source => {}
        Some(_) => {
            return Err(SluiceError::Configuration(
                "task graph does not start with a source".into(),
            ))
        }
        None => return Err(SluiceError::Configuration("task graph is empty".into())),
    }

    Ok(ops)
}

/// Reads the source op's `args.interval`. Unlike the original, zero/negative
/// intervals are rejected at load time rather than silently accepted, since
/// a zero-interval pull source would busy-loop.
pub fn interval_secs(ops: &[Op]) -> Result<u64, SluiceError> {
    let source = ops
        .first()
        .ok_or_else(|| SluiceError::Configuration("task graph is empty".into()))?;
    let interval = source
        .int_arg("interval")
        .ok_or_else(|| SluiceError::Configuration("source op missing args.interval".into()))?;
    if interval <= 0 {
        return Err(SluiceError::Configuration(format!(
            "source op args.interval must be positive, got {interval}"
        )));
    }
    Ok(interval as u64)
}

fn parse_ops(descriptors: &[Value]) -> Vec<Op> {
    let mut ops = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        match descriptor {
            Value::Object(_) => match parse_op_object(descriptor) {
                Some(op) => ops.push(op),
                None => tracing::warn!(descriptor = %descriptor, "skipping op descriptor of unknown shape"),
            },
            Value::Array(branch_children) => {
                let branches: Vec<Vec<Op>> = branch_children
                    .iter()
                    .filter_map(|child| child.as_array())
                    .map(|child_array| parse_ops(child_array))
                    .collect();
                ops.push(Op {
                    id: OpId::new(),
                    kind: OpKind::Branch,
                    operator: "branch".to_string(),
                    args: serde_json::Map::new(),
                    secret: None,
                    branches,
                });
            }
            other => tracing::warn!(descriptor = %other, "skipping op descriptor of unknown shape"),
        }
    }
    ops
}

fn parse_op_object(descriptor: &Value) -> Option<Op> {
    let obj = descriptor.as_object()?;
    let type_tag = obj.get("type")?.as_str()?;
    let kind = match type_tag {
        "source" => OpKind::Source,
        "tn" => OpKind::Transform,
        "sink" => OpKind::Sink,
        _ => return None,
    };
    let operator = obj.get("op")?.as_str()?.to_string();
    let args = obj
        .get("args")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let secret = obj.get("secret").cloned();

    Some(Op {
        id: OpId::new(),
        kind,
        operator,
        args,
        secret,
        branches: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_flat_graph_and_reads_interval() {
        let doc = r#"[
            {"type": "source", "op": "random", "args": {"interval": 10}},
            {"type": "tn", "op": "add", "args": {"path": "x", "value": 1}},
            {"type": "sink", "op": "stdout", "args": {}}
        ]"#;
        let ops = load(doc).unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].kind, OpKind::Source);
        assert_eq!(ops[1].kind, OpKind::Transform);
        assert_eq!(ops[2].kind, OpKind::Sink);
        assert_eq!(interval_secs(&ops).unwrap(), 10);
    }

    #[test]
    fn loads_branch_with_two_children() {
        let doc = r#"[
            {"type": "source", "op": "random", "args": {"interval": 1}},
            {"type": "tn", "op": "add", "args": {}},
            [
                [{"type": "sink", "op": "stdout", "args": {}}],
                [{"type": "sink", "op": "stdout", "args": {}}]
            ]
        ]"#;
        let ops = load(doc).unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[2].kind, OpKind::Branch);
        assert_eq!(ops[2].branches.len(), 2);
        assert_eq!(ops[2].branches[0][0].kind, OpKind::Sink);
    }

    #[test]
    fn empty_graph_is_an_error() {
        assert!(load("[]").is_err());
    }

    #[test]
    fn non_source_first_element_is_an_error() {
        let doc = r#"[{"type": "sink", "op": "stdout", "args": {}}]"#;
        assert!(load(doc).is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let doc = r#"[{"type": "source", "op": "random", "args": {"interval": 0}}]"#;
        let ops = load(doc).unwrap();
        assert!(interval_secs(&ops).is_err());
    }

    #[test]
    fn ids_are_freshly_minted_each_load() {
        let doc = r#"[{"type": "source", "op": "random", "args": {"interval": 1}}]"#;
        let first = load(doc).unwrap();
        let second = load(doc).unwrap();
        assert_ne!(first[0].id, second[0].id);
    }
}
