//! The task graph's node type, grounded on `execute.OpTask`.

use serde_json::{Map, Value};
use uuid::Uuid;

/// Stable identity for an op, freshly minted on every load — never
/// serialized back into the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(Uuid);

impl OpId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OpId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Source,
    Transform,
    Sink,
    Branch,
}

/// One node of a task graph. `branches` is only populated for `OpKind::Branch`
/// nodes, each inner `Vec<Op>` being one child graph that receives an
/// identical copy of the working event list.
#[derive(Debug, Clone)]
pub struct Op {
    pub id: OpId,
    pub kind: OpKind,
    pub operator: String,
    pub args: Map<String, Value>,
    pub secret: Option<Value>,
    pub branches: Vec<Vec<Op>>,
}

impl Op {
    /// Reads an integer argument, narrowing from the JSON number the wire
    /// format always uses (arg values retain their JSON types; numeric
    /// fields are read as floating and narrowed, per spec).
    pub fn int_arg(&self, key: &str) -> Option<i64> {
        self.args.get(key).and_then(Value::as_f64).map(|f| f as i64)
    }

    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }
}
