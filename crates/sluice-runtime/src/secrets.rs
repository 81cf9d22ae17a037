//! Secret Refresher, grounded on spec.md §4.7 and
//! `original_source/integrations/sources/source_python.go`'s subprocess
//! pattern: a child process reads a JSON "secrets request" on stdin and
//! writes a flat JSON object of resolved values on stdout.

use serde_json::{Map, Value};
use sluice_core::Op;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Invokes the secret command named in an op's `secret` descriptor and
/// merges the result back into the op's args, matching "each returned key
/// is merged into the source op's args map, overwriting previous values."
#[derive(Debug, Clone)]
pub struct SecretRefresher {
    command: String,
    interpreter_path: String,
    cache_ttl: Duration,
    timeout: Duration,
}

impl SecretRefresher {
    pub fn new(command: impl Into<String>, interpreter_path: impl Into<String>, cache_ttl: Duration, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            interpreter_path: interpreter_path.into(),
            cache_ttl,
            timeout,
        }
    }

    /// Builds a refresher for `op` if it carries a `secret` descriptor with
    /// a `command` key, matching `source.Config.Secrets` being optional.
    pub fn for_op(op: &Op, default_ttl: Duration, default_timeout: Duration) -> Option<Self> {
        let secret = op.secret.as_ref()?;
        let command = secret.get("command")?.as_str()?.to_string();
        let interpreter_path = secret
            .get("interpreter_path")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let ttl = secret
            .get("cache_ttl_secs")
            .and_then(Value::as_u64)
            .map(Duration::from_secs)
            .unwrap_or(default_ttl);
        let timeout = secret
            .get("timeout_secs")
            .and_then(Value::as_u64)
            .map(Duration::from_secs)
            .unwrap_or(default_timeout);
        Some(Self::new(command, interpreter_path, ttl, timeout))
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Runs the secret command, feeding it `op.secret["secrets"]` on stdin
    /// and parsing its stdout as a flat object merged into `op.args`.
    /// Returns the merged args map; on any pipe/process/parse failure the
    /// caller is expected to keep the previous args untouched and retry on
    /// the next scheduled refresh, per spec.md §4.7's failure modes.
    pub async fn refresh(&self, op: &Op) -> anyhow::Result<Map<String, Value>> {
        let program = if self.interpreter_path.is_empty() {
            self.command.clone()
        } else {
            format!("{}/{}", self.interpreter_path.trim_end_matches('/'), self.command)
        };

        let request = op
            .secret
            .as_ref()
            .and_then(|s| s.get("secrets"))
            .cloned()
            .unwrap_or(Value::Object(Default::default()));
        let request_bytes = serde_json::to_vec(&request)?;

        let mut child = Command::new(&program)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()?;

        let mut stdin = child.stdin.take().ok_or_else(|| anyhow::anyhow!("secrets command has no stdin"))?;
        stdin.write_all(&request_bytes).await?;
        drop(stdin);

        let mut stdout = child.stdout.take().ok_or_else(|| anyhow::anyhow!("secrets command has no stdout"))?;
        let mut out_bytes = Vec::new();
        let read = tokio::time::timeout(self.timeout, stdout.read_to_end(&mut out_bytes));
        read.await.map_err(|_| anyhow::anyhow!("secrets command timed out reading stdout"))??;

        let status = child.wait().await?;
        if !status.success() {
            anyhow::bail!("secrets command exited with status {status}");
        }

        let reply: Value = serde_json::from_slice(&out_bytes)?;
        let reply_obj = reply
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("secrets command reply is not a JSON object"))?;

        let mut merged = op.args.clone();
        for (key, value) in reply_obj {
            merged.insert(key.clone(), value.clone());
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sluice_core::{OpId, OpKind};

    fn source_op_with_secret() -> Op {
        Op {
            id: OpId::new(),
            kind: OpKind::Source,
            operator: "s3".to_string(),
            args: serde_json::Map::new(),
            secret: Some(json!({
                "command": "cat",
                "secrets": {"key": "value"},
            })),
            branches: vec![],
        }
    }

    #[test]
    fn for_op_reads_command_from_secret_descriptor() {
        let op = source_op_with_secret();
        let refresher = SecretRefresher::for_op(&op, Duration::from_secs(60), Duration::from_secs(5)).unwrap();
        assert_eq!(refresher.cache_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn for_op_returns_none_without_secret_descriptor() {
        let mut op = source_op_with_secret();
        op.secret = None;
        assert!(SecretRefresher::for_op(&op, Duration::from_secs(60), Duration::from_secs(5)).is_none());
    }

    #[tokio::test]
    async fn refresh_merges_json_object_reply_into_args() {
        // `cat` echoes the JSON secrets subdocument back on stdout, which
        // doubles as a fake "secrets backend" reply for this test.
        let op = source_op_with_secret();
        let refresher = SecretRefresher::for_op(&op, Duration::from_secs(60), Duration::from_secs(5)).unwrap();
        let merged = refresher.refresh(&op).await.unwrap();
        assert_eq!(merged.get("key").and_then(Value::as_str), Some("value"));
    }
}
