//! Pull source that shells out to an external command and parses its
//! stdout as a JSON array of events, grounded on
//! `integrations/sources/source_python.go` (the pattern `source_okta.go`
//! also reuses via `PythonSourceRead`).

use async_trait::async_trait;
use sluice_core::traits::CapsuleTx;
use sluice_core::{EventBatch, Operator, Source, SourceKind};
use tokio::process::Command;

use crate::sources::util::event_break_json_array;

/// Resolves the interpreter/binary to run the same way
/// `settings.Config.PythonPath` does: empty means "resolve on PATH."
pub struct ExternalProcessSource {
    name: String,
    command: String,
    args: Vec<String>,
    interpreter_path: String,
}

impl ExternalProcessSource {
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>, interpreter_path: String) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
            interpreter_path,
        }
    }
}

impl Operator for ExternalProcessSource {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Source for ExternalProcessSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Pull
    }

    async fn read(&mut self, _tx: &CapsuleTx) -> anyhow::Result<EventBatch> {
        let program = if self.interpreter_path.is_empty() {
            self.command.clone()
        } else {
            format!("{}/{}", self.interpreter_path.trim_end_matches('/'), self.command)
        };

        let output = Command::new(&program).args(&self.args).output().await;
        let output = match output {
            Ok(o) => o,
            Err(e) => {
                tracing::error!(error = %e, program, "error executing external source driver");
                return Ok(EventBatch::new());
            }
        };

        if !output.status.success() {
            tracing::error!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "external source driver exited with non-zero status"
            );
            return Ok(EventBatch::new());
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        let json_list = extract_marked_output(&raw);
        let events = event_break_json_array(&json_list).into_iter().map(sluice_core::Event::new).collect();
        Ok(events)
    }
}

/// Trims everything outside the `__...Output__` marker pair the driver
/// protocol wraps its JSON payload in, matching the original's regex-based
/// trim.
fn extract_marked_output(raw: &str) -> String {
    const START: &str = "__Python Source Driver Output__";
    const END: &str = "__End Python Source Driver Output__";
    let after_start = raw.find(START).map(|i| &raw[i + START.len()..]).unwrap_or(raw);
    let before_end = after_start.find(END).map(|i| &after_start[..i]).unwrap_or(after_start);
    before_end.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_between_markers() {
        let raw = "noise\n__Python Source Driver Output__\n[{\"a\":1}]\n__End Python Source Driver Output__\ntrailer";
        assert_eq!(extract_marked_output(raw), r#"[{"a":1}]"#);
    }

    #[test]
    fn passes_through_when_markers_absent() {
        assert_eq!(extract_marked_output("[{\"a\":1}]"), r#"[{"a":1}]"#);
    }
}
