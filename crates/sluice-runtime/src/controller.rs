//! Lifecycle Controller: the single process-wide reconciliation loop that
//! starts and stops Pipeline Worker Sets based on the declared-state
//! registry, grounded on `original_source/cmd/util.go`'s
//! `StartHandler`/`StopHandler` polling loop, generalized to the 4-state
//! status machine (`staged`/`running`/`stopping`/`stopped`) spec.md §4.8
//! adds over the original's 2-state one.

use sluice_core::traits::CapsuleTx;
use sluice_core::{GlobalConfig, SluiceError};
use sluice_registry::{PipelineRecord, PipelineStatus, SqliteRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::secrets::SecretRefresher;
use crate::sink_batcher::run_sink_batcher;
use crate::source_worker::spawn_source_worker;
use crate::transform_worker::run_transform_worker;

const SECRET_DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const SECRET_DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The three (plus per-sink flush, joined internally by the sink batcher)
/// workers running one pipeline end to end, plus the done-signal the
/// controller holds to stop it. Matches spec.md §3's "Pipeline Controls":
/// created when a pipeline starts, removed once `stop` has fully drained
/// it.
struct PipelineWorkerSet {
    cancel: CancellationToken,
    source: tokio::task::JoinHandle<()>,
    transform: tokio::task::JoinHandle<()>,
    sink: tokio::task::JoinHandle<()>,
}

impl PipelineWorkerSet {
    /// Signals the done channel and waits for every worker to finish its
    /// graceful drain. Idempotent at the call-site level: the controller
    /// only calls this once per pipeline, removing the entry from its
    /// control map immediately after, so a second `StopJob` simply finds
    /// nothing to stop (spec.md §8 idempotence).
    async fn stop(self) {
        self.cancel.cancel();
        let _ = self.source.await;
        let _ = self.transform.await;
        let _ = self.sink.await;
    }
}

/// Builds and spawns the Pipeline Worker Set for one staged pipeline
/// record: loads its task graph, wires the three data-plane channels, and
/// starts the source/transform/sink workers. Returns synchronously on any
/// configuration error so the caller can leave the record `staged` with a
/// logged error rather than flipping it to `running`, per spec.md §7 kind
/// 1.
fn start_pipeline(record: &PipelineRecord, config: &GlobalConfig) -> Result<PipelineWorkerSet, SluiceError> {
    let ops = sluice_core::graph::load(&record.task_graph)?;
    let interval = sluice_core::graph::interval_secs(&ops)?;

    let chan_len = config.default_chan_buffer_len;
    let (src_tx, src_rx): (CapsuleTx, _) = mpsc::channel(chan_len);
    let (tn_tx, tn_rx) = mpsc::channel(chan_len);

    let cancel = CancellationToken::new();
    let secrets = SecretRefresher::for_op(&ops[0], SECRET_DEFAULT_CACHE_TTL, SECRET_DEFAULT_TIMEOUT);
    let source = spawn_source_worker(ops[0].clone(), interval, src_tx, cancel.clone(), secrets)?;
    let transform = tokio::spawn(run_transform_worker(ops.clone(), src_rx, tn_tx));
    let sink = tokio::spawn(run_sink_batcher(ops, tn_rx, chan_len));

    Ok(PipelineWorkerSet { cancel, source, transform, sink })
}

/// Polls the registry every `poll_freq` and reconciles declared vs. running
/// state, matching spec.md §4.8 exactly: `staged` pipelines are started
/// and flipped to `running`; `stopping` pipelines are stopped and flipped
/// to `stopped`. The controller is the sole writer of those two
/// transitions; external actors (the CLI) own `staged <- (create)` and
/// `stopping <- running/stopped`.
pub async fn run_controller(registry: Arc<SqliteRegistry>, config: Arc<GlobalConfig>, shutdown: CancellationToken) {
    let mut controls: HashMap<i64, PipelineWorkerSet> = HashMap::new();
    let poll_freq = Duration::from_secs(config.poll_pipeline_changes_freq.max(1));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(poll_freq) => {}
        }

        let records = match list_records(&registry).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "lifecycle controller failed to list pipeline records");
                continue;
            }
        };

        for record in records {
            match record.status {
                PipelineStatus::Staged => reconcile_staged(&registry, &config, record, &mut controls).await,
                PipelineStatus::Stopping => reconcile_stopping(&registry, record, &mut controls).await,
                PipelineStatus::Running | PipelineStatus::Stopped => {}
            }
        }
    }

    // Process shutdown: stop every still-running pipeline so nothing is
    // left mid-flight.
    for (_, workers) in controls.drain() {
        workers.stop().await;
    }
}

async fn reconcile_staged(
    registry: &Arc<SqliteRegistry>,
    config: &Arc<GlobalConfig>,
    record: PipelineRecord,
    controls: &mut HashMap<i64, PipelineWorkerSet>,
) {
    if controls.contains_key(&record.id) {
        return;
    }
    match start_pipeline(&record, config) {
        Ok(workers) => {
            controls.insert(record.id, workers);
            if let Err(e) = set_status(registry, record.id, PipelineStatus::Running).await {
                tracing::error!(error = %e, id = record.id, "failed to mark pipeline running after start");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, id = record.id, "failed to start staged pipeline, leaving staged");
        }
    }
}

async fn reconcile_stopping(registry: &Arc<SqliteRegistry>, record: PipelineRecord, controls: &mut HashMap<i64, PipelineWorkerSet>) {
    let Some(workers) = controls.remove(&record.id) else {
        // Already stopped by an earlier tick (or never started); nothing
        // to drain. Still ensure the declared state reflects that.
        if let Err(e) = set_status(registry, record.id, PipelineStatus::Stopped).await {
            tracing::error!(error = %e, id = record.id, "failed to mark already-stopped pipeline stopped");
        }
        return;
    };
    workers.stop().await;
    if let Err(e) = set_status(registry, record.id, PipelineStatus::Stopped).await {
        tracing::error!(error = %e, id = record.id, "failed to mark pipeline stopped after drain");
    }
}

async fn list_records(registry: &Arc<SqliteRegistry>) -> anyhow::Result<Vec<PipelineRecord>> {
    let registry = registry.clone();
    Ok(tokio::task::spawn_blocking(move || registry.list()).await??)
}

async fn set_status(registry: &Arc<SqliteRegistry>, id: i64, status: PipelineStatus) -> anyhow::Result<()> {
    let registry = registry.clone();
    tokio::task::spawn_blocking(move || registry.set_status(id, status)).await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_registry() -> SqliteRegistry {
        let path = std::env::temp_dir().join(format!("sluice-controller-test-{}-{}.db", std::process::id(), uuid::Uuid::new_v4()));
        SqliteRegistry::open(path).unwrap()
    }

    fn random_to_stdout_graph() -> String {
        serde_json::json!([
            {"type": "source", "op": "random", "args": {"interval": 1}},
            {"type": "sink", "op": "stdout", "args": {}}
        ])
        .to_string()
    }

    #[tokio::test]
    async fn reconcile_staged_starts_pipeline_and_flips_to_running() {
        let registry = Arc::new(temp_registry());
        let config = Arc::new(GlobalConfig::default());
        let id = registry.add("pipe.json", &random_to_stdout_graph(), 1).unwrap();
        let mut controls = HashMap::new();

        let record = registry.detail(id).unwrap().unwrap();
        reconcile_staged(&registry, &config, record, &mut controls).await;

        assert!(controls.contains_key(&id));
        assert_eq!(registry.detail(id).unwrap().unwrap().status, PipelineStatus::Running);

        // Clean up the spawned workers so the test doesn't leak tasks.
        if let Some(workers) = controls.remove(&id) {
            workers.stop().await;
        }
    }

    #[tokio::test]
    async fn reconcile_stopping_drains_and_flips_to_stopped_idempotently() {
        let registry = Arc::new(temp_registry());
        let config = Arc::new(GlobalConfig::default());
        let id = registry.add("pipe.json", &random_to_stdout_graph(), 1).unwrap();
        let mut controls = HashMap::new();

        let record = registry.detail(id).unwrap().unwrap();
        reconcile_staged(&registry, &config, record, &mut controls).await;

        let record = registry.detail(id).unwrap().unwrap();
        reconcile_stopping(&registry, record, &mut controls).await;
        assert_eq!(registry.detail(id).unwrap().unwrap().status, PipelineStatus::Stopped);
        assert!(!controls.contains_key(&id));

        // A second stop is a no-op: nothing in `controls`, status stays stopped.
        let record = registry.detail(id).unwrap().unwrap();
        reconcile_stopping(&registry, record, &mut controls).await;
        assert_eq!(registry.detail(id).unwrap().unwrap().status, PipelineStatus::Stopped);
    }
}
