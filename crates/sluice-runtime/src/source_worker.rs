//! Source Worker: owns one pipeline's source adapter, grounded on
//! `original_source/execute/sourceNode.go`'s `identifySource` for adapter
//! selection and spec.md §4.2 for the pull/push loop. The loop mechanics
//! themselves live in `sluice_core::traits::{run_pull_source,
//! run_push_source}`; this module is the thin piece that resolves the
//! first op into a concrete adapter and wires in the Secret Refresher.

use sluice_core::traits::{run_pull_source, run_push_source, CapsuleTx};
use sluice_core::{Op, Source, SourceKind, SluiceError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::secrets::SecretRefresher;

/// Builds the source adapter for the pipeline's first op and spawns its
/// worker loop. Returns immediately with a join handle; adapter
/// construction failure is returned synchronously so the caller can abort
/// pipeline start per spec.md §7 kind 1 (configuration errors fail start,
/// status remains staged).
pub fn spawn_source_worker(
    source_op: Op,
    interval_secs: u64,
    tx: CapsuleTx,
    cancel: CancellationToken,
    secrets: Option<SecretRefresher>,
) -> Result<tokio::task::JoinHandle<()>, SluiceError> {
    let source = sluice_io::build_source(&source_op)?;
    let kind = source.kind();

    let handle = tokio::spawn(async move {
        match kind {
            SourceKind::Pull => {
                run_pull_source_with_secrets(source, source_op, tx, Duration::from_secs(interval_secs), cancel, secrets)
                    .await
            }
            SourceKind::Push => run_push_source(source, tx, cancel).await,
        }
    });

    Ok(handle)
}

/// Wraps `run_pull_source`'s loop with a secret-refresh check, matching
/// spec.md §4.2: "if secrets are configured and (now - last refresh) >
/// ttl, invoke Secret Refresher ... The source adapter is then rebuilt
/// from the updated op." When no `SecretRefresher` is configured this
/// degenerates to the plain pull loop.
async fn run_pull_source_with_secrets(
    mut source: Box<dyn Source>,
    mut op: Op,
    tx: CapsuleTx,
    interval: Duration,
    cancel: CancellationToken,
    mut secrets: Option<SecretRefresher>,
) {
    let Some(refresher) = secrets.take() else {
        return run_pull_source(source, tx, interval, cancel).await;
    };

    let mut last_refresh = tokio::time::Instant::now() - refresher.cache_ttl();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = source.clean_up().await;
                return;
            }
            _ = async {
                let started = tokio::time::Instant::now();
                if started.duration_since(last_refresh) > refresher.cache_ttl() {
                    match refresher.refresh(&op).await {
                        Ok(merged_args) => {
                            op.args = merged_args;
                            match sluice_io::build_source(&op) {
                                Ok(rebuilt) => source = rebuilt,
                                Err(e) => tracing::error!(error = %e, "failed to rebuild source after secret refresh"),
                            }
                            last_refresh = started;
                        }
                        Err(e) => tracing::error!(error = %e, "secret refresh failed, keeping previous credentials"),
                    }
                }

                match source.read(&tx).await {
                    Ok(events) if !events.is_empty() => {
                        let capsule = sluice_core::Capsule { sink_id: None, prefix: None, events };
                        if tx.send(capsule).await.is_err() {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "source read failed, yielding empty batch"),
                }
                let elapsed = started.elapsed();
                tokio::time::sleep(interval.saturating_sub(elapsed)).await;
            } => {}
        }
    }
}
