//! Transform Worker: consumes batches from the source channel, walks the
//! task graph applying transforms and branches, and emits one capsule per
//! sink op on the transform channel. Grounded on
//! `original_source/execute/transformNode.go`'s `transformProcess`; branch
//! fan-out is an addition spec.md §4.3 calls for explicitly (the original
//! snapshot predates it).

use sluice_core::traits::{CapsuleRx, CapsuleTx};
use sluice_core::{Capsule, Event, EventBatch, Op, OpKind};

/// Runs the transform worker until `src_rx` closes, applying `ops[1..]`
/// (everything after the source op) to each incoming batch and closing
/// `tn_tx` on return. There is no separate cancellation signal here by
/// design: shutdown is driven purely by the source worker closing its end
/// of the channel, so that every batch already in flight is drained and
/// forwarded rather than dropped mid-stream (spec.md §5's "graceful drain,
/// not abrupt kill").
pub async fn run_transform_worker(ops: Vec<Op>, mut src_rx: CapsuleRx, tn_tx: CapsuleTx) {
    // ops[0] is the source op; the walk starts at ops[1].
    let walk = &ops[1.min(ops.len())..];

    while let Some(capsule) = src_rx.recv().await {
        process_batch(walk, capsule.events, &tn_tx).await;
    }
}

/// Recursively applies `ops` to `events`, emitting a capsule per sink op
/// reached and fanning out on branch ops.
async fn process_batch(ops: &[Op], events: EventBatch, tn_tx: &CapsuleTx) {
    let mut working = events;
    for op in ops {
        match op.kind {
            OpKind::Transform => {
                working = sluice_tx::dispatch(op, working);
            }
            OpKind::Branch => {
                dispatch_branch(op, working.clone(), tn_tx).await;
                // The working list is logically consumed by the branch;
                // the outer walk continues with whatever follows, if
                // anything (branches are normally leaves of the graph).
            }
            OpKind::Sink => {
                let capsule = Capsule::for_sink(op.id, working);
                if tn_tx.send(capsule).await.is_err() {
                    return;
                }
                return;
            }
            OpKind::Source => {
                // Only ops[0] is a source and the walk never includes it.
            }
        }
    }
}

/// Sends an identical copy of `events` down each child graph of a branch.
/// Every branch but the last clones the list spine (event strings
/// themselves are immutable values and may be safely aliased, so cloning
/// the `Vec` spine is sufficient); the last branch reuses the incoming
/// list by move, since by that point every earlier branch has already
/// taken its own copy.
async fn dispatch_branch(op: &Op, events: EventBatch, tn_tx: &CapsuleTx) {
    let last = op.branches.len().saturating_sub(1);
    let mut events = Some(events);
    for (idx, child) in op.branches.iter().enumerate() {
        let copy = if idx == last {
            events.take().unwrap_or_default()
        } else {
            events.clone().unwrap_or_default()
        };
        Box::pin(process_batch(child, copy, tn_tx)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sluice_core::{Capsule, OpId};
    use tokio::sync::mpsc;

    fn source_op() -> Op {
        Op {
            id: OpId::new(),
            kind: OpKind::Source,
            operator: "random".into(),
            args: Default::default(),
            secret: None,
            branches: vec![],
        }
    }

    fn transform_add() -> Op {
        Op {
            id: OpId::new(),
            kind: OpKind::Transform,
            operator: "add".into(),
            args: serde_json::Map::from_iter([("path".into(), json!("tag")), ("value".into(), json!("x"))]),
            secret: None,
            branches: vec![],
        }
    }

    fn sink_op() -> Op {
        Op {
            id: OpId::new(),
            kind: OpKind::Sink,
            operator: "stdout".into(),
            args: Default::default(),
            secret: None,
            branches: vec![],
        }
    }

    #[tokio::test]
    async fn single_sink_emits_one_capsule_tagged_with_sink_id() {
        let sink = sink_op();
        let ops = vec![source_op(), transform_add(), sink.clone()];

        let (src_tx, src_rx) = mpsc::channel(4);
        let (tn_tx, mut tn_rx) = mpsc::channel(4);

        src_tx
            .send(Capsule { sink_id: None, prefix: None, events: vec![Event::new("{}")] })
            .await
            .unwrap();
        drop(src_tx);

        let handle = tokio::spawn(run_transform_worker(ops, src_rx, tn_tx));
        let out = tn_rx.recv().await.unwrap();
        assert_eq!(out.sink_id, Some(sink.id));
        assert_eq!(out.events[0].get_string("tag").as_deref(), Some("x"));
        assert!(tn_rx.recv().await.is_none());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn branch_fans_out_identical_events_to_each_child() {
        let sink_a = sink_op();
        let sink_b = sink_op();
        let branch = Op {
            id: OpId::new(),
            kind: OpKind::Branch,
            operator: "branch".into(),
            args: Default::default(),
            secret: None,
            branches: vec![vec![sink_a.clone()], vec![sink_b.clone()]],
        };
        let ops = vec![source_op(), transform_add(), branch];

        let (src_tx, src_rx) = mpsc::channel(4);
        let (tn_tx, mut tn_rx) = mpsc::channel(4);

        src_tx
            .send(Capsule {
                sink_id: None,
                prefix: None,
                events: vec![Event::new("{}"), Event::new("{}"), Event::new("{}")],
            })
            .await
            .unwrap();
        drop(src_tx);

        let handle = tokio::spawn(run_transform_worker(ops, src_rx, tn_tx));

        let first = tn_rx.recv().await.unwrap();
        let second = tn_rx.recv().await.unwrap();
        let mut sink_ids = vec![first.sink_id.unwrap(), second.sink_id.unwrap()];
        sink_ids.sort();
        let mut expected = vec![sink_a.id, sink_b.id];
        expected.sort();
        assert_eq!(sink_ids, expected);
        assert_eq!(first.events.len(), 3);
        assert_eq!(second.events.len(), 3);
        assert_eq!(first.events, second.events);

        handle.await.unwrap();
    }
}
