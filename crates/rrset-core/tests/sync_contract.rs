//! Contract Test: Downstream Sync
//!
//! Constraints verified:
//! - Every committed batch is pushed once, in commit order
//! - A successful push advances the domain's `published` timestamp
//! - Failed pushes are retried; a refused change is re-pushed until accepted
//! - Changes of a domain never overtake a refused earlier change
//! - Queued changes are still pushed after a shutdown signal
//! - Deleting a domain is pushed as deletions of all its RRsets

mod common;

use common::*;
use rrset_core::{AppliedChange, Batch, BatchOperation, ChangeItem, RrsetStore, SyncWorker};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

fn txt(subname: &str, value: &str) -> Batch {
    Batch::single(
        ChangeItem::new(subname, "TXT")
            .with_ttl(3600)
            .with_records([format!("\"{}\"", value)]),
    )
}

#[tokio::test]
async fn pushes_in_commit_order_and_marks_published() {
    let store = Arc::new(FlakyStore::new());
    let (reconciler, changes) = reconciler_with_domain(store.clone(), fast_config()).await;
    let sync = RecordingZoneSync::new();
    let worker = SyncWorker::new(
        changes,
        Arc::new(sync.clone()),
        store.clone(),
        reconciler.config(),
    );

    for value in ["one", "two", "three"] {
        reconciler
            .apply(&owner(), DOMAIN, BatchOperation::Replace, txt("", value))
            .await
            .unwrap();
    }
    let domain_before = store.get_domain(DOMAIN).await.unwrap().unwrap();
    assert!(domain_before.published.is_none());

    // dropping the only sender ends the worker once the feed is drained
    drop(reconciler);
    worker.run().await.unwrap();

    let pushed = sync.pushed();
    assert_eq!(pushed.len(), 3);
    let values: Vec<String> = pushed
        .iter()
        .map(|change| match &change.changes[0] {
            AppliedChange::Upserted { records, .. } => records.iter().next().cloned().unwrap_or_default(),
            AppliedChange::Deleted { .. } => String::new(),
        })
        .collect();
    assert_eq!(values, ["\"one\"", "\"two\"", "\"three\""]);

    let domain = store.get_domain(DOMAIN).await.unwrap().unwrap();
    assert_eq!(domain.published, Some(pushed[2].committed_at));
}

#[tokio::test]
async fn failed_pushes_are_retried() {
    let store = Arc::new(FlakyStore::new());
    let (reconciler, changes) = reconciler_with_domain(store.clone(), fast_config()).await;
    let sync = RecordingZoneSync::new().failing_first(2);
    let worker = SyncWorker::new(changes, Arc::new(sync.clone()), store.clone(), reconciler.config());

    reconciler
        .apply(&owner(), DOMAIN, BatchOperation::Replace, txt("a", "x"))
        .await
        .unwrap();
    drop(reconciler);
    worker.run().await.unwrap();

    assert_eq!(sync.push_calls(), 3);
    assert_eq!(sync.pushed().len(), 1);
}

#[tokio::test]
async fn refused_change_is_delivered_once_the_target_recovers() {
    let store = Arc::new(FlakyStore::new());
    let config = rrset_core::EngineConfig {
        max_retries: 1,
        ..fast_config()
    };
    let (reconciler, changes) = reconciler_with_domain(store.clone(), config).await;
    let sync = RecordingZoneSync::new().failing_first(2);
    let worker = tokio::spawn(
        SyncWorker::new(changes, Arc::new(sync.clone()), store.clone(), reconciler.config()).run(),
    );

    reconciler
        .apply(&owner(), DOMAIN, BatchOperation::Replace, txt("a", "late"))
        .await
        .unwrap();

    // the feed stays open, so only the periodic re-push can deliver it
    let domain = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let domain = store.get_domain(DOMAIN).await.unwrap().unwrap();
            if domain.published.is_some() {
                break domain;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("change delivered after the target recovered");

    assert_eq!(sync.push_calls(), 3);
    assert_eq!(sync.pushed().len(), 1);
    assert_eq!(domain.published, Some(sync.pushed()[0].committed_at));

    drop(reconciler);
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn later_changes_wait_behind_a_refused_one() {
    let store = Arc::new(FlakyStore::new());
    let config = rrset_core::EngineConfig {
        max_retries: 1,
        ..fast_config()
    };
    let (reconciler, changes) = reconciler_with_domain(store.clone(), config).await;
    let sync = RecordingZoneSync::new().failing_first(2);
    let worker = SyncWorker::new(changes, Arc::new(sync.clone()), store.clone(), reconciler.config());

    reconciler
        .apply(&owner(), DOMAIN, BatchOperation::Replace, txt("a", "first"))
        .await
        .unwrap();
    reconciler
        .apply(&owner(), DOMAIN, BatchOperation::Replace, txt("b", "second"))
        .await
        .unwrap();
    drop(reconciler);
    worker.run().await.unwrap();

    // two refusals, then both changes in commit order
    assert_eq!(sync.push_calls(), 4);
    let subnames: Vec<String> = sync
        .pushed()
        .iter()
        .map(|change| match &change.changes[0] {
            AppliedChange::Upserted { subname, .. } | AppliedChange::Deleted { subname, .. } => subname.clone(),
        })
        .collect();
    assert_eq!(subnames, ["a", "b"]);
}

#[tokio::test]
async fn shutdown_drains_queued_changes() {
    let store = Arc::new(FlakyStore::new());
    let (reconciler, changes) = reconciler_with_domain(store.clone(), fast_config()).await;
    let sync = RecordingZoneSync::new();
    let worker = SyncWorker::new(changes, Arc::new(sync.clone()), store.clone(), reconciler.config());

    for subname in ["a", "b", "c"] {
        reconciler
            .apply(&owner(), DOMAIN, BatchOperation::Replace, txt(subname, "v"))
            .await
            .unwrap();
    }

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    shutdown_tx.send(()).unwrap();
    // the reconciler stays alive, so only the signal can end the worker
    worker.run_with_shutdown(Some(shutdown_rx)).await.unwrap();

    assert_eq!(sync.pushed().len(), 3);
    drop(reconciler);
}

#[tokio::test]
async fn domain_deletion_is_pushed_as_rrset_deletions() {
    let store = Arc::new(FlakyStore::new());
    let (reconciler, changes) = reconciler_with_domain(store.clone(), fast_config()).await;
    let sync = RecordingZoneSync::new();
    let worker = SyncWorker::new(changes, Arc::new(sync.clone()), store.clone(), reconciler.config());

    reconciler
        .apply(
            &owner(),
            DOMAIN,
            BatchOperation::Create,
            Batch::list([
                ChangeItem::new("", "A").with_ttl(3600).with_records(["192.0.2.1"]),
                ChangeItem::new("www", "CNAME").with_ttl(3600).with_records(["example.com."]),
            ]),
        )
        .await
        .unwrap();
    reconciler.delete_domain(&owner(), DOMAIN).await.unwrap();
    drop(reconciler);
    worker.run().await.unwrap();

    let pushed = sync.pushed();
    assert_eq!(pushed.len(), 2);
    let mut deleted: Vec<(String, String)> = pushed[1]
        .changes
        .iter()
        .filter_map(|change| match change {
            AppliedChange::Deleted { subname, rtype } => Some((subname.clone(), rtype.clone())),
            AppliedChange::Upserted { .. } => None,
        })
        .collect();
    deleted.sort();
    assert_eq!(
        deleted,
        [
            (String::new(), "A".to_string()),
            ("www".to_string(), "CNAME".to_string()),
        ]
    );
    assert!(store.get_domain(DOMAIN).await.unwrap().is_none());
}
