//! Minimal embedding example for rrset-core
//!
//! This example uses rrset-core as a library in a custom application: a
//! custom ZoneSync target, a memory store, one domain, a few batches and a
//! dynamic DNS check-in. The engine lifecycle is fully managed here.

use async_trait::async_trait;
use rrset_core::{
    AppliedChange, Batch, BatchOperation, ChangeItem, CheckIn, DyndnsMerger, EngineConfig,
    MemoryRrsetStore, Principal, Reconciler, Result, RrsetFilter, RrsetStore, SyncWorker,
    ZoneChange, ZoneSync,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

/// Prints every change instead of talking to a nameserver
struct PrintingZoneSync {
    pushes: Arc<AtomicUsize>,
}

#[async_trait]
impl ZoneSync for PrintingZoneSync {
    async fn push(&self, change: &ZoneChange) -> Result<()> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        for applied in &change.changes {
            match applied {
                AppliedChange::Upserted {
                    subname,
                    rtype,
                    ttl,
                    records,
                } => println!(
                    "[Embedded] {} {} {} {:?} @ {}",
                    change.domain, subname, rtype, records, ttl
                ),
                AppliedChange::Deleted { subname, rtype } => {
                    println!("[Embedded] {} {} {} deleted", change.domain, subname, rtype)
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "embedded"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    println!("=== Embedded rrset-core Example ===\n");

    let store: Arc<dyn RrsetStore> = Arc::new(MemoryRrsetStore::new());
    let config = EngineConfig {
        max_retries: 0,
        ..EngineConfig::default()
    };
    let (reconciler, changes) = Reconciler::new(store.clone(), config.clone())?;
    let reconciler = Arc::new(reconciler);

    let pushes = Arc::new(AtomicUsize::new(0));
    let sync = Arc::new(PrintingZoneSync {
        pushes: pushes.clone(),
    });
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let worker = tokio::spawn(
        SyncWorker::new(changes, sync, store.clone(), &config).run_with_shutdown(Some(shutdown_rx)),
    );

    let alice = Principal::new("alice");
    reconciler.create_domain(&alice, "example.com", Some(60)).await?;

    reconciler
        .apply(
            &alice,
            "example.com",
            BatchOperation::Create,
            Batch::list([
                ChangeItem::new("www", "A")
                    .with_ttl(3600)
                    .with_records(["192.0.2.1"]),
                ChangeItem::new("", "MX")
                    .with_ttl(3600)
                    .with_records(["10 mail.example.com."]),
            ]),
        )
        .await?;

    // one bad item rejects the whole batch
    let rejected = reconciler
        .apply(
            &alice,
            "example.com",
            BatchOperation::Update,
            Batch::list([
                ChangeItem::new("www", "A").with_records(["192.0.2.2"]),
                ChangeItem::new("www", "CNAME")
                    .with_ttl(3600)
                    .with_records(["example.com."]),
            ]),
        )
        .await;
    if let Err(e) = &rejected
        && let Some(errors) = e.batch_errors()
    {
        println!("\nRejected: {}", e);
        for (index, item) in errors.items().iter().enumerate() {
            for (field, messages) in item.iter() {
                println!("  [{}] {}: {}", index, field, messages.join(" "));
            }
        }
    }

    let dyndns = DyndnsMerger::new(reconciler.clone());
    let status = dyndns
        .apply_check_in(
            Some(&alice),
            "example.com",
            &CheckIn::new(Some("198.51.100.7"), Some("2001:db8::7")),
        )
        .await;
    println!("\nCheck-in: {}", status);

    println!("\nRRsets of example.com:");
    for view in reconciler
        .list(&alice, "example.com", &RrsetFilter::default())
        .await?
    {
        println!("  {} {} {} {:?}", view.name, view.ttl, view.rtype, view.records);
    }

    drop(dyndns);
    let _ = shutdown_tx.send(());
    if let Ok(result) = worker.await {
        result?;
    }
    println!("\nPushed {} change set(s)", pushes.load(Ordering::SeqCst));

    Ok(())
}
