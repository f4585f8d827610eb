//! Test doubles and common utilities for contract tests
//!
//! The doubles wrap or replace the engine's collaborators so tests can
//! inject storage faults and observe what reaches downstream.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rrset_core::error::Result;
use rrset_core::{
    Domain, EngineConfig, MemoryRrsetStore, Principal, Reconciler, Rrset, RrsetFilter, RrsetKey,
    RrsetStore, ZoneChange, ZoneSync,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const DOMAIN: &str = "example.com";
pub const OWNER: &str = "alice";

/// A store that fails chosen upsert calls and counts what it is asked to do
#[derive(Clone)]
pub struct FlakyStore {
    inner: MemoryRrsetStore,
    /// Call counter for upsert()
    upsert_calls: Arc<AtomicUsize>,
    /// Call counter for restore()
    restore_calls: Arc<AtomicUsize>,
    /// 1-based upsert call numbers that fail with a storage error
    fail_on: Arc<Mutex<BTreeSet<usize>>>,
    /// Pause inside every upsert, to widen race windows
    upsert_delay: Duration,
    /// Pause inside every list
    list_delay: Duration,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryRrsetStore::new(),
            upsert_calls: Arc::new(AtomicUsize::new(0)),
            restore_calls: Arc::new(AtomicUsize::new(0)),
            fail_on: Arc::new(Mutex::new(BTreeSet::new())),
            upsert_delay: Duration::ZERO,
            list_delay: Duration::ZERO,
        }
    }

    /// Fail the given upsert calls (counting from 1 across the store's life)
    pub fn failing_on(self, calls: &[usize]) -> Self {
        self.fail_on.lock().unwrap().extend(calls.iter().copied());
        self
    }

    pub fn with_upsert_delay(mut self, delay: Duration) -> Self {
        self.upsert_delay = delay;
        self
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    /// Get the number of times upsert() was called
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Get the number of times restore() was called
    pub fn restore_calls(&self) -> usize {
        self.restore_calls.load(Ordering::SeqCst)
    }

    /// Create a new FlakyStore that shares state and counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        other.clone()
    }
}

#[async_trait]
impl RrsetStore for FlakyStore {
    async fn get_domain(&self, name: &str) -> Result<Option<Domain>> {
        self.inner.get_domain(name).await
    }

    async fn create_domain(&self, domain: &Domain) -> Result<()> {
        self.inner.create_domain(domain).await
    }

    async fn delete_domain(&self, name: &str) -> Result<bool> {
        self.inner.delete_domain(name).await
    }

    async fn mark_published(&self, name: &str, at: DateTime<Utc>) -> Result<()> {
        self.inner.mark_published(name, at).await
    }

    async fn get(&self, domain: &str, key: &RrsetKey) -> Result<Option<Rrset>> {
        self.inner.get(domain, key).await
    }

    async fn list(&self, domain: &str, filter: &RrsetFilter) -> Result<Vec<Rrset>> {
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        self.inner.list(domain, filter).await
    }

    async fn upsert(
        &self,
        domain: &str,
        key: &RrsetKey,
        ttl: u32,
        records: BTreeSet<String>,
    ) -> Result<Option<Rrset>> {
        let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.upsert_delay.is_zero() {
            tokio::time::sleep(self.upsert_delay).await;
        }
        if self.fail_on.lock().unwrap().contains(&call) {
            return Err(rrset_core::Error::storage(format!("injected fault on upsert #{}", call)));
        }
        self.inner.upsert(domain, key, ttl, records).await
    }

    async fn restore(&self, domain: &str, key: &RrsetKey, previous: Option<Rrset>) -> Result<()> {
        self.restore_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.restore(domain, key, previous).await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}

/// A ZoneSync that records every push and can fail the first few
#[derive(Clone, Default)]
pub struct RecordingZoneSync {
    /// Call counter for push()
    push_calls: Arc<AtomicUsize>,
    /// Remaining pushes to fail
    failures_left: Arc<AtomicUsize>,
    /// Successfully pushed changes, in order
    pushed: Arc<Mutex<Vec<ZoneChange>>>,
}

impl RecordingZoneSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(self, failures: usize) -> Self {
        self.failures_left.store(failures, Ordering::SeqCst);
        self
    }

    /// Get the number of times push() was called
    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    /// Get the changes that were accepted
    pub fn pushed(&self) -> Vec<ZoneChange> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ZoneSync for RecordingZoneSync {
    async fn push(&self, change: &ZoneChange) -> Result<()> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(rrset_core::Error::Other("nameserver unavailable".to_string()));
        }
        self.pushed.lock().unwrap().push(change.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Engine configuration with short delays for tests
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        retry_delay_ms: 1,
        request_timeout_ms: 2_000,
        resync_interval_ms: 10,
        ..EngineConfig::default()
    }
}

pub fn owner() -> Principal {
    Principal::new(OWNER)
}

/// A reconciler over `store` with [`DOMAIN`] created for [`OWNER`] (TTL floor 60)
pub async fn reconciler_with_domain(
    store: Arc<dyn RrsetStore>,
    config: EngineConfig,
) -> (Arc<Reconciler>, mpsc::UnboundedReceiver<ZoneChange>) {
    let (reconciler, changes) = Reconciler::new(store, config).expect("valid config");
    reconciler
        .create_domain(&owner(), DOMAIN, Some(60))
        .await
        .expect("domain created");
    (Arc::new(reconciler), changes)
}

/// Records of one stored RRset, or `None` if absent
pub async fn stored_records(store: &dyn RrsetStore, subname: &str, rtype: &str) -> Option<Vec<String>> {
    store
        .get(DOMAIN, &RrsetKey::new(subname, rtype))
        .await
        .unwrap()
        .map(|rrset| rrset.records.into_iter().collect())
}
