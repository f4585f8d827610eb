// # Memory RRset Store
//
// In-memory implementation of RrsetStore.
//
// ## Purpose
//
// Provides a fast store that doesn't persist across restarts. Used by the
// test suites and by deployments that load zones from elsewhere on start.
//
// ## Crash Behavior
//
// - All domains and RRsets are lost on restart/crash

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::Zones;
use crate::Error;
use crate::model::{Domain, Rrset, RrsetFilter, RrsetKey};
use crate::traits::RrsetStore;

/// In-memory RRset store
///
/// # Example
///
/// ```rust,no_run
/// use rrset_core::{Domain, MemoryRrsetStore, RrsetStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryRrsetStore::new();
///     store.create_domain(&Domain::new("example.com", "alice", 3600)).await?;
///     assert!(store.get_domain("example.com").await?.is_some());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryRrsetStore {
    inner: Arc<RwLock<Zones>>,
}

impl MemoryRrsetStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of RRsets across all domains
    pub async fn len(&self) -> usize {
        self.inner.read().await.rrset_count()
    }

    /// Check if the store holds no RRsets
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RrsetStore for MemoryRrsetStore {
    async fn get_domain(&self, name: &str) -> Result<Option<Domain>, Error> {
        Ok(self.inner.read().await.domain(name))
    }

    async fn create_domain(&self, domain: &Domain) -> Result<(), Error> {
        self.inner.write().await.create_domain(domain)
    }

    async fn delete_domain(&self, name: &str) -> Result<bool, Error> {
        Ok(self.inner.write().await.delete_domain(name))
    }

    async fn mark_published(&self, name: &str, at: DateTime<Utc>) -> Result<(), Error> {
        self.inner.write().await.mark_published(name, at)
    }

    async fn get(&self, domain: &str, key: &RrsetKey) -> Result<Option<Rrset>, Error> {
        Ok(self.inner.read().await.get(domain, key))
    }

    async fn list(&self, domain: &str, filter: &RrsetFilter) -> Result<Vec<Rrset>, Error> {
        Ok(self.inner.read().await.list(domain, filter))
    }

    async fn upsert(
        &self,
        domain: &str,
        key: &RrsetKey,
        ttl: u32,
        records: BTreeSet<String>,
    ) -> Result<Option<Rrset>, Error> {
        self.inner.write().await.upsert(domain, key, ttl, records)
    }

    async fn restore(&self, domain: &str, key: &RrsetKey, previous: Option<Rrset>) -> Result<(), Error> {
        self.inner.write().await.restore(domain, key, previous)
    }

    async fn flush(&self) -> Result<(), Error> {
        // No-op for memory store
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    async fn store_with_domain() -> MemoryRrsetStore {
        let store = MemoryRrsetStore::new();
        store
            .create_domain(&Domain::new("example.com", "alice", 3600))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn upsert_creates_updates_and_deletes() {
        let store = store_with_domain().await;
        let key = RrsetKey::new("www", "A");

        let created = store
            .upsert("example.com", &key, 3600, records(&["192.0.2.1"]))
            .await
            .unwrap()
            .unwrap();
        let updated = store
            .upsert("example.com", &key, 7200, records(&["192.0.2.2"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.created, created.created);
        assert_eq!(updated.ttl, 7200);
        assert_eq!(store.len().await, 1);

        let deleted = store
            .upsert("example.com", &key, 7200, BTreeSet::new())
            .await
            .unwrap();
        assert!(deleted.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn empty_upsert_on_missing_key_is_noop() {
        let store = store_with_domain().await;
        let key = RrsetKey::new("", "TXT");
        assert!(store.upsert("example.com", &key, 3600, BTreeSet::new()).await.unwrap().is_none());
        assert!(!store.exists("example.com", &key).await.unwrap());
    }

    #[tokio::test]
    async fn upsert_into_unknown_domain_fails() {
        let store = MemoryRrsetStore::new();
        let err = store
            .upsert("nope.example", &RrsetKey::new("", "A"), 3600, records(&["192.0.2.1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn list_filters_and_domain_delete_cascades() {
        let store = store_with_domain().await;
        store
            .upsert("example.com", &RrsetKey::new("www", "A"), 3600, records(&["192.0.2.1"]))
            .await
            .unwrap();
        store
            .upsert("example.com", &RrsetKey::new("www", "AAAA"), 3600, records(&["::1"]))
            .await
            .unwrap();
        store
            .upsert("example.com", &RrsetKey::new("", "A"), 3600, records(&["192.0.2.9"]))
            .await
            .unwrap();

        let www = store.list("example.com", &RrsetFilter::subname("www")).await.unwrap();
        assert_eq!(www.len(), 2);

        assert!(store.delete_domain("example.com").await.unwrap());
        assert!(store.is_empty().await);
        assert!(!store.delete_domain("example.com").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_domain_is_rejected() {
        let store = store_with_domain().await;
        let err = store
            .create_domain(&Domain::new("example.com", "bob", 3600))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
