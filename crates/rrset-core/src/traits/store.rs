// # RRset Store Trait
//
// Defines the interface for persistent RRset storage.
//
// ## Purpose
//
// The store holds domains and their RRsets, keyed by
// `(domain, subname, type)`. It offers single-key reads and writes only;
// batch atomicity, ordering and rollback are owned by the `Reconciler`,
// which serializes all writes per domain.
//
// ## Implementations
//
// - Memory: `MemoryRrsetStore`
// - File-based: `FileRrsetStore` (JSON, atomic rename)
//
// ## Usage
//
// ```rust
// use rrset_core::{Domain, MemoryRrsetStore, RrsetKey, RrsetStore};
// use std::collections::BTreeSet;
//
// #[tokio::main]
// async fn main() -> rrset_core::Result<()> {
//     let store = MemoryRrsetStore::new();
//     store.create_domain(&Domain::new("example.com", "alice", 3600)).await?;
//     let key = RrsetKey::new("www", "A");
//
//     let records = BTreeSet::from(["192.0.2.1".to_string()]);
//     store.upsert("example.com", &key, 3600, records).await?;
//
//     // An empty record set deletes the RRset
//     store.upsert("example.com", &key, 3600, BTreeSet::new()).await?;
//     assert!(!store.exists("example.com", &key).await?);
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::model::{Domain, Rrset, RrsetFilter, RrsetKey};

/// Trait for RRset store implementations
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Semantics
///
/// - `upsert` with an empty record set deletes the RRset; on a missing key
///   it is a no-op
/// - A stored RRset always has at least one record
/// - Deleting a domain removes all of its RRsets
/// - Every write is durable when the call returns
#[async_trait]
pub trait RrsetStore: Send + Sync {
    /// Look up a domain by its normalized name
    async fn get_domain(&self, name: &str) -> Result<Option<Domain>, crate::Error>;

    /// Create a domain; fails if it already exists
    async fn create_domain(&self, domain: &Domain) -> Result<(), crate::Error>;

    /// Delete a domain and all its RRsets, returning whether it existed
    async fn delete_domain(&self, name: &str) -> Result<bool, crate::Error>;

    /// Record that the domain's latest changes reached the nameservers
    async fn mark_published(&self, name: &str, at: DateTime<Utc>) -> Result<(), crate::Error>;

    /// Get one RRset
    async fn get(&self, domain: &str, key: &RrsetKey) -> Result<Option<Rrset>, crate::Error>;

    /// Whether an RRset exists
    async fn exists(&self, domain: &str, key: &RrsetKey) -> Result<bool, crate::Error> {
        Ok(self.get(domain, key).await?.is_some())
    }

    /// List the RRsets of a domain matching the filter, ordered by key
    async fn list(&self, domain: &str, filter: &RrsetFilter) -> Result<Vec<Rrset>, crate::Error>;

    /// Create, replace or (with an empty set) delete an RRset
    ///
    /// Returns the stored RRset, or `None` if it no longer exists.
    async fn upsert(
        &self,
        domain: &str,
        key: &RrsetKey,
        ttl: u32,
        records: BTreeSet<String>,
    ) -> Result<Option<Rrset>, crate::Error>;

    /// Put back an exact previous state (`None` removes the key), timestamps included
    async fn restore(
        &self,
        domain: &str,
        key: &RrsetKey,
        previous: Option<Rrset>,
    ) -> Result<(), crate::Error>;

    /// Persist all pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
