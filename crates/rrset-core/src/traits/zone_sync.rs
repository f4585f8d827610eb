// # Zone Sync Trait
//
// Defines the interface to the downstream nameserver pipeline.
//
// ## Purpose
//
// After a batch commits, the reconciler emits one [`ZoneChange`] describing
// exactly what was written. A `ZoneSync` implementation pushes it to the
// authoritative nameservers. Pushing happens asynchronously in the
// `SyncWorker`; a slow or failing downstream never blocks or rolls back a
// committed batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

/// One RRset written by a committed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AppliedChange {
    /// RRset created or replaced
    Upserted {
        subname: String,
        #[serde(rename = "type")]
        rtype: String,
        ttl: u32,
        records: BTreeSet<String>,
    },
    /// RRset removed
    Deleted {
        subname: String,
        #[serde(rename = "type")]
        rtype: String,
    },
}

/// All changes of one committed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneChange {
    pub domain: String,
    pub changes: Vec<AppliedChange>,
    pub committed_at: DateTime<Utc>,
}

/// Downstream propagation of committed changes
#[async_trait]
pub trait ZoneSync: Send + Sync {
    /// Push one committed change set
    ///
    /// Errors are retried by the caller.
    async fn push(&self, change: &ZoneChange) -> Result<(), crate::Error>;

    /// Name of this sync target (e.g., "tracing", "pdns")
    fn name(&self) -> &'static str;
}

/// Zone sync that only logs what would be pushed
#[derive(Debug, Clone, Default)]
pub struct TracingZoneSync;

#[async_trait]
impl ZoneSync for TracingZoneSync {
    async fn push(&self, change: &ZoneChange) -> Result<(), crate::Error> {
        for applied in &change.changes {
            match applied {
                AppliedChange::Upserted {
                    subname,
                    rtype,
                    ttl,
                    records,
                } => info!(
                    domain = %change.domain,
                    "upsert {}/{} ttl={} records={}",
                    subname,
                    rtype,
                    ttl,
                    records.len()
                ),
                AppliedChange::Deleted { subname, rtype } => {
                    info!(domain = %change.domain, "delete {}/{}", subname, rtype)
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}
