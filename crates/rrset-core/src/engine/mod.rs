//! Batch reconciliation engine
//!
//! The [`Reconciler`] is the only writer of the RRset store. It is responsible for:
//! - Resolving the target domain for the calling principal
//! - Validating a batch against a consistent snapshot of the affected RRsets
//! - Committing all items or none
//! - Announcing committed changes to the downstream sync worker
//!
//! ## Architecture
//!
//! ```text
//!   Batch ──▶ ┌──────────────┐  lock domain   ┌──────────────┐
//!             │  Reconciler  │ ─────────────▶ │  RrsetStore  │
//!             └──────────────┘  snapshot/plan └──────────────┘
//!                    │                               ▲
//!                    │ spawn                         │ upsert / restore
//!                    ▼                               │
//!             ┌──────────────┐ ──────────────────────┘
//!             │    commit    │
//!             └──────────────┘ ── ZoneChange ──▶ SyncWorker ──▶ ZoneSync
//! ```
//!
//! ## Request Flow
//!
//! 1. Domain lookup; unknown or foreign domains are `NotFound`
//! 2. Acquire the per-domain lock, read the snapshot, plan (under the request timeout)
//! 3. Commit in a spawned task holding the lock; deletions first
//! 4. On a storage fault, restore applied keys and re-run from step 2 with backoff
//! 5. Queue the `ZoneChange` while still holding the lock, so changes of
//!    one domain reach the feed in commit order. The feed is unbounded and
//!    never makes a commit wait for the sync worker

pub mod operation;
pub mod request;
pub mod sync;

mod locks;
mod plan;

pub use operation::{BatchOperation, FieldPolicy, Requirement};
pub use request::{Batch, BatchShape, ChangeItem};
pub use sync::SyncWorker;

use chrono::Utc;
use serde::{Serialize, Serializer};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{OwnedMutexGuard, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::model::{Domain, Principal, Rrset, RrsetFilter, RrsetKey, RrsetView, normalize_domain_name};
use crate::records::{TypeClass, classify, names::DomainName, policy};
use crate::traits::{AppliedChange, RrsetStore, ZoneChange};
use locks::DomainLocks;
use plan::{Action, Plan, PlanContext, Snapshot};

/// Per-call overrides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// TTL floor to use instead of the domain's own
    pub minimum_ttl: Option<u32>,
}

/// Computes a batch from the RRsets currently stored at one subname
pub type BuildBatch<'a> = dyn Fn(&[Rrset]) -> Result<Batch> + Send + Sync + 'a;

enum BatchSource<'a> {
    Given(&'a Batch),
    Derived {
        subname: &'a str,
        build: &'a BuildBatch<'a>,
    },
}

/// Result of an accepted batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    rrsets: Vec<RrsetView>,
    deleted: Vec<RrsetKey>,
    shape: BatchShape,
}

impl BatchOutcome {
    /// Resulting RRsets of the items that did not delete, in input order
    pub fn rrsets(&self) -> &[RrsetView] {
        &self.rrsets
    }

    /// Keys removed by the batch
    pub fn deleted(&self) -> &[RrsetKey] {
        &self.deleted
    }

    pub fn shape(&self) -> BatchShape {
        self.shape
    }
}

/// A single batch serializes as its RRset (or `null` if it vanished), a list as a list
impl Serialize for BatchOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.shape {
            BatchShape::Single => self.rrsets.first().serialize(serializer),
            BatchShape::List => self.rrsets.serialize(serializer),
        }
    }
}

/// Transactional RRset batch engine
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
///
/// ## Lifecycle
///
/// 1. Create with [`Reconciler::new()`], which also returns the change feed
/// 2. Hand the feed to a [`SyncWorker`]
/// 3. Drop the reconciler to close the feed
pub struct Reconciler {
    store: Arc<dyn RrsetStore>,
    config: EngineConfig,
    locks: DomainLocks,
    change_tx: mpsc::UnboundedSender<ZoneChange>,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, change_receiver) where change_receiver yields
    /// one [`ZoneChange`] per committed batch
    pub fn new(
        store: Arc<dyn RrsetStore>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ZoneChange>)> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let reconciler = Self {
            store,
            config,
            locks: DomainLocks::new(),
            change_tx: tx,
        };
        Ok((reconciler, rx))
    }

    pub fn store(&self) -> &Arc<dyn RrsetStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a domain owned by `principal`
    ///
    /// `minimum_ttl` defaults to the engine's configured floor.
    pub async fn create_domain(
        &self,
        principal: &Principal,
        name: &str,
        minimum_ttl: Option<u32>,
    ) -> Result<Domain> {
        let name = normalize_domain_name(name);
        let parsed = DomainName::parse(&format!("{}.", name))
            .map_err(|e| Error::validation(format!("Invalid domain name {}: {}", name, e)))?;
        if parsed.is_root() || !parsed.is_hostname() {
            return Err(Error::validation(format!(
                "Invalid domain name {}: must be a hostname",
                name
            )));
        }

        let minimum_ttl = minimum_ttl.unwrap_or(self.config.minimum_ttl);
        if minimum_ttl == 0 || minimum_ttl > self.config.maximum_ttl {
            return Err(Error::validation(format!(
                "Domain minimum TTL must be between 1 and {}",
                self.config.maximum_ttl
            )));
        }

        let _guard = self.locks.acquire(&name).await;
        let domain = Domain::new(&name, principal.id.clone(), minimum_ttl);
        self.store.create_domain(&domain).await?;
        info!(domain = %domain.name, owner = %domain.owner, "Domain created");
        Ok(domain)
    }

    /// Delete a domain with all its RRsets
    ///
    /// Downstream receives a deletion for every RRset the domain held.
    pub async fn delete_domain(&self, principal: &Principal, name: &str) -> Result<()> {
        let domain = self.visible_domain(principal, name).await?;
        let guard = self.locks.acquire(&domain.name).await;

        let rrsets = self.store.list(&domain.name, &RrsetFilter::default()).await?;
        if !self.store.delete_domain(&domain.name).await? {
            return Err(Error::not_found(format!("Domain {} does not exist", domain.name)));
        }
        info!(domain = %domain.name, rrsets = rrsets.len(), "Domain deleted");

        let change = ZoneChange {
            domain: domain.name.clone(),
            changes: rrsets
                .into_iter()
                .map(|r| AppliedChange::Deleted {
                    subname: r.subname,
                    rtype: r.rtype,
                })
                .collect(),
            committed_at: Utc::now(),
        };
        announce(&self.change_tx, change);
        drop(guard);
        Ok(())
    }

    /// Look up a domain owned by `principal`
    pub async fn domain(&self, principal: &Principal, name: &str) -> Result<Domain> {
        self.visible_domain(principal, name).await
    }

    /// Look up one RRset
    pub async fn get(
        &self,
        principal: &Principal,
        domain: &str,
        subname: &str,
        rtype: &str,
    ) -> Result<RrsetView> {
        let domain = self.visible_domain(principal, domain).await?;
        reject_automatic(rtype)?;

        let key = RrsetKey::new(subname, rtype);
        self.store
            .get(&domain.name, &key)
            .await?
            .map(|rrset| rrset.view(&domain.name))
            .ok_or_else(|| Error::not_found(format!("RRset {} does not exist in {}", key, domain.name)))
    }

    /// List the RRsets of a domain, ordered by key
    pub async fn list(
        &self,
        principal: &Principal,
        domain: &str,
        filter: &RrsetFilter,
    ) -> Result<Vec<RrsetView>> {
        let domain = self.visible_domain(principal, domain).await?;
        if let Some(rtype) = &filter.rtype {
            reject_automatic(rtype)?;
        }

        let rrsets = self.store.list(&domain.name, filter).await?;
        Ok(rrsets.iter().map(|r| r.view(&domain.name)).collect())
    }

    /// Delete one RRset; deleting a missing RRset is not an error
    ///
    /// Returns whether an RRset was removed.
    pub async fn delete(
        &self,
        principal: &Principal,
        domain: &str,
        subname: &str,
        rtype: &str,
    ) -> Result<bool> {
        policy::check_manageable(rtype).map_err(Error::policy)?;

        let outcome = self
            .apply(
                principal,
                domain,
                BatchOperation::Update,
                Batch::single(ChangeItem::clearing(subname, rtype)),
            )
            .await?;
        Ok(!outcome.deleted().is_empty())
    }

    /// Apply a batch with the domain's own TTL floor
    pub async fn apply(
        &self,
        principal: &Principal,
        domain: &str,
        operation: BatchOperation,
        batch: Batch,
    ) -> Result<BatchOutcome> {
        self.apply_with(principal, domain, operation, batch, ApplyOptions::default())
            .await
    }

    /// Apply a batch all-or-nothing
    ///
    /// Validation failures come back as [`Error::Rejected`] with one entry per
    /// input item. Storage faults are retried with exponential backoff.
    pub async fn apply_with(
        &self,
        principal: &Principal,
        domain: &str,
        operation: BatchOperation,
        batch: Batch,
        options: ApplyOptions,
    ) -> Result<BatchOutcome> {
        self.run(principal, domain, operation, BatchSource::Given(&batch), options)
            .await
    }

    /// Apply a batch computed from the RRsets at `subname`
    ///
    /// `build` sees those RRsets as they are under the domain lock, so
    /// nothing can change them between the read and the commit. It is
    /// called again for every retry.
    pub async fn apply_derived(
        &self,
        principal: &Principal,
        domain: &str,
        operation: BatchOperation,
        subname: &str,
        build: &BuildBatch<'_>,
        options: ApplyOptions,
    ) -> Result<BatchOutcome> {
        self.run(principal, domain, operation, BatchSource::Derived { subname, build }, options)
            .await
    }

    async fn run(
        &self,
        principal: &Principal,
        domain: &str,
        operation: BatchOperation,
        source: BatchSource<'_>,
        options: ApplyOptions,
    ) -> Result<BatchOutcome> {
        let domain = self.visible_domain(principal, domain).await?;

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            match self.try_apply(&domain, operation, &source, options).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() => {
                    warn!(domain = %domain.name, "Batch attempt {} failed: {}", attempt, e);
                    last_error = Some(e);

                    if attempt < self.config.max_retries {
                        let factor = 1u32 << attempt.min(16);
                        tokio::time::sleep(self.config.retry_delay().saturating_mul(factor)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let error = last_error.unwrap_or_else(|| Error::Other("Unknown error".to_string()));
        error!(
            domain = %domain.name,
            "Batch failed after {} retries: {}", self.config.max_retries, error
        );
        Err(error)
    }

    /// One validate-and-commit pass
    async fn try_apply(
        &self,
        domain: &Domain,
        operation: BatchOperation,
        source: &BatchSource<'_>,
        options: ApplyOptions,
    ) -> Result<BatchOutcome> {
        let ctx = PlanContext {
            domain: &domain.name,
            operation,
            minimum_ttl: options.minimum_ttl.unwrap_or(domain.minimum_ttl),
            maximum_ttl: self.config.maximum_ttl,
        };

        let timeout = self.config.request_timeout();
        let (guard, plan, shape) = tokio::time::timeout(timeout, self.prepare(&ctx, source))
            .await
            .map_err(|_| {
                Error::timeout(format!(
                    "Batch for {} did not reach its commit point within {:?}",
                    domain.name, timeout
                ))
            })??;

        debug!(
            domain = %domain.name,
            %operation,
            items = plan.items.len(),
            "Batch accepted"
        );

        // past this point the batch completes even if the caller goes away
        let store = self.store.clone();
        let change_tx = self.change_tx.clone();
        let name = domain.name.clone();
        tokio::spawn(async move { commit(guard, store, change_tx, name, plan, shape).await })
            .await
            .map_err(|e| Error::Other(format!("Commit task failed: {}", e)))?
    }

    /// Lock the domain, read its snapshot and plan the batch
    async fn prepare(
        &self,
        ctx: &PlanContext<'_>,
        source: &BatchSource<'_>,
    ) -> Result<(OwnedMutexGuard<()>, Plan, BatchShape)> {
        let guard = self.locks.acquire(ctx.domain).await;

        // the domain may have gone while we waited
        if self.store.get_domain(ctx.domain).await?.is_none() {
            return Err(Error::not_found(format!("Domain {} does not exist", ctx.domain)));
        }

        let derived: Batch;
        let batch = match source {
            BatchSource::Given(batch) => *batch,
            BatchSource::Derived { subname, build } => {
                let current = self.store.list(ctx.domain, &RrsetFilter::subname(*subname)).await?;
                derived = build(current.as_slice())?;
                &derived
            }
        };

        let mut rrsets = Vec::new();
        for subname in plan::touched_subnames(batch) {
            rrsets.extend(self.store.list(ctx.domain, &RrsetFilter::subname(subname)).await?);
        }
        let snapshot = Snapshot::from_rrsets(rrsets);

        match plan::plan(ctx, batch, &snapshot) {
            Ok(plan) => Ok((guard, plan, batch.shape())),
            Err(errors) => {
                info!(domain = %ctx.domain, operation = %ctx.operation, "Batch rejected: {}", errors);
                Err(Error::Rejected(errors))
            }
        }
    }

    /// The domain if it exists and belongs to `principal`
    async fn visible_domain(&self, principal: &Principal, name: &str) -> Result<Domain> {
        let name = normalize_domain_name(name);
        match self.store.get_domain(&name).await? {
            Some(domain) if principal.owns(&domain) => Ok(domain),
            _ => Err(Error::not_found(format!("Domain {} does not exist", name))),
        }
    }
}

fn reject_automatic(rtype: &str) -> Result<()> {
    if classify(rtype) == TypeClass::Automatic {
        policy::check_manageable(rtype).map_err(Error::policy)?;
    }
    Ok(())
}

/// Write a plan, rolling back on the first storage fault
async fn commit(
    guard: OwnedMutexGuard<()>,
    store: Arc<dyn RrsetStore>,
    change_tx: mpsc::UnboundedSender<ZoneChange>,
    domain: String,
    plan: Plan,
    shape: BatchShape,
) -> Result<BatchOutcome> {
    let mut applied = Vec::new();
    let mut written: HashMap<usize, Rrset> = HashMap::new();
    let mut changes = Vec::new();

    for step in plan.steps() {
        let (ttl, records) = match &step.action {
            Action::Write { ttl, records } => (*ttl, records.clone()),
            Action::Delete | Action::Keep | Action::Noop => (0, BTreeSet::new()),
        };

        match store.upsert(&domain, &step.key, ttl, records).await {
            Ok(stored) => {
                applied.push(step);
                match stored {
                    Some(rrset) => {
                        changes.push(AppliedChange::Upserted {
                            subname: rrset.subname.clone(),
                            rtype: rrset.rtype.clone(),
                            ttl: rrset.ttl,
                            records: rrset.records.clone(),
                        });
                        written.insert(step.index, rrset);
                    }
                    None => changes.push(AppliedChange::Deleted {
                        subname: step.key.subname.clone(),
                        rtype: step.key.rtype.clone(),
                    }),
                }
            }
            Err(e) => {
                error!(domain = %domain, key = %step.key, "Commit failed, rolling back: {}", e);
                for done in applied.iter().rev() {
                    if let Err(restore_err) = store.restore(&domain, &done.key, done.previous.clone()).await {
                        error!(domain = %domain, key = %done.key, "Rollback failed: {}", restore_err);
                    }
                }
                return Err(e);
            }
        }
    }

    let rrsets = plan
        .items
        .iter()
        .filter_map(|item| match item.action {
            Action::Keep => item.previous.as_ref(),
            _ => written.get(&item.index),
        })
        .map(|rrset| rrset.view(&domain))
        .collect();
    let deleted = plan
        .items
        .iter()
        .filter(|item| item.action == Action::Delete)
        .map(|item| item.key.clone())
        .collect();

    if !changes.is_empty() {
        info!(domain = %domain, changes = changes.len(), "Batch committed");
        announce(
            &change_tx,
            ZoneChange {
                domain,
                changes,
                committed_at: Utc::now(),
            },
        );
    }
    drop(guard);

    Ok(BatchOutcome {
        rrsets,
        deleted,
        shape,
    })
}

/// Hand a committed change to the sync worker
///
/// Never waits. A closed feed only means nobody propagates changes, which
/// does not undo the commit.
fn announce(change_tx: &mpsc::UnboundedSender<ZoneChange>, change: ZoneChange) {
    if change_tx.send(change).is_err() {
        warn!("Change channel closed, committed change will not be propagated");
    }
}
