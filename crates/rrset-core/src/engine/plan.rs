//! Batch validation and planning
//!
//! Turns a batch plus a consistent snapshot of the affected RRsets into
//! either a [`Plan`] of store writes or a positional [`BatchErrors`]. This is
//! a pure function of its inputs; the reconciler guarantees the snapshot
//! cannot change until the plan is committed.
//!
//! Checks run in stages, each only on items that survived the previous ones:
//!
//! 1. per-item field, type policy and record content checks
//! 2. intra-batch key uniqueness (a colliding item reports only that)
//! 3. existence of the key, for Create
//! 4. CNAME exclusivity against the batch and the stored RRsets

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::operation::BatchOperation;
use super::request::{Batch, BatchShape, ChangeItem, RECORDS, SUBNAME, TTL, TYPE};
use crate::error::{BatchErrors, ErrorKind, ItemErrors, NON_FIELD_ERRORS};
use crate::model::{Rrset, RrsetKey};
use crate::records::{self, names, policy};

const REQUIRED: &str = "This field is required.";

/// Stored RRsets at every subname a batch touches
#[derive(Debug, Clone, Default)]
pub(crate) struct Snapshot {
    existing: HashMap<RrsetKey, Rrset>,
    types_at: HashMap<String, BTreeSet<String>>,
}

impl Snapshot {
    pub(crate) fn from_rrsets(rrsets: impl IntoIterator<Item = Rrset>) -> Self {
        let mut snapshot = Self::default();
        for rrset in rrsets {
            snapshot
                .types_at
                .entry(rrset.subname.clone())
                .or_default()
                .insert(rrset.rtype.clone());
            snapshot.existing.insert(rrset.key(), rrset);
        }
        snapshot
    }

    pub(crate) fn get(&self, key: &RrsetKey) -> Option<&Rrset> {
        self.existing.get(key)
    }

    fn types_at(&self, subname: &str) -> impl Iterator<Item = &String> {
        self.types_at.get(subname).into_iter().flatten()
    }
}

/// Subnames a batch addresses, for loading its snapshot
pub(crate) fn touched_subnames(batch: &Batch) -> BTreeSet<String> {
    batch
        .items()
        .iter()
        .filter_map(|item| item.as_ref().ok())
        .map(|item| item.subname.clone().unwrap_or_default())
        .collect()
}

/// What committing an item does to its key
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    Write { ttl: u32, records: BTreeSet<String> },
    Delete,
    /// Stored RRset already matches
    Keep,
    Noop,
}

#[derive(Debug, Clone)]
pub(crate) struct PlannedItem {
    pub(crate) index: usize,
    pub(crate) key: RrsetKey,
    pub(crate) action: Action,
    /// Stored state before the batch, for rollback
    pub(crate) previous: Option<Rrset>,
}

/// Store writes for an accepted batch, one entry per input item
#[derive(Debug, Clone, Default)]
pub(crate) struct Plan {
    pub(crate) items: Vec<PlannedItem>,
}

impl Plan {
    /// Deletions first, then writes, each in input order; no-ops are skipped
    pub(crate) fn steps(&self) -> impl Iterator<Item = &PlannedItem> {
        let deletes = self.items.iter().filter(|i| i.action == Action::Delete);
        let writes = self
            .items
            .iter()
            .filter(|i| matches!(i.action, Action::Write { .. }));
        deletes.chain(writes)
    }

    #[cfg(test)]
    fn is_noop(&self) -> bool {
        self.items
            .iter()
            .all(|i| matches!(i.action, Action::Keep | Action::Noop))
    }
}

/// Parameters that do not come from the batch itself
#[derive(Debug, Clone, Copy)]
pub(crate) struct PlanContext<'a> {
    pub(crate) domain: &'a str,
    pub(crate) operation: BatchOperation,
    pub(crate) minimum_ttl: u32,
    pub(crate) maximum_ttl: u32,
}

/// Errors keyed by the original position of the item they belong to
#[derive(Debug, Default)]
pub(crate) struct ErrorLedger {
    entries: BTreeMap<usize, ItemErrors>,
}

impl ErrorLedger {
    pub(crate) fn record(&mut self, index: usize, errors: ItemErrors) {
        if !errors.is_empty() {
            self.entries.entry(index).or_default().extend(errors);
        }
    }

    /// Discard what was recorded for `index` and keep only `errors`
    pub(crate) fn replace(&mut self, index: usize, errors: ItemErrors) {
        self.entries.insert(index, errors);
    }

    pub(crate) fn has_errors(&self) -> bool {
        !self.entries.is_empty()
    }

    /// One entry per input position, `{}` where the item was fine
    pub(crate) fn into_batch_errors(mut self, len: usize, shape: BatchShape) -> BatchErrors {
        let items = (0..len)
            .map(|index| self.entries.remove(&index).unwrap_or_default())
            .collect();
        BatchErrors::new(items, shape == BatchShape::Single)
    }
}

/// Per-item result of stage 1
#[derive(Debug)]
struct Candidate {
    key: RrsetKey,
    /// `None` once the item has any error
    action: Option<Action>,
    clearing: bool,
}

/// Where a type at a subname comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Position {
    Request(usize),
    Database,
}

/// Validate a batch against a snapshot and plan its writes
pub(crate) fn plan(ctx: &PlanContext<'_>, batch: &Batch, snapshot: &Snapshot) -> Result<Plan, BatchErrors> {
    let mut ledger = ErrorLedger::default();
    let mut candidates: Vec<Option<Candidate>> = Vec::with_capacity(batch.len());

    for (index, raw) in batch.items().iter().enumerate() {
        match raw {
            Err(errors) => {
                ledger.record(index, errors.clone());
                candidates.push(None);
            }
            Ok(item) => {
                let (candidate, errors) = check_item(ctx, item, snapshot);
                ledger.record(index, errors);
                candidates.push(candidate);
            }
        }
    }

    check_uniqueness(batch, &mut candidates, &mut ledger);

    if ctx.operation.rejects_existing() {
        for (index, candidate) in candidates.iter_mut().enumerate() {
            if let Some(c) = candidate
                && c.action.is_some()
                && snapshot.get(&c.key).is_some()
            {
                ledger.record(
                    index,
                    ItemErrors::single(
                        NON_FIELD_ERRORS,
                        ErrorKind::Conflict,
                        "Another RRset with the same subdomain and type exists for this domain. \
                         (Try modifying it.)",
                    ),
                );
                c.action = None;
            }
        }
    }

    check_cname_exclusivity(&mut candidates, snapshot, &mut ledger);

    if ledger.has_errors() {
        return Err(ledger.into_batch_errors(batch.len(), batch.shape()));
    }

    let items = candidates
        .into_iter()
        .enumerate()
        .filter_map(|(index, candidate)| {
            let candidate = candidate?;
            let action = candidate.action?;
            Some(PlannedItem {
                index,
                previous: snapshot.get(&candidate.key).cloned(),
                key: candidate.key,
                action,
            })
        })
        .collect();
    Ok(Plan { items })
}

fn check_item(ctx: &PlanContext<'_>, item: &ChangeItem, snapshot: &Snapshot) -> (Option<Candidate>, ItemErrors) {
    let mut errors = ItemErrors::new();

    let rtype = match &item.rtype {
        None => {
            errors.add(TYPE, ErrorKind::Validation, REQUIRED);
            None
        }
        Some(rtype) => match policy::check_syntax(rtype) {
            Err(message) => {
                errors.add(TYPE, ErrorKind::Validation, message);
                None
            }
            Ok(()) => match policy::check_manageable(rtype) {
                Err(message) => {
                    errors.add(TYPE, ErrorKind::PolicyViolation, message);
                    None
                }
                Ok(()) => Some(rtype.clone()),
            },
        },
    };

    let subname = item.subname.clone().unwrap_or_default();
    let subname_valid = match names::validate_subname(&subname, ctx.domain) {
        Ok(()) => true,
        Err(message) => {
            errors.add(SUBNAME, ErrorKind::Validation, message);
            false
        }
    };

    let key = match rtype {
        Some(rtype) if subname_valid => Some(RrsetKey::new(subname, rtype)),
        _ => None,
    };
    let existing = key.as_ref().and_then(|k| snapshot.get(k));
    let field_policy = ctx.operation.field_policy(existing.is_some(), item);

    let ttl = match item.ttl {
        None => {
            if field_policy.ttl.is_required() {
                errors.add(TTL, ErrorKind::Validation, REQUIRED);
            }
            None
        }
        Some(ttl) if ttl < i64::from(ctx.minimum_ttl) => {
            errors.add(
                TTL,
                ErrorKind::Validation,
                format!("Ensure this value is greater than or equal to {}.", ctx.minimum_ttl),
            );
            None
        }
        Some(ttl) if ttl > i64::from(ctx.maximum_ttl) => {
            errors.add(
                TTL,
                ErrorKind::Validation,
                format!("Ensure this value is less than or equal to {}.", ctx.maximum_ttl),
            );
            None
        }
        Some(ttl) => u32::try_from(ttl).ok(),
    };

    let records = match (&item.records, &key) {
        (None, _) => {
            if field_policy.records.is_required() {
                errors.add(RECORDS, ErrorKind::Validation, REQUIRED);
            }
            None
        }
        (Some(records), _) if records.is_empty() && field_policy.records_nonempty => {
            errors.add(
                RECORDS,
                ErrorKind::Validation,
                "This field must not be empty when creating.",
            );
            None
        }
        // content cannot be judged without a valid type and owner
        (Some(_), None) => None,
        (Some(records), Some(key)) => {
            match records::canonicalize_rrset(&key.rtype, &key.subname, &key.fqdn(ctx.domain), records) {
                Ok(canonical) => Some(canonical),
                Err(problems) => {
                    for (kind, message) in problems {
                        errors.add(NON_FIELD_ERRORS, kind, message);
                    }
                    None
                }
            }
        }
    };

    let Some(key) = key else {
        return (None, errors);
    };
    let clearing = item.is_clearing();
    if !errors.is_empty() {
        return (
            Some(Candidate {
                key,
                action: None,
                clearing,
            }),
            errors,
        );
    }

    let records = records
        .or_else(|| existing.map(|e| e.records.clone()))
        .unwrap_or_default();
    let action = if records.is_empty() {
        if existing.is_some() { Action::Delete } else { Action::Noop }
    } else {
        match ttl.or_else(|| existing.map(|e| e.ttl)) {
            Some(ttl) if existing.is_some_and(|e| e.ttl == ttl && e.records == records) => Action::Keep,
            Some(ttl) => Action::Write { ttl, records },
            None => {
                errors.add(TTL, ErrorKind::Validation, REQUIRED);
                return (
                    Some(Candidate {
                        key,
                        action: None,
                        clearing,
                    }),
                    errors,
                );
            }
        }
    };

    (
        Some(Candidate {
            key,
            action: Some(action),
            clearing,
        }),
        errors,
    )
}

/// Every item sharing its `(subname, type)` with another gets only a
/// cross-reference to the other positions (0-indexed)
fn check_uniqueness(batch: &Batch, candidates: &mut [Option<Candidate>], ledger: &mut ErrorLedger) {
    let mut positions: HashMap<(String, String), Vec<usize>> = HashMap::new();
    for (index, raw) in batch.items().iter().enumerate() {
        if let Ok(item) = raw
            && let Some(rtype) = &item.rtype
        {
            let subname = item.subname.clone().unwrap_or_default();
            positions.entry((subname, rtype.clone())).or_default().push(index);
        }
    }

    for indices in positions.values().filter(|indices| indices.len() > 1) {
        for &index in indices {
            let others = indices
                .iter()
                .filter(|&&other| other != index)
                .map(|other| other.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            ledger.replace(
                index,
                ItemErrors::single(
                    NON_FIELD_ERRORS,
                    ErrorKind::Conflict,
                    format!("Same subname and type as in position(s) {}, but must be unique.", others),
                ),
            );
            if let Some(candidate) = &mut candidates[index] {
                candidate.action = None;
            }
        }
    }
}

/// No subname may hold a CNAME next to any other type once the batch is applied
fn check_cname_exclusivity(candidates: &mut [Option<Candidate>], snapshot: &Snapshot, ledger: &mut ErrorLedger) {
    let mut present: HashMap<String, BTreeMap<String, BTreeSet<Position>>> = HashMap::new();

    for candidate in candidates.iter().flatten() {
        let subname = &candidate.key.subname;
        if !present.contains_key(subname) {
            let stored = snapshot
                .types_at(subname)
                .map(|rtype| (rtype.clone(), BTreeSet::from([Position::Database])))
                .collect();
            present.insert(subname.clone(), stored);
        }
    }
    for (index, candidate) in candidates.iter().enumerate() {
        if let Some(c) = candidate
            && let Some(types) = present.get_mut(&c.key.subname)
        {
            types
                .entry(c.key.rtype.clone())
                .or_default()
                .insert(Position::Request(index));
        }
    }

    // RRsets vanishing in this batch free their type
    for (index, candidate) in candidates.iter().enumerate() {
        let Some(c) = candidate else { continue };
        let vanishes = match &c.action {
            Some(Action::Delete | Action::Noop) => true,
            Some(Action::Write { .. } | Action::Keep) => false,
            None => c.clearing,
        };
        if vanishes
            && let Some(positions) = present
                .get_mut(&c.key.subname)
                .and_then(|types| types.get_mut(&c.key.rtype))
        {
            positions.remove(&Position::Request(index));
            positions.remove(&Position::Database);
        }
    }

    for (index, candidate) in candidates.iter_mut().enumerate() {
        let Some(c) = candidate else { continue };
        if !matches!(c.action, Some(Action::Write { .. } | Action::Keep)) {
            continue;
        }
        let Some(types) = present.get(&c.key.subname) else {
            continue;
        };

        let is_cname = c.key.rtype == "CNAME";
        let mut conflicts: BTreeMap<Position, Vec<&str>> = BTreeMap::new();
        for (rtype, positions) in types {
            if (rtype == "CNAME") != is_cname {
                for position in positions {
                    conflicts.entry(*position).or_default().push(rtype);
                }
            }
        }
        if conflicts.is_empty() {
            continue;
        }

        let described = conflicts
            .into_iter()
            .map(|(position, mut rtypes)| {
                rtypes.sort_unstable();
                match position {
                    Position::Request(i) => format!("request index {} ({})", i, rtypes.join(", ")),
                    Position::Database => format!("database ({})", rtypes.join(", ")),
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        ledger.record(
            index,
            ItemErrors::single(
                NON_FIELD_ERRORS,
                ErrorKind::Conflict,
                format!(
                    "RRset with conflicting type present in {}. (No other RRsets are allowed alongside CNAME.)",
                    described
                ),
            ),
        );
        c.action = None;
    }
}
