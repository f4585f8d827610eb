//! Batch write variants and their field-requirement policies

use serde::{Deserialize, Serialize};
use std::fmt;

use super::request::ChangeItem;

/// The three batch write variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOperation {
    /// Every key must be new; records must be non-empty
    Create,
    /// Every item fully replaces its key (empty records delete)
    Replace,
    /// Items may omit fields that keep their current value
    Update,
}

/// Whether a field must be supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
}

impl Requirement {
    pub fn is_required(self) -> bool {
        self == Requirement::Required
    }
}

/// Field requirements for one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPolicy {
    pub ttl: Requirement,
    pub records: Requirement,
    /// An empty record list is rejected rather than meaning deletion
    pub records_nonempty: bool,
}

impl BatchOperation {
    /// Requirements for `item`, given whether its key currently exists
    pub fn field_policy(self, exists: bool, item: &ChangeItem) -> FieldPolicy {
        use Requirement::*;
        match self {
            BatchOperation::Create => FieldPolicy {
                ttl: Required,
                records: Required,
                records_nonempty: true,
            },
            // deleting tolerates a missing ttl
            BatchOperation::Replace => FieldPolicy {
                ttl: if item.is_clearing() { Optional } else { Required },
                records: Required,
                records_nonempty: false,
            },
            BatchOperation::Update if exists => FieldPolicy {
                ttl: Optional,
                records: Optional,
                records_nonempty: false,
            },
            // nothing to patch: only an item that would create needs a full definition
            BatchOperation::Update => {
                let creates = item.records.as_ref().is_some_and(|r| !r.is_empty());
                FieldPolicy {
                    ttl: if creates { Required } else { Optional },
                    records: Optional,
                    records_nonempty: false,
                }
            }
        }
    }

    /// Whether an existing key is a conflict for this operation
    pub fn rejects_existing(self) -> bool {
        self == BatchOperation::Create
    }
}

impl fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BatchOperation::Create => "create",
            BatchOperation::Replace => "replace",
            BatchOperation::Update => "update",
        })
    }
}
