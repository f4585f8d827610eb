//! Error types for the RRset engine
//!
//! Two layers live here: [`Error`], the crate-wide error returned by every
//! fallible operation, and the positional error vocabulary
//! ([`ItemErrors`], [`BatchErrors`]) a rejected batch is reported with.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Result type alias for RRset operations
pub type Result<T> = std::result::Result<T, Error>;

/// Key under which errors not tied to a single field are reported
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Classification of a failure, independent of its message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Payload has the wrong shape (not an object, null entries, wrong JSON types)
    Structural,
    /// The record type may not be managed by clients
    PolicyViolation,
    /// Field or record content is invalid
    Validation,
    /// The item collides with another item or with stored state
    Conflict,
    /// Domain or RRset does not exist (or is not visible to the caller)
    NotFound,
    /// The backing store failed
    StorageFault,
    /// The request did not reach its commit point in time
    Timeout,
    /// Configuration or other internal failure
    Internal,
}

/// Errors attached to one item of a batch, keyed by field name
///
/// An item without errors serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemErrors {
    fields: BTreeMap<String, Vec<String>>,
    kinds: BTreeSet<ErrorKind>,
}

impl ItemErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an error object holding a single message
    pub fn single(field: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, kind, message);
        errors
    }

    /// Append a message to a field
    pub fn add(&mut self, field: impl Into<String>, kind: ErrorKind, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
        self.kinds.insert(kind);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Messages reported for a field, empty if none
    pub fn messages(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate over `(field, messages)` pairs in field order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn kinds(&self) -> &BTreeSet<ErrorKind> {
        &self.kinds
    }

    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Merge another error object into this one
    pub fn extend(&mut self, other: ItemErrors) {
        for (field, messages) in other.fields {
            self.fields.entry(field).or_default().extend(messages);
        }
        self.kinds.extend(other.kinds);
    }
}

impl Serialize for ItemErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, messages) in &self.fields {
            map.serialize_entry(field, messages)?;
        }
        map.end()
    }
}

/// Positional errors for a rejected batch
///
/// Entry `i` corresponds to input item `i`. A batch submitted as a single
/// object serializes as a single error object, a list as a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchErrors {
    items: Vec<ItemErrors>,
    single: bool,
}

impl BatchErrors {
    pub fn new(items: Vec<ItemErrors>, single: bool) -> Self {
        Self { items, single }
    }

    /// Rejection of the payload as a whole (e.g. wrong top-level shape)
    pub fn payload(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            items: vec![ItemErrors::single(NON_FIELD_ERRORS, kind, message)],
            single: true,
        }
    }

    pub fn items(&self) -> &[ItemErrors] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&ItemErrors> {
        self.items.get(index)
    }

    pub fn is_single(&self) -> bool {
        self.single
    }

    /// Number of items that carry at least one error
    pub fn rejected_count(&self) -> usize {
        self.items.iter().filter(|e| !e.is_empty()).count()
    }

    /// The most significant kind present, used to classify the whole rejection
    pub fn kind(&self) -> ErrorKind {
        let kinds: BTreeSet<ErrorKind> = self
            .items
            .iter()
            .flat_map(|e| e.kinds().iter().copied())
            .collect();
        [
            ErrorKind::PolicyViolation,
            ErrorKind::Conflict,
            ErrorKind::Structural,
            ErrorKind::Validation,
        ]
        .into_iter()
        .find(|k| kinds.contains(k))
        .unwrap_or(ErrorKind::Validation)
    }
}

impl fmt::Display for BatchErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} item(s) rejected",
            self.rejected_count(),
            self.items.len()
        )
    }
}

impl Serialize for BatchErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.single
            && let Some(first) = self.items.first()
        {
            return first.serialize(serializer);
        }
        let mut seq = serializer.serialize_seq(Some(self.items.len()))?;
        for item in &self.items {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

/// Core error type for the RRset engine
#[derive(Error, Debug)]
pub enum Error {
    /// The batch failed validation; nothing was written
    #[error("Batch rejected: {0}")]
    Rejected(BatchErrors),

    /// Domain or RRset not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation on a type clients may not manage
    #[error("Policy violation: {0}")]
    Policy(String),

    /// Invalid input outside of a batch (filters, single-key lookups)
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Write collides with existing state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Request abandoned before its commit point
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a policy violation error
    pub fn policy(msg: impl Into<String>) -> Self {
        Self::Policy(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Rejected(errors) => errors.kind(),
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Policy(_) => ErrorKind::PolicyViolation,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Storage(_) | Error::Io(_) => ErrorKind::StorageFault,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Json(_) => ErrorKind::Structural,
            Error::Config(_) | Error::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether re-running the whole operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Io(_))
    }

    /// Positional errors, if this is a batch rejection
    pub fn batch_errors(&self) -> Option<&BatchErrors> {
        match self {
            Error::Rejected(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
