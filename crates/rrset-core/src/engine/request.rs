//! Batch input: change items and their structural parsing
//!
//! Items arrive either typed from Rust callers or as JSON values from an
//! outer surface. JSON items are checked for shape here; anything wrong with
//! the *shape* of a field becomes a structural error on that field, leaving
//! semantic validation to the reconciler.

use serde_json::Value;

use crate::error::{BatchErrors, ErrorKind, ItemErrors, NON_FIELD_ERRORS};

pub const SUBNAME: &str = "subname";
pub const TYPE: &str = "type";
pub const TTL: &str = "ttl";
pub const RECORDS: &str = "records";

/// One requested change, addressed by `(subname, type)`
///
/// `None` means the field was omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeItem {
    pub subname: Option<String>,
    pub rtype: Option<String>,
    pub ttl: Option<i64>,
    pub records: Option<Vec<String>>,
}

impl ChangeItem {
    pub fn new(subname: impl Into<String>, rtype: impl Into<String>) -> Self {
        Self {
            subname: Some(subname.into()),
            rtype: Some(rtype.into()),
            ttl: None,
            records: None,
        }
    }

    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_records<I, S>(mut self, records: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.records = Some(records.into_iter().map(Into::into).collect());
        self
    }

    /// Item asking for the RRset to be removed
    pub fn clearing(subname: impl Into<String>, rtype: impl Into<String>) -> Self {
        Self::new(subname, rtype).with_records(Vec::<String>::new())
    }

    /// Whether the item explicitly asks for an empty RRset
    pub fn is_clearing(&self) -> bool {
        self.records.as_ref().is_some_and(Vec::is_empty)
    }

    /// Parse an item from JSON, reporting structural problems per field
    pub fn from_value(value: &Value) -> Result<Self, ItemErrors> {
        let Value::Object(map) = value else {
            return Err(ItemErrors::single(
                NON_FIELD_ERRORS,
                ErrorKind::Structural,
                format!("Expected an object, but got {}.", json_type(value)),
            ));
        };

        let mut errors = ItemErrors::new();
        let mut item = ChangeItem::default();

        for (field, slot) in [(SUBNAME, &mut item.subname), (TYPE, &mut item.rtype)] {
            match map.get(field) {
                None => {}
                Some(Value::String(s)) => *slot = Some(s.clone()),
                Some(Value::Null) => errors.add(field, ErrorKind::Structural, "This field may not be null."),
                Some(_) => errors.add(field, ErrorKind::Structural, "Must be a string."),
            }
        }

        match map.get(TTL) {
            None => {}
            Some(Value::Null) => errors.add(TTL, ErrorKind::Structural, "This field may not be null."),
            Some(v) => match v.as_i64() {
                Some(ttl) => item.ttl = Some(ttl),
                None => errors.add(TTL, ErrorKind::Structural, "A valid integer is required."),
            },
        }

        match map.get(RECORDS) {
            None => {}
            Some(Value::Null) => errors.add(RECORDS, ErrorKind::Structural, "This field may not be null."),
            Some(Value::Array(entries)) => {
                let mut records = Vec::with_capacity(entries.len());
                for entry in entries {
                    match entry {
                        Value::String(s) => records.push(s.clone()),
                        Value::Null => {
                            errors.add(RECORDS, ErrorKind::Structural, "This field may not be null.")
                        }
                        _ => errors.add(RECORDS, ErrorKind::Structural, "Must be a string."),
                    }
                }
                item.records = Some(records);
            }
            Some(other) => errors.add(
                RECORDS,
                ErrorKind::Structural,
                format!("Expected a list of items but got {}.", json_type(other)),
            ),
        }

        if errors.is_empty() { Ok(item) } else { Err(errors) }
    }
}

/// Whether the caller submitted one object or a list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchShape {
    Single,
    List,
}

/// The items of one batch write, in submission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    items: Vec<Result<ChangeItem, ItemErrors>>,
    shape: BatchShape,
}

impl Batch {
    pub fn single(item: ChangeItem) -> Self {
        Self {
            items: vec![Ok(item)],
            shape: BatchShape::Single,
        }
    }

    pub fn list(items: impl IntoIterator<Item = ChangeItem>) -> Self {
        Self {
            items: items.into_iter().map(Ok).collect(),
            shape: BatchShape::List,
        }
    }

    /// Parse a JSON payload: an object is a single item, an array a list
    ///
    /// Only payload-level problems fail here; malformed items are kept in
    /// place so they can be reported positionally with everything else.
    pub fn from_json(value: &Value) -> Result<Self, BatchErrors> {
        match value {
            Value::Null => Err(BatchErrors::payload(ErrorKind::Structural, "No data provided")),
            Value::Object(_) => Ok(Self {
                items: vec![ChangeItem::from_value(value)],
                shape: BatchShape::Single,
            }),
            Value::Array(values) => Ok(Self {
                items: values.iter().map(ChangeItem::from_value).collect(),
                shape: BatchShape::List,
            }),
            other => Err(BatchErrors::payload(
                ErrorKind::Structural,
                format!(
                    "Expected an object or a list of objects, but got {}.",
                    json_type(other)
                ),
            )),
        }
    }

    pub fn shape(&self) -> BatchShape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Result<ChangeItem, ItemErrors>] {
        &self.items
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
