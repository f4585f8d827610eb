// # Records
//
// Pure validation of record types, owner names and record content.
//
// ## Purpose
//
// Nothing in this module touches storage. The reconciler calls into it for
// every item of a batch before any state is read or written:
//
// - [`policy`]: which record types clients may manage
// - [`names`]: subname rules and domain names inside record data
// - [`content`]: per-type parsing into canonical presentation and wire form
// - [`tokens`]: presentation-format tokenizer shared by the parsers
//
// `loc`, `svcb` and `rrtypes` hold the pieces of the larger record formats.

pub mod content;
mod loc;
pub mod names;
pub mod policy;
mod rrtypes;
mod svcb;
pub mod tokens;

pub use content::{CanonicalRecord, canonicalize};
pub use policy::{TypeClass, check_manageable, classify};

use std::collections::{BTreeSet, HashMap};

use crate::error::ErrorKind;

/// Largest DNS response the whole RRset has to fit into
const MAX_RESPONSE_SIZE: usize = 65535;

/// Validate and canonicalize the records of one RRset
///
/// `name` is the fully qualified owner name. All problems are collected; the
/// canonical set is returned only if there are none. Duplicate records are
/// reported as conflicts, everything else as validation errors.
pub fn canonicalize_rrset(
    rtype: &str,
    subname: &str,
    name: &str,
    records: &[String],
) -> Result<BTreeSet<String>, Vec<(ErrorKind, String)>> {
    let mut errors: Vec<(ErrorKind, String)> = rrset_constraints(rtype, subname, records.len())
        .into_iter()
        .map(|message| (ErrorKind::Validation, message))
        .collect();

    let mut seen: HashMap<Vec<u8>, String> = HashMap::new();
    let mut canonical = BTreeSet::new();
    for record in records {
        let (kind, detail) = match canonicalize(rtype, record) {
            Ok(parsed) => match seen.get(parsed.wire()) {
                Some(first) => (
                    ErrorKind::Conflict,
                    format!("Duplicate record content: this is identical to '{}'", first),
                ),
                None => {
                    seen.insert(parsed.wire().to_vec(), parsed.presentation().to_string());
                    canonical.insert(parsed.into_presentation());
                    continue;
                }
            },
            Err(detail) => (ErrorKind::Validation, detail),
        };
        errors.push((
            kind,
            format!("Record content of {} {} invalid: '{}': {}", rtype, name, record, detail),
        ));
    }

    if errors.is_empty() {
        if let Some(excess) = excess_length(name, &canonical) {
            errors.push((
                ErrorKind::Validation,
                format!("Total length of RRset exceeds limit by {} bytes.", excess),
            ));
        }
    }

    if errors.is_empty() { Ok(canonical) } else { Err(errors) }
}

/// Type-specific constraints on the shape of an RRset
fn rrset_constraints(rtype: &str, subname: &str, count: usize) -> Vec<String> {
    let mut errors = Vec::new();
    if matches!(rtype, "CNAME" | "DNAME") && count > 1 {
        errors.push(format!("{} RRset cannot have multiple records.", rtype));
    }
    if matches!(rtype, "CNAME" | "DS") && subname.is_empty() && count > 0 {
        errors.push(format!("{} RRset cannot have empty subname.", rtype));
    }
    if matches!(rtype, "DNSKEY") && !subname.is_empty() && count > 0 {
        errors.push(format!("{} RRset must have empty subname.", rtype));
    }
    errors
}

/// Conservative size estimate of the RRset in a response: 12 octets of
/// overhead per record, 32 per RRset plus the owner name, and leeway for
/// signatures. Returns the excess over the response size limit, if any.
fn excess_length(name: &str, records: &BTreeSet<String>) -> Option<usize> {
    let total = 32 + name.len() + records.iter().map(|r| 12 + r.len()).sum::<usize>() + 256;
    total.checked_sub(MAX_RESPONSE_SIZE).filter(|excess| *excess > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(records: &[&str]) -> Vec<String> {
        records.iter().map(|r| r.to_string()).collect()
    }

    fn messages(errors: Vec<(ErrorKind, String)>) -> Vec<String> {
        errors.into_iter().map(|(_, message)| message).collect()
    }

    #[test]
    fn semantically_equal_records_are_duplicates() {
        let errors = canonicalize_rrset("AAAA", "www", "www.example.com.", &strings(&["::1", "::0001"]))
            .unwrap_err();
        assert_eq!(
            errors,
            vec![(
                ErrorKind::Conflict,
                "Record content of AAAA www.example.com. invalid: '::0001': \
                 Duplicate record content: this is identical to '::1'"
                    .to_string()
            )]
        );
    }

    #[test]
    fn collects_every_bad_record() {
        let errors = canonicalize_rrset(
            "A",
            "",
            "example.com.",
            &strings(&["1.2.3.4", "bogus", "1.2.3.999"]),
        )
        .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].0, ErrorKind::Validation);
        assert!(errors[0].1.starts_with("Record content of A example.com. invalid: 'bogus'"));
    }

    #[test]
    fn returns_canonical_set() {
        let records = canonicalize_rrset(
            "MX",
            "",
            "example.com.",
            &strings(&["10 MX1.example.com.", "20 mx2.example.com."]),
        )
        .unwrap();
        assert_eq!(
            records.into_iter().collect::<Vec<_>>(),
            vec!["10 mx1.example.com.", "20 mx2.example.com."]
        );
    }

    #[test]
    fn type_placement_rules() {
        let cname = strings(&["a.example.", "b.example."]);
        let errors = messages(canonicalize_rrset("CNAME", "", "example.com.", &cname).unwrap_err());
        assert!(errors.contains(&"CNAME RRset cannot have multiple records.".to_string()));
        assert!(errors.contains(&"CNAME RRset cannot have empty subname.".to_string()));

        let dnskey = strings(&["257 3 13 aGVsbG8="]);
        let errors = messages(canonicalize_rrset("DNSKEY", "sub", "sub.example.com.", &dnskey).unwrap_err());
        assert_eq!(errors, vec!["DNSKEY RRset must have empty subname.".to_string()]);
    }

    #[test]
    fn oversized_rrset_is_rejected() {
        let records: Vec<String> = (0..40)
            .map(|i| format!("\"{}{}\"", i, "x".repeat(2000)))
            .collect();
        let errors = messages(canonicalize_rrset("TXT", "", "example.com.", &records).unwrap_err());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Total length of RRset exceeds limit by"));
    }
}
