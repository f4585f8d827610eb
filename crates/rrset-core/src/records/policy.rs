//! Record type policy
//!
//! Decides which record types clients may manage. Types maintained by the
//! signing infrastructure are protected, types without a content validator
//! are unsupported.

/// Types maintained automatically (DNSSEC machinery, SOA)
pub const AUTOMATIC_TYPES: &[&str] = &["KEY", "NSEC", "NSEC3", "OPT", "RRSIG", "NSEC3PARAM", "SOA"];

/// Types with a known meaning that cannot be managed here
pub const UNSUPPORTED_TYPES: &[&str] = &["ALIAS", "IPSECKEY", "KEY", "WKS"];

/// Types clients may create, change and delete
pub const MANAGEABLE_TYPES: &[&str] = &[
    "A", "AAAA", "AFSDB", "APL", "CAA", "CDNSKEY", "CDS", "CERT", "CNAME", "CSYNC", "DHCID", "DLV",
    "DNAME", "DNSKEY", "DS", "EUI48", "EUI64", "HINFO", "HTTPS", "KX", "L32", "L64", "LOC", "LP",
    "MINFO", "MR", "MX", "NAPTR", "NID", "NS", "OPENPGPKEY", "PTR", "RKEY", "RP", "SMIMEA", "SPF",
    "SRV", "SSHFP", "SVCB", "TLSA", "TXT", "URI",
];

/// Classification of a record type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    /// Clients may manage this type
    Normal,
    /// Managed automatically; never writable, never filterable
    Automatic,
    /// Not manageable
    Unsupported,
}

/// Classify a record type mnemonic
pub fn classify(rtype: &str) -> TypeClass {
    if AUTOMATIC_TYPES.contains(&rtype) {
        TypeClass::Automatic
    } else if MANAGEABLE_TYPES.contains(&rtype) {
        TypeClass::Normal
    } else {
        TypeClass::Unsupported
    }
}

/// Check the syntax of a type mnemonic
pub fn check_syntax(rtype: &str) -> Result<(), String> {
    let mut chars = rtype.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err("Type must be uppercase alphanumeric and start with a letter.".to_string())
    }
}

/// Check that clients may manage `rtype`, returning the rejection message otherwise
pub fn check_manageable(rtype: &str) -> Result<(), String> {
    match classify(rtype) {
        TypeClass::Normal => Ok(()),
        TypeClass::Automatic => Err(format!(
            "You cannot tinker with the {} RR set. It is managed automatically.",
            rtype
        )),
        TypeClass::Unsupported if is_generic_type(rtype) => {
            Err("Generic type format is not supported.".to_string())
        }
        TypeClass::Unsupported => Err(format!(
            "The {} RR set type is currently unsupported.",
            rtype
        )),
    }
}

/// `TYPE65534` style mnemonics (RFC 3597)
fn is_generic_type(rtype: &str) -> bool {
    rtype
        .strip_prefix("TYPE")
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_types() {
        assert_eq!(classify("A"), TypeClass::Normal);
        assert_eq!(classify("SOA"), TypeClass::Automatic);
        // KEY is listed as both; automatic wins
        assert_eq!(classify("KEY"), TypeClass::Automatic);
        assert_eq!(classify("WKS"), TypeClass::Unsupported);
        assert_eq!(classify("NAPTR"), TypeClass::Normal);
        assert_eq!(classify("HTTPS"), TypeClass::Normal);
        assert_eq!(classify("IPSECKEY"), TypeClass::Unsupported);
        assert_eq!(classify("NULL"), TypeClass::Unsupported);
    }

    #[test]
    fn every_manageable_type_has_a_parser() {
        for rtype in MANAGEABLE_TYPES {
            if let Err(message) = crate::records::canonicalize(rtype, "") {
                assert!(!message.contains("unsupported"), "{rtype}: {message}");
            }
        }
    }

    #[test]
    fn rejection_messages() {
        assert_eq!(
            check_manageable("RRSIG").unwrap_err(),
            "You cannot tinker with the RRSIG RR set. It is managed automatically."
        );
        assert_eq!(
            check_manageable("TYPE65534").unwrap_err(),
            "Generic type format is not supported."
        );
        assert_eq!(
            check_manageable("IPSECKEY").unwrap_err(),
            "The IPSECKEY RR set type is currently unsupported."
        );
        assert!(check_manageable("TXT").is_ok());
    }

    #[test]
    fn syntax() {
        assert!(check_syntax("AAAA").is_ok());
        assert!(check_syntax("NSEC3PARAM").is_ok());
        assert!(check_syntax("aaaa").is_err());
        assert!(check_syntax("3A").is_err());
        assert!(check_syntax("").is_err());
    }

    #[test]
    fn type_lists_do_not_overlap_with_manageable() {
        for rtype in AUTOMATIC_TYPES.iter().chain(UNSUPPORTED_TYPES) {
            assert!(!MANAGEABLE_TYPES.contains(rtype), "{rtype}");
        }
    }
}
