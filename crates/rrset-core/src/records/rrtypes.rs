//! Record type codes
//!
//! Mnemonic to number mapping for types named inside record data, such as
//! CSYNC type bitmaps.

use std::collections::BTreeSet;

const TYPE_CODES: &[(&str, u16)] = &[
    ("A", 1),
    ("NS", 2),
    ("MD", 3),
    ("MF", 4),
    ("CNAME", 5),
    ("SOA", 6),
    ("MB", 7),
    ("MG", 8),
    ("MR", 9),
    ("NULL", 10),
    ("WKS", 11),
    ("PTR", 12),
    ("HINFO", 13),
    ("MINFO", 14),
    ("MX", 15),
    ("TXT", 16),
    ("RP", 17),
    ("AFSDB", 18),
    ("X25", 19),
    ("ISDN", 20),
    ("RT", 21),
    ("NSAP", 22),
    ("NSAP-PTR", 23),
    ("SIG", 24),
    ("KEY", 25),
    ("PX", 26),
    ("GPOS", 27),
    ("AAAA", 28),
    ("LOC", 29),
    ("NXT", 30),
    ("SRV", 33),
    ("NAPTR", 35),
    ("KX", 36),
    ("CERT", 37),
    ("A6", 38),
    ("DNAME", 39),
    ("OPT", 41),
    ("APL", 42),
    ("DS", 43),
    ("SSHFP", 44),
    ("IPSECKEY", 45),
    ("RRSIG", 46),
    ("NSEC", 47),
    ("DNSKEY", 48),
    ("DHCID", 49),
    ("NSEC3", 50),
    ("NSEC3PARAM", 51),
    ("TLSA", 52),
    ("SMIMEA", 53),
    ("HIP", 55),
    ("NINFO", 56),
    ("RKEY", 57),
    ("TALINK", 58),
    ("CDS", 59),
    ("CDNSKEY", 60),
    ("OPENPGPKEY", 61),
    ("CSYNC", 62),
    ("ZONEMD", 63),
    ("SVCB", 64),
    ("HTTPS", 65),
    ("SPF", 99),
    ("NID", 104),
    ("L32", 105),
    ("L64", 106),
    ("LP", 107),
    ("EUI48", 108),
    ("EUI64", 109),
    ("TKEY", 249),
    ("TSIG", 250),
    ("IXFR", 251),
    ("AXFR", 252),
    ("MAILB", 253),
    ("MAILA", 254),
    ("ANY", 255),
    ("URI", 256),
    ("CAA", 257),
    ("AVC", 258),
    ("AMTRELAY", 260),
    ("TA", 32768),
    ("DLV", 32769),
];

/// Type number for a mnemonic, accepting the `TYPE123` form
pub fn code(mnemonic: &str) -> Option<u16> {
    let upper = mnemonic.to_ascii_uppercase();
    if let Some(&(_, code)) = TYPE_CODES.iter().find(|(name, _)| *name == upper) {
        return Some(code);
    }
    upper
        .strip_prefix("TYPE")
        .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|n| n.parse().ok())
}

/// Mnemonic for a type number, `TYPE123` for unnamed ones
pub fn mnemonic(code: u16) -> String {
    match TYPE_CODES.iter().find(|(_, c)| *c == code) {
        Some((name, _)) => (*name).to_string(),
        None => format!("TYPE{}", code),
    }
}

/// Windowed type bitmap as used by NSEC and CSYNC (RFC 4034 section 4.1.2)
pub fn write_bitmap(types: &BTreeSet<u16>, out: &mut Vec<u8>) {
    let mut window: Option<(u8, Vec<u8>)> = None;
    for &rtype in types {
        let [high, low] = rtype.to_be_bytes();
        if let Some((w, bits)) = window.take_if(|(w, _)| *w != high) {
            flush_window(w, &bits, out);
        }
        let (_, bits) = window.get_or_insert_with(|| (high, Vec::new()));
        let index = usize::from(low / 8);
        if bits.len() <= index {
            bits.resize(index + 1, 0);
        }
        bits[index] |= 0x80 >> (low % 8);
    }
    if let Some((w, bits)) = window {
        flush_window(w, &bits, out);
    }
}

fn flush_window(window: u8, bits: &[u8], out: &mut Vec<u8>) {
    out.push(window);
    // at most 32 octets per window
    out.push(bits.len() as u8);
    out.extend_from_slice(bits);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::policy::MANAGEABLE_TYPES;

    #[test]
    fn maps_mnemonics_both_ways() {
        assert_eq!(code("AAAA"), Some(28));
        assert_eq!(code("aaaa"), Some(28));
        assert_eq!(code("TYPE65534"), Some(65534));
        assert_eq!(code("AAA"), None);
        assert_eq!(code("TYPE70000"), None);
        assert_eq!(mnemonic(62), "CSYNC");
        assert_eq!(mnemonic(65534), "TYPE65534");
    }

    #[test]
    fn every_manageable_type_has_a_code() {
        for rtype in MANAGEABLE_TYPES {
            assert!(code(rtype).is_some(), "{rtype}");
        }
    }

    #[test]
    fn bitmap_is_split_into_windows() {
        let mut out = Vec::new();
        write_bitmap(&BTreeSet::from([1, 2, 28]), &mut out);
        assert_eq!(out, vec![0, 4, 0x60, 0, 0, 0x08]);

        let mut out = Vec::new();
        write_bitmap(&BTreeSet::from([1, 32769]), &mut out);
        assert_eq!(out, vec![0, 1, 0x40, 128, 1, 0x40]);
    }
}
