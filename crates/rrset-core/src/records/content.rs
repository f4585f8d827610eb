//! Record content validation and canonicalization
//!
//! Record content is parsed into typed [`RecordData`], from which both the
//! canonical presentation string and the canonical wire encoding are derived.
//! Two inputs denote the same record exactly when their wire encodings are
//! equal, so `::1` and `::0001` (or `Mail.Example.` and `mail.example.`)
//! collapse to one record.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::loc::Location;
use super::names::DomainName;
use super::rrtypes;
use super::svcb::SvcParams;
use super::tokens::{Token, quote, tokenize};

/// Largest wire encoding accepted for a single record
pub const MAX_RECORD_WIRE_LENGTH: usize = 64000;

/// Standard alphabet; stray bits in the last symbol are ignored on decode
pub(super) const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// CERT type mnemonics (RFC 4398 section 2.1)
const CERT_TYPES: &[(&str, u16)] = &[
    ("PKIX", 1),
    ("SPKI", 2),
    ("PGP", 3),
    ("IPKIX", 4),
    ("ISPKI", 5),
    ("IPGP", 6),
    ("ACPKIX", 7),
    ("IACPKIX", 8),
    ("URI", 253),
    ("OID", 254),
];

/// A validated record in canonical form
#[derive(Debug, Clone, Eq)]
pub struct CanonicalRecord {
    presentation: String,
    wire: Vec<u8>,
}

impl CanonicalRecord {
    /// Canonical presentation format, as stored and returned
    pub fn presentation(&self) -> &str {
        &self.presentation
    }

    /// Canonical wire encoding of the record data
    pub fn wire(&self) -> &[u8] {
        &self.wire
    }

    pub fn into_presentation(self) -> String {
        self.presentation
    }
}

impl PartialEq for CanonicalRecord {
    fn eq(&self, other: &Self) -> bool {
        self.wire == other.wire
    }
}

impl std::hash::Hash for CanonicalRecord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.wire.hash(state);
    }
}

/// Validate `content` as a record of type `rtype` and return its canonical form
///
/// Errors are returned as client-facing messages.
pub fn canonicalize(rtype: &str, content: &str) -> Result<CanonicalRecord, String> {
    let tokens = tokenize(content).map_err(|e| malformed(rtype, &e))?;
    let mut cursor = Cursor::new(rtype, tokens);
    let data = RecordData::parse(rtype, &mut cursor)?;
    cursor.finish()?;

    let mut wire = Vec::new();
    data.write_wire(&mut wire);
    if wire.len() > MAX_RECORD_WIRE_LENGTH {
        return Err(format!(
            "Ensure this value has no more than {} byte in wire format (it has {}).",
            MAX_RECORD_WIRE_LENGTH,
            wire.len()
        ));
    }

    Ok(CanonicalRecord {
        presentation: data.to_presentation(),
        wire,
    })
}

fn malformed(rtype: &str, detail: &str) -> String {
    format!("Record content for type {} malformed: {}", rtype, detail)
}

fn unparsable(detail: impl std::fmt::Display) -> String {
    format!("Cannot parse record contents: {}", detail)
}

fn binary_error() -> String {
    "Cannot parse hexadecimal or base64 record contents".to_string()
}

/// Sequential access to the tokens of one record
struct Cursor<'a> {
    rtype: &'a str,
    tokens: std::vec::IntoIter<Token>,
}

impl<'a> Cursor<'a> {
    fn new(rtype: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            rtype,
            tokens: tokens.into_iter(),
        }
    }

    fn next(&mut self) -> Result<Token, String> {
        self.tokens
            .next()
            .ok_or_else(|| malformed(self.rtype, "unexpected end of input"))
    }

    fn next_uint(&mut self, bits: u32) -> Result<u64, String> {
        let token = self.next()?;
        let text = token.text();
        let max = (1u64 << bits) - 1;
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(unparsable(format!(
                "'{}' is not a valid {}-bit unsigned integer",
                text, bits
            )));
        }
        text.parse::<u64>()
            .ok()
            .filter(|v| *v <= max)
            .ok_or_else(|| unparsable(format!("'{}' is not a valid {}-bit unsigned integer", text, bits)))
    }

    fn next_u8(&mut self) -> Result<u8, String> {
        self.next_uint(8).map(|v| v as u8)
    }

    fn next_u16(&mut self) -> Result<u16, String> {
        self.next_uint(16).map(|v| v as u16)
    }

    fn next_name(&mut self) -> Result<DomainName, String> {
        let token = self.next()?;
        if token.quoted {
            return Err(malformed(self.rtype, "expected a domain name, got a quoted string"));
        }
        DomainName::parse(&token.raw)
    }

    /// A character-string, quoted or bare
    fn next_string(&mut self) -> Result<Vec<u8>, String> {
        let bytes = self.next()?.bytes;
        if bytes.len() > 255 {
            return Err(malformed(self.rtype, "string too long"));
        }
        Ok(bytes)
    }

    fn remaining(&mut self) -> Vec<Token> {
        self.tokens.by_ref().collect()
    }

    /// Remaining tokens concatenated without separators
    fn concatenate_remaining(&mut self) -> Result<String, String> {
        let joined: String = self.tokens.by_ref().map(|t| t.text()).collect();
        if joined.is_empty() {
            return Err(malformed(self.rtype, "unexpected end of input"));
        }
        Ok(joined)
    }

    fn remaining_hex(&mut self) -> Result<Vec<u8>, String> {
        let text = self.concatenate_remaining()?;
        hex::decode(text).map_err(|_| binary_error())
    }

    fn remaining_base64(&mut self) -> Result<Vec<u8>, String> {
        let text = self.concatenate_remaining()?;
        BASE64.decode(text).map_err(|_| binary_error())
    }

    fn finish(mut self) -> Result<(), String> {
        match self.tokens.next() {
            None => Ok(()),
            Some(extra) => Err(malformed(
                self.rtype,
                &format!("expected end of input, got '{}'", extra.text()),
            )),
        }
    }
}

/// Typed record data for every manageable type
#[derive(Debug, Clone, PartialEq, Eq)]
enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    /// CNAME, DNAME, MR, NS, PTR
    Name(DomainName),
    /// MX, AFSDB, KX, LP
    Preference {
        preference: u16,
        name: DomainName,
    },
    /// RP, MINFO
    NamePair(DomainName, DomainName),
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: DomainName,
    },
    /// TXT, SPF
    Txt(Vec<Vec<u8>>),
    Caa {
        flags: u8,
        tag: Vec<u8>,
        value: Vec<u8>,
    },
    /// DS, CDS, DLV
    Ds {
        key_tag: u16,
        algorithm: u8,
        digest_type: u8,
        digest: Vec<u8>,
    },
    /// DNSKEY, CDNSKEY, RKEY
    Dnskey {
        flags: u16,
        protocol: u8,
        algorithm: u8,
        key: Vec<u8>,
    },
    /// TLSA, SMIMEA
    Tlsa {
        usage: u8,
        selector: u8,
        matching_type: u8,
        data: Vec<u8>,
    },
    Sshfp {
        algorithm: u8,
        fp_type: u8,
        fingerprint: Vec<u8>,
    },
    Hinfo {
        cpu: Vec<u8>,
        os: Vec<u8>,
    },
    Uri {
        priority: u16,
        weight: u16,
        target: Vec<u8>,
    },
    /// OPENPGPKEY, DHCID
    Base64(Vec<u8>),
    Cert {
        cert_type: u16,
        key_tag: u16,
        algorithm: u8,
        certificate: Vec<u8>,
    },
    Csync {
        serial: u32,
        flags: u16,
        types: BTreeSet<u16>,
    },
    Apl(Vec<AplItem>),
    /// EUI48, EUI64
    Eui(Vec<u8>),
    L32 {
        preference: u16,
        locator: Ipv4Addr,
    },
    /// L64, NID
    Locator64 {
        preference: u16,
        locator: [u8; 8],
    },
    Loc(Location),
    Naptr {
        order: u16,
        preference: u16,
        flags: Vec<u8>,
        services: Vec<u8>,
        regexp: Vec<u8>,
        replacement: DomainName,
    },
    /// SVCB, HTTPS
    Svcb {
        priority: u16,
        target: DomainName,
        params: SvcParams,
    },
}

/// One address prefix of an APL record
#[derive(Debug, Clone, PartialEq, Eq)]
struct AplItem {
    negated: bool,
    network: IpNetwork,
}

impl RecordData {
    fn parse(rtype: &str, cursor: &mut Cursor<'_>) -> Result<Self, String> {
        let data = match rtype {
            "A" => {
                let token = cursor.next()?;
                let text = token.text();
                RecordData::A(
                    parse_ipv4(&text)
                        .ok_or_else(|| malformed(rtype, &format!("'{}' is not a valid IPv4 address", text)))?,
                )
            }
            "AAAA" => {
                let token = cursor.next()?;
                let text = token.text();
                RecordData::Aaaa(
                    text.parse()
                        .map_err(|_| malformed(rtype, &format!("'{}' is not a valid IPv6 address", text)))?,
                )
            }
            "CNAME" | "DNAME" | "MR" | "PTR" => RecordData::Name(cursor.next_name()?.canonicalize()),
            "NS" => {
                let target = cursor.next_name()?.canonicalize();
                require_hostname("target", &target, false)?;
                RecordData::Name(target)
            }
            "MX" => {
                let preference = cursor.next_u16()?;
                let exchange = cursor.next_name()?.canonicalize();
                require_hostname("exchange", &exchange, true)?;
                RecordData::Preference {
                    preference,
                    name: exchange,
                }
            }
            "AFSDB" | "KX" => RecordData::Preference {
                preference: cursor.next_u16()?,
                name: cursor.next_name()?.canonicalize(),
            },
            // LP names are not lowercased in canonical form (RFC 6742)
            "LP" => RecordData::Preference {
                preference: cursor.next_u16()?,
                name: cursor.next_name()?,
            },
            "RP" | "MINFO" => {
                let first = cursor.next_name()?.canonicalize();
                let second = cursor.next_name()?.canonicalize();
                RecordData::NamePair(first, second)
            }
            "SRV" => {
                let priority = cursor.next_u16()?;
                let weight = cursor.next_u16()?;
                let port = cursor.next_u16()?;
                let target = cursor.next_name()?.canonicalize();
                require_hostname("target", &target, true)?;
                RecordData::Srv {
                    priority,
                    weight,
                    port,
                    target,
                }
            }
            "TXT" | "SPF" => {
                let mut strings = Vec::new();
                while let Ok(token) = cursor.next() {
                    if !token.quoted {
                        return Err(format!(
                            "Data for {} records must be given using quotation marks.",
                            rtype
                        ));
                    }
                    strings.push(token.bytes);
                }
                if strings.is_empty() {
                    return Err(malformed(rtype, "unexpected end of input"));
                }
                RecordData::Txt(strings)
            }
            "CAA" => {
                let flags = cursor.next_u8()?;
                let tag = cursor.next()?.bytes;
                if tag.is_empty() || tag.len() > 255 || !tag.iter().all(u8::is_ascii_alphanumeric) {
                    return Err(unparsable("tag is not alphanumeric"));
                }
                let value = cursor.next()?.bytes;
                RecordData::Caa { flags, tag, value }
            }
            "DS" | "CDS" | "DLV" => {
                let key_tag = cursor.next_u16()?;
                let algorithm = cursor.next_u8()?;
                let digest_type = cursor.next_u8()?;
                let digest = cursor.remaining_hex()?;
                check_digest_length(digest_type, digest.len())?;
                RecordData::Ds {
                    key_tag,
                    algorithm,
                    digest_type,
                    digest,
                }
            }
            "DNSKEY" | "CDNSKEY" | "RKEY" => RecordData::Dnskey {
                flags: cursor.next_u16()?,
                protocol: cursor.next_u8()?,
                algorithm: cursor.next_u8()?,
                key: cursor.remaining_base64()?,
            },
            "TLSA" | "SMIMEA" => RecordData::Tlsa {
                usage: cursor.next_u8()?,
                selector: cursor.next_u8()?,
                matching_type: cursor.next_u8()?,
                data: cursor.remaining_hex()?,
            },
            "SSHFP" => RecordData::Sshfp {
                algorithm: cursor.next_u8()?,
                fp_type: cursor.next_u8()?,
                fingerprint: cursor.remaining_hex()?,
            },
            "HINFO" => {
                let cpu = cursor.next()?.bytes;
                let os = cursor.next()?.bytes;
                if cpu.len() > 255 || os.len() > 255 {
                    return Err(malformed(rtype, "string too long"));
                }
                RecordData::Hinfo { cpu, os }
            }
            "URI" => {
                let priority = cursor.next_u16()?;
                let weight = cursor.next_u16()?;
                let target = cursor.next()?;
                if !target.quoted {
                    return Err(malformed(rtype, "URI target must be a string"));
                }
                if target.bytes.is_empty() {
                    return Err(unparsable("URI target cannot be empty"));
                }
                RecordData::Uri {
                    priority,
                    weight,
                    target: target.bytes,
                }
            }
            "OPENPGPKEY" | "DHCID" => RecordData::Base64(cursor.remaining_base64()?),
            "CERT" => {
                let token = cursor.next()?;
                let text = token.text();
                let cert_type = match CERT_TYPES.iter().find(|(name, _)| text.eq_ignore_ascii_case(name)) {
                    Some(&(_, code)) => code,
                    None => text
                        .parse()
                        .ok()
                        .filter(|_| text.bytes().all(|b| b.is_ascii_digit()))
                        .ok_or_else(|| unparsable(format!("unknown certificate type '{}'", text)))?,
                };
                RecordData::Cert {
                    cert_type,
                    key_tag: cursor.next_u16()?,
                    algorithm: cursor.next_u8()?,
                    certificate: cursor.remaining_base64()?,
                }
            }
            "CSYNC" => {
                let serial = cursor.next_uint(32)? as u32;
                let flags = cursor.next_u16()?;
                let mut types = BTreeSet::new();
                for token in cursor.remaining() {
                    let text = token.text();
                    let code = rrtypes::code(&text).ok_or_else(|| unparsable(format!("unknown type '{}'", text)))?;
                    types.insert(code);
                }
                RecordData::Csync { serial, flags, types }
            }
            "APL" => {
                let items = cursor
                    .remaining()
                    .iter()
                    .map(|token| parse_apl_item(&token.text()))
                    .collect::<Result<Vec<_>, _>>()?;
                if items.is_empty() {
                    return Err(malformed(rtype, "unexpected end of input"));
                }
                RecordData::Apl(items)
            }
            "EUI48" => RecordData::Eui(parse_eui(&cursor.next()?.text(), 6)?),
            "EUI64" => RecordData::Eui(parse_eui(&cursor.next()?.text(), 8)?),
            "L32" => {
                let preference = cursor.next_u16()?;
                let text = cursor.next()?.text();
                let locator = text
                    .parse()
                    .map_err(|_| malformed(rtype, &format!("'{}' is not a valid IPv4 address", text)))?;
                RecordData::L32 { preference, locator }
            }
            "L64" | "NID" => RecordData::Locator64 {
                preference: cursor.next_u16()?,
                locator: parse_locator64(&cursor.next()?.text())?,
            },
            "LOC" => {
                let words: Vec<String> = cursor.remaining().iter().map(Token::text).collect();
                RecordData::Loc(Location::parse(&words).map_err(|e| malformed(rtype, &e))?)
            }
            "NAPTR" => RecordData::Naptr {
                order: cursor.next_u16()?,
                preference: cursor.next_u16()?,
                flags: cursor.next_string()?,
                services: cursor.next_string()?,
                regexp: cursor.next_string()?,
                replacement: cursor.next_name()?.canonicalize(),
            },
            // target names keep their case (RFC 9460 section 2.2)
            "SVCB" | "HTTPS" => {
                let priority = cursor.next_u16()?;
                let target = cursor.next_name()?;
                let params = SvcParams::parse(cursor.remaining()).map_err(unparsable)?;
                if priority == 0 && !params.is_empty() {
                    return Err(unparsable("AliasMode records cannot have parameters"));
                }
                RecordData::Svcb {
                    priority,
                    target,
                    params,
                }
            }
            other => return Err(format!("The {} RR set type is currently unsupported.", other)),
        };
        Ok(data)
    }

    fn write_wire(&self, out: &mut Vec<u8>) {
        match self {
            RecordData::A(addr) => out.extend_from_slice(&addr.octets()),
            RecordData::Aaaa(addr) => out.extend_from_slice(&addr.octets()),
            RecordData::Name(name) => name.write_wire(out),
            RecordData::Preference { preference, name } => {
                out.extend_from_slice(&preference.to_be_bytes());
                name.write_wire(out);
            }
            RecordData::NamePair(first, second) => {
                first.write_wire(out);
                second.write_wire(out);
            }
            RecordData::Srv {
                priority,
                weight,
                port,
                target,
            } => {
                out.extend_from_slice(&priority.to_be_bytes());
                out.extend_from_slice(&weight.to_be_bytes());
                out.extend_from_slice(&port.to_be_bytes());
                target.write_wire(out);
            }
            RecordData::Txt(strings) => {
                // long strings are split into 255-octet character-strings
                for string in strings {
                    if string.is_empty() {
                        out.push(0);
                    }
                    for chunk in string.chunks(255) {
                        out.push(chunk.len() as u8);
                        out.extend_from_slice(chunk);
                    }
                }
            }
            RecordData::Caa { flags, tag, value } => {
                out.push(*flags);
                out.push(tag.len() as u8);
                out.extend_from_slice(tag);
                out.extend_from_slice(value);
            }
            RecordData::Ds {
                key_tag,
                algorithm,
                digest_type,
                digest,
            } => {
                out.extend_from_slice(&key_tag.to_be_bytes());
                out.push(*algorithm);
                out.push(*digest_type);
                out.extend_from_slice(digest);
            }
            RecordData::Dnskey {
                flags,
                protocol,
                algorithm,
                key,
            } => {
                out.extend_from_slice(&flags.to_be_bytes());
                out.push(*protocol);
                out.push(*algorithm);
                out.extend_from_slice(key);
            }
            RecordData::Tlsa {
                usage,
                selector,
                matching_type,
                data,
            } => {
                out.extend_from_slice(&[*usage, *selector, *matching_type]);
                out.extend_from_slice(data);
            }
            RecordData::Sshfp {
                algorithm,
                fp_type,
                fingerprint,
            } => {
                out.extend_from_slice(&[*algorithm, *fp_type]);
                out.extend_from_slice(fingerprint);
            }
            RecordData::Hinfo { cpu, os } => {
                out.push(cpu.len() as u8);
                out.extend_from_slice(cpu);
                out.push(os.len() as u8);
                out.extend_from_slice(os);
            }
            RecordData::Uri {
                priority,
                weight,
                target,
            } => {
                out.extend_from_slice(&priority.to_be_bytes());
                out.extend_from_slice(&weight.to_be_bytes());
                out.extend_from_slice(target);
            }
            RecordData::Base64(data) => out.extend_from_slice(data),
            RecordData::Cert {
                cert_type,
                key_tag,
                algorithm,
                certificate,
            } => {
                out.extend_from_slice(&cert_type.to_be_bytes());
                out.extend_from_slice(&key_tag.to_be_bytes());
                out.push(*algorithm);
                out.extend_from_slice(certificate);
            }
            RecordData::Csync { serial, flags, types } => {
                out.extend_from_slice(&serial.to_be_bytes());
                out.extend_from_slice(&flags.to_be_bytes());
                rrtypes::write_bitmap(types, out);
            }
            RecordData::Apl(items) => {
                for item in items {
                    let (family, mut address) = match item.network.ip() {
                        IpAddr::V4(addr) => (1u16, addr.octets().to_vec()),
                        IpAddr::V6(addr) => (2u16, addr.octets().to_vec()),
                    };
                    while address.last() == Some(&0) {
                        address.pop();
                    }
                    out.extend_from_slice(&family.to_be_bytes());
                    out.push(item.network.prefix());
                    // at most 16 octets
                    out.push(u8::from(item.negated) << 7 | address.len() as u8);
                    out.extend_from_slice(&address);
                }
            }
            RecordData::Eui(bytes) => out.extend_from_slice(bytes),
            RecordData::L32 { preference, locator } => {
                out.extend_from_slice(&preference.to_be_bytes());
                out.extend_from_slice(&locator.octets());
            }
            RecordData::Locator64 { preference, locator } => {
                out.extend_from_slice(&preference.to_be_bytes());
                out.extend_from_slice(locator);
            }
            RecordData::Loc(location) => location.write_wire(out),
            RecordData::Naptr {
                order,
                preference,
                flags,
                services,
                regexp,
                replacement,
            } => {
                out.extend_from_slice(&order.to_be_bytes());
                out.extend_from_slice(&preference.to_be_bytes());
                for string in [flags, services, regexp] {
                    out.push(string.len() as u8);
                    out.extend_from_slice(string);
                }
                replacement.write_wire(out);
            }
            RecordData::Svcb {
                priority,
                target,
                params,
            } => {
                out.extend_from_slice(&priority.to_be_bytes());
                target.write_wire(out);
                params.write_wire(out);
            }
        }
    }

    fn to_presentation(&self) -> String {
        match self {
            RecordData::A(addr) => addr.to_string(),
            RecordData::Aaaa(addr) => addr.to_string(),
            RecordData::Name(name) => name.to_presentation(),
            RecordData::Preference { preference, name } => format!("{} {}", preference, name.to_presentation()),
            RecordData::NamePair(first, second) => {
                format!("{} {}", first.to_presentation(), second.to_presentation())
            }
            RecordData::Srv {
                priority,
                weight,
                port,
                target,
            } => format!("{} {} {} {}", priority, weight, port, target.to_presentation()),
            RecordData::Txt(strings) => strings
                .iter()
                .map(|s| quote(s))
                .collect::<Vec<_>>()
                .join(" "),
            RecordData::Caa { flags, tag, value } => format!(
                "{} {} {}",
                flags,
                String::from_utf8_lossy(tag),
                quote(value)
            ),
            RecordData::Ds {
                key_tag,
                algorithm,
                digest_type,
                digest,
            } => format!(
                "{} {} {} {}",
                key_tag,
                algorithm,
                digest_type,
                hex::encode(digest)
            ),
            RecordData::Dnskey {
                flags,
                protocol,
                algorithm,
                key,
            } => format!("{} {} {} {}", flags, protocol, algorithm, BASE64.encode(key)),
            RecordData::Tlsa {
                usage,
                selector,
                matching_type,
                data,
            } => format!(
                "{} {} {} {}",
                usage,
                selector,
                matching_type,
                hex::encode(data)
            ),
            RecordData::Sshfp {
                algorithm,
                fp_type,
                fingerprint,
            } => format!("{} {} {}", algorithm, fp_type, hex::encode(fingerprint)),
            RecordData::Hinfo { cpu, os } => format!("{} {}", quote(cpu), quote(os)),
            RecordData::Uri {
                priority,
                weight,
                target,
            } => format!("{} {} {}", priority, weight, quote(target)),
            RecordData::Base64(data) => BASE64.encode(data),
            RecordData::Cert {
                cert_type,
                key_tag,
                algorithm,
                certificate,
            } => format!(
                "{} {} {} {}",
                cert_type,
                key_tag,
                algorithm,
                BASE64.encode(certificate)
            ),
            RecordData::Csync { serial, flags, types } => std::iter::once(format!("{} {}", serial, flags))
                .chain(types.iter().map(|t| rrtypes::mnemonic(*t)))
                .collect::<Vec<_>>()
                .join(" "),
            RecordData::Apl(items) => items
                .iter()
                .map(|item| {
                    let family = if item.network.is_ipv4() { 1 } else { 2 };
                    let negation = if item.negated { "!" } else { "" };
                    format!(
                        "{}{}:{}/{}",
                        negation,
                        family,
                        item.network.ip(),
                        item.network.prefix()
                    )
                })
                .collect::<Vec<_>>()
                .join(" "),
            RecordData::Eui(bytes) => bytes.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join("-"),
            RecordData::L32 { preference, locator } => format!("{} {}", preference, locator),
            RecordData::Locator64 { preference, locator } => format!(
                "{} {}",
                preference,
                locator
                    .chunks(2)
                    .map(hex::encode)
                    .collect::<Vec<_>>()
                    .join(":")
            ),
            RecordData::Loc(location) => location.to_presentation(),
            RecordData::Naptr {
                order,
                preference,
                flags,
                services,
                regexp,
                replacement,
            } => format!(
                "{} {} {} {} {} {}",
                order,
                preference,
                quote(flags),
                quote(services),
                quote(regexp),
                replacement.to_presentation()
            ),
            RecordData::Svcb {
                priority,
                target,
                params,
            } => {
                let head = format!("{} {}", priority, target.to_presentation());
                if params.is_empty() {
                    head
                } else {
                    format!("{} {}", head, params.to_presentation())
                }
            }
        }
    }
}

/// `[!]afi:address/prefix` with address family 1 (IPv4) or 2 (IPv6)
fn parse_apl_item(text: &str) -> Result<AplItem, String> {
    let invalid = || unparsable(format!("invalid APL item '{}'", text));
    let (negated, rest) = match text.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (family, rest) = rest.split_once(':').ok_or_else(invalid)?;
    let (address, prefix) = rest.rsplit_once('/').ok_or_else(invalid)?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;

    let network = match family {
        "1" => {
            let address: Ipv4Addr = address.parse().map_err(|_| invalid())?;
            IpNetwork::V4(Ipv4Network::new(address, prefix).map_err(|_| invalid())?)
        }
        "2" => {
            let address: Ipv6Addr = address.parse().map_err(|_| invalid())?;
            IpNetwork::V6(Ipv6Network::new(address, prefix).map_err(|_| invalid())?)
        }
        _ => return Err(invalid()),
    };
    Ok(AplItem { negated, network })
}

/// `n` hyphen-separated pairs of hex digits
fn parse_eui(text: &str, n: usize) -> Result<Vec<u8>, String> {
    let groups: Vec<&str> = text.split('-').collect();
    if groups.len() != n || groups.iter().any(|g| g.len() != 2) {
        return Err(unparsable(format!("invalid EUI '{}'", text)));
    }
    hex::decode(groups.concat()).map_err(|_| binary_error())
}

/// Four colon-separated groups of exactly four hex digits
fn parse_locator64(text: &str) -> Result<[u8; 8], String> {
    let invalid = || unparsable(format!("invalid locator '{}'", text));
    let groups: Vec<&str> = text.split(':').collect();
    if groups.len() != 4 || groups.iter().any(|g| g.len() != 4) {
        return Err(invalid());
    }
    let mut locator = [0u8; 8];
    hex::decode_to_slice(groups.concat(), &mut locator).map_err(|_| invalid())?;
    Ok(locator)
}

/// Dotted-quad IPv4 parser that tolerates leading zeros (`127.00.0.1`)
fn parse_ipv4(text: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = text.split('.');
    for octet in &mut octets {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}

fn require_hostname(field: &str, name: &DomainName, allow_root: bool) -> Result<(), String> {
    if (allow_root && name.is_root()) || name.is_hostname() {
        Ok(())
    } else {
        Err(unparsable(format!("invalid {}: {}", field, name.to_presentation())))
    }
}

/// Expected digest size in octets per DS digest type
fn expected_digest_length(digest_type: u8) -> Option<usize> {
    match digest_type {
        0 => Some(1),
        1 => Some(20),
        2 | 3 => Some(32),
        4 => Some(48),
        _ => None,
    }
}

fn check_digest_length(digest_type: u8, actual: usize) -> Result<(), String> {
    let expected = expected_digest_length(digest_type).ok_or_else(|| unparsable("unknown digest type"))?;
    if actual != expected {
        return Err(unparsable(format!(
            "invalid digest length {} (expected for this digest type: {})",
            actual * 2,
            expected * 2
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(rtype: &str, content: &str) -> String {
        canonicalize(rtype, content).unwrap().into_presentation()
    }

    #[test]
    fn ipv6_is_compressed() {
        assert_eq!(canonical("AAAA", "::0001"), "::1");
        assert_eq!(canonical("AAAA", "2001:0db8:0000:0000:0000:0000:0000:0001"), "2001:db8::1");
        assert_eq!(
            canonicalize("AAAA", "::1").unwrap(),
            canonicalize("AAAA", "0:0:0:0:0:0:0:1").unwrap()
        );
    }

    #[test]
    fn ipv4_leading_zeros_are_dropped() {
        assert_eq!(canonical("A", "127.00.0.1"), "127.0.0.1");
        assert!(canonicalize("A", "127.0.0.999").unwrap_err().starts_with("Record content for type A malformed"));
        assert!(canonicalize("A", "::1").is_err());
    }

    #[test]
    fn txt_must_be_quoted() {
        assert_eq!(
            canonicalize("TXT", "bar").unwrap_err(),
            "Data for TXT records must be given using quotation marks."
        );
        assert_eq!(canonical("TXT", r#""foo"   "bar""#), r#""foo" "bar""#);
        assert_eq!(canonical("SPF", r#""v=spf1 -all""#), r#""v=spf1 -all""#);
    }

    #[test]
    fn long_txt_strings_are_chunked_in_wire_form() {
        let long = "x".repeat(300);
        let record = canonicalize("TXT", &format!("\"{}\"", long)).unwrap();
        assert_eq!(record.presentation(), format!("\"{}\"", long));
        assert_eq!(record.wire().len(), 302);
        assert_eq!(record.wire()[0], 255);
    }

    #[test]
    fn names_are_lowercased_and_must_be_absolute() {
        assert_eq!(canonical("CNAME", "Target.Example.COM."), "target.example.com.");
        assert_eq!(canonical("MX", "10 Mail.Example.com."), "10 mail.example.com.");
        assert_eq!(canonical("MX", "0 ."), "0 .");
        assert_eq!(
            canonicalize("CNAME", "example.com").unwrap_err(),
            "Hostname must be fully qualified (i.e., end in a dot: \"example.com.\")"
        );
        assert!(canonicalize("NS", ".").is_err());
        assert!(
            canonicalize("MX", "10 mail_server.example.com.")
                .unwrap_err()
                .contains("invalid exchange")
        );
    }

    #[test]
    fn srv_and_uri() {
        assert_eq!(canonical("SRV", "10 60 5060 SIP.example.com."), "10 60 5060 sip.example.com.");
        assert_eq!(
            canonical("URI", r#"10 1 "https://example.com/""#),
            r#"10 1 "https://example.com/""#
        );
        assert!(canonicalize("URI", "10 1 https://example.com/").is_err());
        assert!(canonicalize("SRV", "10 60 70000 sip.example.com.").is_err());
    }

    #[test]
    fn caa_value_is_quoted() {
        assert_eq!(canonical("CAA", "0 issue letsencrypt.org"), r#"0 issue "letsencrypt.org""#);
        assert!(canonicalize("CAA", r#"0 is-sue "x""#).is_err());
    }

    #[test]
    fn ds_digest_length_is_checked() {
        let sha256 = "a".repeat(64);
        assert_eq!(
            canonical("DS", &format!("6454 8 2 {} ", sha256.to_uppercase())),
            format!("6454 8 2 {}", sha256)
        );
        assert!(
            canonicalize("DS", "6454 8 2 abcd")
                .unwrap_err()
                .contains("invalid digest length 4 (expected for this digest type: 64)")
        );
        assert_eq!(
            canonicalize("DS", "6454 8 2 xyz").unwrap_err(),
            "Cannot parse hexadecimal or base64 record contents"
        );
        assert_eq!(canonical("CDS", "0 0 0 00"), "0 0 0 00");
    }

    #[test]
    fn dnskey_base64_is_joined() {
        assert_eq!(canonical("DNSKEY", "257 3 13 aGVs bG8="), "257 3 13 aGVsbG8=");
        assert!(canonicalize("DNSKEY", "257 3 13 !!!").is_err());
        assert!(canonicalize("DNSKEY", "257 3 13").is_err());
    }

    #[test]
    fn hinfo_and_sshfp_and_tlsa() {
        assert_eq!(canonical("HINFO", "x86 Linux"), r#""x86" "Linux""#);
        assert_eq!(canonical("SSHFP", "4 2 AB CD"), "4 2 abcd");
        assert_eq!(canonical("TLSA", "3 1 1 00FF"), "3 1 1 00ff");
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        assert!(
            canonicalize("A", "1.2.3.4 5.6.7.8")
                .unwrap_err()
                .contains("expected end of input")
        );
        assert!(canonicalize("A", "").unwrap_err().contains("unexpected end of input"));
    }

    #[test]
    fn escaped_dots_in_names_survive() {
        assert_eq!(canonical("CNAME", r"a\.b.Example.NET."), r"a\.b.example.net.");
        assert_eq!(canonical("PTR", r"a\046b.example.net."), r"a\.b.example.net.");
        assert_ne!(
            canonicalize("CNAME", r"a\.b.example.net.").unwrap(),
            canonicalize("CNAME", "a.b.example.net.").unwrap()
        );
        assert!(canonicalize("PTR", r#""example.com.""#).is_err());
    }

    #[test]
    fn preference_and_name_pair_types() {
        assert_eq!(canonical("AFSDB", "02 turquoise.FEMTO.edu."), "2 turquoise.femto.edu.");
        assert_eq!(canonical("KX", "010 example.com."), "10 example.com.");
        assert_eq!(canonical("LP", "010   l64-subnet1.Example.com."), "10 l64-subnet1.Example.com.");
        assert_eq!(canonical("LP", "65535 ."), "65535 .");
        assert_eq!(canonical("RP", "hostmaster.EXAMPLE.com. ."), "hostmaster.example.com. .");
        assert_eq!(canonical("MINFO", "Admin.example. errors.example."), "admin.example. errors.example.");
        assert_eq!(canonical("MR", "Mail.example."), "mail.example.");
        for (rtype, content) in [
            ("AFSDB", "example.com."),
            ("AFSDB", "1 de"),
            ("KX", "-1 example.com"),
            ("KX", "10 example.com"),
            ("LP", "65536 l64-subnet1.example.com."),
            ("RP", "hostmaster.example.com."),
            ("RP", "10 foo."),
        ] {
            assert!(canonicalize(rtype, content).is_err(), "{rtype} {content}");
        }
    }

    #[test]
    fn key_and_digest_variants() {
        assert_eq!(canonical("SMIMEA", "3 01 0 aaBBccddeeff"), "3 1 0 aabbccddeeff");
        assert!(canonicalize("SMIMEA", "3 1 0 aGVsbG8gd29ybGQh").is_err());
        let sha256 = "5CBA665A006F6487625C6218522F09BD3673C25FA10F25CB18459AA10DF1F520";
        assert_eq!(
            canonical("DLV", &format!("6454 8 2 {} {}", &sha256[..56], &sha256[56..])),
            format!("6454 8 2 {}", sha256.to_lowercase())
        );
        assert!(canonicalize("DLV", "6454 8 1 aabbccddeeff").is_err());
        assert_eq!(canonical("RKEY", "0256 03 08 aGVs bG8="), "256 3 8 aGVsbG8=");
        assert_eq!(canonical("DHCID", "aa aaa  aaaa a a a"), "aaaaaaaaaaaa");
        assert_eq!(canonical("DHCID", "xxxx"), "xxxx");
        for content in ["x", "xx", "xxx"] {
            assert!(canonicalize("DHCID", content).is_err(), "{content}");
        }
    }

    #[test]
    fn cert_accepts_type_mnemonics() {
        assert_eq!(canonical("CERT", "06 00 00 sadfdd=="), "6 0 0 sadfdQ==");
        assert_eq!(canonical("CERT", "IPGP 0 0 sadfdd=="), "6 0 0 sadfdQ==");
        assert!(canonicalize("CERT", "6 0 sadfdd==").is_err());
        assert!(canonicalize("CERT", "BOGUS 0 0 sadfdd==").is_err());
    }

    #[test]
    fn csync_types_are_sorted_by_number() {
        assert_eq!(canonical("CSYNC", "066 03  NS  AAAA A"), "66 3 A NS AAAA");
        assert_eq!(canonical("CSYNC", "0 0"), "0 0");
        assert_eq!(canonical("CSYNC", "66 15 NSEC"), "66 15 NSEC");
        let record = canonicalize("CSYNC", "1 0 A NS").unwrap();
        assert_eq!(record.wire(), &[0, 0, 0, 1, 0, 0, 0, 1, 0x60]);
        for content in ["0 -1 A", "444 65536 A", "0 3 AAA"] {
            assert!(canonicalize("CSYNC", content).is_err(), "{content}");
        }
    }

    #[test]
    fn apl_prefixes() {
        assert_eq!(
            canonical("APL", "2:FF00:0:0:0:0::/8  !1:192.168.38.0/28"),
            "2:ff00::/8 !1:192.168.38.0/28"
        );
        let record = canonicalize("APL", "1:192.168.32.0/21").unwrap();
        assert_eq!(record.wire(), &[0, 1, 21, 3, 192, 168, 32]);
        for content in [
            "0:192.168.32.0/21 !1:192.168.38.0/28",
            "1:192.168.32.0/21 !!1:192.168.38.0/28",
            "1:192.168.32.0/33",
            "18:12345/2",
            "1:127.0.0.1",
            "2:::/129",
        ] {
            assert!(canonicalize("APL", content).is_err(), "{content}");
        }
    }

    #[test]
    fn hardware_and_locator_types() {
        assert_eq!(canonical("EUI48", "AA-BB-CC-DD-EE-FF"), "aa-bb-cc-dd-ee-ff");
        assert_eq!(canonical("EUI64", "AA-BB-CC-DD-EE-FF-aa-aa"), "aa-bb-cc-dd-ee-ff-aa-aa");
        assert!(canonicalize("EUI48", "aa-bb-ccdd-ee-ff").is_err());
        assert!(canonicalize("EUI64", "aa-bb-cc-dd-ee-ff-gg-11").is_err());
        assert_eq!(canonical("L32", "010  10.1.2.0"), "10 10.1.2.0");
        assert!(canonicalize("L32", "10 10.1.02.0").is_err());
        assert!(canonicalize("L32", "65536 10.1.2.0").is_err());
        assert_eq!(canonical("L64", "010   2001:0Db8:2140:2000"), "10 2001:0db8:2140:2000");
        assert_eq!(canonical("NID", "010 0014:4fff:ff20:Ee64"), "10 0014:4fff:ff20:ee64");
        assert!(canonicalize("NID", "010 14:4fff:ff20:Ee64").is_err());
        assert!(canonicalize("NID", "20 ::14::ee64").is_err());
    }

    #[test]
    fn loc_is_spelled_out() {
        assert_eq!(
            canonical("LOC", "023 012 59 N 042 022 48.500 W 65.00m 20.00m 10.00m 10.00m"),
            "23 12 59.000 N 42 22 48.500 W 65.00m 20.00m 10.00m 10.00m"
        );
        assert!(canonicalize("LOC", "23 12 61.000 N 42 22 48.500 W 65.00m 20.00m 10.00m 10.00m").is_err());
        assert!(canonicalize("LOC", "foo").is_err());
    }

    #[test]
    fn naptr_strings_are_quoted() {
        assert_eq!(
            canonical("NAPTR", r#"100  50  "s"  "z3950+I2L+I2C"     ""  _z3950._tcp.gatech.edu."#),
            r#"100 50 "s" "z3950+I2L+I2C" "" _z3950._tcp.gatech.edu."#
        );
        for content in [
            r#"100  50  "s"  "z3950+I2L+I2C"     ""  _z3950._tcp.gatech.edu"#,
            r#"100  50  "s"     ""  _z3950._tcp.gatech.edu."#,
            r#"100  50  3 2  "z3950+I2L+I2C"     ""  _z3950._tcp.gatech.edu."#,
        ] {
            assert!(canonicalize("NAPTR", content).is_err(), "{content}");
        }
    }

    #[test]
    fn service_binding_records() {
        assert_eq!(
            canonical("HTTPS", "01 h3POOL.exaMPLe. aLPn=h2,h3"),
            "1 h3POOL.exaMPLe. alpn=h2,h3"
        );
        assert_eq!(
            canonical("HTTPS", "01 h3POOL.exaMPLe. aLPn=h2,h3 ECH=MTIzLi4uCg=="),
            r#"1 h3POOL.exaMPLe. alpn=h2,h3 ech="MTIzLi4uCg==""#
        );
        assert_eq!(
            canonical("SVCB", r#"2 sVc2.example.NET. ECH="MjIyLi4uCg==" IPV6hint=2001:db8:00:0::2 port=01234"#),
            r#"2 sVc2.example.NET. port=1234 ech="MjIyLi4uCg==" ipv6hint=2001:db8::2"#
        );
        assert_eq!(canonical("SVCB", "0 svc4-baz.example.net."), "0 svc4-baz.example.net.");
        for (rtype, content) in [
            ("HTTPS", r#"1 h3pool alpn=h2,h3 ech="MTIzLi4uCg==""#),
            ("HTTPS", "0 pool.svc.example. no-default-alpn port=1234"),
            ("HTTPS", "1 pool.svc.example. ipv4hint=192.168.123.1 ipv4hint=192.168.123.2"),
            ("SVCB", "0 svc4-baz.example.net. keys=val"),
            ("SVCB", r#"2 duplicate.key. ech="MjIyLi4uCg==" ech="MjIyLi4uCg==""#),
        ] {
            assert!(canonicalize(rtype, content).is_err(), "{rtype} {content}");
        }
    }

    #[test]
    fn oversized_record_is_rejected() {
        let huge = format!("\"{}\"", "x".repeat(MAX_RECORD_WIRE_LENGTH));
        assert!(canonicalize("TXT", &huge).unwrap_err().contains("64000 byte"));
    }
}
