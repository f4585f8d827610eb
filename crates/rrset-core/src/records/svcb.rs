//! Service parameters of SVCB and HTTPS records (RFC 9460)
//!
//! Parameters are kept sorted by key number, which is both the wire order and
//! the canonical presentation order. Keys are case-insensitive on input.

use base64::Engine as _;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::content::BASE64;
use super::tokens::{Token, quote};

const MANDATORY: u16 = 0;
const ALPN: u16 = 1;
const NO_DEFAULT_ALPN: u16 = 2;
const PORT: u16 = 3;
const IPV4HINT: u16 = 4;
const ECH: u16 = 5;
const IPV6HINT: u16 = 6;

const KEY_NAMES: &[(&str, u16)] = &[
    ("mandatory", MANDATORY),
    ("alpn", ALPN),
    ("no-default-alpn", NO_DEFAULT_ALPN),
    ("port", PORT),
    ("ipv4hint", IPV4HINT),
    ("ech", ECH),
    ("ipv6hint", IPV6HINT),
];

fn key_code(name: &str) -> Option<u16> {
    let lower = name.to_ascii_lowercase();
    if let Some(&(_, code)) = KEY_NAMES.iter().find(|(n, _)| *n == lower) {
        return Some(code);
    }
    lower
        .strip_prefix("key")
        .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|n| n.parse().ok())
}

fn key_name(code: u16) -> String {
    match KEY_NAMES.iter().find(|(_, c)| *c == code) {
        Some((name, _)) => (*name).to_string(),
        None => format!("key{}", code),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SvcValue {
    Mandatory(Vec<u16>),
    Alpn(Vec<Vec<u8>>),
    NoDefaultAlpn,
    Port(u16),
    Ipv4Hint(Vec<Ipv4Addr>),
    Ech(Vec<u8>),
    Ipv6Hint(Vec<Ipv6Addr>),
    Opaque(Vec<u8>),
}

/// The parameter list of one SVCB or HTTPS record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvcParams(BTreeMap<u16, SvcValue>);

impl SvcParams {
    /// Parse `key=value` tokens; a value may also follow as a quoted token
    pub fn parse(tokens: Vec<Token>) -> Result<Self, String> {
        let mut params = BTreeMap::new();
        let mut tokens = tokens.into_iter().peekable();

        while let Some(token) = tokens.next() {
            if token.quoted {
                return Err(format!("unexpected quoted value \"{}\"", token.text()));
            }
            let (name, mut value) = match token.bytes.iter().position(|b| *b == b'=') {
                Some(at) => (
                    String::from_utf8_lossy(&token.bytes[..at]).into_owned(),
                    Some(token.bytes[at + 1..].to_vec()),
                ),
                None => (token.text(), None),
            };
            if value.as_ref().is_some_and(Vec::is_empty)
                && let Some(next) = tokens.next_if(|t| t.quoted)
            {
                value = Some(next.bytes);
            }

            let key = key_code(&name).ok_or_else(|| format!("unknown SvcParamKey '{}'", name))?;
            let parsed = parse_value(key, value)?;
            if params.insert(key, parsed).is_some() {
                return Err(format!("duplicate SvcParamKey '{}'", key_name(key)));
            }
        }

        if let Some(SvcValue::Mandatory(keys)) = params.get(&MANDATORY)
            && let Some(missing) = keys.iter().find(|k| !params.contains_key(*k))
        {
            return Err(format!("mandatory SvcParamKey '{}' is missing", key_name(*missing)));
        }
        Ok(Self(params))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn write_wire(&self, out: &mut Vec<u8>) {
        for (key, value) in &self.0 {
            let mut data = Vec::new();
            match value {
                SvcValue::Mandatory(keys) => {
                    for k in keys {
                        data.extend_from_slice(&k.to_be_bytes());
                    }
                }
                SvcValue::Alpn(ids) => {
                    for id in ids {
                        // ids are bounded to 255 octets on parse
                        data.push(id.len() as u8);
                        data.extend_from_slice(id);
                    }
                }
                SvcValue::NoDefaultAlpn => {}
                SvcValue::Port(port) => data.extend_from_slice(&port.to_be_bytes()),
                SvcValue::Ipv4Hint(addrs) => {
                    for addr in addrs {
                        data.extend_from_slice(&addr.octets());
                    }
                }
                SvcValue::Ipv6Hint(addrs) => {
                    for addr in addrs {
                        data.extend_from_slice(&addr.octets());
                    }
                }
                SvcValue::Ech(bytes) | SvcValue::Opaque(bytes) => data.extend_from_slice(bytes),
            }
            out.extend_from_slice(&key.to_be_bytes());
            // the whole record is bounded to 64000 octets
            out.extend_from_slice(&(data.len() as u16).to_be_bytes());
            out.extend_from_slice(&data);
        }
    }

    pub fn to_presentation(&self) -> String {
        self.0
            .iter()
            .map(|(key, value)| {
                let name = key_name(*key);
                match value {
                    SvcValue::Mandatory(keys) => format!(
                        "{}={}",
                        name,
                        keys.iter().map(|k| key_name(*k)).collect::<Vec<_>>().join(",")
                    ),
                    SvcValue::Alpn(ids) => format!(
                        "{}={}",
                        name,
                        ids.iter()
                            .map(|id| String::from_utf8_lossy(id).into_owned())
                            .collect::<Vec<_>>()
                            .join(",")
                    ),
                    SvcValue::NoDefaultAlpn => name,
                    SvcValue::Port(port) => format!("{}={}", name, port),
                    SvcValue::Ipv4Hint(addrs) => format!("{}={}", name, join(addrs)),
                    SvcValue::Ipv6Hint(addrs) => format!("{}={}", name, join(addrs)),
                    SvcValue::Ech(bytes) => format!("{}=\"{}\"", name, BASE64.encode(bytes)),
                    SvcValue::Opaque(bytes) => format!("{}={}", name, quote(bytes)),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn join<T: ToString>(items: &[T]) -> String {
    items.iter().map(T::to_string).collect::<Vec<_>>().join(",")
}

fn parse_value(key: u16, value: Option<Vec<u8>>) -> Result<SvcValue, String> {
    let name = key_name(key);
    if key == NO_DEFAULT_ALPN {
        return match value {
            None => Ok(SvcValue::NoDefaultAlpn),
            Some(_) => Err(format!("{} takes no value", name)),
        };
    }
    if key > IPV6HINT {
        return Ok(SvcValue::Opaque(value.unwrap_or_default()));
    }

    let value = value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("{} requires a value", name))?;
    let text = String::from_utf8_lossy(&value).into_owned();
    let list = || text.split(',').map(str::to_string).collect::<Vec<_>>();

    match key {
        MANDATORY => {
            let mut keys = Vec::new();
            for item in list() {
                let k = key_code(&item).ok_or_else(|| format!("unknown SvcParamKey '{}'", item))?;
                if k == MANDATORY || keys.contains(&k) {
                    return Err(format!("invalid mandatory list '{}'", text));
                }
                keys.push(k);
            }
            keys.sort_unstable();
            Ok(SvcValue::Mandatory(keys))
        }
        ALPN => {
            let ids: Vec<Vec<u8>> = list().into_iter().map(String::into_bytes).collect();
            if ids.iter().any(|id| id.is_empty() || id.len() > 255) {
                return Err(format!("invalid alpn list '{}'", text));
            }
            Ok(SvcValue::Alpn(ids))
        }
        PORT => text
            .bytes()
            .all(|b| b.is_ascii_digit())
            .then(|| text.parse::<u16>().ok())
            .flatten()
            .map(SvcValue::Port)
            .ok_or_else(|| format!("invalid port '{}'", text)),
        IPV4HINT => list()
            .iter()
            .map(|a| a.parse::<Ipv4Addr>())
            .collect::<Result<Vec<_>, _>>()
            .map(SvcValue::Ipv4Hint)
            .map_err(|_| format!("invalid ipv4hint '{}'", text)),
        ECH => BASE64
            .decode(&value)
            .map(SvcValue::Ech)
            .map_err(|_| format!("invalid ech '{}'", text)),
        _ => list()
            .iter()
            .map(|a| a.parse::<Ipv6Addr>())
            .collect::<Result<Vec<_>, _>>()
            .map(SvcValue::Ipv6Hint)
            .map_err(|_| format!("invalid ipv6hint '{}'", text)),
    }
}
