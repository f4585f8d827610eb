//! Owner names and domain names inside record data

use super::tokens::unescape;

/// Longest subname accepted
pub const MAX_SUBNAME_LENGTH: usize = 178;

const MAX_NAME_WIRE_LENGTH: usize = 255;
const MAX_LABEL_LENGTH: usize = 63;

/// Validate a subname relative to its domain
///
/// The apex is the empty subname.
pub fn validate_subname(subname: &str, domain: &str) -> Result<(), String> {
    if !subname.is_ascii() {
        return Err(
            "Subname must consist of ASCII characters only. Convert internationalized names to punycode first."
                .to_string(),
        );
    }
    if subname.len() > MAX_SUBNAME_LENGTH {
        return Err(format!(
            "Ensure this field has no more than {} characters.",
            MAX_SUBNAME_LENGTH
        ));
    }
    if subname != subname.to_ascii_lowercase() {
        return Err(format!("Invalid value (not lowercase): {}", subname));
    }
    if !subname.is_empty() && !is_valid_subname_syntax(subname) {
        return Err("Subname can only use (lowercase) a-z, 0-9, ., -, and _, may start with a '*.', \
                    or just be '*'. Components may not exceed 63 characters."
            .to_string());
    }
    // label lengths + separators + root, as in wire form
    let wire_length = subname.len() + 1 + domain.len() + 2;
    if !subname.is_empty() && wire_length > MAX_NAME_WIRE_LENGTH {
        return Err("This field combined with the domain name must not exceed 255 characters.".to_string());
    }
    Ok(())
}

/// `*`, or an optional `*.` prefix followed by labels of `[a-z0-9_-]{1,63}`
fn is_valid_subname_syntax(subname: &str) -> bool {
    if subname == "*" {
        return true;
    }
    let rest = subname.strip_prefix("*.").unwrap_or(subname);
    !rest.is_empty()
        && rest.split('.').all(|label| {
            (1..=MAX_LABEL_LENGTH).contains(&label.len())
                && label
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
        })
}

/// An absolute domain name appearing in record data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainName {
    labels: Vec<Vec<u8>>,
}

impl DomainName {
    /// Parse an absolute name from presentation text
    ///
    /// Labels are split on unescaped dots only, so `a\.b.example.` has three
    /// labels, the first of which contains a dot.
    pub fn parse(text: &str) -> Result<Self, String> {
        if text == "." {
            return Ok(Self { labels: Vec::new() });
        }

        let bytes = text.as_bytes();
        let mut labels = Vec::new();
        let mut label = Vec::new();
        let mut absolute = false;
        let mut i = 0;
        while i < bytes.len() {
            absolute = false;
            match bytes[i] {
                b'\\' => {
                    let (value, consumed) =
                        unescape(&bytes[i + 1..]).map_err(|e| format!("Cannot parse record contents: {}", e))?;
                    label.push(value);
                    i += 1 + consumed;
                }
                b'.' => {
                    if label.is_empty() {
                        return Err("Cannot parse record contents: A DNS label is empty.".to_string());
                    }
                    if label.len() > MAX_LABEL_LENGTH {
                        return Err("Cannot parse record contents: A DNS label is > 63 octets long.".to_string());
                    }
                    labels.push(std::mem::take(&mut label));
                    absolute = true;
                    i += 1;
                }
                b => {
                    label.push(b);
                    i += 1;
                }
            }
        }

        if !absolute {
            return Err(
                "Hostname must be fully qualified (i.e., end in a dot: \"example.com.\")".to_string(),
            );
        }
        let name = Self { labels };
        if name.wire_length() > MAX_NAME_WIRE_LENGTH {
            return Err("Hostname must be no longer than 255 characters".to_string());
        }
        Ok(name)
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Lowercase all ASCII letters
    pub fn canonicalize(mut self) -> Self {
        for label in &mut self.labels {
            label.make_ascii_lowercase();
        }
        self
    }

    /// Whether every label is a hostname label (letters, digits, inner hyphens)
    pub fn is_hostname(&self) -> bool {
        !self.labels.is_empty()
            && self.labels.iter().all(|label| {
                label.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
                    && label.first().is_some_and(u8::is_ascii_alphanumeric)
                    && label.last().is_some_and(u8::is_ascii_alphanumeric)
            })
    }

    pub fn wire_length(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    pub fn write_wire(&self, out: &mut Vec<u8>) {
        for label in &self.labels {
            // labels are bounded to 63 octets on parse
            out.push(label.len() as u8);
            out.extend_from_slice(label);
        }
        out.push(0);
    }

    pub fn to_presentation(&self) -> String {
        if self.labels.is_empty() {
            return ".".to_string();
        }
        let mut out = String::new();
        for label in &self.labels {
            for &b in label {
                match b {
                    b'.' | b'\\' | b'"' | b'(' | b')' | b';' | b'@' | b'$' => {
                        out.push('\\');
                        out.push(b as char);
                    }
                    0x21..=0x7e => out.push(b as char),
                    _ => out.push_str(&format!("\\{:03}", b)),
                }
            }
            out.push('.');
        }
        out
    }
}
