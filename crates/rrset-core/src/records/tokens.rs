//! Tokenizer for record presentation format
//!
//! Splits record content into whitespace-separated tokens, honoring double
//! quotes and backslash escapes (`\X` and `\DDD`).

/// A token of record content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Unescaped bytes
    pub bytes: Vec<u8>,
    /// Source text between the quotes, escapes intact
    pub raw: String,
    /// Whether the token was enclosed in double quotes
    pub quoted: bool,
}

impl Token {
    /// Token bytes as text, lossy for non-UTF-8 content
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Tokenize record content
pub fn tokenize(content: &str) -> Result<Vec<Token>, String> {
    let bytes = content.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let quoted = bytes[i] == b'"';
        if quoted {
            i += 1;
        }

        let start = i;
        let mut end = bytes.len();
        let mut token = Vec::new();
        let mut closed = !quoted;
        while i < bytes.len() {
            let b = bytes[i];
            if quoted && b == b'"' {
                closed = true;
                end = i;
                i += 1;
                break;
            }
            if !quoted && (b.is_ascii_whitespace() || b == b'"') {
                end = i;
                break;
            }
            if b == b'\\' {
                let (value, consumed) = unescape(&bytes[i + 1..])?;
                token.push(value);
                i += 1 + consumed;
                continue;
            }
            token.push(b);
            i += 1;
        }

        if !closed {
            return Err("unbalanced quotes".to_string());
        }
        tokens.push(Token {
            bytes: token,
            raw: String::from_utf8_lossy(&bytes[start..end]).into_owned(),
            quoted,
        });
    }

    Ok(tokens)
}

/// Decode the escape following a backslash, returning the byte and the
/// number of input bytes consumed
pub(crate) fn unescape(rest: &[u8]) -> Result<(u8, usize), String> {
    match rest {
        [] => Err("unexpected end of input".to_string()),
        [a, b, c, ..] if a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_digit() => {
            let value = u16::from(a - b'0') * 100 + u16::from(b - b'0') * 10 + u16::from(c - b'0');
            u8::try_from(value)
                .map(|v| (v, 3))
                .map_err(|_| format!("invalid escape \\{}{}{}", *a as char, *b as char, *c as char))
        }
        [d, ..] if d.is_ascii_digit() => Err("bad escape sequence".to_string()),
        [x, ..] => Ok((*x, 1)),
    }
}

/// Render bytes as a quoted character-string
pub fn quote(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for &b in bytes {
        match b {
            b'"' | b'\\' => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:03}", b)),
        }
    }
    out.push('"');
    out
}
