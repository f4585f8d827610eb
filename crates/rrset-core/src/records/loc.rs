//! LOC record data (RFC 1876)
//!
//! Presentation form is
//! `d1 [m1 [s1]] N|S d2 [m2 [s2]] E|W alt[m] [size[m] [hp[m] [vp[m]]]]`.
//! The canonical form spells out every field.

use std::iter::Peekable;

/// Wire value of the equator and the prime meridian
const EQUATOR: u32 = 1 << 31;
/// Wire value of 0m altitude, in centimetres above the reference
const ALTITUDE_BASE: i64 = 10_000_000;
const MAX_ALTITUDE_CM: i64 = u32::MAX as i64 - ALTITUDE_BASE;
const MAX_PRECISION_CM: i64 = 9_000_000_000;

const MILLIS_PER_DEGREE: u32 = 3_600_000;

/// 1m, 10000m and 10m
const DEFAULT_SIZE: u8 = 0x12;
const DEFAULT_HORIZONTAL: u8 = 0x16;
const DEFAULT_VERTICAL: u8 = 0x13;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    size: u8,
    horizontal: u8,
    vertical: u8,
    latitude: u32,
    longitude: u32,
    altitude: u32,
}

impl Location {
    pub fn parse(words: &[String]) -> Result<Self, String> {
        let mut words = words.iter().map(String::as_str).peekable();

        let latitude = coordinate(&mut words, 90, ["N", "S"])?;
        let longitude = coordinate(&mut words, 180, ["E", "W"])?;

        let text = words.next().ok_or("missing altitude")?;
        let altitude = metres(text)
            .filter(|cm| (-ALTITUDE_BASE..=MAX_ALTITUDE_CM).contains(cm))
            .ok_or_else(|| format!("invalid altitude '{}'", text))?;

        let mut precision = |default: u8, field: &str| -> Result<u8, String> {
            match words.next() {
                None => Ok(default),
                Some(text) => metres(text)
                    .and_then(encode_precision)
                    .ok_or_else(|| format!("invalid {} '{}'", field, text)),
            }
        };
        let size = precision(DEFAULT_SIZE, "size")?;
        let horizontal = precision(DEFAULT_HORIZONTAL, "horizontal precision")?;
        let vertical = precision(DEFAULT_VERTICAL, "vertical precision")?;

        if let Some(extra) = words.next() {
            return Err(format!("expected end of input, got '{}'", extra));
        }

        Ok(Self {
            size,
            horizontal,
            vertical,
            latitude,
            longitude,
            // range checked above
            altitude: (altitude + ALTITUDE_BASE) as u32,
        })
    }

    pub fn write_wire(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[0, self.size, self.horizontal, self.vertical]);
        out.extend_from_slice(&self.latitude.to_be_bytes());
        out.extend_from_slice(&self.longitude.to_be_bytes());
        out.extend_from_slice(&self.altitude.to_be_bytes());
    }

    pub fn to_presentation(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            format_coordinate(self.latitude, ["N", "S"]),
            format_coordinate(self.longitude, ["E", "W"]),
            format_metres(i64::from(self.altitude) - ALTITUDE_BASE),
            format_metres(decode_precision(self.size)),
            format_metres(decode_precision(self.horizontal)),
            format_metres(decode_precision(self.vertical)),
        )
    }
}

fn coordinate<'a, I>(words: &mut Peekable<I>, max_degrees: u32, hemispheres: [&str; 2]) -> Result<u32, String>
where
    I: Iterator<Item = &'a str>,
{
    let is_hemisphere = |word: &str| hemispheres.iter().any(|h| word.eq_ignore_ascii_case(h));

    let text = words.next().ok_or("missing coordinate")?;
    let degrees = integer(text).ok_or_else(|| format!("invalid degrees '{}'", text))?;
    let mut minutes = 0;
    let mut millis = 0;
    if let Some(text) = words.next_if(|w| !is_hemisphere(*w)) {
        minutes = integer(text)
            .filter(|m| *m < 60)
            .ok_or_else(|| format!("invalid minutes '{}'", text))?;
        if let Some(text) = words.next_if(|w| !is_hemisphere(*w)) {
            millis = fixed(text, 3)
                .filter(|ms| (0..60_000).contains(ms))
                .ok_or_else(|| format!("invalid seconds '{}'", text))? as u32;
        }
    }

    let hemisphere = words.next().ok_or("missing hemisphere")?;
    let positive = if hemisphere.eq_ignore_ascii_case(hemispheres[0]) {
        true
    } else if hemisphere.eq_ignore_ascii_case(hemispheres[1]) {
        false
    } else {
        return Err(format!("invalid hemisphere '{}'", hemisphere));
    };

    let offset = u64::from(degrees) * u64::from(MILLIS_PER_DEGREE) + u64::from(minutes) * 60_000 + u64::from(millis);
    if offset > u64::from(max_degrees) * u64::from(MILLIS_PER_DEGREE) {
        return Err(format!("coordinate exceeds {} degrees", max_degrees));
    }
    // at most 180 degrees, well inside 31 bits
    let offset = offset as u32;
    Ok(if positive { EQUATOR + offset } else { EQUATOR - offset })
}

fn format_coordinate(value: u32, hemispheres: [&str; 2]) -> String {
    let (offset, hemisphere) = if value >= EQUATOR {
        (value - EQUATOR, hemispheres[0])
    } else {
        (EQUATOR - value, hemispheres[1])
    };
    let degrees = offset / MILLIS_PER_DEGREE;
    let minutes = offset / 60_000 % 60;
    let millis = offset % 60_000;
    format!(
        "{} {} {}.{:03} {}",
        degrees,
        minutes,
        millis / 1000,
        millis % 1000,
        hemisphere
    )
}

fn integer(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Decimal with at most `decimals` fractional digits, scaled to an integer
fn fixed(text: &str, decimals: u32) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty()
        || whole.len() > 12
        || fraction.len() > decimals as usize
        || !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let scale = 10i64.pow(decimals);
    let mut value = whole.parse::<i64>().ok()? * scale;
    let mut unit = scale;
    for digit in fraction.bytes() {
        unit /= 10;
        value += i64::from(digit - b'0') * unit;
    }
    Some(if negative { -value } else { value })
}

/// Centimetres from `12.34m`; the unit is optional
fn metres(text: &str) -> Option<i64> {
    let number = text
        .strip_suffix('m')
        .or_else(|| text.strip_suffix('M'))
        .unwrap_or(text);
    fixed(number, 2)
}

fn format_metres(cm: i64) -> String {
    let sign = if cm < 0 { "-" } else { "" };
    let cm = cm.unsigned_abs();
    format!("{}{}.{:02}m", sign, cm / 100, cm % 100)
}

/// Mantissa and power of ten in one octet, truncating excess digits
fn encode_precision(cm: i64) -> Option<u8> {
    if !(0..=MAX_PRECISION_CM).contains(&cm) {
        return None;
    }
    let mut mantissa = cm;
    let mut exponent = 0u8;
    while mantissa > 9 {
        mantissa /= 10;
        exponent += 1;
    }
    Some(((mantissa as u8) << 4) | exponent)
}

fn decode_precision(octet: u8) -> i64 {
    i64::from(octet >> 4) * 10i64.pow(u32::from(octet & 0x0f))
}
