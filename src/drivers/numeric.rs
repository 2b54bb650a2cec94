//! Binary wire format of PostgreSQL `numeric`.
//!
//! A value is a header of four 16-bit big-endian fields (digit count, weight,
//! sign, display scale) followed by base-10000 digits. The value is
//! `sum(digit[i] * 10000^(weight - i))`.

use bytes::{BufMut, BytesMut};

use crate::error::{PgFetchError, Result};

const POSITIVE: u16 = 0x0000;
const NEGATIVE: u16 = 0x4000;
const NAN: u16 = 0xC000;
const POSITIVE_INFINITY: u16 = 0xD000;
const NEGATIVE_INFINITY: u16 = 0xF000;

const HEADER_LEN: usize = 8;

/// Render a binary `numeric` as its canonical decimal text, keeping the
/// display scale (`1.50` stays `1.50`).
pub(crate) fn decode(raw: &[u8]) -> Result<String> {
    let malformed = || PgFetchError::QueryFailed("malformed numeric value".to_string());
    if raw.len() < HEADER_LEN {
        return Err(malformed());
    }
    let field = |at: usize| u16::from_be_bytes([raw[at], raw[at + 1]]);
    let ndigits = usize::from(field(0));
    let weight = i64::from(i16::from_be_bytes([raw[2], raw[3]]));
    let sign = field(4);
    let dscale = usize::from(field(6));

    match sign {
        NAN => return Ok("NaN".to_string()),
        POSITIVE_INFINITY => return Ok("Infinity".to_string()),
        NEGATIVE_INFINITY => return Ok("-Infinity".to_string()),
        POSITIVE | NEGATIVE => {}
        _ => return Err(malformed()),
    }
    if raw.len() != HEADER_LEN + ndigits * 2 {
        return Err(malformed());
    }
    let digits: Vec<u16> = raw[HEADER_LEN..]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    if digits.iter().any(|d| *d >= 10_000) {
        return Err(malformed());
    }
    let digit_at = |index: i64| {
        usize::try_from(index)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NEGATIVE {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for index in 0..=weight {
            if index == 0 {
                out.push_str(&digit_at(index).to_string());
            } else {
                out.push_str(&format!("{:04}", digit_at(index)));
            }
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut index = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit_at(index)));
            index += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

/// Encode decimal text (`-12.50`, `NaN`, `Infinity`) as a binary `numeric`.
pub(crate) fn encode(text: &str) -> Result<Vec<u8>> {
    let invalid = || PgFetchError::QueryFailed(format!("invalid numeric value {text:?}"));
    let trimmed = text.trim();

    let special = match trimmed.to_ascii_lowercase().as_str() {
        "nan" => Some(NAN),
        "infinity" | "+infinity" | "inf" | "+inf" => Some(POSITIVE_INFINITY),
        "-infinity" | "-inf" => Some(NEGATIVE_INFINITY),
        _ => None,
    };
    if let Some(sign) = special {
        return Ok(header(0, 0, sign, 0).to_vec());
    }

    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    let empty = int_part.is_empty() && frac_part.is_empty();
    if empty || !all_digits(int_part) || !all_digits(frac_part) {
        return Err(invalid());
    }
    let dscale = u16::try_from(frac_part.len()).map_err(|_| invalid())?;

    let int_part = int_part.trim_start_matches('0');
    let int_groups = int_part.len().div_ceil(4);
    let mut padded = "0".repeat(int_groups * 4 - int_part.len());
    padded.push_str(int_part);
    padded.push_str(frac_part);
    padded.push_str(&"0".repeat((4 - frac_part.len() % 4) % 4));

    let mut digits: Vec<u16> = padded
        .as_bytes()
        .chunks(4)
        .map(|group| group.iter().fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0')))
        .collect();
    let mut weight = i64::try_from(int_groups).map_err(|_| invalid())? - 1;

    let leading = digits.iter().take_while(|d| **d == 0).count();
    digits.drain(..leading);
    weight -= i64::try_from(leading).map_err(|_| invalid())?;
    while digits.last() == Some(&0) {
        digits.pop();
    }

    if digits.is_empty() {
        return Ok(header(0, 0, POSITIVE, dscale).to_vec());
    }
    let ndigits = i16::try_from(digits.len()).map_err(|_| invalid())?;
    let weight = i16::try_from(weight).map_err(|_| invalid())?;
    let sign = if negative { NEGATIVE } else { POSITIVE };

    let mut out = BytesMut::with_capacity(HEADER_LEN + digits.len() * 2);
    out.put_slice(&header(ndigits, weight, sign, dscale));
    for digit in digits {
        out.put_u16(digit);
    }
    Ok(out.to_vec())
}

fn header(ndigits: i16, weight: i16, sign: u16, dscale: u16) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[0..2].copy_from_slice(&ndigits.to_be_bytes());
    out[2..4].copy_from_slice(&weight.to_be_bytes());
    out[4..6].copy_from_slice(&sign.to_be_bytes());
    out[6..8].copy_from_slice(&dscale.to_be_bytes());
    out
}
