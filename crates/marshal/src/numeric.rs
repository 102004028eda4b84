//! Integer, bignum and float wire encodings
//!
//! # Packed integers
//!
//! Lengths, counts, indices and fixnums share one variable-length scheme:
//!
//! | value | bytes |
//! |---|---|
//! | `0` | `00` |
//! | `1..=122` | `value + 5` |
//! | `-123..=-1` | `value - 5` (as a signed byte) |
//! | otherwise | `±len` then `len` little-endian bytes, redundant sign bytes trimmed |
//!
//! # Bignums
//!
//! Sign byte (`+`, `-` or `0`), the packed count of 16-bit words, then the
//! magnitude as little-endian 16-bit words. The count is taken from the
//! 32-bit digits and drops one word when the top half of the top digit is
//! zero.
//!
//! # Floats
//!
//! A length-prefixed decimal string: `inf`, `-inf`, `nan`, or the value
//! printed with 15 significant digits (`%.15g`).

use crate::error::{CodecError, Result};
use num_bigint::{BigInt, Sign};

/// Append a packed integer
pub fn write_int(out: &mut Vec<u8>, value: i32) {
    if value == 0 {
        out.push(0);
    } else if (1..123).contains(&value) {
        out.push((value + 5) as u8);
    } else if (-123..0).contains(&value) {
        out.push((value - 5) as i8 as u8);
    } else {
        let bytes = value.to_le_bytes();
        let fill = if value < 0 { 0xff } else { 0x00 };
        let mut len = 4;
        while len > 1 && bytes[len - 1] == fill {
            len -= 1;
        }
        let len_byte = if value < 0 { -(len as i8) } else { len as i8 };
        out.push(len_byte as u8);
        out.extend_from_slice(&bytes[..len]);
    }
}

/// Append a packed length, rejecting lengths the format cannot express
pub fn write_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = i32::try_from(len)
        .map_err(|_| CodecError::argument(format!("length {} too large to marshal", len)))?;
    write_int(out, len);
    Ok(())
}

/// Append a length-prefixed byte string
pub fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    write_len(out, bytes.len())?;
    out.extend_from_slice(bytes);
    Ok(())
}

/// Append a bignum body (everything after the `l` tag)
pub fn write_bignum(out: &mut Vec<u8>, value: &BigInt) -> Result<()> {
    let sign = match value.sign() {
        Sign::Plus => b'+',
        Sign::Minus => b'-',
        Sign::NoSign => b'0',
    };
    out.push(sign);

    let digits = value.magnitude().to_u32_digits();
    let truncate = digits.last().is_some_and(|top| top >> 16 == 0);
    let words = digits.len() * 2 - usize::from(truncate);
    write_len(out, words)?;

    let top = digits.len().saturating_sub(1);
    for (i, digit) in digits.iter().enumerate() {
        if truncate && i == top {
            out.extend_from_slice(&(*digit as u16).to_le_bytes());
        } else {
            out.extend_from_slice(&digit.to_le_bytes());
        }
    }
    Ok(())
}

/// Format a float the way the wire expects it
///
/// Whole numbers get a `.0` suffix when `whole_suffix` is set; otherwise
/// they are written bare (`"3"`), which is the plain `%.15g` output.
pub fn format_float(value: f64, whole_suffix: bool) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    // 15 significant digits, correctly rounded: d.dddddddddddddde±x
    let sci = format!("{:.14e}", value);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    let negative = mantissa.starts_with('-');
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();

    let mut out = String::new();
    if negative {
        out.push('-');
    }

    if (-4..15).contains(&exp) {
        let (int_part, frac_part) = if exp >= 0 {
            let split = (exp as usize + 1).min(digits.len());
            (digits[..split].to_string(), digits[split..].to_string())
        } else {
            let zeros = "0".repeat((-exp - 1) as usize);
            ("0".to_string(), format!("{}{}", zeros, digits))
        };
        let frac = frac_part.trim_end_matches('0');
        out.push_str(&int_part);
        if !frac.is_empty() {
            out.push('.');
            out.push_str(frac);
        } else if whole_suffix {
            out.push_str(".0");
        }
    } else {
        let (lead, rest) = digits.split_at(1);
        let rest = rest.trim_end_matches('0');
        out.push_str(lead);
        if !rest.is_empty() {
            out.push('.');
            out.push_str(rest);
        }
        let sign = if exp < 0 { '-' } else { '+' };
        out.push_str(&format!("e{}{:02}", sign, exp.abs()));
    }
    out
}

/// Parse a float payload
pub fn parse_float(bytes: &[u8]) -> Result<f64> {
    // Some writers append binary mantissa bytes after a NUL
    let text = match bytes.iter().position(|b| *b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    };
    match text {
        b"inf" => return Ok(f64::INFINITY),
        b"-inf" => return Ok(f64::NEG_INFINITY),
        b"nan" => return Ok(f64::NAN),
        _ => {}
    }
    std::str::from_utf8(text)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .ok_or_else(|| {
            CodecError::format(format!(
                "invalid float payload {:?}",
                String::from_utf8_lossy(text)
            ))
        })
}

/// Cursor over an input byte slice
///
/// Every read past the end fails with a format error; a truncated stream
/// never yields a partial value.
#[derive(Debug)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Current offset from the start of the input
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self.bytes.get(self.pos).ok_or_else(CodecError::too_short)?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(CodecError::too_short());
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read a packed integer
    pub fn read_int(&mut self) -> Result<i32> {
        let first = self.read_u8()? as i8;
        match first {
            0 => Ok(0),
            5..=i8::MAX => Ok(first as i32 - 5),
            i8::MIN..=-5 => Ok(first as i32 + 5),
            1..=4 => {
                let mut value: u32 = 0;
                for i in 0..first as u32 {
                    value |= (self.read_u8()? as u32) << (8 * i);
                }
                Ok(value as i32)
            }
            _ => {
                let len = -(first as i32) as u32;
                let mut value: u32 = u32::MAX;
                for i in 0..len {
                    value &= !(0xff << (8 * i));
                    value |= (self.read_u8()? as u32) << (8 * i);
                }
                Ok(value as i32)
            }
        }
    }

    /// Read a packed integer that must be a non-negative length or index
    pub fn read_len(&mut self) -> Result<usize> {
        let value = self.read_int()?;
        usize::try_from(value)
            .map_err(|_| CodecError::format(format!("negative length {}", value)))
    }

    /// Read a length-prefixed byte string
    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_len()?;
        self.read_slice(len)
    }

    /// Read a bignum body (everything after the `l` tag)
    pub fn read_bignum(&mut self) -> Result<BigInt> {
        let sign = match self.read_u8()? {
            b'+' => Sign::Plus,
            b'-' => Sign::Minus,
            b'0' => Sign::NoSign,
            other => {
                return Err(CodecError::format(format!(
                    "invalid bignum sign byte {:#04x}",
                    other
                )));
            }
        };
        let words = self.read_len()?;
        let raw = self.read_slice(words * 2)?;
        let digits: Vec<u32> = raw
            .chunks(4)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u32, |acc, (i, b)| acc | (*b as u32) << (8 * i))
            })
            .collect();
        Ok(BigInt::from_slice(sign, &digits))
    }

    /// Read a float payload (length-prefixed decimal string)
    pub fn read_float(&mut self) -> Result<f64> {
        let bytes = self.read_bytes()?;
        parse_float(bytes)
    }
}
