//! U29 / S29 variable-length integers
//!
//! ```text
//! 0x00000000 - 0x0000007F : 0xxxxxxx
//! 0x00000080 - 0x00003FFF : 1xxxxxxx 0xxxxxxx
//! 0x00004000 - 0x001FFFFF : 1xxxxxxx 1xxxxxxx 0xxxxxxx
//! 0x00200000 - 0x1FFFFFFF : 1xxxxxxx 1xxxxxxx 1xxxxxxx xxxxxxxx
//! ```
//!
//! The fourth byte carries a full 8 bits and has no continuation flag.
//! Most headers are a U29 with bit 0 used as a flag ("U29 flag").

use bytes::{Buf, BufMut};

use crate::error::{DataError, Error, Result};

/// Largest value representable in a U29
pub const U29_MAX: u32 = (1 << 29) - 1;

/// Largest payload of a U29 whose low bit is a flag
pub const U29_FLAG_MAX: u32 = (1 << 28) - 1;

/// Range of an S29 integer
pub const S29_MIN: i32 = -(1 << 28);
pub const S29_MAX: i32 = (1 << 28) - 1;

pub fn read_u29<B: Buf>(buf: &mut B) -> Result<u32> {
    let mut result: u32 = 0;
    for n in 0..4 {
        if !buf.has_remaining() {
            return Err(Error::truncated());
        }
        let b = buf.get_u8();
        if n == 3 {
            return Ok((result << 8) | b as u32);
        }
        result = (result << 7) | (b & 0x7F) as u32;
        if b & 0x80 == 0 {
            break;
        }
    }
    Ok(result)
}

pub fn write_u29<B: BufMut>(buf: &mut B, value: u32) {
    let v = value & U29_MAX;
    if v < 0x80 {
        buf.put_u8(v as u8);
    } else if v < 0x4000 {
        buf.put_u8(0x80 | ((v >> 7) & 0x7F) as u8);
        buf.put_u8((v & 0x7F) as u8);
    } else if v < 0x20_0000 {
        buf.put_u8(0x80 | ((v >> 14) & 0x7F) as u8);
        buf.put_u8(0x80 | ((v >> 7) & 0x7F) as u8);
        buf.put_u8((v & 0x7F) as u8);
    } else {
        buf.put_u8(0x80 | ((v >> 22) & 0x7F) as u8);
        buf.put_u8(0x80 | ((v >> 15) & 0x7F) as u8);
        buf.put_u8(0x80 | ((v >> 8) & 0x7F) as u8);
        buf.put_u8((v & 0xFF) as u8);
    }
}

pub fn read_s29<B: Buf>(buf: &mut B) -> Result<i32> {
    let raw = read_u29(buf)? as i32;
    if raw <= S29_MAX {
        Ok(raw)
    } else {
        // -x is stored as 2^29 - x
        Ok(raw - (1 << 29))
    }
}

/// Writes an S29. Values outside `S29_MIN..=S29_MAX` are rejected.
pub fn write_s29<B: BufMut>(buf: &mut B, value: i32) -> Result<()> {
    if !(S29_MIN..=S29_MAX).contains(&value) {
        return Err(DataError::IntegerOutOfRange(value).into());
    }
    let raw = if value < 0 { value + (1 << 29) } else { value };
    write_u29(buf, raw as u32);
    Ok(())
}

/// Reads a U29 and splits off its low bit: `(payload, flag)`
pub fn read_u29_flag<B: Buf>(buf: &mut B) -> Result<(u32, bool)> {
    let raw = read_u29(buf)?;
    Ok((raw >> 1, raw & 1 == 1))
}

pub fn write_u29_flag<B: BufMut>(buf: &mut B, value: u32, flag: bool) {
    write_u29(buf, (value << 1) | flag as u32);
}

/// Checks a length or index fits in a flagged U29 payload
pub fn check_flag_payload(len: usize) -> Result<u32> {
    if len > U29_FLAG_MAX as usize {
        return Err(DataError::LengthOverflow(len).into());
    }
    Ok(len as u32)
}
