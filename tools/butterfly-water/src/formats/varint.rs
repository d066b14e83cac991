//! Unsigned LEB128 numbers: 7 bits per byte, high bit set on all but the last

use std::io::{self, Read, Write};

/// Longest encoding of a u64
pub const MAX_VARINT_LEN: usize = 10;

/// Number of bytes `value` occupies when encoded
pub fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Write `value`, returning the number of bytes written
pub fn write_varint<W: Write>(writer: &mut W, mut value: u64) -> io::Result<usize> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let mut len = 0;
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf[len] = byte;
            len += 1;
            break;
        }
        buf[len] = byte | 0x80;
        len += 1;
    }
    writer.write_all(&buf[..len])?;
    Ok(len)
}

/// Read one value. Encodings longer than a u64 are `InvalidData`.
pub fn read_varint<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut value = 0u64;
    for i in 0..MAX_VARINT_LEN {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        let bits = (byte[0] & 0x7F) as u64;
        if i == MAX_VARINT_LEN - 1 && bits > 1 {
            break;
        }
        value |= bits << (7 * i);
        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(io::Error::new(io::ErrorKind::InvalidData, "varint overflows 64 bits"))
}
