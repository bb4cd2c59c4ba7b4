//! Fixed-width little-endian readers and writers used by every meta layout.
//!
//! Meta buffers are fixed-length, so everything here works on absolute
//! offsets into a slice instead of a running cursor. The cursor based helpers
//! at the bottom are used for the variable-length Microsoft index files.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use uuid::Uuid;

use crate::error::{Error, Result};

fn slice_at(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    data.get(offset..offset + len).ok_or(Error::UnexpectedEof)
}

pub fn read_u8_at(data: &[u8], offset: usize) -> Result<u8> {
    data.get(offset).copied().ok_or(Error::UnexpectedEof)
}

pub fn read_u16_at(data: &[u8], offset: usize) -> Result<u16> {
    Ok(LittleEndian::read_u16(slice_at(data, offset, 2)?))
}

pub fn read_u32_at(data: &[u8], offset: usize) -> Result<u32> {
    Ok(LittleEndian::read_u32(slice_at(data, offset, 4)?))
}

pub fn read_i32_at(data: &[u8], offset: usize) -> Result<i32> {
    Ok(LittleEndian::read_i32(slice_at(data, offset, 4)?))
}

pub fn read_u64_at(data: &[u8], offset: usize) -> Result<u64> {
    Ok(LittleEndian::read_u64(slice_at(data, offset, 8)?))
}

/// Reads a NUL-padded UTF-8 string of exactly `len` bytes.
pub fn read_fixed_str_at(data: &[u8], offset: usize, len: usize) -> Result<String> {
    let raw = slice_at(data, offset, len)?;
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

fn slice_at_mut(data: &mut [u8], offset: usize, len: usize) -> Result<&mut [u8]> {
    data.get_mut(offset..offset + len).ok_or(Error::UnexpectedEof)
}

pub fn write_u8_at(data: &mut [u8], offset: usize, v: u8) -> Result<()> {
    *data.get_mut(offset).ok_or(Error::UnexpectedEof)? = v;
    Ok(())
}

pub fn write_u16_at(data: &mut [u8], offset: usize, v: u16) -> Result<()> {
    LittleEndian::write_u16(slice_at_mut(data, offset, 2)?, v);
    Ok(())
}

pub fn write_u32_at(data: &mut [u8], offset: usize, v: u32) -> Result<()> {
    LittleEndian::write_u32(slice_at_mut(data, offset, 4)?, v);
    Ok(())
}

pub fn write_i32_at(data: &mut [u8], offset: usize, v: i32) -> Result<()> {
    LittleEndian::write_i32(slice_at_mut(data, offset, 4)?, v);
    Ok(())
}

pub fn write_u64_at(data: &mut [u8], offset: usize, v: u64) -> Result<()> {
    LittleEndian::write_u64(slice_at_mut(data, offset, 8)?, v);
    Ok(())
}

/// Writes `s` NUL-padded into exactly `len` bytes. Longer strings are cut at
/// a char boundary so one terminating NUL always fits.
pub fn write_fixed_str_at(data: &mut [u8], offset: usize, len: usize, s: &str) -> Result<()> {
    let dst = slice_at_mut(data, offset, len)?;
    dst.fill(0);
    let mut end = s.len().min(len.saturating_sub(1));
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    dst[..end].copy_from_slice(&s.as_bytes()[..end]);
    Ok(())
}

/// Copies `src` into `data` at `offset`, clipped to the buffer end.
pub fn write_bytes_clipped(data: &mut [u8], offset: usize, src: &[u8]) {
    if offset >= data.len() {
        return;
    }
    let n = src.len().min(data.len() - offset);
    data[offset..offset + n].copy_from_slice(&src[..n]);
}

// Cursor helpers

fn eof(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::UnexpectedEof
    } else {
        Error::Io(e)
    }
}

pub fn read_u8<R: Read>(r: &mut R) -> Result<u8> {
    r.read_u8().map_err(eof)
}

pub fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    r.read_u32::<LittleEndian>().map_err(eof)
}

pub fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    r.read_u64::<LittleEndian>().map_err(eof)
}

/// Reads a string prefixed with its length in UTF-16 code units (u32).
pub fn read_utf16_lp<R: Read>(r: &mut R) -> Result<String> {
    let len = read_u32(r)? as usize;
    read_utf16_units(r, len)
}

/// Reads `units` UTF-16 code units and drops trailing NULs.
pub fn read_utf16_units<R: Read>(r: &mut R, units: usize) -> Result<String> {
    let mut buf = Vec::with_capacity(units);
    for _ in 0..units {
        buf.push(r.read_u16::<LittleEndian>().map_err(eof)?);
    }
    while buf.last() == Some(&0) {
        buf.pop();
    }
    Ok(String::from_utf16_lossy(&buf))
}

pub fn read_guid<R: Read>(r: &mut R) -> Result<Uuid> {
    let mut b = [0u8; 16];
    r.read_exact(&mut b).map_err(eof)?;
    Ok(Uuid::from_bytes_le(b))
}

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> Result<()> {
    Ok(w.write_u8(v)?)
}

pub fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    Ok(w.write_u32::<LittleEndian>(v)?)
}

pub fn write_u64<W: Write>(w: &mut W, v: u64) -> Result<()> {
    Ok(w.write_u64::<LittleEndian>(v)?)
}

pub fn write_utf16_lp<W: Write>(w: &mut W, s: &str) -> Result<()> {
    let units: Vec<u16> = s.encode_utf16().collect();
    write_u32(w, units.len() as u32)?;
    for u in units {
        w.write_u16::<LittleEndian>(u)?;
    }
    Ok(())
}

/// Writes `s` as exactly `units` UTF-16 code units, NUL-padded.
pub fn write_utf16_units<W: Write>(w: &mut W, s: &str, units: usize) -> Result<()> {
    let mut encoded: Vec<u16> = s.encode_utf16().take(units).collect();
    encoded.resize(units, 0);
    for u in encoded {
        w.write_u16::<LittleEndian>(u)?;
    }
    Ok(())
}

pub fn write_guid<W: Write>(w: &mut W, g: &Uuid) -> Result<()> {
    Ok(w.write_all(&g.to_bytes_le())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn fixed_string_is_nul_padded_and_truncated() {
        let mut buf = vec![0xAAu8; 8];
        write_fixed_str_at(&mut buf, 0, 8, "abcdefghij").unwrap();
        assert_eq!(&buf, b"abcdefg\0");
        assert_eq!(read_fixed_str_at(&buf, 0, 8).unwrap(), "abcdefg");
        write_fixed_str_at(&mut buf, 0, 8, "hi").unwrap();
        assert_eq!(read_fixed_str_at(&buf, 0, 8).unwrap(), "hi");
    }

    #[test]
    fn utf16_length_prefixed() {
        let mut out = Vec::new();
        write_utf16_lp(&mut out, "Slot1Auto").unwrap();
        assert_eq!(&out[..4], &9u32.to_le_bytes());
        let s = read_utf16_lp(&mut Cursor::new(&out)).unwrap();
        assert_eq!(s, "Slot1Auto");
    }

    #[test]
    fn guid_uses_mixed_endian_layout() {
        let g = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        let mut out = Vec::new();
        write_guid(&mut out, &g).unwrap();
        assert_eq!(&out[..4], &[0x33, 0x22, 0x11, 0x00]);
        assert_eq!(read_guid(&mut Cursor::new(&out)).unwrap(), g);
    }

    #[test]
    fn out_of_range_reads_fail() {
        let buf = [0u8; 3];
        assert!(matches!(read_u32_at(&buf, 0), Err(Error::UnexpectedEof)));
    }
}
