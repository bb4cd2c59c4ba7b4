//! LZ4 framing of save data.
//!
//! Newer saves are a sequence of independent LZ4 blocks, each with a 16 byte
//! header:
//!
//! ```text
//! [magic: u32 = 0xFEEDA1E5][compressed: u32][decompressed: u32][reserved: u32][compressed bytes]
//! ```
//!
//! Older console saves store one un-framed block for the whole buffer whose
//! decompressed size is only known from the meta file.

use crate::binio::read_u32_at;
use crate::error::{Error, Result};

/// Magic of every chunk header.
pub const CHUNK_MAGIC: u32 = 0xFEEDA1E5;

/// Maximum plaintext bytes per chunk.
pub const CHUNK_MAX_SIZE: usize = 0x80000;

pub const CHUNK_HEADER_LENGTH: usize = 0x10;

/// Whether `data` starts with a chunk header.
pub fn is_chunked(data: &[u8]) -> bool {
    read_u32_at(data, 0).is_ok_and(|m| m == CHUNK_MAGIC)
}

/// Splits `plain` into chunks of at most [`CHUNK_MAX_SIZE`] and compresses each.
pub fn compress_chunked(plain: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(plain.len() / 2 + CHUNK_HEADER_LENGTH);
    for chunk in plain.chunks(CHUNK_MAX_SIZE) {
        let compressed = lz4_flex::block::compress(chunk);
        out.extend_from_slice(&CHUNK_MAGIC.to_le_bytes());
        out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&compressed);
    }
    out
}

/// Decompresses chunks sequentially from offset 0 until the input is exhausted.
pub fn decompress_chunked(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 4);
    let mut pos = 0;
    while pos < data.len() {
        let magic = read_u32_at(data, pos)?;
        if magic != CHUNK_MAGIC {
            return Err(Error::InvalidMagic {
                expected: CHUNK_MAGIC,
                actual: magic,
            });
        }
        let compressed = read_u32_at(data, pos + 4)? as usize;
        let decompressed = read_u32_at(data, pos + 8)? as usize;
        pos += CHUNK_HEADER_LENGTH;

        let block = data.get(pos..pos + compressed).ok_or(Error::UnexpectedEof)?;
        out.extend_from_slice(&lz4_flex::block::decompress(block, decompressed)?);
        pos += compressed;
    }
    Ok(out)
}

/// Compresses the whole buffer as one block without header.
pub fn compress_single(plain: &[u8]) -> Vec<u8> {
    lz4_flex::block::compress(plain)
}

/// Decompresses one un-framed block of known decompressed size.
pub fn decompress_single(data: &[u8], decompressed: usize) -> Result<Vec<u8>> {
    Ok(lz4_flex::block::decompress(data, decompressed)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> Vec<u8> {
        // Mildly compressible and not periodic on chunk boundaries.
        (0..len).map(|i| ((i * 31) ^ (i >> 7)) as u8).collect()
    }

    #[test]
    fn chunked_roundtrip_around_chunk_boundaries() {
        for len in [
            0,
            1,
            CHUNK_MAX_SIZE - 1,
            CHUNK_MAX_SIZE,
            CHUNK_MAX_SIZE + 1,
            10 * CHUNK_MAX_SIZE,
        ] {
            let plain = payload(len);
            let packed = compress_chunked(&plain);
            assert_eq!(decompress_chunked(&packed).unwrap(), plain, "len {len}");
        }
    }

    #[test]
    fn chunk_headers_are_well_formed() {
        let plain = payload(CHUNK_MAX_SIZE + 5);
        let packed = compress_chunked(&plain);
        assert!(is_chunked(&packed));
        let first = read_u32_at(&packed, 4).unwrap() as usize;
        assert_eq!(read_u32_at(&packed, 8).unwrap() as usize, CHUNK_MAX_SIZE);
        assert_eq!(read_u32_at(&packed, 12).unwrap(), 0);
        let second = CHUNK_HEADER_LENGTH + first;
        assert_eq!(read_u32_at(&packed, second).unwrap(), CHUNK_MAGIC);
        assert_eq!(read_u32_at(&packed, second + 8).unwrap(), 5);
    }

    #[test]
    fn empty_input_produces_no_chunks() {
        assert!(compress_chunked(&[]).is_empty());
        assert!(!is_chunked(&[]));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut packed = compress_chunked(&payload(100));
        packed[0] ^= 0xFF;
        assert!(matches!(
            decompress_chunked(&packed),
            Err(Error::InvalidMagic { .. })
        ));
    }

    #[test]
    fn single_block_roundtrip() {
        let plain = payload(4096);
        let packed = compress_single(&plain);
        assert_eq!(decompress_single(&packed, plain.len()).unwrap(), plain);
    }
}
