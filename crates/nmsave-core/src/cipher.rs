//! Block cipher of the desktop meta files.
//!
//! A corrected block TEA over the 32-bit words following the unencrypted
//! header word, with a fixed round count and a key derived from the slot.

use byteorder::{ByteOrder, LittleEndian};

const DELTA: u32 = 0x9E3779B9;

/// Key material; word 0 is replaced by the slot-derived value.
const KEY_MATERIAL: &[u8; 16] = b"NAESEVADNAYRTNRG";

/// Bytes at the start of the buffer that stay in plaintext.
pub const HEADER_LENGTH: usize = 4;

pub const ITERATIONS_SHORT: u32 = 6;
pub const ITERATIONS_LONG: u32 = 8;

/// Eight rounds for the short vanilla buffer, six for every longer one.
pub fn iterations_for(len: usize, vanilla_len: usize) -> u32 {
    if len == vanilla_len {
        ITERATIONS_LONG
    } else {
        ITERATIONS_SHORT
    }
}

fn key(slot: u32) -> [u32; 4] {
    let mut key = [0u32; 4];
    LittleEndian::read_u32_into(KEY_MATERIAL, &mut key);
    key[0] = (slot ^ 0x1422CB8C)
        .rotate_left(13)
        .wrapping_mul(5)
        .wrapping_add(0xE6546B64);
    key
}

#[inline]
fn mix(prev: u32, next: u32, hash: u32, k: u32) -> u32 {
    (((prev >> 5) ^ (next << 2)).wrapping_add((next >> 3) ^ (prev << 4)))
        ^ ((hash ^ next).wrapping_add(k ^ prev))
}

fn words(data: &[u8]) -> Vec<u32> {
    let mut out = vec![0u32; data.len() / 4];
    LittleEndian::read_u32_into(&data[..out.len() * 4], &mut out);
    out
}

fn assemble(header: &[u8], words: &[u32], tail: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(header.len() + words.len() * 4 + tail.len());
    out.extend_from_slice(header);
    for w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out.extend_from_slice(tail);
    out
}

fn split(data: &[u8]) -> (&[u8], &[u8], &[u8]) {
    let header_len = HEADER_LENGTH.min(data.len());
    let (header, body) = data.split_at(header_len);
    let aligned = body.len() / 4 * 4;
    let (body, tail) = body.split_at(aligned);
    (header, body, tail)
}

pub fn encrypt(data: &[u8], slot: u32, iterations: u32) -> Vec<u8> {
    let (header, body, tail) = split(data);
    let mut value = words(body);
    let n = value.len();
    if n < 2 {
        return data.to_vec();
    }
    let key = key(slot);

    let mut hash = 0u32;
    let mut current = value[n - 1];
    for _ in 0..iterations {
        hash = hash.wrapping_add(DELTA);
        let key_index = ((hash >> 2) & 3) as usize;
        for j in 0..n {
            let next = value[(j + 1) % n];
            value[j] = value[j].wrapping_add(mix(current, next, hash, key[(j & 3) ^ key_index]));
            current = value[j];
        }
    }
    assemble(header, &value, tail)
}

pub fn decrypt(data: &[u8], slot: u32, iterations: u32) -> Vec<u8> {
    let (header, body, tail) = split(data);
    let mut value = words(body);
    let n = value.len();
    if n < 2 {
        return data.to_vec();
    }
    let key = key(slot);

    let mut hash = iterations.wrapping_mul(DELTA);
    let mut current = value[0];
    for _ in 0..iterations {
        let key_index = ((hash >> 2) & 3) as usize;
        for j in (0..n).rev() {
            let prev = value[(j + n - 1) % n];
            value[j] = value[j].wrapping_sub(mix(prev, current, hash, key[(j & 3) ^ key_index]));
            current = value[j];
        }
        hash = hash.wrapping_sub(DELTA);
    }
    assemble(header, &value, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(37).wrapping_add(11)).collect()
    }

    #[test]
    fn roundtrip_long_iterations() {
        let plain = sample(0x68);
        let enc = encrypt(&plain, 2, ITERATIONS_LONG);
        assert_ne!(enc, plain);
        assert_eq!(&enc[..HEADER_LENGTH], &plain[..HEADER_LENGTH]);
        assert_eq!(decrypt(&enc, 2, ITERATIONS_LONG), plain);
    }

    #[test]
    fn roundtrip_short_iterations() {
        let plain = sample(0x168);
        let enc = encrypt(&plain, 7, ITERATIONS_SHORT);
        assert_ne!(enc, plain);
        assert_eq!(decrypt(&enc, 7, ITERATIONS_SHORT), plain);
    }

    #[test]
    fn key_depends_on_slot() {
        let plain = sample(0x68);
        assert_ne!(encrypt(&plain, 2, 8), encrypt(&plain, 3, 8));
        assert_ne!(decrypt(&encrypt(&plain, 2, 8), 3, 8), plain);
    }

    #[test]
    fn iteration_count_follows_length() {
        assert_eq!(iterations_for(0x68, 0x68), ITERATIONS_LONG);
        assert_eq!(iterations_for(0x168, 0x68), ITERATIONS_SHORT);
    }

    #[test]
    fn slot_key_derivation() {
        let k = key(0);
        assert_eq!(k[0], 0x1422CB8Cu32.rotate_left(13).wrapping_mul(5).wrapping_add(0xE6546B64));
        assert_eq!(k[1], u32::from_le_bytes(*b"EVAD"));
        assert_eq!(k[3], u32::from_le_bytes(*b"TNRG"));
    }
}
