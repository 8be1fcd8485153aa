//! Block codecs for MDict containers: compression and the key info cipher

use std::io::Read;

use flate2::read::ZlibDecoder;
use ripemd::{Digest, Ripemd128};

use crate::error::{Error, Result};
use crate::format::types::CompressionType;

/// Every compressed block starts with a 4-byte type tag and a 4-byte checksum
const BLOCK_PREFIX: usize = 8;

/// Largest unpacked block a container may declare
pub const MAX_UNPACKED_BLOCK: u64 = 256 * 1024 * 1024;

/// Highest expansion either codec reaches on real data
const MAX_RATIO: u64 = 1100;

/// Reject a declared unpacked size no block of `packed_len` bytes can reach
pub fn check_unpacked_len(packed_len: u64, unpacked_len: u64) -> Result<()> {
    let limit = packed_len.saturating_mul(MAX_RATIO).min(MAX_UNPACKED_BLOCK);
    if unpacked_len > limit {
        return Err(Error::DecompressionError(format!(
            "declared unpacked size {} exceeds {} for a {}-byte block",
            unpacked_len, limit, packed_len
        )));
    }
    Ok(())
}

/// Inflate a zlib stream, reading at most one byte past `limit`
pub fn inflate(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data).take((limit as u64).saturating_add(1));
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| Error::DecompressionError(format!("zlib: {}", e)))?;
    Ok(decompressed)
}

/// Decompress an LZO1X block
pub fn lzo_decompress(data: &[u8], unpack_size: usize) -> Result<Vec<u8>> {
    let lzo = minilzo_rs::LZO::init()
        .map_err(|e| Error::DecompressionError(format!("lzo init: {:?}", e)))?;
    lzo.decompress_safe(data, unpack_size)
        .map_err(|e| Error::DecompressionError(format!("lzo: {:?}", e)))
}

/// Decode a tagged key/record block
pub fn unpack_block(block: &[u8], unpack_size: usize) -> Result<Vec<u8>> {
    if block.len() < BLOCK_PREFIX {
        return Err(Error::InvalidFormat(format!(
            "block of {} bytes is shorter than its prefix",
            block.len()
        )));
    }
    let comp_type = CompressionType::from_bytes(block).ok_or_else(|| {
        Error::InvalidCompressionType(u32::from_le_bytes([block[0], block[1], block[2], block[3]]))
    })?;
    let data = &block[BLOCK_PREFIX..];
    check_unpacked_len(block.len() as u64, unpack_size as u64)?;

    let unpacked = match comp_type {
        CompressionType::None => data.to_vec(),
        CompressionType::Lzo => lzo_decompress(data, unpack_size)?,
        CompressionType::Zlib => inflate(data, unpack_size)?,
    };
    if unpacked.len() != unpack_size {
        return Err(Error::DecompressionError(format!(
            "block unpacked to {} bytes, expected {}",
            unpacked.len(),
            unpack_size
        )));
    }
    Ok(unpacked)
}

/// Fast XOR decryption
fn fast_decrypt(data: &mut [u8], key: &[u8]) {
    let mut previous: u8 = 0x36;
    for (i, byte) in data.iter_mut().enumerate() {
        let t = (*byte).rotate_left(4) ^ previous ^ (i as u8) ^ key[i % key.len()];
        previous = *byte;
        *byte = t;
    }
}

/// Decrypt an encrypted key info block in place.
///
/// The key is the RIPEMD-128 digest of the block checksum followed by
/// `0x95 0x36 0x00 0x00`.
pub fn decrypt_key_info(block: &mut [u8]) -> Result<()> {
    if block.len() < BLOCK_PREFIX {
        return Err(Error::InvalidFormat("encrypted key info too short".to_string()));
    }
    let mut seed = [0u8; 8];
    seed[..4].copy_from_slice(&block[4..8]);
    seed[4] = 0x95;
    seed[5] = 0x36;

    let mut hasher = Ripemd128::new();
    hasher.update(seed);
    let key: [u8; 16] = hasher.finalize().into();

    fast_decrypt(&mut block[BLOCK_PREFIX..], &key);
    Ok(())
}
