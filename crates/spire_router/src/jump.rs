//! Jump consistent hash (Lamping & Veach) over the slot space, plus the
//! CRC-64 string hash used to turn text keys into jump-hash inputs.

use crc::{Crc, CRC_64_XZ};

static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

/// Map `key` to a bucket in `[0, buckets)`. Zero buckets maps to 0.
pub fn jump_hash(mut key: u64, buckets: usize) -> usize {
    if buckets == 0 {
        return 0;
    }
    let mut b: i64 = -1;
    let mut j: i64 = 0;
    while j < buckets as i64 {
        b = j;
        key = key.wrapping_mul(2862933555777941757).wrapping_add(1);
        j = ((b + 1) as f64 * ((1u64 << 31) as f64 / ((key >> 33) + 1) as f64)) as i64;
    }
    b as usize
}

/// CRC-64 (ECMA-182 polynomial, reflected) of `data`.
pub fn crc64(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Bucket for a text key.
pub fn jump_hash_str(s: &str, buckets: usize) -> usize {
    jump_hash(crc64(s.as_bytes()), buckets)
}
