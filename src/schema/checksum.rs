//! CRC32 checksum for persisted metadata records
//!
//! Every read of a metadata file verifies the checksum; a mismatch means the
//! record was corrupted or hand-edited and is rejected.

use crc32fast::Hasher;

/// Computes a CRC32 (IEEE) checksum over the serialized record.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}
