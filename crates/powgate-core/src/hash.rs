use sha2::{Digest, Sha256};

/// Computes the SHA-256 digest of `data`.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    digest
        .as_slice()
        .try_into()
        .expect("digest should be 32 bytes")
}

/// Counts the leading zero bits of a 256-bit digest.
///
/// Bytes are scanned in order: every all-zero byte contributes eight bits,
/// and the first non-zero byte contributes its high-order zero bits and ends
/// the scan. The all-zero digest yields 256. The full count is always
/// computed so callers can compare it against any difficulty.
#[must_use]
pub fn count_leading_zero_bits(digest: &[u8; 32]) -> u32 {
    let mut count = 0;
    for &byte in digest {
        if byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}
