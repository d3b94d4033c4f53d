// src/utils/crypto.rs
//! Hashing helpers shared by the canonicalizer and the signer.

use ring::digest::{digest, SHA256};

/// Computes the SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest(&SHA256, data).as_ref());
    out
}

/// Lowercase hex encoding of the SHA-256 digest of `data`.
///
/// # Example
/// ```
/// use snap_envelope::utils::crypto::sha256_hex;
/// assert_eq!(
///     sha256_hex(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}
