//! # Hashing Utilities
//!
//! The two hash constructions the backup pipeline relies on. Both are
//! SHA-256 — the custody servers, the printed-copy tooling, and the
//! existing metadata records all speak it, so there is exactly one hash
//! function in this codebase and no configuration knob to get wrong.
//!
//! - **Salted hash** — `SHA-256(len(salt) || salt || message)` with the
//!   salt length as a single byte. Detects corruption of individual
//!   shares and of the reconstructed secret.
//! - **Share id** — `SHA-256("[type][id][name]")` in lowercase hex. The
//!   server-side key for a stored share; custody servers never see the
//!   owner-facing triple in their keyspace.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::MAX_SALT_LEN;

/// Errors from the salted-hash construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    /// The salt length must fit in the single length byte and must not be
    /// zero — an unsalted hash defeats the construction.
    #[error("salt length {0} outside [1, 255]")]
    BadSaltLength(usize),
}

/// Computes the SHA-256 hash of `data` as a fixed-size array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes the salted hash `SHA-256(len(salt) || salt || message)`.
///
/// The one-byte length prefix makes the (salt, message) split unambiguous:
/// without it, `("ab", "c")` and `("a", "bc")` would collide.
///
/// # Example
/// ```
/// use svalbard_protocol::crypto::salted_hash;
///
/// let h1 = salted_hash(b"message", b"salt-1").unwrap();
/// let h2 = salted_hash(b"message", b"salt-2").unwrap();
/// assert_ne!(h1, h2);
/// ```
pub fn salted_hash(message: &[u8], salt: &[u8]) -> Result<[u8; 32], HashError> {
    if salt.is_empty() || salt.len() > MAX_SALT_LEN {
        return Err(HashError::BadSaltLength(salt.len()));
    }

    let mut hasher = Sha256::new();
    hasher.update([salt.len() as u8]);
    hasher.update(salt);
    hasher.update(message);
    Ok(hasher.finalize().into())
}

/// Derives the server-side share id from the owner-facing triple.
///
/// The bracket delimiters keep the concatenation injective for the inputs
/// that matter (none of the deployed id types contain `][`), and the hash
/// keeps owner ids and secret names out of the custody server's keyspace
/// and logs.
///
/// Returns 64 lowercase hex characters.
///
/// # Example
/// ```
/// use svalbard_protocol::crypto::share_id;
///
/// assert_eq!(
///     share_id("a", "b", "c"),
///     "e998ba073ec38976e56156523126e98679eb916063d8cb5f1d9bd8193467dc25"
/// );
/// ```
pub fn share_id(owner_id_type: &str, owner_id: &str, secret_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"[");
    hasher.update(owner_id_type.as_bytes());
    hasher.update(b"][");
    hasher.update(owner_id.as_bytes());
    hasher.update(b"][");
    hasher.update(secret_name.as_bytes());
    hasher.update(b"]");
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_id_known_vectors() {
        assert_eq!(
            share_id("a", "b", "c"),
            "e998ba073ec38976e56156523126e98679eb916063d8cb5f1d9bd8193467dc25"
        );
        assert_eq!(
            share_id("abc", "xyz", "efg"),
            "7d97f68401fb8217b4beab14598eb88af5b5ab8c4282731a67b464ad47e2793b"
        );
    }

    #[test]
    fn share_id_matches_delimited_hash() {
        let direct = hex::encode(sha256(b"[phone][+15551234567][vault-master]"));
        assert_eq!(share_id("phone", "+15551234567", "vault-master"), direct);
    }

    #[test]
    fn share_id_is_position_sensitive() {
        assert_ne!(share_id("ab", "c", "d"), share_id("a", "bc", "d"));
        assert_ne!(share_id("a", "bc", "d"), share_id("a", "b", "cd"));
    }

    #[test]
    fn salted_hash_is_deterministic() {
        let a = salted_hash(b"payload", b"0123456789").unwrap();
        let b = salted_hash(b"payload", b"0123456789").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn salted_hash_separates_salt_and_message() {
        // The length prefix must prevent boundary ambiguity.
        let a = salted_hash(b"c", b"ab").unwrap();
        let b = salted_hash(b"bc", b"a").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn salted_hash_matches_manual_construction() {
        let expected = sha256(b"\x04saltmessage");
        assert_eq!(salted_hash(b"message", b"salt").unwrap(), expected);
    }

    #[test]
    fn salt_length_bounds() {
        assert_eq!(
            salted_hash(b"m", b"").unwrap_err(),
            HashError::BadSaltLength(0)
        );
        let long = vec![0u8; 256];
        assert_eq!(
            salted_hash(b"m", &long).unwrap_err(),
            HashError::BadSaltLength(256)
        );
        assert!(salted_hash(b"m", &vec![0u8; 255]).is_ok());
        assert!(salted_hash(b"m", &[1]).is_ok());
    }
}
