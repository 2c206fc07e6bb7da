//! SHA-256 input hashing for UUID v5 key generation.

use bincode::config;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hash arbitrary byte data using SHA-256.
#[inline]
#[must_use]
pub fn hash_input(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash a serializable value using SHA-256 over its bincode encoding.
///
/// Bincode encodes fields in declaration order, so equal values always hash
/// equally.
///
/// # Errors
///
/// Returns an error if bincode serialization fails.
pub fn hash_serializable<T: Serialize>(value: &T) -> Result<[u8; 32], bincode::error::EncodeError> {
    let bytes = bincode::serde::encode_to_vec(value, config::standard())?;
    Ok(hash_input(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_input_determinism() {
        assert_eq!(hash_input(b"7 days"), hash_input(b"7 days"));
        assert_ne!(hash_input(b"7 days"), hash_input(b"5 days"));
    }

    #[test]
    fn test_hash_serializable_tuple_order_matters() -> Result<(), bincode::error::EncodeError> {
        let a = hash_serializable(&("2026-01-31", "7 days before reminder"))?;
        let b = hash_serializable(&("7 days before reminder", "2026-01-31"))?;
        assert_ne!(a, b);
        Ok(())
    }
}
