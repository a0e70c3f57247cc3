//! Formula hash and installation identity

use errors::Result;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Random bytes behind an installation identity
pub const IDENTITY_BYTES: usize = 64;

/// Drop empty texts, deduplicate and sort
pub fn canonicalize<I, S>(formulas: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    formulas
        .into_iter()
        .filter(|f| !f.as_ref().is_empty())
        .map(|f| f.as_ref().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// SHA-256 over the identity followed by the JSON list of canonical formulas
///
/// JSON encoding keeps the concatenation unambiguous: no two formula sets
/// produce the same hash input. Returned as lowercase hex.
pub fn compute_hash<I, S>(formulas: I, identity: &str) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let encoded = serde_json::to_string(&canonicalize(formulas))?;

    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    hasher.update(encoded.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Fresh hex-encoded installation identity from the OS random source
pub fn generate_identity() -> String {
    let mut bytes = [0u8; IDENTITY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize() {
        assert_eq!(
            canonicalize(["b", "", "a", "b"]),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(canonicalize(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn test_hash_is_order_independent_and_deterministic() {
        let first = compute_hash(["x * 2", "pi"], "identity").unwrap();
        let second = compute_hash(["pi", "x * 2", "pi"], "identity").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_any_change_changes_hash() {
        let base = compute_hash(["x * 2"], "identity").unwrap();
        assert_ne!(base, compute_hash(["x * 3"], "identity").unwrap());
        assert_ne!(base, compute_hash(["x * 2"], "identitz").unwrap());
        assert_ne!(base, compute_hash(["x * 2", "1"], "identity").unwrap());
    }

    #[test]
    fn test_concatenation_is_unambiguous() {
        let split = compute_hash(["1", "2"], "id").unwrap();
        let joined = compute_hash(["12"], "id").unwrap();
        assert_ne!(split, joined);
    }

    #[test]
    fn test_known_digest() {
        // sha256 of `id["1"]`
        let mut hasher = Sha256::new();
        hasher.update(br#"id["1"]"#);
        let expected = hex::encode(hasher.finalize());
        assert_eq!(compute_hash(["1"], "id").unwrap(), expected);
    }

    #[test]
    fn test_identity() {
        let a = generate_identity();
        let b = generate_identity();
        assert_eq!(a.len(), IDENTITY_BYTES * 2);
        assert_ne!(a, b);
    }
}
