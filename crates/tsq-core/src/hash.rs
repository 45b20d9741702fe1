//! Stable hashing helpers for tag identities and plan fingerprints.

use blake3::Hasher;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, serde::Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        // blake3 hex(32b) is 64 hex chars
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }

    /// First 8 bytes as hex; enough to tell plans apart in log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..16].to_string()
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut h = Hasher::new();
    h.update(bytes);
    Hash256(h.finalize().into())
}

/// Hash a sequence of byte-string pairs. Each part is length-prefixed so
/// `("ab","c")` and `("a","bc")` never collide.
pub fn hash_pairs<'a, I>(pairs: I) -> Hash256
where
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    let mut h = Hasher::new();
    for (name, value) in pairs {
        h.update(&(name.len() as u64).to_le_bytes());
        h.update(name);
        h.update(&(value.len() as u64).to_le_bytes());
        h.update(value);
    }
    Hash256(h.finalize().into())
}

/// Hash any serde-serializable value deterministically (via JSON).
pub fn hash_serde<T: Serialize>(v: &T) -> Result<Hash256, crate::error::Error> {
    let bytes = serde_json::to_vec(v).map_err(|e| crate::error::Error::Hash(e.to_string()))?;
    Ok(hash_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_boundaries_are_significant() {
        let a = hash_pairs([(&b"ab"[..], &b"c"[..])]);
        let b = hash_pairs([(&b"a"[..], &b"bc"[..])]);
        assert_ne!(a, b);
    }

    #[test]
    fn short_is_prefix_of_hex() {
        let h = hash_bytes(b"tsq");
        assert!(h.to_hex().starts_with(&h.short()));
        assert_eq!(h.short().len(), 16);
    }
}
