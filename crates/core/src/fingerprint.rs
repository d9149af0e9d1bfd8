//! 128-bit content fingerprints.
//!
//! A fingerprint is the first 16 bytes of the SHA-256 digest of its input.
//! Empty input maps to [`Fingerprint::ZERO`], which doubles as the
//! "no signature" sentinel used by url parsing.

use std::fmt;

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Deterministic 128-bit content fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    pub const ZERO: Fingerprint = Fingerprint([0; 16]);

    /// Fingerprint a byte buffer.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::ZERO;
        }

        let digest = Sha256::digest(bytes);
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest[..16]);
        Self(out)
    }

    /// Fingerprint the UTF-8 bytes of a string. `None` and `""` yield [`Fingerprint::ZERO`].
    pub fn of_str(input: Option<&str>) -> Self {
        match input {
            Some(s) => Self::of_bytes(s.as_bytes()),
            None => Self::ZERO,
        }
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 16]
    }

    /// Lower-case hex, 32 characters, no separators.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let a = Fingerprint::of_str(Some("body { color: red; }"));
        let b = Fingerprint::of_str(Some("body { color: red; }"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_different_input() {
        let a = Fingerprint::of_str(Some("a.css"));
        let b = Fingerprint::of_str(Some("b.css"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(Fingerprint::of_str(None), Fingerprint::ZERO);
        assert_eq!(Fingerprint::of_str(Some("")), Fingerprint::ZERO);
        assert_eq!(Fingerprint::of_bytes(&[]), Fingerprint::ZERO);
        assert!(Fingerprint::ZERO.is_zero());
    }

    #[test]
    fn test_str_and_bytes_agree() {
        assert_eq!(Fingerprint::of_str(Some("héllo")), Fingerprint::of_bytes("héllo".as_bytes()));
    }

    #[test]
    fn test_hex_format() {
        let hex = Fingerprint::of_bytes(b"content").to_hex();
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(Fingerprint::ZERO.to_hex(), "0".repeat(32));
    }

    #[test]
    fn test_known_vector() {
        // sha256("abc") = ba7816bf8f01cfea414140de5dae2223...
        assert_eq!(Fingerprint::of_bytes(b"abc").to_hex(), "ba7816bf8f01cfea414140de5dae2223");
    }

    #[test]
    fn test_uuid_matches_hex() {
        let fp = Fingerprint::of_bytes(b"abc");
        assert_eq!(fp.as_uuid().simple().to_string(), fp.to_hex());
    }
}
