//! Locally derived 6-byte pseudo-MAC.
//!
//! The pseudo-identifier stands in for a hardware address inside the beacon
//! payload. It is a SHA-256 digest prefix of stable device-identity strings,
//! so the same device always advertises the same value. It is an obfuscation
//! convenience, not a secret.

use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of bytes in a pseudo-identifier.
pub const PSEUDO_ID_LEN: usize = 6;

/// A 6-byte pseudo-identifier, displayed as `AA:BB:CC:DD:EE:FF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PseudoId(pub [u8; PSEUDO_ID_LEN]);

impl PseudoId {
    /// Derive a pseudo-identifier from ordered seed parts.
    ///
    /// The parts are concatenated in order as UTF-8 (no separator), hashed
    /// with SHA-256, and the first six digest bytes are kept.
    ///
    /// # Example
    /// ```
    /// use beacon_advertiser::PseudoId;
    ///
    /// let a = PseudoId::derive(&["install-id", "Pixel 7", "google"]);
    /// let b = PseudoId::derive(&["install-id", "Pixel 7", "google"]);
    /// assert_eq!(a, b);
    /// ```
    pub fn derive<S: AsRef<str>>(seed_parts: &[S]) -> Self {
        let mut hasher = Sha256::new();
        for part in seed_parts {
            hasher.update(part.as_ref().as_bytes());
        }
        let digest = hasher.finalize();

        let mut bytes = [0u8; PSEUDO_ID_LEN];
        bytes.copy_from_slice(&digest[..PSEUDO_ID_LEN]);
        PseudoId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PSEUDO_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for PseudoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Errors returned when parsing a pseudo-identifier string.
#[derive(Error, Debug, PartialEq)]
pub enum ParsePseudoIdError {
    #[error("invalid pseudo-MAC: expected 6 parts, got {0}")]
    InvalidLength(usize),
    #[error("invalid pseudo-MAC: part {0} has wrong length")]
    InvalidPartLength(usize),
    #[error("invalid pseudo-MAC: '{0}' is not valid hex")]
    InvalidHex(String),
}

impl FromStr for PseudoId {
    type Err = ParsePseudoIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != PSEUDO_ID_LEN {
            return Err(ParsePseudoIdError::InvalidLength(parts.len()));
        }

        let mut bytes = [0u8; PSEUDO_ID_LEN];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(ParsePseudoIdError::InvalidPartLength(i));
            }
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParsePseudoIdError::InvalidHex(part.to_string()))?;
        }

        Ok(PseudoId(bytes))
    }
}

impl From<[u8; PSEUDO_ID_LEN]> for PseudoId {
    fn from(bytes: [u8; PSEUDO_ID_LEN]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let parts = ["a1b2c3d4e5f60718", "SM-G991B", "samsung"];
        assert_eq!(PseudoId::derive(&parts), PseudoId::derive(&parts));
    }

    #[test]
    fn test_derive_matches_sha256_prefix() {
        // sha256("abc") = ba7816bf 8f01cfea 414140de ...
        let id = PseudoId::derive(&["a", "b", "c"]);
        assert_eq!(id.0, [0xBA, 0x78, 0x16, 0xBF, 0x8F, 0x01]);
        assert_eq!(id.to_string(), "BA:78:16:BF:8F:01");
    }

    #[test]
    fn test_derive_empty_seed() {
        // sha256("") = e3b0c442 98fc1c14 ...
        let id = PseudoId::derive::<&str>(&[]);
        assert_eq!(id.0, [0xE3, 0xB0, 0xC4, 0x42, 0x98, 0xFC]);
    }

    #[test]
    fn test_derive_changes_with_any_part() {
        let base = PseudoId::derive(&["install", "model", "brand"]);
        assert_ne!(base, PseudoId::derive(&["install2", "model", "brand"]));
        assert_ne!(base, PseudoId::derive(&["install", "model2", "brand"]));
        assert_ne!(base, PseudoId::derive(&["install", "model", "brand2"]));
    }

    #[test]
    fn test_derive_accepts_owned_strings() {
        let owned = vec!["install".to_string(), "model".to_string()];
        assert_eq!(
            PseudoId::derive(&owned),
            PseudoId::derive(&["install", "model"])
        );
    }

    #[test]
    fn test_display() {
        let id = PseudoId([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(format!("{}", id), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_display_with_zeros() {
        let id = PseudoId([0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(format!("{}", id), "00:01:02:03:04:05");
    }

    #[test]
    fn test_from_str_lowercase() {
        let id: PseudoId = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(id.0, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn test_from_str_invalid() {
        assert!(matches!(
            "invalid".parse::<PseudoId>(),
            Err(ParsePseudoIdError::InvalidLength(1))
        ));
        assert!(matches!(
            "AA:BB:CCC:DD:EE:FF".parse::<PseudoId>(),
            Err(ParsePseudoIdError::InvalidPartLength(2))
        ));
        assert!(matches!(
            "AA:BB:CC:DD:EE:GG".parse::<PseudoId>(),
            Err(ParsePseudoIdError::InvalidHex(_))
        ));
    }
}
