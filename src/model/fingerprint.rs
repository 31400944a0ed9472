//! Content-derived track identity
//!
//! A [`Fingerprint`] is a 128-bit hash over decoded, normalized PCM (never
//! the compressed bytes), so the same recording re-packaged in a
//! different container or codec at equivalent quality keeps its identity.
//! The [`AcousticSignature`] is a deliberately coarse spectral sketch used
//! only for near-duplicate grouping, never for identity.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 128-bit content hash of decoded, normalized audio
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    /// Wrap a raw digest
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// The raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(format!("expected 32 hex chars, got {}", s.len()));
        }
        let mut bytes = [0u8; 16];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex = std::str::from_utf8(chunk).map_err(|e| e.to_string())?;
            bytes[i] = u8::from_str_radix(hex, 16).map_err(|e| e.to_string())?;
        }
        Ok(Self(bytes))
    }
}

// Serialized as a hex string so fingerprints can key JSON maps.
impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HexVisitor;

        impl<'de> Visitor<'de> for HexVisitor {
            type Value = Fingerprint;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a 32-character hex string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Fingerprint, E> {
                Fingerprint::from_str(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(HexVisitor)
    }
}

/// Coarse spectral sketch for near-duplicate matching
///
/// Band energies per time slice, L2-normalized over the whole vector.
/// Two sketches are compared by cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcousticSignature {
    bands: Vec<f32>,
}

impl AcousticSignature {
    /// Build a signature from raw band energies, normalizing to unit length
    pub fn from_energies(mut bands: Vec<f32>) -> Self {
        let norm = bands.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
        if norm > f64::EPSILON {
            for value in &mut bands {
                *value = (*value as f64 / norm) as f32;
            }
        }
        Self { bands }
    }

    /// Cosine similarity in [-1, 1]; 1.0 means identical sketches
    ///
    /// Signatures of mismatched length (produced by different configurations)
    /// compare as 0.0 rather than panicking.
    pub fn similarity(&self, other: &AcousticSignature) -> f32 {
        if self.bands.len() != other.bands.len() || self.bands.is_empty() {
            return 0.0;
        }
        let dot: f64 = self
            .bands
            .iter()
            .zip(&other.bands)
            .map(|(a, b)| *a as f64 * *b as f64)
            .sum();
        dot as f32
    }

    /// Number of values in the sketch
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_hex_round_trip() {
        let fp = Fingerprint::from_bytes([
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ]);
        let hex = fp.to_string();
        assert_eq!(hex, "00112233445566778899aabbccddeeff");
        assert_eq!(Fingerprint::from_str(&hex).unwrap(), fp);
    }

    #[test]
    fn test_fingerprint_rejects_bad_input() {
        assert!(Fingerprint::from_str("abc").is_err());
        assert!(Fingerprint::from_str("zz112233445566778899aabbccddeeff").is_err());
    }

    #[test]
    fn test_signature_self_similarity_is_one() {
        let sig = AcousticSignature::from_energies(vec![1.0, 2.0, 3.0, 4.0]);
        assert!((sig.similarity(&sig) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_signature_scale_invariance() {
        let a = AcousticSignature::from_energies(vec![1.0, 2.0, 3.0, 4.0]);
        let b = AcousticSignature::from_energies(vec![0.5, 1.0, 1.5, 2.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_signature_orthogonal_vectors() {
        let a = AcousticSignature::from_energies(vec![1.0, 0.0]);
        let b = AcousticSignature::from_energies(vec![0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_signature_length_mismatch_compares_as_zero() {
        let a = AcousticSignature::from_energies(vec![1.0, 0.0]);
        let b = AcousticSignature::from_energies(vec![1.0, 0.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }
}
