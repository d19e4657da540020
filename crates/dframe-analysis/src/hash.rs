//! Fixed-length perceptual hash bit vectors.

use std::fmt::{self, Write as _};

use crate::error::{AnalysisError, AnalysisResult};

/// A perceptual fingerprint.
///
/// Bits are stored little-endian within 64-bit words: bit `i` lives in word
/// `i / 64` at position `i % 64`. Unused high bits of the last word are zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PerceptualHash {
    words: Vec<u64>,
    bits: usize,
}

impl PerceptualHash {
    /// Build a hash from individual bits in order.
    pub fn from_bits<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        let mut words = Vec::new();
        let mut len = 0usize;
        for bit in bits {
            if len % 64 == 0 {
                words.push(0);
            }
            if bit {
                words[len / 64] |= 1u64 << (len % 64);
            }
            len += 1;
        }
        Self { words, bits: len }
    }

    /// Build a 64-bit hash from a single word.
    pub fn from_u64(word: u64) -> Self {
        Self {
            words: vec![word],
            bits: 64,
        }
    }

    /// Build a hash of `bits` length from packed words.
    pub fn from_words(words: Vec<u64>, bits: usize) -> AnalysisResult<Self> {
        if words.len() != bits.div_ceil(64) {
            return Err(AnalysisError::invalid_hash(format!(
                "{} words cannot hold exactly {} bits",
                words.len(),
                bits
            )));
        }
        let tail = bits % 64;
        if tail != 0 {
            if let Some(last) = words.last() {
                if last >> tail != 0 {
                    return Err(AnalysisError::invalid_hash("bits set beyond hash length"));
                }
            }
        }
        Ok(Self { words, bits })
    }

    /// Number of bits in the hash.
    pub fn bit_len(&self) -> usize {
        self.bits
    }

    /// Value of bit `i`.
    pub fn bit(&self, i: usize) -> bool {
        i < self.bits && (self.words[i / 64] >> (i % 64)) & 1 == 1
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Hamming distance to another hash of the same length.
    pub fn distance(&self, other: &Self) -> AnalysisResult<u32> {
        if self.bits != other.bits {
            return Err(AnalysisError::HashSizeMismatch {
                index: 0,
                expected: self.bits,
                actual: other.bits,
            });
        }
        Ok(self.distance_unchecked(other))
    }

    /// Hamming distance without the length check. Callers must have verified
    /// both hashes have the same length.
    pub(crate) fn distance_unchecked(&self, other: &Self) -> u32 {
        self.words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// Parse the `Display` form. The length is four bits per digit.
    #[cfg(test)]
    pub(crate) fn from_hex(hex: &str) -> AnalysisResult<Self> {
        let mut bits = Vec::with_capacity(hex.len() * 4);
        for c in hex.chars() {
            let value = c
                .to_digit(16)
                .ok_or_else(|| AnalysisError::invalid_hash(format!("invalid hex digit {:?}", c)))?;
            for j in 0..4 {
                bits.push((value >> (3 - j)) & 1 == 1);
            }
        }
        Ok(Self::from_bits(bits))
    }
}

/// Hex form, four bits per digit, bit 0 first.
impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for nibble in 0..self.bits.div_ceil(4) {
            let value = (0..4).fold(0u32, |acc, j| {
                acc | ((self.bit(nibble * 4 + j) as u32) << (3 - j))
            });
            if let Some(digit) = char::from_digit(value, 16) {
                f.write_char(digit)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hamming_distance() {
        let a = PerceptualHash::from_u64(0b1111_0000);
        let b = PerceptualHash::from_u64(0b1010_1010);
        assert_eq!(a.distance(&b).unwrap(), 4);
        assert_eq!(a.distance(&a).unwrap(), 0);
        assert_eq!(
            PerceptualHash::from_u64(0).distance(&PerceptualHash::from_u64(u64::MAX)).unwrap(),
            64
        );
    }

    #[test]
    fn test_distance_rejects_length_mismatch() {
        let a = PerceptualHash::from_u64(0);
        let b = PerceptualHash::from_words(vec![0, 0, 0, 0], 256).unwrap();
        assert!(matches!(
            a.distance(&b),
            Err(AnalysisError::HashSizeMismatch { expected: 64, actual: 256, .. })
        ));
    }

    #[test]
    fn test_from_bits_packs_in_order() {
        let hash = PerceptualHash::from_bits([true, false, true]);
        assert_eq!(hash.bit_len(), 3);
        assert_eq!(hash.words(), &[0b101]);
        assert!(hash.bit(0));
        assert!(!hash.bit(1));
        assert!(!hash.bit(3));
    }

    #[test]
    fn test_multi_word_distance() {
        let a = PerceptualHash::from_bits((0..256).map(|i| i % 2 == 0));
        let b = PerceptualHash::from_bits((0..256).map(|_| false));
        assert_eq!(a.distance(&b).unwrap(), 128);
        assert_eq!(a.count_ones(), 128);
    }

    #[test]
    fn test_from_words_validation() {
        assert!(PerceptualHash::from_words(vec![0], 128).is_err());
        assert!(PerceptualHash::from_words(vec![1 << 10], 8).is_err());
        assert!(PerceptualHash::from_words(vec![0xff], 8).is_ok());
    }

    #[test]
    fn test_hex_round_trip() {
        let hash = PerceptualHash::from_u64(0x0123_4567_89ab_cdef);
        let hex = hash.to_string();
        assert_eq!(hex.len(), 16);
        assert_eq!(PerceptualHash::from_hex(&hex).unwrap(), hash);
        assert!(PerceptualHash::from_hex("zz").is_err());
    }
}
