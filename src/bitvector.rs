//! A fixed-width bit vector over GF(2).
//!
//! This is the base value type of the workbench: plaintexts, ciphertexts,
//! masks and round keys are all `BitVector`s. Indexing is big-endian, i.e.
//! index 0 is the most significant position of the vector, which matches
//! the convention used by published DES permutation tables.

use std::fmt;

use rand::Rng;
use smallvec::{smallvec, SmallVec};

use crate::error::{Error, Result};

const CHUNK_BITS: usize = 64;

/// A bit vector of fixed size. The size is set at creation and never
/// changes; all binary operations require both operands to have the same
/// size. Bits are stored big-endian within 64-bit chunks, and any unused
/// low-order bits of the final chunk are kept zero.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitVector {
    size: usize,
    chunks: SmallVec<[u64; 2]>,
}

impl BitVector {
    /// Creates an all-zero vector of `size` bits.
    pub fn new(size: usize) -> Result<BitVector> {
        if size == 0 {
            return Err(Error::InvalidArgument(
                "bit vector size must be positive".to_string(),
            ));
        }

        let num_chunks = (size + CHUNK_BITS - 1) / CHUNK_BITS;

        Ok(BitVector {
            size,
            chunks: smallvec![0; num_chunks],
        })
    }

    /// Creates a vector of `size` bits holding `value` in its low-order
    /// (rightmost) positions. Bits of `value` beyond the vector size are
    /// ignored.
    pub fn from_int(size: usize, value: u64) -> Result<BitVector> {
        let mut vector = BitVector::new(size)?;
        let start = size.saturating_sub(CHUNK_BITS);
        vector.set_slice(start, size, value)?;
        Ok(vector)
    }

    /// Creates a uniformly random vector of `size` bits.
    pub fn random<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Result<BitVector> {
        let mut vector = BitVector::new(size)?;

        for chunk in vector.chunks.iter_mut() {
            *chunk = rng.next_u64();
        }

        // Clear the unused tail of the last chunk
        let tail = size % CHUNK_BITS;
        if tail != 0 {
            *vector.chunks.last_mut().unwrap() &= u64::MAX << (CHUNK_BITS - tail);
        }

        Ok(vector)
    }

    /// Returns the size of the vector in bits.
    pub fn size(&self) -> usize {
        self.size
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.size {
            Ok(())
        } else {
            Err(Error::IndexOutOfRange {
                index,
                size: self.size,
            })
        }
    }

    fn check_range(&self, start: usize, end: usize) -> Result<()> {
        if start >= end || end > self.size {
            return Err(Error::InvalidArgument(format!(
                "invalid bit range [{}, {}) for size {}",
                start, end, self.size
            )));
        }
        Ok(())
    }

    pub(crate) fn get_unchecked(&self, index: usize) -> bool {
        let chunk = index / CHUNK_BITS;
        let offset = index % CHUNK_BITS;
        (self.chunks[chunk] >> (CHUNK_BITS - 1 - offset)) & 1 == 1
    }

    pub(crate) fn set_unchecked(&mut self, index: usize, value: bool) {
        let chunk = index / CHUNK_BITS;
        let offset = index % CHUNK_BITS;
        let mask = 1 << (CHUNK_BITS - 1 - offset);

        if value {
            self.chunks[chunk] |= mask;
        } else {
            self.chunks[chunk] &= !mask;
        }
    }

    /// Returns the bit at `index`.
    pub fn get_bit(&self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        Ok(self.get_unchecked(index))
    }

    /// Sets the bit at `index`.
    pub fn set_bit(&mut self, index: usize, value: bool) -> Result<()> {
        self.check_index(index)?;
        self.set_unchecked(index, value);
        Ok(())
    }

    /// Writes the low `end - start` bits of `value` into the range
    /// `[start, end)`, most significant bit first. The range is limited to
    /// a machine word; higher bits of `value` are ignored.
    pub fn set_slice(&mut self, start: usize, end: usize, value: u64) -> Result<()> {
        self.check_range(start, end)?;

        if end - start > CHUNK_BITS {
            return Err(Error::InvalidArgument(format!(
                "slice of {} bits does not fit a machine word",
                end - start
            )));
        }

        for i in start..end {
            let bit = (value >> (end - 1 - i)) & 1 == 1;
            self.set_unchecked(i, bit);
        }

        Ok(())
    }

    /// Extracts the range `[start, end)` as a new vector.
    pub fn get_slice(&self, start: usize, end: usize) -> Result<BitVector> {
        self.check_range(start, end)?;

        let mut slice = BitVector::new(end - start)?;
        for i in start..end {
            slice.set_unchecked(i - start, self.get_unchecked(i));
        }

        Ok(slice)
    }

    /// Decodes the range `[start, end)` as an unsigned big-endian integer.
    /// The range is limited to a machine word.
    pub fn get_slice_int(&self, start: usize, end: usize) -> Result<u64> {
        self.check_range(start, end)?;

        if end - start > CHUNK_BITS {
            return Err(Error::InvalidArgument(format!(
                "slice of {} bits does not fit a machine word",
                end - start
            )));
        }

        let mut value = 0;
        for i in start..end {
            value = (value << 1) | u64::from(self.get_unchecked(i));
        }

        Ok(value)
    }

    fn check_size(&self, other: &BitVector) -> Result<()> {
        if self.size == other.size {
            Ok(())
        } else {
            Err(Error::SizeMismatch {
                expected: self.size,
                actual: other.size,
            })
        }
    }

    /// Bitwise AND of two equally sized vectors.
    pub fn and(&self, other: &BitVector) -> Result<BitVector> {
        self.check_size(other)?;
        let mut result = self.clone();
        for (chunk, &other_chunk) in result.chunks.iter_mut().zip(&other.chunks) {
            *chunk &= other_chunk;
        }
        Ok(result)
    }

    /// Bitwise OR of two equally sized vectors.
    pub fn or(&self, other: &BitVector) -> Result<BitVector> {
        self.check_size(other)?;
        let mut result = self.clone();
        for (chunk, &other_chunk) in result.chunks.iter_mut().zip(&other.chunks) {
            *chunk |= other_chunk;
        }
        Ok(result)
    }

    /// Bitwise XOR of two equally sized vectors.
    pub fn xor(&self, other: &BitVector) -> Result<BitVector> {
        self.check_size(other)?;
        let mut result = self.clone();
        for (chunk, &other_chunk) in result.chunks.iter_mut().zip(&other.chunks) {
            *chunk ^= other_chunk;
        }
        Ok(result)
    }

    /// Concatenates two vectors, `self` occupying the most significant
    /// positions of the result.
    pub fn concat(&self, other: &BitVector) -> BitVector {
        let mut result =
            BitVector::new(self.size + other.size).expect("sizes are positive");

        for i in 0..self.size {
            result.set_unchecked(i, self.get_unchecked(i));
        }
        for i in 0..other.size {
            result.set_unchecked(self.size + i, other.get_unchecked(i));
        }

        result
    }

    /// GF(2) inner product: elementwise AND followed by a parity sum. This
    /// is the mask-correlation primitive used by the attacks.
    pub fn dot(&self, other: &BitVector) -> Result<u8> {
        self.check_size(other)?;

        let mut parity = 0;
        for (&a, &b) in self.chunks.iter().zip(&other.chunks) {
            parity ^= (a & b).count_ones() & 1;
        }

        Ok(parity as u8)
    }

    /// Number of set bits.
    pub fn hamming_weight(&self) -> usize {
        self.chunks.iter().map(|c| c.count_ones() as usize).sum()
    }

    /// True if no bit is set.
    pub fn is_zero(&self) -> bool {
        self.chunks.iter().all(|&c| c == 0)
    }
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for i in 0..self.size {
            write!(f, "{}", u8::from(self.get_unchecked(i)))?;
        }
        Ok(())
    }
}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BitVector[{}]({})", self.size, self)
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    use super::*;

    #[test]
    fn big_endian_indexing() {
        let mut v = BitVector::new(8).unwrap();
        v.set_slice(0, 8, 0xa5).unwrap();

        // 0xa5 = 10100101
        let bits: Vec<bool> = (0..8).map(|i| v.get_bit(i).unwrap()).collect();
        assert_eq!(
            bits,
            vec![true, false, true, false, false, true, false, true]
        );
        assert_eq!(v.get_slice_int(0, 8).unwrap(), 0xa5);
        assert_eq!(v.to_string(), "10100101");
    }

    #[test]
    fn from_int_places_value_rightmost() {
        let v = BitVector::from_int(12, 0x0a5).unwrap();
        assert_eq!(v.get_slice_int(4, 12).unwrap(), 0xa5);
        assert_eq!(v.get_slice_int(0, 4).unwrap(), 0);
    }

    #[test]
    fn zero_size_rejected() {
        assert!(BitVector::new(0).is_err());
    }

    #[test]
    fn out_of_range_index() {
        let v = BitVector::new(16).unwrap();
        assert_eq!(
            v.get_bit(16),
            Err(Error::IndexOutOfRange { index: 16, size: 16 })
        );
    }

    #[test]
    fn binary_ops_require_equal_sizes() {
        let a = BitVector::new(8).unwrap();
        let b = BitVector::new(9).unwrap();
        assert_eq!(
            a.xor(&b),
            Err(Error::SizeMismatch { expected: 8, actual: 9 })
        );
        assert!(a.and(&b).is_err());
        assert!(a.or(&b).is_err());
        assert!(a.dot(&b).is_err());
    }

    #[test]
    fn concat_preserves_order() {
        let a = BitVector::from_int(4, 0xa).unwrap();
        let b = BitVector::from_int(4, 0x5).unwrap();
        let c = a.concat(&b);
        assert_eq!(c.size(), 8);
        assert_eq!(c.get_slice_int(0, 8).unwrap(), 0xa5);
    }

    #[test]
    fn dot_products() {
        let a = BitVector::from_int(4, 0b1100).unwrap();
        let b = BitVector::from_int(4, 0b1010).unwrap();
        // overlap is the single top bit
        assert_eq!(a.dot(&b).unwrap(), 1);
        assert_eq!(a.dot(&a).unwrap(), 0);
    }

    #[test]
    fn wide_slice_rejected() {
        let v = BitVector::new(80).unwrap();
        assert!(v.get_slice_int(0, 65).is_err());
        assert!(v.get_slice(0, 65).is_ok());
    }

    fn vector_from(data: &[u64], size: usize) -> BitVector {
        let mut v = BitVector::new(size).unwrap();
        for i in 0..size {
            let bit = (data[(i / 64) % data.len()] >> (i % 64)) & 1 == 1;
            v.set_unchecked(i, bit);
        }
        v
    }

    #[quickcheck]
    fn prop_slice_roundtrip(data: Vec<u64>, start: u8, end: u8) -> TestResult {
        if data.is_empty() {
            return TestResult::discard();
        }

        let size = 96;
        let (start, end) = (start as usize % size, end as usize % size + 1);
        if start >= end {
            return TestResult::discard();
        }

        let original = vector_from(&data, size);
        let slice = original.get_slice(start, end).unwrap();

        // Writing the slice back at the same offset into a fresh vector
        // must reproduce the original bits in that range.
        let mut fresh = BitVector::new(size).unwrap();
        for i in 0..slice.size() {
            fresh
                .set_bit(start + i, slice.get_bit(i).unwrap())
                .unwrap();
        }

        for i in start..end {
            if fresh.get_bit(i).unwrap() != original.get_bit(i).unwrap() {
                return TestResult::failed();
            }
        }

        TestResult::passed()
    }

    #[quickcheck]
    fn prop_xor_involution(a: Vec<u64>, b: Vec<u64>) -> TestResult {
        if a.is_empty() || b.is_empty() {
            return TestResult::discard();
        }

        let x = vector_from(&a, 100);
        let y = vector_from(&b, 100);
        let back = x.xor(&y).unwrap().xor(&y).unwrap();

        TestResult::from_bool(back == x)
    }

    #[quickcheck]
    fn prop_dot_matches_weight_parity(a: Vec<u64>, b: Vec<u64>) -> TestResult {
        if a.is_empty() || b.is_empty() {
            return TestResult::discard();
        }

        let x = vector_from(&a, 77);
        let y = vector_from(&b, 77);
        let dot = x.dot(&y).unwrap();
        let weight = x.and(&y).unwrap().hamming_weight();

        TestResult::from_bool(dot as usize == weight % 2)
    }
}
