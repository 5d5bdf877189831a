//! Generalised bit-placement layers.
//!
//! A `Placement` maps an input bit space to an output bit space through a
//! table of source indices. With a bijective table it is an ordinary
//! permutation; with repeated sources it is an expansion (DES E); with a
//! smaller output space it is a contraction.

use crate::bitvector::BitVector;
use crate::error::{Error, Result};

/// A map from an output space of `output_size` bits to an input space of
/// `input_size` bits, given as `table[o] = source index in the input`.
///
/// When input and output sizes are equal, an inverse table is derived at
/// construction. A non-bijective square table is not an error; the
/// placement is simply marked non-invertible and only fails once an
/// inverse application is attempted.
#[derive(Clone, Debug)]
pub struct Placement {
    input_size: usize,
    output_size: usize,
    table: Vec<usize>,
    inverse_table: Option<Vec<usize>>,
}

impl Placement {
    pub fn new(input_size: usize, output_size: usize, table: Vec<usize>) -> Result<Placement> {
        if input_size == 0 || output_size == 0 {
            return Err(Error::InvalidConfig(
                "placement sizes must be positive".to_string(),
            ));
        }

        if table.len() != output_size {
            return Err(Error::InvalidConfig(format!(
                "placement table has {} entries, expected {}",
                table.len(),
                output_size
            )));
        }

        for &source in &table {
            if source >= input_size {
                return Err(Error::InvalidConfig(format!(
                    "placement source index {} exceeds input size {}",
                    source, input_size
                )));
            }
        }

        let inverse_table = if input_size == output_size {
            Placement::derive_inverse(&table)
        } else {
            None
        };

        Ok(Placement {
            input_size,
            output_size,
            table,
            inverse_table,
        })
    }

    /// Builds the inverse of a square table, or `None` if the table is not
    /// a bijection.
    fn derive_inverse(table: &[usize]) -> Option<Vec<usize>> {
        let mut inverse = vec![usize::MAX; table.len()];

        for (position, &source) in table.iter().enumerate() {
            if inverse[source] != usize::MAX {
                return None;
            }
            inverse[source] = position;
        }

        Some(inverse)
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// True if an inverse application is available.
    pub fn is_invertible(&self) -> bool {
        self.inverse_table.is_some()
    }

    pub fn table(&self) -> &[usize] {
        &self.table
    }

    /// Forward application: `out[o] = in[table[o]]`. A single input bit may
    /// fan out to several output positions.
    pub fn forward(&self, input: &BitVector) -> Result<BitVector> {
        if input.size() != self.input_size {
            return Err(Error::SizeMismatch {
                expected: self.input_size,
                actual: input.size(),
            });
        }

        let mut output = BitVector::new(self.output_size)?;
        for (position, &source) in self.table.iter().enumerate() {
            output.set_unchecked(position, input.get_unchecked(source));
        }

        Ok(output)
    }

    /// Inverse application for bijective placements: recovers the
    /// pre-placement value from a value in the output space.
    pub fn inverse(&self, output: &BitVector) -> Result<BitVector> {
        if output.size() != self.output_size {
            return Err(Error::SizeMismatch {
                expected: self.output_size,
                actual: output.size(),
            });
        }

        let inverse_table = self.inverse_table.as_ref().ok_or(Error::NotInvertible)?;

        let mut input = BitVector::new(self.input_size)?;
        for (position, &source) in inverse_table.iter().enumerate() {
            input.set_unchecked(position, output.get_unchecked(source));
        }

        Ok(input)
    }

    /// Pseudo-inverse application for non-bijective placements such as
    /// expansions: OR-combines every output position back onto its source
    /// bit. Output positions tracing back to the same input bit are merged,
    /// so the result is only exact when at most one of the contributing
    /// source bits is set. That is a documented caller constraint (the
    /// mask pullbacks of the trail search satisfy it), not a general
    /// composition rule.
    pub fn pseudo_inverse(&self, output: &BitVector) -> Result<BitVector> {
        if output.size() != self.output_size {
            return Err(Error::SizeMismatch {
                expected: self.output_size,
                actual: output.size(),
            });
        }

        let mut input = BitVector::new(self.input_size)?;
        for (position, &source) in self.table.iter().enumerate() {
            let merged = input.get_unchecked(source) | output.get_unchecked(position);
            input.set_unchecked(source, merged);
        }

        Ok(input)
    }

    /// Identity permutation of `size` bits.
    pub fn identity(size: usize) -> Result<Placement> {
        Placement::new(size, size, (0..size).collect())
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    use super::*;

    #[test]
    fn forward_permutation() {
        // Rotate a nibble left by one
        let p = Placement::new(4, 4, vec![1, 2, 3, 0]).unwrap();
        let v = BitVector::from_int(4, 0b1000).unwrap();
        let rotated = p.forward(&v).unwrap();
        assert_eq!(rotated.get_slice_int(0, 4).unwrap(), 0b0001);
    }

    #[test]
    fn expansion_fans_out() {
        let p = Placement::new(2, 4, vec![0, 1, 1, 0]).unwrap();
        assert!(!p.is_invertible());

        let v = BitVector::from_int(2, 0b10).unwrap();
        let expanded = p.forward(&v).unwrap();
        assert_eq!(expanded.get_slice_int(0, 4).unwrap(), 0b1001);
    }

    #[test]
    fn non_bijective_square_is_marked_not_rejected() {
        let p = Placement::new(3, 3, vec![0, 0, 1]).unwrap();
        assert!(!p.is_invertible());

        let v = BitVector::new(3).unwrap();
        assert_eq!(p.inverse(&v), Err(Error::NotInvertible));
    }

    #[test]
    fn pseudo_inverse_merges_sources() {
        let expansion = Placement::new(2, 4, vec![0, 1, 1, 0]).unwrap();

        // One contributing source bit per input position: exact pullback
        let v = BitVector::from_int(4, 0b0100).unwrap();
        let back = expansion.pseudo_inverse(&v).unwrap();
        assert_eq!(back.get_slice_int(0, 2).unwrap(), 0b01);

        // Both copies of input bit 0 set still collapse onto one bit
        let v = BitVector::from_int(4, 0b1001).unwrap();
        let back = expansion.pseudo_inverse(&v).unwrap();
        assert_eq!(back.get_slice_int(0, 2).unwrap(), 0b10);
    }

    #[test]
    fn table_validation() {
        assert!(Placement::new(4, 4, vec![0, 1, 2]).is_err());
        assert!(Placement::new(4, 4, vec![0, 1, 2, 4]).is_err());
        assert!(Placement::new(0, 4, vec![]).is_err());
    }

    #[test]
    fn size_mismatch_on_apply() {
        let p = Placement::identity(4).unwrap();
        let v = BitVector::new(5).unwrap();
        assert!(p.forward(&v).is_err());
        assert!(p.inverse(&v).is_err());
        assert!(p.pseudo_inverse(&v).is_err());
    }

    #[quickcheck]
    fn prop_inverse_undoes_forward(seed: u64, value: u64) -> TestResult {
        // Build a deterministic permutation of 16 bits from the seed
        let size = 16;
        let mut table: Vec<usize> = (0..size).collect();
        let mut state = seed | 1;
        for i in (1..size).rev() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            table.swap(i, (state >> 33) as usize % (i + 1));
        }

        let p = Placement::new(size, size, table).unwrap();
        if !p.is_invertible() {
            return TestResult::failed();
        }

        let v = BitVector::from_int(size, value & 0xffff).unwrap();
        let roundtrip = p.inverse(&p.forward(&v).unwrap()).unwrap();

        TestResult::from_bool(roundtrip == v)
    }
}
