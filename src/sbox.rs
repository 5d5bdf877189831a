//! S-boxes and their linear approximation tables.

use fnv::FnvHashMap;
use itertools::Itertools;

use crate::error::{Error, Result};

/// One entry of a linear approximation table.
///
/// `bias` is half the correlation `C(input, output) = sum_x
/// (-1)^(<x,input> xor <S(x),output>)`, so it ranges over
/// `[-2^(n-1), 2^(n-1)]` for an n-bit input. Divide by `2^n` to obtain the
/// probability-scale bias used by the piling-up lemma.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatEntry {
    pub input: u64,
    pub output: u64,
    pub bias: f64,
}

/// A table-driven substitution box of `2^in_bits` entries, each a value
/// below `2^out_bits`, together with its LAT. The LAT is generated once at
/// construction, sorted by descending `|bias|` with ties broken by
/// ascending `(input, output)`, and never mutated.
#[derive(Clone, Debug)]
pub struct Sbox {
    in_bits: usize,
    out_bits: usize,
    table: Vec<u64>,
    lat: Vec<LatEntry>,
    by_output: FnvHashMap<u64, Vec<usize>>,
}

/// Parity of `<x, a> xor <y, b>` over GF(2).
fn parity_masks(x: u64, y: u64, a: u64, b: u64) -> u8 {
    (((x & a).count_ones() ^ (y & b).count_ones()) & 1) as u8
}

impl Sbox {
    /// Creates an S-box from its truth table and generates the LAT.
    pub fn new(in_bits: usize, out_bits: usize, table: Vec<u64>) -> Result<Sbox> {
        if in_bits == 0 || out_bits == 0 || in_bits > 20 || out_bits > 20 {
            return Err(Error::InvalidConfig(format!(
                "unsupported S-box shape {}x{}",
                in_bits, out_bits
            )));
        }

        if table.len() != 1 << in_bits {
            return Err(Error::InvalidConfig(format!(
                "S-box table has {} entries, expected {}",
                table.len(),
                1 << in_bits
            )));
        }

        for &value in &table {
            if value >= 1 << out_bits {
                return Err(Error::InvalidConfig(format!(
                    "S-box entry {} exceeds output range 2^{}",
                    value, out_bits
                )));
            }
        }

        let lat = Sbox::generate_lat(&table, in_bits, out_bits);

        let mut by_output: FnvHashMap<u64, Vec<usize>> = FnvHashMap::default();
        for (index, entry) in lat.iter().enumerate() {
            by_output.entry(entry.output).or_insert_with(Vec::new).push(index);
        }

        Ok(Sbox {
            in_bits,
            out_bits,
            table,
            lat,
            by_output,
        })
    }

    /// Generates the LAT: one entry per mask pair, sorted by descending
    /// bias magnitude.
    fn generate_lat(table: &[u64], in_bits: usize, out_bits: usize) -> Vec<LatEntry> {
        let inputs = 1u64 << in_bits;
        let outputs = 1u64 << out_bits;

        let mut lat: Vec<LatEntry> = (0..inputs)
            .cartesian_product(0..outputs)
            .map(|(a, b)| {
                let mut correlation = 0i64;
                for (x, &y) in table.iter().enumerate() {
                    match parity_masks(x as u64, y, a, b) {
                        0 => correlation += 1,
                        _ => correlation -= 1,
                    }
                }

                LatEntry {
                    input: a,
                    output: b,
                    bias: correlation as f64 / 2.0,
                }
            })
            .collect();

        lat.sort_by(|u, v| {
            v.bias
                .abs()
                .partial_cmp(&u.bias.abs())
                .expect("LAT biases are finite")
                .then_with(|| (u.input, u.output).cmp(&(v.input, v.output)))
        });

        lat
    }

    pub fn in_bits(&self) -> usize {
        self.in_bits
    }

    pub fn out_bits(&self) -> usize {
        self.out_bits
    }

    /// Looks up the substitution of `x`.
    pub fn eval(&self, x: u64) -> Result<u64> {
        self.table
            .get(x as usize)
            .copied()
            .ok_or(Error::IndexOutOfRange {
                index: x as usize,
                size: self.table.len(),
            })
    }

    /// The full LAT in sorted order.
    pub fn lat(&self) -> &[LatEntry] {
        &self.lat
    }

    /// All entries with `|bias| >= threshold`. Since the table is sorted,
    /// the scan stops at the first entry below the threshold.
    pub fn entries_above(&self, threshold: f64) -> &[LatEntry] {
        let cutoff = self
            .lat
            .iter()
            .position(|entry| entry.bias.abs() < threshold)
            .unwrap_or(self.lat.len());

        &self.lat[..cutoff]
    }

    /// The `n` highest-magnitude entries.
    pub fn top(&self, n: usize) -> &[LatEntry] {
        &self.lat[..n.min(self.lat.len())]
    }

    /// The first sorted entry with the given input mask, i.e. one of the
    /// highest-magnitude approximations using that mask (not necessarily
    /// unique; the tie-break order decides).
    pub fn best_for_input(&self, input_mask: u64) -> Option<&LatEntry> {
        self.lat.iter().find(|entry| entry.input == input_mask)
    }

    /// The first sorted entry with the given output mask.
    pub fn best_for_output(&self, output_mask: u64) -> Option<&LatEntry> {
        self.by_output
            .get(&output_mask)
            .and_then(|indices| indices.first())
            .map(|&index| &self.lat[index])
    }

    /// All entries with the given output mask, in sorted order.
    pub fn entries_for_output(&self, output_mask: u64) -> Vec<&LatEntry> {
        match self.by_output.get(&output_mask) {
            Some(indices) => indices.iter().map(|&index| &self.lat[index]).collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // S(x) = x ^ 1; affine, so the LAT is diagonal
    fn flip_sbox() -> Sbox {
        Sbox::new(2, 2, vec![1, 0, 3, 2]).unwrap()
    }

    #[test]
    fn lat_of_affine_sbox() {
        let sbox = flip_sbox();

        // Four +-2 entries on the diagonal, in tie-break order, then zeros
        let top: Vec<(u64, u64, f64)> = sbox
            .top(4)
            .iter()
            .map(|e| (e.input, e.output, e.bias))
            .collect();
        assert_eq!(
            top,
            vec![(0, 0, 2.0), (1, 1, -2.0), (2, 2, 2.0), (3, 3, -2.0)]
        );
        assert_eq!(sbox.lat().len(), 16);
        assert!(sbox.lat()[4..].iter().all(|e| e.bias == 0.0));
    }

    #[test]
    fn trivial_entry_has_full_correlation() {
        let sbox = flip_sbox();
        let trivial = sbox.best_for_input(0).unwrap();
        // C(0,0) = 2^in, stored as bias 2^in / 2
        assert_eq!((trivial.input, trivial.output), (0, 0));
        assert_eq!(trivial.bias, 2.0);
    }

    #[test]
    fn parseval_identity() {
        // For a bijective S-box, sum_b C(a,b)^2 = 2^(2 in) for every a
        let sbox = Sbox::new(3, 3, vec![3, 6, 0, 5, 7, 1, 4, 2]).unwrap();

        for a in 0..8u64 {
            let sum: f64 = sbox
                .lat()
                .iter()
                .filter(|e| e.input == a)
                .map(|e| (2.0 * e.bias) * (2.0 * e.bias))
                .sum();
            assert_eq!(sum, 64.0);
        }
    }

    #[test]
    fn threshold_and_output_queries() {
        let sbox = flip_sbox();

        assert_eq!(sbox.entries_above(1.0).len(), 4);
        assert_eq!(sbox.entries_above(0.0).len(), 16);

        let best = sbox.best_for_output(3).unwrap();
        assert_eq!((best.input, best.bias), (3, -2.0));

        let all = sbox.entries_for_output(3);
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].input, 3);
        // Remaining entries are the zero-bias ones, in tie-break order
        assert!(all[1..].iter().all(|e| e.bias == 0.0));
    }

    #[test]
    fn shape_validation() {
        assert!(Sbox::new(2, 2, vec![0, 1, 2]).is_err());
        assert!(Sbox::new(2, 2, vec![0, 1, 2, 4]).is_err());
        assert!(Sbox::new(0, 2, vec![]).is_err());
    }

    #[test]
    fn non_square_lat_shape() {
        // DES-shaped 6-to-4 S-boxes produce 2^6 * 2^4 entries
        let table: Vec<u64> = (0..64).map(|x| x % 16).collect();
        let sbox = Sbox::new(6, 4, table).unwrap();
        assert_eq!(sbox.lat().len(), 1024);
    }
}
