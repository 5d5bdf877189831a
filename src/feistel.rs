//! A parametric Feistel network.
//!
//! The model covers the classic DES-style shape: initial and final
//! permutations around a ladder of identical rounds, where the round
//! function expands the right half, mixes in a round key, substitutes
//! through a bank of parallel S-boxes and permutes the result. Round keys
//! are direct bit selections from the master key; there is no derived key
//! schedule.

use std::sync::Arc;

use crate::bitvector::BitVector;
use crate::error::{Error, Result};
use crate::placement::Placement;
use crate::sbox::Sbox;

/// Caller-supplied description of a Feistel network. All tables are given
/// in the raw index form of the usual cipher specifications; geometry is
/// validated once by `Feistel::new`.
#[derive(Clone)]
pub struct FeistelConfig {
    pub block_size: usize,
    pub max_rounds: usize,
    pub initial_permutation: Vec<usize>,
    pub final_permutation: Vec<usize>,
    /// S-boxes are shared, not copied: they are read-only after
    /// construction and carry a precomputed LAT each.
    pub sboxes: Vec<Arc<Sbox>>,
    /// Expansion of the right half to the width of the S-box layer input.
    pub expansion: Vec<usize>,
    /// Permutation of the S-box layer output within the half block.
    pub post_sbox: Vec<usize>,
    pub key_size: usize,
    /// One entry per round: the master-key bit indices forming that round's
    /// key, in order.
    pub key_schedule: Vec<Vec<usize>>,
    pub master_key: BitVector,
}

/// The masks describing one round's linear approximation, expanded from a
/// single S-box approximation into the round's coordinate spaces.
#[derive(Clone, Debug)]
pub struct RoundApproximation {
    /// Mask over the half block entering the round function.
    pub input: BitVector,
    /// Mask over the expanded S-box layer input, which is also the round
    /// key mask.
    pub key: BitVector,
    /// Mask over the half block leaving the round function.
    pub output: BitVector,
}

pub struct Feistel {
    block_size: usize,
    max_rounds: usize,
    ip: Placement,
    fp: Placement,
    sboxes: Vec<Arc<Sbox>>,
    sbox_in: usize,
    sbox_out: usize,
    expansion: Placement,
    post_sbox: Placement,
    key_size: usize,
    key_schedule: Vec<Vec<usize>>,
    /// Per-round key-bit selections, precomputed from the schedule.
    round_key_selects: Vec<Placement>,
    master_key: BitVector,
}

impl Feistel {
    /// Validates the configured geometry and builds the network.
    pub fn new(config: FeistelConfig) -> Result<Feistel> {
        if config.block_size == 0 || config.block_size % 2 != 0 {
            return Err(Error::InvalidConfig(format!(
                "block size {} is not a positive even number",
                config.block_size
            )));
        }

        if config.max_rounds == 0 {
            return Err(Error::InvalidConfig("max rounds must be positive".to_string()));
        }

        if config.sboxes.is_empty() {
            return Err(Error::InvalidConfig("no S-boxes given".to_string()));
        }

        let sbox_in = config.sboxes[0].in_bits();
        let sbox_out = config.sboxes[0].out_bits();
        let num_sboxes = config.sboxes.len();

        if config
            .sboxes
            .iter()
            .any(|s| s.in_bits() != sbox_in || s.out_bits() != sbox_out)
        {
            return Err(Error::InvalidConfig(
                "all S-boxes must share the same shape".to_string(),
            ));
        }

        let half = config.block_size / 2;

        if sbox_out * num_sboxes != half {
            return Err(Error::InvalidConfig(format!(
                "S-box layer produces {} bits, half block is {}",
                sbox_out * num_sboxes,
                half
            )));
        }

        let ip = Placement::new(
            config.block_size,
            config.block_size,
            config.initial_permutation,
        )?;
        let fp = Placement::new(
            config.block_size,
            config.block_size,
            config.final_permutation,
        )?;

        if !ip.is_invertible() || !fp.is_invertible() {
            return Err(Error::InvalidConfig(
                "initial and final permutations must be bijective".to_string(),
            ));
        }

        let expansion = Placement::new(half, sbox_in * num_sboxes, config.expansion)?;
        let post_sbox = Placement::new(half, half, config.post_sbox)?;

        if !post_sbox.is_invertible() {
            return Err(Error::InvalidConfig(
                "post-S-box permutation must be bijective".to_string(),
            ));
        }

        if config.key_size == 0 {
            return Err(Error::InvalidConfig("key size must be positive".to_string()));
        }

        if config.master_key.size() != config.key_size {
            return Err(Error::InvalidConfig(format!(
                "master key has {} bits, key size is {}",
                config.master_key.size(),
                config.key_size
            )));
        }

        if config.key_schedule.len() != config.max_rounds {
            return Err(Error::InvalidConfig(format!(
                "key schedule has {} rounds, expected {}",
                config.key_schedule.len(),
                config.max_rounds
            )));
        }

        let mut round_key_selects = Vec::with_capacity(config.max_rounds);
        for (round, selection) in config.key_schedule.iter().enumerate() {
            if selection.len() != sbox_in * num_sboxes {
                return Err(Error::InvalidConfig(format!(
                    "round {} key selection has {} bits, expected {}",
                    round,
                    selection.len(),
                    sbox_in * num_sboxes
                )));
            }

            // Placement::new also rejects indices beyond the key size
            round_key_selects.push(Placement::new(
                config.key_size,
                selection.len(),
                selection.clone(),
            )?);
        }

        Ok(Feistel {
            block_size: config.block_size,
            max_rounds: config.max_rounds,
            ip,
            fp,
            sboxes: config.sboxes,
            sbox_in,
            sbox_out,
            expansion,
            post_sbox,
            key_size: config.key_size,
            key_schedule: config.key_schedule,
            round_key_selects,
            master_key: config.master_key,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn half_block_size(&self) -> usize {
        self.block_size / 2
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn num_sboxes(&self) -> usize {
        self.sboxes.len()
    }

    pub fn sbox_in(&self) -> usize {
        self.sbox_in
    }

    pub fn sbox_out(&self) -> usize {
        self.sbox_out
    }

    pub fn sbox(&self, index: usize) -> &Sbox {
        &self.sboxes[index]
    }

    pub fn initial_permutation(&self) -> &Placement {
        &self.ip
    }

    pub fn final_permutation(&self) -> &Placement {
        &self.fp
    }

    pub fn expansion(&self) -> &Placement {
        &self.expansion
    }

    pub fn post_sbox(&self) -> &Placement {
        &self.post_sbox
    }

    /// The master-key bit indices feeding round `round`.
    pub fn key_selection(&self, round: usize) -> Result<&[usize]> {
        self.key_schedule
            .get(round)
            .map(|selection| selection.as_slice())
            .ok_or(Error::IndexOutOfRange {
                index: round,
                size: self.key_schedule.len(),
            })
    }

    /// Selects the round key for `round` out of the master key.
    pub fn round_key(&self, round: usize) -> Result<BitVector> {
        let select = self
            .round_key_selects
            .get(round)
            .ok_or(Error::IndexOutOfRange {
                index: round,
                size: self.round_key_selects.len(),
            })?;

        select.forward(&self.master_key)
    }

    fn check_rounds(&self, rounds: usize) -> Result<()> {
        if rounds == 0 || rounds > self.max_rounds {
            return Err(Error::InvalidArgument(format!(
                "round count {} outside [1, {}]",
                rounds, self.max_rounds
            )));
        }
        Ok(())
    }

    /// The keyed round function F: expand the half block, mix the round
    /// key, substitute per S-box, permute.
    pub fn round_function(&self, input: &BitVector, round_key: &BitVector) -> Result<BitVector> {
        if input.size() != self.half_block_size() {
            return Err(Error::SizeMismatch {
                expected: self.half_block_size(),
                actual: input.size(),
            });
        }

        let expanded = self.expansion.forward(input)?;
        let mixed = expanded.xor(round_key)?;

        let mut substituted = BitVector::new(self.sbox_out * self.num_sboxes())?;
        for (i, sbox) in self.sboxes.iter().enumerate() {
            let chunk = mixed.get_slice_int(i * self.sbox_in, (i + 1) * self.sbox_in)?;
            let value = sbox.eval(chunk)?;
            substituted.set_slice(i * self.sbox_out, (i + 1) * self.sbox_out, value)?;
        }

        self.post_sbox.forward(&substituted)
    }

    /// Encrypts one block over the given number of rounds. Halves are
    /// swapped after every round except the last.
    pub fn encrypt(&self, plaintext: &BitVector, rounds: usize) -> Result<BitVector> {
        self.check_rounds(rounds)?;

        if plaintext.size() != self.block_size {
            return Err(Error::SizeMismatch {
                expected: self.block_size,
                actual: plaintext.size(),
            });
        }

        let permuted = self.ip.forward(plaintext)?;
        let half = self.half_block_size();
        let mut left = permuted.get_slice(0, half)?;
        let mut right = permuted.get_slice(half, self.block_size)?;

        for round in 0..rounds {
            let round_key = self.round_key(round)?;
            left = left.xor(&self.round_function(&right, &round_key)?)?;

            if round < rounds - 1 {
                std::mem::swap(&mut left, &mut right);
            }
        }

        self.fp.forward(&left.concat(&right))
    }

    /// Decrypts one block: the structural mirror of `encrypt`, with rounds
    /// taken in reverse order and the no-swap rule applied to the first
    /// round processed.
    pub fn decrypt(&self, ciphertext: &BitVector, rounds: usize) -> Result<BitVector> {
        self.check_rounds(rounds)?;

        if ciphertext.size() != self.block_size {
            return Err(Error::SizeMismatch {
                expected: self.block_size,
                actual: ciphertext.size(),
            });
        }

        let permuted = self.fp.inverse(ciphertext)?;
        let half = self.half_block_size();
        let mut left = permuted.get_slice(0, half)?;
        let mut right = permuted.get_slice(half, self.block_size)?;

        for round in (0..rounds).rev() {
            let round_key = self.round_key(round)?;
            left = left.xor(&self.round_function(&right, &round_key)?)?;

            if round > 0 {
                std::mem::swap(&mut left, &mut right);
            }
        }

        self.ip.inverse(&left.concat(&right))
    }

    /// Expands a single S-box approximation `(input_mask, output_mask)` on
    /// S-box `sbox_index` into masks over the round's coordinate spaces:
    /// the round-function input (pulled back through the expansion), the
    /// round key, and the round-function output (pushed through the
    /// post-S-box permutation).
    pub fn round_approximation(
        &self,
        sbox_index: usize,
        input_mask: u64,
        output_mask: u64,
    ) -> Result<RoundApproximation> {
        if sbox_index >= self.num_sboxes() {
            return Err(Error::IndexOutOfRange {
                index: sbox_index,
                size: self.num_sboxes(),
            });
        }

        if input_mask >= 1 << self.sbox_in || output_mask >= 1 << self.sbox_out {
            return Err(Error::InvalidArgument(format!(
                "masks ({:#x}, {:#x}) exceed the S-box shape",
                input_mask, output_mask
            )));
        }

        let mut layer_input = BitVector::new(self.sbox_in * self.num_sboxes())?;
        layer_input.set_slice(
            sbox_index * self.sbox_in,
            (sbox_index + 1) * self.sbox_in,
            input_mask,
        )?;
        let input = self.expansion.pseudo_inverse(&layer_input)?;

        let mut layer_output = BitVector::new(self.sbox_out * self.num_sboxes())?;
        layer_output.set_slice(
            sbox_index * self.sbox_out,
            (sbox_index + 1) * self.sbox_out,
            output_mask,
        )?;
        let output = self.post_sbox.forward(&layer_output)?;

        // The expanded input mask doubles as the round key mask: the key
        // is XORed in right after the expansion.
        Ok(RoundApproximation {
            input,
            key: layer_input,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    use super::*;
    use crate::cipher::toy;

    fn zero_key_network() -> Feistel {
        toy::network(BitVector::new(8).unwrap()).unwrap()
    }

    #[test]
    fn toy_round_function_flips_low_bit() {
        // The toy S-box is x ^ 1 and all placements are identities
        let net = zero_key_network();
        let zero_key = BitVector::new(2).unwrap();

        let input = BitVector::from_int(2, 0b10).unwrap();
        let output = net.round_function(&input, &zero_key).unwrap();
        assert_eq!(output.get_slice_int(0, 2).unwrap(), 0b11);
    }

    #[test]
    fn toy_known_ciphertext() {
        // With a zero key, two rounds map L || R to L || (L ^ R ^ 01)
        let net = zero_key_network();
        let plaintext = BitVector::from_int(4, 0b1011).unwrap();

        let ciphertext = net.encrypt(&plaintext, 2).unwrap();
        assert_eq!(ciphertext.get_slice_int(0, 4).unwrap(), 0b1000);

        let recovered = net.decrypt(&ciphertext, 2).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[quickcheck]
    fn prop_toy_decrypt_undoes_encrypt(plaintext: u8, key: u8, rounds: u8) -> TestResult {
        let rounds = rounds as usize % 2 + 1;
        let key = BitVector::from_int(8, key as u64).unwrap();
        let net = toy::network(key).unwrap();

        let plaintext = BitVector::from_int(4, plaintext as u64 & 0xf).unwrap();
        let ciphertext = net.encrypt(&plaintext, rounds).unwrap();
        let recovered = net.decrypt(&ciphertext, rounds).unwrap();

        TestResult::from_bool(recovered == plaintext)
    }

    #[test]
    fn round_count_limits() {
        let net = zero_key_network();
        let block = BitVector::new(4).unwrap();

        assert!(net.encrypt(&block, 3).is_err());
        assert!(net.encrypt(&block, 0).is_err());
        assert!(net.decrypt(&block, 3).is_err());
    }

    #[test]
    fn block_size_checked() {
        let net = zero_key_network();
        let wide = BitVector::new(6).unwrap();
        assert!(net.encrypt(&wide, 1).is_err());
    }

    #[test]
    fn config_validation() {
        let sbox = std::sync::Arc::new(Sbox::new(2, 2, vec![1, 0, 3, 2]).unwrap());

        let valid = FeistelConfig {
            block_size: 4,
            max_rounds: 2,
            initial_permutation: (0..4).collect(),
            final_permutation: (0..4).collect(),
            sboxes: vec![sbox.clone()],
            expansion: vec![0, 1],
            post_sbox: vec![0, 1],
            key_size: 8,
            key_schedule: vec![vec![0, 1], vec![2, 3]],
            master_key: BitVector::new(8).unwrap(),
        };
        assert!(Feistel::new(valid.clone()).is_ok());

        // Odd block size
        let mut config = valid.clone();
        config.block_size = 5;
        assert!(Feistel::new(config).is_err());

        // Non-bijective initial permutation
        let mut config = valid.clone();
        config.initial_permutation = vec![0, 0, 1, 2];
        assert!(Feistel::new(config).is_err());

        // Schedule index beyond the key size
        let mut config = valid.clone();
        config.key_schedule = vec![vec![0, 1], vec![2, 8]];
        assert!(Feistel::new(config).is_err());

        // Schedule length must match max rounds
        let mut config = valid.clone();
        config.key_schedule = vec![vec![0, 1]];
        assert!(Feistel::new(config).is_err());

        // Master key width must match the key size
        let mut config = valid;
        config.master_key = BitVector::new(7).unwrap();
        assert!(Feistel::new(config).is_err());
    }

    #[test]
    fn round_approximation_masks() {
        let net = zero_key_network();
        let approx = net.round_approximation(0, 0b01, 0b10).unwrap();

        // Identity placements: masks pass through unchanged
        assert_eq!(approx.input.get_slice_int(0, 2).unwrap(), 0b01);
        assert_eq!(approx.key.get_slice_int(0, 2).unwrap(), 0b01);
        assert_eq!(approx.output.get_slice_int(0, 2).unwrap(), 0b10);

        assert!(net.round_approximation(1, 0, 0).is_err());
        assert!(net.round_approximation(0, 4, 0).is_err());
    }
}
