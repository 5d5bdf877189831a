//! Matsui's linear attacks over a Feistel network.
//!
//! Algorithm 1 recovers one key-parity bit from a full-cipher linear
//! approximation; Algorithm 2 recovers last-round key bits by guessing the
//! round key of the active S-boxes and ranking the guesses by the bias of
//! the shortened approximation. Both are statistical: accuracy grows with
//! the number of sampled pairs relative to `1 / bias^2`.

use rand::Rng;

use crate::bitvector::BitVector;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::feistel::Feistel;
use crate::placement::Placement;

/// The result of a last-round key recovery.
#[derive(Clone, Debug)]
pub struct RecoveredKey {
    /// Key-size vector with the recovered bits written at the master-key
    /// positions named by the attacked round's schedule; every other
    /// position is left zero (unknown).
    pub partial_key: BitVector,
    /// The right-hand-side parity bit of the approximation, decided by the
    /// sign of the winning counter deviation against the theoretical bias.
    pub parity_bit: u8,
    /// Centered counter value of the winning candidate.
    pub deviation: f64,
}

/// An attacker bound to a cipher instance and a fixed attacked round
/// count. Stateless across calls; every attack samples fresh plaintexts
/// from the random source handed to it.
pub struct LinearAttacker<'a> {
    cipher: &'a Feistel,
    rounds: usize,
    cancel: CancelToken,
}

impl<'a> LinearAttacker<'a> {
    pub fn new(cipher: &'a Feistel, rounds: usize) -> Result<LinearAttacker<'a>> {
        if rounds == 0 || rounds > cipher.max_rounds() {
            return Err(Error::InvalidArgument(format!(
                "attacked round count {} outside [1, {}]",
                rounds,
                cipher.max_rounds()
            )));
        }

        Ok(LinearAttacker {
            cipher,
            rounds,
            cancel: CancelToken::new(),
        })
    }

    /// Installs a cancellation token checked once per sampled pair.
    pub fn with_cancel(mut self, cancel: CancelToken) -> LinearAttacker<'a> {
        self.cancel = cancel;
        self
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    fn check_block_mask(&self, mask: &BitVector) -> Result<()> {
        if mask.size() != self.cipher.block_size() {
            return Err(Error::SizeMismatch {
                expected: self.cipher.block_size(),
                actual: mask.size(),
            });
        }
        Ok(())
    }

    /**
    Matsui's Algorithm 1: recovers the parity of the key bits on the
    right-hand side of a linear approximation.

    pair_count          Number of random plaintexts to sample.
    input_mask          Plaintext mask, in the pre-IP coordinate space.
    output_mask         Ciphertext mask, in the post-FP coordinate space.
    theoretical_bias    Signed probability bias of the approximation.
    ip, fp              Boundary placements used to move the masks into
                        the cipher's internal coordinates.

    Returns 0 when the empirical bias agrees in sign with the theoretical
    one, 1 otherwise.
    */
    pub fn attack_1<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        pair_count: usize,
        input_mask: &BitVector,
        output_mask: &BitVector,
        theoretical_bias: f64,
        ip: &Placement,
        fp: &Placement,
    ) -> Result<u8> {
        if pair_count == 0 {
            return Err(Error::InvalidArgument(
                "pair count must be positive".to_string(),
            ));
        }
        self.check_block_mask(input_mask)?;
        self.check_block_mask(output_mask)?;

        let ip_mask = ip.forward(input_mask)?;
        let fp_mask = fp.inverse(output_mask)?;

        let mut agreements = 0usize;
        for _ in 0..pair_count {
            self.cancel.check()?;

            let plaintext = BitVector::random(self.cipher.block_size(), rng)?;
            let ciphertext = self.cipher.encrypt(&plaintext, self.rounds)?;

            if plaintext.dot(&ip_mask)? == ciphertext.dot(&fp_mask)? {
                agreements += 1;
            }
        }

        let empirical_bias = agreements as f64 / pair_count as f64 - 0.5;

        if empirical_bias * theoretical_bias > 0.0 {
            Ok(0)
        } else {
            Ok(1)
        }
    }

    /**
    Matsui's Algorithm 2: last-round key recovery.

    The round mask is pulled back through the post-S-box permutation to
    find the active S-boxes; all round keys restricted to the active
    S-box inputs are enumerated, and each candidate's counter tracks how
    often the shortened approximation holds when the last round is peeled
    off with that candidate. The candidate with the largest absolute
    centered counter wins. Cost is exponential in the number of guessed
    bits.

    pair_count          Number of random plaintexts to sample.
    input_mask          Plaintext mask, internal coordinates.
    output_mask         Ciphertext mask, internal coordinates.
    round_mask          Half-block mask applied to the last round
                        function's output.
    theoretical_bias    Signed probability bias of the shortened
                        approximation.
    ip, fp              Boundary placements applied to the sampled
                        plaintext/ciphertext pairs.
    post_sbox           Post-S-box permutation, for locating the active
                        S-boxes.
    expansion           Expansion placement; taken for geometry checking
                        against the cipher.

    Always returns a best guess; there is no "no key found" outcome.
    */
    #[allow(clippy::too_many_arguments)]
    pub fn attack_2<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        pair_count: usize,
        input_mask: &BitVector,
        output_mask: &BitVector,
        round_mask: &BitVector,
        theoretical_bias: f64,
        ip: &Placement,
        fp: &Placement,
        post_sbox: &Placement,
        expansion: &Placement,
    ) -> Result<RecoveredKey> {
        if pair_count == 0 {
            return Err(Error::InvalidArgument(
                "pair count must be positive".to_string(),
            ));
        }
        self.check_block_mask(input_mask)?;
        self.check_block_mask(output_mask)?;

        let half = self.cipher.half_block_size();
        let sbox_in = self.cipher.sbox_in();
        let sbox_out = self.cipher.sbox_out();
        let num_sboxes = self.cipher.num_sboxes();

        if round_mask.size() != half {
            return Err(Error::SizeMismatch {
                expected: half,
                actual: round_mask.size(),
            });
        }

        if post_sbox.input_size() != half || post_sbox.output_size() != half {
            return Err(Error::InvalidArgument(
                "post-S-box placement does not match the half block".to_string(),
            ));
        }

        if expansion.input_size() != half || expansion.output_size() != sbox_in * num_sboxes {
            return Err(Error::InvalidArgument(
                "expansion placement does not match the S-box layer".to_string(),
            ));
        }

        // Locate the active S-boxes under the round mask
        let layer_mask = post_sbox.inverse(round_mask)?;
        let mut active = Vec::with_capacity(num_sboxes);
        for i in 0..num_sboxes {
            let bundle = layer_mask.get_slice_int(i * sbox_out, (i + 1) * sbox_out)?;
            active.push(bundle != 0);
        }

        let guess_bits = active.iter().filter(|&&a| a).count() * sbox_in;
        let bundle_mask = (1u64 << sbox_in) - 1;

        // Expand every guess into a full-width round key, zero outside the
        // active positions
        let mut candidates = Vec::with_capacity(1 << guess_bits);
        for guess in 0..(1u64 << guess_bits) {
            let mut round_key = BitVector::new(sbox_in * num_sboxes)?;
            let mut slot = 0;
            for (i, &is_active) in active.iter().enumerate() {
                if is_active {
                    let bundle = (guess >> (slot * sbox_in)) & bundle_mask;
                    round_key.set_slice(i * sbox_in, (i + 1) * sbox_in, bundle)?;
                    slot += 1;
                }
            }
            candidates.push(round_key);
        }

        let mut counters = vec![0i64; candidates.len()];

        for _ in 0..pair_count {
            self.cancel.check()?;

            let plaintext = BitVector::random(self.cipher.block_size(), rng)?;
            let ciphertext = self.cipher.encrypt(&plaintext, self.rounds)?;

            let internal_input = ip.forward(&plaintext)?;
            let internal_output = fp.inverse(&ciphertext)?;
            let right_half = internal_output.get_slice(half, self.cipher.block_size())?;

            let input_dot = internal_input.dot(input_mask)?;
            let output_dot = internal_output.dot(output_mask)?;

            for (candidate, counter) in candidates.iter().zip(counters.iter_mut()) {
                let peeled = self.cipher.round_function(&right_half, candidate)?;
                let round_dot = peeled.dot(round_mask)?;

                if input_dot ^ output_dot ^ round_dot == 0 {
                    *counter += 1;
                }
            }
        }

        // Center the counters and pick the largest deviation; among equal
        // deviations the lowest guess value wins
        let center = pair_count as f64 / 2.0;
        let mut winner = 0;
        let mut winner_deviation = 0.0f64;
        for (index, &counter) in counters.iter().enumerate() {
            let deviation = counter as f64 - center;
            if deviation.abs() > winner_deviation.abs() {
                winner = index;
                winner_deviation = deviation;
            }
        }

        let parity_bit = if winner_deviation * theoretical_bias > 0.0 {
            0
        } else {
            1
        };

        // Scatter the winning round key into master-key positions
        let selection = self.cipher.key_selection(self.rounds - 1)?;
        let mut partial_key = BitVector::new(self.cipher.key_size())?;
        for (i, &position) in selection.iter().enumerate() {
            partial_key.set_bit(position, candidates[winner].get_bit(i)?)?;
        }

        Ok(RecoveredKey {
            partial_key,
            parity_bit,
            deviation: winner_deviation,
        })
    }
}
