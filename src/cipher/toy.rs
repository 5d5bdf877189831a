//! Minimal 4-bit Feistel networks.
//!
//! Both networks share the same geometry: 4-bit blocks, a single 2x2
//! S-box, identity placements everywhere and two rounds keyed by disjoint
//! slices of an 8-bit master key. They are small enough to verify round
//! arithmetic and attack statistics by hand.

use std::sync::Arc;

use crate::bitvector::BitVector;
use crate::error::Result;
use crate::feistel::{Feistel, FeistelConfig};
use crate::sbox::Sbox;

/// The affine network: its S-box is `x ^ 1`, so every non-trivial linear
/// approximation is deterministic.
pub fn network(master_key: BitVector) -> Result<Feistel> {
    build(vec![1, 0, 3, 2], master_key)
}

/// The non-linear variant: its S-box is the AND of the two input bits.
/// Useful where an affine S-box would make every key guess look equally
/// good.
pub fn nonlinear(master_key: BitVector) -> Result<Feistel> {
    build(vec![0, 0, 0, 1], master_key)
}

fn build(table: Vec<u64>, master_key: BitVector) -> Result<Feistel> {
    let sbox = Arc::new(Sbox::new(2, 2, table)?);

    Feistel::new(FeistelConfig {
        block_size: 4,
        max_rounds: 2,
        initial_permutation: (0..4).collect(),
        final_permutation: (0..4).collect(),
        sboxes: vec![sbox],
        expansion: vec![0, 1],
        post_sbox: vec![0, 1],
        key_size: 8,
        key_schedule: vec![vec![0, 1], vec![2, 3]],
        master_key,
    })
}
