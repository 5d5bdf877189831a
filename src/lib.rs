//! Building blocks for linear cryptanalysis of DES-style Feistel
//! networks: GF(2) bit vectors, placement layers, S-boxes with linear
//! approximation tables, a parametric Feistel model, Matsui's two key
//! recovery algorithms and a branch-and-bound trail search.

pub mod attack;
pub mod bitvector;
pub mod cancel;
pub mod cipher;
pub mod error;
pub mod feistel;
pub mod placement;
pub mod sbox;
pub mod trail;

pub use crate::bitvector::BitVector;
pub use crate::error::{Error, Result};
