//! Ready-made network configurations.

pub mod des;
pub mod toy;
