//! Shader IR optimizer: I/O scalarization and SSA re-vectorization.
//!
//! - SSA shader IR with explicit def/use back-references
//! - Late and early I/O scalarizers
//! - Dominance-scoped peephole vectorizer
//! - Phase-ordered pass pipeline with verification
#![deny(unsafe_code)]
pub mod ir;
pub mod opt;

pub use opt::{lower_io_to_scalar, lower_io_to_scalar_early, opt_vectorize};
