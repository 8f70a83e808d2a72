//! Shader optimization passes.
//!
//! # Passes
//!
//! - **Scalarize** (`scalarize/`): split vector I/O into per-channel accesses,
//!   either on flat intrinsics (late) or on the variables themselves (early)
//! - **Vectorize** (`vectorize/`): merge independent scalar ALU work back into
//!   vector instructions, scoped by dominance
//! - **Pipeline** (`pipeline.rs`): phase ordering, fixed-point iteration,
//!   verification between passes

pub mod pipeline;
pub mod scalarize;
pub mod vectorize;

use crate::ir::shader::Shader;

pub use pipeline::{PassPhase, PassStat, Pipeline, PipelineConfig, PipelineError, PipelineStats};
pub use scalarize::{
    lower_io_to_scalar, lower_io_to_scalar_early, LowerIoToScalar, LowerIoToScalarEarly,
    ScalarizeStats,
};
pub use vectorize::{opt_vectorize, Vectorize, VectorizeConfig, VectorizeStats};

/// A transformation over a whole shader.
pub trait ShaderPass {
    /// Short name for logs and statistics.
    fn name(&self) -> &'static str;

    /// Run the pass; returns whether the shader changed.
    fn run(&mut self, shader: &mut Shader) -> bool;
}
