//! Vectorization of independent scalar ALU work.
//!
//! Instructions with the same opcode, bit size and source values (swizzles
//! aside) are merged into one wider instruction whose lanes hold each
//! original result, up to four lanes.
//!
//! # Module Structure
//!
//! - `class`: eligibility and the equivalence-class key
//! - `combine`: merging two class members and redirecting their readers
//! - `walker`: dominance-scoped class stacks driven by a dominator-tree walk
//!
//! # Example
//!
//! ```text
//! Before:
//!   r0 = fadd a.x, b.x
//!   r1 = fadd a.y, b.y
//!   store_output r0 ...
//!
//! After:
//!   r01 = fadd a.xy, b.xy
//!   t0  = mov r01.x
//!   store_output t0 ...
//! ```
//!
//! One walk already reaches a fixed point: wide results stay eligible and
//! readers rewired by a combine are re-classified under their new sources.

pub mod class;
pub mod combine;
pub mod walker;

use crate::ir::operators::MAX_VEC_COMPONENTS;
use crate::ir::shader::Shader;
use crate::opt::ShaderPass;

pub use class::{instr_can_rewrite, ClassKey};
pub use combine::{try_combine, Combined};
pub use walker::vectorize_function;

/// Merge equivalent scalar ALU instructions across `shader`.
///
/// Returns whether anything was combined; a second run over an unchanged
/// shader reports no progress.
pub fn opt_vectorize(shader: &mut Shader) -> bool {
    Vectorize::new().run(shader)
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the vectorizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorizeConfig {
    /// Widest result a combine may produce.
    pub max_components: u8,
}

impl Default for VectorizeConfig {
    fn default() -> Self {
        Self {
            max_components: MAX_VEC_COMPONENTS as u8,
        }
    }
}

impl VectorizeConfig {
    /// Limit combined results to `max_components`, clamped to `1..=4`.
    pub fn with_max_components(max_components: u8) -> Self {
        Self {
            max_components: max_components.clamp(1, MAX_VEC_COMPONENTS as u8),
        }
    }

    /// Pairs only, for targets with two-wide ALUs.
    pub fn narrow() -> Self {
        Self::with_max_components(2)
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Statistics from vectorization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorizeStats {
    /// Successful combines; each removes one instruction net.
    pub instructions_combined: usize,
    /// Lane extractions emitted for non-ALU readers and branch conditions.
    pub extractions_emitted: usize,
    /// Combine attempts refused by the width bound.
    pub width_rejections: usize,
    /// Stacked readers moved to a new class after a rewire.
    pub reclassified_consumers: usize,
}

impl VectorizeStats {
    /// Merge statistics from another instance.
    pub fn merge(&mut self, other: &VectorizeStats) {
        self.instructions_combined += other.instructions_combined;
        self.extractions_emitted += other.extractions_emitted;
        self.width_rejections += other.width_rejections;
        self.reclassified_consumers += other.reclassified_consumers;
    }
}

// =============================================================================
// Main Pass
// =============================================================================

/// Vectorization pass over every function of a shader.
#[derive(Debug, Clone, Default)]
pub struct Vectorize {
    config: VectorizeConfig,
    stats: VectorizeStats,
}

impl Vectorize {
    /// Create vectorization pass with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create vectorization pass with custom configuration.
    pub fn with_config(config: VectorizeConfig) -> Self {
        Self {
            config,
            stats: VectorizeStats::default(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &VectorizeConfig {
        &self.config
    }

    /// Get accumulated statistics.
    pub fn stats(&self) -> &VectorizeStats {
        &self.stats
    }
}

impl ShaderPass for Vectorize {
    fn name(&self) -> &'static str {
        "vectorize"
    }

    fn run(&mut self, shader: &mut Shader) -> bool {
        let mut stats = VectorizeStats::default();
        let mut progress = false;
        for func in &mut shader.functions {
            progress |= vectorize_function(func, self.config.max_components, &mut stats);
        }
        self.stats.merge(&stats);
        progress
    }
}
