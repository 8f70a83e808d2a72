//! I/O scalarization.
//!
//! Splits vector shader I/O into per-channel accesses so later stages can
//! drop unused channels and pack varyings tightly.
//!
//! # Variants
//!
//! - **Late** (`late.rs`): after I/O flattening, rewrites multi-component
//!   `load_input` / `store_output` intrinsics into single-channel ones
//! - **Early** (`early.rs`): before flattening, splits the variables behind
//!   deref-based loads, stores and interpolations into per-channel shadow
//!   variables
//!
//! Both recombine split loads with a vector construct, so readers of the
//! original value are untouched, and emit one single-channel store per set
//! write-mask bit.

pub mod early;
pub mod late;

use crate::ir::shader::{Shader, VariableMode};
use crate::opt::ShaderPass;

pub use early::lower_io_to_scalar_early;
pub use late::lower_io_to_scalar;

// =============================================================================
// Statistics
// =============================================================================

/// Statistics from scalarization passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScalarizeStats {
    /// Multi-component loads and interpolations split.
    pub loads_split: usize,
    /// Multi-component stores split.
    pub stores_split: usize,
    /// Single-channel accesses emitted.
    pub channels_emitted: usize,
    /// Store channels skipped because their write-mask bit was clear.
    pub masked_channels_skipped: usize,
    /// Variables replaced by channel variables.
    pub variables_split: usize,
}

impl ScalarizeStats {
    /// Merge statistics from another instance.
    pub fn merge(&mut self, other: &ScalarizeStats) {
        self.loads_split += other.loads_split;
        self.stores_split += other.stores_split;
        self.channels_emitted += other.channels_emitted;
        self.masked_channels_skipped += other.masked_channels_skipped;
        self.variables_split += other.variables_split;
    }

    /// Whether anything was rewritten.
    pub fn changed(&self) -> bool {
        self.loads_split + self.stores_split > 0
    }
}

// =============================================================================
// Passes
// =============================================================================

/// Late scalarization pass over flat I/O intrinsics.
#[derive(Debug, Clone)]
pub struct LowerIoToScalar {
    modes: VariableMode,
    stats: ScalarizeStats,
}

impl LowerIoToScalar {
    pub fn new(modes: VariableMode) -> Self {
        Self {
            modes,
            stats: ScalarizeStats::default(),
        }
    }

    pub fn modes(&self) -> VariableMode {
        self.modes
    }

    /// Get accumulated statistics.
    pub fn stats(&self) -> &ScalarizeStats {
        &self.stats
    }
}

impl ShaderPass for LowerIoToScalar {
    fn name(&self) -> &'static str {
        "lower_io_to_scalar"
    }

    fn run(&mut self, shader: &mut Shader) -> bool {
        let stats = late::run(shader, self.modes);
        self.stats.merge(&stats);
        stats.changed()
    }
}

/// Early scalarization pass over variable derefs.
#[derive(Debug, Clone)]
pub struct LowerIoToScalarEarly {
    modes: VariableMode,
    stats: ScalarizeStats,
}

impl LowerIoToScalarEarly {
    pub fn new(modes: VariableMode) -> Self {
        Self {
            modes,
            stats: ScalarizeStats::default(),
        }
    }

    pub fn modes(&self) -> VariableMode {
        self.modes
    }

    /// Get accumulated statistics.
    pub fn stats(&self) -> &ScalarizeStats {
        &self.stats
    }
}

impl ShaderPass for LowerIoToScalarEarly {
    fn name(&self) -> &'static str {
        "lower_io_to_scalar_early"
    }

    fn run(&mut self, shader: &mut Shader) -> bool {
        let stats = early::run(shader, self.modes);
        self.stats.merge(&stats);
        stats.changed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_merge() {
        let mut total = ScalarizeStats::default();
        assert!(!total.changed());

        total.merge(&ScalarizeStats {
            loads_split: 1,
            channels_emitted: 3,
            ..Default::default()
        });
        total.merge(&ScalarizeStats {
            stores_split: 2,
            channels_emitted: 4,
            masked_channels_skipped: 1,
            ..Default::default()
        });

        assert!(total.changed());
        assert_eq!(total.channels_emitted, 7);
        assert_eq!(total.masked_channels_skipped, 1);
    }

    #[test]
    fn test_pass_names() {
        let late = LowerIoToScalar::new(VariableMode::SHADER_IN);
        let early = LowerIoToScalarEarly::new(VariableMode::SHADER_OUT);
        assert_eq!(late.name(), "lower_io_to_scalar");
        assert_eq!(early.name(), "lower_io_to_scalar_early");
        assert_eq!(early.modes(), VariableMode::SHADER_OUT);
    }
}
