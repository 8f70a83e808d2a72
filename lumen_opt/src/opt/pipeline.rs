//! Shader Pass Pipeline.
//!
//! Orders the scalarization and vectorization passes around the host's I/O
//! lowering and optionally validates the shader after every pass.
//!
//! # Pass Phases
//!
//! 1. **PreIoLowering**: early scalarization of I/O variables
//! 2. **PostIoLowering**: late scalarization of flat I/O intrinsics
//! 3. **Optimize**: vectorization, iterated to a fixed point
//!
//! `run` executes every phase back to back. Callers that flatten I/O
//! themselves run `PreIoLowering`, lower, then the remaining phases through
//! `run_phase`.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

use super::scalarize::{LowerIoToScalar, LowerIoToScalarEarly};
use super::vectorize::{Vectorize, VectorizeConfig};
use super::ShaderPass;
use crate::ir::shader::{Shader, VariableMode};
use crate::ir::verify::{verify_shader, VerifyError};

// =============================================================================
// Pass Phase
// =============================================================================

/// Phase of the shader pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PassPhase {
    /// Before I/O variables are flattened into intrinsics.
    PreIoLowering,
    /// After I/O flattening.
    PostIoLowering,
    /// Cleanup and re-vectorization, run to a fixed point.
    Optimize,
}

impl PassPhase {
    pub const ALL: [PassPhase; 3] = [
        PassPhase::PreIoLowering,
        PassPhase::PostIoLowering,
        PassPhase::Optimize,
    ];
}

// =============================================================================
// Pass Entry
// =============================================================================

/// A registered pass in the pipeline.
struct PassEntry {
    pass: Box<dyn ShaderPass>,
    phase: PassPhase,
    runs: usize,
    changes: usize,
    time: Duration,
}

impl PassEntry {
    fn new<P: ShaderPass + 'static>(pass: P, phase: PassPhase) -> Self {
        Self {
            pass: Box::new(pass),
            phase,
            runs: 0,
            changes: 0,
            time: Duration::ZERO,
        }
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

/// Configuration for the shader pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Modes split by early scalarization; empty disables the pass.
    pub early_scalarize_modes: VariableMode,

    /// Modes split by late scalarization; empty disables the pass.
    pub late_scalarize_modes: VariableMode,

    /// Enable the vectorizer.
    pub enable_vectorize: bool,

    /// Vectorizer settings.
    pub vectorize: VectorizeConfig,

    /// Maximum rounds of the Optimize phase.
    pub max_optimize_iterations: usize,

    /// Validate the shader after every pass.
    pub verify_after_each_pass: bool,

    /// Collect timing statistics.
    pub collect_timing: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            early_scalarize_modes: VariableMode::empty(),
            late_scalarize_modes: VariableMode::SHADER_IN | VariableMode::SHADER_OUT,
            enable_vectorize: true,
            vectorize: VectorizeConfig::default(),
            max_optimize_iterations: 4,
            verify_after_each_pass: cfg!(debug_assertions),
            collect_timing: true,
        }
    }
}

impl PipelineConfig {
    /// Late scalarization only.
    pub fn minimal() -> Self {
        Self {
            enable_vectorize: false,
            max_optimize_iterations: 1,
            verify_after_each_pass: false,
            collect_timing: false,
            ..Default::default()
        }
    }

    /// Every pass, verified after each run.
    pub fn full() -> Self {
        Self {
            early_scalarize_modes: VariableMode::SHADER_IN | VariableMode::SHADER_OUT,
            max_optimize_iterations: 8,
            verify_after_each_pass: true,
            ..Default::default()
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Failure surfaced by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("shader invalid after `{pass}`: {source}")]
    Verify {
        pass: &'static str,
        #[source]
        source: VerifyError,
    },
}

// =============================================================================
// Pipeline
// =============================================================================

/// The shader pass pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    passes: Vec<PassEntry>,
}

impl Pipeline {
    /// Create a new pipeline with default configuration.
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    /// Create a pipeline with custom configuration.
    pub fn with_config(config: PipelineConfig) -> Self {
        let mut pipeline = Self {
            config,
            passes: Vec::new(),
        };
        pipeline.register_default_passes();
        pipeline
    }

    fn register_default_passes(&mut self) {
        if !self.config.early_scalarize_modes.is_empty() {
            let pass = LowerIoToScalarEarly::new(self.config.early_scalarize_modes);
            self.register(pass, PassPhase::PreIoLowering);
        }
        if !self.config.late_scalarize_modes.is_empty() {
            let pass = LowerIoToScalar::new(self.config.late_scalarize_modes);
            self.register(pass, PassPhase::PostIoLowering);
        }
        if self.config.enable_vectorize {
            let pass = Vectorize::with_config(self.config.vectorize.clone());
            self.register(pass, PassPhase::Optimize);
        }
    }

    /// Register a custom pass.
    pub fn register<P: ShaderPass + 'static>(&mut self, pass: P, phase: PassPhase) {
        self.passes.push(PassEntry::new(pass, phase));
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every phase in order.
    pub fn run(&mut self, shader: &mut Shader) -> Result<PipelineStats, PipelineError> {
        let start = Instant::now();
        let mut stats = PipelineStats {
            initial_instructions: count_instructions(shader),
            ..Default::default()
        };

        for phase in PassPhase::ALL {
            self.run_phase(shader, phase, &mut stats)?;
        }

        stats.total_time = start.elapsed();
        stats.final_instructions = count_instructions(shader);
        info!(
            passes_run = stats.passes_run,
            passes_changed = stats.passes_changed,
            optimize_iterations = stats.optimize_iterations,
            initial = stats.initial_instructions,
            final_count = stats.final_instructions,
            "shader pipeline finished"
        );
        Ok(stats)
    }

    /// Run the passes of one phase. Returns whether any of them changed the
    /// shader.
    ///
    /// The Optimize phase repeats until a round makes no change or
    /// `max_optimize_iterations` rounds have run; other phases run once.
    pub fn run_phase(
        &mut self,
        shader: &mut Shader,
        phase: PassPhase,
        stats: &mut PipelineStats,
    ) -> Result<bool, PipelineError> {
        let rounds = match phase {
            PassPhase::Optimize => self.config.max_optimize_iterations.max(1),
            _ => 1,
        };

        let mut phase_changed = false;
        for _ in 0..rounds {
            let round_changed = self.run_round(shader, phase, stats)?;
            if phase == PassPhase::Optimize {
                stats.optimize_iterations += 1;
            }
            if !round_changed {
                break;
            }
            phase_changed = true;
        }

        stats.phases_run += 1;
        debug!(?phase, changed = phase_changed, "phase complete");
        Ok(phase_changed)
    }

    fn run_round(
        &mut self,
        shader: &mut Shader,
        phase: PassPhase,
        stats: &mut PipelineStats,
    ) -> Result<bool, PipelineError> {
        let mut changed = false;
        for entry in self.passes.iter_mut().filter(|e| e.phase == phase) {
            let start = self.config.collect_timing.then(Instant::now);
            let pass_changed = entry.pass.run(shader);
            if let Some(start) = start {
                entry.time += start.elapsed();
            }

            entry.runs += 1;
            stats.passes_run += 1;
            if pass_changed {
                entry.changes += 1;
                stats.passes_changed += 1;
                changed = true;
            }

            if self.config.verify_after_each_pass {
                let pass = entry.pass.name();
                verify_shader(shader).map_err(|source| PipelineError::Verify { pass, source })?;
            }
        }
        Ok(changed)
    }

    /// Get pass statistics.
    pub fn pass_stats(&self) -> Vec<PassStat> {
        self.passes
            .iter()
            .map(|e| PassStat {
                name: e.pass.name(),
                phase: e.phase,
                runs: e.runs,
                changes: e.changes,
                time: e.time,
            })
            .collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn count_instructions(shader: &Shader) -> usize {
    shader.functions.iter().map(|f| f.live_instrs().count()).sum()
}

// =============================================================================
// Statistics
// =============================================================================

/// Statistics from a single pass.
#[derive(Debug, Clone)]
pub struct PassStat {
    pub name: &'static str,
    pub phase: PassPhase,
    /// Number of times run.
    pub runs: usize,
    /// Number of runs that changed the shader.
    pub changes: usize,
    pub time: Duration,
}

/// Statistics from a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub phases_run: usize,
    pub passes_run: usize,
    pub passes_changed: usize,
    /// Rounds of the Optimize phase.
    pub optimize_iterations: usize,
    pub total_time: Duration,
    pub initial_instructions: usize,
    pub final_instructions: usize,
}

impl PipelineStats {
    /// Final over initial instruction count.
    pub fn size_ratio(&self) -> f64 {
        if self.initial_instructions == 0 {
            1.0
        } else {
            self.final_instructions as f64 / self.initial_instructions as f64
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
