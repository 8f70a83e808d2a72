//! Reference interpreter.
//!
//! Runs the first function of a shader over 32-bit lanes. Inputs, uniforms
//! and outputs are keyed by `(slot, component)`:
//! - flat intrinsics use `slot = base + offset`, `component = component + lane`
//! - deref accesses use `slot = location + flattened index` and
//!   `component = location_frac + lane`
//!
//! Both addressings agree for a variable whose driver location equals its
//! varying location, so a pass that only reshapes I/O leaves every
//! observable `(slot, component)` pair unchanged.

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::cfg::Terminator;
use super::function::Function;
use super::instr::{AluInstr, DerefKind, InstrId, InstrKind, IntrinsicInstr, ValueId};
use super::operators::{AluOp, Intrinsic, MAX_VEC_COMPONENTS};
use super::shader::{Shader, VarId, VariableMode};

/// Lane values of one SSA value.
pub type Lanes = [u32; MAX_VEC_COMPONENTS];

/// Instruction budget before execution is abandoned.
pub const DEFAULT_STEP_LIMIT: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("shader has no function to run")]
    NoFunction,

    #[error("{instr:?} operates on unsupported {bit_size}-bit values")]
    UnsupportedBitSize { instr: InstrId, bit_size: u8 },

    #[error("{value:?} read before it was defined")]
    UndefinedValue { value: ValueId },

    #[error("{value:?} is not a deref")]
    NotADeref { value: ValueId },

    #[error("execution exceeded {0} steps")]
    StepLimit(usize),
}

/// External state the shader reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IoState {
    pub inputs: FxHashMap<(u32, u8), u32>,
    pub uniforms: FxHashMap<(u32, u8), u32>,
    pub outputs: FxHashMap<(u32, u8), u32>,
}

impl IoState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_input_f32(&mut self, slot: u32, component: u8, value: f32) {
        self.inputs.insert((slot, component), value.to_bits());
    }

    pub fn output_f32(&self, slot: u32, component: u8) -> Option<f32> {
        self.outputs.get(&(slot, component)).map(|&bits| f32::from_bits(bits))
    }
}

/// Location a deref chain resolves to.
#[derive(Debug, Clone, Copy)]
struct Place {
    var: VarId,
    slot_offset: u32,
}

/// Execute `shader`'s first function against `io`.
pub fn run(shader: &Shader, io: &mut IoState) -> Result<(), EvalError> {
    run_with_limit(shader, io, DEFAULT_STEP_LIMIT)
}

pub fn run_with_limit(shader: &Shader, io: &mut IoState, step_limit: usize) -> Result<(), EvalError> {
    let func = shader.functions.first().ok_or(EvalError::NoFunction)?;
    let mut machine = Machine {
        shader,
        func,
        values: FxHashMap::default(),
        places: FxHashMap::default(),
        steps: 0,
        step_limit,
    };

    let mut block = func.entry();
    loop {
        for &id in &func.block(block).instrs {
            machine.step(id, io)?;
        }
        match func.block(block).terminator {
            Terminator::Jump(target) => block = target,
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => {
                block = if machine.read(cond)?[0] != 0 {
                    then_block
                } else {
                    else_block
                };
            }
            Terminator::Return => return Ok(()),
        }
    }
}

struct Machine<'a> {
    shader: &'a Shader,
    func: &'a Function,
    values: FxHashMap<ValueId, Lanes>,
    places: FxHashMap<ValueId, Place>,
    steps: usize,
    step_limit: usize,
}

impl Machine<'_> {
    fn read(&self, value: ValueId) -> Result<Lanes, EvalError> {
        self.values
            .get(&value)
            .copied()
            .ok_or(EvalError::UndefinedValue { value })
    }

    fn place(&self, value: ValueId) -> Result<Place, EvalError> {
        self.places
            .get(&value)
            .copied()
            .ok_or(EvalError::NotADeref { value })
    }

    fn step(&mut self, id: InstrId, io: &mut IoState) -> Result<(), EvalError> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(EvalError::StepLimit(self.step_limit));
        }

        let func = self.func;
        let instr = func.instr(id);
        let result = match &instr.kind {
            InstrKind::Alu(alu) => {
                let bit_size = instr
                    .dest
                    .map_or(32, |dest| func.value(dest).bit_size);
                if bit_size != 32 {
                    return Err(EvalError::UnsupportedBitSize { instr: id, bit_size });
                }
                Some(self.alu(id, alu)?)
            }
            InstrKind::Intrinsic(intr) => self.intrinsic(intr, io)?,
            InstrKind::Deref(deref) => {
                let place = match deref.kind {
                    DerefKind::Var(var) => Place { var, slot_offset: 0 },
                    DerefKind::Array { parent, index } => {
                        let parent_place = self.place(parent)?;
                        let stride = deref.ty.slot_count();
                        Place {
                            var: parent_place.var,
                            slot_offset: parent_place.slot_offset + self.read(index)?[0] * stride,
                        }
                    }
                };
                if let Some(dest) = instr.dest {
                    self.places.insert(dest, place);
                }
                None
            }
            InstrKind::LoadConst(bits) => {
                let mut lanes = [0; MAX_VEC_COMPONENTS];
                lanes[..bits.len()].copy_from_slice(bits);
                Some(lanes)
            }
            InstrKind::Undef => Some([0; MAX_VEC_COMPONENTS]),
        };

        if let (Some(dest), Some(lanes)) = (instr.dest, result) {
            self.values.insert(dest, lanes);
        }
        Ok(())
    }

    fn alu(&self, id: InstrId, alu: &AluInstr) -> Result<Lanes, EvalError> {
        let width = self
            .func
            .instr(id)
            .dest
            .map_or(1, |dest| self.func.value(dest).num_components as usize);

        // Gather each source through its swizzle.
        let mut srcs = [[0u32; MAX_VEC_COMPONENTS]; 4];
        for (slot, src) in alu.srcs.iter().enumerate() {
            let raw = self.read(src.value)?;
            let read = self.func.alu_src_components(id, slot) as usize;
            for lane in 0..read {
                srcs[slot][lane] = raw[src.swizzle[lane] as usize];
            }
        }

        let mut out = [0u32; MAX_VEC_COMPONENTS];
        match alu.op {
            AluOp::Fdot2 | AluOp::Fdot3 | AluOp::Fdot4 => {
                let n = alu.op.info().input_sizes[0] as usize;
                let dot: f32 = (0..n).map(|i| f(srcs[0][i]) * f(srcs[1][i])).sum();
                out[0] = dot.to_bits();
            }
            AluOp::Vec2 | AluOp::Vec3 | AluOp::Vec4 => {
                for (lane, src) in srcs.iter().take(alu.srcs.len()).enumerate() {
                    out[lane] = src[0];
                }
            }
            op => {
                for lane in 0..width {
                    let a = srcs[0][lane];
                    let b = srcs[1][lane];
                    let c = srcs[2][lane];
                    out[lane] = elementwise(op, a, b, c);
                }
            }
        }
        Ok(out)
    }

    fn intrinsic(&self, intr: &IntrinsicInstr, io: &mut IoState) -> Result<Option<Lanes>, EvalError> {
        let n = intr.num_components as usize;
        let mut lanes = [0u32; MAX_VEC_COMPONENTS];
        match intr.intrinsic {
            Intrinsic::LoadInput | Intrinsic::LoadUniform => {
                let slot = intr.base + self.read(intr.srcs[0])?[0];
                let table = if intr.intrinsic == Intrinsic::LoadInput {
                    &io.inputs
                } else {
                    &io.uniforms
                };
                for (lane, out) in lanes.iter_mut().enumerate().take(n) {
                    let key = (slot, intr.component + lane as u8);
                    *out = table.get(&key).copied().unwrap_or(0);
                }
                Ok(Some(lanes))
            }
            Intrinsic::StoreOutput => {
                let value = self.read(intr.srcs[0])?;
                let slot = intr.base + self.read(intr.srcs[1])?[0];
                for lane in (0..n).filter(|&l| intr.write_mask & (1 << l) != 0) {
                    io.outputs
                        .insert((slot, intr.component + lane as u8), value[lane]);
                }
                Ok(None)
            }
            Intrinsic::LoadDeref
            | Intrinsic::InterpDerefAtCentroid
            | Intrinsic::InterpDerefAtSample
            | Intrinsic::InterpDerefAtOffset => {
                let (slot, frac, table) = self.deref_target(intr.srcs[0], io)?;
                for (lane, out) in lanes.iter_mut().enumerate().take(n) {
                    *out = table.get(&(slot, frac + lane as u8)).copied().unwrap_or(0);
                }
                Ok(Some(lanes))
            }
            Intrinsic::StoreDeref => {
                let place = self.place(intr.srcs[0])?;
                let var = &self.shader.variables[place.var];
                let slot = var.location.max(0) as u32 + place.slot_offset;
                let value = self.read(intr.srcs[1])?;
                for lane in (0..n).filter(|&l| intr.write_mask & (1 << l) != 0) {
                    io.outputs
                        .insert((slot, var.location_frac + lane as u8), value[lane]);
                }
                Ok(None)
            }
        }
    }

    /// Slot, first component and backing table of a deref read.
    fn deref_target<'io>(
        &self,
        deref: ValueId,
        io: &'io IoState,
    ) -> Result<(u32, u8, &'io FxHashMap<(u32, u8), u32>), EvalError> {
        let place = self.place(deref)?;
        let var = &self.shader.variables[place.var];
        let slot = var.location.max(0) as u32 + place.slot_offset;
        let table = if var.mode.contains(VariableMode::SHADER_OUT) {
            &io.outputs
        } else if var.mode.contains(VariableMode::UNIFORM) {
            &io.uniforms
        } else {
            &io.inputs
        };
        Ok((slot, var.location_frac, table))
    }
}

#[inline]
fn f(bits: u32) -> f32 {
    f32::from_bits(bits)
}

#[inline]
fn bool32(b: bool) -> u32 {
    if b {
        u32::MAX
    } else {
        0
    }
}

fn elementwise(op: AluOp, a: u32, b: u32, c: u32) -> u32 {
    let (ia, ib) = (a as i32, b as i32);
    match op {
        AluOp::Mov => a,
        AluOp::Fadd => (f(a) + f(b)).to_bits(),
        AluOp::Fsub => (f(a) - f(b)).to_bits(),
        AluOp::Fmul => (f(a) * f(b)).to_bits(),
        AluOp::Fneg => (-f(a)).to_bits(),
        AluOp::Fabs => f(a).abs().to_bits(),
        AluOp::Fmin => f(a).min(f(b)).to_bits(),
        AluOp::Fmax => f(a).max(f(b)).to_bits(),
        AluOp::Ffma => f(a).mul_add(f(b), f(c)).to_bits(),
        AluOp::Iadd => ia.wrapping_add(ib) as u32,
        AluOp::Isub => ia.wrapping_sub(ib) as u32,
        AluOp::Imul => ia.wrapping_mul(ib) as u32,
        AluOp::Ineg => ia.wrapping_neg() as u32,
        AluOp::Iand => a & b,
        AluOp::Ior => a | b,
        AluOp::Ixor => a ^ b,
        AluOp::Flt => bool32(f(a) < f(b)),
        AluOp::Fge => bool32(f(a) >= f(b)),
        AluOp::Feq => bool32(f(a) == f(b)),
        AluOp::Ilt => bool32(ia < ib),
        AluOp::Ieq => bool32(a == b),
        AluOp::Bcsel => {
            if a != 0 {
                b
            } else {
                c
            }
        }
        AluOp::Fdot2 | AluOp::Fdot3 | AluOp::Fdot4 | AluOp::Vec2 | AluOp::Vec3 | AluOp::Vec4 => {
            unreachable!("{op} is not elementwise")
        }
    }
}
