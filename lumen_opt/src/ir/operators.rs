//! ALU opcodes and I/O intrinsics.
//!
//! Every ALU opcode carries an `OpInfo` row describing its operand shape:
//! - **Per-component** ops (`output_size == 0`) compute lane `i` of the result
//!   from lane `i` of each source, so their width is free
//! - **Fixed-width** ops (dot products, vector constructs) have an explicit
//!   output or input size and cannot be widened
//!
//! Intrinsics describe their source layout and which constant indices
//! (base, component, write-mask) they use.

use super::types::BaseType;

/// Maximum number of channels in an SSA value.
pub const MAX_VEC_COMPONENTS: usize = 4;

// =============================================================================
// ALU Operators
// =============================================================================

/// ALU opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    /// Copy with swizzle.
    Mov,
    Fadd,
    Fsub,
    Fmul,
    Fneg,
    Fabs,
    Fmin,
    Fmax,
    Ffma,
    Iadd,
    Isub,
    Imul,
    Ineg,
    Iand,
    Ior,
    Ixor,
    Flt,
    Fge,
    Feq,
    Ilt,
    Ieq,
    /// `cond ? a : b`, lane-wise.
    Bcsel,
    Fdot2,
    Fdot3,
    Fdot4,
    Vec2,
    Vec3,
    Vec4,
}

/// Static operand-shape description of an ALU opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    pub name: &'static str,
    pub num_inputs: u8,
    /// Result width, or 0 when the result is as wide as the instruction.
    pub output_size: u8,
    /// Per-source width, 0 meaning per-component.
    pub input_sizes: [u8; MAX_VEC_COMPONENTS],
    pub output_type: BaseType,
}

const fn elementwise(name: &'static str, num_inputs: u8, output_type: BaseType) -> OpInfo {
    OpInfo {
        name,
        num_inputs,
        output_size: 0,
        input_sizes: [0; MAX_VEC_COMPONENTS],
        output_type,
    }
}

const fn fixed(
    name: &'static str,
    num_inputs: u8,
    output_size: u8,
    input_size: u8,
    output_type: BaseType,
) -> OpInfo {
    let mut input_sizes = [0; MAX_VEC_COMPONENTS];
    let mut i = 0;
    while i < num_inputs as usize {
        input_sizes[i] = input_size;
        i += 1;
    }
    OpInfo {
        name,
        num_inputs,
        output_size,
        input_sizes,
        output_type,
    }
}

impl AluOp {
    pub const fn info(self) -> OpInfo {
        use BaseType::*;
        match self {
            AluOp::Mov => elementwise("mov", 1, Uint),
            AluOp::Fadd => elementwise("fadd", 2, Float),
            AluOp::Fsub => elementwise("fsub", 2, Float),
            AluOp::Fmul => elementwise("fmul", 2, Float),
            AluOp::Fneg => elementwise("fneg", 1, Float),
            AluOp::Fabs => elementwise("fabs", 1, Float),
            AluOp::Fmin => elementwise("fmin", 2, Float),
            AluOp::Fmax => elementwise("fmax", 2, Float),
            AluOp::Ffma => elementwise("ffma", 3, Float),
            AluOp::Iadd => elementwise("iadd", 2, Int),
            AluOp::Isub => elementwise("isub", 2, Int),
            AluOp::Imul => elementwise("imul", 2, Int),
            AluOp::Ineg => elementwise("ineg", 1, Int),
            AluOp::Iand => elementwise("iand", 2, Uint),
            AluOp::Ior => elementwise("ior", 2, Uint),
            AluOp::Ixor => elementwise("ixor", 2, Uint),
            AluOp::Flt => elementwise("flt", 2, Bool),
            AluOp::Fge => elementwise("fge", 2, Bool),
            AluOp::Feq => elementwise("feq", 2, Bool),
            AluOp::Ilt => elementwise("ilt", 2, Bool),
            AluOp::Ieq => elementwise("ieq", 2, Bool),
            AluOp::Bcsel => elementwise("bcsel", 3, Uint),
            AluOp::Fdot2 => fixed("fdot2", 2, 1, 2, Float),
            AluOp::Fdot3 => fixed("fdot3", 2, 1, 3, Float),
            AluOp::Fdot4 => fixed("fdot4", 2, 1, 4, Float),
            AluOp::Vec2 => fixed("vec2", 2, 2, 1, Uint),
            AluOp::Vec3 => fixed("vec3", 3, 3, 1, Uint),
            AluOp::Vec4 => fixed("vec4", 4, 4, 1, Uint),
        }
    }

    #[inline]
    pub const fn num_inputs(self) -> usize {
        self.info().num_inputs as usize
    }

    #[inline]
    pub const fn is_move(self) -> bool {
        matches!(self, AluOp::Mov)
    }

    /// Vector-construct opcode for `n` scalars (2..=4).
    pub fn vec(n: usize) -> AluOp {
        match n {
            2 => AluOp::Vec2,
            3 => AluOp::Vec3,
            4 => AluOp::Vec4,
            _ => panic!("no vector-construct opcode for {n} components"),
        }
    }

    /// Whether every source and the result are per-component.
    pub const fn is_elementwise(self) -> bool {
        let info = self.info();
        if info.output_size != 0 {
            return false;
        }
        let mut i = 0;
        while i < info.num_inputs as usize {
            if info.input_sizes[i] != 0 {
                return false;
            }
            i += 1;
        }
        true
    }
}

impl std::fmt::Display for AluOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.info().name)
    }
}

// =============================================================================
// Intrinsics
// =============================================================================

/// I/O intrinsic kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// `load_input [offset]`, flat I/O.
    LoadInput,
    /// `store_output [value, offset]`, flat I/O.
    StoreOutput,
    /// `load_uniform [offset]`, flat I/O.
    LoadUniform,
    /// `load_deref [deref]`.
    LoadDeref,
    /// `store_deref [deref, value]`.
    StoreDeref,
    /// `interp_deref_at_centroid [deref]`.
    InterpDerefAtCentroid,
    /// `interp_deref_at_sample [deref, sample]`.
    InterpDerefAtSample,
    /// `interp_deref_at_offset [deref, offset]`.
    InterpDerefAtOffset,
}

impl Intrinsic {
    pub const fn name(self) -> &'static str {
        match self {
            Intrinsic::LoadInput => "load_input",
            Intrinsic::StoreOutput => "store_output",
            Intrinsic::LoadUniform => "load_uniform",
            Intrinsic::LoadDeref => "load_deref",
            Intrinsic::StoreDeref => "store_deref",
            Intrinsic::InterpDerefAtCentroid => "interp_deref_at_centroid",
            Intrinsic::InterpDerefAtSample => "interp_deref_at_sample",
            Intrinsic::InterpDerefAtOffset => "interp_deref_at_offset",
        }
    }

    pub const fn num_srcs(self) -> usize {
        match self {
            Intrinsic::LoadInput
            | Intrinsic::LoadUniform
            | Intrinsic::LoadDeref
            | Intrinsic::InterpDerefAtCentroid => 1,
            Intrinsic::StoreOutput
            | Intrinsic::StoreDeref
            | Intrinsic::InterpDerefAtSample
            | Intrinsic::InterpDerefAtOffset => 2,
        }
    }

    pub const fn has_dest(self) -> bool {
        !matches!(self, Intrinsic::StoreOutput | Intrinsic::StoreDeref)
    }

    /// Whether the first source is a deref rather than an offset.
    pub const fn is_deref_access(self) -> bool {
        matches!(
            self,
            Intrinsic::LoadDeref
                | Intrinsic::StoreDeref
                | Intrinsic::InterpDerefAtCentroid
                | Intrinsic::InterpDerefAtSample
                | Intrinsic::InterpDerefAtOffset
        )
    }

    pub const fn is_interp(self) -> bool {
        matches!(
            self,
            Intrinsic::InterpDerefAtCentroid
                | Intrinsic::InterpDerefAtSample
                | Intrinsic::InterpDerefAtOffset
        )
    }

    pub const fn has_base(self) -> bool {
        matches!(
            self,
            Intrinsic::LoadInput | Intrinsic::StoreOutput | Intrinsic::LoadUniform
        )
    }

    pub const fn has_component(self) -> bool {
        matches!(self, Intrinsic::LoadInput | Intrinsic::StoreOutput)
    }

    pub const fn has_write_mask(self) -> bool {
        matches!(self, Intrinsic::StoreOutput | Intrinsic::StoreDeref)
    }

    /// Index of the stored value source, for stores.
    pub const fn value_src(self) -> Option<usize> {
        match self {
            Intrinsic::StoreOutput => Some(0),
            Intrinsic::StoreDeref => Some(1),
            _ => None,
        }
    }
}

impl std::fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
