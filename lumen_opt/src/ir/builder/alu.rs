use smallvec::SmallVec;

use super::Builder;
use crate::ir::instr::{AluInstr, AluSrc, InstrKind, ValueId, IDENTITY_SWIZZLE};
use crate::ir::operators::AluOp;

/// Builder trait for ALU instructions, constants and lane shuffles.
pub trait AluBuilder {
    // Generic
    fn alu(&mut self, op: AluOp, srcs: &[ValueId]) -> ValueId;
    fn alu_swizzled(&mut self, op: AluOp, srcs: &[AluSrc], num_components: u8) -> ValueId;

    // Elementwise helpers
    fn fadd(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId;
    fn fsub(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId;
    fn fmul(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId;
    fn fneg(&mut self, value: ValueId) -> ValueId;
    fn iadd(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId;
    fn imul(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId;
    fn flt(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId;
    fn bcsel(&mut self, cond: ValueId, then_value: ValueId, else_value: ValueId) -> ValueId;

    // Constants
    fn imm_f32(&mut self, value: f32) -> ValueId;
    fn imm_u32(&mut self, value: u32) -> ValueId;
    fn imm_vec_f32(&mut self, values: &[f32]) -> ValueId;
    fn undef(&mut self, num_components: u8, bit_size: u8) -> ValueId;

    // Lane shuffles
    fn mov(&mut self, src: AluSrc, num_components: u8) -> ValueId;
    fn vec(&mut self, scalars: &[ValueId]) -> ValueId;
    fn channel(&mut self, value: ValueId, lane: u8) -> ValueId;
    fn swizzle(&mut self, value: ValueId, lanes: &[u8]) -> ValueId;
    fn ssa_for_src(&mut self, src: AluSrc, num_components: u8) -> ValueId;
}

impl AluBuilder for Builder<'_> {
    fn alu(&mut self, op: AluOp, srcs: &[ValueId]) -> ValueId {
        let info = op.info();
        assert_eq!(
            srcs.len(),
            info.num_inputs as usize,
            "{op} takes {} sources",
            info.num_inputs
        );
        let num_components = if info.output_size != 0 {
            info.output_size
        } else {
            srcs.iter()
                .zip(info.input_sizes.iter())
                .filter(|(_, size)| **size == 0)
                .map(|(&v, _)| self.components(v))
                .max()
                .unwrap_or(1)
        };
        // Scalars broadcast across the instruction's lanes.
        let srcs: SmallVec<[AluSrc; 3]> = srcs
            .iter()
            .map(|&v| match self.components(v) {
                1 => AluSrc::channel(v, 0),
                _ => AluSrc::new(v),
            })
            .collect();
        self.alu_swizzled(op, &srcs, num_components)
    }

    fn alu_swizzled(&mut self, op: AluOp, srcs: &[AluSrc], num_components: u8) -> ValueId {
        let bit_size = match srcs.last() {
            Some(src) => self.bit_size(src.value),
            None => 32,
        };
        let kind = InstrKind::Alu(AluInstr {
            op,
            srcs: SmallVec::from_slice(srcs),
        });
        self.insert_value(kind, num_components, bit_size)
    }

    fn fadd(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.alu(AluOp::Fadd, &[lhs, rhs])
    }

    fn fsub(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.alu(AluOp::Fsub, &[lhs, rhs])
    }

    fn fmul(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.alu(AluOp::Fmul, &[lhs, rhs])
    }

    fn fneg(&mut self, value: ValueId) -> ValueId {
        self.alu(AluOp::Fneg, &[value])
    }

    fn iadd(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.alu(AluOp::Iadd, &[lhs, rhs])
    }

    fn imul(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.alu(AluOp::Imul, &[lhs, rhs])
    }

    fn flt(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.alu(AluOp::Flt, &[lhs, rhs])
    }

    fn bcsel(&mut self, cond: ValueId, then_value: ValueId, else_value: ValueId) -> ValueId {
        self.alu(AluOp::Bcsel, &[cond, then_value, else_value])
    }

    fn imm_f32(&mut self, value: f32) -> ValueId {
        self.insert_value(InstrKind::LoadConst(SmallVec::from_slice(&[value.to_bits()])), 1, 32)
    }

    fn imm_u32(&mut self, value: u32) -> ValueId {
        self.insert_value(InstrKind::LoadConst(SmallVec::from_slice(&[value])), 1, 32)
    }

    fn imm_vec_f32(&mut self, values: &[f32]) -> ValueId {
        let bits: SmallVec<[u32; 4]> = values.iter().map(|v| v.to_bits()).collect();
        let n = bits.len() as u8;
        self.insert_value(InstrKind::LoadConst(bits), n, 32)
    }

    fn undef(&mut self, num_components: u8, bit_size: u8) -> ValueId {
        self.insert_value(InstrKind::Undef, num_components, bit_size)
    }

    fn mov(&mut self, src: AluSrc, num_components: u8) -> ValueId {
        self.alu_swizzled(AluOp::Mov, &[src], num_components)
    }

    /// Vector construct; a single scalar is returned as is.
    fn vec(&mut self, scalars: &[ValueId]) -> ValueId {
        if let [single] = scalars {
            return *single;
        }
        let srcs: SmallVec<[AluSrc; 3]> = scalars.iter().map(|&v| AluSrc::channel(v, 0)).collect();
        let op = AluOp::vec(scalars.len());
        self.alu_swizzled(op, &srcs, scalars.len() as u8)
    }

    fn channel(&mut self, value: ValueId, lane: u8) -> ValueId {
        self.swizzle(value, &[lane])
    }

    /// Lane extraction; the identity over all lanes returns `value`.
    fn swizzle(&mut self, value: ValueId, lanes: &[u8]) -> ValueId {
        let width = self.components(value) as usize;
        if lanes.len() == width && lanes == &IDENTITY_SWIZZLE[..width] {
            return value;
        }
        self.mov(AluSrc::lanes(value, lanes), lanes.len() as u8)
    }

    /// Materialize an ALU source as a value of `num_components` lanes.
    fn ssa_for_src(&mut self, src: AluSrc, num_components: u8) -> ValueId {
        let n = num_components as usize;
        let width = self.components(src.value) as usize;
        if n == width && src.swizzle[..n] == IDENTITY_SWIZZLE[..n] {
            return src.value;
        }
        let lanes = &src.swizzle[..n];
        self.mov(AluSrc::lanes(src.value, lanes), num_components)
    }
}
