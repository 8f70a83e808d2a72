//! Equivalence classes of vectorizable ALU instructions.
//!
//! Two instructions land in the same class when they share opcode, result
//! bit size and the *value* read by every source slot. Swizzles are left out
//! of the key: `a.x + b.x` and `a.y + b.y` are the same class, which is
//! exactly the pair the combiner wants.

use smallvec::SmallVec;

use crate::ir::function::Function;
use crate::ir::instr::{InstrId, ValueId};
use crate::ir::operators::AluOp;

/// Hashable class of a rewritable ALU instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassKey {
    pub op: AluOp,
    pub bit_size: u8,
    pub srcs: SmallVec<[ValueId; 3]>,
}

impl ClassKey {
    /// Class of `instr`, or `None` when it cannot be vectorized.
    pub fn of(func: &Function, instr: InstrId) -> Option<ClassKey> {
        if !instr_can_rewrite(func, instr) {
            return None;
        }
        let instr = func.instr(instr);
        let alu = instr.as_alu()?;
        let dest = instr.dest?;
        Some(ClassKey {
            op: alu.op,
            bit_size: func.value(dest).bit_size,
            srcs: alu.srcs.iter().map(|src| src.value).collect(),
        })
    }
}

/// Whether `instr` is a live, per-component ALU instruction other than a
/// move.
///
/// Moves are left to copy propagation; fixed-width opcodes (dot products,
/// vector constructs) cannot change width and are never candidates.
pub fn instr_can_rewrite(func: &Function, instr: InstrId) -> bool {
    let instr = func.instr(instr);
    if instr.is_removed() || instr.dest.is_none() {
        return false;
    }
    match instr.as_alu() {
        Some(alu) => !alu.op.is_move() && alu.op.is_elementwise(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::{AluBuilder, Builder, IntrinsicBuilder};
    use crate::ir::instr::AluSrc;

    #[test]
    fn test_swizzle_is_not_part_of_key() {
        let mut func = Function::new("main");
        let entry = func.entry();
        let mut b = Builder::at_end(&mut func, entry);
        let a = b.imm_vec_f32(&[1.0, 2.0]);
        let c = b.imm_vec_f32(&[3.0, 4.0]);
        let x = b.alu_swizzled(
            AluOp::Fadd,
            &[AluSrc::channel(a, 0), AluSrc::channel(c, 0)],
            1,
        );
        let y = b.alu_swizzled(
            AluOp::Fadd,
            &[AluSrc::channel(a, 1), AluSrc::channel(c, 1)],
            1,
        );

        let kx = ClassKey::of(&func, func.value(x).def).expect("fadd is eligible");
        let ky = ClassKey::of(&func, func.value(y).def).expect("fadd is eligible");
        assert_eq!(kx, ky);
    }

    #[test]
    fn test_key_separates_op_and_sources() {
        let mut func = Function::new("main");
        let entry = func.entry();
        let mut b = Builder::at_end(&mut func, entry);
        let a = b.imm_f32(1.0);
        let c = b.imm_f32(2.0);
        let sum = b.fadd(a, c);
        let product = b.fmul(a, c);
        let swapped = b.fadd(c, a);

        let key = |v: ValueId| ClassKey::of(&func, func.value(v).def);
        assert_ne!(key(sum), key(product));
        assert_ne!(key(sum), key(swapped));
    }

    #[test]
    fn test_ineligible_instructions() {
        let mut func = Function::new("main");
        let entry = func.entry();
        let mut b = Builder::at_end(&mut func, entry);
        let offset = b.imm_u32(0);
        let v = b.imm_vec_f32(&[1.0, 2.0]);
        let moved = b.mov(AluSrc::channel(v, 1), 1);
        let dot = b.alu(AluOp::Fdot2, &[v, v]);
        let load = b.load_input(1, 32, offset, 0, 0);

        for value in [offset, moved, dot, load] {
            assert!(!instr_can_rewrite(&func, func.value(value).def));
        }
    }

    #[test]
    fn test_vector_elementwise_is_eligible() {
        let mut func = Function::new("main");
        let entry = func.entry();
        let mut b = Builder::at_end(&mut func, entry);
        let v = b.imm_vec_f32(&[1.0, 2.0]);
        let neg = b.fneg(v);

        assert!(instr_can_rewrite(&func, func.value(neg).def));
    }
}
