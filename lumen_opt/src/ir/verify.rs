//! Structural validation of the def/use graph.
//!
//! Passes assert their own preconditions; the verifier is the independent
//! check run by tests and by the pipeline between passes.

use thiserror::Error;

use super::cfg::{BlockId, Terminator};
use super::function::Function;
use super::instr::{InstrId, InstrKind, Use, ValueId};
use super::operators::MAX_VEC_COMPONENTS;
use super::shader::Shader;

/// A broken invariant in a function body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("{instr:?} source {slot} references unknown value {value:?}")]
    DanglingSource {
        instr: InstrId,
        slot: usize,
        value: ValueId,
    },

    #[error("{instr:?} source {slot} reads {value:?}, whose definition was removed")]
    SourceDefRemoved {
        instr: InstrId,
        slot: usize,
        value: ValueId,
    },

    #[error("{value:?} has no use record for {instr:?} source {slot}")]
    MissingUse {
        value: ValueId,
        instr: InstrId,
        slot: usize,
    },

    #[error("{value:?} lists a stale use by {instr:?} source {slot}")]
    StaleUse {
        value: ValueId,
        instr: InstrId,
        slot: usize,
    },

    #[error("removed instruction {instr:?} is still linked into {block:?}")]
    RemovedInstrLinked { instr: InstrId, block: BlockId },

    #[error("{instr:?} is linked into {linked:?} but records {recorded:?}")]
    BlockMismatch {
        instr: InstrId,
        linked: BlockId,
        recorded: BlockId,
    },

    #[error("{value:?} has {components} components")]
    BadComponentCount { value: ValueId, components: u8 },

    #[error("{instr:?} write mask {mask:#06b} exceeds {components} components")]
    BadWriteMask {
        instr: InstrId,
        mask: u8,
        components: u8,
    },

    #[error("{instr:?} source {slot} selects lane {lane} of a {components}-wide value")]
    SwizzleOutOfRange {
        instr: InstrId,
        slot: usize,
        lane: u8,
        components: u8,
    },

    #[error("{instr:?} has {found} sources, expected {expected}")]
    ArityMismatch {
        instr: InstrId,
        expected: usize,
        found: usize,
    },

    #[error("branch in {block:?} tests invalid condition {value:?}")]
    DanglingCondition { block: BlockId, value: ValueId },

    #[error("{value:?} lists a stale if-use by {block:?}")]
    StaleIfUse { value: ValueId, block: BlockId },
}

/// Check every function of a shader.
pub fn verify_shader(shader: &Shader) -> Result<(), VerifyError> {
    shader.functions.iter().try_for_each(verify_function)
}

pub fn verify_function(func: &Function) -> Result<(), VerifyError> {
    for &block in func.blocks() {
        for &id in &func.block(block).instrs {
            verify_instr(func, block, id)?;
        }
        verify_terminator(func, block)?;
    }
    verify_use_lists(func)
}

fn verify_instr(func: &Function, block: BlockId, id: InstrId) -> Result<(), VerifyError> {
    let instr = func.instr(id);
    if instr.is_removed() {
        return Err(VerifyError::RemovedInstrLinked { instr: id, block });
    }
    if instr.block != block {
        return Err(VerifyError::BlockMismatch {
            instr: id,
            linked: block,
            recorded: instr.block,
        });
    }

    for (slot, value) in instr.src_values().into_iter().enumerate() {
        if !func.has_value(value) {
            return Err(VerifyError::DanglingSource {
                instr: id,
                slot,
                value,
            });
        }
        if func.def_of(value).is_removed() {
            return Err(VerifyError::SourceDefRemoved {
                instr: id,
                slot,
                value,
            });
        }
        let record = Use {
            instr: id,
            slot: slot as u8,
        };
        if !func.value(value).uses.contains(&record) {
            return Err(VerifyError::MissingUse {
                value,
                instr: id,
                slot,
            });
        }
    }

    if let Some(dest) = instr.dest {
        let components = func.value(dest).num_components;
        if components == 0 || components as usize > MAX_VEC_COMPONENTS {
            return Err(VerifyError::BadComponentCount {
                value: dest,
                components,
            });
        }
    }

    match &instr.kind {
        InstrKind::Alu(alu) => {
            let expected = alu.op.num_inputs();
            if alu.srcs.len() != expected {
                return Err(VerifyError::ArityMismatch {
                    instr: id,
                    expected,
                    found: alu.srcs.len(),
                });
            }
            for (slot, src) in alu.srcs.iter().enumerate() {
                let components = func.value(src.value).num_components;
                let read = func.alu_src_components(id, slot) as usize;
                if let Some(&lane) = src.swizzle[..read].iter().find(|&&l| l >= components) {
                    return Err(VerifyError::SwizzleOutOfRange {
                        instr: id,
                        slot,
                        lane,
                        components,
                    });
                }
            }
        }
        InstrKind::Intrinsic(intr) => {
            let expected = intr.intrinsic.num_srcs();
            if intr.srcs.len() != expected {
                return Err(VerifyError::ArityMismatch {
                    instr: id,
                    expected,
                    found: intr.srcs.len(),
                });
            }
            if intr.intrinsic.has_write_mask() && intr.write_mask >> intr.num_components != 0 {
                return Err(VerifyError::BadWriteMask {
                    instr: id,
                    mask: intr.write_mask,
                    components: intr.num_components,
                });
            }
        }
        _ => {}
    }
    Ok(())
}

fn verify_terminator(func: &Function, block: BlockId) -> Result<(), VerifyError> {
    if let Terminator::Branch { cond, .. } = func.block(block).terminator {
        if !func.has_value(cond) || func.def_of(cond).is_removed() {
            return Err(VerifyError::DanglingCondition { block, value: cond });
        }
    }
    Ok(())
}

/// Every recorded use must still be a real read.
fn verify_use_lists(func: &Function) -> Result<(), VerifyError> {
    for index in 0..func.value_capacity() {
        let value = ValueId::new(index as u32);
        let ssa = func.value(value);
        if func.instr(ssa.def).is_removed() {
            continue;
        }
        for u in &ssa.uses {
            let reader = func.instr(u.instr);
            let slot = u.slot as usize;
            if reader.is_removed() || slot >= reader.num_srcs() || reader.src(slot) != value {
                return Err(VerifyError::StaleUse {
                    value,
                    instr: u.instr,
                    slot,
                });
            }
        }
        for &block in &ssa.if_uses {
            if func.block(block).terminator.condition() != Some(value) {
                return Err(VerifyError::StaleIfUse { value, block });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::{AluBuilder, Builder, IntrinsicBuilder};
    use crate::ir::instr::AluSrc;
    use crate::ir::operators::AluOp;
    use crate::ir::shader::Stage;

    #[test]
    fn test_well_formed_function_passes() {
        let mut shader = Shader::new(Stage::Vertex);
        let func = shader.main_mut();
        let entry = func.entry();
        let mut b = Builder::at_end(func, entry);
        let offset = b.imm_u32(0);
        let pos = b.load_input(4, 32, offset, 0, 0);
        let scaled = b.fmul(pos, pos);
        b.store_output(scaled, offset, 0, 0, 0b1111);

        assert_eq!(verify_shader(&shader), Ok(()));
    }

    #[test]
    fn test_swizzle_out_of_range() {
        let mut func = Function::new("main");
        let entry = func.entry();
        let mut b = Builder::at_end(&mut func, entry);
        let v = b.imm_vec_f32(&[1.0, 2.0]);
        let bad = b.alu_swizzled(AluOp::Fneg, &[AluSrc::channel(v, 3)], 1);
        let instr = func.value(bad).def;

        assert_eq!(
            verify_function(&func),
            Err(VerifyError::SwizzleOutOfRange {
                instr,
                slot: 0,
                lane: 3,
                components: 2,
            })
        );
    }

    #[test]
    fn test_write_mask_beyond_width() {
        let mut func = Function::new("main");
        let entry = func.entry();
        let mut b = Builder::at_end(&mut func, entry);
        let offset = b.imm_u32(0);
        let v = b.imm_vec_f32(&[1.0, 2.0]);
        let store = b.store_output(v, offset, 0, 0, 0b100);

        assert_eq!(
            verify_function(&func),
            Err(VerifyError::BadWriteMask {
                instr: store,
                mask: 0b100,
                components: 2,
            })
        );
    }

    #[test]
    fn test_error_display() {
        let err = VerifyError::ArityMismatch {
            instr: InstrId::new(4),
            expected: 2,
            found: 1,
        };
        assert_eq!(err.to_string(), "#4 has 1 sources, expected 2");
    }
}
