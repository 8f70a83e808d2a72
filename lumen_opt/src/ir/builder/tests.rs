//! Unit tests for the instruction builder.
//!
//! Tests are organized by builder trait:
//! - AluBuilder: widths, constants, lane shuffles
//! - IntrinsicBuilder: flat and deref I/O shapes
//! - DerefBuilder: chain types
//! - ControlBuilder: blocks and terminators

use super::*;
use crate::ir::cfg::Terminator;
use crate::ir::instr::{AluSrc, InstrKind};
use crate::ir::operators::{AluOp, Intrinsic};
use crate::ir::shader::{Variable, VariableMode, Variables};
use crate::ir::types::VarType;

fn alu_op(func: &Function, value: ValueId) -> AluOp {
    func.def_of(value)
        .as_alu()
        .map(|alu| alu.op)
        .expect("value is not defined by an ALU instruction")
}

// =============================================================================
// AluBuilder Tests
// =============================================================================

#[test]
fn test_builds_in_program_order() {
    let mut func = Function::new("main");
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);

    let a = b.imm_f32(1.0);
    let c = b.imm_f32(2.0);
    let sum = b.fadd(a, c);

    let dests: Vec<_> = func
        .block(entry)
        .instrs
        .iter()
        .map(|&i| func.instr(i).dest)
        .collect();
    assert_eq!(dests, vec![Some(a), Some(c), Some(sum)]);
}

#[test]
fn test_alu_width_follows_widest_source() {
    let mut func = Function::new("main");
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);

    let v = b.imm_vec_f32(&[1.0, 2.0, 3.0]);
    let s = b.imm_f32(4.0);
    let dot = b.alu(AluOp::Fdot3, &[v, v]);
    let neg = b.fneg(v);

    assert_eq!(b.components(dot), 1);
    assert_eq!(b.components(neg), 3);
    assert_eq!(b.components(s), 1);
}

#[test]
fn test_vec_of_one_is_identity() {
    let mut func = Function::new("main");
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);

    let x = b.imm_f32(1.0);
    assert_eq!(b.vec(&[x]), x);

    let y = b.imm_f32(2.0);
    let xy = b.vec(&[x, y]);
    assert_eq!(b.components(xy), 2);
    assert_eq!(alu_op(&func, xy), AluOp::Vec2);
}

#[test]
fn test_swizzle_identity_returns_value() {
    let mut func = Function::new("main");
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);

    let v = b.imm_vec_f32(&[1.0, 2.0]);
    assert_eq!(b.swizzle(v, &[0, 1]), v);

    let y = b.channel(v, 1);
    assert_ne!(y, v);
    assert_eq!(b.components(y), 1);

    let alu = func.def_of(y).as_alu().expect("mov");
    assert_eq!(alu.op, AluOp::Mov);
    assert_eq!(alu.srcs[0].swizzle[0], 1);
}

#[test]
fn test_ssa_for_src_prefix() {
    let mut func = Function::new("main");
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);

    let v = b.imm_vec_f32(&[1.0, 2.0, 3.0, 4.0]);
    assert_eq!(b.ssa_for_src(AluSrc::new(v), 4), v);

    let prefix = b.ssa_for_src(AluSrc::new(v), 2);
    assert_eq!(b.components(prefix), 2);
    assert_eq!(alu_op(&func, prefix), AluOp::Mov);
}

// =============================================================================
// IntrinsicBuilder / DerefBuilder Tests
// =============================================================================

#[test]
fn test_flat_io_shapes() {
    let mut func = Function::new("main");
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);

    let offset = b.imm_u32(0);
    let color = b.load_input(4, 32, offset, 3, 0);
    let store = b.store_output(color, offset, 5, 0, 0b1111);

    let intr = func.instr(store).as_intrinsic().expect("store_output");
    assert_eq!(intr.intrinsic, Intrinsic::StoreOutput);
    assert_eq!(intr.num_components, 4);
    assert_eq!(intr.srcs.as_slice(), &[color, offset]);
    assert_eq!(intr.base, 5);
    assert!(func.instr(store).dest.is_none());
}

#[test]
fn test_deref_chain_types() {
    let mut vars = Variables::new();
    let arr = vars.add(
        Variable::new("arr", VariableMode::SHADER_IN, VarType::array(VarType::float(3), 4))
            .with_location(32, 0),
    );

    let mut func = Function::new("main");
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);

    let index = b.imm_u32(2);
    let root = b.deref_var(arr, &vars[arr]);
    let elem = b.deref_array(root, index);
    let value = b.load_deref(elem);

    assert_eq!(b.deref_type(elem), &VarType::float(3));
    assert_eq!(b.components(value), 3);

    match &func.def_of(elem).kind {
        InstrKind::Deref(d) => assert_eq!(d.mode, VariableMode::SHADER_IN),
        other => panic!("expected deref, got {other:?}"),
    }
}

#[test]
fn test_interp_carries_second_source() {
    let mut vars = Variables::new();
    let uv = vars.add(Variable::new("uv", VariableMode::SHADER_IN, VarType::float(2)));

    let mut func = Function::new("main");
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);

    let offset = b.imm_vec_f32(&[0.25, 0.25]);
    let deref = b.deref_var(uv, &vars[uv]);
    let value = b.interp_deref_at_offset(deref, offset);

    let intr = func.def_of(value).as_intrinsic().expect("interp");
    assert_eq!(intr.intrinsic, Intrinsic::InterpDerefAtOffset);
    assert_eq!(intr.srcs.as_slice(), &[deref, offset]);
}

// =============================================================================
// ControlBuilder Tests
// =============================================================================

#[test]
fn test_branch_records_preds_and_if_use() {
    let mut func = Function::new("main");
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);

    let then_block = b.add_block();
    let else_block = b.add_block();
    let cond = b.imm_u32(1);
    b.branch(cond, then_block, else_block);
    b.switch_to(then_block);
    b.ret();

    assert_eq!(func.block(then_block).preds, vec![entry]);
    assert_eq!(func.block(else_block).preds, vec![entry]);
    assert_eq!(func.value(cond).if_uses, vec![entry]);
    assert_eq!(
        func.block(entry).terminator,
        Terminator::Branch {
            cond,
            then_block,
            else_block
        }
    );
}
