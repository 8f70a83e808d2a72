//! Vectorizer behavior on whole shaders, checked structurally and against
//! the reference interpreter.

use lumen_opt::ir::eval::{self, IoState};
use lumen_opt::ir::{
    verify_shader, AluBuilder, AluInstr, AluOp, AluSrc, Builder, ControlBuilder, Cursor, InstrId,
    InstrKind, IntrinsicBuilder, Shader, Stage, ValueId,
};
use lumen_opt::opt::{opt_vectorize, ShaderPass, Vectorize, VectorizeConfig};

// =============================================================================
// Helpers
// =============================================================================

/// Inputs `a` (slot 0) and `b` (slot 1), each four lanes wide.
struct Inputs {
    offset: ValueId,
    a: ValueId,
    b: ValueId,
}

fn load_inputs(b: &mut Builder<'_>) -> Inputs {
    let offset = b.imm_u32(0);
    let a = b.load_input(4, 32, offset, 0, 0);
    let bv = b.load_input(4, 32, offset, 1, 0);
    Inputs { offset, a, b: bv }
}

fn lane_op(b: &mut Builder<'_>, op: AluOp, srcs: &[ValueId], lane: u8) -> ValueId {
    let srcs: Vec<AluSrc> = srcs.iter().map(|&v| AluSrc::channel(v, lane)).collect();
    b.alu_swizzled(op, &srcs, 1)
}

fn shader_with(body: impl FnOnce(&mut Builder<'_>)) -> Shader {
    let mut shader = Shader::new(Stage::Fragment);
    {
        let func = shader.main_mut();
        let entry = func.entry();
        let mut b = Builder::at_end(func, entry);
        body(&mut b);
    }
    shader
}

fn live_alu(shader: &Shader, op: AluOp) -> Vec<InstrId> {
    let func = shader.main();
    func.live_instrs()
        .filter(|&id| func.instr(id).as_alu().is_some_and(|alu| alu.op == op))
        .collect()
}

fn dest_width(shader: &Shader, id: InstrId) -> u8 {
    let func = shader.main();
    let dest = func.instr(id).dest.expect("ALU instructions define a value");
    func.value(dest).num_components
}

fn sample_io() -> IoState {
    let mut io = IoState::new();
    for lane in 0..4u8 {
        io.set_input_f32(0, lane, 1.5 + lane as f32);
        io.set_input_f32(1, lane, -2.0 * lane as f32 + 0.25);
    }
    io
}

/// Vectorize `shader` and check the outputs did not move.
fn vectorize_preserving_outputs(shader: &mut Shader, io: IoState) -> bool {
    let mut before = io.clone();
    eval::run(shader, &mut before).expect("original shader runs");

    let progress = opt_vectorize(shader);
    verify_shader(shader).expect("valid after vectorization");

    let mut after = io;
    eval::run(shader, &mut after).expect("vectorized shader runs");
    assert_eq!(before.outputs, after.outputs);
    progress
}

// =============================================================================
// Merging
// =============================================================================

#[test]
fn test_lanes_of_shared_sources_merge() {
    let mut shader = shader_with(|b| {
        let io = load_inputs(b);
        let r0 = lane_op(b, AluOp::Fadd, &[io.a, io.b], 0);
        let r1 = lane_op(b, AluOp::Fadd, &[io.a, io.b], 1);
        b.store_output(r0, io.offset, 2, 0, 1);
        b.store_output(r1, io.offset, 2, 1, 1);
    });

    assert!(vectorize_preserving_outputs(&mut shader, sample_io()));

    let adds = live_alu(&shader, AluOp::Fadd);
    assert_eq!(adds.len(), 1);
    assert_eq!(dest_width(&shader, adds[0]), 2);

    let func = shader.main();
    let alu = func.instr(adds[0]).as_alu().expect("alu");
    for src in &alu.srcs {
        assert_eq!(&src.swizzle[..2], &[0, 1]);
    }

    // Each store reads one lane of the wide add through an extraction.
    let wide = func.instr(adds[0]).dest.expect("dest");
    let stored: Vec<ValueId> = func
        .live_instrs()
        .filter_map(|id| func.instr(id).as_intrinsic())
        .filter(|intr| intr.write_mask != 0)
        .map(|intr| intr.srcs[0])
        .collect();
    assert_eq!(stored.len(), 2);
    for (lane, value) in stored.into_iter().enumerate() {
        let mov = func.def_of(value).as_alu().expect("extraction");
        assert_eq!(mov.op, AluOp::Mov);
        assert_eq!(mov.srcs[0].value, wide);
        assert_eq!(mov.srcs[0].swizzle[0], lane as u8);
    }
}

#[test]
fn test_four_way_combine() {
    let mut shader = shader_with(|b| {
        let io = load_inputs(b);
        for lane in 0..4 {
            let r = lane_op(b, AluOp::Fmul, &[io.a, io.b], lane);
            b.store_output(r, io.offset, 2, lane, 1);
        }
    });

    assert!(vectorize_preserving_outputs(&mut shader, sample_io()));

    let muls = live_alu(&shader, AluOp::Fmul);
    assert_eq!(muls.len(), 1);
    assert_eq!(dest_width(&shader, muls[0]), 4);
    let alu = shader.main().instr(muls[0]).as_alu().expect("alu");
    assert_eq!(alu.srcs[0].swizzle, [0, 1, 2, 3]);
}

#[test]
fn test_three_way_combine_with_reordered_lanes() {
    let mut shader = shader_with(|b| {
        let io = load_inputs(b);
        for (component, lane) in [3u8, 0, 2].into_iter().enumerate() {
            let r = lane_op(b, AluOp::Fsub, &[io.a, io.b], lane);
            b.store_output(r, io.offset, 2, component as u8, 1);
        }
    });

    assert!(vectorize_preserving_outputs(&mut shader, sample_io()));

    let subs = live_alu(&shader, AluOp::Fsub);
    assert_eq!(subs.len(), 1);
    assert_eq!(dest_width(&shader, subs[0]), 3);
    let alu = shader.main().instr(subs[0]).as_alu().expect("alu");
    assert_eq!(&alu.srcs[1].swizzle[..3], &[3, 0, 2]);
}

#[test]
fn test_width_bound() {
    let mut shader = shader_with(|b| {
        let io = load_inputs(b);
        for (component, lane) in [0u8, 1, 2, 3, 0].into_iter().enumerate() {
            let r = lane_op(b, AluOp::Fadd, &[io.a, io.b], lane);
            b.store_output(r, io.offset, 2 + component as u32 / 4, component as u8 % 4, 1);
        }
    });

    let mut pass = Vectorize::new();
    let mut before = sample_io();
    eval::run(&shader, &mut before).expect("runs");
    assert!(pass.run(&mut shader));
    let mut after = sample_io();
    eval::run(&shader, &mut after).expect("runs");
    assert_eq!(before.outputs, after.outputs);

    let adds = live_alu(&shader, AluOp::Fadd);
    let mut widths: Vec<u8> = adds.iter().map(|&id| dest_width(&shader, id)).collect();
    widths.sort();
    assert_eq!(widths, vec![1, 4]);
    assert!(pass.stats().width_rejections >= 1);
}

#[test]
fn test_narrow_config_pairs_only() {
    let mut shader = shader_with(|b| {
        let io = load_inputs(b);
        for lane in 0..4 {
            let r = lane_op(b, AluOp::Fmul, &[io.a, io.b], lane);
            b.store_output(r, io.offset, 2, lane, 1);
        }
    });

    let mut pass = Vectorize::with_config(VectorizeConfig::narrow());
    assert!(pass.run(&mut shader));

    let muls = live_alu(&shader, AluOp::Fmul);
    assert_eq!(muls.len(), 2);
    assert!(muls.iter().all(|&id| dest_width(&shader, id) == 2));
}

// =============================================================================
// Non-candidates
// =============================================================================

#[test]
fn test_different_opcodes_do_not_merge() {
    let mut shader = shader_with(|b| {
        let io = load_inputs(b);
        let r0 = lane_op(b, AluOp::Fadd, &[io.a, io.b], 0);
        let r1 = lane_op(b, AluOp::Fmul, &[io.a, io.b], 1);
        b.store_output(r0, io.offset, 2, 0, 1);
        b.store_output(r1, io.offset, 2, 1, 1);
    });

    assert!(!opt_vectorize(&mut shader));
}

#[test]
fn test_different_sources_do_not_merge() {
    let mut shader = shader_with(|b| {
        let io = load_inputs(b);
        let r0 = lane_op(b, AluOp::Fadd, &[io.a, io.b], 0);
        let r1 = lane_op(b, AluOp::Fadd, &[io.b, io.a], 1);
        b.store_output(r0, io.offset, 2, 0, 1);
        b.store_output(r1, io.offset, 2, 1, 1);
    });

    assert!(!opt_vectorize(&mut shader));
}

#[test]
fn test_different_bit_sizes_do_not_merge() {
    let mut shader = shader_with(|b| {
        let io = load_inputs(b);
        let func = b.func_mut();
        let after = func.value(io.b).def;
        for bit_size in [32, 16] {
            let kind = InstrKind::Alu(AluInstr {
                op: AluOp::Iadd,
                srcs: [AluSrc::channel(io.a, 0), AluSrc::channel(io.b, 0)].into_iter().collect(),
            });
            func.insert(Cursor::After(after), kind, Some((1, bit_size)));
        }
    });

    assert!(!opt_vectorize(&mut shader));
}

#[test]
fn test_moves_are_not_merged() {
    let mut shader = shader_with(|b| {
        let io = load_inputs(b);
        let x = b.channel(io.a, 0);
        let y = b.channel(io.a, 1);
        b.store_output(x, io.offset, 2, 0, 1);
        b.store_output(y, io.offset, 2, 1, 1);
    });

    assert!(!opt_vectorize(&mut shader));
}

// =============================================================================
// Dominance
// =============================================================================

#[test]
fn test_sibling_blocks_do_not_merge() {
    let mut shader = shader_with(|b| {
        let io = load_inputs(b);
        let x = b.channel(io.a, 0);
        let y = b.channel(io.b, 0);
        let cond = b.flt(x, y);
        let then_block = b.add_block();
        let else_block = b.add_block();
        b.branch(cond, then_block, else_block);

        b.switch_to(then_block);
        let r0 = lane_op(b, AluOp::Fadd, &[io.a, io.b], 0);
        b.store_output(r0, io.offset, 2, 0, 1);

        b.switch_to(else_block);
        let r1 = lane_op(b, AluOp::Fadd, &[io.a, io.b], 1);
        b.store_output(r1, io.offset, 2, 0, 1);
    });

    assert!(!opt_vectorize(&mut shader));
    assert_eq!(live_alu(&shader, AluOp::Fadd).len(), 2);
}

#[test]
fn test_dominating_block_merges_into_child() {
    let mut shader = shader_with(|b| {
        let io = load_inputs(b);
        let r0 = lane_op(b, AluOp::Fadd, &[io.a, io.b], 0);
        b.store_output(r0, io.offset, 2, 0, 1);
        let x = b.channel(io.a, 0);
        let y = b.channel(io.b, 0);
        let cond = b.flt(y, x);
        let then_block = b.add_block();
        let join = b.add_block();
        b.branch(cond, then_block, join);

        b.switch_to(then_block);
        let r1 = lane_op(b, AluOp::Fadd, &[io.a, io.b], 1);
        b.store_output(r1, io.offset, 2, 1, 1);
        b.jump(join);
    });

    assert!(vectorize_preserving_outputs(&mut shader, sample_io()));

    let adds = live_alu(&shader, AluOp::Fadd);
    assert_eq!(adds.len(), 1);
    let func = shader.main();
    assert_eq!(func.instr(adds[0]).block, func.entry());
}

#[test]
fn test_branch_condition_reads_extraction() {
    let mut shader = shader_with(|b| {
        let io = load_inputs(b);
        let c0 = lane_op(b, AluOp::Flt, &[io.a, io.b], 0);
        let c1 = lane_op(b, AluOp::Flt, &[io.a, io.b], 1);
        let then_block = b.add_block();
        let else_block = b.add_block();
        b.branch(c0, then_block, else_block);

        b.switch_to(then_block);
        let one = b.imm_f32(1.0);
        b.store_output(one, io.offset, 2, 0, 1);
        b.switch_to(else_block);
        b.store_output(c1, io.offset, 2, 1, 1);
    });

    let mut flipped = sample_io();
    flipped.set_input_f32(0, 0, -100.0);
    assert!(vectorize_preserving_outputs(&mut shader.clone(), flipped));
    assert!(vectorize_preserving_outputs(&mut shader, sample_io()));

    let func = shader.main();
    let cond = func
        .block(func.entry())
        .terminator
        .condition()
        .expect("entry branches");
    let mov = func.def_of(cond).as_alu().expect("extraction");
    assert_eq!(mov.op, AluOp::Mov);
    assert_eq!(live_alu(&shader, AluOp::Flt).len(), 1);
}

// =============================================================================
// Fixed Point
// =============================================================================

#[test]
fn test_second_run_reports_no_progress() {
    let mut shader = shader_with(|b| {
        let io = load_inputs(b);
        for lane in 0..3 {
            let r = lane_op(b, AluOp::Fadd, &[io.a, io.b], lane);
            let n = b.fneg(r);
            b.store_output(n, io.offset, 2, lane, 1);
        }
    });

    assert!(opt_vectorize(&mut shader));
    assert!(!opt_vectorize(&mut shader));
}

#[test]
fn test_consumers_of_merged_values_merge_in_same_walk() {
    let mut shader = shader_with(|b| {
        let io = load_inputs(b);
        let x0 = lane_op(b, AluOp::Fadd, &[io.a, io.b], 0);
        let y0 = b.fneg(x0);
        let x1 = lane_op(b, AluOp::Fadd, &[io.a, io.b], 1);
        let y1 = b.fneg(x1);
        b.store_output(y0, io.offset, 2, 0, 1);
        b.store_output(y1, io.offset, 2, 1, 1);
    });

    let mut before = sample_io();
    eval::run(&shader, &mut before).expect("runs");

    let mut pass = Vectorize::new();
    assert!(pass.run(&mut shader));
    verify_shader(&shader).expect("valid");
    assert!(pass.stats().reclassified_consumers >= 1);

    let mut after = sample_io();
    eval::run(&shader, &mut after).expect("runs");
    assert_eq!(before.outputs, after.outputs);

    let adds = live_alu(&shader, AluOp::Fadd);
    let negs = live_alu(&shader, AluOp::Fneg);
    assert_eq!(adds.len(), 1);
    assert_eq!(negs.len(), 1);
    assert_eq!(dest_width(&shader, negs[0]), 2);
    assert!(!opt_vectorize(&mut shader));
}

#[test]
fn test_chained_combines_compose_offsets() {
    // Each lane feeds a scalar consumer; the four adds and the four
    // consumers each collapse to one instruction.
    let mut shader = shader_with(|b| {
        let io = load_inputs(b);
        for lane in 0..4 {
            let r = lane_op(b, AluOp::Fadd, &[io.a, io.b], lane);
            let m = b.fmul(r, r);
            b.store_output(m, io.offset, 2, lane, 1);
        }
    });

    assert!(vectorize_preserving_outputs(&mut shader, sample_io()));
    assert_eq!(live_alu(&shader, AluOp::Fadd).len(), 1);
    let muls = live_alu(&shader, AluOp::Fmul);
    assert_eq!(muls.len(), 1);
    assert_eq!(dest_width(&shader, muls[0]), 4);
    assert!(!opt_vectorize(&mut shader));
}
