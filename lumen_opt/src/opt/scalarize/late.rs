//! Late scalarization of flat `load_input` / `store_output` intrinsics.

use smallvec::SmallVec;
use tracing::debug;

use super::ScalarizeStats;
use crate::ir::builder::{AluBuilder, Builder, IntrinsicBuilder};
use crate::ir::function::{Cursor, Function};
use crate::ir::instr::{AluSrc, InstrId, IntrinsicInstr, ValueId};
use crate::ir::operators::{Intrinsic, MAX_VEC_COMPONENTS};
use crate::ir::shader::{Shader, VariableMode};

/// Split every multi-component `load_input` (when `modes` has `SHADER_IN`)
/// and `store_output` (when `modes` has `SHADER_OUT`) into single-channel
/// intrinsics. Returns whether anything changed.
pub fn lower_io_to_scalar(shader: &mut Shader, modes: VariableMode) -> bool {
    run(shader, modes).changed()
}

pub(super) fn run(shader: &mut Shader, modes: VariableMode) -> ScalarizeStats {
    let mut stats = ScalarizeStats::default();
    for func in &mut shader.functions {
        for block in func.blocks().to_vec() {
            for id in func.block_instrs(block) {
                let Some((kind, num_components)) = func
                    .instr(id)
                    .as_intrinsic()
                    .map(|intr| (intr.intrinsic, intr.num_components))
                else {
                    continue;
                };
                if num_components == 1 {
                    continue;
                }
                match kind {
                    Intrinsic::LoadInput if modes.contains(VariableMode::SHADER_IN) => {
                        lower_load(func, id, &mut stats);
                    }
                    Intrinsic::StoreOutput if modes.contains(VariableMode::SHADER_OUT) => {
                        lower_store(func, id, &mut stats);
                    }
                    _ => {}
                }
            }
        }
    }
    if stats.changed() {
        debug!(
            loads = stats.loads_split,
            stores = stats.stores_split,
            channels = stats.channels_emitted,
            "scalarized flat I/O"
        );
    }
    stats
}

fn lower_load(func: &mut Function, id: InstrId, stats: &mut ScalarizeStats) {
    let instr = func.instr(id);
    let Some(dest) = instr.dest else {
        panic!("load_input {id:?} has no destination");
    };
    let intr: IntrinsicInstr = instr
        .as_intrinsic()
        .cloned()
        .unwrap_or_else(|| unreachable!("checked by caller"));
    let bit_size = func.value(dest).bit_size;
    let offset = intr.srcs[0];

    let mut b = Builder::at(func, Cursor::Before(id));
    let mut loads: SmallVec<[ValueId; MAX_VEC_COMPONENTS]> = SmallVec::new();
    for i in 0..intr.num_components {
        loads.push(b.load_input(1, bit_size, offset, intr.base, intr.component + i));
    }
    let combined = b.vec(&loads);

    func.rewrite_uses(dest, combined);
    func.remove_instr(id);

    stats.loads_split += 1;
    stats.channels_emitted += loads.len();
}

fn lower_store(func: &mut Function, id: InstrId, stats: &mut ScalarizeStats) {
    let intr: IntrinsicInstr = func
        .instr(id)
        .as_intrinsic()
        .cloned()
        .unwrap_or_else(|| unreachable!("checked by caller"));
    let offset = intr.srcs[1];

    let mut b = Builder::at(func, Cursor::Before(id));
    let value = b.ssa_for_src(AluSrc::new(intr.srcs[0]), intr.num_components);
    for i in 0..intr.num_components {
        if intr.write_mask & (1 << i) == 0 {
            stats.masked_channels_skipped += 1;
            continue;
        }
        let lane = b.channel(value, i);
        b.store_output(lane, offset, intr.base, intr.component + i, 0x1);
        stats.channels_emitted += 1;
    }

    func.remove_instr(id);
    stats.stores_split += 1;
}
