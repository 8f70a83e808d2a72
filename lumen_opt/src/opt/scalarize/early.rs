//! Early scalarization: splitting I/O variables into channel variables.
//!
//! Runs before I/O flattening. Each eligible multi-component deref access is
//! rewritten to touch per-channel *shadow* variables, created lazily and
//! memoized per original variable in a four-slot table indexed by channel
//! (`location_frac + i`). Once every function is rewritten, the originals
//! are dropped from the declared list and the derefs that named them are
//! swept.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::ScalarizeStats;
use crate::ir::builder::{AluBuilder, Builder, DerefBuilder, IntrinsicBuilder};
use crate::ir::deref::{deref_instr, deref_variable, remove_dead_derefs};
use crate::ir::function::{Cursor, Function};
use crate::ir::instr::{AluSrc, DerefKind, InstrId, IntrinsicInstr, ValueId};
use crate::ir::operators::{Intrinsic, MAX_VEC_COMPONENTS};
use crate::ir::shader::{Shader, Stage, VarId, Variable, VariableMode, Variables};

/// Channel variables of one original variable, by channel slot.
type ChannelSlots = [Option<VarId>; MAX_VEC_COMPONENTS];

/// Split multi-component deref loads, interpolations and stores of
/// `modes`-matching I/O variables into per-channel variables.
///
/// Loads and interpolations split for inputs and outputs; stores split
/// for outputs only.
pub fn lower_io_to_scalar_early(shader: &mut Shader, modes: VariableMode) {
    run(shader, modes);
}

// =============================================================================
// Channel Variable Tables
// =============================================================================

/// Memo tables for one invocation; inputs and outputs are kept apart.
#[derive(Debug, Default)]
struct SplitTables {
    inputs: FxHashMap<VarId, ChannelSlots>,
    outputs: FxHashMap<VarId, ChannelSlots>,
}

impl SplitTables {
    /// Channel variable for slot `chan` of `var`, created on first request.
    fn channel_var(&mut self, variables: &mut Variables, var: VarId, chan: u8) -> VarId {
        let table = if variables[var].mode == VariableMode::SHADER_IN {
            &mut self.inputs
        } else {
            &mut self.outputs
        };
        let slots = table.entry(var).or_insert([None; MAX_VEC_COMPONENTS]);
        let slot = chan as usize;
        assert!(
            slot < MAX_VEC_COMPONENTS,
            "channel {chan} of {} is past the end of its slot",
            variables[var].name
        );
        if let Some(existing) = slots[slot] {
            return existing;
        }

        let mut clone: Variable = variables.clone_variable(var);
        clone.location_frac = chan;
        clone.ty = clone.ty.channel_type();
        let id = variables.add(clone);
        trace!(var = %variables[var].name, chan, "created channel variable");
        slots[slot] = Some(id);
        id
    }

    /// Every split variable, in creation-independent id order.
    fn split_vars(&self) -> Vec<VarId> {
        let mut vars: Vec<VarId> = self.inputs.keys().chain(self.outputs.keys()).copied().collect();
        vars.sort();
        vars
    }
}

// =============================================================================
// Eligibility
// =============================================================================

fn can_split(stage: Stage, var: &Variable) -> bool {
    if var.is_patch() {
        return false;
    }
    let element = var.ty.without_array();
    if element.is_64bit() {
        return false;
    }
    let vertex_input = stage == Stage::Vertex && var.mode == VariableMode::SHADER_IN;
    if !vertex_input && var.is_builtin_location() {
        return false;
    }
    if var.always_active_io() {
        return false;
    }
    !(element.is_matrix() || element.is_struct())
}

fn is_deref_io(intrinsic: Intrinsic) -> bool {
    matches!(
        intrinsic,
        Intrinsic::LoadDeref
            | Intrinsic::StoreDeref
            | Intrinsic::InterpDerefAtCentroid
            | Intrinsic::InterpDerefAtSample
            | Intrinsic::InterpDerefAtOffset
    )
}

// =============================================================================
// Driver
// =============================================================================

pub(super) fn run(shader: &mut Shader, modes: VariableMode) -> ScalarizeStats {
    let mut stats = ScalarizeStats::default();
    let mut tables = SplitTables::default();
    let Shader {
        stage,
        variables,
        functions,
    } = &mut *shader;

    for func in functions.iter_mut() {
        for block in func.blocks().to_vec() {
            for id in func.block_instrs(block) {
                let Some(intr) = func.instr(id).as_intrinsic() else {
                    continue;
                };
                if intr.num_components == 1 || !is_deref_io(intr.intrinsic) {
                    continue;
                }
                let kind = intr.intrinsic;
                let deref = intr.srcs[0];

                let Some(mode) = deref_instr(func, deref).map(|d| d.mode) else {
                    panic!("{kind} source 0 of {id:?} is not a deref");
                };
                if !mode.intersects(modes) {
                    continue;
                }
                let Some(var) = deref_variable(func, deref) else {
                    panic!("deref chain of {id:?} has no root variable");
                };
                if !can_split(*stage, &variables[var]) {
                    continue;
                }

                let split_in = modes.contains(VariableMode::SHADER_IN) && mode == VariableMode::SHADER_IN;
                let split_out = modes.contains(VariableMode::SHADER_OUT) && mode == VariableMode::SHADER_OUT;
                match kind {
                    Intrinsic::StoreDeref if split_out => {
                        lower_store(func, variables, &mut tables, id, var, &mut stats);
                    }
                    Intrinsic::StoreDeref => {}
                    _ if split_in || split_out => {
                        lower_load(func, variables, &mut tables, id, var, &mut stats);
                    }
                    _ => {}
                }
            }
        }
    }

    let split = tables.split_vars();
    for &var in &split {
        variables.remove(var);
    }
    stats.variables_split = split.len();
    drop(tables);

    remove_dead_derefs(shader);

    if stats.changed() {
        debug!(
            loads = stats.loads_split,
            stores = stats.stores_split,
            variables = stats.variables_split,
            "scalarized I/O variables"
        );
    }
    stats
}

// =============================================================================
// Rewrites
// =============================================================================

/// Rebuild the array steps of `src` on top of `root`, parent first, reusing
/// each original index value.
fn clone_deref_array(b: &mut Builder<'_>, root: ValueId, src: ValueId) -> ValueId {
    let Some(step) = deref_instr(b.func(), src) else {
        panic!("{src:?} is not a deref");
    };
    match step.kind {
        DerefKind::Var(_) => root,
        DerefKind::Array { parent, index } => {
            let parent = clone_deref_array(b, root, parent);
            b.deref_array(parent, index)
        }
    }
}

fn channel_deref(
    b: &mut Builder<'_>,
    variables: &mut Variables,
    tables: &mut SplitTables,
    var: VarId,
    chan: u8,
    src_deref: ValueId,
) -> ValueId {
    let chan_var = tables.channel_var(variables, var, chan);
    let root = b.deref_var(chan_var, &variables[chan_var]);
    clone_deref_array(b, root, src_deref)
}

fn lower_load(
    func: &mut Function,
    variables: &mut Variables,
    tables: &mut SplitTables,
    id: InstrId,
    var: VarId,
    stats: &mut ScalarizeStats,
) {
    let instr = func.instr(id);
    let Some(dest) = instr.dest else {
        panic!("{id:?} loads without a destination");
    };
    let intr: IntrinsicInstr = instr
        .as_intrinsic()
        .cloned()
        .unwrap_or_else(|| unreachable!("checked by caller"));
    let bit_size = func.value(dest).bit_size;
    let frac = variables[var].location_frac;

    let mut b = Builder::at(func, Cursor::Before(id));
    let mut loads: SmallVec<[ValueId; MAX_VEC_COMPONENTS]> = SmallVec::new();
    for i in 0..intr.num_components {
        let deref = channel_deref(&mut b, variables, tables, var, frac + i, intr.srcs[0]);

        let mut srcs: SmallVec<[ValueId; 2]> = SmallVec::from_slice(&[deref]);
        if matches!(
            intr.intrinsic,
            Intrinsic::InterpDerefAtOffset | Intrinsic::InterpDerefAtSample
        ) {
            srcs.push(intr.srcs[1]);
        }
        let chan = IntrinsicInstr::new(intr.intrinsic, 1, &srcs);
        match b.intrinsic(chan, bit_size) {
            Some(value) => loads.push(value),
            None => unreachable!("{} has a destination", intr.intrinsic),
        }
    }
    let combined = b.vec(&loads);

    func.rewrite_uses(dest, combined);
    func.remove_instr(id);

    stats.loads_split += 1;
    stats.channels_emitted += loads.len();
}

fn lower_store(
    func: &mut Function,
    variables: &mut Variables,
    tables: &mut SplitTables,
    id: InstrId,
    var: VarId,
    stats: &mut ScalarizeStats,
) {
    let intr: IntrinsicInstr = func
        .instr(id)
        .as_intrinsic()
        .cloned()
        .unwrap_or_else(|| unreachable!("checked by caller"));
    let frac = variables[var].location_frac;

    let mut b = Builder::at(func, Cursor::Before(id));
    let value = b.ssa_for_src(AluSrc::new(intr.srcs[1]), intr.num_components);
    for i in 0..intr.num_components {
        if intr.write_mask & (1 << i) == 0 {
            stats.masked_channels_skipped += 1;
            continue;
        }
        let deref = channel_deref(&mut b, variables, tables, var, frac + i, intr.srcs[0]);
        let lane = b.channel(value, i);
        b.store_deref(deref, lane, 0x1);
        stats.channels_emitted += 1;
    }

    func.remove_instr(id);
    stats.stores_split += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::shader::{VariableFlags, VARYING_SLOT_POS, VARYING_SLOT_VAR0};
    use crate::ir::types::VarType;
    use crate::ir::verify::verify_shader;

    fn load_var(shader: &mut Shader, var: VarId) -> ValueId {
        let Shader {
            variables,
            functions,
            ..
        } = shader;
        let func = &mut functions[0];
        let entry = func.entry();
        let mut b = Builder::at_end(func, entry);
        let deref = b.deref_var(var, &variables[var]);
        let value = b.load_deref(deref);
        let _neg = b.fneg(value);
        value
    }

    #[test]
    fn test_eligibility_rules() {
        let generic = Variable::new("v", VariableMode::SHADER_IN, VarType::float(4))
            .with_location(VARYING_SLOT_VAR0, 0);
        assert!(can_split(Stage::Fragment, &generic));

        let builtin = generic.clone().with_location(VARYING_SLOT_POS, 0);
        assert!(!can_split(Stage::Fragment, &builtin));
        assert!(can_split(Stage::Vertex, &builtin));

        let patch = generic.clone().with_flags(VariableFlags::PATCH);
        assert!(!can_split(Stage::TessEval, &patch));

        let mut double = generic.clone();
        double.ty = VarType::array(VarType::double(2), 3);
        assert!(!can_split(Stage::Fragment, &double));

        let mut matrix = generic.clone();
        matrix.ty = VarType::array(VarType::mat(2, 2), 2);
        assert!(!can_split(Stage::Fragment, &matrix));
    }

    #[test]
    fn test_load_creates_channel_variables() {
        let mut shader = Shader::new(Stage::Fragment);
        let var = shader.add_variable(
            Variable::new("uv", VariableMode::SHADER_IN, VarType::float(3))
                .with_location(VARYING_SLOT_VAR0 + 1, 1),
        );
        load_var(&mut shader, var);

        let stats = run(&mut shader, VariableMode::SHADER_IN);
        verify_shader(&shader).expect("valid after split");

        assert_eq!(stats.variables_split, 1);
        assert!(!shader.variables.is_declared(var));
        let fracs: Vec<u8> = shader
            .variables
            .declared()
            .iter()
            .map(|&v| shader.variables[v].location_frac)
            .collect();
        assert_eq!(fracs, vec![1, 2, 3]);
        for &v in shader.variables.declared() {
            assert_eq!(shader.variables[v].ty, VarType::float(1));
            assert_eq!(shader.variables[v].location, VARYING_SLOT_VAR0 + 1);
        }
    }

    #[test]
    fn test_channel_variables_are_memoized() {
        let mut shader = Shader::new(Stage::Fragment);
        let var = shader.add_variable(
            Variable::new("uv", VariableMode::SHADER_IN, VarType::float(2))
                .with_location(VARYING_SLOT_VAR0, 0),
        );
        load_var(&mut shader, var);
        load_var(&mut shader, var);

        run(&mut shader, VariableMode::SHADER_IN);
        assert_eq!(shader.variables.len(), 2);
    }

    #[test]
    fn test_always_active_input_is_kept() {
        let mut shader = Shader::new(Stage::Fragment);
        let var = shader.add_variable(
            Variable::new("uv", VariableMode::SHADER_IN, VarType::float(4))
                .with_location(VARYING_SLOT_VAR0, 0)
                .with_flags(VariableFlags::ALWAYS_ACTIVE_IO),
        );
        load_var(&mut shader, var);

        let stats = run(&mut shader, VariableMode::all());
        assert!(!stats.changed());
        assert_eq!(shader.variables.declared(), &[var]);
    }

    #[test]
    fn test_input_store_not_split() {
        let mut shader = Shader::new(Stage::Fragment);
        let var = shader.add_variable(
            Variable::new("tmp", VariableMode::SHADER_IN, VarType::float(2))
                .with_location(VARYING_SLOT_VAR0, 0),
        );
        let Shader {
            variables,
            functions,
            ..
        } = &mut shader;
        let func = &mut functions[0];
        let entry = func.entry();
        let mut b = Builder::at_end(func, entry);
        let deref = b.deref_var(var, &variables[var]);
        let v = b.imm_vec_f32(&[1.0, 2.0]);
        b.store_deref(deref, v, 0b11);

        let stats = run(&mut shader, VariableMode::SHADER_IN);
        assert_eq!(stats.stores_split, 0);
        assert!(shader.variables.is_declared(var));
    }
}
