//! Deref chain queries and dead-deref elimination.

use tracing::debug;

use super::function::Function;
use super::instr::{DerefInstr, DerefKind, InstrId, ValueId};
use super::shader::{Shader, VarId};

/// The deref step defining `value`, if it is one.
pub fn deref_instr(func: &Function, value: ValueId) -> Option<&DerefInstr> {
    func.def_of(value).as_deref()
}

/// Parent step of an array deref; `None` at the root.
pub fn deref_parent(func: &Function, value: ValueId) -> Option<ValueId> {
    match deref_instr(func, value)?.kind {
        DerefKind::Array { parent, .. } => Some(parent),
        DerefKind::Var(_) => None,
    }
}

/// Root variable of a chain.
pub fn deref_variable(func: &Function, value: ValueId) -> Option<VarId> {
    let mut current = value;
    loop {
        match deref_instr(func, current)?.kind {
            DerefKind::Var(var) => return Some(var),
            DerefKind::Array { parent, .. } => current = parent,
        }
    }
}

/// Remove deref steps nobody reads, in every function.
///
/// Removing a leaf releases its parent, so this repeats until nothing
/// changes. Returns whether anything was removed.
pub fn remove_dead_derefs(shader: &mut Shader) -> bool {
    let mut progress = false;
    for func in &mut shader.functions {
        progress |= remove_dead_derefs_in(func);
    }
    progress
}

fn remove_dead_derefs_in(func: &mut Function) -> bool {
    let mut removed = 0usize;
    loop {
        let dead: Vec<InstrId> = func
            .live_instrs()
            .filter(|&id| {
                let instr = func.instr(id);
                instr.as_deref().is_some()
                    && instr.dest.map_or(true, |dest| !func.value(dest).has_uses())
            })
            .collect();
        if dead.is_empty() {
            break;
        }
        // Leaves first, so a parent is released before its own check.
        for &id in dead.iter().rev() {
            func.remove_instr(id);
        }
        removed += dead.len();
    }
    if removed > 0 {
        debug!(function = %func.name, removed, "removed dead derefs");
    }
    removed > 0
}
