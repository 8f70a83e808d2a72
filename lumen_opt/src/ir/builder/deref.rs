use super::Builder;
use crate::ir::instr::{DerefInstr, DerefKind, InstrKind, ValueId};
use crate::ir::shader::{VarId, Variable};
use crate::ir::types::VarType;

/// Builder trait for deref chains.
pub trait DerefBuilder {
    /// Root step naming `var`; `variable` is its declaration.
    fn deref_var(&mut self, var: VarId, variable: &Variable) -> ValueId;
    /// `parent[index]`, reusing the given index value.
    fn deref_array(&mut self, parent: ValueId, index: ValueId) -> ValueId;
}

impl DerefBuilder for Builder<'_> {
    fn deref_var(&mut self, var: VarId, variable: &Variable) -> ValueId {
        let kind = InstrKind::Deref(DerefInstr {
            kind: DerefKind::Var(var),
            mode: variable.mode,
            ty: variable.ty.clone(),
        });
        self.insert_value(kind, 1, 32)
    }

    fn deref_array(&mut self, parent: ValueId, index: ValueId) -> ValueId {
        let parent_deref = match self.func.def_of(parent).as_deref() {
            Some(d) => d,
            None => panic!("array deref parent {parent:?} is not a deref"),
        };
        let element = match &parent_deref.ty {
            VarType::Array { element, .. } => element.as_ref().clone(),
            other => panic!("cannot index non-array type {other}"),
        };
        let kind = InstrKind::Deref(DerefInstr {
            kind: DerefKind::Array { parent, index },
            mode: parent_deref.mode,
            ty: element,
        });
        self.insert_value(kind, 1, 32)
    }
}
