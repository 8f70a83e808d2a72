//! Shaders and their variables.
//!
//! A shader owns its variables and function bodies. Variables live in an
//! arena so ids stay stable; the *declared* list is the ordered subset the
//! shader currently exposes. Removing a variable unlinks it from that list
//! but keeps its data, so stale derefs can still be inspected until they are
//! swept.

use std::ops::{Index, IndexMut};

use bitflags::bitflags;

use super::arena::{Arena, Id};
use super::function::Function;
use super::types::VarType;

/// Variable identifier.
pub type VarId = Id<Variable>;

/// First generic varying slot; locations below it are fixed built-ins.
pub const VARYING_SLOT_VAR0: i32 = 32;

/// Clip-space position built-in.
pub const VARYING_SLOT_POS: i32 = 0;

// =============================================================================
// Stage & Modes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex,
    TessCtrl,
    TessEval,
    Geometry,
    Fragment,
    Compute,
}

bitflags! {
    /// Storage class of a variable, also used as a pass mode mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VariableMode: u32 {
        const SHADER_IN = 1 << 0;
        const SHADER_OUT = 1 << 1;
        const UNIFORM = 1 << 2;
        const FUNCTION_TEMP = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VariableFlags: u8 {
        /// One value per patch rather than per vertex.
        const PATCH = 1 << 0;
        /// Every channel must stay live, even unused ones.
        const ALWAYS_ACTIVE_IO = 1 << 1;
        const INVARIANT = 1 << 2;
    }
}

// =============================================================================
// Variable
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub mode: VariableMode,
    pub ty: VarType,
    /// Varying slot, or -1 when unassigned.
    pub location: i32,
    /// First channel within the slot.
    pub location_frac: u8,
    pub flags: VariableFlags,
    pub driver_location: u32,
}

impl Variable {
    pub fn new(name: impl Into<String>, mode: VariableMode, ty: VarType) -> Self {
        Variable {
            name: name.into(),
            mode,
            ty,
            location: -1,
            location_frac: 0,
            flags: VariableFlags::empty(),
            driver_location: 0,
        }
    }

    pub fn with_location(mut self, location: i32, location_frac: u8) -> Self {
        self.location = location;
        self.location_frac = location_frac;
        self
    }

    pub fn with_flags(mut self, flags: VariableFlags) -> Self {
        self.flags = flags;
        self
    }

    #[inline]
    pub fn is_patch(&self) -> bool {
        self.flags.contains(VariableFlags::PATCH)
    }

    #[inline]
    pub fn always_active_io(&self) -> bool {
        self.flags.contains(VariableFlags::ALWAYS_ACTIVE_IO)
    }

    /// Assigned to a fixed built-in slot.
    pub fn is_builtin_location(&self) -> bool {
        (0..VARYING_SLOT_VAR0).contains(&self.location)
    }
}

// =============================================================================
// Variable List
// =============================================================================

/// Variable storage plus the ordered declared list.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    arena: Arena<Variable>,
    declared: Vec<VarId>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store and declare a variable.
    pub fn add(&mut self, var: Variable) -> VarId {
        let id = self.arena.alloc(var);
        self.declared.push(id);
        id
    }

    /// Drop `id` from the declared list; its data stays readable.
    pub fn remove(&mut self, id: VarId) {
        self.declared.retain(|&v| v != id);
    }

    /// Copy of a variable's data, ready to adjust and `add`.
    pub fn clone_variable(&self, id: VarId) -> Variable {
        self.arena[id].clone()
    }

    pub fn get(&self, id: VarId) -> Option<&Variable> {
        self.arena.get(id)
    }

    pub fn declared(&self) -> &[VarId] {
        &self.declared
    }

    pub fn is_declared(&self, id: VarId) -> bool {
        self.declared.contains(&id)
    }

    /// Declared variables whose mode intersects `modes`.
    pub fn with_mode(&self, modes: VariableMode) -> impl Iterator<Item = VarId> + '_ {
        self.declared
            .iter()
            .copied()
            .filter(move |&id| self.arena[id].mode.intersects(modes))
    }

    pub fn find(&self, name: &str) -> Option<VarId> {
        self.declared
            .iter()
            .copied()
            .find(|&id| self.arena[id].name == name)
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }
}

impl Index<VarId> for Variables {
    type Output = Variable;

    fn index(&self, id: VarId) -> &Self::Output {
        &self.arena[id]
    }
}

impl IndexMut<VarId> for Variables {
    fn index_mut(&mut self, id: VarId) -> &mut Self::Output {
        &mut self.arena[id]
    }
}

// =============================================================================
// Shader
// =============================================================================

#[derive(Debug, Clone)]
pub struct Shader {
    pub stage: Stage,
    pub variables: Variables,
    pub functions: Vec<Function>,
}

impl Shader {
    /// Shader with a single empty `main`.
    pub fn new(stage: Stage) -> Self {
        Shader {
            stage,
            variables: Variables::new(),
            functions: vec![Function::new("main")],
        }
    }

    pub fn main(&self) -> &Function {
        &self.functions[0]
    }

    pub fn main_mut(&mut self) -> &mut Function {
        &mut self.functions[0]
    }

    pub fn add_variable(&mut self, var: Variable) -> VarId {
        self.variables.add(var)
    }
}
