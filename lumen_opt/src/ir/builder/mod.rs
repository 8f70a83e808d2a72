//! Cursor-based instruction builder.
//!
//! A `Builder` borrows a function and inserts at its cursor. After every
//! insertion the cursor moves to just after the new instruction, so a run of
//! builds lands in program order. Construction helpers are grouped into
//! traits by instruction family, all implemented on `Builder`.

use crate::ir::cfg::BlockId;
use crate::ir::function::{Cursor, Function};
use crate::ir::instr::{InstrId, InstrKind, ValueId};

pub mod alu;
pub mod control;
pub mod deref;
pub mod intrinsics;

#[cfg(test)]
mod tests;

pub use alu::AluBuilder;
pub use control::ControlBuilder;
pub use deref::DerefBuilder;
pub use intrinsics::IntrinsicBuilder;

/// Inserts instructions into a function at a moving cursor.
pub struct Builder<'f> {
    pub(crate) func: &'f mut Function,
    cursor: Cursor,
}

impl<'f> Builder<'f> {
    pub fn at(func: &'f mut Function, cursor: Cursor) -> Self {
        Builder { func, cursor }
    }

    /// Builder appending to the end of `block`.
    pub fn at_end(func: &'f mut Function, block: BlockId) -> Self {
        Builder {
            func,
            cursor: Cursor::BlockEnd(block),
        }
    }

    #[inline]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    pub fn func(&self) -> &Function {
        self.func
    }

    pub fn func_mut(&mut self) -> &mut Function {
        self.func
    }

    /// Insert at the cursor and advance past the new instruction.
    pub fn insert(&mut self, kind: InstrKind, dest: Option<(u8, u8)>) -> InstrId {
        let id = self.func.insert(self.cursor, kind, dest);
        self.cursor = Cursor::After(id);
        id
    }

    /// Insert an instruction that must produce a value.
    pub(crate) fn insert_value(&mut self, kind: InstrKind, num_components: u8, bit_size: u8) -> ValueId {
        let id = self.insert(kind, Some((num_components, bit_size)));
        match self.func.instr(id).dest {
            Some(value) => value,
            None => unreachable!("destination requested"),
        }
    }

    /// Channel count of a value.
    #[inline]
    pub fn components(&self, value: ValueId) -> u8 {
        self.func.value(value).num_components
    }

    #[inline]
    pub fn bit_size(&self, value: ValueId) -> u8 {
        self.func.value(value).bit_size
    }
}
