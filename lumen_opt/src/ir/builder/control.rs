use super::Builder;
use crate::ir::cfg::{BlockId, Terminator};
use crate::ir::function::Cursor;
use crate::ir::instr::ValueId;

/// Builder trait for blocks and terminators.
///
/// Terminators apply to the block the cursor currently sits in.
pub trait ControlBuilder {
    fn add_block(&mut self) -> BlockId;
    /// Move the cursor to the end of `block`.
    fn switch_to(&mut self, block: BlockId);
    fn current_block(&self) -> BlockId;

    fn jump(&mut self, target: BlockId);
    fn branch(&mut self, cond: ValueId, then_block: BlockId, else_block: BlockId);
    fn ret(&mut self);
}

impl ControlBuilder for Builder<'_> {
    fn add_block(&mut self) -> BlockId {
        self.func.add_block()
    }

    fn switch_to(&mut self, block: BlockId) {
        self.set_cursor(Cursor::BlockEnd(block));
    }

    fn current_block(&self) -> BlockId {
        match self.cursor() {
            Cursor::BlockStart(block) | Cursor::BlockEnd(block) => block,
            Cursor::Before(instr) | Cursor::After(instr) => self.func.instr(instr).block,
        }
    }

    fn jump(&mut self, target: BlockId) {
        let block = self.current_block();
        self.func.set_terminator(block, Terminator::Jump(target));
    }

    fn branch(&mut self, cond: ValueId, then_block: BlockId, else_block: BlockId) {
        let block = self.current_block();
        self.func.set_terminator(
            block,
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            },
        );
    }

    fn ret(&mut self) {
        let block = self.current_block();
        self.func.set_terminator(block, Terminator::Return);
    }
}
