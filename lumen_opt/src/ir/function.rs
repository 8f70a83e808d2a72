//! Function bodies: instruction, value and block storage plus the def/use
//! maintenance primitives every pass relies on.
//!
//! # Invariants
//!
//! - Every live instruction source appears exactly once in the referenced
//!   value's `uses` as `(instr, slot)`; every branch condition appears in
//!   its value's `if_uses`.
//! - An instruction is removed only once its destination has no readers;
//!   removal drops its own source uses but never touches the producers.
//!
//! Violating either is a bug in the caller and panics.

use bitflags::bitflags;
use tracing::trace;

use super::arena::Arena;
use super::cfg::{Block, BlockId, DominatorTree, Terminator};
use super::instr::{
    AluSrc, Instr, InstrFlags, InstrId, InstrKind, SsaValue, Use, ValueId,
};

// =============================================================================
// Cursor
// =============================================================================

/// Insertion point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Before(InstrId),
    After(InstrId),
    BlockStart(BlockId),
    BlockEnd(BlockId),
}

bitflags! {
    /// Analysis results cached on a function.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Metadata: u8 {
        /// Block order indices.
        const BLOCK_INDEX = 1 << 0;
        /// Dominator tree.
        const DOMINANCE = 1 << 1;
    }
}

// =============================================================================
// Function
// =============================================================================

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    instrs: Arena<Instr>,
    values: Arena<SsaValue>,
    blocks: Arena<Block>,
    block_order: Vec<BlockId>,
    entry: BlockId,
    dominance: Option<DominatorTree>,
    valid: Metadata,
}

impl Function {
    /// Create a function with an empty entry block.
    pub fn new(name: impl Into<String>) -> Self {
        let mut blocks = Arena::new();
        let entry = blocks.alloc(Block::new());
        Function {
            name: name.into(),
            instrs: Arena::new(),
            values: Arena::new(),
            blocks,
            block_order: vec![entry],
            entry,
            dominance: None,
            valid: Metadata::empty(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// Blocks in layout order.
    #[inline]
    pub fn blocks(&self) -> &[BlockId] {
        &self.block_order
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    #[inline]
    pub fn instr(&self, id: InstrId) -> &Instr {
        &self.instrs[id]
    }

    #[inline]
    pub fn value(&self, id: ValueId) -> &SsaValue {
        &self.values[id]
    }

    /// Whether `id` names an allocated value.
    pub fn has_value(&self, id: ValueId) -> bool {
        self.values.get(id).is_some()
    }

    /// Number of values ever allocated, removed ones included.
    pub fn value_capacity(&self) -> usize {
        self.values.len()
    }

    /// Defining instruction of a value.
    #[inline]
    pub fn def_of(&self, value: ValueId) -> &Instr {
        &self.instrs[self.values[value].def]
    }

    /// Snapshot of a block's instructions, safe to iterate while mutating.
    pub fn block_instrs(&self, block: BlockId) -> Vec<InstrId> {
        self.blocks[block].instrs.clone()
    }

    /// Live instructions in layout order.
    pub fn live_instrs(&self) -> impl Iterator<Item = InstrId> + '_ {
        self.block_order
            .iter()
            .flat_map(move |&b| self.blocks[b].instrs.iter().copied())
    }

    /// Lanes read through ALU source `slot`.
    pub fn alu_src_components(&self, instr: InstrId, slot: usize) -> u8 {
        let instr = &self.instrs[instr];
        let alu = instr
            .as_alu()
            .unwrap_or_else(|| panic!("alu_src_components on non-ALU instruction"));
        match alu.op.info().input_sizes[slot] {
            0 => self.dest_components(instr),
            n => n,
        }
    }

    fn dest_components(&self, instr: &Instr) -> u8 {
        match instr.dest {
            Some(dest) => self.values[dest].num_components,
            None => 0,
        }
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Append an empty block (terminated by `Return`).
    pub fn add_block(&mut self) -> BlockId {
        let id = self.blocks.alloc(Block::new());
        self.block_order.push(id);
        self.valid = Metadata::empty();
        self.dominance = None;
        id
    }

    /// Replace a block's terminator, keeping predecessor lists and
    /// condition if-uses in sync.
    pub fn set_terminator(&mut self, block: BlockId, terminator: Terminator) {
        let old = self.blocks[block].terminator;
        for succ in old.successors() {
            let preds = &mut self.blocks[succ].preds;
            if let Some(pos) = preds.iter().position(|&p| p == block) {
                preds.swap_remove(pos);
            }
        }
        if let Some(cond) = old.condition() {
            self.remove_if_use(cond, block);
        }

        for succ in terminator.successors() {
            self.blocks[succ].preds.push(block);
        }
        if let Some(cond) = terminator.condition() {
            self.values[cond].if_uses.push(block);
        }
        self.blocks[block].terminator = terminator;

        self.valid = Metadata::empty();
        self.dominance = None;
    }

    /// Redirect a branch condition.
    pub fn rewrite_if_condition(&mut self, block: BlockId, new_cond: ValueId) {
        let Terminator::Branch {
            cond,
            then_block,
            else_block,
        } = self.blocks[block].terminator
        else {
            panic!("block {block:?} does not end in a branch");
        };
        self.remove_if_use(cond, block);
        self.values[new_cond].if_uses.push(block);
        self.blocks[block].terminator = Terminator::Branch {
            cond: new_cond,
            then_block,
            else_block,
        };
    }

    fn remove_if_use(&mut self, value: ValueId, block: BlockId) {
        let if_uses = &mut self.values[value].if_uses;
        let pos = if_uses
            .iter()
            .position(|&b| b == block)
            .unwrap_or_else(|| panic!("if-use of {value:?} by {block:?} missing"));
        if_uses.swap_remove(pos);
    }

    // =========================================================================
    // Instructions
    // =========================================================================

    /// Create an instruction at `cursor`, allocating a destination of
    /// `(num_components, bit_size)` when given.
    pub fn insert(
        &mut self,
        cursor: Cursor,
        kind: InstrKind,
        dest: Option<(u8, u8)>,
    ) -> InstrId {
        let (block, pos) = self.resolve(cursor);
        let id = self.instrs.alloc(Instr {
            kind,
            block,
            dest: None,
            flags: InstrFlags::empty(),
        });

        for (slot, value) in self.instrs[id].src_values().into_iter().enumerate() {
            assert!(
                self.has_value(value),
                "source {slot} of new instruction references unknown value {value:?}"
            );
            self.values[value].uses.push(Use {
                instr: id,
                slot: slot as u8,
            });
        }

        if let Some((num_components, bit_size)) = dest {
            assert!(
                (1..=4).contains(&num_components),
                "destination width {num_components} out of range"
            );
            let value = self.values.alloc(SsaValue {
                def: id,
                num_components,
                bit_size,
                uses: Vec::new(),
                if_uses: Vec::new(),
            });
            self.instrs[id].dest = Some(value);
        }

        self.blocks[block].instrs.insert(pos, id);
        id
    }

    fn resolve(&self, cursor: Cursor) -> (BlockId, usize) {
        match cursor {
            Cursor::BlockStart(block) => (block, 0),
            Cursor::BlockEnd(block) => (block, self.blocks[block].instrs.len()),
            Cursor::Before(instr) | Cursor::After(instr) => {
                let block = self.instrs[instr].block;
                let pos = self.blocks[block]
                    .position(instr)
                    .unwrap_or_else(|| panic!("cursor instruction {instr:?} is not linked"));
                let offset = matches!(cursor, Cursor::After(_)) as usize;
                (block, pos + offset)
            }
        }
    }

    /// Point source `slot` of `instr` at `value`, moving the use record.
    pub fn rewrite_src(&mut self, instr: InstrId, slot: usize, value: ValueId) {
        let old = self.instrs[instr].src(slot);
        if old == value {
            return;
        }
        self.unlink_use(old, instr, slot);
        self.values[value].uses.push(Use {
            instr,
            slot: slot as u8,
        });
        self.instrs[instr].set_src(slot, value);
    }

    /// Replace an ALU operand, swizzle included.
    pub fn rewrite_alu_src(&mut self, instr: InstrId, slot: usize, src: AluSrc) {
        self.rewrite_src(instr, slot, src.value);
        match &mut self.instrs[instr].kind {
            InstrKind::Alu(alu) => alu.srcs[slot].swizzle = src.swizzle,
            _ => panic!("rewrite_alu_src on non-ALU instruction {instr:?}"),
        }
    }

    /// Mutable access to an ALU operand's swizzle.
    pub fn alu_swizzle_mut(&mut self, instr: InstrId, slot: usize) -> &mut [u8; 4] {
        match &mut self.instrs[instr].kind {
            InstrKind::Alu(alu) => &mut alu.srcs[slot].swizzle,
            _ => panic!("alu_swizzle_mut on non-ALU instruction {instr:?}"),
        }
    }

    /// Redirect every reader of `old`, branch conditions included, to `new`.
    pub fn rewrite_uses(&mut self, old: ValueId, new: ValueId) {
        assert_ne!(old, new, "cannot rewrite {old:?} onto itself");
        let uses = std::mem::take(&mut self.values[old].uses);
        for u in &uses {
            self.instrs[u.instr].set_src(u.slot as usize, new);
        }
        self.values[new].uses.extend(uses);

        let if_uses = std::mem::take(&mut self.values[old].if_uses);
        for &block in &if_uses {
            if let Terminator::Branch { cond, .. } = &mut self.blocks[block].terminator {
                *cond = new;
            }
        }
        self.values[new].if_uses.extend(if_uses);
    }

    fn unlink_use(&mut self, value: ValueId, instr: InstrId, slot: usize) {
        let uses = &mut self.values[value].uses;
        let pos = uses
            .iter()
            .position(|u| u.instr == instr && u.slot as usize == slot)
            .unwrap_or_else(|| panic!("use of {value:?} by {instr:?}[{slot}] missing"));
        uses.swap_remove(pos);
    }

    /// Unlink `instr` from its block and release its sources.
    pub fn remove_instr(&mut self, instr: InstrId) {
        assert!(
            !self.instrs[instr].is_removed(),
            "instruction {instr:?} removed twice"
        );
        if let Some(dest) = self.instrs[instr].dest {
            assert!(
                !self.values[dest].has_uses(),
                "removing {instr:?} while its destination {dest:?} still has readers"
            );
        }

        let srcs = self.instrs[instr].src_values();
        for (slot, value) in srcs.into_iter().enumerate() {
            self.unlink_use(value, instr, slot);
        }

        let block = self.instrs[instr].block;
        let instrs = &mut self.blocks[block].instrs;
        if let Some(pos) = instrs.iter().position(|&i| i == instr) {
            instrs.remove(pos);
        }
        self.instrs[instr].flags.insert(InstrFlags::REMOVED);
        trace!(instr = instr.index(), "removed instruction");
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Dominator tree, computed if not cached.
    pub fn require_dominance(&mut self) -> &DominatorTree {
        if self.dominance.is_none() {
            self.dominance = Some(DominatorTree::build(self));
            self.valid |= Metadata::DOMINANCE;
        }
        self.dominance
            .as_ref()
            .unwrap_or_else(|| unreachable!("dominance just computed"))
    }

    /// Cached dominator tree, if still valid.
    pub fn dominance(&self) -> Option<&DominatorTree> {
        self.dominance.as_ref()
    }

    /// Drop every cached analysis not in `preserved`.
    pub fn preserve_metadata(&mut self, preserved: Metadata) {
        self.valid &= preserved;
        if !self.valid.contains(Metadata::DOMINANCE) {
            self.dominance = None;
        }
    }

    pub fn valid_metadata(&self) -> Metadata {
        self.valid
    }
}
