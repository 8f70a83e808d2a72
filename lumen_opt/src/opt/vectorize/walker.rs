//! Dominance-scoped grouping of same-class instructions.
//!
//! The walk is a scoped symbol table over the dominator tree: each class
//! owns a stack of instructions, ordered so every entry dominates the ones
//! above it. Entering a block pushes (or combines) its instructions; leaving
//! it takes them back out, so sibling subtrees never see each other.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use super::class::ClassKey;
use super::combine::try_combine;
use super::VectorizeStats;
use crate::ir::cfg::{BlockId, DominatorTree};
use crate::ir::function::{Function, Metadata};
use crate::ir::instr::InstrId;

/// Vectorize one function. Returns whether anything was combined.
pub fn vectorize_function(func: &mut Function, max_components: u8, stats: &mut VectorizeStats) -> bool {
    let dom = func.require_dominance().clone();
    let mut set = VecInstrSet::new(max_components);
    let progress = set.visit_block(func, &dom, dom.entry(), stats);
    debug_assert!(set.is_empty(), "equivalence stacks not unwound");

    // Only instructions changed.
    func.preserve_metadata(Metadata::BLOCK_INDEX | Metadata::DOMINANCE);
    progress
}

// =============================================================================
// Equivalence Stacks
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct StackEntry {
    instr: InstrId,
    /// Visit order; within a stack it is also dominance order.
    seq: u32,
}

type Stack = SmallVec<[StackEntry; 4]>;

struct VecInstrSet {
    stacks: FxHashMap<ClassKey, Stack>,
    /// Class of every instruction currently on a stack.
    live: FxHashMap<InstrId, ClassKey>,
    next_seq: u32,
    max_components: u8,
}

impl VecInstrSet {
    fn new(max_components: u8) -> Self {
        Self {
            stacks: FxHashMap::default(),
            live: FxHashMap::default(),
            next_seq: 0,
            max_components,
        }
    }

    fn is_empty(&self) -> bool {
        self.stacks.is_empty() && self.live.is_empty()
    }

    fn visit_block(
        &mut self,
        func: &mut Function,
        dom: &DominatorTree,
        block: BlockId,
        stats: &mut VectorizeStats,
    ) -> bool {
        trace!(block = block.index(), "vectorize: entering block");
        let mut progress = false;

        for id in func.block_instrs(block) {
            if func.instr(id).is_removed() {
                continue;
            }
            progress |= self.add_or_rewrite(func, id, stats);
        }

        for &child in dom.children(block) {
            progress |= self.visit_block(func, dom, child, stats);
        }

        // Wide instructions live in the block of their first half, so the
        // current list is the one to unwind.
        for id in func.block_instrs(block).into_iter().rev() {
            self.remove(id);
        }
        trace!(block = block.index(), "vectorize: leaving block");
        progress
    }

    /// Combine `instr` with the closest dominating member of its class, or
    /// push it as a new entry. Returns whether a combine happened.
    fn add_or_rewrite(&mut self, func: &mut Function, instr: InstrId, stats: &mut VectorizeStats) -> bool {
        let Some(key) = ClassKey::of(func, instr) else {
            return false;
        };

        let stack = self.stacks.entry(key.clone()).or_default();
        for pos in (0..stack.len()).rev() {
            let candidate = stack[pos].instr;
            let Some(combined) = try_combine(func, candidate, instr, self.max_components) else {
                stats.width_rejections += 1;
                continue;
            };

            stack[pos].instr = combined.instr;
            self.live.remove(&candidate);
            self.live.insert(combined.instr, key);
            stats.instructions_combined += 1;
            stats.extractions_emitted += combined.extractions;

            self.reclassify(func, &combined.rewired, stats);
            return true;
        }

        stack.push(StackEntry {
            instr,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        self.live.insert(instr, key);
        false
    }

    /// Move rewired readers that sit on a stack to the class of their new
    /// sources, keeping dominance order.
    fn reclassify(&mut self, func: &Function, rewired: &[InstrId], stats: &mut VectorizeStats) {
        for &user in rewired {
            let Some(old_key) = self.live.remove(&user) else {
                continue;
            };
            let entry = self.detach(&old_key, user);
            let Some(new_key) = ClassKey::of(func, user) else {
                panic!("{user:?} lost eligibility after a source rewrite");
            };

            let stack = self.stacks.entry(new_key.clone()).or_default();
            let pos = stack.partition_point(|e| e.seq < entry.seq);
            stack.insert(pos, entry);
            self.live.insert(user, new_key);
            stats.reclassified_consumers += 1;
        }
    }

    fn remove(&mut self, instr: InstrId) {
        if let Some(key) = self.live.remove(&instr) {
            self.detach(&key, instr);
        }
    }

    fn detach(&mut self, key: &ClassKey, instr: InstrId) -> StackEntry {
        let Some(stack) = self.stacks.get_mut(key) else {
            panic!("{instr:?} tracked under a class with no stack");
        };
        let Some(pos) = stack.iter().position(|e| e.instr == instr) else {
            panic!("{instr:?} missing from its class stack");
        };
        let entry = stack.remove(pos);
        if stack.is_empty() {
            self.stacks.remove(key);
        }
        entry
    }
}
