//! Basic blocks and dominator analysis.
//!
//! Blocks hold instructions in program order and end in a terminator. There
//! are no phis: values cross blocks only along dominance, so a value defined
//! in block A may be read anywhere A dominates.
//!
//! The dominator tree is built on demand by `Function::require_dominance`
//! and dropped whenever the block structure changes.

use super::arena::{BitSet, Id, SecondaryMap};
use super::function::Function;
use super::instr::{InstrId, ValueId};

use smallvec::SmallVec;

// =============================================================================
// Basic Block
// =============================================================================

/// How control leaves a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Jump(BlockId),
    /// Two-way branch; `cond` lane 0 is tested for non-zero.
    Branch {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
    Return,
}

impl Terminator {
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match *self {
            Terminator::Jump(target) => SmallVec::from_slice(&[target]),
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => SmallVec::from_slice(&[then_block, else_block]),
            Terminator::Return => SmallVec::new(),
        }
    }

    pub fn condition(&self) -> Option<ValueId> {
        match *self {
            Terminator::Branch { cond, .. } => Some(cond),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    /// Instructions in program order.
    pub instrs: Vec<InstrId>,
    pub terminator: Terminator,
    pub preds: Vec<BlockId>,
}

impl Block {
    pub(crate) fn new() -> Self {
        Block {
            instrs: Vec::new(),
            terminator: Terminator::Return,
            preds: Vec::new(),
        }
    }

    /// Position of `instr` within the block.
    pub fn position(&self, instr: InstrId) -> Option<usize> {
        self.instrs.iter().position(|&i| i == instr)
    }
}

/// Block identifier.
pub type BlockId = Id<Block>;

// =============================================================================
// Dominator Tree
// =============================================================================

/// Immediate dominators with ordered children.
///
/// Built with the Cooper-Harvey-Kennedy iterative algorithm over reverse
/// post-order. Children appear in function block order, which makes the
/// pre-order walk deterministic.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    entry: BlockId,
    idom: SecondaryMap<Block, BlockId>,
    children: SecondaryMap<Block, Vec<BlockId>>,
    depth: SecondaryMap<Block, u32>,
    reachable: BitSet,
}

impl DominatorTree {
    pub fn build(func: &Function) -> Self {
        let entry = func.entry();
        let num_blocks = func.num_blocks();

        let rpo = reverse_postorder(func);
        let mut rpo_index: SecondaryMap<Block, u32> = SecondaryMap::with_len(num_blocks);
        let mut reachable = BitSet::with_capacity(num_blocks);
        for (i, &block) in rpo.iter().enumerate() {
            rpo_index.set(block, i as u32);
            reachable.insert(block.as_usize());
        }

        let mut idom: SecondaryMap<Block, BlockId> = SecondaryMap::with_len(num_blocks);
        idom.set(entry, entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom = BlockId::INVALID;
                for &pred in &func.block(block).preds {
                    if !idom[pred].is_valid() {
                        continue;
                    }
                    new_idom = if new_idom.is_valid() {
                        intersect(&idom, &rpo_index, pred, new_idom)
                    } else {
                        pred
                    };
                }
                if new_idom.is_valid() && idom[block] != new_idom {
                    idom.set(block, new_idom);
                    changed = true;
                }
            }
        }

        let mut children: SecondaryMap<Block, Vec<BlockId>> = SecondaryMap::with_len(num_blocks);
        for &block in func.blocks() {
            if block == entry || !reachable.contains(block.as_usize()) {
                continue;
            }
            let parent = idom[block];
            children[parent].push(block);
        }

        let mut tree = DominatorTree {
            entry,
            idom,
            children,
            depth: SecondaryMap::with_len(num_blocks),
            reachable,
        };
        tree.compute_depths();
        tree
    }

    fn compute_depths(&mut self) {
        let mut worklist = vec![(self.entry, 0u32)];
        while let Some((block, depth)) = worklist.pop() {
            self.depth.set(block, depth);
            for &child in &self.children[block] {
                worklist.push((child, depth + 1));
            }
        }
    }

    #[inline]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.reachable.contains(block.as_usize())
    }

    /// Immediate dominator; `None` for the entry and unreachable blocks.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        let idom = self.idom.get(block).copied().unwrap_or(BlockId::INVALID);
        if idom.is_valid() && idom != block {
            Some(idom)
        } else {
            None
        }
    }

    /// Immediately dominated blocks, in block order.
    pub fn children(&self, block: BlockId) -> &[BlockId] {
        self.children
            .get(block)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn depth(&self, block: BlockId) -> u32 {
        self.depth.get(block).copied().unwrap_or(0)
    }

    /// Whether `a` dominates `b` (reflexive).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut current = b;
        while self.depth(current) > self.depth(a) {
            match self.idom(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        current == a
    }

    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }
}

fn intersect(
    idom: &SecondaryMap<Block, BlockId>,
    rpo_index: &SecondaryMap<Block, u32>,
    mut b1: BlockId,
    mut b2: BlockId,
) -> BlockId {
    while b1 != b2 {
        while rpo_index[b1] > rpo_index[b2] {
            b1 = idom[b1];
        }
        while rpo_index[b2] > rpo_index[b1] {
            b2 = idom[b2];
        }
    }
    b1
}

/// Reachable blocks in reverse post-order from the entry.
pub fn reverse_postorder(func: &Function) -> Vec<BlockId> {
    let mut visited = BitSet::with_capacity(func.num_blocks());
    let mut postorder = Vec::with_capacity(func.num_blocks());

    // Iterative DFS: (block, next successor index).
    let mut stack: Vec<(BlockId, usize)> = vec![(func.entry(), 0)];
    visited.insert(func.entry().as_usize());
    while let Some(top) = stack.last_mut() {
        let block = top.0;
        let succs = func.block(block).terminator.successors();
        if let Some(&succ) = succs.get(top.1) {
            top.1 += 1;
            if visited.insert(succ.as_usize()) {
                stack.push((succ, 0));
            }
        } else {
            postorder.push(block);
            stack.pop();
        }
    }

    postorder.reverse();
    postorder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::{AluBuilder, Builder};

    /// entry -> {then, else} -> merge
    fn diamond() -> (Function, [BlockId; 4]) {
        let mut func = Function::new("main");
        let entry = func.entry();
        let then_block = func.add_block();
        let else_block = func.add_block();
        let merge = func.add_block();

        let cond = Builder::at_end(&mut func, entry).imm_u32(1);
        func.set_terminator(
            entry,
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            },
        );
        func.set_terminator(then_block, Terminator::Jump(merge));
        func.set_terminator(else_block, Terminator::Jump(merge));
        (func, [entry, then_block, else_block, merge])
    }

    #[test]
    fn test_diamond_dominators() {
        let (func, [entry, then_block, else_block, merge]) = diamond();
        let dom = DominatorTree::build(&func);

        assert_eq!(dom.idom(entry), None);
        assert_eq!(dom.idom(then_block), Some(entry));
        assert_eq!(dom.idom(merge), Some(entry));
        assert_eq!(dom.children(entry), &[then_block, else_block, merge]);

        assert!(dom.dominates(entry, merge));
        assert!(!dom.dominates(then_block, merge));
        assert!(!dom.dominates(then_block, else_block));
        assert!(dom.dominates(merge, merge));
        assert!(!dom.strictly_dominates(merge, merge));
        assert_eq!(dom.depth(merge), 1);
    }

    #[test]
    fn test_loop_back_edge() {
        let mut func = Function::new("main");
        let entry = func.entry();
        let header = func.add_block();
        let body = func.add_block();
        let exit = func.add_block();

        let cond = Builder::at_end(&mut func, header).imm_u32(0);
        func.set_terminator(entry, Terminator::Jump(header));
        func.set_terminator(
            header,
            Terminator::Branch {
                cond,
                then_block: body,
                else_block: exit,
            },
        );
        func.set_terminator(body, Terminator::Jump(header));

        let dom = DominatorTree::build(&func);
        assert_eq!(dom.idom(body), Some(header));
        assert_eq!(dom.idom(exit), Some(header));
        assert!(dom.dominates(header, body));
        assert_eq!(dom.depth(body), 2);
    }

    #[test]
    fn test_unreachable_block_has_no_idom() {
        let mut func = Function::new("main");
        let orphan = func.add_block();
        let dom = DominatorTree::build(&func);

        assert!(!dom.is_reachable(orphan));
        assert_eq!(dom.idom(orphan), None);
        assert!(!dom.dominates(func.entry(), orphan));
    }
}
