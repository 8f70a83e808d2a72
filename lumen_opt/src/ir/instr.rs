//! SSA instructions and values.
//!
//! An instruction owns an ordered list of *source slots*, each naming the
//! `ValueId` it reads. Values keep back-references to every reader as
//! `(instruction, slot)` pairs so rewrites can find consumers without a scan.
//!
//! Slot numbering per kind:
//! - **ALU**: slot `i` is `srcs[i].value`
//! - **Intrinsic**: slot `i` is `srcs[i]`
//! - **Deref**: an array step has the parent at slot 0 and the index at slot 1

use bitflags::bitflags;
use smallvec::{smallvec, SmallVec};

use super::arena::Id;
use super::cfg::BlockId;
use super::operators::{AluOp, Intrinsic, MAX_VEC_COMPONENTS};
use super::shader::{VarId, VariableMode};
use super::types::VarType;

/// Instruction identifier.
pub type InstrId = Id<Instr>;

/// SSA value identifier.
pub type ValueId = Id<SsaValue>;

/// Identity lane selection.
pub const IDENTITY_SWIZZLE: [u8; MAX_VEC_COMPONENTS] = [0, 1, 2, 3];

// =============================================================================
// Sources
// =============================================================================

/// ALU operand: a value plus the lanes read from it.
///
/// Lane `i` of the instruction reads lane `swizzle[i]` of `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluSrc {
    pub value: ValueId,
    pub swizzle: [u8; MAX_VEC_COMPONENTS],
}

impl AluSrc {
    #[inline]
    pub const fn new(value: ValueId) -> Self {
        AluSrc {
            value,
            swizzle: IDENTITY_SWIZZLE,
        }
    }

    /// Read the given lanes; unused trailing lanes repeat the last one.
    pub fn lanes(value: ValueId, lanes: &[u8]) -> Self {
        assert!(
            !lanes.is_empty() && lanes.len() <= MAX_VEC_COMPONENTS,
            "swizzle needs 1..=4 lanes, got {}",
            lanes.len()
        );
        let mut swizzle = [lanes[lanes.len() - 1]; MAX_VEC_COMPONENTS];
        swizzle[..lanes.len()].copy_from_slice(lanes);
        AluSrc { value, swizzle }
    }

    /// Read a single lane.
    #[inline]
    pub fn channel(value: ValueId, lane: u8) -> Self {
        AluSrc {
            value,
            swizzle: [lane; MAX_VEC_COMPONENTS],
        }
    }
}

// =============================================================================
// Instruction Kinds
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AluInstr {
    pub op: AluOp,
    pub srcs: SmallVec<[AluSrc; 3]>,
}

/// Load/store/interpolate intrinsic with its constant indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrinsicInstr {
    pub intrinsic: Intrinsic,
    /// Channels loaded or stored.
    pub num_components: u8,
    pub srcs: SmallVec<[ValueId; 2]>,
    /// Driver location of a flat access.
    pub base: u32,
    /// First channel within the slot for a flat access.
    pub component: u8,
    /// Written channels, stores only.
    pub write_mask: u8,
}

impl IntrinsicInstr {
    pub fn new(intrinsic: Intrinsic, num_components: u8, srcs: &[ValueId]) -> Self {
        IntrinsicInstr {
            intrinsic,
            num_components,
            srcs: SmallVec::from_slice(srcs),
            base: 0,
            component: 0,
            write_mask: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefKind {
    /// Root of a chain.
    Var(VarId),
    /// `parent[index]`.
    Array { parent: ValueId, index: ValueId },
}

/// One step of a deref chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerefInstr {
    pub kind: DerefKind,
    pub mode: VariableMode,
    /// Type of the location this step points at.
    pub ty: VarType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    Alu(AluInstr),
    Intrinsic(IntrinsicInstr),
    Deref(DerefInstr),
    /// Raw 32-bit lane values.
    LoadConst(SmallVec<[u32; MAX_VEC_COMPONENTS]>),
    Undef,
}

bitflags! {
    /// Per-instruction state flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InstrFlags: u8 {
        /// Unlinked from its block; the id stays allocated.
        const REMOVED = 1 << 0;
    }
}

// =============================================================================
// Instruction
// =============================================================================

#[derive(Debug, Clone)]
pub struct Instr {
    pub kind: InstrKind,
    pub block: BlockId,
    pub dest: Option<ValueId>,
    pub flags: InstrFlags,
}

impl Instr {
    #[inline]
    pub fn is_removed(&self) -> bool {
        self.flags.contains(InstrFlags::REMOVED)
    }

    pub fn as_alu(&self) -> Option<&AluInstr> {
        match &self.kind {
            InstrKind::Alu(alu) => Some(alu),
            _ => None,
        }
    }

    pub fn as_intrinsic(&self) -> Option<&IntrinsicInstr> {
        match &self.kind {
            InstrKind::Intrinsic(intr) => Some(intr),
            _ => None,
        }
    }

    pub fn as_deref(&self) -> Option<&DerefInstr> {
        match &self.kind {
            InstrKind::Deref(deref) => Some(deref),
            _ => None,
        }
    }

    pub fn is_alu(&self) -> bool {
        matches!(self.kind, InstrKind::Alu(_))
    }

    /// Number of source slots.
    pub fn num_srcs(&self) -> usize {
        match &self.kind {
            InstrKind::Alu(alu) => alu.srcs.len(),
            InstrKind::Intrinsic(intr) => intr.srcs.len(),
            InstrKind::Deref(DerefInstr {
                kind: DerefKind::Array { .. },
                ..
            }) => 2,
            _ => 0,
        }
    }

    /// Value read by `slot`.
    pub fn src(&self, slot: usize) -> ValueId {
        match &self.kind {
            InstrKind::Alu(alu) => alu.srcs[slot].value,
            InstrKind::Intrinsic(intr) => intr.srcs[slot],
            InstrKind::Deref(DerefInstr {
                kind: DerefKind::Array { parent, index },
                ..
            }) => match slot {
                0 => *parent,
                1 => *index,
                _ => panic!("deref array has no source slot {slot}"),
            },
            _ => panic!("instruction has no source slot {slot}"),
        }
    }

    /// Every source value in slot order.
    pub fn src_values(&self) -> SmallVec<[ValueId; 4]> {
        match &self.kind {
            InstrKind::Alu(alu) => alu.srcs.iter().map(|s| s.value).collect(),
            InstrKind::Intrinsic(intr) => intr.srcs.iter().copied().collect(),
            InstrKind::Deref(DerefInstr {
                kind: DerefKind::Array { parent, index },
                ..
            }) => smallvec![*parent, *index],
            _ => SmallVec::new(),
        }
    }

    /// Overwrite the value in `slot`; use lists are the caller's job.
    pub(crate) fn set_src(&mut self, slot: usize, value: ValueId) {
        match &mut self.kind {
            InstrKind::Alu(alu) => alu.srcs[slot].value = value,
            InstrKind::Intrinsic(intr) => intr.srcs[slot] = value,
            InstrKind::Deref(DerefInstr {
                kind: DerefKind::Array { parent, index },
                ..
            }) => match slot {
                0 => *parent = value,
                1 => *index = value,
                _ => panic!("deref array has no source slot {slot}"),
            },
            _ => panic!("instruction has no source slot {slot}"),
        }
    }
}

// =============================================================================
// SSA Values
// =============================================================================

/// A reader of a value: `instr` reads it through source `slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Use {
    pub instr: InstrId,
    pub slot: u8,
}

/// SSA value, defined exactly once.
#[derive(Debug, Clone)]
pub struct SsaValue {
    pub def: InstrId,
    pub num_components: u8,
    pub bit_size: u8,
    pub uses: Vec<Use>,
    /// Blocks whose branch condition is this value.
    pub if_uses: Vec<BlockId>,
}

impl SsaValue {
    pub fn has_uses(&self) -> bool {
        !self.uses.is_empty() || !self.if_uses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alu_src_lanes_pads_with_last() {
        let v = ValueId::new(3);
        let src = AluSrc::lanes(v, &[2, 0]);
        assert_eq!(src.swizzle, [2, 0, 0, 0]);
        assert_eq!(AluSrc::channel(v, 1).swizzle, [1; 4]);
        assert_eq!(AluSrc::new(v).swizzle, IDENTITY_SWIZZLE);
    }

    #[test]
    fn test_deref_array_slots() {
        let parent = ValueId::new(1);
        let index = ValueId::new(2);
        let mut instr = Instr {
            kind: InstrKind::Deref(DerefInstr {
                kind: DerefKind::Array { parent, index },
                mode: VariableMode::SHADER_IN,
                ty: VarType::float(4),
            }),
            block: BlockId::new(0),
            dest: None,
            flags: InstrFlags::empty(),
        };

        assert_eq!(instr.num_srcs(), 2);
        assert_eq!(instr.src(1), index);

        instr.set_src(1, ValueId::new(9));
        assert_eq!(instr.src_values().as_slice(), &[parent, ValueId::new(9)]);
    }

    #[test]
    #[should_panic(expected = "1..=4 lanes")]
    fn test_alu_src_rejects_wide_swizzle() {
        AluSrc::lanes(ValueId::new(0), &[0, 1, 2, 3, 0]);
    }
}
