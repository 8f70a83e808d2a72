use super::Builder;
use crate::ir::instr::{IntrinsicInstr, InstrId, InstrKind, ValueId};
use crate::ir::operators::Intrinsic;
use crate::ir::types::VarType;

/// Builder trait for I/O intrinsics.
pub trait IntrinsicBuilder {
    /// Insert any intrinsic; returns its destination when it has one.
    fn intrinsic(&mut self, instr: IntrinsicInstr, bit_size: u8) -> Option<ValueId>;

    // Flat I/O
    fn load_input(&mut self, num_components: u8, bit_size: u8, offset: ValueId, base: u32, component: u8) -> ValueId;
    fn store_output(&mut self, value: ValueId, offset: ValueId, base: u32, component: u8, write_mask: u8) -> InstrId;
    fn load_uniform(&mut self, num_components: u8, bit_size: u8, offset: ValueId, base: u32) -> ValueId;

    // Deref I/O
    fn load_deref(&mut self, deref: ValueId) -> ValueId;
    fn store_deref(&mut self, deref: ValueId, value: ValueId, write_mask: u8) -> InstrId;
    fn interp_deref_at_centroid(&mut self, deref: ValueId) -> ValueId;
    fn interp_deref_at_sample(&mut self, deref: ValueId, sample: ValueId) -> ValueId;
    fn interp_deref_at_offset(&mut self, deref: ValueId, offset: ValueId) -> ValueId;
}

impl Builder<'_> {
    /// Type of the location a deref value points at.
    pub fn deref_type(&self, deref: ValueId) -> &VarType {
        match self.func.def_of(deref).as_deref() {
            Some(d) => &d.ty,
            None => panic!("{deref:?} is not a deref"),
        }
    }

    fn deref_access(&mut self, intrinsic: Intrinsic, srcs: &[ValueId]) -> ValueId {
        let ty = self.deref_type(srcs[0]);
        let (num_components, bit_size) = (ty.components(), ty.bit_size());
        let instr = IntrinsicInstr::new(intrinsic, num_components, srcs);
        match self.intrinsic(instr, bit_size) {
            Some(value) => value,
            None => unreachable!("{intrinsic} has a destination"),
        }
    }
}

impl IntrinsicBuilder for Builder<'_> {
    fn intrinsic(&mut self, instr: IntrinsicInstr, bit_size: u8) -> Option<ValueId> {
        assert_eq!(
            instr.srcs.len(),
            instr.intrinsic.num_srcs(),
            "{} takes {} sources",
            instr.intrinsic,
            instr.intrinsic.num_srcs()
        );
        if instr.intrinsic.has_dest() {
            let n = instr.num_components;
            Some(self.insert_value(InstrKind::Intrinsic(instr), n, bit_size))
        } else {
            self.insert(InstrKind::Intrinsic(instr), None);
            None
        }
    }

    fn load_input(&mut self, num_components: u8, bit_size: u8, offset: ValueId, base: u32, component: u8) -> ValueId {
        let mut instr = IntrinsicInstr::new(Intrinsic::LoadInput, num_components, &[offset]);
        instr.base = base;
        instr.component = component;
        match self.intrinsic(instr, bit_size) {
            Some(value) => value,
            None => unreachable!("load_input has a destination"),
        }
    }

    fn store_output(&mut self, value: ValueId, offset: ValueId, base: u32, component: u8, write_mask: u8) -> InstrId {
        let num_components = self.components(value);
        let mut instr = IntrinsicInstr::new(Intrinsic::StoreOutput, num_components, &[value, offset]);
        instr.base = base;
        instr.component = component;
        instr.write_mask = write_mask;
        self.insert(InstrKind::Intrinsic(instr), None)
    }

    fn load_uniform(&mut self, num_components: u8, bit_size: u8, offset: ValueId, base: u32) -> ValueId {
        let mut instr = IntrinsicInstr::new(Intrinsic::LoadUniform, num_components, &[offset]);
        instr.base = base;
        match self.intrinsic(instr, bit_size) {
            Some(value) => value,
            None => unreachable!("load_uniform has a destination"),
        }
    }

    fn load_deref(&mut self, deref: ValueId) -> ValueId {
        self.deref_access(Intrinsic::LoadDeref, &[deref])
    }

    fn store_deref(&mut self, deref: ValueId, value: ValueId, write_mask: u8) -> InstrId {
        let num_components = self.components(value);
        let mut instr = IntrinsicInstr::new(Intrinsic::StoreDeref, num_components, &[deref, value]);
        instr.write_mask = write_mask;
        self.insert(InstrKind::Intrinsic(instr), None)
    }

    fn interp_deref_at_centroid(&mut self, deref: ValueId) -> ValueId {
        self.deref_access(Intrinsic::InterpDerefAtCentroid, &[deref])
    }

    fn interp_deref_at_sample(&mut self, deref: ValueId, sample: ValueId) -> ValueId {
        self.deref_access(Intrinsic::InterpDerefAtSample, &[deref, sample])
    }

    fn interp_deref_at_offset(&mut self, deref: ValueId, offset: ValueId) -> ValueId {
        self.deref_access(Intrinsic::InterpDerefAtOffset, &[deref, offset])
    }
}
