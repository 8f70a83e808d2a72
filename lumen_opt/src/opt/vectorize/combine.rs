//! Merging two same-class instructions into one wider instruction.

use smallvec::SmallVec;
use tracing::debug;

use crate::ir::builder::{AluBuilder, Builder};
use crate::ir::function::{Cursor, Function};
use crate::ir::instr::{AluInstr, AluSrc, InstrId, InstrKind, ValueId};
use crate::ir::operators::MAX_VEC_COMPONENTS;

/// Outcome of a successful combine.
#[derive(Debug, Clone)]
pub struct Combined {
    /// The wide instruction now standing in for both halves.
    pub instr: InstrId,
    /// ALU readers whose sources were pointed at the wide result.
    pub rewired: SmallVec<[InstrId; 4]>,
    /// Lane extractions emitted for non-ALU readers and branch conditions.
    pub extractions: usize,
}

/// Which half of the wide result a reader used to see.
#[derive(Debug, Clone, Copy)]
struct Half {
    value: ValueId,
    /// First lane of this half within the wide result.
    offset: u8,
    width: u8,
    extraction: Option<ValueId>,
}

impl Half {
    /// Lane-range copy of this half, emitted on demand after `anchor`.
    ///
    /// `anchor` starts at the wide instruction and moves to each new
    /// extraction, so extractions follow it in half order.
    fn extract(&mut self, func: &mut Function, anchor: &mut InstrId, wide_value: ValueId) -> ValueId {
        if let Some(value) = self.extraction {
            return value;
        }
        let lanes: SmallVec<[u8; MAX_VEC_COMPONENTS]> =
            (self.offset..self.offset + self.width).collect();
        let value = Builder::at(func, Cursor::After(*anchor)).swizzle(wide_value, &lanes);
        if value != wide_value {
            *anchor = func.value(value).def;
        }
        self.extraction = Some(value);
        value
    }
}

/// Combine `a` and `b` into one instruction placed right after `a`.
///
/// `a` must dominate `b` and both must share a class. Returns `None`, leaving
/// the program untouched, when the result would exceed `max_components`.
pub fn try_combine(
    func: &mut Function,
    a: InstrId,
    b: InstrId,
    max_components: u8,
) -> Option<Combined> {
    let (alu_a, dest_a) = alu_parts(func, a);
    let (alu_b, dest_b) = alu_parts(func, b);
    assert_eq!(alu_a.op, alu_b.op, "combining {a:?} and {b:?} across opcodes");

    let (a_n, bit_size) = {
        let value = func.value(dest_a);
        (value.num_components, value.bit_size)
    };
    let b_n = func.value(dest_b).num_components;
    assert_eq!(
        bit_size,
        func.value(dest_b).bit_size,
        "combining {a:?} and {b:?} across bit sizes"
    );

    let total = a_n + b_n;
    if total > max_components {
        return None;
    }

    // Low lanes come from `a`, high lanes from `b`.
    let srcs = alu_a
        .srcs
        .iter()
        .zip(&alu_b.srcs)
        .map(|(src_a, src_b)| {
            assert_eq!(src_a.value, src_b.value, "combining {a:?} and {b:?} across sources");
            let mut lanes: SmallVec<[u8; MAX_VEC_COMPONENTS]> = SmallVec::new();
            lanes.extend_from_slice(&src_a.swizzle[..a_n as usize]);
            lanes.extend_from_slice(&src_b.swizzle[..b_n as usize]);
            AluSrc::lanes(src_a.value, &lanes)
        })
        .collect();

    let wide = func.insert(
        Cursor::After(a),
        InstrKind::Alu(AluInstr {
            op: alu_a.op,
            srcs,
        }),
        Some((total, bit_size)),
    );
    let Some(wide_value) = func.instr(wide).dest else {
        unreachable!("combined instruction allocated without a destination");
    };

    let mut rewired: SmallVec<[InstrId; 4]> = SmallVec::new();
    let mut anchor = wide;
    let mut halves = [
        Half {
            value: dest_a,
            offset: 0,
            width: a_n,
            extraction: None,
        },
        Half {
            value: dest_b,
            offset: a_n,
            width: b_n,
            extraction: None,
        },
    ];

    for half in &mut halves {
        for user in func.value(half.value).uses.clone() {
            let slot = user.slot as usize;
            if func.instr(user.instr).is_alu() {
                func.rewrite_src(user.instr, slot, wide_value);
                if half.offset > 0 {
                    let read = func.alu_src_components(user.instr, slot) as usize;
                    for lane in &mut func.alu_swizzle_mut(user.instr, slot)[..read] {
                        *lane += half.offset;
                    }
                }
                if !rewired.contains(&user.instr) {
                    rewired.push(user.instr);
                }
            } else {
                let extracted = half.extract(func, &mut anchor, wide_value);
                func.rewrite_src(user.instr, slot, extracted);
            }
        }

        for block in func.value(half.value).if_uses.clone() {
            let extracted = half.extract(func, &mut anchor, wide_value);
            func.rewrite_if_condition(block, extracted);
        }

        assert!(
            !func.value(half.value).has_uses(),
            "{:?} still read after combine",
            half.value
        );
    }

    func.remove_instr(a);
    func.remove_instr(b);

    let extractions = halves.iter().filter(|h| h.extraction.is_some()).count();
    debug!(
        op = %alu_a.op,
        a = a.index(),
        b = b.index(),
        components = total,
        rewired = rewired.len(),
        extractions,
        "combined instructions"
    );

    Some(Combined {
        instr: wide,
        rewired,
        extractions,
    })
}

fn alu_parts(func: &Function, id: InstrId) -> (AluInstr, ValueId) {
    let instr = func.instr(id);
    let Some(alu) = instr.as_alu() else {
        panic!("{id:?} is not an ALU instruction");
    };
    let Some(dest) = instr.dest else {
        panic!("{id:?} has no destination");
    };
    (alu.clone(), dest)
}
