//! SSA intermediate representation for shader programs.
//!
//! # Core Components
//!
//! - **Arena** (`arena.rs`): typed ids and dense side tables
//! - **Types** (`types.rs`): variable types
//! - **Operators** (`operators.rs`): ALU opcode table and I/O intrinsics
//! - **Instructions** (`instr.rs`): instructions, sources, SSA values
//! - **Function** (`function.rs`): storage plus def/use maintenance
//! - **CFG** (`cfg.rs`): blocks, terminators, dominator tree
//! - **Shader** (`shader.rs`): variables, modes, stages
//! - **Builder** (`builder/`): cursor-based construction
//! - **Deref** (`deref.rs`): chain queries and dead-deref sweep
//! - **Verify** (`verify.rs`): structural validator
//! - **Eval** (`eval.rs`): reference interpreter
//!
//! # Design Principles
//!
//! - **Index-based back-references**: values list their readers as
//!   `(instruction, slot)` pairs, updated on every source rewrite
//! - **No address keying**: every memo table is keyed by a stable id

pub mod arena;
pub mod builder;
pub mod cfg;
pub mod deref;
pub mod eval;
pub mod function;
pub mod instr;
pub mod operators;
pub mod shader;
pub mod types;
pub mod verify;

// Re-export commonly used types
pub use arena::{Arena, BitSet, Id, SecondaryMap};
pub use builder::{AluBuilder, Builder, ControlBuilder, DerefBuilder, IntrinsicBuilder};
pub use cfg::{Block, BlockId, DominatorTree, Terminator};
pub use function::{Cursor, Function, Metadata};
pub use instr::{
    AluInstr, AluSrc, DerefInstr, DerefKind, Instr, InstrFlags, InstrId, InstrKind,
    IntrinsicInstr, SsaValue, Use, ValueId,
};
pub use operators::{AluOp, Intrinsic, OpInfo, MAX_VEC_COMPONENTS};
pub use shader::{
    Shader, Stage, VarId, Variable, VariableFlags, VariableMode, Variables, VARYING_SLOT_POS,
    VARYING_SLOT_VAR0,
};
pub use types::{BaseType, VarType};
pub use verify::{verify_function, verify_shader, VerifyError};
