// SPDX-License-Identifier: GPL-2.0

//! Instruction IR, binary codec and control-flow graphs

pub mod assertions;
pub mod cfg;
pub mod display;
pub mod insn;
pub mod marshal;
pub mod unmarshal;

pub use assertions::explicate_assertions;
pub use cfg::{BasicBlock, Cfg, Label};
pub use insn::{
    Assertion, BinOp, CmpOp, Condition, Instruction, MemAccess, Reg, TypeGroup, UnOp, Value,
    R0_RETURN_VALUE, R10_STACK_POINTER,
};
pub use marshal::{marshal, marshal_program};
pub use unmarshal::{parse_raw, unmarshal, EbpfInst};
