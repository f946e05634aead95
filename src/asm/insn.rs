// SPDX-License-Identifier: GPL-2.0

//! The instruction IR
//!
//! A closed sum of typed variants with plain fields. The binary codec
//! lives in `unmarshal`/`marshal`; the CFG works over these values and
//! the non-deterministic form introduces the `Assume` and `Assert`
//! pseudo-instructions that never exist in program binaries.

use crate::spec::helpers::CallSig;

/// The return-value register
pub const R0_RETURN_VALUE: u8 = 0;

/// The frame-pointer register
pub const R10_STACK_POINTER: u8 = 10;

/// A register index, r0..r10
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Reg(pub u8);

/// A register or an immediate operand
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Value {
    /// Register operand
    Reg(Reg),
    /// Immediate operand
    Imm(i64),
}

/// Binary ALU operators
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinOp {
    Mov,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Or,
    And,
    Lsh,
    Rsh,
    Arsh,
    Xor,
}

/// Unary ALU operators (negation and byte-order conversions)
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnOp {
    Neg,
    Le16,
    Le32,
    Le64,
    Be16,
    Be32,
    Be64,
}

/// Jump comparison operators
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CmpOp {
    Eq,
    Ne,
    Set,
    Nset,
    Gt,
    Ge,
    Lt,
    Le,
    Sgt,
    Sge,
    Slt,
    Sle,
}

impl CmpOp {
    /// The operator of the complementary branch
    pub fn negate(self) -> CmpOp {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Set => CmpOp::Nset,
            CmpOp::Nset => CmpOp::Set,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Le => CmpOp::Gt,
            CmpOp::Ge => CmpOp::Lt,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Sgt => CmpOp::Sle,
            CmpOp::Sle => CmpOp::Sgt,
            CmpOp::Sge => CmpOp::Slt,
            CmpOp::Slt => CmpOp::Sge,
        }
    }

    /// True for the unsigned ordering operators
    pub fn is_unsigned(self) -> bool {
        matches!(self, CmpOp::Gt | CmpOp::Ge | CmpOp::Lt | CmpOp::Le)
    }

    /// True for the equality-like operators
    pub fn is_equality(self) -> bool {
        matches!(self, CmpOp::Eq | CmpOp::Ne)
    }
}

/// A jump condition
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Condition {
    /// Comparison operator
    pub op: CmpOp,
    /// Left operand register
    pub left: Reg,
    /// Right operand
    pub right: Value,
}

impl Condition {
    /// The condition of the complementary branch
    pub fn negate(&self) -> Condition {
        Condition {
            op: self.op.negate(),
            left: self.left,
            right: self.right,
        }
    }
}

/// A memory access descriptor: base register, offset and width
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MemAccess {
    /// Base pointer register
    pub base: Reg,
    /// Signed byte offset added to the base
    pub offset: i32,
    /// Access width in bytes (1, 2, 4 or 8)
    pub width: u32,
}

/// The group of kinds a register is required to be in
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TypeGroup {
    Num,
    MapFd,
    Ctx,
    Packet,
    Stack,
    Shared,
    /// Anything initialised that is not a map fd
    NonMapFd,
    /// Stack, packet or shared
    Mem,
    /// Mem, or a number (but never the context)
    MemOrNum,
    /// Any pointer
    Ptr,
    /// Any pointer or a number
    PtrOrNum,
    StackOrPacket,
}

/// A precondition made explicit in the instruction stream
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Assertion {
    /// The register's kind lies in the group
    TypeConstraint {
        /// Checked register
        reg: Reg,
        /// Allowed kinds
        group: TypeGroup,
    },
    /// The access `[reg + offset, reg + offset + width)` stays inside
    /// the register's region
    ValidAccess {
        /// Base register
        reg: Reg,
        /// Constant byte offset
        offset: i32,
        /// Access width; zero means a comparison, not a dereference
        width: Value,
        /// Whether a null (numeric zero) base is acceptable
        or_null: bool,
    },
    /// The register holds a usable size
    ValidSize {
        /// Size register
        reg: Reg,
        /// Whether zero is a usable size
        can_be_zero: bool,
    },
    /// Stores through `mem` leak no pointers
    ValidStore {
        /// Destination base register
        mem: Reg,
        /// Stored register
        val: Reg,
    },
    /// The access register spans a full map key or value
    ValidMapKeyValue {
        /// Pointer argument being checked
        access: Reg,
        /// Register holding the map fd
        map_fd: Reg,
        /// True for the key, false for the value
        key: bool,
    },
    /// Two registers may be compared
    Comparable {
        /// First register
        r1: Reg,
        /// Second register
        r2: Reg,
    },
    /// In the branch where `ptr` is a pointer, `num` must be numeric
    Addable {
        /// Possibly-pointer operand
        ptr: Reg,
        /// Operand that must then be numeric
        num: Reg,
    },
}

/// One instruction of the analyzed program
#[derive(Clone, PartialEq, Debug)]
pub enum Instruction {
    /// An undecoded opcode; also the filler slot of a wide immediate
    Undefined(u8),
    /// Binary ALU operation
    Bin {
        /// Operator
        op: BinOp,
        /// Destination register
        dst: Reg,
        /// Source operand
        v: Value,
        /// 64-bit (ALU64) rather than 32-bit semantics
        is64: bool,
        /// Encoded as the two-slot wide immediate form
        lddw: bool,
    },
    /// Unary ALU operation
    Un {
        /// Operator
        op: UnOp,
        /// Destination register
        dst: Reg,
    },
    /// Wide immediate load of a map file descriptor
    LoadMapFd {
        /// Destination register
        dst: Reg,
        /// Map index patched in by relocation
        map_fd: i32,
    },
    /// Legacy packet load (LD_ABS / LD_IND), implicitly targeting r0
    LoadPacket {
        /// Access width in bytes
        width: u32,
        /// Constant packet offset
        offset: i32,
        /// Index register for the indirect form
        index: Option<Reg>,
    },
    /// Memory load or store
    Mem {
        /// Access descriptor
        access: MemAccess,
        /// Loaded-into register, or the stored value
        value: Value,
        /// True for loads
        is_load: bool,
    },
    /// Atomic add to a shared location
    LockAdd {
        /// Access descriptor
        access: MemAccess,
        /// Added register
        src: Reg,
    },
    /// Helper call with its resolved signature
    Call {
        /// Helper index
        func: i32,
        /// Grouped argument signature
        sig: CallSig,
    },
    /// Return from the program
    Exit,
    /// Jump, conditional when `cond` is present
    Jmp {
        /// Branch condition; `None` for an unconditional jump
        cond: Option<Condition>,
        /// Absolute target pc
        target: usize,
    },
    /// Branch refinement node of the non-deterministic CFG
    Assume(Condition),
    /// Injected precondition
    Assert(Assertion),
}

impl Instruction {
    /// True for the two-slot wide-immediate forms
    pub fn is_wide(&self) -> bool {
        matches!(
            self,
            Instruction::LoadMapFd { .. } | Instruction::Bin { lddw: true, .. }
        )
    }
}
