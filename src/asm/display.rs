// SPDX-License-Identifier: GPL-2.0

//! Assembly-style printing of the IR

use core::fmt;

use super::insn::{
    Assertion, BinOp, CmpOp, Condition, Instruction, Reg, TypeGroup, UnOp, Value,
};

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Reg(r) => write!(f, "{}", r),
            Value::Imm(v) => write!(f, "{}", v),
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Set => "&",
            CmpOp::Nset => "!&",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Sgt => "s>",
            CmpOp::Sge => "s>=",
            CmpOp::Slt => "s<",
            CmpOp::Sle => "s<=",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.op, self.right)
    }
}

impl fmt::Display for TypeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TypeGroup::Num => "number",
            TypeGroup::MapFd => "map_fd",
            TypeGroup::Ctx => "ctx",
            TypeGroup::Packet => "packet",
            TypeGroup::Stack => "stack",
            TypeGroup::Shared => "shared",
            TypeGroup::NonMapFd => "non_map_fd",
            TypeGroup::Mem => "memory",
            TypeGroup::MemOrNum => "memory_or_number",
            TypeGroup::Ptr => "pointer",
            TypeGroup::PtrOrNum => "pointer_or_number",
            TypeGroup::StackOrPacket => "stack_or_packet",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assertion::TypeConstraint { reg, group } => write!(f, "{} : {}", reg, group),
            Assertion::ValidAccess {
                reg,
                offset,
                width,
                or_null,
            } => {
                write!(f, "valid_access({}, {}, {})", reg, offset, width)?;
                if *or_null {
                    write!(f, " or null")?;
                }
                Ok(())
            }
            Assertion::ValidSize { reg, can_be_zero } => {
                write!(f, "{} {} 0", reg, if *can_be_zero { ">=" } else { ">" })
            }
            Assertion::ValidStore { mem, val } => {
                write!(f, "store({}) through {} leaks no pointer", val, mem)
            }
            Assertion::ValidMapKeyValue {
                access,
                map_fd,
                key,
            } => write!(
                f,
                "{} spans the {} of map in {}",
                access,
                if *key { "key" } else { "value" },
                map_fd
            ),
            Assertion::Comparable { r1, r2 } => write!(f, "comparable({}, {})", r1, r2),
            Assertion::Addable { ptr, num } => write!(f, "addable({}, {})", ptr, num),
        }
    }
}

fn width_name(width: u32) -> &'static str {
    match width {
        1 => "u8",
        2 => "u16",
        4 => "u32",
        _ => "u64",
    }
}

fn reg_name(is64: bool, r: Reg) -> String {
    if is64 {
        format!("r{}", r.0)
    } else {
        format!("w{}", r.0)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Undefined(op) => write!(f, "undefined {:#04x}", op),
            Instruction::Bin { op, dst, v, is64, .. } => {
                let d = reg_name(*is64, *dst);
                let s = match v {
                    Value::Reg(r) => reg_name(*is64, *r),
                    Value::Imm(k) => format!("{}", k),
                };
                let sym = match op {
                    BinOp::Mov => "=",
                    BinOp::Add => "+=",
                    BinOp::Sub => "-=",
                    BinOp::Mul => "*=",
                    BinOp::Div => "/=",
                    BinOp::Mod => "%=",
                    BinOp::Or => "|=",
                    BinOp::And => "&=",
                    BinOp::Lsh => "<<=",
                    BinOp::Rsh => ">>=",
                    BinOp::Arsh => "s>>=",
                    BinOp::Xor => "^=",
                };
                write!(f, "{} {} {}", d, sym, s)
            }
            Instruction::Un { op, dst } => match op {
                UnOp::Neg => write!(f, "{} = -{}", dst, dst),
                UnOp::Le16 => write!(f, "{} = le16 {}", dst, dst),
                UnOp::Le32 => write!(f, "{} = le32 {}", dst, dst),
                UnOp::Le64 => write!(f, "{} = le64 {}", dst, dst),
                UnOp::Be16 => write!(f, "{} = be16 {}", dst, dst),
                UnOp::Be32 => write!(f, "{} = be32 {}", dst, dst),
                UnOp::Be64 => write!(f, "{} = be64 {}", dst, dst),
            },
            Instruction::LoadMapFd { dst, map_fd } => {
                write!(f, "{} = map_fd {}", dst, map_fd)
            }
            Instruction::LoadPacket {
                width,
                offset,
                index,
            } => {
                write!(f, "r0 = *({} *)packet[{}", width_name(*width), offset)?;
                if let Some(r) = index {
                    write!(f, " + {}", r)?;
                }
                write!(f, "]")
            }
            Instruction::Mem {
                access,
                value,
                is_load,
            } => {
                if *is_load {
                    write!(
                        f,
                        "{} = *({} *)({} {} {})",
                        value,
                        width_name(access.width),
                        access.base,
                        if access.offset < 0 { "-" } else { "+" },
                        access.offset.abs()
                    )
                } else {
                    write!(
                        f,
                        "*({} *)({} {} {}) = {}",
                        width_name(access.width),
                        access.base,
                        if access.offset < 0 { "-" } else { "+" },
                        access.offset.abs(),
                        value
                    )
                }
            }
            Instruction::LockAdd { access, src } => write!(
                f,
                "lock *({} *)({} {} {}) += {}",
                width_name(access.width),
                access.base,
                if access.offset < 0 { "-" } else { "+" },
                access.offset.abs(),
                src
            ),
            Instruction::Call { func, sig } => write!(f, "call {}#{}", sig.name, func),
            Instruction::Exit => write!(f, "exit"),
            Instruction::Jmp { cond, target } => match cond {
                None => write!(f, "goto {}", target),
                Some(c) => write!(f, "if {} goto {}", c, target),
            },
            Instruction::Assume(c) => write!(f, "assume {}", c),
            Instruction::Assert(a) => write!(f, "assert {}", a),
        }
    }
}
