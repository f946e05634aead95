// SPDX-License-Identifier: GPL-2.0

//! Instruction encoding
//!
//! The inverse of `unmarshal` for every variant that exists in program
//! binaries. `Assume` and `Assert` are analysis artefacts and cannot be
//! encoded.

use super::insn::{BinOp, CmpOp, Instruction, UnOp, Value};
use super::unmarshal::{
    EbpfInst, CLS_ALU, CLS_ALU64, CLS_JMP, CLS_LD, CLS_LDX, CLS_ST, CLS_STX, MODE_ABS, MODE_IND,
    MODE_MEM, MODE_XADD, OP_LDDW, SIZE_B, SIZE_DW, SIZE_H, SIZE_W, SRC_REG,
};
use crate::error::{Result, VerifierError};

fn size_bits(width: u32) -> u8 {
    match width {
        1 => SIZE_B,
        2 => SIZE_H,
        4 => SIZE_W,
        _ => SIZE_DW,
    }
}

fn bin_op_bits(op: BinOp) -> u8 {
    match op {
        BinOp::Add => 0x00,
        BinOp::Sub => 0x10,
        BinOp::Mul => 0x20,
        BinOp::Div => 0x30,
        BinOp::Or => 0x40,
        BinOp::And => 0x50,
        BinOp::Lsh => 0x60,
        BinOp::Rsh => 0x70,
        BinOp::Mod => 0x90,
        BinOp::Xor => 0xa0,
        BinOp::Mov => 0xb0,
        BinOp::Arsh => 0xc0,
    }
}

fn cmp_op_bits(op: CmpOp) -> Option<u8> {
    Some(match op {
        CmpOp::Eq => 0x10,
        CmpOp::Gt => 0x20,
        CmpOp::Ge => 0x30,
        CmpOp::Set => 0x40,
        CmpOp::Ne => 0x50,
        CmpOp::Sgt => 0x60,
        CmpOp::Sge => 0x70,
        CmpOp::Lt => 0xa0,
        CmpOp::Le => 0xb0,
        CmpOp::Slt => 0xc0,
        CmpOp::Sle => 0xd0,
        CmpOp::Nset => return None,
    })
}

/// Encode one instruction at `pc`; wide immediates produce two records
pub fn marshal(inst: &Instruction, pc: usize) -> Result<Vec<EbpfInst>> {
    let bad = |what: &str| VerifierError::InvalidInstruction {
        pc,
        what: what.to_string(),
    };
    match inst {
        Instruction::Bin {
            op,
            dst,
            v,
            is64,
            lddw,
        } => {
            if *lddw {
                let Value::Imm(imm64) = v else {
                    return Err(bad("wide immediate with a register operand"));
                };
                let raw = *imm64 as u64;
                return Ok(vec![
                    EbpfInst {
                        opcode: OP_LDDW,
                        dst: dst.0,
                        src: 0,
                        offset: 0,
                        imm: raw as u32 as i32,
                    },
                    EbpfInst {
                        opcode: 0,
                        dst: 0,
                        src: 0,
                        offset: 0,
                        imm: (raw >> 32) as u32 as i32,
                    },
                ]);
            }
            let class = if *is64 { CLS_ALU64 } else { CLS_ALU };
            let mut rec = EbpfInst {
                opcode: class | bin_op_bits(*op),
                dst: dst.0,
                src: 0,
                offset: 0,
                imm: 0,
            };
            match v {
                Value::Reg(r) => {
                    rec.opcode |= SRC_REG;
                    rec.src = r.0;
                }
                Value::Imm(imm) => {
                    rec.imm = *imm as i32;
                }
            }
            Ok(vec![rec])
        }
        Instruction::Un { op, dst } => {
            let rec = match op {
                UnOp::Neg => EbpfInst {
                    opcode: CLS_ALU64 | 0x80,
                    dst: dst.0,
                    src: 0,
                    offset: 0,
                    imm: 0,
                },
                UnOp::Le16 | UnOp::Le32 | UnOp::Le64 => EbpfInst {
                    opcode: CLS_ALU | 0xd0,
                    dst: dst.0,
                    src: 0,
                    offset: 0,
                    imm: match op {
                        UnOp::Le16 => 16,
                        UnOp::Le32 => 32,
                        _ => 64,
                    },
                },
                UnOp::Be16 | UnOp::Be32 | UnOp::Be64 => EbpfInst {
                    opcode: CLS_ALU | 0xd0 | SRC_REG,
                    dst: dst.0,
                    src: 0,
                    offset: 0,
                    imm: match op {
                        UnOp::Be16 => 16,
                        UnOp::Be32 => 32,
                        _ => 64,
                    },
                },
            };
            Ok(vec![rec])
        }
        Instruction::LoadMapFd { dst, map_fd } => Ok(vec![
            EbpfInst {
                opcode: OP_LDDW,
                dst: dst.0,
                src: 1,
                offset: 0,
                imm: *map_fd,
            },
            EbpfInst::default(),
        ]),
        Instruction::LoadPacket {
            width,
            offset,
            index,
        } => {
            let mode = if index.is_some() { MODE_IND } else { MODE_ABS };
            Ok(vec![EbpfInst {
                opcode: CLS_LD | mode | size_bits(*width),
                dst: 0,
                src: index.map_or(0, |r| r.0),
                offset: 0,
                imm: *offset,
            }])
        }
        Instruction::Mem {
            access,
            value,
            is_load,
        } => {
            let offset = i16::try_from(access.offset)
                .map_err(|_| bad("memory offset does not fit in 16 bits"))?;
            if *is_load {
                let Value::Reg(dst) = value else {
                    return Err(bad("load into an immediate"));
                };
                Ok(vec![EbpfInst {
                    opcode: CLS_LDX | MODE_MEM | size_bits(access.width),
                    dst: dst.0,
                    src: access.base.0,
                    offset,
                    imm: 0,
                }])
            } else {
                match value {
                    Value::Reg(src) => Ok(vec![EbpfInst {
                        opcode: CLS_STX | MODE_MEM | size_bits(access.width),
                        dst: access.base.0,
                        src: src.0,
                        offset,
                        imm: 0,
                    }]),
                    Value::Imm(imm) => Ok(vec![EbpfInst {
                        opcode: CLS_ST | MODE_MEM | size_bits(access.width),
                        dst: access.base.0,
                        src: 0,
                        offset,
                        imm: *imm as i32,
                    }]),
                }
            }
        }
        Instruction::LockAdd { access, src } => {
            let offset = i16::try_from(access.offset)
                .map_err(|_| bad("memory offset does not fit in 16 bits"))?;
            Ok(vec![EbpfInst {
                opcode: CLS_STX | MODE_XADD | size_bits(access.width),
                dst: access.base.0,
                src: src.0,
                offset,
                imm: 0,
            }])
        }
        Instruction::Call { func, .. } => Ok(vec![EbpfInst {
            opcode: CLS_JMP | 0x80,
            dst: 0,
            src: 0,
            offset: 0,
            imm: *func,
        }]),
        Instruction::Exit => Ok(vec![EbpfInst {
            opcode: CLS_JMP | 0x90,
            dst: 0,
            src: 0,
            offset: 0,
            imm: 0,
        }]),
        Instruction::Jmp { cond, target } => {
            let offset = i16::try_from(*target as i64 - pc as i64 - 1)
                .map_err(|_| bad("jump offset does not fit in 16 bits"))?;
            match cond {
                None => Ok(vec![EbpfInst {
                    opcode: CLS_JMP,
                    dst: 0,
                    src: 0,
                    offset,
                    imm: 0,
                }]),
                Some(c) => {
                    let bits =
                        cmp_op_bits(c.op).ok_or_else(|| bad("nset has no jump encoding"))?;
                    let mut rec = EbpfInst {
                        opcode: CLS_JMP | bits,
                        dst: c.left.0,
                        src: 0,
                        offset,
                        imm: 0,
                    };
                    match c.right {
                        Value::Reg(r) => {
                            rec.opcode |= SRC_REG;
                            rec.src = r.0;
                        }
                        Value::Imm(imm) => rec.imm = imm as i32,
                    }
                    Ok(vec![rec])
                }
            }
        }
        Instruction::Undefined(_) | Instruction::Assume(_) | Instruction::Assert(_) => {
            Err(bad("not a binary instruction"))
        }
    }
}

/// Encode a whole program, skipping the filler slots that `unmarshal`
/// leaves behind wide immediates
pub fn marshal_program(insts: &[Instruction]) -> Result<Vec<EbpfInst>> {
    let mut out = Vec::with_capacity(insts.len());
    let mut skip = false;
    for (pc, inst) in insts.iter().enumerate() {
        if skip {
            skip = false;
            continue;
        }
        let recs = marshal(inst, pc)?;
        skip = inst.is_wide();
        out.extend(recs);
    }
    Ok(out)
}
