// SPDX-License-Identifier: GPL-2.0

//! Instruction decoding
//!
//! The binary format is a contiguous sequence of 8-byte records:
//! 8-bit opcode, 4-bit destination and source registers, a signed
//! 16-bit offset and a signed 32-bit immediate. The wide-immediate
//! load consumes two consecutive records, concatenating the two
//! immediates; its second slot decodes to a filler.

use super::insn::{
    BinOp, CmpOp, Condition, Instruction, MemAccess, Reg, UnOp, Value,
};
use crate::error::{Result, VerifierError};
use crate::spec::helpers::resolve_signature;

/// Instruction classes
pub const CLS_LD: u8 = 0x00;
/// Register load
pub const CLS_LDX: u8 = 0x01;
/// Immediate store
pub const CLS_ST: u8 = 0x02;
/// Register store
pub const CLS_STX: u8 = 0x03;
/// 32-bit ALU
pub const CLS_ALU: u8 = 0x04;
/// Jumps
pub const CLS_JMP: u8 = 0x05;
/// 64-bit ALU
pub const CLS_ALU64: u8 = 0x07;

/// Size field: 4 bytes
pub const SIZE_W: u8 = 0x00;
/// Size field: 2 bytes
pub const SIZE_H: u8 = 0x08;
/// Size field: 1 byte
pub const SIZE_B: u8 = 0x10;
/// Size field: 8 bytes
pub const SIZE_DW: u8 = 0x18;

/// Mode field: immediate
pub const MODE_IMM: u8 = 0x00;
/// Mode field: legacy absolute packet load
pub const MODE_ABS: u8 = 0x20;
/// Mode field: legacy indirect packet load
pub const MODE_IND: u8 = 0x40;
/// Mode field: memory access
pub const MODE_MEM: u8 = 0x60;
/// Mode field: atomic add
pub const MODE_XADD: u8 = 0xc0;

/// The wide-immediate load opcode
pub const OP_LDDW: u8 = CLS_LD | MODE_IMM | SIZE_DW;

/// Source-operand flag: register rather than immediate
pub const SRC_REG: u8 = 0x08;

/// One raw 8-byte instruction record
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EbpfInst {
    /// Opcode byte
    pub opcode: u8,
    /// Destination register (low nibble of the register byte)
    pub dst: u8,
    /// Source register (high nibble of the register byte)
    pub src: u8,
    /// Signed 16-bit offset
    pub offset: i16,
    /// Signed 32-bit immediate
    pub imm: i32,
}

impl EbpfInst {
    /// Decode one record from its little-endian bytes
    pub fn from_bytes(bytes: [u8; 8]) -> EbpfInst {
        EbpfInst {
            opcode: bytes[0],
            dst: bytes[1] & 0x0f,
            src: bytes[1] >> 4,
            offset: i16::from_le_bytes([bytes[2], bytes[3]]),
            imm: i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }

    /// Encode back to the little-endian record
    pub fn to_bytes(self) -> [u8; 8] {
        let off = self.offset.to_le_bytes();
        let imm = self.imm.to_le_bytes();
        [
            self.opcode,
            (self.src << 4) | (self.dst & 0x0f),
            off[0],
            off[1],
            imm[0],
            imm[1],
            imm[2],
            imm[3],
        ]
    }
}

/// Split a raw byte stream into records
pub fn parse_raw(bytes: &[u8]) -> Result<Vec<EbpfInst>> {
    if bytes.is_empty() || bytes.len() % 8 != 0 {
        return Err(VerifierError::InvalidInstruction {
            pc: bytes.len() / 8,
            what: format!("byte stream of length {} is not a whole number of records", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| EbpfInst::from_bytes(c.try_into().unwrap()))
        .collect())
}

fn width_of(opcode: u8, pc: usize) -> Result<u32> {
    match opcode & 0x18 {
        SIZE_W => Ok(4),
        SIZE_H => Ok(2),
        SIZE_B => Ok(1),
        SIZE_DW => Ok(8),
        _ => Err(VerifierError::InvalidInstruction {
            pc,
            what: format!("bad size field in opcode {:#04x}", opcode),
        }),
    }
}

fn check_reg(r: u8, pc: usize) -> Result<Reg> {
    if r > 10 {
        return Err(VerifierError::InvalidRegister { pc, reg: r });
    }
    Ok(Reg(r))
}

fn alu_op(code: u8) -> Option<BinOp> {
    Some(match code & 0xf0 {
        0x00 => BinOp::Add,
        0x10 => BinOp::Sub,
        0x20 => BinOp::Mul,
        0x30 => BinOp::Div,
        0x40 => BinOp::Or,
        0x50 => BinOp::And,
        0x60 => BinOp::Lsh,
        0x70 => BinOp::Rsh,
        0x90 => BinOp::Mod,
        0xa0 => BinOp::Xor,
        0xb0 => BinOp::Mov,
        0xc0 => BinOp::Arsh,
        _ => return None,
    })
}

fn jmp_op(code: u8) -> Option<CmpOp> {
    Some(match code & 0xf0 {
        0x10 => CmpOp::Eq,
        0x20 => CmpOp::Gt,
        0x30 => CmpOp::Ge,
        0x40 => CmpOp::Set,
        0x50 => CmpOp::Ne,
        0x60 => CmpOp::Sgt,
        0x70 => CmpOp::Sge,
        0xa0 => CmpOp::Lt,
        0xb0 => CmpOp::Le,
        0xc0 => CmpOp::Slt,
        0xd0 => CmpOp::Sle,
        _ => return None,
    })
}

/// Decode a full program. The output vector is slot-aligned with the
/// input: the second record of a wide immediate becomes
/// `Undefined(0)`.
pub fn unmarshal(insts: &[EbpfInst]) -> Result<Vec<Instruction>> {
    if insts.is_empty() {
        return Err(VerifierError::EmptyProgram);
    }
    let mut out = Vec::with_capacity(insts.len());
    let mut pc = 0;
    while pc < insts.len() {
        let inst = insts[pc];
        let decoded = unmarshal_one(inst, pc, insts)?;
        let wide = decoded.is_wide();
        out.push(decoded);
        if wide {
            out.push(Instruction::Undefined(0));
            pc += 2;
        } else {
            pc += 1;
        }
    }
    Ok(out)
}

fn unmarshal_one(inst: EbpfInst, pc: usize, insts: &[EbpfInst]) -> Result<Instruction> {
    let class = inst.opcode & 0x07;
    match class {
        CLS_ALU | CLS_ALU64 => {
            let is64 = class == CLS_ALU64;
            let dst = check_reg(inst.dst, pc)?;
            match inst.opcode & 0xf0 {
                0x80 => {
                    if !is64 {
                        return Err(VerifierError::InvalidInstruction {
                            pc,
                            what: "32-bit negation is not supported".to_string(),
                        });
                    }
                    Ok(Instruction::Un { op: UnOp::Neg, dst })
                }
                0xd0 => {
                    let be = inst.opcode & SRC_REG != 0;
                    let op = match (inst.imm, be) {
                        (16, false) => UnOp::Le16,
                        (32, false) => UnOp::Le32,
                        (64, false) => UnOp::Le64,
                        (16, true) => UnOp::Be16,
                        (32, true) => UnOp::Be32,
                        (64, true) => UnOp::Be64,
                        _ => {
                            return Err(VerifierError::InvalidInstruction {
                                pc,
                                what: format!("bad byte-swap width {}", inst.imm),
                            })
                        }
                    };
                    Ok(Instruction::Un { op, dst })
                }
                _ => {
                    let op = alu_op(inst.opcode).ok_or_else(|| {
                        VerifierError::InvalidInstruction {
                            pc,
                            what: format!("unknown alu opcode {:#04x}", inst.opcode),
                        }
                    })?;
                    let v = if inst.opcode & SRC_REG != 0 {
                        Value::Reg(check_reg(inst.src, pc)?)
                    } else {
                        Value::Imm(inst.imm as i64)
                    };
                    Ok(Instruction::Bin {
                        op,
                        dst,
                        v,
                        is64,
                        lddw: false,
                    })
                }
            }
        }
        CLS_LD => match inst.opcode {
            OP_LDDW => {
                let dst = check_reg(inst.dst, pc)?;
                let Some(next) = insts.get(pc + 1) else {
                    return Err(VerifierError::TruncatedLddw(pc));
                };
                if inst.src == 1 {
                    // Map-fd pseudo load; the immediate was patched by
                    // relocation with the map index.
                    Ok(Instruction::LoadMapFd {
                        dst,
                        map_fd: inst.imm,
                    })
                } else {
                    let imm64 =
                        (inst.imm as u32 as u64) | ((next.imm as u32 as u64) << 32);
                    Ok(Instruction::Bin {
                        op: BinOp::Mov,
                        dst,
                        v: Value::Imm(imm64 as i64),
                        is64: true,
                        lddw: true,
                    })
                }
            }
            op if op & 0xe0 == MODE_ABS => Ok(Instruction::LoadPacket {
                width: width_of(inst.opcode, pc)?,
                offset: inst.imm,
                index: None,
            }),
            op if op & 0xe0 == MODE_IND => Ok(Instruction::LoadPacket {
                width: width_of(inst.opcode, pc)?,
                offset: inst.imm,
                index: Some(check_reg(inst.src, pc)?),
            }),
            _ => Err(VerifierError::InvalidInstruction {
                pc,
                what: format!("unknown load opcode {:#04x}", inst.opcode),
            }),
        },
        CLS_LDX => {
            if inst.opcode & 0xe0 != MODE_MEM {
                return Err(VerifierError::InvalidInstruction {
                    pc,
                    what: format!("unknown ldx opcode {:#04x}", inst.opcode),
                });
            }
            Ok(Instruction::Mem {
                access: MemAccess {
                    base: check_reg(inst.src, pc)?,
                    offset: inst.offset as i32,
                    width: width_of(inst.opcode, pc)?,
                },
                value: Value::Reg(check_reg(inst.dst, pc)?),
                is_load: true,
            })
        }
        CLS_ST | CLS_STX => {
            let mode = inst.opcode & 0xe0;
            if class == CLS_STX && mode == MODE_XADD {
                return Ok(Instruction::LockAdd {
                    access: MemAccess {
                        base: check_reg(inst.dst, pc)?,
                        offset: inst.offset as i32,
                        width: width_of(inst.opcode, pc)?,
                    },
                    src: check_reg(inst.src, pc)?,
                });
            }
            if mode != MODE_MEM {
                return Err(VerifierError::InvalidInstruction {
                    pc,
                    what: format!("unknown store opcode {:#04x}", inst.opcode),
                });
            }
            let value = if class == CLS_STX {
                Value::Reg(check_reg(inst.src, pc)?)
            } else {
                Value::Imm(inst.imm as i64)
            };
            Ok(Instruction::Mem {
                access: MemAccess {
                    base: check_reg(inst.dst, pc)?,
                    offset: inst.offset as i32,
                    width: width_of(inst.opcode, pc)?,
                },
                value,
                is_load: false,
            })
        }
        CLS_JMP => match inst.opcode & 0xf0 {
            0x00 => {
                let target = jump_target(pc, inst.offset, insts.len())?;
                Ok(Instruction::Jmp { cond: None, target })
            }
            0x80 => {
                if inst.src == 1 {
                    return Err(VerifierError::InvalidInstruction {
                        pc,
                        what: "local subprogram calls are not supported".to_string(),
                    });
                }
                let sig = resolve_signature(inst.imm).ok_or(VerifierError::UnknownHelper {
                    pc,
                    func: inst.imm,
                })?;
                Ok(Instruction::Call {
                    func: inst.imm,
                    sig,
                })
            }
            0x90 => Ok(Instruction::Exit),
            _ => {
                let op = jmp_op(inst.opcode).ok_or_else(|| {
                    VerifierError::InvalidInstruction {
                        pc,
                        what: format!("unknown jump opcode {:#04x}", inst.opcode),
                    }
                })?;
                let right = if inst.opcode & SRC_REG != 0 {
                    Value::Reg(check_reg(inst.src, pc)?)
                } else {
                    Value::Imm(inst.imm as i64)
                };
                let target = jump_target(pc, inst.offset, insts.len())?;
                Ok(Instruction::Jmp {
                    cond: Some(Condition {
                        op,
                        left: check_reg(inst.dst, pc)?,
                        right,
                    }),
                    target,
                })
            }
        },
        _ => Err(VerifierError::InvalidInstruction {
            pc,
            what: format!("unknown instruction class {:#04x}", inst.opcode),
        }),
    }
}

fn jump_target(pc: usize, offset: i16, prog_len: usize) -> Result<usize> {
    let target = pc as i64 + 1 + offset as i64;
    if target < 0 || target as usize >= prog_len {
        return Err(VerifierError::JumpOutOfRange {
            pc,
            target,
            prog_len,
        });
    }
    Ok(target as usize)
}
