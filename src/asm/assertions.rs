// SPDX-License-Identifier: GPL-2.0

//! Assertion injection
//!
//! Walks every block and prepends, per instruction, the deterministic
//! set of `Assert` nodes expressing its preconditions: jumps must not
//! compare numbers with pointers or pointers into distinct regions,
//! dereferences must stay in bounds, stores must not leak pointers,
//! helper arguments must be well typed. The fixpoint then treats the
//! program as unsafe unless it proves the assertions can never fail.

use super::cfg::Cfg;
use super::insn::{
    Assertion, Condition, Instruction, Reg, TypeGroup, Value, R0_RETURN_VALUE, R10_STACK_POINTER,
};
use crate::spec::helpers::{ArgPairKind, ArgSingleKind};
use crate::spec::ProgramInfo;

struct AssertExtractor {
    is_privileged: bool,
}

impl AssertExtractor {
    fn extract(&self, inst: &Instruction) -> Vec<Assertion> {
        match inst {
            Instruction::Exit => vec![Assertion::TypeConstraint {
                reg: Reg(R0_RETURN_VALUE),
                group: TypeGroup::Num,
            }],
            // The legacy packet loads implicitly use r6 as the context.
            Instruction::LoadPacket { .. } => vec![Assertion::TypeConstraint {
                reg: Reg(6),
                group: TypeGroup::Ctx,
            }],
            Instruction::Call { sig, .. } => {
                let mut res = Vec::new();
                let mut map_fd_reg = None;
                for arg in &sig.singles {
                    let reg = Reg(arg.reg);
                    match arg.kind {
                        ArgSingleKind::Anything => {
                            // Pointer leakage through an opaque argument.
                            if !self.is_privileged {
                                res.push(Assertion::TypeConstraint {
                                    reg,
                                    group: TypeGroup::Num,
                                });
                            }
                        }
                        ArgSingleKind::MapFd => {
                            res.push(Assertion::TypeConstraint {
                                reg,
                                group: TypeGroup::MapFd,
                            });
                            map_fd_reg = Some(reg);
                        }
                        ArgSingleKind::PtrToMapKey | ArgSingleKind::PtrToMapValue => {
                            res.push(Assertion::TypeConstraint {
                                reg,
                                group: TypeGroup::StackOrPacket,
                            });
                            if let Some(map_fd) = map_fd_reg {
                                res.push(Assertion::ValidMapKeyValue {
                                    access: reg,
                                    map_fd,
                                    key: arg.kind == ArgSingleKind::PtrToMapKey,
                                });
                            }
                        }
                        ArgSingleKind::PtrToCtx => {
                            res.push(Assertion::TypeConstraint {
                                reg,
                                group: TypeGroup::Ctx,
                            });
                        }
                    }
                }
                for arg in &sig.pairs {
                    let mem = Reg(arg.mem);
                    let size = Reg(arg.size);
                    let group = match arg.kind {
                        ArgPairKind::PtrToMemOrNull => TypeGroup::MemOrNum,
                        ArgPairKind::PtrToMem | ArgPairKind::PtrToUninitMem => TypeGroup::Mem,
                    };
                    res.push(Assertion::TypeConstraint { reg: mem, group });
                    res.push(Assertion::TypeConstraint {
                        reg: size,
                        group: TypeGroup::Num,
                    });
                    res.push(Assertion::ValidSize {
                        reg: size,
                        can_be_zero: arg.can_be_zero,
                    });
                    res.push(Assertion::ValidAccess {
                        reg: mem,
                        offset: 0,
                        width: Value::Reg(size),
                        or_null: arg.kind == ArgPairKind::PtrToMemOrNull,
                    });
                }
                res
            }
            Instruction::Assume(cond) | Instruction::Jmp {
                cond: Some(cond), ..
            } => self.explicate(cond),
            Instruction::Mem {
                access,
                value,
                is_load,
            } => {
                let mut res = Vec::new();
                if access.base.0 == R10_STACK_POINTER {
                    res.push(Assertion::ValidAccess {
                        reg: access.base,
                        offset: access.offset,
                        width: Value::Imm(access.width as i64),
                        or_null: false,
                    });
                } else {
                    res.push(Assertion::TypeConstraint {
                        reg: access.base,
                        group: TypeGroup::Ptr,
                    });
                    res.push(Assertion::ValidAccess {
                        reg: access.base,
                        offset: access.offset,
                        width: Value::Imm(access.width as i64),
                        or_null: false,
                    });
                    if !self.is_privileged && !is_load {
                        if let Value::Reg(val) = value {
                            if access.width != 8 {
                                // Narrow stores cannot carry a pointer.
                                res.push(Assertion::TypeConstraint {
                                    reg: *val,
                                    group: TypeGroup::Num,
                                });
                            } else {
                                res.push(Assertion::ValidStore {
                                    mem: access.base,
                                    val: *val,
                                });
                            }
                        }
                    }
                }
                res
            }
            Instruction::LockAdd { access, .. } => vec![
                Assertion::TypeConstraint {
                    reg: access.base,
                    group: TypeGroup::Shared,
                },
                Assertion::ValidAccess {
                    reg: access.base,
                    offset: access.offset,
                    width: Value::Imm(access.width as i64),
                    or_null: false,
                },
            ],
            Instruction::Bin { op, dst, v, .. } => {
                use super::insn::BinOp;
                match op {
                    BinOp::Mov => vec![],
                    BinOp::Add => match v {
                        Value::Reg(src) => vec![
                            Assertion::Addable {
                                ptr: *src,
                                num: *dst,
                            },
                            Assertion::Addable {
                                ptr: *dst,
                                num: *src,
                            },
                        ],
                        Value::Imm(_) => vec![],
                    },
                    BinOp::Sub => match v {
                        Value::Reg(src) => vec![
                            // Map-fd minus map-fd would equate distinct
                            // maps' offsets.
                            Assertion::TypeConstraint {
                                reg: *dst,
                                group: TypeGroup::PtrOrNum,
                            },
                            Assertion::Comparable {
                                r1: *src,
                                r2: *dst,
                            },
                        ],
                        Value::Imm(_) => vec![],
                    },
                    _ => vec![Assertion::TypeConstraint {
                        reg: *dst,
                        group: TypeGroup::Num,
                    }],
                }
            }
            _ => vec![],
        }
    }

    /// Preconditions of comparing `cond.left` with `cond.right`.
    fn explicate(&self, cond: &Condition) -> Vec<Assertion> {
        if self.is_privileged {
            return vec![];
        }
        let mut res = Vec::new();
        res.push(Assertion::ValidAccess {
            reg: cond.left,
            offset: 0,
            width: Value::Imm(0),
            or_null: false,
        });
        match cond.right {
            Value::Imm(imm) => {
                if imm != 0 {
                    res.push(Assertion::TypeConstraint {
                        reg: cond.left,
                        group: TypeGroup::Num,
                    });
                }
                // Anything may be compared with the literal zero; a
                // map fd is just another pointer there.
            }
            Value::Reg(right) => {
                res.push(Assertion::ValidAccess {
                    reg: right,
                    offset: 0,
                    width: Value::Imm(0),
                    or_null: false,
                });
                if !cond.op.is_equality() {
                    res.push(Assertion::TypeConstraint {
                        reg: cond.left,
                        group: TypeGroup::NonMapFd,
                    });
                }
                res.push(Assertion::Comparable {
                    r1: cond.left,
                    r2: right,
                });
            }
        }
        res
    }
}

/// Annotate the CFG with explicit assertions for every instruction's
/// preconditions.
pub fn explicate_assertions(cfg: &mut Cfg, info: &ProgramInfo) {
    let extractor = AssertExtractor {
        is_privileged: info.is_privileged(),
    };
    let labels: Vec<_> = cfg.labels().copied().collect();
    for label in labels {
        let bb = cfg.block_mut(&label);
        let mut insts = Vec::with_capacity(bb.insts.len());
        for inst in bb.insts.drain(..) {
            for a in extractor.extract(&inst) {
                insts.push(Instruction::Assert(a));
            }
            insts.push(inst);
        }
        bb.insts = insts;
    }
}
