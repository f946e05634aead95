// SPDX-License-Identifier: GPL-2.0
//! Tests for bpf_absint::asm::{cfg, assertions}

use bpf_absint::asm::{
    explicate_assertions, Assertion, Cfg, EbpfInst, Instruction, Label, TypeGroup,
};
use bpf_absint::asm::unmarshal;
use bpf_absint::error::VerifierError;
use bpf_absint::spec::{ProgType, ProgramInfo};

fn rec(opcode: u8, dst: u8, src: u8, offset: i16, imm: i32) -> EbpfInst {
    EbpfInst {
        opcode,
        dst,
        src,
        offset,
        imm,
    }
}

fn decode(records: &[EbpfInst]) -> Vec<Instruction> {
    unmarshal(records).expect("program decodes")
}

#[test]
fn straight_line_blocks_chain() {
    let insts = decode(&[
        rec(0xb7, 0, 0, 0, 0), // r0 = 0
        rec(0x07, 0, 0, 0, 1), // r0 += 1
        rec(0x95, 0, 0, 0, 0), // exit
    ]);
    let cfg = Cfg::from_instructions(&insts).unwrap();
    assert_eq!(cfg.len(), 3);
    assert_eq!(cfg.block(&Label::new(0)).succs, vec![Label::new(1)]);
    assert_eq!(cfg.block(&Label::new(1)).succs, vec![Label::new(2)]);
    assert!(cfg.block(&Label::new(2)).succs.is_empty());
    assert_eq!(cfg.block(&Label::new(1)).preds, vec![Label::new(0)]);
}

#[test]
fn nondet_form_splits_conditional_jumps() {
    let insts = decode(&[
        rec(0xb7, 0, 0, 0, 0),  // 0: r0 = 0
        rec(0x15, 0, 0, 1, 5),  // 1: if r0 == 5 goto 3
        rec(0xb7, 0, 0, 0, 1),  // 2: r0 = 1
        rec(0x95, 0, 0, 0, 0),  // 3: exit
    ]);
    let cfg = Cfg::from_instructions(&insts).unwrap().to_nondet();
    // The jump block is now empty with two assume-guarded successors.
    let head = cfg.block(&Label::new(1));
    assert!(head.insts.is_empty());
    assert_eq!(head.succs.len(), 2);
    let taken = cfg.block(&Label::branch(1, 3));
    assert!(matches!(taken.insts[0], Instruction::Assume(c) if c.op == bpf_absint::asm::CmpOp::Eq));
    assert_eq!(taken.succs, vec![Label::new(3)]);
    let fall = cfg.block(&Label::branch(1, 2));
    assert!(matches!(fall.insts[0], Instruction::Assume(c) if c.op == bpf_absint::asm::CmpOp::Ne));
    assert_eq!(fall.succs, vec![Label::new(2)]);
}

#[test]
fn unconditional_jumps_become_pure_edges() {
    let insts = decode(&[
        rec(0x05, 0, 0, 1, 0),  // 0: goto 2
        rec(0xb7, 0, 0, 0, 7),  // 1: dead
        rec(0x95, 0, 0, 0, 0),  // 2: exit
    ]);
    let cfg = Cfg::from_instructions(&insts).unwrap().to_nondet();
    let b = cfg.block(&Label::new(0));
    assert!(b.insts.is_empty());
    assert_eq!(b.succs, vec![Label::new(2)]);
}

#[test]
fn loop_heads_are_back_edge_targets() {
    let insts = decode(&[
        rec(0xb7, 0, 0, 0, 0),   // 0: r0 = 0
        rec(0x07, 0, 0, 0, 1),   // 1: r0 += 1
        rec(0xa5, 0, 0, -2, 10), // 2: if r0 < 10 goto 1
        rec(0x95, 0, 0, 0, 0),   // 3: exit
    ]);
    let cfg = Cfg::from_instructions(&insts).unwrap().to_nondet();
    let heads = cfg.loop_heads();
    assert_eq!(heads, vec![Label::new(1)]);
    // Reverse post-order starts at the entry.
    let rpo = cfg.reverse_post_order();
    assert_eq!(rpo[0], Label::new(0));
    assert_eq!(rpo.len(), cfg.len());
}

#[test]
fn fall_through_off_the_end_is_rejected() {
    let insts = decode(&[rec(0xb7, 0, 0, 0, 0)]);
    assert!(matches!(
        Cfg::from_instructions(&insts),
        Err(VerifierError::FallThroughExit(0))
    ));
}

#[test]
fn jump_into_a_wide_immediate_is_rejected() {
    let insts = decode(&[
        rec(0x05, 0, 0, 1, 0),  // 0: goto 2 (the lddw filler)
        rec(0x18, 1, 0, 0, 0),  // 1: lddw
        rec(0x00, 0, 0, 0, 0),  // 2:   (filler)
        rec(0x95, 0, 0, 0, 0),  // 3: exit
    ]);
    assert!(matches!(
        Cfg::from_instructions(&insts),
        Err(VerifierError::JumpOutOfRange { pc: 0, target: 2, .. })
    ));
}

fn count_asserts(cfg: &Cfg) -> Vec<Assertion> {
    let mut out = Vec::new();
    for (_, block) in cfg.iter() {
        for inst in &block.insts {
            if let Instruction::Assert(a) = inst {
                out.push(*a);
            }
        }
    }
    out
}

#[test]
fn exit_asserts_a_numeric_return() {
    let insts = decode(&[rec(0xb7, 0, 0, 0, 0), rec(0x95, 0, 0, 0, 0)]);
    let mut cfg = Cfg::from_instructions(&insts).unwrap().to_nondet();
    explicate_assertions(&mut cfg, &ProgramInfo::new(ProgType::Xdp, vec![]));
    let asserts = count_asserts(&cfg);
    assert!(asserts.iter().any(|a| matches!(
        a,
        Assertion::TypeConstraint {
            group: TypeGroup::Num,
            ..
        }
    )));
}

fn brancher(imm: i32) -> Vec<Instruction> {
    decode(&[
        rec(0x15, 1, 0, 1, imm), // 0: if r1 == imm goto 2
        rec(0xb7, 0, 0, 0, 0),   // 1: r0 = 0
        rec(0x95, 0, 0, 0, 0),   // 2: exit
    ])
}

#[test]
fn comparisons_with_the_zero_literal_admit_pointers() {
    // if r1 == 0: no numericness assertion on r1.
    let mut cfg = Cfg::from_instructions(&brancher(0)).unwrap().to_nondet();
    explicate_assertions(&mut cfg, &ProgramInfo::new(ProgType::Xdp, vec![]));
    let no_num_on_r1 = count_asserts(&cfg).iter().all(|a| {
        !matches!(
            a,
            Assertion::TypeConstraint {
                reg,
                group: TypeGroup::Num
            } if reg.0 == 1
        )
    });
    assert!(no_num_on_r1);

    // if r1 == 7: r1 must be numeric.
    let mut cfg = Cfg::from_instructions(&brancher(7)).unwrap().to_nondet();
    explicate_assertions(&mut cfg, &ProgramInfo::new(ProgType::Xdp, vec![]));
    let num_on_r1 = count_asserts(&cfg).iter().any(|a| {
        matches!(
            a,
            Assertion::TypeConstraint {
                reg,
                group: TypeGroup::Num
            } if reg.0 == 1
        )
    });
    assert!(num_on_r1);
}

#[test]
fn privileged_programs_skip_comparison_checks() {
    let insts = decode(&[
        rec(0x1d, 1, 2, 1, 0), // 0: if r1 == r2 goto 2
        rec(0xb7, 0, 0, 0, 0), // 1: r0 = 0
        rec(0x95, 0, 0, 0, 0), // 2: exit
    ]);
    let comparables = |prog_type: ProgType| {
        let mut cfg = Cfg::from_instructions(&insts).unwrap().to_nondet();
        explicate_assertions(&mut cfg, &ProgramInfo::new(prog_type, vec![]));
        count_asserts(&cfg)
            .iter()
            .filter(|a| matches!(a, Assertion::Comparable { .. }))
            .count()
    };
    assert_eq!(comparables(ProgType::Kprobe), 0);
    assert!(comparables(ProgType::Xdp) > 0);
}

#[test]
fn stores_get_leak_checks() {
    let insts = decode(&[
        rec(0x7b, 1, 2, 0, 0), // *(u64 *)(r1 + 0) = r2
        rec(0xb7, 0, 0, 0, 0),
        rec(0x95, 0, 0, 0, 0),
    ]);
    let mut cfg = Cfg::from_instructions(&insts).unwrap().to_nondet();
    explicate_assertions(&mut cfg, &ProgramInfo::new(ProgType::Xdp, vec![]));
    let asserts = count_asserts(&cfg);
    assert!(asserts
        .iter()
        .any(|a| matches!(a, Assertion::ValidStore { .. })));
    assert!(asserts
        .iter()
        .any(|a| matches!(a, Assertion::ValidAccess { .. })));
    assert!(asserts.iter().any(|a| matches!(
        a,
        Assertion::TypeConstraint {
            group: TypeGroup::Ptr,
            ..
        }
    )));
}
