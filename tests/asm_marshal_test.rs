// SPDX-License-Identifier: GPL-2.0
//! Tests for bpf_absint::asm::{marshal, unmarshal}

use bpf_absint::asm::{marshal_program, parse_raw, unmarshal, EbpfInst, Instruction};
use bpf_absint::error::VerifierError;

fn rec(opcode: u8, dst: u8, src: u8, offset: i16, imm: i32) -> EbpfInst {
    EbpfInst {
        opcode,
        dst,
        src,
        offset,
        imm,
    }
}

/// A program touching every encodable class: ALU, wide immediates,
/// map-fd pseudo loads, loads, stores, atomic add, packet loads,
/// calls, jumps, and exit.
fn kitchen_sink() -> Vec<EbpfInst> {
    vec![
        rec(0xb7, 0, 0, 0, 0),            // r0 = 0
        rec(0xbf, 6, 1, 0, 0),            // r6 = r1
        rec(0x18, 2, 0, 0, -2),           // r2 = lddw 0x1fffffffe
        rec(0x00, 0, 0, 0, 1),            //   (second slot)
        rec(0x18, 3, 1, 0, 0),            // r3 = map_fd 0
        rec(0x00, 0, 0, 0, 0),            //   (second slot)
        rec(0x07, 2, 0, 0, 8),            // r2 += 8
        rec(0x2f, 2, 0, 0, 0),            // r2 *= r0
        rec(0x87, 2, 0, 0, 0),            // r2 = -r2
        rec(0xd4, 2, 0, 0, 16),           // r2 = le16 r2
        rec(0x63, 10, 1, -4, 0),          // *(u32 *)(r10 - 4) = r1
        rec(0x7b, 10, 1, -16, 0),         // *(u64 *)(r10 - 16) = r1
        rec(0x62, 10, 0, -8, 7),          // *(u32 *)(r10 - 8) = 7
        rec(0x61, 4, 10, -4, 0),          // r4 = *(u32 *)(r10 - 4)
        rec(0xdb, 10, 0, -16, 0),         // lock *(u64 *)(r10 - 16) += r0
        rec(0x85, 0, 0, 0, 5),            // call ktime_get_ns#5
        rec(0x15, 0, 0, 1, 0),            // if r0 == 0 goto +1
        rec(0x05, 0, 0, 0, 0),            // goto +0
        rec(0x20, 0, 0, 0, 14),           // r0 = ldabsw packet[14]
        rec(0x40, 0, 7, 0, 0),            // r0 = ldindw packet[r7]
        rec(0x95, 0, 0, 0, 0),            // exit
    ]
}

#[test]
fn round_trip_preserves_every_record() {
    let records = kitchen_sink();
    let decoded = unmarshal(&records).expect("kitchen sink decodes");
    let encoded = marshal_program(&decoded).expect("kitchen sink encodes");
    assert_eq!(records, encoded);
}

#[test]
fn byte_level_round_trip() {
    let records = kitchen_sink();
    let mut bytes = Vec::new();
    for r in &records {
        bytes.extend_from_slice(&r.to_bytes());
    }
    let parsed = parse_raw(&bytes).unwrap();
    assert_eq!(parsed, records);
    // Field packing: dst in the low nibble, src in the high one.
    let b = rec(0xbf, 6, 1, 0, 0).to_bytes();
    assert_eq!(b[1], 0x16);
}

#[test]
fn wide_immediates_concatenate() {
    let records = vec![
        rec(0x18, 1, 0, 0, -1),
        rec(0x00, 0, 0, 0, 0x7fff_ffff),
        rec(0x95, 0, 0, 0, 0),
    ];
    let decoded = unmarshal(&records).unwrap();
    match &decoded[0] {
        Instruction::Bin { v, lddw, .. } => {
            assert!(*lddw);
            let expected = 0xffff_ffffu64 | (0x7fff_ffffu64 << 32);
            assert_eq!(*v, bpf_absint::asm::Value::Imm(expected as i64));
        }
        other => panic!("expected wide move, got {}", other),
    }
    // The filler slot keeps pc alignment.
    assert!(matches!(decoded[1], Instruction::Undefined(0)));
    assert_eq!(decoded.len(), 3);
}

#[test]
fn map_fd_pseudo_load_decodes() {
    let records = vec![
        rec(0x18, 1, 1, 0, 3),
        rec(0x00, 0, 0, 0, 0),
        rec(0x95, 0, 0, 0, 0),
    ];
    let decoded = unmarshal(&records).unwrap();
    assert!(matches!(
        decoded[0],
        Instruction::LoadMapFd { map_fd: 3, .. }
    ));
}

#[test]
fn truncated_lddw_is_rejected() {
    let records = vec![rec(0x18, 1, 0, 0, 3)];
    assert!(matches!(
        unmarshal(&records),
        Err(VerifierError::TruncatedLddw(0))
    ));
}

#[test]
fn unknown_opcodes_are_rejected_with_their_pc() {
    let records = vec![rec(0xb7, 0, 0, 0, 0), rec(0x0e, 0, 0, 0, 0)];
    match unmarshal(&records) {
        Err(VerifierError::InvalidInstruction { pc, .. }) => assert_eq!(pc, 1),
        other => panic!("expected invalid instruction, got {:?}", other),
    }
}

#[test]
fn out_of_range_jumps_are_rejected() {
    let records = vec![rec(0x05, 0, 0, 100, 0), rec(0x95, 0, 0, 0, 0)];
    assert!(matches!(
        unmarshal(&records),
        Err(VerifierError::JumpOutOfRange { pc: 0, .. })
    ));
}

#[test]
fn unknown_helpers_are_rejected() {
    let records = vec![rec(0x85, 0, 0, 0, 123456), rec(0x95, 0, 0, 0, 0)];
    assert!(matches!(
        unmarshal(&records),
        Err(VerifierError::UnknownHelper { func: 123456, .. })
    ));
}

#[test]
fn high_register_indices_are_rejected() {
    let records = vec![rec(0xb7, 11, 0, 0, 0)];
    assert!(matches!(
        unmarshal(&records),
        Err(VerifierError::InvalidRegister { reg: 11, .. })
    ));
}

#[test]
fn ragged_byte_streams_are_rejected() {
    assert!(parse_raw(&[0u8; 12]).is_err());
    assert!(parse_raw(&[]).is_err());
}
