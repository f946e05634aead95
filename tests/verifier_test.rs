// SPDX-License-Identifier: GPL-2.0
//! End-to-end verification scenarios

use bpf_absint::prelude::*;

fn rec(opcode: u8, dst: u8, src: u8, offset: i16, imm: i32) -> EbpfInst {
    EbpfInst {
        opcode,
        dst,
        src,
        offset,
        imm,
    }
}

fn run(records: &[EbpfInst], info: &ProgramInfo) -> VerificationResult {
    let options = VerifierOptions {
        print_invariants: false,
        print_failures: true,
        check_termination: false,
    };
    let mut log = VerifierLog::new(LogLevel::Error);
    verify_records(records, info, DomainName::SdbmArr, &options, &mut log)
        .expect("program is well formed")
}

fn xdp() -> ProgramInfo {
    ProgramInfo::new(ProgType::Xdp, vec![])
}

#[test]
fn trivial_return_verifies() {
    // r0 := 0; exit
    let prog = [rec(0xb7, 0, 0, 0, 0), rec(0x95, 0, 0, 0, 0)];
    let result = run(&prog, &xdp());
    assert!(result.passed, "report: {}", result.checks);
}

#[test]
fn exit_without_a_numeric_r0_fails() {
    // exit with r0 never written
    let prog = [rec(0x95, 0, 0, 0, 0)];
    let result = run(&prog, &xdp());
    assert!(!result.passed);
}

#[test]
fn stack_store_of_a_number_verifies() {
    // r1 := r10; r1 += -8; *(u64 *)(r1 + 0) := 0; r0 := 0; exit
    let prog = [
        rec(0xbf, 1, 10, 0, 0),
        rec(0x07, 1, 0, 0, -8),
        rec(0x7a, 1, 0, 0, 0),
        rec(0xb7, 0, 0, 0, 0),
        rec(0x95, 0, 0, 0, 0),
    ];
    let result = run(&prog, &xdp());
    assert!(result.passed, "report: {}", result.checks);
}

#[test]
fn stack_may_hold_pointers() {
    // r1 := r10; r1 += -8; *(u64 *)(r1 + 0) := r1; r0 := 0; exit
    let prog = [
        rec(0xbf, 1, 10, 0, 0),
        rec(0x07, 1, 0, 0, -8),
        rec(0x7b, 1, 1, 0, 0),
        rec(0xb7, 0, 0, 0, 0),
        rec(0x95, 0, 0, 0, 0),
    ];
    let result = run(&prog, &xdp());
    assert!(result.passed, "report: {}", result.checks);
}

#[test]
fn stack_store_below_the_frame_fails() {
    // A store one byte below the 512-byte frame must be flagged.
    let prog = [
        rec(0x7a, 10, 0, -513, 0),
        rec(0xb7, 0, 0, 0, 0),
        rec(0x95, 0, 0, 0, 0),
    ];
    let result = run(&prog, &xdp());
    assert!(!result.passed);
}

#[test]
fn context_load_at_data_is_a_packet_pointer() {
    // r0 := *(u32 *)(r1 + 0) loads the data pointer of an XDP
    // context, so exit sees a packet pointer and must complain.
    let prog = [rec(0x61, 0, 1, 0, 0), rec(0x95, 0, 0, 0, 0)];
    let result = run(&prog, &xdp());
    assert!(!result.passed);
}

#[test]
fn context_load_at_a_plain_offset_is_numeric() {
    // Offset 12 is none of data/end/meta for XDP: the load yields a
    // number and the program verifies.
    let prog = [rec(0x61, 0, 1, 12, 0), rec(0x95, 0, 0, 0, 0)];
    let result = run(&prog, &xdp());
    assert!(result.passed, "report: {}", result.checks);
}

#[test]
fn adding_an_unconstrained_register_to_a_pointer_fails() {
    // r0 := r1; r0 += r2; r0 := 0; exit - r2 is uninitialised, so the
    // addable check cannot be discharged.
    let prog = [
        rec(0xbf, 0, 1, 0, 0),
        rec(0x0f, 0, 2, 0, 0),
        rec(0xb7, 0, 0, 0, 0),
        rec(0x95, 0, 0, 0, 0),
    ];
    let result = run(&prog, &xdp());
    assert!(!result.passed);
}

#[test]
fn pointer_difference_of_like_regions_is_numeric() {
    // r1 := r10; r2 := r10; r2 += -16; r1 -= r2; exit returns r0 = 0.
    let prog = [
        rec(0xbf, 1, 10, 0, 0),
        rec(0xbf, 2, 10, 0, 0),
        rec(0x07, 2, 0, 0, -16),
        rec(0x1f, 1, 2, 0, 0),
        rec(0xb7, 0, 0, 0, 0),
        rec(0x95, 0, 0, 0, 0),
    ];
    let result = run(&prog, &xdp());
    assert!(result.passed, "report: {}", result.checks);
}

#[test]
fn bounded_loop_verifies_with_widening() {
    // r0 := 0; L: r0 += 1; if r0 < 10 goto L; exit
    let prog = [
        rec(0xb7, 0, 0, 0, 0),
        rec(0x07, 0, 0, 0, 1),
        rec(0xa5, 0, 0, -2, 10),
        rec(0x95, 0, 0, 0, 0),
    ];
    let result = run(&prog, &xdp());
    assert!(result.passed, "report: {}", result.checks);
    assert!(result.stats.widenings > 0);
}

#[test]
fn packet_access_guarded_by_data_end_verifies() {
    // The canonical XDP bounds check: load data and data_end, guard
    // a 4-byte read behind a comparison, then read.
    let prog = [
        rec(0x61, 2, 1, 0, 0),  // r2 = ctx.data
        rec(0x61, 3, 1, 4, 0),  // r3 = ctx.data_end
        rec(0xbf, 4, 2, 0, 0),  // r4 = r2
        rec(0x07, 4, 0, 0, 4),  // r4 += 4
        rec(0x2d, 4, 3, 1, 0),  // if r4 > r3 goto 6
        rec(0x61, 5, 2, 0, 0),  // r5 = *(u32 *)(r2 + 0)
        rec(0xb7, 0, 0, 0, 2),  // r0 = XDP_PASS
        rec(0x95, 0, 0, 0, 0),  // exit
    ];
    let result = run(&prog, &xdp());
    assert!(result.passed, "report: {}", result.checks);
}

#[test]
fn unguarded_packet_access_fails() {
    let prog = [
        rec(0x61, 2, 1, 0, 0), // r2 = ctx.data
        rec(0x61, 5, 2, 0, 0), // r5 = *(u32 *)(r2 + 0): no bounds check
        rec(0xb7, 0, 0, 0, 2),
        rec(0x95, 0, 0, 0, 0),
    ];
    let result = run(&prog, &xdp());
    assert!(!result.passed);
}

fn map_program(value_offset: i16, width_op: u8) -> Vec<EbpfInst> {
    vec![
        rec(0x18, 1, 1, 0, 0),            // r1 = map_fd 0
        rec(0x00, 0, 0, 0, 0),            //   (second slot)
        rec(0xbf, 2, 10, 0, 0),           // r2 = r10
        rec(0x07, 2, 0, 0, -4),           // r2 += -4
        rec(0x62, 2, 0, 0, 0),            // *(u32 *)(r2 + 0) = 0
        rec(0x85, 0, 0, 0, 1),            // call map_lookup_elem#1
        rec(0x15, 0, 0, 1, 0),            // if r0 == 0 goto +1
        rec(width_op, 1, 0, value_offset, 0), // r1 = *(width *)(r0 + off)
        rec(0xb7, 0, 0, 0, 0),            // r0 = 0
        rec(0x95, 0, 0, 0, 0),            // exit
    ]
}

fn with_map() -> ProgramInfo {
    ProgramInfo::new(ProgType::SocketFilter, vec![MapDef::sized(4, 8, 64)])
}

#[test]
fn map_lookup_and_in_bounds_value_access_verifies() {
    // 8-byte value, 8-byte read at offset 0.
    let result = run(&map_program(0, 0x79), &with_map());
    assert!(result.passed, "report: {}", result.checks);
}

#[test]
fn map_value_access_at_the_value_size_fails() {
    // 4-byte read at offset 8 of an 8-byte value runs off the end.
    let result = run(&map_program(8, 0x61), &with_map());
    assert!(!result.passed);
}

#[test]
fn legacy_packet_load_requires_the_context_in_r6() {
    // Valid: r6 = r1 first.
    let good = [
        rec(0xbf, 6, 1, 0, 0),
        rec(0x20, 0, 0, 0, 14),
        rec(0x95, 0, 0, 0, 0),
    ];
    let result = run(&good, &ProgramInfo::new(ProgType::SocketFilter, vec![]));
    assert!(result.passed, "report: {}", result.checks);

    // Invalid: r6 was never set up.
    let bad = [rec(0x20, 0, 0, 0, 14), rec(0x95, 0, 0, 0, 0)];
    let result = run(&bad, &ProgramInfo::new(ProgType::SocketFilter, vec![]));
    assert!(!result.passed);
}

fn masked_index_program(mask_insn: Option<EbpfInst>) -> Vec<EbpfInst> {
    // A random value is (optionally) masked into [0, 511], compared
    // against a limit register, negated, and used to index the stack.
    let mut prog = vec![rec(0x85, 0, 0, 0, 7)]; // call get_prandom_u32#7
    if let Some(mask) = mask_insn {
        prog.push(mask);
    }
    prog.extend([
        rec(0xb7, 2, 0, 0, 504), // r2 = 504
        rec(0x2d, 0, 2, 5, 0),   // if r0 > r2 goto exit path
        rec(0xbf, 1, 10, 0, 0),  // r1 = r10
        rec(0xbf, 3, 0, 0, 0),   // r3 = r0
        rec(0x87, 3, 0, 0, 0),   // r3 = -r3
        rec(0x0f, 1, 3, 0, 0),   // r1 += r3
        rec(0x7a, 1, 0, -8, 0),  // *(u64 *)(r1 - 8) = 0
        rec(0xb7, 0, 0, 0, 0),   // r0 = 0
        rec(0x95, 0, 0, 0, 0),   // exit
    ]);
    prog
}

#[test]
fn unsigned_guard_refines_proven_nonnegative_values() {
    // r0 &= 511 pins both comparison operands non-negative, so the
    // unsigned bound r0 <= r2 may flow into the value variables and
    // the derived stack access stays inside the frame.
    let prog = masked_index_program(Some(rec(0x57, 0, 0, 0, 511)));
    let result = run(&prog, &xdp());
    assert!(result.passed, "report: {}", result.checks);
}

#[test]
fn unsigned_guard_skips_possibly_negative_values() {
    // Without the mask the helper result could be anything; the
    // unsigned comparison refines nothing and the access is flagged.
    let prog = masked_index_program(None);
    let result = run(&prog, &xdp());
    assert!(!result.passed);
}

#[test]
fn the_interval_domain_handles_the_simple_cases_too() {
    let prog = [
        rec(0xbf, 1, 10, 0, 0),
        rec(0x07, 1, 0, 0, -8),
        rec(0x7a, 1, 0, 0, 0),
        rec(0xb7, 0, 0, 0, 0),
        rec(0x95, 0, 0, 0, 0),
    ];
    let mut log = VerifierLog::new(LogLevel::Error);
    let result = verify_records(
        &prog,
        &xdp(),
        DomainName::IntervalArr,
        &VerifierOptions {
            print_invariants: false,
            print_failures: false,
            check_termination: false,
        },
        &mut log,
    )
    .unwrap();
    assert!(result.passed, "report: {}", result.checks);
}

#[test]
fn termination_checking_flags_unbounded_loops() {
    // L: goto L - the instruction counter cannot be bounded.
    let prog = [
        rec(0xb7, 0, 0, 0, 0),
        rec(0x05, 0, 0, -1, 0),
        rec(0x95, 0, 0, 0, 0),
    ];
    let mut log = VerifierLog::new(LogLevel::Error);
    let result = verify_records(
        &prog,
        &xdp(),
        DomainName::SdbmArr,
        &VerifierOptions {
            print_invariants: false,
            print_failures: false,
            check_termination: true,
        },
        &mut log,
    )
    .unwrap();
    assert!(!result.checks.maybe_nonterminating.is_empty());
}
