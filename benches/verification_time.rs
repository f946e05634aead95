// SPDX-License-Identifier: GPL-2.0
//! End-to-end verification benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};

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

fn verify(records: &[EbpfInst], info: &ProgramInfo) -> bool {
    let options = VerifierOptions {
        print_invariants: false,
        print_failures: false,
        check_termination: false,
    };
    let mut log = VerifierLog::default();
    verify_records(records, info, DomainName::SdbmArr, &options, &mut log)
        .map(|r| r.passed)
        .unwrap_or(false)
}

fn straight_line_program() -> Vec<EbpfInst> {
    // A run of stack stores and reloads.
    let mut prog = vec![rec(0xbf, 1, 10, 0, 0)];
    for i in 0..16 {
        prog.push(rec(0x7a, 10, 0, -8 * (i + 1), i as i32)); // store
        prog.push(rec(0x79, 2, 10, -8 * (i + 1), 0)); // reload
    }
    prog.push(rec(0xb7, 0, 0, 0, 0));
    prog.push(rec(0x95, 0, 0, 0, 0));
    prog
}

fn loop_program() -> Vec<EbpfInst> {
    vec![
        rec(0xb7, 0, 0, 0, 0),
        rec(0x07, 0, 0, 0, 1),
        rec(0xa5, 0, 0, -2, 1000),
        rec(0x95, 0, 0, 0, 0),
    ]
}

fn packet_program() -> Vec<EbpfInst> {
    vec![
        rec(0x61, 2, 1, 0, 0),
        rec(0x61, 3, 1, 4, 0),
        rec(0xbf, 4, 2, 0, 0),
        rec(0x07, 4, 0, 0, 14),
        rec(0x2d, 4, 3, 2, 0),
        rec(0x61, 5, 2, 0, 0),
        rec(0x61, 6, 2, 8, 0),
        rec(0xb7, 0, 0, 0, 2),
        rec(0x95, 0, 0, 0, 0),
    ]
}

fn bench_verification(c: &mut Criterion) {
    let xdp = ProgramInfo::new(ProgType::Xdp, vec![]);

    let straight = straight_line_program();
    c.bench_function("verify_straight_line", |b| {
        b.iter(|| verify(black_box(&straight), &xdp))
    });

    let looped = loop_program();
    c.bench_function("verify_bounded_loop", |b| {
        b.iter(|| verify(black_box(&looped), &xdp))
    });

    let packet = packet_program();
    c.bench_function("verify_packet_bounds_check", |b| {
        b.iter(|| verify(black_box(&packet), &xdp))
    });
}

criterion_group!(benches, bench_verification);
criterion_main!(benches);
