// SPDX-License-Identifier: GPL-2.0
//! Tests for bpf_absint::loader

use std::path::PathBuf;

use bpf_absint::loader::{load_programs, LoadError};
use bpf_absint::spec::{MapDef, ProgType};

fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("bpf-absint-test-{}-{}", std::process::id(), name));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn raw_dumps_load_with_an_overridden_type() {
    // r0 = 0; exit
    let bytes: Vec<u8> = [
        [0xb7u8, 0, 0, 0, 0, 0, 0, 0],
        [0x95u8, 0, 0, 0, 0, 0, 0, 0],
    ]
    .concat();
    let path = temp_file("raw", &bytes);
    let programs = load_programs(&path, None, Some(ProgType::Xdp)).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(programs.len(), 1);
    assert_eq!(programs[0].records.len(), 2);
    assert_eq!(programs[0].info.prog_type, ProgType::Xdp);
    assert!(programs[0].section.is_empty());
}

#[test]
fn missing_files_are_io_errors_with_exit_code_65() {
    let path = PathBuf::from("/nonexistent/bpf-absint-no-such-file");
    match load_programs(&path, None, None) {
        Err(e @ LoadError::Io { .. }) => assert_eq!(e.exit_code(), 65),
        other => panic!("expected an I/O error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn ragged_raw_dumps_are_malformed_with_exit_code_2() {
    let path = temp_file("ragged", &[0u8; 11]);
    let result = load_programs(&path, None, None);
    std::fs::remove_file(&path).ok();
    match result {
        Err(e @ LoadError::Malformed(_)) => assert_eq!(e.exit_code(), 2),
        other => panic!("expected malformed input, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn truncated_elves_are_object_errors() {
    let path = temp_file("elf", &[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
    let result = load_programs(&path, None, None);
    std::fs::remove_file(&path).ok();
    match result {
        Err(e @ LoadError::Object(_)) => assert_eq!(e.exit_code(), 2),
        other => panic!("expected an object error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn map_definitions_parse_from_section_bytes() {
    let mut bytes = Vec::new();
    for def in [
        MapDef::sized(4, 64, 128),
        MapDef::sized(8, 4096, 1),
    ] {
        for word in [
            def.map_type,
            def.key_size,
            def.value_size,
            def.max_entries,
            def.map_flags,
            def.inner_map_idx,
            def.numa_node,
        ] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
    }
    let first = MapDef::parse(&bytes).unwrap();
    assert_eq!((first.key_size, first.value_size), (4, 64));
    let second = MapDef::parse(&bytes[28..]).unwrap();
    assert_eq!((second.key_size, second.value_size), (8, 4096));
}

#[test]
fn section_names_select_program_types() {
    assert_eq!(ProgType::from_section("xdp_prog"), ProgType::Xdp);
    assert_eq!(ProgType::from_section("kprobe/sys_open"), ProgType::Kprobe);
    assert_eq!(ProgType::from_section("cgroup/skb"), ProgType::CgroupSkb);
    assert_eq!(ProgType::from_section("main"), ProgType::SocketFilter);
}
