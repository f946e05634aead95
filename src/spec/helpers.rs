// SPDX-License-Identifier: GPL-2.0

//! Helper function prototypes
//!
//! For every callable helper index: up to five argument kinds and a
//! return kind. The table is the contract the call checker enforces;
//! it covers the helpers common eBPF programs use. Indices are the
//! kernel's.

/// Argument kind, straight from the helper ABI
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ArgKind {
    /// Unused argument slot
    #[default]
    DontCare,
    Anything,
    ConstSize,
    ConstSizeOrZero,
    MapFd,
    PtrToMapKey,
    PtrToMapValue,
    PtrToCtx,
    PtrToMem,
    PtrToMemOrNull,
    PtrToUninitMem,
}

/// Return kind of a helper
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RetKind {
    Num,
    MapValueOrNull,
    Void,
}

/// One helper prototype
#[derive(Clone, Copy, Debug)]
pub struct HelperProto {
    /// Human-readable name, for diagnostics
    pub name: &'static str,
    /// Argument kinds for r1..r5
    pub args: [ArgKind; 5],
    /// Return kind
    pub ret: RetKind,
}

const fn args(
    a1: ArgKind,
    a2: ArgKind,
    a3: ArgKind,
    a4: ArgKind,
    a5: ArgKind,
) -> [ArgKind; 5] {
    [a1, a2, a3, a4, a5]
}

const DC: ArgKind = ArgKind::DontCare;
const ANY: ArgKind = ArgKind::Anything;
const SIZE: ArgKind = ArgKind::ConstSize;
const SIZE0: ArgKind = ArgKind::ConstSizeOrZero;
const MAP: ArgKind = ArgKind::MapFd;
const KEY: ArgKind = ArgKind::PtrToMapKey;
const VAL: ArgKind = ArgKind::PtrToMapValue;
const CTX: ArgKind = ArgKind::PtrToCtx;
const MEM: ArgKind = ArgKind::PtrToMem;
const MEM0: ArgKind = ArgKind::PtrToMemOrNull;
const UNINIT: ArgKind = ArgKind::PtrToUninitMem;

const fn proto(name: &'static str, ret: RetKind, a: [ArgKind; 5]) -> HelperProto {
    HelperProto { name, args: a, ret }
}

/// Prototype of helper `func`, if it is known
pub fn helper_proto(func: i32) -> Option<HelperProto> {
    use RetKind::*;
    Some(match func {
        1 => proto("map_lookup_elem", MapValueOrNull, args(MAP, KEY, DC, DC, DC)),
        2 => proto("map_update_elem", Num, args(MAP, KEY, VAL, ANY, DC)),
        3 => proto("map_delete_elem", Num, args(MAP, KEY, DC, DC, DC)),
        4 => proto("probe_read", Num, args(UNINIT, SIZE, ANY, DC, DC)),
        5 => proto("ktime_get_ns", Num, args(DC, DC, DC, DC, DC)),
        6 => proto("trace_printk", Num, args(MEM, SIZE, ANY, ANY, ANY)),
        7 => proto("get_prandom_u32", Num, args(DC, DC, DC, DC, DC)),
        8 => proto("get_smp_processor_id", Num, args(DC, DC, DC, DC, DC)),
        9 => proto("skb_store_bytes", Num, args(CTX, ANY, MEM, SIZE, ANY)),
        10 => proto("l3_csum_replace", Num, args(CTX, ANY, ANY, ANY, ANY)),
        11 => proto("l4_csum_replace", Num, args(CTX, ANY, ANY, ANY, ANY)),
        12 => proto("tail_call", Void, args(CTX, MAP, ANY, DC, DC)),
        13 => proto("clone_redirect", Num, args(CTX, ANY, ANY, DC, DC)),
        14 => proto("get_current_pid_tgid", Num, args(DC, DC, DC, DC, DC)),
        15 => proto("get_current_uid_gid", Num, args(DC, DC, DC, DC, DC)),
        16 => proto("get_current_comm", Num, args(UNINIT, SIZE, DC, DC, DC)),
        17 => proto("get_cgroup_classid", Num, args(CTX, DC, DC, DC, DC)),
        23 => proto("redirect", Num, args(ANY, ANY, DC, DC, DC)),
        25 => proto("perf_event_output", Num, args(CTX, MAP, ANY, MEM, SIZE)),
        26 => proto("skb_load_bytes", Num, args(CTX, ANY, UNINIT, SIZE, DC)),
        27 => proto("get_stackid", Num, args(CTX, MAP, ANY, DC, DC)),
        28 => proto("csum_diff", Num, args(MEM0, SIZE0, MEM0, SIZE0, ANY)),
        44 => proto("xdp_adjust_head", Num, args(CTX, ANY, DC, DC, DC)),
        45 => proto("probe_read_str", Num, args(UNINIT, SIZE0, ANY, DC, DC)),
        46 => proto("get_socket_cookie", Num, args(CTX, DC, DC, DC, DC)),
        51 => proto("redirect_map", Num, args(MAP, ANY, ANY, DC, DC)),
        54 => proto("xdp_adjust_meta", Num, args(CTX, ANY, DC, DC, DC)),
        _ => return None,
    })
}

/// Kind of an argument checked on its own
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArgSingleKind {
    Anything,
    MapFd,
    PtrToMapKey,
    PtrToMapValue,
    PtrToCtx,
}

/// A lone argument register
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArgSingle {
    /// What the register must hold
    pub kind: ArgSingleKind,
    /// The argument register (1..=5)
    pub reg: u8,
}

/// Kind of a (pointer, size) argument pair
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArgPairKind {
    PtrToMem,
    PtrToMemOrNull,
    PtrToUninitMem,
}

/// A pointer argument together with its size argument
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArgPair {
    /// What the pointer register must reference
    pub kind: ArgPairKind,
    /// The pointer register
    pub mem: u8,
    /// The size register
    pub size: u8,
    /// Whether a zero size is acceptable
    pub can_be_zero: bool,
}

/// A helper signature resolved into checkable argument groups
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSig {
    /// Helper name
    pub name: &'static str,
    /// Arguments checked on their own
    pub singles: Vec<ArgSingle>,
    /// Pointer/size argument pairs
    pub pairs: Vec<ArgPair>,
    /// True when the helper returns a map value pointer
    pub returns_map: bool,
    /// True when the helper returns nothing
    pub returns_void: bool,
}

/// Group the raw prototype of `func` into singles and pairs
pub fn resolve_signature(func: i32) -> Option<CallSig> {
    let proto = helper_proto(func)?;
    let mut singles = Vec::new();
    let mut pairs = Vec::new();
    let mut i = 0;
    while i < proto.args.len() {
        let reg = (i + 1) as u8;
        match proto.args[i] {
            ArgKind::DontCare => break,
            ArgKind::Anything | ArgKind::ConstSize | ArgKind::ConstSizeOrZero => {
                // A size argument not paired with a pointer is only
                // required to be numeric.
                singles.push(ArgSingle {
                    kind: ArgSingleKind::Anything,
                    reg,
                });
            }
            ArgKind::MapFd => singles.push(ArgSingle {
                kind: ArgSingleKind::MapFd,
                reg,
            }),
            ArgKind::PtrToMapKey => singles.push(ArgSingle {
                kind: ArgSingleKind::PtrToMapKey,
                reg,
            }),
            ArgKind::PtrToMapValue => singles.push(ArgSingle {
                kind: ArgSingleKind::PtrToMapValue,
                reg,
            }),
            ArgKind::PtrToCtx => singles.push(ArgSingle {
                kind: ArgSingleKind::PtrToCtx,
                reg,
            }),
            mem_kind @ (ArgKind::PtrToMem | ArgKind::PtrToMemOrNull | ArgKind::PtrToUninitMem) => {
                let kind = match mem_kind {
                    ArgKind::PtrToMem => ArgPairKind::PtrToMem,
                    ArgKind::PtrToMemOrNull => ArgPairKind::PtrToMemOrNull,
                    _ => ArgPairKind::PtrToUninitMem,
                };
                let can_be_zero = matches!(
                    proto.args.get(i + 1),
                    Some(ArgKind::ConstSizeOrZero)
                );
                pairs.push(ArgPair {
                    kind,
                    mem: reg,
                    size: reg + 1,
                    can_be_zero,
                });
                i += 1;
            }
        }
        i += 1;
    }
    Some(CallSig {
        name: proto.name,
        singles,
        pairs,
        returns_map: proto.ret == RetKind::MapValueOrNull,
        returns_void: proto.ret == RetKind::Void,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_lookup_resolves_to_fd_and_key() {
        let sig = resolve_signature(1).unwrap();
        assert!(sig.returns_map);
        assert_eq!(sig.singles.len(), 2);
        assert_eq!(sig.singles[0].kind, ArgSingleKind::MapFd);
        assert_eq!(sig.singles[1].kind, ArgSingleKind::PtrToMapKey);
        assert!(sig.pairs.is_empty());
    }

    #[test]
    fn probe_read_pairs_buffer_with_size() {
        let sig = resolve_signature(4).unwrap();
        assert_eq!(sig.pairs.len(), 1);
        let p = sig.pairs[0];
        assert_eq!(p.kind, ArgPairKind::PtrToUninitMem);
        assert_eq!((p.mem, p.size), (1, 2));
        assert!(!p.can_be_zero);
        // The trailing source address is a plain single.
        assert_eq!(sig.singles.len(), 1);
        assert_eq!(sig.singles[0].reg, 3);
    }

    #[test]
    fn csum_diff_accepts_null_buffers_of_zero_size() {
        let sig = resolve_signature(28).unwrap();
        assert_eq!(sig.pairs.len(), 2);
        assert!(sig.pairs.iter().all(|p| p.can_be_zero));
        assert!(sig.pairs.iter().all(|p| p.kind == ArgPairKind::PtrToMemOrNull));
    }

    #[test]
    fn unknown_helpers_are_rejected() {
        assert!(resolve_signature(9999).is_none());
        assert!(helper_proto(0).is_none());
    }
}
