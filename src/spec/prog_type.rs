// SPDX-License-Identifier: GPL-2.0

//! Program kinds and their context layouts

use crate::error::{Result, VerifierError};

// Rough estimates of the accessible context region sizes.
const PERF_MAX_TRACE_SIZE: i32 = 2048;
const PTREGS_SIZE: i32 = (3 + 63 + 8 + 2) * 8;

const CGROUP_DEV_REGIONS: i32 = 3 * 4;
const KPROBE_REGIONS: i32 = PTREGS_SIZE;
const TRACEPOINT_REGIONS: i32 = PERF_MAX_TRACE_SIZE;
const PERF_EVENT_REGIONS: i32 = 3 * 8 + PTREGS_SIZE;
const CGROUP_SOCK_REGIONS: i32 = 12 * 4;
const SOCK_OPS_REGIONS: i32 = 42 * 4 + 2 * 8;
const SK_SKB_REGIONS: i32 = 36 * 4;
const XDP_REGIONS: i32 = 5 * 4;

/// The closed enumeration of program kinds
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ProgType {
    Unspec,
    SocketFilter,
    Kprobe,
    SchedCls,
    SchedAct,
    Tracepoint,
    Xdp,
    PerfEvent,
    CgroupSkb,
    CgroupSock,
    LwtIn,
    LwtOut,
    LwtXmit,
    SockOps,
    SkSkb,
    CgroupDevice,
    SkMsg,
    RawTracepoint,
    CgroupSockAddr,
    LwtSeg6local,
    LircMode2,
}

/// Context layout of a program kind: region size and the byte offsets
/// of the distinguished `data`, `data_end` and `meta` fields (-1 when
/// the field does not exist)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextDescriptor {
    /// Size of the context region in bytes
    pub size: i32,
    /// Offset of the packet-data pointer field
    pub data: i32,
    /// Offset of the packet-end pointer field
    pub end: i32,
    /// Offset of the packet-metadata pointer field
    pub meta: i32,
}

const SK_BUFF: ContextDescriptor = ContextDescriptor {
    size: SK_SKB_REGIONS,
    data: 19 * 4,
    end: 20 * 4,
    meta: 35 * 4,
};

const XDP_MD: ContextDescriptor = ContextDescriptor {
    size: XDP_REGIONS,
    data: 0,
    end: 4,
    meta: 8,
};

const SK_MSG_MD: ContextDescriptor = ContextDescriptor {
    size: 17 * 4,
    data: 0,
    end: 8,
    meta: -1,
};

const fn plain(size: i32) -> ContextDescriptor {
    ContextDescriptor {
        size,
        data: -1,
        end: -1,
        meta: -1,
    }
}

impl ProgType {
    /// The context layout of this program kind
    pub fn context_descriptor(self) -> ContextDescriptor {
        match self {
            ProgType::Unspec => plain(0),
            ProgType::CgroupDevice => plain(CGROUP_DEV_REGIONS),
            ProgType::CgroupSock | ProgType::CgroupSockAddr => plain(CGROUP_SOCK_REGIONS),
            ProgType::Kprobe => plain(KPROBE_REGIONS),
            ProgType::Tracepoint | ProgType::RawTracepoint => plain(TRACEPOINT_REGIONS),
            ProgType::PerfEvent => plain(PERF_EVENT_REGIONS),
            ProgType::SocketFilter | ProgType::CgroupSkb => SK_BUFF,
            ProgType::SchedCls | ProgType::SchedAct => SK_BUFF,
            ProgType::Xdp => XDP_MD,
            ProgType::LwtXmit | ProgType::LwtIn | ProgType::LwtOut | ProgType::LwtSeg6local => {
                SK_BUFF
            }
            ProgType::SockOps => plain(SOCK_OPS_REGIONS),
            ProgType::SkSkb => SK_BUFF,
            ProgType::SkMsg | ProgType::LircMode2 => SK_MSG_MD,
        }
    }

    /// Program kind from its numeric tag
    pub fn from_index(idx: u32) -> Option<ProgType> {
        use ProgType::*;
        Some(match idx {
            0 => Unspec,
            1 => SocketFilter,
            2 => Kprobe,
            3 => SchedCls,
            4 => SchedAct,
            5 => Tracepoint,
            6 => Xdp,
            7 => PerfEvent,
            8 => CgroupSkb,
            9 => CgroupSock,
            10 => LwtIn,
            11 => LwtOut,
            12 => LwtXmit,
            13 => SockOps,
            14 => SkSkb,
            15 => CgroupDevice,
            16 => SkMsg,
            17 => RawTracepoint,
            18 => CgroupSockAddr,
            19 => LwtSeg6local,
            20 => LircMode2,
            _ => return None,
        })
    }

    /// Derive the program kind from an ELF section name
    pub fn from_section(name: &str) -> ProgType {
        let table: &[(&str, ProgType)] = &[
            ("socket", ProgType::SocketFilter),
            ("kprobe/", ProgType::Kprobe),
            ("kretprobe/", ProgType::Kprobe),
            ("tracepoint/", ProgType::Tracepoint),
            ("raw_tracepoint/", ProgType::RawTracepoint),
            ("xdp", ProgType::Xdp),
            ("perf_event", ProgType::PerfEvent),
            ("classifier", ProgType::SchedCls),
            ("action", ProgType::SchedAct),
            ("cgroup/dev", ProgType::CgroupDevice),
            ("cgroup/skb", ProgType::CgroupSkb),
            ("cgroup/sock", ProgType::CgroupSock),
            ("lwt_in", ProgType::LwtIn),
            ("lwt_out", ProgType::LwtOut),
            ("lwt_xmit", ProgType::LwtXmit),
            ("lwt_seg6local", ProgType::LwtSeg6local),
            ("sockops", ProgType::SockOps),
            ("sk_skb", ProgType::SkSkb),
            ("sk_msg", ProgType::SkMsg),
        ];
        for (prefix, t) in table {
            if name.starts_with(prefix) {
                return *t;
            }
        }
        ProgType::SocketFilter
    }

    /// Parse a user-supplied type argument: a name, a bare index, or
    /// the `typeN` form
    pub fn parse(s: &str) -> Result<ProgType> {
        let lowered = s.to_ascii_lowercase();
        let by_name = match lowered.as_str() {
            "unspec" => Some(ProgType::Unspec),
            "socket_filter" | "socket" => Some(ProgType::SocketFilter),
            "kprobe" => Some(ProgType::Kprobe),
            "sched_cls" | "classifier" => Some(ProgType::SchedCls),
            "sched_act" | "action" => Some(ProgType::SchedAct),
            "tracepoint" => Some(ProgType::Tracepoint),
            "xdp" => Some(ProgType::Xdp),
            "perf_event" => Some(ProgType::PerfEvent),
            "cgroup_skb" => Some(ProgType::CgroupSkb),
            "cgroup_sock" => Some(ProgType::CgroupSock),
            "lwt_in" => Some(ProgType::LwtIn),
            "lwt_out" => Some(ProgType::LwtOut),
            "lwt_xmit" => Some(ProgType::LwtXmit),
            "sock_ops" | "sockops" => Some(ProgType::SockOps),
            "sk_skb" => Some(ProgType::SkSkb),
            "cgroup_device" => Some(ProgType::CgroupDevice),
            "sk_msg" => Some(ProgType::SkMsg),
            "raw_tracepoint" => Some(ProgType::RawTracepoint),
            "cgroup_sock_addr" => Some(ProgType::CgroupSockAddr),
            "lwt_seg6local" => Some(ProgType::LwtSeg6local),
            "lirc_mode2" => Some(ProgType::LircMode2),
            _ => None,
        };
        if let Some(t) = by_name {
            return Ok(t);
        }
        let digits = lowered.strip_prefix("type").unwrap_or(&lowered);
        digits
            .parse::<u32>()
            .ok()
            .and_then(ProgType::from_index)
            .ok_or_else(|| VerifierError::UnknownProgramType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xdp_has_packet_fields_at_word_offsets() {
        let d = ProgType::Xdp.context_descriptor();
        assert_eq!((d.data, d.end, d.meta), (0, 4, 8));
        assert_eq!(d.size, 20);
    }

    #[test]
    fn sk_msg_has_no_meta() {
        let d = ProgType::SkMsg.context_descriptor();
        assert_eq!(d.meta, -1);
        assert!(d.data >= 0);
    }

    #[test]
    fn parse_accepts_names_and_indices() {
        assert_eq!(ProgType::parse("xdp").unwrap(), ProgType::Xdp);
        assert_eq!(ProgType::parse("type6").unwrap(), ProgType::Xdp);
        assert_eq!(ProgType::parse("2").unwrap(), ProgType::Kprobe);
        assert!(ProgType::parse("bogus").is_err());
    }
}
