// SPDX-License-Identifier: GPL-2.0

//! Map definitions
//!
//! The `maps` ELF section is an array of seven little-endian u32
//! fields per map. Only key/value sizes matter to the analysis; the
//! rest is carried for reporting.

/// One map definition, in section order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapDef {
    /// Raw map kind tag
    pub map_type: u32,
    /// Key size in bytes
    pub key_size: u32,
    /// Value size in bytes
    pub value_size: u32,
    /// Maximum number of entries
    pub max_entries: u32,
    /// Creation flags
    pub map_flags: u32,
    /// Index of the inner map, for map-in-map kinds (unused)
    pub inner_map_idx: u32,
    /// NUMA node
    pub numa_node: u32,
}

/// Size of one serialized map definition
pub const MAP_DEF_SIZE: usize = 7 * 4;

impl MapDef {
    /// A plain array/hash style map with the given sizes
    pub fn sized(key_size: u32, value_size: u32, max_entries: u32) -> Self {
        MapDef {
            map_type: MapKind::Array as u32,
            key_size,
            value_size,
            max_entries,
            map_flags: 0,
            inner_map_idx: 0,
            numa_node: 0,
        }
    }

    /// Decode one definition from its 28-byte little-endian record
    pub fn parse(bytes: &[u8]) -> Option<MapDef> {
        if bytes.len() < MAP_DEF_SIZE {
            return None;
        }
        let word = |i: usize| u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
        Some(MapDef {
            map_type: word(0),
            key_size: word(1),
            value_size: word(2),
            max_entries: word(3),
            map_flags: word(4),
            inner_map_idx: word(5),
            numa_node: word(6),
        })
    }

    /// The known kind, if the tag is one
    pub fn kind(&self) -> Option<MapKind> {
        MapKind::from_u32(self.map_type)
    }
}

/// Known map kinds; the tag order is the kernel's
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MapKind {
    Unspec = 0,
    Hash,
    Array,
    ProgArray,
    PerfEventArray,
    PercpuHash,
    PercpuArray,
    StackTrace,
    CgroupArray,
    LruHash,
    LruPercpuHash,
    LpmTrie,
    ArrayOfMaps,
    HashOfMaps,
    Devmap,
    Sockmap,
    Cpumap,
    Xskmap,
    Sockhash,
    CgroupStorage,
    ReuseportSockarray,
    PercpuCgroupStorage,
    Queue,
    Stack,
}

impl MapKind {
    /// Decode the kernel tag
    pub fn from_u32(v: u32) -> Option<MapKind> {
        use MapKind::*;
        Some(match v {
            0 => Unspec,
            1 => Hash,
            2 => Array,
            3 => ProgArray,
            4 => PerfEventArray,
            5 => PercpuHash,
            6 => PercpuArray,
            7 => StackTrace,
            8 => CgroupArray,
            9 => LruHash,
            10 => LruPercpuHash,
            11 => LpmTrie,
            12 => ArrayOfMaps,
            13 => HashOfMaps,
            14 => Devmap,
            15 => Sockmap,
            16 => Cpumap,
            17 => Xskmap,
            18 => Sockhash,
            19 => CgroupStorage,
            20 => ReuseportSockarray,
            21 => PercpuCgroupStorage,
            22 => Queue,
            23 => Stack,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_little_endian_words() {
        let mut bytes = Vec::new();
        for w in [1u32, 4, 64, 128, 0, 0, 0] {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        let def = MapDef::parse(&bytes).unwrap();
        assert_eq!(def.kind(), Some(MapKind::Hash));
        assert_eq!(def.key_size, 4);
        assert_eq!(def.value_size, 64);
        assert_eq!(def.max_entries, 128);
        assert!(MapDef::parse(&bytes[..20]).is_none());
    }
}
