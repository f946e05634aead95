// SPDX-License-Identifier: GPL-2.0

//! Program-type descriptors, map definitions and helper prototypes
//!
//! Everything the analyzer is told about the outside world: which kind
//! of program it is looking at (and hence the context layout), which
//! maps exist, and the argument/return signatures of callable helpers.

pub mod helpers;
pub mod maps;
pub mod prog_type;

pub use helpers::{ArgPair, ArgPairKind, ArgSingle, ArgSingleKind, HelperProto, RetKind};
pub use maps::{MapDef, MapKind};
pub use prog_type::{ContextDescriptor, ProgType};

/// Everything known about the program under verification
#[derive(Clone, Debug)]
pub struct ProgramInfo {
    /// The program kind
    pub prog_type: ProgType,
    /// Context layout derived from the program kind
    pub ctx_desc: ContextDescriptor,
    /// Maps referenced by the program, indexed by load order
    pub map_defs: Vec<MapDef>,
}

impl ProgramInfo {
    /// Info for a program of the given type with the given maps
    pub fn new(prog_type: ProgType, map_defs: Vec<MapDef>) -> Self {
        ProgramInfo {
            prog_type,
            ctx_desc: prog_type.context_descriptor(),
            map_defs,
        }
    }

    /// Privileged program kinds skip the pointer-leak assertions
    pub fn is_privileged(&self) -> bool {
        self.prog_type == ProgType::Kprobe
    }
}
