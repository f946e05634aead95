// SPDX-License-Identifier: GPL-2.0

//! Program loading
//!
//! Host-side input handling: reading program files (ELF objects or raw
//! instruction dumps), extracting map definitions and text sections,
//! and applying map-fd relocations. Everything here happens before the
//! analyzer core runs; its failures are input errors with distinct
//! exit codes, never diagnostics.

pub mod elf;

use std::path::Path;

use thiserror::Error;

use crate::asm::{parse_raw, EbpfInst};
use crate::error::VerifierError;
use crate::spec::{ProgType, ProgramInfo};

/// Errors surfaced to the host before analysis starts
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path of the offending file
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The object file could not be parsed
    #[error("cannot parse object file: {0}")]
    Object(#[from] object::read::Error),

    /// The maps section is not a whole number of map definitions
    #[error("malformed maps section of {0} bytes")]
    MalformedMaps(usize),

    /// No text section matched
    #[error("could not find a relevant program section")]
    NoProgram,

    /// The instruction stream itself is malformed
    #[error("malformed program: {0}")]
    Malformed(#[from] VerifierError),
}

impl LoadError {
    /// The process exit code this error maps to: 65 for I/O problems,
    /// 2 for malformed input
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::Io { .. } => 65,
            _ => 2,
        }
    }
}

/// One program extracted from an input file
#[derive(Debug, Clone)]
pub struct RawProgram {
    /// The originating file
    pub filename: String,
    /// The originating section; empty for raw dumps
    pub section: String,
    /// The undecoded instruction records
    pub records: Vec<EbpfInst>,
    /// Program type and map definitions
    pub info: ProgramInfo,
}

/// Load every program from `path`. ELF objects may contain several
/// text sections; raw dumps contain exactly one program whose type
/// must come from `type_override` (or defaults to a socket filter).
pub fn load_programs(
    path: &Path,
    desired_section: Option<&str>,
    type_override: Option<ProgType>,
) -> Result<Vec<RawProgram>, LoadError> {
    let data = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    if data.starts_with(&[0x7f, b'E', b'L', b'F']) {
        elf::read_elf(&data, &path.display().to_string(), desired_section, type_override)
    } else {
        let records = parse_raw(&data)?;
        let prog_type = type_override.unwrap_or(ProgType::SocketFilter);
        Ok(vec![RawProgram {
            filename: path.display().to_string(),
            section: String::new(),
            records,
            info: ProgramInfo::new(prog_type, Vec::new()),
        }])
    }
}
