// SPDX-License-Identifier: GPL-2.0

//! Error types for the verifier core

use core::fmt;

/// Result type alias for verifier operations
pub type Result<T> = core::result::Result<T, VerifierError>;

/// Errors that can occur while preparing a program for analysis.
///
/// These are *input* errors: the analyzer refuses to run on such a
/// program. Semantic problems found during analysis are not errors,
/// they are diagnostics collected in the checks database.
#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub enum VerifierError {
    EmptyProgram,
    InvalidInstruction { pc: usize, what: String },
    TruncatedLddw(usize),
    JumpOutOfRange { pc: usize, target: i64, prog_len: usize },
    FallThroughExit(usize),
    UnknownHelper { pc: usize, func: i32 },
    UnknownMap { pc: usize, fd: i64 },
    InvalidRegister { pc: usize, reg: u8 },
    UnknownProgramType(String),
}

impl fmt::Display for VerifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifierError::EmptyProgram => write!(f, "empty program"),
            VerifierError::InvalidInstruction { pc, what } => {
                write!(f, "{}: invalid instruction: {}", pc, what)
            }
            VerifierError::TruncatedLddw(pc) => {
                write!(f, "{}: incomplete lddw (missing second slot)", pc)
            }
            VerifierError::JumpOutOfRange { pc, target, prog_len } => {
                write!(f, "{}: jump out of range: target {}, prog_len {}", pc, target, prog_len)
            }
            VerifierError::FallThroughExit(pc) => {
                write!(f, "{}: control falls through the end of the program", pc)
            }
            VerifierError::UnknownHelper { pc, func } => {
                write!(f, "{}: call to unknown helper #{}", pc, func)
            }
            VerifierError::UnknownMap { pc, fd } => {
                write!(f, "{}: reference to unknown map {}", pc, fd)
            }
            VerifierError::InvalidRegister { pc, reg } => {
                write!(f, "{}: invalid register r{}", pc, reg)
            }
            VerifierError::UnknownProgramType(s) => write!(f, "unknown program type: {}", s),
        }
    }
}

impl std::error::Error for VerifierError {}
