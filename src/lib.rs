//! # bpf-absint
//!
//! A static verifier for eBPF programs based on abstract interpretation.
//!
//! Given a sequence of instructions and a program-type descriptor, the
//! analyzer decides whether every execution path respects the memory-
//! and type-safety preconditions of the in-kernel virtual machine:
//! valid pointer dereferences, in-bounds accesses, no pointer leakage
//! into numeric sinks, no arithmetic between incompatible pointer
//! kinds, well-typed helper invocations and a well-typed return.
//!
//! ## How it works
//!
//! - **Register triples**: each register is modelled by three numeric
//!   variables (kind, value, offset); kinds live in an ordered tag
//!   space so type sets are range constraints
//! - **Relational domain**: a split difference-bound matrix tracks
//!   difference constraints and intervals with incremental closure
//! - **Array expansion**: stack, context and shared memory become
//!   byte-indexed cells over the scalar domain
//! - **Explicit assertions**: every precondition is injected into the
//!   non-deterministic CFG and discharged against the fixpoint
//!
//! ## Quick start
//!
//! ```rust
//! use bpf_absint::prelude::*;
//!
//! // r0 = 0; exit
//! let program = vec![
//!     EbpfInst { opcode: 0xb7, dst: 0, src: 0, offset: 0, imm: 0 },
//!     EbpfInst { opcode: 0x95, dst: 0, src: 0, offset: 0, imm: 0 },
//! ];
//! let info = ProgramInfo::new(ProgType::Xdp, vec![]);
//! let mut log = VerifierLog::default();
//! let result = verify_records(
//!     &program,
//!     &info,
//!     DomainName::SdbmArr,
//!     &VerifierOptions::default(),
//!     &mut log,
//! )
//! .unwrap();
//! assert!(result.passed);
//! ```
//!
//! ## Module structure
//!
//! - [`num`]: bignums, checked 64-bit weights, bounds and intervals
//! - [`linear`]: variables, linear expressions and constraints
//! - [`domains`]: the sparse graph, the split DBM, array expansion and
//!   the eBPF register/region domain
//! - [`asm`]: instruction IR, binary codec, CFGs and assertion
//!   injection
//! - [`spec`]: program-type descriptors, map definitions and helper
//!   prototypes
//! - [`analysis`]: the abstract transformer, the fixpoint and the
//!   checker
//! - [`verifier`]: the end-to-end pipeline
//! - [`loader`]: ELF and raw-file input handling

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod analysis;
pub mod asm;
pub mod domains;
pub mod error;
pub mod linear;
pub mod loader;
pub mod log;
pub mod num;
pub mod spec;
pub mod verifier;

/// Commonly used types and entry points
pub mod prelude {
    pub use crate::asm::{unmarshal, EbpfInst, Instruction};
    pub use crate::domains::ebpf::EbpfDomain;
    pub use crate::domains::{IntervalEnv, NumericDomain, SplitDbm};
    pub use crate::error::{Result, VerifierError};
    pub use crate::log::{LogLevel, VerifierLog};
    pub use crate::spec::{MapDef, ProgType, ProgramInfo};
    pub use crate::verifier::{
        verify_instructions, verify_records, DomainName, VerificationResult, VerifierOptions,
    };
}

pub use error::{Result, VerifierError};
