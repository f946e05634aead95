// SPDX-License-Identifier: GPL-2.0

//! Top-level verification pipeline
//!
//! Wires the pieces together: decode, CFG construction, the
//! non-deterministic form, assertion injection, the fixpoint, and the
//! checking pass. The numeric domain is selectable; the split DBM with
//! array expansion is the default and the interval environment is the
//! cheap alternative.

use crate::asm::{explicate_assertions, unmarshal, Cfg, EbpfInst, Instruction};
use crate::analysis::{generate_report, run_forward, ChecksDb, FixpointStats};
use crate::domains::ebpf::EbpfDomain;
use crate::domains::{IntervalEnv, NumericDomain, SplitDbm};
use crate::error::Result;
use crate::log::VerifierLog;
use crate::spec::ProgramInfo;

/// Host-facing knobs of a verification run
#[derive(Debug, Clone, Copy)]
pub struct VerifierOptions {
    /// Print per-label invariants into the log
    pub print_invariants: bool,
    /// Print the diagnostics report into the log
    pub print_failures: bool,
    /// Track the per-path instruction counter and report loop heads it
    /// cannot bound
    pub check_termination: bool,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        VerifierOptions {
            print_invariants: true,
            print_failures: true,
            check_termination: false,
        }
    }
}

/// Selectable numeric domains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainName {
    /// Split difference-bound matrices with array expansion
    SdbmArr,
    /// Plain intervals with array expansion
    IntervalArr,
}

impl DomainName {
    /// Parse a domain name argument
    pub fn parse(s: &str) -> Option<DomainName> {
        match s {
            "sdbm-arr" => Some(DomainName::SdbmArr),
            "interval-arr" => Some(DomainName::IntervalArr),
            _ => None,
        }
    }

    /// Names and descriptions of the available domains
    pub fn descriptions() -> &'static [(&'static str, &'static str)] {
        &[
            ("sdbm-arr", "mem: split dbm (the default)"),
            ("interval-arr", "mem: plain intervals"),
        ]
    }
}

/// The outcome of one verification run
#[derive(Debug)]
pub struct VerificationResult {
    /// True when no check produced a warning or error
    pub passed: bool,
    /// The full diagnostics database
    pub checks: ChecksDb,
    /// Fixpoint counters
    pub stats: FixpointStats,
}

/// Verify already-decoded instructions with the given domain.
pub fn verify_instructions(
    insts: &[Instruction],
    info: &ProgramInfo,
    domain: DomainName,
    options: &VerifierOptions,
    log: &mut VerifierLog,
) -> Result<VerificationResult> {
    match domain {
        DomainName::SdbmArr => analyze::<SplitDbm>(insts, info, options, log),
        DomainName::IntervalArr => analyze::<IntervalEnv>(insts, info, options, log),
    }
}

/// Decode and verify raw instruction records.
pub fn verify_records(
    records: &[EbpfInst],
    info: &ProgramInfo,
    domain: DomainName,
    options: &VerifierOptions,
    log: &mut VerifierLog,
) -> Result<VerificationResult> {
    let insts = unmarshal(records)?;
    verify_instructions(&insts, info, domain, options, log)
}

fn analyze<D: NumericDomain>(
    insts: &[Instruction],
    info: &ProgramInfo,
    options: &VerifierOptions,
    log: &mut VerifierLog,
) -> Result<VerificationResult> {
    let det = Cfg::from_instructions(insts)?;
    let mut cfg = det.to_nondet();
    explicate_assertions(&mut cfg, info);

    let entry = EbpfDomain::<D>::setup_entry(&info.ctx_desc);
    let (invariants, stats) = run_forward(&cfg, info, entry, options.check_termination);

    if options.print_invariants {
        for (label, block) in cfg.iter() {
            log.info("");
            log.info(&format!("{}", invariants.pre(label)));
            log.info(&format!("{}:", label));
            for inst in &block.insts {
                log.info(&format!("  {}", inst));
            }
            log.info(&format!("{}", invariants.post(label)));
        }
    }

    let checks = generate_report(&cfg, info, &invariants, options.check_termination);
    if options.print_failures && !checks.passed() {
        checks.write(log);
    }
    Ok(VerificationResult {
        passed: checks.passed(),
        checks,
        stats,
    })
}
