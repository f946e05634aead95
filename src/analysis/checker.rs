// SPDX-License-Identifier: GPL-2.0

//! The property checker
//!
//! Re-runs the transformer over the computed invariants with the
//! `require` hook recording diagnostics. The checker never stops at the
//! first problem: the full per-label report is collected, together with
//! blocks that became unreachable and, optionally, the loop heads whose
//! instruction counter could not be bounded.

use core::fmt;
use std::collections::{BTreeMap, BTreeSet};

use super::fixpoint::InvariantTable;
use super::transformer::AbsTransformer;
use crate::asm::{Cfg, Label};
use crate::domains::NumericDomain;
use crate::linear::Variable;
use crate::log::VerifierLog;
use crate::spec::ProgramInfo;

/// The severity of one diagnostic
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CheckKind {
    Warning,
    Error,
    Unreachable,
}

/// Per-label diagnostics database
#[derive(Debug, Default)]
pub struct ChecksDb {
    db: BTreeMap<Label, Vec<(CheckKind, String)>>,
    /// Number of warnings recorded
    pub total_warnings: usize,
    /// Number of errors recorded
    pub total_errors: usize,
    /// Number of blocks that became unreachable mid-block
    pub total_unreachable: usize,
    /// Loop heads whose visit count could not be bounded
    pub maybe_nonterminating: BTreeSet<Label>,
}

impl ChecksDb {
    /// Fresh, empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning at `label`
    pub fn add_warning(&mut self, label: Label, msg: String) {
        self.db.entry(label).or_default().push((CheckKind::Warning, msg));
        self.total_warnings += 1;
    }

    /// Record an error at `label`
    pub fn add_error(&mut self, label: Label, msg: String) {
        self.db.entry(label).or_default().push((CheckKind::Error, msg));
        self.total_errors += 1;
    }

    /// Record that `label` became unreachable
    pub fn add_unreachable(&mut self, label: Label, msg: String) {
        self.db
            .entry(label)
            .or_default()
            .push((CheckKind::Unreachable, msg));
        self.total_unreachable += 1;
    }

    /// Record a possible non-terminating loop head
    pub fn add_nontermination(&mut self, label: Label) {
        if self.maybe_nonterminating.insert(label) {
            self.total_warnings += 1;
        }
    }

    /// True when no warning or error was recorded
    pub fn passed(&self) -> bool {
        self.total_warnings == 0 && self.total_errors == 0
    }

    /// Iterate the diagnostics in label order
    pub fn iter(&self) -> impl Iterator<Item = (&Label, &Vec<(CheckKind, String)>)> {
        self.db.iter()
    }

    /// Append the report to the log
    pub fn write(&self, log: &mut VerifierLog) {
        for (label, reports) in &self.db {
            log.error(&format!("{}:", label));
            for (_, msg) in reports {
                log.error(&format!("  {}", msg));
            }
        }
        if !self.maybe_nonterminating.is_empty() {
            let labels: Vec<String> = self
                .maybe_nonterminating
                .iter()
                .map(|l| l.to_string())
                .collect();
            log.error(&format!(
                "could not prove termination on join into: {}",
                labels.join(", ")
            ));
        }
        log.error(&format!("{} warnings", self.total_warnings));
    }
}

impl fmt::Display for ChecksDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, reports) in &self.db {
            writeln!(f, "{}:", label)?;
            for (_, msg) in reports {
                writeln!(f, "  {}", msg)?;
            }
        }
        writeln!(f, "{} warnings", self.total_warnings)
    }
}

fn terminates<D: NumericDomain>(inv: &crate::domains::ebpf::EbpfDomain<D>) -> bool {
    inv.is_bottom() || inv.interval(Variable::InstructionCount).ub().is_finite()
}

/// Check every block against the computed invariants.
pub fn generate_report<D: NumericDomain>(
    cfg: &Cfg,
    info: &ProgramInfo,
    invariants: &InvariantTable<D>,
    check_termination: bool,
) -> ChecksDb {
    let mut db = ChecksDb::new();
    for (label, block) in cfg.iter() {
        let pre = invariants.pre(label);

        if check_termination {
            let mut pre_join_terminates = false;
            for p in &block.preds {
                pre_join_terminates |= terminates(invariants.pre(p));
            }
            if pre_join_terminates && !terminates(pre) {
                db.add_nontermination(*label);
            }
        }

        let pre_bot = pre.is_bottom();
        let mut tr = AbsTransformer::with_checks(pre.clone(), info, *label, &mut db);
        tr.exec_block(&block.insts);
        let post_bot = tr.inv.is_bottom();
        if !pre_bot && post_bot {
            db.add_unreachable(*label, format!("invariant became _|_ after {}", label));
        }
    }
    db
}
