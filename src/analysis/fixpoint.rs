// SPDX-License-Identifier: GPL-2.0

//! Forward fixpoint over the non-deterministic CFG
//!
//! Worklist iteration in reverse post-order. Loop heads (targets of
//! back-edges) are widened once they have been visited twice with
//! strict growth, which bounds the ascending chain; after the queue
//! drains, a single descending pass narrows the loop-reachable blocks
//! back down. The result is a pre- and post-state per label.

use std::collections::{BTreeMap, BTreeSet};

use super::transformer::AbsTransformer;
use crate::asm::{Cfg, Label};
use crate::domains::ebpf::EbpfDomain;
use crate::domains::{ArithOp, BinOpKind, NumericDomain, Operand};
use crate::linear::Variable;
use crate::spec::ProgramInfo;

/// Pre- and post-states per label
pub struct InvariantTable<D: NumericDomain> {
    pre: BTreeMap<Label, EbpfDomain<D>>,
    post: BTreeMap<Label, EbpfDomain<D>>,
}

impl<D: NumericDomain> InvariantTable<D> {
    /// The invariant holding before the block
    pub fn pre(&self, label: &Label) -> &EbpfDomain<D> {
        &self.pre[label]
    }

    /// The invariant holding after the block
    pub fn post(&self, label: &Label) -> &EbpfDomain<D> {
        &self.post[label]
    }
}

/// Counters from a fixpoint run
#[derive(Debug, Clone, Copy, Default)]
pub struct FixpointStats {
    /// Number of CFG blocks
    pub labels: usize,
    /// Number of instructions, assertions included
    pub instructions: usize,
    /// Blocks processed until stabilisation
    pub iterations: usize,
    /// Loop heads that were widened
    pub widenings: usize,
}

fn transform_block<D: NumericDomain>(
    pre: EbpfDomain<D>,
    cfg: &Cfg,
    label: &Label,
    info: &ProgramInfo,
    count_instructions: bool,
) -> EbpfDomain<D> {
    let mut tr = AbsTransformer::new(pre, info);
    tr.exec_block(&cfg.block(label).insts);
    let mut out = tr.inv;
    if count_instructions && !out.is_bottom() {
        out.apply(
            BinOpKind::Arith(ArithOp::Add),
            Variable::InstructionCount,
            Variable::InstructionCount,
            &Operand::from(1i64),
        );
    }
    out
}

/// Run the analysis to a fixpoint and return the invariant tables.
pub fn run_forward<D: NumericDomain>(
    cfg: &Cfg,
    info: &ProgramInfo,
    mut entry_inv: EbpfDomain<D>,
    check_termination: bool,
) -> (InvariantTable<D>, FixpointStats) {
    let rpo = cfg.reverse_post_order();
    let rpo_index: BTreeMap<Label, usize> =
        rpo.iter().enumerate().map(|(i, l)| (*l, i)).collect();
    let loop_heads: BTreeSet<Label> = cfg.loop_heads().into_iter().collect();

    if check_termination {
        entry_inv.assign_constant(Variable::InstructionCount, 0i64);
    }

    let mut pre: BTreeMap<Label, EbpfDomain<D>> = cfg
        .labels()
        .map(|l| (*l, EbpfDomain::bottom()))
        .collect();
    let mut post = pre.clone();
    pre.insert(cfg.entry(), entry_inv.clone());

    let mut stats = FixpointStats {
        labels: cfg.len(),
        instructions: cfg.num_instructions(),
        ..Default::default()
    };

    let mut visits: BTreeMap<Label, usize> = BTreeMap::new();
    let mut worklist: BTreeSet<usize> = BTreeSet::new();
    worklist.insert(rpo_index[&cfg.entry()]);

    // Widening guarantees stabilisation; the cap is a defect detector,
    // not part of the algorithm.
    let hard_cap = (cfg.len() + 1) * 64;

    while let Some(&i) = worklist.iter().next() {
        worklist.remove(&i);
        let label = rpo[i];
        stats.iterations += 1;
        if stats.iterations > hard_cap {
            break;
        }
        let out = transform_block(
            pre[&label].clone(),
            cfg,
            &label,
            info,
            check_termination,
        );
        post.insert(label, out.clone());
        for succ in &cfg.block(&label).succs {
            let Some(&succ_idx) = rpo_index.get(succ) else {
                continue;
            };
            let cur = &pre[succ];
            let joined = cur.join(&out);
            if joined.leq(cur) {
                continue;
            }
            let seen = visits.entry(*succ).or_insert(0);
            *seen += 1;
            let new_pre = if loop_heads.contains(succ) && *seen >= 2 {
                stats.widenings += 1;
                cur.widen(&joined)
            } else {
                joined
            };
            pre.insert(*succ, new_pre);
            worklist.insert(succ_idx);
        }
    }

    // One descending pass: recompute each pre from its predecessors'
    // posts, narrowing at the loop heads that were widened.
    for label in &rpo {
        let block = cfg.block(label);
        let mut joined = if *label == cfg.entry() {
            entry_inv.clone()
        } else {
            EbpfDomain::bottom()
        };
        for p in &block.preds {
            joined.join_with(&post[p]);
        }
        let refined = if loop_heads.contains(label) {
            pre[label].narrow(&joined)
        } else {
            joined
        };
        let out = transform_block(refined.clone(), cfg, label, info, check_termination);
        pre.insert(*label, refined);
        post.insert(*label, out);
    }

    (InvariantTable { pre, post }, stats)
}
