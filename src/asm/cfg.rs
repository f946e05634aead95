// SPDX-License-Identifier: GPL-2.0

//! Labelled control-flow graph
//!
//! Built in two forms. The deterministic form has one block per
//! instruction slot with the natural successors. The non-deterministic
//! form replaces every conditional jump by an empty block with two
//! outgoing edges whose target blocks start with the explicit
//! `Assume(cond)` and `Assume(!cond)` refinements, which is what makes
//! condition-directed narrowing natural in the fixpoint.

use core::fmt;
use std::collections::BTreeMap;

use super::insn::Instruction;
use crate::error::{Result, VerifierError};

/// A block label: the instruction pc, plus the branch-target pc for
/// the assume-blocks of the non-deterministic form
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Label {
    /// The pc this block was generated from
    pub from: usize,
    /// For an assume-block, the successor pc it guards
    pub to: Option<usize>,
}

impl Label {
    /// The label of the plain block at `pc`
    pub fn new(pc: usize) -> Label {
        Label { from: pc, to: None }
    }

    /// The label of the assume-block guarding the edge `from -> to`
    pub fn branch(from: usize, to: usize) -> Label {
        Label {
            from,
            to: Some(to),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to {
            None => write!(f, "{}", self.from),
            Some(to) => write!(f, "{}:{}", self.from, to),
        }
    }
}

/// A basic block: instructions plus successor labels
#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
    /// Instructions executed in order
    pub insts: Vec<Instruction>,
    /// Successor labels
    pub succs: Vec<Label>,
    /// Predecessor labels, maintained by the graph
    pub preds: Vec<Label>,
}

/// A control-flow graph keyed by label
#[derive(Clone, Debug)]
pub struct Cfg {
    blocks: BTreeMap<Label, BasicBlock>,
    entry: Label,
}

impl Cfg {
    /// The entry label
    pub fn entry(&self) -> Label {
        self.entry
    }

    /// The block at `label`
    pub fn block(&self, label: &Label) -> &BasicBlock {
        &self.blocks[label]
    }

    /// Mutable access to the block at `label`
    pub fn block_mut(&mut self, label: &Label) -> &mut BasicBlock {
        self.blocks.get_mut(label).expect("label in cfg")
    }

    /// All labels in ascending order
    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.blocks.keys()
    }

    /// Iterate over labels and blocks
    pub fn iter(&self) -> impl Iterator<Item = (&Label, &BasicBlock)> {
        self.blocks.iter()
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True when the graph has no blocks
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of real instructions (assumes and asserts included)
    pub fn num_instructions(&self) -> usize {
        self.blocks.values().map(|b| b.insts.len()).sum()
    }

    /// Build the deterministic CFG: one block per instruction slot,
    /// with jump targets validated.
    pub fn from_instructions(insts: &[Instruction]) -> Result<Cfg> {
        if insts.is_empty() {
            return Err(VerifierError::EmptyProgram);
        }
        // The second slot of a wide immediate holds no block.
        let mut is_filler = vec![false; insts.len()];
        for (pc, inst) in insts.iter().enumerate() {
            if inst.is_wide() {
                if pc + 1 >= insts.len() {
                    return Err(VerifierError::TruncatedLddw(pc));
                }
                is_filler[pc + 1] = true;
            }
        }

        let mut blocks: BTreeMap<Label, BasicBlock> = BTreeMap::new();
        for (pc, inst) in insts.iter().enumerate() {
            if is_filler[pc] {
                continue;
            }
            let mut succs = Vec::new();
            let mut push_succ = |target: usize| -> Result<()> {
                if target >= insts.len() || is_filler[target] {
                    return Err(VerifierError::JumpOutOfRange {
                        pc,
                        target: target as i64,
                        prog_len: insts.len(),
                    });
                }
                succs.push(Label::new(target));
                Ok(())
            };
            match inst {
                Instruction::Exit => {}
                Instruction::Jmp { cond, target } => {
                    push_succ(*target)?;
                    if cond.is_some() {
                        let fall = pc + 1;
                        if fall >= insts.len() {
                            return Err(VerifierError::FallThroughExit(pc));
                        }
                        push_succ(fall)?;
                    }
                }
                _ => {
                    let next = if inst.is_wide() { pc + 2 } else { pc + 1 };
                    if next >= insts.len() {
                        return Err(VerifierError::FallThroughExit(pc));
                    }
                    push_succ(next)?;
                }
            }
            blocks.insert(
                Label::new(pc),
                BasicBlock {
                    insts: vec![inst.clone()],
                    succs,
                    preds: Vec::new(),
                },
            );
        }

        let mut cfg = Cfg {
            blocks,
            entry: Label::new(0),
        };
        cfg.recompute_preds();
        Ok(cfg)
    }

    /// The non-deterministic form: conditional jumps become empty
    /// blocks with two assume-guarded successors.
    pub fn to_nondet(&self) -> Cfg {
        let mut blocks: BTreeMap<Label, BasicBlock> = BTreeMap::new();
        for (label, bb) in &self.blocks {
            let split = bb.insts.iter().enumerate().find_map(|(i, inst)| {
                if let Instruction::Jmp {
                    cond: Some(cond),
                    target,
                } = inst
                {
                    Some((i, *cond, *target))
                } else {
                    None
                }
            });
            let Some((at, cond, target)) = split else {
                let mut clean = bb.clone();
                // Unconditional jumps become pure edges.
                clean
                    .insts
                    .retain(|i| !matches!(i, Instruction::Jmp { cond: None, .. }));
                clean.preds.clear();
                blocks.insert(*label, clean);
                continue;
            };
            debug_assert_eq!(at + 1, bb.insts.len());
            let fall = bb
                .succs
                .iter()
                .find(|s| s.from != target)
                .copied()
                .unwrap_or_else(|| Label::new(target));
            if fall.from == target {
                // Both branches land on the same block; the condition
                // refines nothing.
                let mut head = bb.clone();
                head.insts.truncate(at);
                head.preds.clear();
                head.succs = vec![Label::new(target)];
                blocks.insert(*label, head);
                continue;
            }
            let taken_label = Label::branch(label.from, target);
            let fall_label = Label::branch(label.from, fall.from);
            let mut head = bb.clone();
            head.insts.truncate(at);
            head.preds.clear();
            head.succs = vec![fall_label, taken_label];
            blocks.insert(*label, head);
            blocks.insert(
                taken_label,
                BasicBlock {
                    insts: vec![Instruction::Assume(cond)],
                    succs: vec![Label::new(target)],
                    preds: Vec::new(),
                },
            );
            blocks.insert(
                fall_label,
                BasicBlock {
                    insts: vec![Instruction::Assume(cond.negate())],
                    succs: vec![fall],
                    preds: Vec::new(),
                },
            );
        }
        let mut cfg = Cfg {
            blocks,
            entry: self.entry,
        };
        cfg.recompute_preds();
        cfg
    }

    fn recompute_preds(&mut self) {
        let edges: Vec<(Label, Label)> = self
            .blocks
            .iter()
            .flat_map(|(l, b)| b.succs.iter().map(move |s| (*l, *s)))
            .collect();
        for b in self.blocks.values_mut() {
            b.preds.clear();
        }
        for (from, to) in edges {
            if let Some(b) = self.blocks.get_mut(&to) {
                b.preds.push(from);
            }
        }
    }

    /// Reverse post-order of the labels from the entry
    pub fn reverse_post_order(&self) -> Vec<Label> {
        let mut order = Vec::new();
        let mut state: BTreeMap<Label, u8> = BTreeMap::new();
        // Iterative DFS with an explicit enter/leave stack.
        let mut stack: Vec<(Label, bool)> = vec![(self.entry, false)];
        while let Some((label, leaving)) = stack.pop() {
            if leaving {
                order.push(label);
                continue;
            }
            match state.get(&label) {
                Some(_) => continue,
                None => {
                    state.insert(label, 1);
                }
            }
            stack.push((label, true));
            if let Some(bb) = self.blocks.get(&label) {
                for s in bb.succs.iter().rev() {
                    if !state.contains_key(s) {
                        stack.push((*s, false));
                    }
                }
            }
        }
        order.reverse();
        order
    }

    /// Labels that are the target of a back-edge with respect to a
    /// depth-first traversal from the entry
    pub fn loop_heads(&self) -> Vec<Label> {
        let mut heads = Vec::new();
        let mut visited: BTreeMap<Label, ()> = BTreeMap::new();
        let mut in_stack: BTreeMap<Label, ()> = BTreeMap::new();
        let mut stack: Vec<(Label, usize, bool)> = vec![(self.entry, 0, true)];
        while let Some((label, next, entering)) = stack.pop() {
            if entering {
                if visited.contains_key(&label) {
                    continue;
                }
                visited.insert(label, ());
                in_stack.insert(label, ());
            }
            let succs = match self.blocks.get(&label) {
                Some(b) => &b.succs,
                None => continue,
            };
            let mut descended = false;
            for (i, s) in succs.iter().enumerate().skip(next) {
                if in_stack.contains_key(s) {
                    if !heads.contains(s) {
                        heads.push(*s);
                    }
                } else if !visited.contains_key(s) {
                    stack.push((label, i + 1, false));
                    stack.push((*s, 0, true));
                    descended = true;
                    break;
                }
            }
            if !descended {
                in_stack.remove(&label);
            }
        }
        heads
    }
}
