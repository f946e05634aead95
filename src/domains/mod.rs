// SPDX-License-Identifier: GPL-2.0

//! Abstract domains
//!
//! The numeric machinery is layered: a scalar [`NumericDomain`] (the
//! relational [`SplitDbm`] or the non-relational [`IntervalEnv`]) is
//! lifted over byte-addressed arrays by the cell bookkeeping in
//! [`arrays`], and [`ebpf::EbpfDomain`] bundles the result with the
//! register triples and verifier-specific operators.

pub mod arrays;
pub mod ebpf;
pub mod graph;
pub mod interval_env;
pub mod split_dbm;

pub use ebpf::EbpfDomain;
pub use interval_env::IntervalEnv;
pub use split_dbm::SplitDbm;

use core::fmt;

use crate::linear::{ConstraintKind, LinearConstraint, LinearExpr, Variable};
use crate::num::{Interval, Num};

/// Arithmetic operators the domains interpret
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Sdiv,
    Udiv,
    Srem,
    Urem,
}

/// Bitwise operators the domains interpret
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BitOp {
    And,
    Or,
    Xor,
    Shl,
    Lshr,
    Ashr,
}

/// Either family of binary operator
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinOpKind {
    Arith(ArithOp),
    Bit(BitOp),
}

/// Second operand of `apply`: a variable or a constant
#[derive(Clone, Debug)]
pub enum Operand {
    /// A domain variable
    Var(Variable),
    /// A constant
    Imm(Num),
}

impl From<Variable> for Operand {
    fn from(v: Variable) -> Self {
        Operand::Var(v)
    }
}

impl From<i64> for Operand {
    fn from(k: i64) -> Self {
        Operand::Imm(Num::from(k))
    }
}

impl From<Num> for Operand {
    fn from(n: Num) -> Self {
        Operand::Imm(n)
    }
}

/// The contract every scalar numeric domain implements.
///
/// All operations are sound over-approximations; `bottom` is sticky.
pub trait NumericDomain: Clone + fmt::Display {
    /// The unconstrained state
    fn top() -> Self;

    /// The unsatisfiable state
    fn bottom() -> Self;

    /// True if unsatisfiable
    fn is_bottom(&self) -> bool;

    /// Collapse to bottom
    fn set_to_bottom(&mut self);

    /// True if no constraint is recorded
    fn is_top(&self) -> bool;

    /// Forget everything about `v`
    fn havoc(&mut self, v: Variable);

    /// `x := e`. Exact when `e` is `v + k`, sound otherwise.
    fn assign(&mut self, x: Variable, e: &LinearExpr);

    /// `x := y op z`
    fn apply(&mut self, op: BinOpKind, x: Variable, y: Variable, z: &Operand);

    /// Conjoin a constraint
    fn assume(&mut self, cst: &LinearConstraint);

    /// Constrain `v` to exactly the given interval
    fn set(&mut self, v: Variable, intv: Interval);

    /// Project the interval of `v`
    fn interval(&self, v: Variable) -> Interval;

    /// Least upper bound
    fn join(&self, other: &Self) -> Self;

    /// Widening; result is above the join and stabilises ascending chains
    fn widen(&self, other: &Self) -> Self;

    /// Narrowing; refines only the bounds widening discarded
    fn narrow(&self, other: &Self) -> Self;

    /// Partial order test
    fn leq(&self, other: &Self) -> bool;

    /// Variables the domain currently constrains
    fn vars(&self) -> Vec<Variable>;

    /// Evaluate a linear expression to an interval
    fn eval(&self, e: &LinearExpr) -> Interval {
        e.eval(|v| self.interval(*v))
    }

    /// True if every state satisfying `self` satisfies `cst`
    fn entails(&self, cst: &LinearConstraint) -> bool {
        if self.is_bottom() {
            return true;
        }
        match cst.kind() {
            ConstraintKind::Eq => {
                // e = 0 is the conjunction of e <= 0 and -e <= 0.
                let le = LinearConstraint::new(cst.expr().clone(), ConstraintKind::Leq);
                let mut neg = cst.expr().clone();
                neg.negate();
                let ge = LinearConstraint::new(neg, ConstraintKind::Leq);
                self.entails(&le) && self.entails(&ge)
            }
            _ => {
                let mut probe = self.clone();
                probe.assume(&cst.negate());
                probe.is_bottom()
            }
        }
    }

    /// True if some state satisfies both `self` and `cst`
    fn intersects(&self, cst: &LinearConstraint) -> bool {
        let mut probe = self.clone();
        probe.assume(cst);
        !probe.is_bottom()
    }
}
