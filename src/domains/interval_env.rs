// SPDX-License-Identifier: GPL-2.0

//! Plain interval environment
//!
//! Non-relational counterpart to the split DBM: every variable maps to
//! one interval and differences are not tracked. Cheap, and useful as
//! the alternative domain on the command line.

use core::fmt;
use std::collections::BTreeMap;

use super::{ArithOp, BinOpKind, BitOp, NumericDomain, Operand};
use crate::linear::{ConstraintKind, LinearConstraint, LinearExpr, Variable};
use crate::num::{Bound, Interval, Num};

/// A map from variable to interval; absent means unconstrained
#[derive(Clone, Debug, Default)]
pub struct IntervalEnv {
    env: BTreeMap<Variable, Interval>,
    bottom: bool,
}

impl IntervalEnv {
    fn get(&self, v: &Variable) -> Interval {
        if self.bottom {
            return Interval::bottom();
        }
        self.env.get(v).cloned().unwrap_or_else(Interval::top)
    }

    fn put(&mut self, v: Variable, iv: Interval) {
        if iv.is_bottom() {
            self.set_to_bottom();
        } else if iv.is_top() {
            self.env.remove(&v);
        } else {
            self.env.insert(v, iv);
        }
    }

    /// Conjoin `e <= 0` by refining each term through its residual.
    fn meet_linear_leq(&mut self, e: &LinearExpr) {
        let terms: Vec<(Variable, Num)> = e.terms().map(|(v, c)| (*v, c.clone())).collect();
        for (v, a) in &terms {
            let mut residual = e.clone();
            residual.add_term(*v, -a);
            let rhs = self.eval(&residual).neg();
            let Bound::Finite(ub) = rhs.ub().clone() else {
                continue;
            };
            let bound = if a.is_positive() {
                Interval::new(Bound::MinusInf, Bound::Finite(floor_div(&ub, a)))
            } else {
                Interval::new(Bound::Finite(ceil_div(&ub, a)), Bound::PlusInf)
            };
            let refined = self.get(v).meet(&bound);
            self.put(*v, refined);
            if self.bottom {
                return;
            }
        }
        // A variable-free contradiction still has to be noticed.
        if terms.is_empty() && e.constant_part().is_positive() {
            self.set_to_bottom();
        }
    }
}

fn floor_div(a: &Num, b: &Num) -> Num {
    let q = a / b;
    let r = a % b;
    if !r.is_zero() && (r.is_negative() != b.is_negative()) {
        &q - &Num::one()
    } else {
        q
    }
}

fn ceil_div(a: &Num, b: &Num) -> Num {
    -floor_div(&-a, b)
}

impl NumericDomain for IntervalEnv {
    fn top() -> Self {
        Self::default()
    }

    fn bottom() -> Self {
        IntervalEnv {
            env: BTreeMap::new(),
            bottom: true,
        }
    }

    fn is_bottom(&self) -> bool {
        self.bottom
    }

    fn set_to_bottom(&mut self) {
        self.env.clear();
        self.bottom = true;
    }

    fn is_top(&self) -> bool {
        !self.bottom && self.env.is_empty()
    }

    fn havoc(&mut self, v: Variable) {
        if !self.bottom {
            self.env.remove(&v);
        }
    }

    fn assign(&mut self, x: Variable, e: &LinearExpr) {
        if self.bottom {
            return;
        }
        let iv = self.eval(e);
        self.put(x, iv);
    }

    fn apply(&mut self, op: BinOpKind, x: Variable, y: Variable, z: &Operand) {
        if self.bottom {
            return;
        }
        let yi = self.get(&y);
        let zi = match z {
            Operand::Var(v) => self.get(v),
            Operand::Imm(k) => Interval::constant(k.clone()),
        };
        let r = match op {
            BinOpKind::Arith(ArithOp::Add) => yi.add(&zi),
            BinOpKind::Arith(ArithOp::Sub) => yi.sub(&zi),
            BinOpKind::Arith(ArithOp::Mul) => yi.mul(&zi),
            BinOpKind::Arith(ArithOp::Sdiv) => yi.sdiv(&zi),
            BinOpKind::Arith(ArithOp::Udiv) => {
                if yi.lb() >= &Bound::zero() && zi.lb() >= &Bound::zero() {
                    yi.sdiv(&zi)
                } else {
                    Interval::top()
                }
            }
            BinOpKind::Arith(ArithOp::Srem) => yi.srem(&zi),
            BinOpKind::Arith(ArithOp::Urem) => yi.urem(&zi),
            BinOpKind::Bit(BitOp::And) => yi.and(&zi),
            BinOpKind::Bit(BitOp::Or) => yi.or(&zi),
            BinOpKind::Bit(BitOp::Xor) => yi.xor(&zi),
            BinOpKind::Bit(BitOp::Shl) => yi.shl(&zi),
            BinOpKind::Bit(BitOp::Lshr) => yi.lshr(&zi),
            BinOpKind::Bit(BitOp::Ashr) => yi.ashr(&zi),
        };
        self.put(x, r);
    }

    fn assume(&mut self, cst: &LinearConstraint) {
        if self.bottom {
            return;
        }
        if cst.is_tautology() {
            return;
        }
        if cst.is_contradiction() {
            self.set_to_bottom();
            return;
        }
        match cst.kind() {
            ConstraintKind::Leq => self.meet_linear_leq(cst.expr()),
            ConstraintKind::Eq => {
                self.meet_linear_leq(cst.expr());
                if self.bottom {
                    return;
                }
                let mut neg = cst.expr().clone();
                neg.negate();
                self.meet_linear_leq(&neg);
            }
            ConstraintKind::Diseq => {
                let terms: Vec<(Variable, Num)> =
                    cst.expr().terms().map(|(v, c)| (*v, c.clone())).collect();
                for (pivot, a) in &terms {
                    let mut residual = cst.expr().clone();
                    residual.add_term(*pivot, -a);
                    let Some(rs) = self.eval(&residual).singleton() else {
                        continue;
                    };
                    let neg_rs = -&rs;
                    if !(&neg_rs % a).is_zero() {
                        continue;
                    }
                    let k = &neg_rs / a;
                    let iv = self.get(pivot);
                    if !iv.contains(&k) {
                        continue;
                    }
                    if iv.singleton() == Some(k.clone()) {
                        self.set_to_bottom();
                        return;
                    }
                    if iv.lb() == &Bound::Finite(k.clone()) {
                        let refined =
                            iv.meet(&Interval::new(Bound::Finite(&k + &Num::one()), Bound::PlusInf));
                        self.put(*pivot, refined);
                    } else if iv.ub() == &Bound::Finite(k.clone()) {
                        let refined = iv.meet(&Interval::new(
                            Bound::MinusInf,
                            Bound::Finite(&k - &Num::one()),
                        ));
                        self.put(*pivot, refined);
                    }
                }
            }
        }
    }

    fn set(&mut self, v: Variable, intv: Interval) {
        if self.bottom {
            return;
        }
        self.put(v, intv);
    }

    fn interval(&self, v: Variable) -> Interval {
        self.get(&v)
    }

    fn join(&self, other: &Self) -> Self {
        if self.bottom {
            return other.clone();
        }
        if other.bottom {
            return self.clone();
        }
        let mut out = IntervalEnv::top();
        for (v, a) in &self.env {
            if let Some(b) = other.env.get(v) {
                out.put(*v, a.join(b));
            }
        }
        out
    }

    fn widen(&self, other: &Self) -> Self {
        if self.bottom {
            return other.clone();
        }
        if other.bottom {
            return self.clone();
        }
        let mut out = IntervalEnv::top();
        for (v, a) in &self.env {
            if let Some(b) = other.env.get(v) {
                out.put(*v, a.widen(b));
            }
        }
        out
    }

    fn narrow(&self, other: &Self) -> Self {
        if self.bottom || other.bottom {
            return Self::bottom();
        }
        let mut out = self.clone();
        for (v, b) in &other.env {
            let n = out.get(v).narrow(b);
            out.put(*v, n);
            if out.bottom {
                return out;
            }
        }
        out
    }

    fn leq(&self, other: &Self) -> bool {
        if self.bottom {
            return true;
        }
        if other.bottom {
            return false;
        }
        other.env.iter().all(|(v, b)| {
            let a = self.get(v);
            a.lb() >= b.lb() && a.ub() <= b.ub()
        })
    }

    fn vars(&self) -> Vec<Variable> {
        self.env.keys().copied().collect()
    }
}

impl fmt::Display for IntervalEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bottom {
            return write!(f, "_|_");
        }
        if self.env.is_empty() {
            return write!(f, "{{}}");
        }
        let parts: Vec<String> = self
            .env
            .iter()
            .map(|(v, iv)| format!("{}={}", v, iv))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::DataKind;

    fn v(i: u8) -> Variable {
        Variable::Reg(DataKind::Values, i)
    }

    #[test]
    fn assume_refines_bounds() {
        let mut d = IntervalEnv::top();
        d.assume(&LinearConstraint::le(LinearExpr::var(v(0)), 9i64));
        d.assume(&LinearConstraint::ge(LinearExpr::var(v(0)), 1i64));
        assert_eq!(d.interval(v(0)), Interval::range(1, 9));
        d.assume(&LinearConstraint::gt(LinearExpr::var(v(0)), 9i64));
        assert!(d.is_bottom());
    }

    #[test]
    fn relations_are_not_tracked() {
        let mut d = IntervalEnv::top();
        d.set(v(0), Interval::range(0, 10));
        d.assign(v(1), &LinearExpr::var(v(0)));
        // The copy keeps the interval but forgets the equality.
        assert_eq!(d.interval(v(1)), Interval::range(0, 10));
        assert!(!d.entails(&LinearConstraint::eq(
            LinearExpr::var(v(0)),
            LinearExpr::var(v(1))
        )));
    }
}
