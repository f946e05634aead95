// SPDX-License-Identifier: GPL-2.0

//! The interval lattice
//!
//! Closed intervals over the extended number line. Arithmetic is sound
//! but deliberately coarse for the non-linear operators: the relational
//! domain falls back to these when it cannot keep a difference bound.

use core::fmt;

use super::{Bound, Num};

/// A closed interval `[lb, ub]`, possibly empty
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Interval {
    lb: Bound,
    ub: Bound,
}

impl Interval {
    /// The full line
    pub fn top() -> Self {
        Interval {
            lb: Bound::MinusInf,
            ub: Bound::PlusInf,
        }
    }

    /// The empty interval
    pub fn bottom() -> Self {
        Interval {
            lb: Bound::PlusInf,
            ub: Bound::MinusInf,
        }
    }

    /// Interval from explicit bounds; empty if they cross
    pub fn new(lb: Bound, ub: Bound) -> Self {
        if lb > ub {
            Interval::bottom()
        } else {
            Interval { lb, ub }
        }
    }

    /// A single point
    pub fn constant(n: impl Into<Num>) -> Self {
        let n = n.into();
        Interval {
            lb: Bound::Finite(n.clone()),
            ub: Bound::Finite(n),
        }
    }

    /// `[lo, hi]` over machine integers
    pub fn range(lo: i64, hi: i64) -> Self {
        Interval::new(Bound::from(lo), Bound::from(hi))
    }

    /// Lower bound
    pub fn lb(&self) -> &Bound {
        &self.lb
    }

    /// Upper bound
    pub fn ub(&self) -> &Bound {
        &self.ub
    }

    /// True if empty
    pub fn is_bottom(&self) -> bool {
        self.lb > self.ub
    }

    /// True if unconstrained
    pub fn is_top(&self) -> bool {
        self.lb == Bound::MinusInf && self.ub == Bound::PlusInf
    }

    /// The unique inhabitant, if there is exactly one
    pub fn singleton(&self) -> Option<Num> {
        match (&self.lb, &self.ub) {
            (Bound::Finite(a), Bound::Finite(b)) if a == b => Some(a.clone()),
            _ => None,
        }
    }

    /// True if `n` lies inside
    pub fn contains(&self, n: &Num) -> bool {
        self.lb <= Bound::Finite(n.clone()) && Bound::Finite(n.clone()) <= self.ub
    }

    /// Least upper bound
    pub fn join(&self, other: &Interval) -> Interval {
        if self.is_bottom() {
            return other.clone();
        }
        if other.is_bottom() {
            return self.clone();
        }
        Interval {
            lb: self.lb.clone().min(other.lb.clone()),
            ub: self.ub.clone().max(other.ub.clone()),
        }
    }

    /// Greatest lower bound
    pub fn meet(&self, other: &Interval) -> Interval {
        Interval::new(
            self.lb.clone().max(other.lb.clone()),
            self.ub.clone().min(other.ub.clone()),
        )
    }

    /// Standard interval widening: a bound that moved outward is dropped
    pub fn widen(&self, other: &Interval) -> Interval {
        if self.is_bottom() {
            return other.clone();
        }
        if other.is_bottom() {
            return self.clone();
        }
        Interval {
            lb: if other.lb < self.lb {
                Bound::MinusInf
            } else {
                self.lb.clone()
            },
            ub: if other.ub > self.ub {
                Bound::PlusInf
            } else {
                self.ub.clone()
            },
        }
    }

    /// Narrowing: refine only the bounds widening gave up
    pub fn narrow(&self, other: &Interval) -> Interval {
        if self.is_bottom() || other.is_bottom() {
            return Interval::bottom();
        }
        Interval::new(
            if self.lb == Bound::MinusInf {
                other.lb.clone()
            } else {
                self.lb.clone()
            },
            if self.ub == Bound::PlusInf {
                other.ub.clone()
            } else {
                self.ub.clone()
            },
        )
    }

    /// Pointwise sum
    pub fn add(&self, other: &Interval) -> Interval {
        if self.is_bottom() || other.is_bottom() {
            return Interval::bottom();
        }
        Interval {
            lb: self.lb.add(&other.lb),
            ub: self.ub.add(&other.ub),
        }
    }

    /// Pointwise difference
    pub fn sub(&self, other: &Interval) -> Interval {
        if self.is_bottom() || other.is_bottom() {
            return Interval::bottom();
        }
        Interval {
            lb: self.lb.add(&-&other.ub),
            ub: self.ub.add(&-&other.lb),
        }
    }

    /// Negation
    pub fn neg(&self) -> Interval {
        if self.is_bottom() {
            return Interval::bottom();
        }
        Interval {
            lb: -&self.ub,
            ub: -&self.lb,
        }
    }

    /// Product via the four corner products
    pub fn mul(&self, other: &Interval) -> Interval {
        if self.is_bottom() || other.is_bottom() {
            return Interval::bottom();
        }
        let corners = [
            self.lb.mul(&other.lb),
            self.lb.mul(&other.ub),
            self.ub.mul(&other.lb),
            self.ub.mul(&other.ub),
        ];
        let mut lb = corners[0].clone();
        let mut ub = corners[0].clone();
        for c in &corners[1..] {
            lb = lb.min(c.clone());
            ub = ub.max(c.clone());
        }
        Interval { lb, ub }
    }

    /// Truncated signed division; top when the divisor may be zero or
    /// either operand is unbounded
    pub fn sdiv(&self, other: &Interval) -> Interval {
        if self.is_bottom() || other.is_bottom() {
            return Interval::bottom();
        }
        if other.contains(&Num::zero()) {
            return Interval::top();
        }
        match (
            self.lb.finite(),
            self.ub.finite(),
            other.lb.finite(),
            other.ub.finite(),
        ) {
            (Some(a), Some(b), Some(c), Some(d)) => {
                let corners = [a / c, a / d, b / c, b / d];
                let lb = corners.iter().min().unwrap().clone();
                let ub = corners.iter().max().unwrap().clone();
                Interval::new(Bound::Finite(lb), Bound::Finite(ub))
            }
            _ => Interval::top(),
        }
    }

    /// Signed remainder; precise only for a positive constant divisor and
    /// a non-negative dividend
    pub fn srem(&self, other: &Interval) -> Interval {
        if self.is_bottom() || other.is_bottom() {
            return Interval::bottom();
        }
        if let Some(d) = other.singleton() {
            if d.is_positive() && self.lb >= Bound::zero() {
                let cap = Bound::Finite(&d - &Num::one());
                return Interval::new(Bound::zero(), self.ub.clone().min(cap));
            }
        }
        Interval::top()
    }

    /// Unsigned remainder under the same precision conditions
    pub fn urem(&self, other: &Interval) -> Interval {
        self.srem(other)
    }

    /// Bitwise and
    pub fn and(&self, other: &Interval) -> Interval {
        if self.is_bottom() || other.is_bottom() {
            return Interval::bottom();
        }
        if self.lb >= Bound::zero() || other.lb >= Bound::zero() {
            // A non-negative operand caps the result.
            let cap = if self.lb >= Bound::zero() && other.lb >= Bound::zero() {
                self.ub.clone().min(other.ub.clone())
            } else if self.lb >= Bound::zero() {
                self.ub.clone()
            } else {
                other.ub.clone()
            };
            return Interval::new(Bound::zero(), cap);
        }
        Interval::top()
    }

    /// Bitwise or; for non-negatives bounded by the sum
    pub fn or(&self, other: &Interval) -> Interval {
        if self.is_bottom() || other.is_bottom() {
            return Interval::bottom();
        }
        if self.lb >= Bound::zero() && other.lb >= Bound::zero() {
            return Interval::new(Bound::zero(), self.ub.add(&other.ub));
        }
        Interval::top()
    }

    /// Bitwise xor, same bound as or
    pub fn xor(&self, other: &Interval) -> Interval {
        self.or(other)
    }

    /// Left shift by a constant amount in `[0, 64)`
    pub fn shl(&self, other: &Interval) -> Interval {
        if self.is_bottom() || other.is_bottom() {
            return Interval::bottom();
        }
        match other.singleton().and_then(|k| k.to_i64()) {
            Some(k) if (0..64).contains(&k) => self.mul(&Interval::constant(Num::pow2(k as u32))),
            _ => Interval::top(),
        }
    }

    /// Logical right shift by a constant, defined for non-negative values
    pub fn lshr(&self, other: &Interval) -> Interval {
        if self.is_bottom() || other.is_bottom() {
            return Interval::bottom();
        }
        match other.singleton().and_then(|k| k.to_i64()) {
            Some(k) if (0..64).contains(&k) && self.lb >= Bound::zero() => {
                let shift = |b: &Bound| match b {
                    Bound::Finite(n) => Bound::Finite(n >> (k as u32)),
                    other => other.clone(),
                };
                Interval::new(shift(&self.lb), shift(&self.ub))
            }
            _ => Interval::top(),
        }
    }

    /// Arithmetic right shift by a constant
    pub fn ashr(&self, other: &Interval) -> Interval {
        if self.is_bottom() || other.is_bottom() {
            return Interval::bottom();
        }
        match other.singleton().and_then(|k| k.to_i64()) {
            Some(k) if (0..64).contains(&k) => {
                let shift = |b: &Bound| match b {
                    Bound::Finite(n) => Bound::Finite(n >> (k as u32)),
                    other => other.clone(),
                };
                Interval::new(shift(&self.lb), shift(&self.ub))
            }
            _ => Interval::top(),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bottom() {
            write!(f, "_|_")
        } else {
            write!(f, "[{}, {}]", self.lb, self.ub)
        }
    }
}
