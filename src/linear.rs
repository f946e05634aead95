// SPDX-License-Identifier: GPL-2.0

//! Linear forms over the analysis variables
//!
//! Every fact the domains exchange is a linear expression or a linear
//! constraint over the closed set of [`Variable`]s: the three numeric
//! facets of each register, the cells of the region arrays, and a few
//! distinguished quantities (packet size, meta offset, decoded map key
//! and value sizes).

use core::fmt;
use std::collections::BTreeMap;

use crate::num::{Interval, Num};

/// Which numeric facet of a register or cell a variable tracks
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum DataKind {
    /// The region kind, as an ordered tag
    Types,
    /// The 64-bit content (or region base address for pointers)
    Values,
    /// The signed byte offset inside the region
    Offsets,
}

impl DataKind {
    /// Short name used in variable display
    pub fn tag(self) -> &'static str {
        match self {
            DataKind::Types => "t",
            DataKind::Values => "v",
            DataKind::Offsets => "off",
        }
    }
}

/// The byte-addressed memory regions the analyzer models
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Region {
    /// The 512-byte program stack
    Stack,
    /// The program context object
    Ctx,
    /// Shared memory: packet data and map values
    Shared,
}

impl Region {
    /// Region name used in variable display
    pub fn name(self) -> &'static str {
        match self {
            Region::Stack => "stack",
            Region::Ctx => "ctx",
            Region::Shared => "shared",
        }
    }
}

/// A named variable of the numeric domain
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Variable {
    /// One facet of register r0..r10
    Reg(DataKind, u8),
    /// An array-expansion cell: region, facet, byte offset, width
    Cell(Region, DataKind, i64, u32),
    /// Number of readable packet bytes
    PacketSize,
    /// Offset of packet data relative to the metadata area (non-positive)
    MetaOffset,
    /// Key size of the most recently decoded map
    MapKeySize,
    /// Value size of the most recently decoded map
    MapValueSize,
    /// Per-path instruction counter, used by the termination check
    InstructionCount,
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Reg(DataKind::Values, i) => write!(f, "r{}", i),
            Variable::Reg(DataKind::Offsets, i) => write!(f, "off{}", i),
            Variable::Reg(DataKind::Types, i) => write!(f, "t{}", i),
            Variable::Cell(region, kind, off, width) => {
                write!(f, "{}.{}[{}:{}]", region.name(), kind.tag(), off, width)
            }
            Variable::PacketSize => write!(f, "packet_size"),
            Variable::MetaOffset => write!(f, "meta_offset"),
            Variable::MapKeySize => write!(f, "map_key_size"),
            Variable::MapValueSize => write!(f, "map_value_size"),
            Variable::InstructionCount => write!(f, "insn_count"),
        }
    }
}

/// A linear expression: sum of coefficient * variable, plus a constant
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct LinearExpr {
    terms: BTreeMap<Variable, Num>,
    constant: Num,
}

impl LinearExpr {
    /// The constant zero expression
    pub fn zero() -> Self {
        Self::default()
    }

    /// A lone variable
    pub fn var(v: Variable) -> Self {
        let mut e = Self::default();
        e.add_term(v, Num::one());
        e
    }

    /// A constant expression
    pub fn constant(n: impl Into<Num>) -> Self {
        LinearExpr {
            terms: BTreeMap::new(),
            constant: n.into(),
        }
    }

    /// Add `coef * v`, erasing the term if the coefficient cancels
    pub fn add_term(&mut self, v: Variable, coef: Num) {
        let entry = self.terms.entry(v).or_insert_with(Num::zero);
        *entry = &*entry + &coef;
        if entry.is_zero() {
            self.terms.remove(&v);
        }
    }

    /// Add a constant
    pub fn add_constant(&mut self, n: impl Into<Num>) {
        self.constant = &self.constant + &n.into();
    }

    /// The constant part
    pub fn constant_part(&self) -> &Num {
        &self.constant
    }

    /// Iterate the variable terms
    pub fn terms(&self) -> impl Iterator<Item = (&Variable, &Num)> {
        self.terms.iter()
    }

    /// The coefficient of `v`, zero if absent
    pub fn coef(&self, v: &Variable) -> Num {
        self.terms.get(v).cloned().unwrap_or_else(Num::zero)
    }

    /// Number of variable terms
    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    /// True if no variables occur
    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// If the expression is exactly `v + k`, return the pair
    pub fn as_var_plus_constant(&self) -> Option<(Variable, Num)> {
        if self.terms.len() != 1 {
            return None;
        }
        let (v, coef) = self.terms.iter().next().unwrap();
        if *coef == Num::one() {
            Some((*v, self.constant.clone()))
        } else {
            None
        }
    }

    /// Negate in place
    pub fn negate(&mut self) {
        for coef in self.terms.values_mut() {
            *coef = -&*coef;
        }
        self.constant = -&self.constant;
    }

    /// `self - other`
    pub fn sub(&self, other: &LinearExpr) -> LinearExpr {
        let mut out = self.clone();
        for (v, c) in other.terms() {
            out.add_term(*v, -c);
        }
        out.add_constant(-&other.constant);
        out
    }

    /// `self + other`
    pub fn add(&self, other: &LinearExpr) -> LinearExpr {
        let mut out = self.clone();
        for (v, c) in other.terms() {
            out.add_term(*v, c.clone());
        }
        out.add_constant(other.constant.clone());
        out
    }

    /// Evaluate under a per-variable interval environment
    pub fn eval<F>(&self, mut env: F) -> Interval
    where
        F: FnMut(&Variable) -> Interval,
    {
        let mut acc = Interval::constant(self.constant.clone());
        for (v, coef) in self.terms() {
            let term = env(v).mul(&Interval::constant(coef.clone()));
            acc = acc.add(&term);
        }
        acc
    }
}

impl From<Variable> for LinearExpr {
    fn from(v: Variable) -> Self {
        LinearExpr::var(v)
    }
}

impl From<i64> for LinearExpr {
    fn from(v: i64) -> Self {
        LinearExpr::constant(v)
    }
}

impl From<Num> for LinearExpr {
    fn from(n: Num) -> Self {
        LinearExpr::constant(n)
    }
}

impl fmt::Display for LinearExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (v, coef) in self.terms() {
            if first {
                if *coef == Num::one() {
                    write!(f, "{}", v)?;
                } else if *coef == -Num::one() {
                    write!(f, "-{}", v)?;
                } else {
                    write!(f, "{}*{}", coef, v)?;
                }
                first = false;
            } else if coef.is_negative() {
                if *coef == -Num::one() {
                    write!(f, " - {}", v)?;
                } else {
                    write!(f, " - {}*{}", coef.abs(), v)?;
                }
            } else if *coef == Num::one() {
                write!(f, " + {}", v)?;
            } else {
                write!(f, " + {}*{}", coef, v)?;
            }
        }
        if first {
            write!(f, "{}", self.constant)?;
        } else if self.constant.is_positive() {
            write!(f, " + {}", self.constant)?;
        } else if self.constant.is_negative() {
            write!(f, " - {}", self.constant.abs())?;
        }
        Ok(())
    }
}

/// The relational kind of a constraint over `expr` and zero
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConstraintKind {
    /// `expr = 0`
    Eq,
    /// `expr <= 0`
    Leq,
    /// `expr != 0`
    Diseq,
}

/// A linear constraint in the normal form `expr KIND 0`
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LinearConstraint {
    expr: LinearExpr,
    kind: ConstraintKind,
}

impl LinearConstraint {
    /// Build from an expression and kind, normalising so that equivalent
    /// constraints compare equal
    pub fn new(expr: LinearExpr, kind: ConstraintKind) -> Self {
        let mut cst = LinearConstraint { expr, kind };
        cst.normalize();
        cst
    }

    /// `a = b`
    pub fn eq(a: impl Into<LinearExpr>, b: impl Into<LinearExpr>) -> Self {
        Self::new(a.into().sub(&b.into()), ConstraintKind::Eq)
    }

    /// `a != b`
    pub fn neq(a: impl Into<LinearExpr>, b: impl Into<LinearExpr>) -> Self {
        Self::new(a.into().sub(&b.into()), ConstraintKind::Diseq)
    }

    /// `a <= b`
    pub fn le(a: impl Into<LinearExpr>, b: impl Into<LinearExpr>) -> Self {
        Self::new(a.into().sub(&b.into()), ConstraintKind::Leq)
    }

    /// `a < b`, encoded as `a <= b - 1` over the integers
    pub fn lt(a: impl Into<LinearExpr>, b: impl Into<LinearExpr>) -> Self {
        let mut e = a.into().sub(&b.into());
        e.add_constant(1i64);
        Self::new(e, ConstraintKind::Leq)
    }

    /// `a >= b`
    pub fn ge(a: impl Into<LinearExpr>, b: impl Into<LinearExpr>) -> Self {
        Self::le(b, a)
    }

    /// `a > b`
    pub fn gt(a: impl Into<LinearExpr>, b: impl Into<LinearExpr>) -> Self {
        Self::lt(b, a)
    }

    /// A constraint that always holds
    pub fn always_true() -> Self {
        LinearConstraint {
            expr: LinearExpr::zero(),
            kind: ConstraintKind::Leq,
        }
    }

    /// A constraint that never holds
    pub fn always_false() -> Self {
        LinearConstraint {
            expr: LinearExpr::constant(1i64),
            kind: ConstraintKind::Leq,
        }
    }

    /// The underlying expression
    pub fn expr(&self) -> &LinearExpr {
        &self.expr
    }

    /// The relational kind
    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    /// Logical negation. Disequations are the negation of equalities;
    /// `<=` flips to `>= 1` over the integers.
    pub fn negate(&self) -> Self {
        match self.kind {
            ConstraintKind::Eq => LinearConstraint {
                expr: self.expr.clone(),
                kind: ConstraintKind::Diseq,
            },
            ConstraintKind::Diseq => LinearConstraint {
                expr: self.expr.clone(),
                kind: ConstraintKind::Eq,
            },
            ConstraintKind::Leq => {
                // not (e <= 0)  <=>  e >= 1  <=>  -e + 1 <= 0
                let mut e = self.expr.clone();
                e.negate();
                e.add_constant(1i64);
                LinearConstraint::new(e, ConstraintKind::Leq)
            }
        }
    }

    /// True when the constraint holds for every valuation
    pub fn is_tautology(&self) -> bool {
        if !self.expr.is_constant() {
            return false;
        }
        let c = self.expr.constant_part();
        match self.kind {
            ConstraintKind::Eq => c.is_zero(),
            ConstraintKind::Leq => !c.is_positive(),
            ConstraintKind::Diseq => !c.is_zero(),
        }
    }

    /// True when the constraint holds for no valuation
    pub fn is_contradiction(&self) -> bool {
        if !self.expr.is_constant() {
            return false;
        }
        !self.is_tautology()
    }

    fn normalize(&mut self) {
        // Divide out the gcd of the coefficients. For <= the constant is
        // rounded up (ceil), which preserves the integer solution set.
        let mut g = Num::zero();
        for (_, coef) in self.expr.terms() {
            g = g.gcd(coef);
        }
        if !g.is_zero() && g != Num::one() {
            let c = self.expr.constant_part().clone();
            let divisible = (&c % &g).is_zero();
            match self.kind {
                ConstraintKind::Leq => {
                    let new_c = ceil_div(&c, &g);
                    let mut terms = LinearExpr::constant(new_c);
                    for (v, coef) in self.expr.terms() {
                        terms.add_term(*v, coef / &g);
                    }
                    self.expr = terms;
                }
                ConstraintKind::Eq | ConstraintKind::Diseq if divisible => {
                    let mut terms = LinearExpr::constant(&c / &g);
                    for (v, coef) in self.expr.terms() {
                        terms.add_term(*v, coef / &g);
                    }
                    self.expr = terms;
                }
                _ => {}
            }
        }
        // Fix the sign of symmetric constraints so x - y = 0 and
        // y - x = 0 are the same object.
        if matches!(self.kind, ConstraintKind::Eq | ConstraintKind::Diseq) {
            let should_negate = matches!(self.expr.terms().next(), Some((_, coef)) if coef.is_negative());
            if should_negate {
                self.expr.negate();
            }
        }
    }
}

/// Ceiling division for unbounded integers, `g` strictly positive
fn ceil_div(c: &Num, g: &Num) -> Num {
    let q = c / g;
    let r = c % g;
    if r.is_positive() {
        &q + &Num::one()
    } else {
        q
    }
}

impl fmt::Display for LinearConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.kind {
            ConstraintKind::Eq => "=",
            ConstraintKind::Leq => "<=",
            ConstraintKind::Diseq => "!=",
        };
        // Render with the constant moved to the right-hand side.
        let rhs = -self.expr.constant_part();
        let mut vars_only = LinearExpr::zero();
        for (v, c) in self.expr.terms() {
            vars_only.add_term(*v, c.clone());
        }
        write!(f, "{} {} {}", vars_only, op, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(i: u8) -> Variable {
        Variable::Reg(DataKind::Values, i)
    }

    #[test]
    fn var_plus_constant_detection() {
        let mut e = LinearExpr::var(v(1));
        e.add_constant(8i64);
        assert_eq!(e.as_var_plus_constant(), Some((v(1), Num::from(8i64))));
        e.add_term(v(2), Num::one());
        assert_eq!(e.as_var_plus_constant(), None);
    }

    #[test]
    fn normalized_forms_compare_equal() {
        // 2x - 2y = 0 and x - y = 0
        let mut two = LinearExpr::zero();
        two.add_term(v(1), Num::from(2i64));
        two.add_term(v(2), Num::from(-2i64));
        let a = LinearConstraint::new(two, ConstraintKind::Eq);
        let b = LinearConstraint::eq(LinearExpr::var(v(1)), LinearExpr::var(v(2)));
        assert_eq!(a, b);
        // y - x = 0 has its sign fixed up to match x - y = 0.
        let c = LinearConstraint::eq(LinearExpr::var(v(2)), LinearExpr::var(v(1)));
        assert_eq!(b, c);
    }

    #[test]
    fn negation_flips_leq() {
        let c = LinearConstraint::le(LinearExpr::var(v(1)), LinearExpr::constant(5i64));
        let n = c.negate();
        // not (x <= 5) is x >= 6
        assert_eq!(
            n,
            LinearConstraint::ge(LinearExpr::var(v(1)), LinearExpr::constant(6i64))
        );
        assert_eq!(n.negate(), c);
    }

    #[test]
    fn constant_constraints_decide() {
        assert!(LinearConstraint::le(LinearExpr::constant(0i64), LinearExpr::constant(3i64))
            .is_tautology());
        assert!(LinearConstraint::always_false().is_contradiction());
        assert!(!LinearConstraint::eq(LinearExpr::var(v(0)), LinearExpr::zero()).is_tautology());
    }
}
