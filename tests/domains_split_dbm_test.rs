// SPDX-License-Identifier: GPL-2.0
//! Tests for bpf_absint::domains::split_dbm

use bpf_absint::domains::{ArithOp, BinOpKind, BitOp, NumericDomain, Operand, SplitDbm};
use bpf_absint::linear::{DataKind, LinearConstraint, LinearExpr, Variable};
use bpf_absint::num::{Bound, Interval, Num};

fn rv(i: u8) -> Variable {
    Variable::Reg(DataKind::Values, i)
}

fn v(x: Variable) -> LinearExpr {
    LinearExpr::var(x)
}

#[test]
fn difference_constraints_propagate_through_assignments() {
    let mut d = SplitDbm::top();
    d.set(rv(1), Interval::range(0, 100));
    // r2 := r1 + 8, r3 := r2 + 8: r3 - r1 = 16 must be derivable.
    let mut e = v(rv(1));
    e.add_constant(8i64);
    d.assign(rv(2), &e);
    let mut e2 = v(rv(2));
    e2.add_constant(8i64);
    d.assign(rv(3), &e2);
    let mut diff = v(rv(3));
    diff.add_term(rv(1), -Num::one());
    assert_eq!(d.eval(&diff).singleton(), Some(Num::from(16i64)));
}

#[test]
fn assume_meets_relations_and_bounds() {
    let mut d = SplitDbm::top();
    d.assume(&LinearConstraint::le(v(rv(0)), v(rv(1))));
    d.assume(&LinearConstraint::le(v(rv(1)), LinearExpr::constant(10i64)));
    d.assume(&LinearConstraint::ge(v(rv(0)), LinearExpr::constant(0i64)));
    assert_eq!(d.interval(rv(0)), Interval::range(0, 10));
    assert!(d.entails(&LinearConstraint::le(v(rv(0)), v(rv(1)))));
    // The relation survives tightening of one side only.
    d.assume(&LinearConstraint::le(v(rv(1)), LinearExpr::constant(4i64)));
    assert_eq!(d.interval(rv(0)).ub(), &Bound::from(4));
}

#[test]
fn join_properties_hold() {
    let mut a = SplitDbm::top();
    a.set(rv(0), Interval::range(0, 2));
    a.assume(&LinearConstraint::eq(v(rv(1)), v(rv(0))));
    let mut b = SplitDbm::top();
    b.set(rv(0), Interval::range(1, 3));
    b.assume(&LinearConstraint::eq(v(rv(1)), v(rv(0))));

    let j1 = a.join(&b);
    let j2 = b.join(&a);
    assert!(j1.leq(&j2) && j2.leq(&j1));
    assert!(a.leq(&j1) && b.leq(&j1));
    let ja = a.join(&a);
    assert!(ja.leq(&a) && a.leq(&ja));
    // The common equality survives the join.
    assert!(j1.entails(&LinearConstraint::eq(v(rv(1)), v(rv(0)))));
    assert_eq!(j1.interval(rv(0)), Interval::range(0, 3));
}

#[test]
fn widen_dominates_join_and_chains_stabilise() {
    let mut acc = SplitDbm::top();
    acc.set(rv(0), Interval::range(0, 0));
    let mut widenings = 0;
    for i in 1..100 {
        let mut step = SplitDbm::top();
        step.set(rv(0), Interval::range(0, i));
        let joined = acc.join(&step);
        assert!(joined.leq(&acc.widen(&joined)));
        if joined.leq(&acc) {
            break;
        }
        acc = acc.widen(&joined);
        widenings += 1;
    }
    // One widening blows the growing bound to infinity; the chain is
    // then stable.
    assert!(widenings <= 2);
    assert_eq!(acc.interval(rv(0)).ub(), &Bound::PlusInf);
    assert_eq!(acc.interval(rv(0)).lb(), &Bound::from(0));
}

#[test]
fn narrow_after_widen_recovers_the_loop_bound() {
    let mut widened = SplitDbm::top();
    widened.set(rv(0), Interval::new(Bound::from(0), Bound::PlusInf));
    let mut descend = SplitDbm::top();
    descend.set(rv(0), Interval::range(0, 9));
    let n = widened.narrow(&descend);
    assert_eq!(n.interval(rv(0)), Interval::range(0, 9));
}

#[test]
fn entailment_implies_intersection() {
    let mut d = SplitDbm::top();
    d.set(rv(0), Interval::range(5, 10));
    d.assume(&LinearConstraint::le(v(rv(1)), v(rv(0))));
    let csts = [
        LinearConstraint::le(v(rv(0)), LinearExpr::constant(20i64)),
        LinearConstraint::le(v(rv(1)), v(rv(0))),
        LinearConstraint::ge(v(rv(0)), LinearExpr::constant(5i64)),
    ];
    for c in csts {
        assert!(d.entails(&c), "{} should be entailed", c);
        assert!(d.intersects(&c), "{} should intersect", c);
    }
    // Satisfiable but not entailed.
    let maybe = LinearConstraint::ge(v(rv(0)), LinearExpr::constant(7i64));
    assert!(!d.entails(&maybe) && d.intersects(&maybe));
    // Contradicted: neither.
    let no = LinearConstraint::ge(v(rv(0)), LinearExpr::constant(11i64));
    assert!(!d.entails(&no) && !d.intersects(&no));
}

#[test]
fn apply_falls_back_to_intervals_for_nonlinear_ops() {
    let mut d = SplitDbm::top();
    d.set(rv(1), Interval::range(2, 3));
    d.set(rv(2), Interval::range(4, 5));
    d.apply(
        BinOpKind::Arith(ArithOp::Mul),
        rv(0),
        rv(1),
        &Operand::Var(rv(2)),
    );
    assert_eq!(d.interval(rv(0)), Interval::range(8, 15));
    d.apply(BinOpKind::Bit(BitOp::And), rv(3), rv(0), &Operand::from(0xfi64));
    assert_eq!(d.interval(rv(3)).lb(), &Bound::from(0));
    assert_eq!(d.interval(rv(3)).ub(), &Bound::from(0xf));
}

#[test]
fn havoc_forgets_only_the_target() {
    let mut d = SplitDbm::top();
    d.set(rv(0), Interval::range(1, 1));
    d.set(rv(1), Interval::range(2, 2));
    d.havoc(rv(0));
    assert!(d.interval(rv(0)).is_top());
    assert_eq!(d.interval(rv(1)).singleton(), Some(Num::from(2i64)));
}

#[test]
fn bottom_is_sticky_under_every_operation() {
    let mut d = SplitDbm::bottom();
    d.assume(&LinearConstraint::le(v(rv(0)), LinearExpr::constant(5i64)));
    d.assign(rv(1), &LinearExpr::constant(1i64));
    d.apply(
        BinOpKind::Arith(ArithOp::Add),
        rv(2),
        rv(1),
        &Operand::from(1i64),
    );
    assert!(d.is_bottom());
    assert!(d.interval(rv(1)).is_bottom());
}
