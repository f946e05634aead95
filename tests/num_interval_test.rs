// SPDX-License-Identifier: GPL-2.0
//! Tests for bpf_absint::num

use bpf_absint::num::{Bound, Interval, Num};

#[test]
fn join_is_idempotent_and_commutative() {
    let a = Interval::range(-4, 10);
    let b = Interval::range(3, 25);
    assert_eq!(a.join(&a), a);
    assert_eq!(a.join(&b), b.join(&a));
    assert_eq!(a.join(&b), Interval::range(-4, 25));
}

#[test]
fn join_embeds_the_order() {
    let a = Interval::range(0, 5);
    let b = Interval::range(2, 9);
    let j = a.join(&b);
    // a <= join(a, b) componentwise.
    assert!(a.lb() >= j.lb() && a.ub() <= j.ub());
    assert!(b.lb() >= j.lb() && b.ub() <= j.ub());
}

#[test]
fn bottom_is_identity_of_join() {
    let a = Interval::range(1, 2);
    assert_eq!(Interval::bottom().join(&a), a);
    assert_eq!(a.join(&Interval::bottom()), a);
    assert!(Interval::bottom().is_bottom());
}

#[test]
fn widening_stabilises_ascending_chains() {
    // Simulate a growing loop counter: widening must reach a fixpoint
    // in a bounded number of steps no matter how the chain grows.
    let mut acc = Interval::range(0, 0);
    let mut steps = 0;
    for i in 1..1000 {
        let next = acc.join(&Interval::range(0, i));
        if next == acc {
            break;
        }
        acc = acc.widen(&next);
        steps += 1;
        if acc.ub() == &Bound::PlusInf {
            break;
        }
    }
    assert!(steps <= 2);
    assert_eq!(acc.lb(), &Bound::from(0));
    assert_eq!(acc.ub(), &Bound::PlusInf);
    // Widening dominates the join.
    let w = Interval::range(0, 1).widen(&Interval::range(0, 2));
    let j = Interval::range(0, 1).join(&Interval::range(0, 2));
    assert!(w.lb() <= j.lb() && w.ub() >= j.ub());
}

#[test]
fn narrowing_only_refines_infinite_bounds() {
    let widened = Interval::new(Bound::from(0), Bound::PlusInf);
    let candidate = Interval::range(0, 17);
    assert_eq!(widened.narrow(&candidate), candidate);
    // Finite bounds survive narrowing untouched.
    let finite = Interval::range(3, 5);
    assert_eq!(finite.narrow(&Interval::range(0, 100)), finite);
}

#[test]
fn arithmetic_respects_signs() {
    let a = Interval::range(-3, 4);
    let b = Interval::range(2, 5);
    assert_eq!(a.add(&b), Interval::range(-1, 9));
    assert_eq!(a.sub(&b), Interval::range(-8, 2));
    assert_eq!(a.neg(), Interval::range(-4, 3));
    assert_eq!(a.mul(&b), Interval::range(-15, 20));
}

#[test]
fn unbounded_operands_stay_sound() {
    let top = Interval::top();
    let k = Interval::constant(7i64);
    assert!(top.add(&k).is_top());
    assert!(top.mul(&k).lb() == &Bound::MinusInf);
    assert!(top.sdiv(&k).is_top());
}

#[test]
fn masking_to_32_bits() {
    let mask = Interval::constant(0xffff_ffffi64);
    let any = Interval::top();
    let r = any.and(&mask);
    assert_eq!(r.lb(), &Bound::from(0));
    assert_eq!(r.ub(), &Bound::Finite(Num::from(0xffff_ffffi64)));
}

#[test]
fn singleton_detection() {
    assert_eq!(Interval::range(6, 6).singleton(), Some(Num::from(6i64)));
    assert_eq!(Interval::range(6, 7).singleton(), None);
    assert_eq!(Interval::top().singleton(), None);
}
