// SPDX-License-Identifier: GPL-2.0

//! Split difference-bound-matrix domain
//!
//! Relational numeric domain representing conjunctions of difference
//! constraints `y - x <= w` together with per-variable intervals, after
//! "Exploiting Sparsity in Difference-Bound Matrices" (Gange et al.,
//! SAS'16). Bounds and relations live in one sparse graph: vertex 0 is
//! the distinguished zero vertex, so `0 -> x` carries the upper bound of
//! `x` and `x -> 0` the negated lower bound.
//!
//! A vector of per-vertex potentials (a feasible valuation) is kept
//! alongside the graph; it makes incremental closure after a single edge
//! addition cheap and doubles as the negative-cycle detector (Cotton and
//! Maler style edge repair).
//!
//! Weights are overflow-checked 64-bit integers. A computation that
//! would overflow drops the affected bound (towards top) rather than
//! wrapping; the only route to bottom from arithmetic is a provable
//! negative cycle.

use core::fmt;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::graph::{SparseGraph, VertId, Wt};
use super::{ArithOp, BinOpKind, BitOp, NumericDomain, Operand};
use crate::linear::{ConstraintKind, LinearConstraint, LinearExpr, Variable};
use crate::num::{Bound, Interval, Num, SafeI64};

/// Outcome of a potential-repair run
enum Repair {
    /// Potentials fixed up, closure may proceed
    Ok,
    /// The new edge creates a negative cycle
    NegCycle,
    /// Weights left the representable range; caller must drop the edge
    Overflow,
}

/// The split-DBM abstract state
#[derive(Clone, Debug)]
pub struct SplitDbm {
    vert_map: BTreeMap<Variable, VertId>,
    rev_map: Vec<Option<Variable>>,
    g: SparseGraph,
    potential: Vec<Wt>,
    unstable: BTreeSet<VertId>,
    bottom: bool,
}

impl Default for SplitDbm {
    fn default() -> Self {
        Self::top()
    }
}

impl SplitDbm {
    fn empty(bottom: bool) -> Self {
        let mut g = SparseGraph::new();
        let zero = g.add_vertex();
        debug_assert_eq!(zero, 0);
        SplitDbm {
            vert_map: BTreeMap::new(),
            rev_map: vec![None],
            g,
            potential: vec![Wt::ZERO],
            unstable: BTreeSet::new(),
            bottom,
        }
    }

    /// Number of vertices and edges, for statistics
    pub fn size(&self) -> (usize, usize) {
        (self.g.num_verts(), self.g.num_edges())
    }

    fn get_vert(&mut self, v: Variable) -> VertId {
        if let Some(id) = self.vert_map.get(&v) {
            return *id;
        }
        let id = self.g.add_vertex();
        if id >= self.rev_map.len() {
            self.rev_map.push(None);
            self.potential.push(Wt::ZERO);
        }
        self.rev_map[id] = Some(v);
        self.potential[id] = Wt::ZERO;
        self.vert_map.insert(v, id);
        id
    }

    /// The variable of a vertex; `None` for the zero vertex
    fn vert_var(&self, id: VertId) -> Option<Variable> {
        if id == 0 {
            None
        } else {
            self.rev_map[id]
        }
    }

    /// Restore full closure if widening deferred it, then refresh the
    /// potentials so edge repair stays trustworthy.
    pub fn normalize(&mut self) {
        if self.bottom || self.unstable.is_empty() {
            return;
        }
        self.unstable.clear();
        let verts: Vec<VertId> = self.g.verts().collect();
        for &k in &verts {
            let ins: Vec<(VertId, Wt)> = self
                .g
                .preds(k)
                .filter_map(|p| self.g.edge_val(p, k).map(|w| (p, w)))
                .collect();
            let outs: Vec<(VertId, Wt)> = self.g.succs(k).collect();
            for &(p, wp) in &ins {
                for &(s, ws) in &outs {
                    let Some(cand) = wp.checked_add(ws) else {
                        continue;
                    };
                    if p == s {
                        if cand.get() < 0 {
                            self.set_to_bottom();
                            return;
                        }
                    } else {
                        self.g.update_edge(p, s, cand);
                    }
                }
            }
        }
        if !self.recompute_potentials() {
            self.set_to_bottom();
        }
    }

    /// Rebuild the potential vector by label-correcting relaxation.
    /// Returns false on a negative cycle.
    fn recompute_potentials(&mut self) -> bool {
        let n = self.g.capacity();
        for p in self.potential.iter_mut() {
            *p = Wt::ZERO;
        }
        let edges: Vec<(VertId, VertId, Wt)> = self.g.edges().collect();
        // At most |V| rounds; one more relaxable edge means a cycle.
        for round in 0..=n {
            let mut changed = false;
            for &(x, y, w) in &edges {
                let Some(cand) = self.potential[x].checked_add(w) else {
                    continue;
                };
                if cand < self.potential[y] {
                    if round == n {
                        return false;
                    }
                    self.potential[y] = cand;
                    changed = true;
                }
            }
            if !changed {
                return true;
            }
        }
        true
    }

    /// Repair potentials after tightening `src -> dst`.
    fn repair_potential(&mut self, src: VertId, dst: VertId) -> Repair {
        let w = match self.g.edge_val(src, dst) {
            Some(w) => w,
            None => return Repair::Ok,
        };
        let saved = self.potential.clone();
        let start = match self.potential[src].checked_add(w) {
            Some(c) => c,
            None => {
                // Positive overflow cannot invalidate the potential.
                return if w.get() > 0 { Repair::Ok } else { Repair::Overflow };
            }
        };
        if start >= self.potential[dst] {
            return Repair::Ok;
        }
        self.potential[dst] = start;
        let mut queue = VecDeque::new();
        queue.push_back(dst);
        while let Some(v) = queue.pop_front() {
            let outs: Vec<(VertId, Wt)> = self.g.succs(v).collect();
            for (s, ws) in outs {
                let Some(cand) = self.potential[v].checked_add(ws) else {
                    if ws.get() <= 0 {
                        self.potential = saved;
                        return Repair::Overflow;
                    }
                    continue;
                };
                if cand < self.potential[s] {
                    if s == src {
                        self.potential = saved;
                        return Repair::NegCycle;
                    }
                    self.potential[s] = cand;
                    queue.push_back(s);
                }
            }
        }
        Repair::Ok
    }

    /// Restore closure around a freshly tightened edge. The graph was
    /// closed before, so one sweep over preds of `ii` and succs of `jj`
    /// suffices. Returns false on an exposed negative self-loop.
    fn close_over_edge(&mut self, ii: VertId, jj: VertId) -> bool {
        let c = match self.g.edge_val(ii, jj) {
            Some(c) => c,
            None => return true,
        };
        let ins: Vec<(VertId, Wt)> = self
            .g
            .preds(ii)
            .filter(|p| *p != jj)
            .filter_map(|p| self.g.edge_val(p, ii).map(|w| (p, w)))
            .collect();
        let outs: Vec<(VertId, Wt)> = self.g.succs(jj).filter(|(s, _)| *s != ii).collect();
        for &(p, wp) in &ins {
            if let Some(cand) = wp.checked_add(c) {
                if p == jj {
                    if cand.get() < 0 {
                        return false;
                    }
                } else {
                    self.g.update_edge(p, jj, cand);
                }
            }
        }
        for &(s, ws) in &outs {
            if let Some(cand) = c.checked_add(ws) {
                if s == ii {
                    if cand.get() < 0 {
                        return false;
                    }
                } else {
                    self.g.update_edge(ii, s, cand);
                }
            }
        }
        for &(p, wp) in &ins {
            for &(s, ws) in &outs {
                let Some(cand) = wp.checked_add(c).and_then(|x| x.checked_add(ws)) else {
                    continue;
                };
                if p == s {
                    if cand.get() < 0 {
                        return false;
                    }
                } else {
                    self.g.update_edge(p, s, cand);
                }
            }
        }
        true
    }

    /// Tighten `dst - src <= w`, repairing potentials and restoring
    /// closure. Returns false if the state became unsatisfiable.
    fn add_edge_and_close(&mut self, src: VertId, dst: VertId, w: Wt) -> bool {
        if src == dst {
            return w.get() >= 0;
        }
        // Quick unsat test against the closed reverse edge.
        if let Some(back) = self.g.edge_val(dst, src) {
            if let Some(cycle) = back.checked_add(w) {
                if cycle.get() < 0 {
                    return false;
                }
            }
        }
        let prev = self.g.edge_val(src, dst);
        if !self.g.update_edge(src, dst, w) {
            return true;
        }
        match self.repair_potential(src, dst) {
            Repair::Ok => self.close_over_edge(src, dst),
            Repair::NegCycle => false,
            Repair::Overflow => {
                // Saturation: drop the new constraint rather than wrap.
                match prev {
                    Some(old) => self.g.set_edge(src, dst, old),
                    None => self.g.remove_edge(src, dst),
                }
                true
            }
        }
    }

    /// `v <= k`
    fn add_ub(&mut self, v: Variable, k: &Num) -> bool {
        let Some(w) = SafeI64::from_num(k) else {
            // A bound beyond the weight range is dropped towards top
            // when loose, and is unsatisfiable when it contradicts the
            // sign of every representable value.
            return !k.is_negative() || {
                let iv = self.interval_of(v);
                match iv.lb() {
                    Bound::MinusInf => true,
                    Bound::Finite(lb) => lb <= k,
                    Bound::PlusInf => false,
                }
            };
        };
        let id = self.get_vert(v);
        self.add_edge_and_close(0, id, w)
    }

    /// `v >= k`
    fn add_lb(&mut self, v: Variable, k: &Num) -> bool {
        let Some(w) = SafeI64::from_num(&-k) else {
            return k.is_negative() || {
                let iv = self.interval_of(v);
                match iv.ub() {
                    Bound::PlusInf => true,
                    Bound::Finite(ub) => ub >= k,
                    Bound::MinusInf => false,
                }
            };
        };
        let id = self.get_vert(v);
        self.add_edge_and_close(id, 0, w)
    }

    fn interval_of(&self, v: Variable) -> Interval {
        if self.bottom {
            return Interval::bottom();
        }
        let Some(&id) = self.vert_map.get(&v) else {
            return Interval::top();
        };
        let lb = match self.g.edge_val(id, 0) {
            Some(w) => Bound::Finite(-&w.to_num()),
            None => Bound::MinusInf,
        };
        let ub = match self.g.edge_val(0, id) {
            Some(w) => Bound::Finite(w.to_num()),
            None => Bound::PlusInf,
        };
        Interval::new(lb, ub)
    }

    /// Conjoin `e <= 0`. Returns false when unsatisfiable.
    fn add_linear_leq(&mut self, e: &LinearExpr) -> bool {
        // Per-variable bounds implied by the residual of each term.
        let terms: Vec<(Variable, Num)> = e.terms().map(|(v, c)| (*v, c.clone())).collect();
        for (v, a) in &terms {
            let mut residual = e.clone();
            residual.add_term(*v, -a);
            // a*v <= -residual
            let rhs = self.eval_expr(&residual).neg();
            let Bound::Finite(ub) = rhs.ub().clone() else {
                continue;
            };
            if a.is_positive() {
                if !self.add_ub(*v, &floor_div(&ub, a)) {
                    return false;
                }
            } else if !self.add_lb(*v, &ceil_div(&ub, a)) {
                return false;
            }
        }
        // Difference constraints between unit-coefficient pairs.
        let pos: Vec<Variable> = terms
            .iter()
            .filter(|(_, c)| *c == Num::one())
            .map(|(v, _)| *v)
            .collect();
        let neg: Vec<Variable> = terms
            .iter()
            .filter(|(_, c)| *c == -Num::one())
            .map(|(v, _)| *v)
            .collect();
        for &x in &pos {
            for &y in &neg {
                // x - y <= -(e - x + y)
                let mut residual = e.clone();
                residual.add_term(x, -Num::one());
                residual.add_term(y, Num::one());
                let rhs = self.eval_expr(&residual).neg();
                let Bound::Finite(k) = rhs.ub().clone() else {
                    continue;
                };
                let Some(w) = SafeI64::from_num(&k) else {
                    continue;
                };
                let xv = self.get_vert(x);
                let yv = self.get_vert(y);
                if !self.add_edge_and_close(yv, xv, w) {
                    return false;
                }
            }
        }
        true
    }

    /// Disequation, with interval-domain precision: tighten an endpoint
    /// that coincides with the excluded value.
    fn add_disequation(&mut self, e: &LinearExpr) {
        let terms: Vec<(Variable, Num)> = e.terms().map(|(v, c)| (*v, c.clone())).collect();
        for (pivot, a) in &terms {
            let mut residual = e.clone();
            residual.add_term(*pivot, -a);
            // pivot != -residual/a, but only when the division is exact;
            // otherwise no integer value of the pivot is excluded.
            let Some(rs) = self.eval_expr(&residual).singleton() else {
                continue;
            };
            let neg_rs = -&rs;
            if !(&neg_rs % a).is_zero() {
                continue;
            }
            let k = &neg_rs / a;
            let iv = self.interval_of(*pivot);
            if !iv.contains(&k) {
                continue;
            }
            if iv.singleton() == Some(k.clone()) {
                self.set_to_bottom();
                return;
            }
            if iv.lb() == &Bound::Finite(k.clone()) {
                if !self.add_lb(*pivot, &(&k + &Num::one())) {
                    self.set_to_bottom();
                    return;
                }
            } else if iv.ub() == &Bound::Finite(k.clone()) {
                if !self.add_ub(*pivot, &(&k - &Num::one())) {
                    self.set_to_bottom();
                    return;
                }
            }
        }
    }

    fn eval_expr(&self, e: &LinearExpr) -> Interval {
        e.eval(|v| self.interval_of(*v))
    }

    /// Exact translation `x := x + k`: shift every edge at `x`.
    fn shift(&mut self, x: Variable, k: &Num) {
        let Some(&id) = self.vert_map.get(&x) else {
            return;
        };
        let Some(kw) = SafeI64::from_num(k) else {
            self.havoc(x);
            return;
        };
        // y - x <= w becomes y - x' <= w - k; x - y <= w becomes
        // x' - y <= w + k.
        let outs: Vec<(VertId, Wt)> = self.g.succs(id).collect();
        for (s, w) in outs {
            match w.checked_sub(kw) {
                Some(nw) => self.g.set_edge(id, s, nw),
                None => self.g.remove_edge(id, s),
            }
        }
        let ins: Vec<(VertId, Wt)> = self
            .g
            .preds(id)
            .filter_map(|p| self.g.edge_val(p, id).map(|w| (p, w)))
            .collect();
        for (p, w) in ins {
            match w.checked_add(kw) {
                Some(nw) => self.g.set_edge(p, id, nw),
                None => self.g.remove_edge(p, id),
            }
        }
        if let Some(np) = self.potential[id].checked_add(kw) {
            self.potential[id] = np;
        } else if !self.recompute_potentials() {
            self.set_to_bottom();
        }
    }

    fn assign_interval(&mut self, x: Variable, intv: Interval) {
        self.havoc(x);
        if intv.is_bottom() {
            self.set_to_bottom();
            return;
        }
        if let Bound::Finite(ub) = intv.ub() {
            if !self.add_ub(x, &ub.clone()) {
                self.set_to_bottom();
                return;
            }
        }
        if let Bound::Finite(lb) = intv.lb() {
            if !self.add_lb(x, &lb.clone()) {
                self.set_to_bottom();
            }
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

impl NumericDomain for SplitDbm {
    fn top() -> Self {
        Self::empty(false)
    }

    fn bottom() -> Self {
        Self::empty(true)
    }

    fn is_bottom(&self) -> bool {
        self.bottom
    }

    fn set_to_bottom(&mut self) {
        *self = Self::empty(true);
    }

    fn is_top(&self) -> bool {
        !self.bottom && self.g.is_empty()
    }

    fn havoc(&mut self, v: Variable) {
        if self.bottom {
            return;
        }
        if let Some(id) = self.vert_map.remove(&v) {
            self.g.forget(id);
            self.rev_map[id] = None;
            self.unstable.remove(&id);
        }
    }

    fn assign(&mut self, x: Variable, e: &LinearExpr) {
        if self.bottom {
            return;
        }
        self.normalize();
        if !e.coef(&x).is_zero() {
            // Self-referential assignment.
            if let Some((v, k)) = e.as_var_plus_constant() {
                if v == x {
                    self.shift(x, &k);
                    return;
                }
            }
            let intv = self.eval_expr(e);
            self.assign_interval(x, intv);
            return;
        }
        let intv = self.eval_expr(e);
        // Collect difference bounds against each unit-coefficient
        // variable before havocing x.
        let mut ubs: Vec<(Variable, Num)> = Vec::new();
        let mut lbs: Vec<(Variable, Num)> = Vec::new();
        for (v, a) in e.terms() {
            if *a != Num::one() {
                continue;
            }
            let mut residual = e.clone();
            residual.add_term(*v, -Num::one());
            let ri = self.eval_expr(&residual);
            if let Bound::Finite(ub) = ri.ub() {
                ubs.push((*v, ub.clone()));
            }
            if let Bound::Finite(lb) = ri.lb() {
                lbs.push((*v, lb.clone()));
            }
        }
        self.assign_interval(x, intv);
        if self.bottom {
            return;
        }
        let xv = self.get_vert(x);
        for (v, k) in ubs {
            // x - v <= k
            if let Some(w) = SafeI64::from_num(&k) {
                let vv = self.get_vert(v);
                if !self.add_edge_and_close(vv, xv, w) {
                    self.set_to_bottom();
                    return;
                }
            }
        }
        for (v, k) in lbs {
            // v - x <= -k
            if let Some(w) = SafeI64::from_num(&-&k) {
                let vv = self.get_vert(v);
                if !self.add_edge_and_close(xv, vv, w) {
                    self.set_to_bottom();
                    return;
                }
            }
        }
    }

    fn apply(&mut self, op: BinOpKind, x: Variable, y: Variable, z: &Operand) {
        if self.bottom {
            return;
        }
        self.normalize();
        let zi = match z {
            Operand::Var(v) => self.interval_of(*v),
            Operand::Imm(k) => Interval::constant(k.clone()),
        };
        match op {
            BinOpKind::Arith(ArithOp::Add) => {
                if let Some(k) = zi.singleton() {
                    let mut e = LinearExpr::var(y);
                    e.add_constant(k);
                    self.assign(x, &e);
                } else if let (Operand::Var(zv), Some(k)) =
                    (z, self.interval_of(y).singleton())
                {
                    let mut e = LinearExpr::var(*zv);
                    e.add_constant(k);
                    self.assign(x, &e);
                } else {
                    let i = self.interval_of(y).add(&zi);
                    self.assign_interval(x, i);
                }
            }
            BinOpKind::Arith(ArithOp::Sub) => {
                if let Some(k) = zi.singleton() {
                    let mut e = LinearExpr::var(y);
                    e.add_constant(-&k);
                    self.assign(x, &e);
                } else if let Operand::Var(zv) = z {
                    if let Some(k) = self.interval_of(y).singleton() {
                        // x := k - z
                        let mut e = LinearExpr::constant(k);
                        e.add_term(*zv, -Num::one());
                        self.assign(x, &e);
                    } else {
                        let i = self.interval_of(y).sub(&zi);
                        self.assign_interval(x, i);
                    }
                } else {
                    let i = self.interval_of(y).sub(&zi);
                    self.assign_interval(x, i);
                }
            }
            BinOpKind::Arith(ArithOp::Mul) => {
                let i = self.interval_of(y).mul(&zi);
                self.assign_interval(x, i);
            }
            BinOpKind::Arith(ArithOp::Sdiv) => {
                let i = self.interval_of(y).sdiv(&zi);
                self.assign_interval(x, i);
            }
            BinOpKind::Arith(ArithOp::Udiv) => {
                let yi = self.interval_of(y);
                let i = if yi.lb() >= &Bound::zero() && zi.lb() >= &Bound::zero() {
                    yi.sdiv(&zi)
                } else {
                    Interval::top()
                };
                self.assign_interval(x, i);
            }
            BinOpKind::Arith(ArithOp::Srem) => {
                let i = self.interval_of(y).srem(&zi);
                self.assign_interval(x, i);
            }
            BinOpKind::Arith(ArithOp::Urem) => {
                let i = self.interval_of(y).urem(&zi);
                self.assign_interval(x, i);
            }
            BinOpKind::Bit(bop) => {
                let yi = self.interval_of(y);
                let i = match bop {
                    BitOp::And => yi.and(&zi),
                    BitOp::Or => yi.or(&zi),
                    BitOp::Xor => yi.xor(&zi),
                    BitOp::Shl => yi.shl(&zi),
                    BitOp::Lshr => yi.lshr(&zi),
                    BitOp::Ashr => yi.ashr(&zi),
                };
                self.assign_interval(x, i);
            }
        }
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
        self.normalize();
        match cst.kind() {
            ConstraintKind::Leq => {
                if !self.add_linear_leq(cst.expr()) {
                    self.set_to_bottom();
                }
            }
            ConstraintKind::Eq => {
                if !self.add_linear_leq(cst.expr()) {
                    self.set_to_bottom();
                    return;
                }
                let mut neg = cst.expr().clone();
                neg.negate();
                if !self.add_linear_leq(&neg) {
                    self.set_to_bottom();
                }
            }
            ConstraintKind::Diseq => {
                self.add_disequation(cst.expr());
            }
        }
    }

    fn set(&mut self, v: Variable, intv: Interval) {
        if self.bottom {
            return;
        }
        self.assign_interval(v, intv);
    }

    fn interval(&self, v: Variable) -> Interval {
        self.interval_of(v)
    }

    fn join(&self, other: &Self) -> Self {
        if self.bottom {
            return other.clone();
        }
        if other.bottom {
            return self.clone();
        }
        let mut a = self.clone();
        a.normalize();
        let mut b = other.clone();
        b.normalize();
        let mut out = SplitDbm::top();
        for (x, y, wa) in a.g.edges() {
            let kx = if x == 0 { None } else { a.vert_var(x) };
            let ky = if y == 0 { None } else { a.vert_var(y) };
            if (x != 0 && kx.is_none()) || (y != 0 && ky.is_none()) {
                continue;
            }
            // Both endpoints must be known to the other operand.
            let bx = match kx {
                None => 0,
                Some(v) => match b.vert_map.get(&v) {
                    Some(id) => *id,
                    None => continue,
                },
            };
            let by = match ky {
                None => 0,
                Some(v) => match b.vert_map.get(&v) {
                    Some(id) => *id,
                    None => continue,
                },
            };
            let Some(wb) = b.g.edge_val(bx, by) else {
                continue;
            };
            let w = if wa >= wb { wa } else { wb };
            let ox = match kx {
                None => 0,
                Some(v) => out.get_vert(v),
            };
            let oy = match ky {
                None => 0,
                Some(v) => out.get_vert(v),
            };
            out.g.set_edge(ox, oy, w);
            out.potential[ox] = a.potential[x];
            out.potential[oy] = a.potential[y];
        }
        // The pointwise max of two closed graphs is closed, and a's
        // potentials stay feasible for the looser weights.
        out
    }

    fn widen(&self, other: &Self) -> Self {
        if self.bottom {
            return other.clone();
        }
        if other.bottom {
            return self.clone();
        }
        let a = self;
        let mut b = other.clone();
        b.normalize();
        let mut out = SplitDbm::top();
        for (x, y, wa) in a.g.edges() {
            let kx = if x == 0 { None } else { a.vert_var(x) };
            let ky = if y == 0 { None } else { a.vert_var(y) };
            if (x != 0 && kx.is_none()) || (y != 0 && ky.is_none()) {
                continue;
            }
            let bx = match kx {
                None => 0,
                Some(v) => match b.vert_map.get(&v) {
                    Some(id) => *id,
                    None => continue,
                },
            };
            let by = match ky {
                None => 0,
                Some(v) => match b.vert_map.get(&v) {
                    Some(id) => *id,
                    None => continue,
                },
            };
            // Keep only the edges the new iterate still satisfies; a
            // grown bound is given up for good.
            let Some(wb) = b.g.edge_val(bx, by) else {
                continue;
            };
            if wb > wa {
                continue;
            }
            let ox = match kx {
                None => 0,
                Some(v) => out.get_vert(v),
            };
            let oy = match ky {
                None => 0,
                Some(v) => out.get_vert(v),
            };
            out.g.set_edge(ox, oy, wa);
            out.potential[ox] = b.potential[bx];
            out.potential[oy] = b.potential[by];
        }
        // Closure is deferred for the widened graph.
        let verts: Vec<VertId> = out.g.verts().collect();
        out.unstable.extend(verts);
        out
    }

    fn narrow(&self, other: &Self) -> Self {
        if self.bottom || other.bottom {
            return Self::bottom();
        }
        let mut out = self.clone();
        out.normalize();
        let mut b = other.clone();
        b.normalize();
        // Refine only the missing (infinite) entries of self.
        for (x, y, wb) in b.g.edges() {
            let kx = if x == 0 { None } else { b.vert_var(x) };
            let ky = if y == 0 { None } else { b.vert_var(y) };
            if (x != 0 && kx.is_none()) || (y != 0 && ky.is_none()) {
                continue;
            }
            let ox = match kx {
                None => 0,
                Some(v) => out.get_vert(v),
            };
            let oy = match ky {
                None => 0,
                Some(v) => out.get_vert(v),
            };
            if out.g.elem(ox, oy) {
                continue;
            }
            out.g.set_edge(ox, oy, wb);
        }
        let verts: Vec<VertId> = out.g.verts().collect();
        out.unstable.extend(verts);
        out.normalize();
        out
    }

    fn leq(&self, other: &Self) -> bool {
        if self.bottom {
            return true;
        }
        if other.bottom {
            return false;
        }
        let mut a = self.clone();
        a.normalize();
        for (x, y, w) in other.g.edges() {
            let kx = if x == 0 { None } else { other.vert_var(x) };
            let ky = if y == 0 { None } else { other.vert_var(y) };
            if (x != 0 && kx.is_none()) || (y != 0 && ky.is_none()) {
                continue;
            }
            let ax = match kx {
                None => 0,
                Some(v) => match a.vert_map.get(&v) {
                    Some(id) => *id,
                    None => return false,
                },
            };
            let ay = match ky {
                None => 0,
                Some(v) => match a.vert_map.get(&v) {
                    Some(id) => *id,
                    None => return false,
                },
            };
            match a.g.edge_val(ax, ay) {
                Some(wa) if wa <= w => {}
                _ => return false,
            }
        }
        true
    }

    fn vars(&self) -> Vec<Variable> {
        self.vert_map.keys().copied().collect()
    }
}

impl fmt::Display for SplitDbm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bottom {
            return write!(f, "_|_");
        }
        if self.is_top() {
            return write!(f, "{{}}");
        }
        let mut parts: Vec<String> = Vec::new();
        for (v, &id) in &self.vert_map {
            let iv = self.interval_of(*v);
            if !iv.is_top() {
                parts.push(format!("{}={}", v, iv));
            }
            for (s, w) in self.g.succs(id) {
                if s == 0 {
                    continue;
                }
                if let Some(sv) = self.vert_var(s) {
                    parts.push(format!("{}-{}<={}", sv, v, w));
                }
            }
        }
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

    fn val(e: impl Into<LinearExpr>) -> LinearExpr {
        e.into()
    }

    #[test]
    fn bounds_round_trip_through_the_zero_vertex() {
        let mut d = SplitDbm::top();
        d.assume(&LinearConstraint::le(val(v(0)), val(10i64)));
        d.assume(&LinearConstraint::ge(val(v(0)), val(3i64)));
        assert_eq!(d.interval(v(0)), Interval::range(3, 10));
    }

    #[test]
    fn transitive_closure_is_incremental() {
        let mut d = SplitDbm::top();
        d.assume(&LinearConstraint::le(val(v(0)), val(v(1))));
        d.assume(&LinearConstraint::le(val(v(1)), val(v(2))));
        // x <= z is implied and must be materialised.
        assert!(d.entails(&LinearConstraint::le(val(v(0)), val(v(2)))));
        d.assume(&LinearConstraint::le(val(v(2)), val(5i64)));
        assert_eq!(d.interval(v(0)).ub(), &Bound::from(5));
    }

    #[test]
    fn contradiction_is_bottom_and_sticky() {
        let mut d = SplitDbm::top();
        d.assume(&LinearConstraint::le(val(v(0)), val(1i64)));
        d.assume(&LinearConstraint::ge(val(v(0)), val(2i64)));
        assert!(d.is_bottom());
        d.assume(&LinearConstraint::le(val(v(0)), val(100i64)));
        assert!(d.is_bottom());
    }

    #[test]
    fn exact_var_plus_constant_assignment() {
        let mut d = SplitDbm::top();
        d.set(v(1), Interval::range(0, 7));
        let mut e = LinearExpr::var(v(1));
        e.add_constant(5i64);
        d.assign(v(2), &e);
        assert_eq!(d.interval(v(2)), Interval::range(5, 12));
        // The relation is exact: v2 - v1 = 5.
        assert!(d.entails(&LinearConstraint::eq(val(v(2)), e)));
    }

    #[test]
    fn self_increment_shifts_edges() {
        let mut d = SplitDbm::top();
        d.set(v(0), Interval::range(0, 4));
        let mut e = LinearExpr::var(v(0));
        e.add_constant(1i64);
        d.assign(v(0), &e);
        assert_eq!(d.interval(v(0)), Interval::range(1, 5));
    }

    #[test]
    fn join_keeps_common_weakenings() {
        let mut a = SplitDbm::top();
        a.set(v(0), Interval::range(0, 3));
        let mut b = SplitDbm::top();
        b.set(v(0), Interval::range(5, 9));
        let j = a.join(&b);
        assert_eq!(j.interval(v(0)), Interval::range(0, 9));
        // join(a, a) = a and the order embeds into the join.
        assert!(a.leq(&a.join(&a)));
        assert!(a.join(&a).leq(&a));
        assert!(a.leq(&j));
        assert!(b.leq(&j));
    }

    #[test]
    fn widen_is_above_join_and_stabilises() {
        let mut a = SplitDbm::top();
        a.set(v(0), Interval::range(0, 1));
        let mut b = SplitDbm::top();
        b.set(v(0), Interval::range(0, 2));
        let w = a.widen(&b);
        assert!(a.join(&b).leq(&w));
        assert_eq!(w.interval(v(0)).lb(), &Bound::from(0));
        assert_eq!(w.interval(v(0)).ub(), &Bound::PlusInf);
        // A second widening with a stable iterate is a fixpoint.
        let w2 = w.widen(&w);
        assert!(w2.leq(&w) && w.leq(&w2));
    }

    #[test]
    fn narrow_recovers_dropped_bounds() {
        let mut a = SplitDbm::top();
        a.set(v(0), Interval::new(Bound::from(0), Bound::PlusInf));
        let mut b = SplitDbm::top();
        b.set(v(0), Interval::range(0, 9));
        let n = a.narrow(&b);
        assert_eq!(n.interval(v(0)), Interval::range(0, 9));
    }

    #[test]
    fn entails_implies_intersects() {
        let mut d = SplitDbm::top();
        d.set(v(0), Interval::range(2, 8));
        let c = LinearConstraint::le(val(v(0)), val(10i64));
        assert!(d.entails(&c));
        assert!(d.intersects(&c));
        let c2 = LinearConstraint::le(val(v(0)), val(4i64));
        assert!(!d.entails(&c2));
        assert!(d.intersects(&c2));
        let c3 = LinearConstraint::ge(val(v(0)), val(100i64));
        assert!(!d.entails(&c3));
        assert!(!d.intersects(&c3));
    }

    #[test]
    fn disequation_tightens_touching_endpoint() {
        let mut d = SplitDbm::top();
        d.set(v(0), Interval::range(0, 5));
        d.assume(&LinearConstraint::neq(val(v(0)), val(0i64)));
        assert_eq!(d.interval(v(0)), Interval::range(1, 5));
        let mut p = SplitDbm::top();
        p.set(v(1), Interval::range(3, 3));
        p.assume(&LinearConstraint::neq(val(v(1)), val(3i64)));
        assert!(p.is_bottom());
    }

    #[test]
    fn overflowing_weights_saturate_to_top() {
        let mut d = SplitDbm::top();
        d.set(v(0), Interval::range(i64::MAX - 1, i64::MAX));
        let mut e = LinearExpr::var(v(0));
        e.add_constant(Num::from(10i64));
        d.assign(v(1), &e);
        // No wrapping: the sum does not fit, so v1 is unconstrained
        // rather than wrapped negative.
        assert!(!d.is_bottom());
        assert!(d.interval(v(1)).ub() == &Bound::PlusInf || !d.interval(v(1)).contains(&Num::from(i64::MIN)));
    }
}
