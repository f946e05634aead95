// SPDX-License-Identifier: GPL-2.0

//! Sparse weighted digraph backing the difference-bound domain
//!
//! Vertices are small integers handed out by the graph and recycled
//! through a free list. An edge `x -> y` with weight `w` encodes the
//! difference constraint `y - x <= w`; multiple constraints over the
//! same pair keep only the tightest weight. Per-vertex successor maps
//! give O(log degree) edge lookup, and predecessor sets let closure
//! walk incoming edges without scanning the whole graph.

use std::collections::{BTreeMap, BTreeSet};

use crate::num::SafeI64;

/// Vertex identifier
pub type VertId = usize;

/// Edge weight
pub type Wt = SafeI64;

/// A sparse directed graph with at most one weighted edge per vertex pair
#[derive(Clone, Debug, Default)]
pub struct SparseGraph {
    succs: Vec<BTreeMap<VertId, Wt>>,
    preds: Vec<BTreeSet<VertId>>,
    alive: Vec<bool>,
    free: Vec<VertId>,
}

impl SparseGraph {
    /// An empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a vertex, recycling a forgotten slot when possible
    pub fn add_vertex(&mut self) -> VertId {
        if let Some(v) = self.free.pop() {
            self.alive[v] = true;
            v
        } else {
            self.succs.push(BTreeMap::new());
            self.preds.push(BTreeSet::new());
            self.alive.push(true);
            self.succs.len() - 1
        }
    }

    /// Drop a vertex and every edge touching it
    pub fn forget(&mut self, v: VertId) {
        if !self.alive[v] {
            return;
        }
        let out: Vec<VertId> = self.succs[v].keys().copied().collect();
        for s in out {
            self.preds[s].remove(&v);
        }
        let inc: Vec<VertId> = self.preds[v].iter().copied().collect();
        for p in inc {
            self.succs[p].remove(&v);
        }
        self.succs[v].clear();
        self.preds[v].clear();
        self.alive[v] = false;
        self.free.push(v);
    }

    /// True if the edge `x -> y` exists
    pub fn elem(&self, x: VertId, y: VertId) -> bool {
        self.succs[x].contains_key(&y)
    }

    /// The weight of `x -> y`, if present
    pub fn edge_val(&self, x: VertId, y: VertId) -> Option<Wt> {
        self.succs[x].get(&y).copied()
    }

    /// Install or overwrite the edge `x -> y`
    pub fn set_edge(&mut self, x: VertId, y: VertId, w: Wt) {
        self.succs[x].insert(y, w);
        self.preds[y].insert(x);
    }

    /// Tighten the edge `x -> y` to at most `w`; returns true if the
    /// graph changed
    pub fn update_edge(&mut self, x: VertId, y: VertId, w: Wt) -> bool {
        match self.succs[x].get_mut(&y) {
            Some(old) if *old <= w => false,
            Some(old) => {
                *old = w;
                true
            }
            None => {
                self.set_edge(x, y, w);
                true
            }
        }
    }

    /// Remove the edge `x -> y`
    pub fn remove_edge(&mut self, x: VertId, y: VertId) {
        if self.succs[x].remove(&y).is_some() {
            self.preds[y].remove(&x);
        }
    }

    /// Successors of `x` with weights
    pub fn succs(&self, x: VertId) -> impl Iterator<Item = (VertId, Wt)> + '_ {
        self.succs[x].iter().map(|(v, w)| (*v, *w))
    }

    /// Predecessors of `x`
    pub fn preds(&self, x: VertId) -> impl Iterator<Item = VertId> + '_ {
        self.preds[x].iter().copied()
    }

    /// Live vertices
    pub fn verts(&self) -> impl Iterator<Item = VertId> + '_ {
        (0..self.alive.len()).filter(|v| self.alive[*v])
    }

    /// Number of vertex slots, live or not
    pub fn capacity(&self) -> usize {
        self.succs.len()
    }

    /// Number of live vertices
    pub fn num_verts(&self) -> usize {
        self.alive.iter().filter(|a| **a).count()
    }

    /// Number of edges
    pub fn num_edges(&self) -> usize {
        self.succs.iter().map(BTreeMap::len).sum()
    }

    /// All edges as (src, dst, weight)
    pub fn edges(&self) -> impl Iterator<Item = (VertId, VertId, Wt)> + '_ {
        self.succs
            .iter()
            .enumerate()
            .flat_map(|(x, m)| m.iter().map(move |(y, w)| (x, *y, *w)))
    }

    /// True if the graph has no edges
    pub fn is_empty(&self) -> bool {
        self.num_edges() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_keeps_the_minimum() {
        let mut g = SparseGraph::new();
        let a = g.add_vertex();
        let b = g.add_vertex();
        assert!(g.update_edge(a, b, Wt::new(10)));
        assert!(!g.update_edge(a, b, Wt::new(12)));
        assert!(g.update_edge(a, b, Wt::new(3)));
        assert_eq!(g.edge_val(a, b), Some(Wt::new(3)));
    }

    #[test]
    fn forget_recycles_and_clears() {
        let mut g = SparseGraph::new();
        let a = g.add_vertex();
        let b = g.add_vertex();
        g.set_edge(a, b, Wt::new(1));
        g.set_edge(b, a, Wt::new(2));
        g.forget(b);
        assert!(!g.elem(a, b));
        assert_eq!(g.num_edges(), 0);
        let c = g.add_vertex();
        assert_eq!(c, b);
        assert_eq!(g.preds(a).count(), 0);
    }
}
