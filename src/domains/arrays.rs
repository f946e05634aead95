// SPDX-License-Identifier: GPL-2.0

//! Array-expansion cell bookkeeping
//!
//! Each region array is represented by a finite set of cells
//! `(offset, width)`, every cell naming one scalar variable of the
//! underlying numeric domain. Overlap is resolved by fracturing: a
//! store erases every overlapping cell before installing its own.
//! The scalar facts themselves live in the numeric domain; this type
//! only tracks which cells exist.

use std::collections::{BTreeMap, BTreeSet};

use crate::linear::{DataKind, Region, Variable};

/// A cell: byte offset and width inside one region array
pub type Cell = (i64, u32);

/// The live cells of all region arrays
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CellMap {
    cells: BTreeMap<(Region, DataKind), BTreeSet<Cell>>,
}

/// The scalar variable backing a cell
pub fn cell_var(region: Region, kind: DataKind, offset: i64, width: u32) -> Variable {
    Variable::Cell(region, kind, offset, width)
}

impl CellMap {
    /// Fresh, empty bookkeeping
    pub fn new() -> Self {
        Self::default()
    }

    /// True if exactly this cell exists
    pub fn contains(&self, region: Region, kind: DataKind, cell: Cell) -> bool {
        self.cells
            .get(&(region, kind))
            .is_some_and(|s| s.contains(&cell))
    }

    /// Install a cell
    pub fn insert(&mut self, region: Region, kind: DataKind, cell: Cell) {
        self.cells.entry((region, kind)).or_default().insert(cell);
    }

    /// Remove a cell
    pub fn remove(&mut self, region: Region, kind: DataKind, cell: Cell) {
        if let Some(s) = self.cells.get_mut(&(region, kind)) {
            s.remove(&cell);
        }
    }

    /// Cells of `(region, kind)` intersecting the byte range `[lo, hi)`
    pub fn overlapping(&self, region: Region, kind: DataKind, lo: i64, hi: i64) -> Vec<Cell> {
        match self.cells.get(&(region, kind)) {
            Some(s) => s
                .iter()
                .copied()
                .filter(|(o, w)| *o < hi && o + *w as i64 > lo)
                .collect(),
            None => Vec::new(),
        }
    }

    /// All cells of `(region, kind)`
    pub fn all(&self, region: Region, kind: DataKind) -> Vec<Cell> {
        match self.cells.get(&(region, kind)) {
            Some(s) => s.iter().copied().collect(),
            None => Vec::new(),
        }
    }

    /// Keep only the cells present in both maps (used on join/widen,
    /// where exclusive scalar variables are dropped anyway)
    pub fn intersect(&self, other: &CellMap) -> CellMap {
        let mut out = CellMap::new();
        for (key, set) in &self.cells {
            if let Some(oset) = other.cells.get(key) {
                let both: BTreeSet<Cell> = set.intersection(oset).copied().collect();
                if !both.is_empty() {
                    out.cells.insert(*key, both);
                }
            }
        }
        out
    }

    /// Keep every cell of either map (used on narrowing)
    pub fn union(&self, other: &CellMap) -> CellMap {
        let mut out = self.clone();
        for (key, set) in &other.cells {
            out.cells.entry(*key).or_default().extend(set.iter().copied());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_queries_are_half_open() {
        let mut m = CellMap::new();
        m.insert(Region::Stack, DataKind::Values, (8, 8));
        assert_eq!(
            m.overlapping(Region::Stack, DataKind::Values, 0, 8),
            Vec::<Cell>::new()
        );
        assert_eq!(
            m.overlapping(Region::Stack, DataKind::Values, 15, 16),
            vec![(8, 8)]
        );
        assert_eq!(
            m.overlapping(Region::Stack, DataKind::Values, 16, 24),
            Vec::<Cell>::new()
        );
    }

    #[test]
    fn intersection_drops_one_sided_cells() {
        let mut a = CellMap::new();
        a.insert(Region::Stack, DataKind::Values, (0, 8));
        a.insert(Region::Stack, DataKind::Values, (8, 8));
        let mut b = CellMap::new();
        b.insert(Region::Stack, DataKind::Values, (8, 8));
        let i = a.intersect(&b);
        assert!(i.contains(Region::Stack, DataKind::Values, (8, 8)));
        assert!(!i.contains(Region::Stack, DataKind::Values, (0, 8)));
    }
}
