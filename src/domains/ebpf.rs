// SPDX-License-Identifier: GPL-2.0

//! The eBPF abstract domain
//!
//! Bundles one scalar numeric domain with the array-expansion cells of
//! the three memory regions and gives the transformer a vocabulary of
//! register facets and region operations. The kind of every register is
//! itself a numeric variable over the ordered tag space below, so type
//! sets are ordinary range constraints.

use core::fmt;

use super::arrays::{cell_var, CellMap};
use super::{NumericDomain, Operand, SplitDbm};
use crate::linear::{DataKind, LinearConstraint, LinearExpr, Region, Variable};
use crate::num::{Interval, Num};
use crate::spec::ContextDescriptor;

/// Register kind tags, ordered so that type groups are intervals:
/// pointers are `>= T_CTX`, shared (map value) pointers are `> T_SHARED`
/// with the tag itself encoding the region size.
pub mod types {
    /// Never written
    pub const T_UNINIT: i64 = -6;
    /// A map file descriptor
    pub const T_MAP_FD: i64 = -5;
    /// A plain number
    pub const T_NUM: i64 = -4;
    /// Pointer into the context region
    pub const T_CTX: i64 = -3;
    /// Pointer into the stack
    pub const T_STACK: i64 = -2;
    /// Pointer into packet data
    pub const T_PACKET: i64 = -1;
    /// Base of the shared tags; every tag above encodes a region size
    pub const T_SHARED: i64 = 0;
}

/// Bytes of stack available to a program
pub const STACK_SIZE: i64 = 512;

/// Upper bound on any packet offset
pub const MAX_PACKET_OFF: i64 = 0xffff;

/// Upper bound on an abstract pointer value
pub const PTR_MAX: i64 = i32::MAX as i64 - MAX_PACKET_OFF;

/// The value facet of register `i`
pub fn reg_value(i: u8) -> Variable {
    Variable::Reg(DataKind::Values, i)
}

/// The offset facet of register `i`
pub fn reg_offset(i: u8) -> Variable {
    Variable::Reg(DataKind::Offsets, i)
}

/// The kind facet of register `i`
pub fn reg_type(i: u8) -> Variable {
    Variable::Reg(DataKind::Types, i)
}

/// The eBPF abstract state: scalar domain plus region cells
#[derive(Clone, Debug)]
pub struct EbpfDomain<D: NumericDomain = SplitDbm> {
    inv: D,
    cells: CellMap,
}

impl<D: NumericDomain> EbpfDomain<D> {
    /// The unconstrained state
    pub fn top() -> Self {
        EbpfDomain {
            inv: D::top(),
            cells: CellMap::new(),
        }
    }

    /// The unreachable state
    pub fn bottom() -> Self {
        EbpfDomain {
            inv: D::bottom(),
            cells: CellMap::new(),
        }
    }

    /// True if unreachable
    pub fn is_bottom(&self) -> bool {
        self.inv.is_bottom()
    }

    /// Collapse to unreachable
    pub fn set_to_bottom(&mut self) {
        self.inv.set_to_bottom();
        self.cells = CellMap::new();
    }

    /// Conjoin a constraint
    pub fn assume(&mut self, cst: &LinearConstraint) {
        self.inv.assume(cst);
    }

    /// A copy of the state with `cst` conjoined
    pub fn when(&self, cst: &LinearConstraint) -> Self {
        let mut out = self.clone();
        out.assume(cst);
        out
    }

    /// Forget a variable
    pub fn havoc(&mut self, v: Variable) {
        self.inv.havoc(v);
    }

    /// `x := e`
    pub fn assign(&mut self, x: Variable, e: &LinearExpr) {
        self.inv.assign(x, e);
    }

    /// `x := k`
    pub fn assign_constant(&mut self, x: Variable, k: impl Into<Num>) {
        self.inv.assign(x, &LinearExpr::constant(k));
    }

    /// `x := y op z`
    pub fn apply(&mut self, op: super::BinOpKind, x: Variable, y: Variable, z: &Operand) {
        self.inv.apply(op, x, y, z);
    }

    /// Constrain `v` to the given interval
    pub fn set(&mut self, v: Variable, intv: Interval) {
        self.inv.set(v, intv);
    }

    /// Project the interval of `v`
    pub fn interval(&self, v: Variable) -> Interval {
        self.inv.interval(v)
    }

    /// Evaluate a linear expression
    pub fn eval(&self, e: &LinearExpr) -> Interval {
        self.inv.eval(e)
    }

    /// Entailment against the scalar facts
    pub fn entails(&self, cst: &LinearConstraint) -> bool {
        self.inv.entails(cst)
    }

    /// Satisfiability together with the scalar facts
    pub fn intersects(&self, cst: &LinearConstraint) -> bool {
        self.inv.intersects(cst)
    }

    /// The kind tag of register `r`, when the domain pins it down
    pub fn type_tag(&self, r: u8) -> Option<i64> {
        self.interval(reg_type(r)).singleton()?.to_i64()
    }

    /// Least upper bound
    pub fn join(&self, other: &Self) -> Self {
        if self.is_bottom() {
            return other.clone();
        }
        if other.is_bottom() {
            return self.clone();
        }
        EbpfDomain {
            inv: self.inv.join(&other.inv),
            cells: self.cells.intersect(&other.cells),
        }
    }

    /// Fold `other` into `self`
    pub fn join_with(&mut self, other: &Self) {
        *self = self.join(other);
    }

    /// Widening
    pub fn widen(&self, other: &Self) -> Self {
        if self.is_bottom() {
            return other.clone();
        }
        if other.is_bottom() {
            return self.clone();
        }
        EbpfDomain {
            inv: self.inv.widen(&other.inv),
            cells: self.cells.intersect(&other.cells),
        }
    }

    /// Narrowing
    pub fn narrow(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        EbpfDomain {
            inv: self.inv.narrow(&other.inv),
            cells: self.cells.union(&other.cells),
        }
    }

    /// Partial order on the scalar facts
    pub fn leq(&self, other: &Self) -> bool {
        self.inv.leq(&other.inv)
    }

    /// Load `width` bytes at `addr` of one region sub-array into
    /// `target`. A matching cell is read exactly; a miss over untouched
    /// bytes materialises a fresh cell so later loads correlate; a miss
    /// over fractured bytes havocs the target.
    pub fn array_load(
        &mut self,
        region: Region,
        kind: DataKind,
        addr: &LinearExpr,
        width: u32,
        target: Variable,
    ) {
        if self.is_bottom() {
            return;
        }
        let Some(o) = self.eval(addr).singleton().and_then(|n| n.to_i64()) else {
            self.havoc(target);
            return;
        };
        let cv = cell_var(region, kind, o, width);
        if self.cells.contains(region, kind, (o, width)) {
            self.assign(target, &LinearExpr::var(cv));
            return;
        }
        if self
            .cells
            .overlapping(region, kind, o, o + width as i64)
            .is_empty()
        {
            self.cells.insert(region, kind, (o, width));
            self.havoc(cv);
            self.assign(target, &LinearExpr::var(cv));
        } else {
            self.havoc(target);
        }
    }

    /// Store the value of `src` into `width` bytes at `addr`
    pub fn array_store(
        &mut self,
        region: Region,
        kind: DataKind,
        addr: &LinearExpr,
        width: u32,
        src: Variable,
    ) {
        if let Some(cv) = self.fracture(region, kind, addr, width) {
            self.assign(cv, &LinearExpr::var(src));
        }
    }

    /// Store a constant into `width` bytes at `addr`
    pub fn array_store_constant(
        &mut self,
        region: Region,
        kind: DataKind,
        addr: &LinearExpr,
        width: u32,
        k: impl Into<Num>,
    ) {
        if let Some(cv) = self.fracture(region, kind, addr, width) {
            self.assign(cv, &LinearExpr::constant(k));
        }
    }

    /// Erase every cell of the sub-array that the access may touch
    pub fn array_havoc(&mut self, region: Region, kind: DataKind, addr: &LinearExpr, width: u32) {
        if self.is_bottom() {
            return;
        }
        self.havoc_range(region, kind, addr, width);
    }

    /// Erase overlapping cells and install a fresh one at a concrete
    /// address; `None` when the address is symbolic (everything it may
    /// touch has been havoced instead)
    fn fracture(
        &mut self,
        region: Region,
        kind: DataKind,
        addr: &LinearExpr,
        width: u32,
    ) -> Option<Variable> {
        if self.is_bottom() {
            return None;
        }
        let Some(o) = self.eval(addr).singleton().and_then(|n| n.to_i64()) else {
            self.havoc_range(region, kind, addr, width);
            return None;
        };
        for cell in self.cells.overlapping(region, kind, o, o + width as i64) {
            self.havoc(cell_var(region, kind, cell.0, cell.1));
            self.cells.remove(region, kind, cell);
        }
        self.cells.insert(region, kind, (o, width));
        Some(cell_var(region, kind, o, width))
    }

    fn havoc_range(&mut self, region: Region, kind: DataKind, addr: &LinearExpr, width: u32) {
        let intv = self.eval(addr);
        let lo = intv.lb().finite().and_then(|n| n.to_i64());
        let hi = intv.ub().finite().and_then(|n| n.to_i64());
        let doomed = match (lo, hi) {
            (Some(lo), Some(hi)) => {
                self.cells
                    .overlapping(region, kind, lo, hi + width as i64)
            }
            _ => self.cells.all(region, kind),
        };
        for cell in doomed {
            self.havoc(cell_var(region, kind, cell.0, cell.1));
            self.cells.remove(region, kind, cell);
        }
    }

    /// Like [`Self::array_havoc`], but with a size known only as an
    /// expression
    pub fn array_havoc_dyn(
        &mut self,
        region: Region,
        kind: DataKind,
        addr: &LinearExpr,
        width: &LinearExpr,
    ) {
        if self.is_bottom() {
            return;
        }
        let span = self.eval(&addr.add(width));
        let lo = self.eval(addr).lb().finite().and_then(|n| n.to_i64());
        let hi = span.ub().finite().and_then(|n| n.to_i64());
        let doomed = match (lo, hi) {
            (Some(lo), Some(hi)) => self.cells.overlapping(region, kind, lo, hi),
            _ => self.cells.all(region, kind),
        };
        for cell in doomed {
            self.havoc(cell_var(region, kind, cell.0, cell.1));
            self.cells.remove(region, kind, cell);
        }
    }

    /// Mark `[addr, addr + width)` of the stack type array as numeric,
    /// the effect of a helper filling caller memory
    pub fn array_store_numbers(&mut self, addr: &LinearExpr, width: &LinearExpr) {
        if self.is_bottom() {
            return;
        }
        let o = self.eval(addr).singleton().and_then(|n| n.to_i64());
        let w = self.eval(width).singleton().and_then(|n| n.to_i64());
        match (o, w) {
            (Some(o), Some(w)) if w > 0 && w <= u32::MAX as i64 => {
                if let Some(cv) =
                    self.fracture(Region::Stack, DataKind::Types, &LinearExpr::constant(o), w as u32)
                {
                    self.assign_constant(cv, types::T_NUM);
                }
            }
            _ => {
                // Unknown extent: every stack type cell may be hit.
                let conservative_width = STACK_SIZE as u32;
                self.havoc_range(Region::Stack, DataKind::Types, addr, conservative_width);
            }
        }
    }

    /// Scalar facts, for printing and the fixpoint
    pub fn scalars(&self) -> &D {
        &self.inv
    }

    /// Entry state per the calling convention: r10 is the frame
    /// pointer, r1 the context, everything else is uninitialised.
    pub fn setup_entry(desc: &ContextDescriptor) -> Self {
        let mut inv = Self::top();

        inv.assume(&LinearConstraint::ge(LinearExpr::var(reg_value(10)), STACK_SIZE));
        inv.assign_constant(reg_offset(10), STACK_SIZE);
        inv.assign_constant(reg_type(10), types::T_STACK);

        inv.assume(&LinearConstraint::ge(LinearExpr::var(reg_value(1)), 1i64));
        inv.assume(&LinearConstraint::le(LinearExpr::var(reg_value(1)), PTR_MAX));
        inv.assign_constant(reg_offset(1), 0i64);
        inv.assign_constant(reg_type(1), types::T_CTX);

        for i in [0u8, 2, 3, 4, 5, 6, 7, 8, 9] {
            inv.assign_constant(reg_type(i), types::T_UNINIT);
        }

        inv.assume(&LinearConstraint::ge(LinearExpr::var(Variable::PacketSize), 0i64));
        inv.assume(&LinearConstraint::lt(
            LinearExpr::var(Variable::PacketSize),
            MAX_PACKET_OFF,
        ));
        if desc.meta >= 0 {
            inv.assume(&LinearConstraint::le(LinearExpr::var(Variable::MetaOffset), 0i64));
            inv.assume(&LinearConstraint::ge(
                LinearExpr::var(Variable::MetaOffset),
                -4098i64,
            ));
        } else {
            inv.assign_constant(Variable::MetaOffset, 0i64);
        }
        inv
    }
}

impl<D: NumericDomain> fmt::Display for EbpfDomain<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inv)
    }
}

#[cfg(test)]
mod tests {
    use super::types::*;
    use super::*;
    use crate::spec::ProgType;

    #[test]
    fn entry_state_pins_r10_and_r1() {
        let d: EbpfDomain = EbpfDomain::setup_entry(&ProgType::Xdp.context_descriptor());
        assert_eq!(d.interval(reg_offset(10)).singleton(), Some(Num::from(STACK_SIZE)));
        assert_eq!(d.type_tag(10), Some(T_STACK));
        assert_eq!(d.type_tag(1), Some(T_CTX));
        assert_eq!(d.interval(reg_offset(1)).singleton(), Some(Num::zero()));
        assert_eq!(d.type_tag(0), Some(T_UNINIT));
        // XDP has meta, so the meta offset ranges over [-4098, 0].
        assert!(d
            .interval(Variable::MetaOffset)
            .contains(&Num::from(-4098i64)));
    }

    #[test]
    fn entry_state_without_meta_pins_meta_offset() {
        let d: EbpfDomain = EbpfDomain::setup_entry(&ProgType::Kprobe.context_descriptor());
        assert_eq!(
            d.interval(Variable::MetaOffset).singleton(),
            Some(Num::zero())
        );
    }

    #[test]
    fn stack_cells_round_trip_and_fracture() {
        let mut d: EbpfDomain = EbpfDomain::top();
        let addr = LinearExpr::constant(8i64);
        d.set(reg_value(1), Interval::range(7, 7));
        d.array_store(Region::Stack, DataKind::Values, &addr, 8, reg_value(1));
        d.array_load(Region::Stack, DataKind::Values, &addr, 8, reg_value(2));
        assert_eq!(d.interval(reg_value(2)).singleton(), Some(Num::from(7i64)));
        // An overlapping store at a different extent erases the cell.
        let addr2 = LinearExpr::constant(12i64);
        d.array_store_constant(Region::Stack, DataKind::Values, &addr2, 8, 0i64);
        d.array_load(Region::Stack, DataKind::Values, &addr, 8, reg_value(3));
        assert!(d.interval(reg_value(3)).is_top());
    }

    #[test]
    fn symbolic_offset_havocs_the_array() {
        let mut d: EbpfDomain = EbpfDomain::top();
        let addr = LinearExpr::constant(0i64);
        d.array_store_constant(Region::Stack, DataKind::Values, &addr, 8, 5i64);
        // Store somewhere in [0, 16): the concrete cell must die.
        d.set(reg_offset(1), Interval::range(0, 8));
        let sym = LinearExpr::var(reg_offset(1));
        d.array_store(Region::Stack, DataKind::Values, &sym, 8, reg_value(1));
        d.array_load(Region::Stack, DataKind::Values, &addr, 8, reg_value(2));
        assert!(d.interval(reg_value(2)).is_top());
    }
}
