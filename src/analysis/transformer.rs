// SPDX-License-Identifier: GPL-2.0

//! The abstract transformer
//!
//! One case per instruction variant, each expressed through domain
//! operations. Register-register arithmetic and memory accesses whose
//! base kind is not pinned down fork the state per possible kind and
//! join the results. Assertions funnel through `require`, which the
//! checking pass observes to produce diagnostics; the fixpoint pass
//! runs with no observer and simply folds the constraint in.

use crate::asm::{
    Assertion, BinOp, CmpOp, Condition, Instruction, Label, MemAccess, Reg, TypeGroup, UnOp,
    Value, R10_STACK_POINTER,
};
use crate::domains::ebpf::{
    reg_offset, reg_type, reg_value, types::*, EbpfDomain, MAX_PACKET_OFF, PTR_MAX, STACK_SIZE,
};
use crate::domains::{ArithOp, BinOpKind, BitOp, NumericDomain, Operand};
use crate::linear::{DataKind, LinearConstraint, LinearExpr, Region, Variable};
use crate::num::{Bound, Num};
use crate::spec::helpers::{ArgPairKind, ArgSingleKind};
use crate::spec::ProgramInfo;

use super::checker::ChecksDb;

fn tv(r: Reg) -> Variable {
    reg_type(r.0)
}

fn vv(r: Reg) -> Variable {
    reg_value(r.0)
}

fn ov(r: Reg) -> Variable {
    reg_offset(r.0)
}

fn var(x: Variable) -> LinearExpr {
    LinearExpr::var(x)
}

fn var_plus(x: Variable, k: i64) -> LinearExpr {
    let mut e = LinearExpr::var(x);
    e.add_constant(k);
    e
}

fn eq(a: Variable, b: Variable) -> LinearConstraint {
    LinearConstraint::eq(var(a), var(b))
}

fn neq(a: Variable, b: Variable) -> LinearConstraint {
    LinearConstraint::neq(var(a), var(b))
}

fn type_is(r: Reg, tag: i64) -> LinearConstraint {
    LinearConstraint::eq(var(tv(r)), tag)
}

fn is_pointer(r: Reg) -> LinearConstraint {
    LinearConstraint::ge(var(tv(r)), T_CTX)
}

fn is_shared(r: Reg) -> LinearConstraint {
    LinearConstraint::gt(var(tv(r)), T_SHARED)
}

/// The observer the checking pass installs on `require`
struct CheckCtx<'a> {
    label: Label,
    db: &'a mut ChecksDb,
}

/// Forward transformer over one abstract state
pub struct AbsTransformer<'a, D: NumericDomain> {
    /// The state being transformed
    pub inv: EbpfDomain<D>,
    info: &'a ProgramInfo,
    checks: Option<CheckCtx<'a>>,
}

impl<'a, D: NumericDomain> AbsTransformer<'a, D> {
    /// Transformer for the fixpoint pass: constraints are folded in
    /// silently.
    pub fn new(inv: EbpfDomain<D>, info: &'a ProgramInfo) -> Self {
        AbsTransformer {
            inv,
            info,
            checks: None,
        }
    }

    /// Transformer for the checking pass: every `require` classifies
    /// the constraint against the invariant and records diagnostics
    /// under `label`.
    pub fn with_checks(
        inv: EbpfDomain<D>,
        info: &'a ProgramInfo,
        label: Label,
        db: &'a mut ChecksDb,
    ) -> Self {
        AbsTransformer {
            inv,
            info,
            checks: Some(CheckCtx { label, db }),
        }
    }

    /// Run a whole block through the transformer
    pub fn exec_block(&mut self, insts: &[Instruction]) {
        for inst in insts {
            self.exec(inst);
        }
    }

    fn require(
        checks: &mut Option<CheckCtx<'_>>,
        inv: &mut EbpfDomain<D>,
        cst: LinearConstraint,
        msg: &dyn Fn() -> String,
    ) {
        if let Some(ctx) = checks {
            if !inv.is_bottom() {
                if cst.is_contradiction() {
                    ctx.db.add_warning(ctx.label, format!("Contradiction: {}", msg()));
                } else if !inv.entails(&cst) {
                    // Both the satisfiable-but-unproven and the
                    // provably-false case surface as warnings; the
                    // state below still assumes the constraint.
                    ctx.db.add_warning(ctx.label, msg());
                }
            }
        }
        inv.assume(&cst);
    }

    fn require_self(&mut self, cst: LinearConstraint, msg: &dyn Fn() -> String) {
        let mut inv = std::mem::replace(&mut self.inv, EbpfDomain::bottom());
        Self::require(&mut self.checks, &mut inv, cst, msg);
        self.inv = inv;
    }

    fn no_pointer(&mut self, r: Reg) {
        self.inv.assign_constant(tv(r), T_NUM);
        self.inv.havoc(ov(r));
    }

    /// Havoc a finite-width result that may have wrapped
    fn overflow(inv: &mut EbpfDomain<D>, x: Variable) {
        let iv = inv.interval(x);
        let max = Bound::from(i64::MAX / 2);
        let min = Bound::from(i64::MIN / 2);
        if iv.lb() <= &min || iv.ub() >= &max {
            inv.havoc(x);
        }
    }

    fn apply_arith(
        inv: &mut EbpfDomain<D>,
        op: ArithOp,
        x: Variable,
        y: Variable,
        z: impl Into<Operand>,
        finite_width: bool,
    ) {
        inv.apply(BinOpKind::Arith(op), x, y, &z.into());
        if finite_width {
            Self::overflow(inv, x);
        }
    }

    fn apply_bit(inv: &mut EbpfDomain<D>, op: BitOp, x: Variable, z: impl Into<Operand>) {
        inv.apply(BinOpKind::Bit(op), x, x, &z.into());
    }

    /// Dispatch one instruction
    pub fn exec(&mut self, inst: &Instruction) {
        match inst {
            Instruction::Undefined(_) => {}
            Instruction::Bin {
                op, dst, v, is64, ..
            } => self.exec_bin(*op, *dst, *v, *is64),
            Instruction::Un { op, dst } => match op {
                UnOp::Neg => {
                    Self::apply_arith(
                        &mut self.inv,
                        ArithOp::Mul,
                        vv(*dst),
                        vv(*dst),
                        -1i64,
                        true,
                    );
                    self.no_pointer(*dst);
                }
                _ => {
                    // Byte-order conversions leave nothing usable.
                    self.inv.havoc(vv(*dst));
                    self.no_pointer(*dst);
                }
            },
            Instruction::LoadMapFd { dst, map_fd } => {
                self.inv.assign_constant(tv(*dst), T_MAP_FD);
                self.inv.assign_constant(vv(*dst), *map_fd as i64);
                self.inv.havoc(ov(*dst));
            }
            Instruction::LoadPacket { .. } => {
                // The legacy packet loads target r0 and scratch the
                // caller-saved registers like a call does.
                self.inv.assign_constant(tv(Reg(0)), T_NUM);
                self.inv.havoc(ov(Reg(0)));
                self.inv.havoc(vv(Reg(0)));
                self.scratch_caller_saved();
            }
            Instruction::Mem {
                access,
                value,
                is_load,
            } => {
                if *is_load {
                    let Value::Reg(target) = value else { return };
                    self.do_load(access, *target);
                } else {
                    self.do_mem_store(access, *value);
                }
            }
            Instruction::LockAdd { .. } => {
                // The value in shared memory stays unknown; the
                // assertions have already checked the access.
            }
            Instruction::Call { sig, .. } => self.exec_call(sig),
            Instruction::Exit => {}
            Instruction::Jmp { .. } => {}
            Instruction::Assume(cond) => self.exec_assume(cond),
            Instruction::Assert(a) => self.exec_assert(a),
        }
    }

    fn scratch_caller_saved(&mut self) {
        for i in 1..=5u8 {
            self.inv.havoc(reg_value(i));
            self.inv.havoc(reg_offset(i));
            self.inv.havoc(reg_type(i));
            self.inv.assign_constant(reg_type(i), T_UNINIT);
        }
    }

    // ------------------------------------------------------------------
    // ALU
    // ------------------------------------------------------------------

    fn exec_bin(&mut self, op: BinOp, dst: Reg, v: Value, is64: bool) {
        let dst_value = vv(dst);
        let dst_offset = ov(dst);
        let dst_type = tv(dst);
        match v {
            Value::Imm(imm) => match op {
                BinOp::Mov => {
                    self.inv.assign_constant(dst_value, imm);
                    self.no_pointer(dst);
                }
                BinOp::Add => {
                    if imm == 0 {
                        return;
                    }
                    Self::apply_arith(&mut self.inv, ArithOp::Add, dst_value, dst_value, imm, true);
                    Self::apply_arith(
                        &mut self.inv,
                        ArithOp::Add,
                        dst_offset,
                        dst_offset,
                        imm,
                        false,
                    );
                }
                BinOp::Sub => {
                    if imm == 0 {
                        return;
                    }
                    Self::apply_arith(&mut self.inv, ArithOp::Sub, dst_value, dst_value, imm, true);
                    Self::apply_arith(
                        &mut self.inv,
                        ArithOp::Sub,
                        dst_offset,
                        dst_offset,
                        imm,
                        false,
                    );
                }
                BinOp::Mul => {
                    Self::apply_arith(&mut self.inv, ArithOp::Mul, dst_value, dst_value, imm, true);
                    self.no_pointer(dst);
                }
                BinOp::Div => {
                    Self::apply_arith(
                        &mut self.inv,
                        ArithOp::Sdiv,
                        dst_value,
                        dst_value,
                        imm,
                        true,
                    );
                    self.no_pointer(dst);
                }
                BinOp::Mod => {
                    Self::apply_arith(
                        &mut self.inv,
                        ArithOp::Srem,
                        dst_value,
                        dst_value,
                        imm,
                        true,
                    );
                    self.no_pointer(dst);
                }
                BinOp::Or => {
                    Self::apply_bit(&mut self.inv, BitOp::Or, dst_value, imm);
                    self.no_pointer(dst);
                }
                BinOp::And => {
                    Self::apply_bit(&mut self.inv, BitOp::And, dst_value, imm);
                    self.no_pointer(dst);
                }
                BinOp::Lsh => {
                    Self::apply_bit(&mut self.inv, BitOp::Shl, dst_value, imm);
                    Self::overflow(&mut self.inv, dst_value);
                    self.no_pointer(dst);
                }
                BinOp::Rsh | BinOp::Arsh => {
                    // Signedness of the value variable is unresolved;
                    // keeping any bound here would be unsound.
                    self.inv.havoc(dst_value);
                    self.no_pointer(dst);
                }
                BinOp::Xor => {
                    Self::apply_bit(&mut self.inv, BitOp::Xor, dst_value, imm);
                    self.no_pointer(dst);
                }
            },
            Value::Reg(src) => {
                let src_value = vv(src);
                let src_offset = ov(src);
                let src_type = tv(src);
                match op {
                    BinOp::Add => {
                        let mut ptr_dst = self.inv.when(&is_pointer(dst));
                        Self::apply_arith(
                            &mut ptr_dst,
                            ArithOp::Add,
                            dst_offset,
                            dst_offset,
                            src_value,
                            false,
                        );
                        Self::apply_arith(
                            &mut ptr_dst,
                            ArithOp::Add,
                            dst_value,
                            dst_value,
                            src_value,
                            true,
                        );

                        let mut ptr_src = self.inv.when(&is_pointer(src));
                        Self::apply_arith(
                            &mut ptr_src,
                            ArithOp::Add,
                            dst_offset,
                            src_offset,
                            dst_value,
                            false,
                        );
                        Self::apply_arith(
                            &mut ptr_src,
                            ArithOp::Add,
                            dst_value,
                            src_value,
                            dst_value,
                            true,
                        );
                        ptr_src.assign(dst_type, &var(src_type));

                        self.inv.assume(&type_is(dst, T_NUM));
                        self.inv.assume(&type_is(src, T_NUM));
                        Self::apply_arith(
                            &mut self.inv,
                            ArithOp::Add,
                            dst_value,
                            dst_value,
                            src_value,
                            true,
                        );

                        self.inv.join_with(&ptr_dst);
                        self.inv.join_with(&ptr_src);
                    }
                    BinOp::Sub => {
                        let mut ptr_dst = self.inv.when(&type_is(src, T_NUM));
                        ptr_dst.assume(&is_pointer(dst));
                        Self::apply_arith(
                            &mut ptr_dst,
                            ArithOp::Sub,
                            dst_offset,
                            dst_offset,
                            src_value,
                            false,
                        );
                        Self::apply_arith(
                            &mut ptr_dst,
                            ArithOp::Sub,
                            dst_value,
                            dst_value,
                            src_value,
                            true,
                        );

                        let mut both_num = self.inv.when(&type_is(src, T_NUM));
                        both_num.assume(&type_is(dst, T_NUM));
                        Self::apply_arith(
                            &mut both_num,
                            ArithOp::Sub,
                            dst_value,
                            dst_value,
                            src_value,
                            true,
                        );

                        // Pointer minus pointer of the same kind, not
                        // shared: the result is the offset difference.
                        self.inv.assume(&is_pointer(src));
                        self.inv.assume(&LinearConstraint::lt(var(tv(src)), T_SHARED));
                        self.inv.assume(&eq(src_type, dst_type));
                        Self::apply_arith(
                            &mut self.inv,
                            ArithOp::Sub,
                            dst_value,
                            dst_offset,
                            src_offset,
                            false,
                        );
                        self.inv.assign_constant(dst_type, T_NUM);
                        self.inv.havoc(dst_offset);

                        self.inv.join_with(&both_num);
                        self.inv.join_with(&ptr_dst);
                    }
                    BinOp::Mul => {
                        Self::apply_arith(
                            &mut self.inv,
                            ArithOp::Mul,
                            dst_value,
                            dst_value,
                            src_value,
                            true,
                        );
                        self.no_pointer(dst);
                    }
                    BinOp::Div => {
                        Self::apply_arith(
                            &mut self.inv,
                            ArithOp::Sdiv,
                            dst_value,
                            dst_value,
                            src_value,
                            true,
                        );
                        self.no_pointer(dst);
                    }
                    BinOp::Mod => {
                        Self::apply_arith(
                            &mut self.inv,
                            ArithOp::Srem,
                            dst_value,
                            dst_value,
                            src_value,
                            true,
                        );
                        self.no_pointer(dst);
                    }
                    BinOp::Or => {
                        Self::apply_bit(&mut self.inv, BitOp::Or, dst_value, src_value);
                        self.no_pointer(dst);
                    }
                    BinOp::And => {
                        Self::apply_bit(&mut self.inv, BitOp::And, dst_value, src_value);
                        self.no_pointer(dst);
                    }
                    BinOp::Lsh => {
                        Self::apply_bit(&mut self.inv, BitOp::Shl, dst_value, src_value);
                        Self::overflow(&mut self.inv, dst_value);
                        self.no_pointer(dst);
                    }
                    BinOp::Rsh | BinOp::Arsh => {
                        self.inv.havoc(dst_value);
                        self.no_pointer(dst);
                    }
                    BinOp::Xor => {
                        Self::apply_bit(&mut self.inv, BitOp::Xor, dst_value, src_value);
                        self.no_pointer(dst);
                    }
                    BinOp::Mov => {
                        self.inv.assign(dst_value, &var(src_value));
                        self.inv.assign(dst_offset, &var(src_offset));
                        self.inv.assign(dst_type, &var(src_type));
                    }
                }
            }
        }
        if !is64 {
            Self::apply_bit(&mut self.inv, BitOp::And, dst_value, 0xffff_ffffi64);
        }
    }

    // ------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------

    fn do_load(&mut self, access: &MemAccess, target: Reg) {
        let addr = var_plus(ov(access.base), access.offset as i64);
        let width = access.width;
        if access.base.0 == R10_STACK_POINTER {
            Self::do_load_stack(&mut self.inv, target, &addr, width);
            return;
        }
        match self.inv.type_tag(access.base.0) {
            Some(T_CTX) => {
                let info = self.info;
                Self::do_load_ctx(&mut self.inv, info, target, &addr, width);
            }
            Some(T_STACK) => Self::do_load_stack(&mut self.inv, target, &addr, width),
            Some(_) => Self::do_load_packet_or_shared(&mut self.inv, target),
            None => {
                let mut ctx = self.inv.when(&type_is(access.base, T_CTX));
                Self::do_load_ctx(&mut ctx, self.info, target, &addr, width);
                let mut packet = self
                    .inv
                    .when(&LinearConstraint::ge(var(tv(access.base)), T_PACKET));
                Self::do_load_packet_or_shared(&mut packet, target);
                let mut stack = self.inv.when(&type_is(access.base, T_STACK));
                Self::do_load_stack(&mut stack, target, &addr, width);
                ctx.join_with(&packet);
                ctx.join_with(&stack);
                self.inv = ctx;
            }
        }
    }

    fn do_load_stack(inv: &mut EbpfDomain<D>, target: Reg, addr: &LinearExpr, width: u32) {
        if inv.is_bottom() {
            return;
        }
        inv.array_load(Region::Stack, DataKind::Types, addr, width, tv(target));
        if width == 8 {
            inv.array_load(Region::Stack, DataKind::Values, addr, width, vv(target));
            inv.array_load(Region::Stack, DataKind::Offsets, addr, width, ov(target));
        } else {
            inv.havoc(vv(target));
            inv.havoc(ov(target));
        }
    }

    fn do_load_ctx(
        inv: &mut EbpfDomain<D>,
        info: &ProgramInfo,
        target: Reg,
        addr: &LinearExpr,
        width: u32,
    ) {
        if inv.is_bottom() {
            return;
        }
        let desc = &info.ctx_desc;
        inv.havoc(vv(target));
        if desc.end < 0 {
            inv.havoc(ov(target));
            inv.assign_constant(tv(target), T_NUM);
            return;
        }
        let interval = inv.eval(addr);
        let touches = |field: i32| field >= 0 && interval.contains(&Num::from(field as i64));
        let may_touch_ptr = touches(desc.data) || touches(desc.end) || touches(desc.meta);
        let Some(at) = interval.singleton().and_then(|n| n.to_i64()) else {
            inv.havoc(ov(target));
            if may_touch_ptr {
                inv.havoc(tv(target));
            } else {
                inv.assign_constant(tv(target), T_NUM);
            }
            return;
        };
        if at == desc.data as i64 {
            inv.assign_constant(ov(target), 0i64);
        } else if at == desc.end as i64 {
            inv.assign(ov(target), &var(Variable::PacketSize));
        } else if at == desc.meta as i64 {
            inv.assign(ov(target), &var(Variable::MetaOffset));
        } else {
            inv.havoc(ov(target));
            if may_touch_ptr {
                inv.havoc(tv(target));
            } else {
                inv.array_load(Region::Ctx, DataKind::Values, addr, width, vv(target));
                inv.assign_constant(tv(target), T_NUM);
            }
            return;
        }
        inv.assign_constant(tv(target), T_PACKET);
        inv.assume(&LinearConstraint::ge(var(vv(target)), 4098i64));
        inv.assume(&LinearConstraint::le(var(vv(target)), PTR_MAX));
    }

    fn do_load_packet_or_shared(inv: &mut EbpfDomain<D>, target: Reg) {
        if inv.is_bottom() {
            return;
        }
        // Packet bytes and map values are written by the outside
        // world; only their numeric-ness is known.
        inv.assign_constant(tv(target), T_NUM);
        inv.havoc(ov(target));
        inv.havoc(vv(target));
    }

    fn do_mem_store(&mut self, access: &MemAccess, value: Value) {
        let width = access.width;
        if access.base.0 == R10_STACK_POINTER {
            let addr = LinearExpr::constant(STACK_SIZE + access.offset as i64);
            Self::do_store_stack(&mut self.inv, &addr, width, value);
            return;
        }
        let addr = var_plus(ov(access.base), access.offset as i64);
        match self.inv.type_tag(access.base.0) {
            Some(T_STACK) => Self::do_store_stack(&mut self.inv, &addr, width, value),
            Some(T_CTX) => Self::do_store_ctx(&mut self.inv, &addr, width, value),
            Some(_) => Self::do_store_shared(&mut self.inv, &addr, width),
            None => {
                let mut stack = self.inv.when(&type_is(access.base, T_STACK));
                Self::do_store_stack(&mut stack, &addr, width, value);
                let mut not_stack = self.inv.when(&neq_stack(access.base));
                Self::do_store_ctx(&mut not_stack, &addr, width, value);
                Self::do_store_shared(&mut not_stack, &addr, width);
                stack.join_with(&not_stack);
                self.inv = stack;
            }
        }
    }

    fn do_store_stack(inv: &mut EbpfDomain<D>, addr: &LinearExpr, width: u32, value: Value) {
        if inv.is_bottom() {
            return;
        }
        match value {
            Value::Imm(imm) => {
                inv.array_store_constant(Region::Stack, DataKind::Types, addr, width, T_NUM);
                if width == 8 {
                    inv.array_store_constant(Region::Stack, DataKind::Values, addr, width, imm);
                } else {
                    inv.array_havoc(Region::Stack, DataKind::Values, addr, width);
                }
                inv.array_havoc(Region::Stack, DataKind::Offsets, addr, width);
            }
            Value::Reg(src) => {
                inv.array_store(Region::Stack, DataKind::Types, addr, width, tv(src));
                if width == 8 {
                    inv.array_store(Region::Stack, DataKind::Values, addr, width, vv(src));
                    // The offset facet only matters for pointers.
                    let numeric = inv.type_tag(src.0) == Some(T_NUM);
                    if numeric {
                        inv.array_havoc(Region::Stack, DataKind::Offsets, addr, width);
                    } else {
                        inv.array_store(Region::Stack, DataKind::Offsets, addr, width, ov(src));
                    }
                } else {
                    inv.array_havoc(Region::Stack, DataKind::Values, addr, width);
                    inv.array_havoc(Region::Stack, DataKind::Offsets, addr, width);
                }
            }
        }
    }

    fn do_store_ctx(inv: &mut EbpfDomain<D>, addr: &LinearExpr, width: u32, value: Value) {
        if inv.is_bottom() {
            return;
        }
        // There is exactly one context object, so its cells are sound
        // to track; only numbers ever reach it past the assertions.
        match value {
            Value::Imm(imm) => {
                inv.array_store_constant(Region::Ctx, DataKind::Values, addr, width, imm)
            }
            Value::Reg(src) => {
                inv.array_store(Region::Ctx, DataKind::Values, addr, width, vv(src))
            }
        }
    }

    fn do_store_shared(inv: &mut EbpfDomain<D>, addr: &LinearExpr, width: u32) {
        if inv.is_bottom() {
            return;
        }
        // Distinct map values may alias the same offsets, so shared
        // cells are only ever invalidated, never installed.
        inv.array_havoc(Region::Shared, DataKind::Values, addr, width);
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn exec_call(&mut self, sig: &crate::spec::helpers::CallSig) {
        // Decode the sizes of the map passed by fd, if any.
        let mut value_size: Option<i64> = None;
        for arg in &sig.singles {
            if arg.kind == ArgSingleKind::MapFd {
                let fd = self
                    .inv
                    .interval(vv(Reg(arg.reg)))
                    .singleton()
                    .and_then(|n| n.to_i64());
                if let Some(def) = fd
                    .and_then(|fd| usize::try_from(fd).ok())
                    .and_then(|idx| self.info.map_defs.get(idx))
                {
                    self.inv
                        .assign_constant(Variable::MapKeySize, def.key_size as i64);
                    self.inv
                        .assign_constant(Variable::MapValueSize, def.value_size as i64);
                    value_size = Some(def.value_size as i64);
                } else {
                    self.inv.havoc(Variable::MapKeySize);
                    self.inv.havoc(Variable::MapValueSize);
                }
            }
        }
        for arg in &sig.pairs {
            if arg.kind == ArgPairKind::PtrToUninitMem {
                // The helper initialises the pointed-to stack range.
                let mem = Reg(arg.mem);
                let mut stack = self.inv.when(&type_is(mem, T_STACK));
                if !stack.is_bottom() {
                    let addr = var(ov(mem));
                    let len = var(vv(Reg(arg.size)));
                    stack.array_store_numbers(&addr, &len);
                    stack.array_havoc_dyn(Region::Stack, DataKind::Values, &addr, &len);
                    stack.array_havoc_dyn(Region::Stack, DataKind::Offsets, &addr, &len);
                }
                self.inv.assume(&type_is(mem, T_PACKET));
                self.inv.join_with(&stack);
            }
        }
        self.scratch_caller_saved();
        let r0 = Reg(0);
        self.inv.havoc(vv(r0));
        if sig.returns_map {
            // The null return is the numeric zero, hence the closed
            // lower bound.
            self.inv
                .assume(&LinearConstraint::ge(var(vv(r0)), 0i64));
            self.inv
                .assume(&LinearConstraint::le(var(vv(r0)), PTR_MAX));
            self.inv.assign_constant(ov(r0), 0i64);
            match value_size {
                Some(sz) => self.inv.assign_constant(tv(r0), sz),
                None => {
                    self.inv.havoc(tv(r0));
                    self.inv
                        .assume(&LinearConstraint::gt(var(tv(r0)), T_SHARED));
                }
            }
        } else {
            self.inv.havoc(ov(r0));
            self.inv.assign_constant(tv(r0), T_NUM);
        }
    }

    // ------------------------------------------------------------------
    // Branch refinement
    // ------------------------------------------------------------------

    fn exec_assume(&mut self, cond: &Condition) {
        let dst = cond.left;
        match cond.right {
            Value::Imm(imm) => {
                for cst in jmp_to_cst_imm(cond.op, vv(dst), imm) {
                    self.inv.assume(&cst);
                }
            }
            Value::Reg(src) => {
                let different = self.inv.when(&neq(tv(dst), tv(src)));
                // When the kinds differ, one side is the literal null
                // check of a pointer; both shapes stay represented.
                let null_src = different.when(&is_pointer(dst));
                let null_dst = different.when(&is_pointer(src));

                self.inv.assume(&eq(tv(dst), tv(src)));

                let mut numbers = self.inv.when(&type_is(dst, T_NUM));
                // An unsigned ordering agrees with the mathematical one
                // only when both values are provably non-negative; in
                // that case the constraint may be kept, otherwise only
                // the type and offset facts flow.
                let nonneg = |inv: &EbpfDomain<D>, r: Reg| {
                    inv.entails(&LinearConstraint::ge(var(vv(r)), 0i64))
                };
                let keep_values = !cond.op.is_unsigned()
                    || (nonneg(&numbers, dst) && nonneg(&numbers, src));
                if keep_values {
                    for cst in jmp_to_cst_reg(cond.op, vv(dst), vv(src)) {
                        numbers.assume(&cst);
                    }
                }

                // Pointer comparisons act on offsets with unsigned
                // semantics, which signed reasoning approximates since
                // offsets stay small and non-wrapping.
                self.inv.assume(&is_pointer(dst));
                if let Some(cst) = jmp_to_cst_offsets(cond.op, ov(dst), ov(src)) {
                    self.inv.assume(&cst);
                }

                self.inv.join_with(&numbers);
                self.inv.join_with(&null_src);
                self.inv.join_with(&null_dst);
            }
        }
    }

    // ------------------------------------------------------------------
    // Assertions
    // ------------------------------------------------------------------

    fn exec_assert(&mut self, a: &Assertion) {
        match a {
            Assertion::TypeConstraint { reg, group } => self.check_type_constraint(*reg, *group, a),
            Assertion::Comparable { r1, r2 } => {
                self.require_self(eq(tv(*r1), tv(*r2)), &|| format!("assertion failed: {}", a));
            }
            Assertion::Addable { ptr, num } => {
                let cond = LinearConstraint::gt(var(tv(*ptr)), T_NUM);
                let mut is_ptr = self.inv.when(&cond);
                Self::require(
                    &mut self.checks,
                    &mut is_ptr,
                    type_is(*num, T_NUM),
                    &|| format!("only numbers can be added to pointers ({})", a),
                );
                self.inv.assume(&cond.negate());
                self.inv.join_with(&is_ptr);
            }
            Assertion::ValidSize { reg, can_be_zero } => {
                let cst = if *can_be_zero {
                    LinearConstraint::ge(var(vv(*reg)), 0i64)
                } else {
                    LinearConstraint::gt(var(vv(*reg)), 0i64)
                };
                self.require_self(cst, &|| format!("assertion failed: {}", a));
            }
            Assertion::ValidStore { mem, val } => {
                let cond = neq_stack(*mem);
                let mut non_stack = self.inv.when(&cond);
                Self::require(
                    &mut self.checks,
                    &mut non_stack,
                    type_is(*val, T_NUM),
                    &|| format!("only numbers can be stored to externally-visible regions ({})", a),
                );
                self.inv.assume(&cond.negate());
                self.inv.join_with(&non_stack);
            }
            Assertion::ValidAccess {
                reg,
                offset,
                width,
                or_null,
            } => self.check_valid_access(*reg, *offset, *width, *or_null, a),
            Assertion::ValidMapKeyValue {
                access,
                map_fd,
                key,
            } => self.check_map_key_value(*access, *map_fd, *key, a),
        }
    }

    fn check_type_constraint(&mut self, reg: Reg, group: TypeGroup, a: &Assertion) {
        let msg = &|| format!("assertion failed: {}", a);
        let t = var(tv(reg));
        match group {
            TypeGroup::Num => self.require_self(LinearConstraint::eq(t, T_NUM), msg),
            TypeGroup::MapFd => self.require_self(LinearConstraint::eq(t, T_MAP_FD), msg),
            TypeGroup::Ctx => self.require_self(LinearConstraint::eq(t, T_CTX), msg),
            TypeGroup::Packet => self.require_self(LinearConstraint::eq(t, T_PACKET), msg),
            TypeGroup::Stack => self.require_self(LinearConstraint::eq(t, T_STACK), msg),
            TypeGroup::Shared => self.require_self(LinearConstraint::gt(t, T_SHARED), msg),
            TypeGroup::NonMapFd => self.require_self(LinearConstraint::ge(t, T_NUM), msg),
            TypeGroup::Mem => self.require_self(LinearConstraint::ge(t, T_STACK), msg),
            TypeGroup::MemOrNum => {
                self.require_self(LinearConstraint::ge(t.clone(), T_NUM), msg);
                self.require_self(LinearConstraint::neq(t, T_CTX), msg);
            }
            TypeGroup::Ptr => self.require_self(LinearConstraint::ge(t, T_CTX), msg),
            TypeGroup::PtrOrNum => self.require_self(LinearConstraint::ge(t, T_NUM), msg),
            TypeGroup::StackOrPacket => {
                self.require_self(LinearConstraint::ge(t.clone(), T_STACK), msg);
                self.require_self(LinearConstraint::le(t, T_PACKET), msg);
            }
        }
    }

    fn check_valid_access(
        &mut self,
        reg: Reg,
        offset: i32,
        width: Value,
        or_null: bool,
        a: &Assertion,
    ) {
        let is_comparison_check = width == Value::Imm(0);
        let lb = var_plus(ov(reg), offset as i64);
        let ub = match width {
            Value::Imm(w) => {
                let mut e = lb.clone();
                e.add_constant(w);
                e
            }
            Value::Reg(w) => lb.add(&var(vv(w))),
        };

        let mut packet = self.inv.when(&type_is(reg, T_PACKET));
        self.check_access_packet(&mut packet, &lb, &ub, is_comparison_check, a);
        let mut stack = self.inv.when(&type_is(reg, T_STACK));
        self.check_access_stack(&mut stack, &lb, &ub, a);
        let mut shared = self.inv.when(&is_shared(reg));
        self.check_access_shared(&mut shared, &lb, &ub, reg, a);
        let mut ctx = self.inv.when(&type_is(reg, T_CTX));
        self.check_access_context(&mut ctx, &lb, &ub, a);

        let mut assume_ptr = packet;
        assume_ptr.join_with(&stack);
        assume_ptr.join_with(&shared);
        assume_ptr.join_with(&ctx);

        if is_comparison_check {
            self.inv.join_with(&assume_ptr);
            return;
        }
        if or_null {
            self.inv.assume(&type_is(reg, T_NUM));
            self.require_self(
                LinearConstraint::eq(var(vv(reg)), 0i64),
                &|| "pointers may be compared only to the number 0".to_string(),
            );
            self.inv.join_with(&assume_ptr);
            return;
        }
        self.require_self(LinearConstraint::gt(var(tv(reg)), T_NUM), &|| {
            format!("only pointers can be dereferenced ({})", a)
        });
        self.inv = assume_ptr;
    }

    fn check_access_packet(
        &mut self,
        inv: &mut EbpfDomain<D>,
        lb: &LinearExpr,
        ub: &LinearExpr,
        is_comparison_check: bool,
        a: &Assertion,
    ) {
        Self::require(
            &mut self.checks,
            inv,
            LinearConstraint::ge(lb.clone(), var(Variable::MetaOffset)),
            &|| format!("lower bound must be at least meta_offset ({})", a),
        );
        let upper = if is_comparison_check {
            LinearConstraint::le(ub.clone(), MAX_PACKET_OFF)
        } else {
            LinearConstraint::le(ub.clone(), var(Variable::PacketSize))
        };
        Self::require(&mut self.checks, inv, upper, &|| {
            format!("upper bound must be at most packet_size ({})", a)
        });
    }

    fn check_access_stack(
        &mut self,
        inv: &mut EbpfDomain<D>,
        lb: &LinearExpr,
        ub: &LinearExpr,
        a: &Assertion,
    ) {
        Self::require(
            &mut self.checks,
            inv,
            LinearConstraint::ge(lb.clone(), 0i64),
            &|| format!("lower bound must be at least 0 ({})", a),
        );
        Self::require(
            &mut self.checks,
            inv,
            LinearConstraint::le(ub.clone(), STACK_SIZE),
            &|| format!("upper bound must be at most STACK_SIZE ({})", a),
        );
    }

    fn check_access_shared(
        &mut self,
        inv: &mut EbpfDomain<D>,
        lb: &LinearExpr,
        ub: &LinearExpr,
        reg: Reg,
        a: &Assertion,
    ) {
        Self::require(
            &mut self.checks,
            inv,
            LinearConstraint::ge(lb.clone(), 0i64),
            &|| format!("lower bound must be at least 0 ({})", a),
        );
        // The kind tag of a shared pointer is the region size.
        Self::require(
            &mut self.checks,
            inv,
            LinearConstraint::le(ub.clone(), var(tv(reg))),
            &|| format!("upper bound must be at most the value size ({})", a),
        );
    }

    fn check_access_context(
        &mut self,
        inv: &mut EbpfDomain<D>,
        lb: &LinearExpr,
        ub: &LinearExpr,
        a: &Assertion,
    ) {
        let size = self.info.ctx_desc.size as i64;
        Self::require(
            &mut self.checks,
            inv,
            LinearConstraint::ge(lb.clone(), 0i64),
            &|| format!("lower bound must be at least 0 ({})", a),
        );
        Self::require(
            &mut self.checks,
            inv,
            LinearConstraint::le(ub.clone(), size),
            &|| format!("upper bound must be at most the context size ({})", a),
        );
    }

    fn check_map_key_value(&mut self, access: Reg, map_fd: Reg, key: bool, a: &Assertion) {
        let fd = self
            .inv
            .interval(vv(map_fd))
            .singleton()
            .and_then(|n| n.to_i64());
        match fd
            .and_then(|fd| usize::try_from(fd).ok())
            .and_then(|idx| self.info.map_defs.get(idx))
        {
            Some(def) => {
                self.inv
                    .assign_constant(Variable::MapKeySize, def.key_size as i64);
                self.inv
                    .assign_constant(Variable::MapValueSize, def.value_size as i64);
            }
            None => {
                self.inv.havoc(Variable::MapKeySize);
                self.inv.havoc(Variable::MapValueSize);
            }
        }
        let size_var = if key {
            Variable::MapKeySize
        } else {
            Variable::MapValueSize
        };
        let lb = var(ov(access));
        let ub = lb.add(&var(size_var));
        self.require_self(
            LinearConstraint::ge(var(tv(access)), T_STACK),
            &|| format!("only stack or packet can be used as a parameter ({})", a),
        );
        self.require_self(
            LinearConstraint::le(var(tv(access)), T_PACKET),
            &|| format!("only stack or packet can be used as a parameter ({})", a),
        );
        let mut packet = self.inv.when(&type_is(access, T_PACKET));
        self.check_access_packet(&mut packet, &lb, &ub, false, a);
        let mut stack = self.inv.when(&type_is(access, T_STACK));
        self.check_access_stack(&mut stack, &lb, &ub, a);
        packet.join_with(&stack);
        self.inv = packet;
    }
}

fn neq_stack(r: Reg) -> LinearConstraint {
    LinearConstraint::neq(var(tv(r)), T_STACK)
}

/// Constraints for a comparison of a value with an immediate; the
/// unsigned operators read the immediate as a 32-bit unsigned number.
fn jmp_to_cst_imm(op: CmpOp, dst_value: Variable, imm: i64) -> Vec<LinearConstraint> {
    let unsigned = imm as u32 as i64;
    let v = var(dst_value);
    match op {
        CmpOp::Eq => vec![LinearConstraint::eq(v, imm)],
        CmpOp::Ne => vec![LinearConstraint::neq(v, imm)],
        CmpOp::Ge => vec![LinearConstraint::ge(v, unsigned)],
        CmpOp::Sge => vec![LinearConstraint::ge(v, imm)],
        CmpOp::Le => vec![
            LinearConstraint::le(v.clone(), unsigned),
            LinearConstraint::ge(v, 0i64),
        ],
        CmpOp::Sle => vec![LinearConstraint::le(v, imm)],
        CmpOp::Gt => vec![LinearConstraint::ge(v, unsigned + 1)],
        CmpOp::Sgt => vec![LinearConstraint::ge(v, imm + 1)],
        CmpOp::Lt => vec![
            LinearConstraint::le(v.clone(), unsigned - 1),
            LinearConstraint::ge(v, 0i64),
        ],
        CmpOp::Slt => vec![LinearConstraint::le(v, imm - 1)],
        // Bit-test branches refine nothing representable here.
        CmpOp::Set | CmpOp::Nset => vec![],
    }
}

/// Constraints for a numeric comparison between registers. Callers
/// apply the unsigned operators only after proving both operands
/// non-negative, where the two readings coincide.
fn jmp_to_cst_reg(op: CmpOp, dst_value: Variable, src_value: Variable) -> Vec<LinearConstraint> {
    let d = var(dst_value);
    let s = var(src_value);
    match op {
        CmpOp::Eq => vec![LinearConstraint::eq(d, s)],
        CmpOp::Ne => vec![LinearConstraint::neq(d, s)],
        CmpOp::Ge | CmpOp::Sge => vec![LinearConstraint::ge(d, s)],
        CmpOp::Le | CmpOp::Sle => vec![LinearConstraint::le(d, s)],
        CmpOp::Gt | CmpOp::Sgt => vec![LinearConstraint::gt(d, s)],
        CmpOp::Lt | CmpOp::Slt => vec![LinearConstraint::lt(d, s)],
        CmpOp::Set | CmpOp::Nset => vec![],
    }
}

/// The offset constraint of a pointer comparison; pointer comparisons
/// are unsigned, and offsets are small enough for signed reasoning.
fn jmp_to_cst_offsets(
    op: CmpOp,
    dst_offset: Variable,
    src_offset: Variable,
) -> Option<LinearConstraint> {
    let d = var(dst_offset);
    let s = var(src_offset);
    match op {
        CmpOp::Eq => Some(LinearConstraint::eq(d, s)),
        CmpOp::Ne => Some(LinearConstraint::neq(d, s)),
        CmpOp::Ge | CmpOp::Sge => Some(LinearConstraint::ge(d, s)),
        CmpOp::Le | CmpOp::Sle => Some(LinearConstraint::le(d, s)),
        CmpOp::Gt | CmpOp::Sgt => Some(LinearConstraint::gt(d, s)),
        CmpOp::Lt | CmpOp::Slt => Some(LinearConstraint::lt(d, s)),
        CmpOp::Set | CmpOp::Nset => None,
    }
}
