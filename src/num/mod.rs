// SPDX-License-Identifier: GPL-2.0

//! Numeric primitives for the abstract domains.
//!
//! - [`Num`]: arbitrary-precision integers used for constraint constants
//!   and interval bounds, so constant arithmetic never wraps.
//! - [`SafeI64`]: overflow-checked 64-bit weights for the difference-bound
//!   graph; any overflowing computation is reported, never wrapped.
//! - [`Bound`] and [`Interval`]: the extended number line and the interval
//!   lattice with join/meet/widening/narrowing.

pub mod bignum;
pub mod bound;
pub mod interval;
pub mod safeint;

pub use bignum::Num;
pub use bound::Bound;
pub use interval::Interval;
pub use safeint::SafeI64;
