// SPDX-License-Identifier: GPL-2.0

//! Overflow-checked 64-bit integers
//!
//! Graph weights can be represented by plain machine integers (fast but
//! silently wrong on overflow), by bignums (never wrong, slow), or by a
//! checked 64-bit type. The difference-bound graph uses the last: every
//! arithmetic operation reports overflow instead of wrapping, and the
//! domain reacts by saturating the affected projection to top.

use core::fmt;

use super::Num;

/// A 64-bit integer whose arithmetic never wraps silently
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct SafeI64(i64);

impl SafeI64 {
    /// The zero weight
    pub const ZERO: SafeI64 = SafeI64(0);

    /// Wrap a raw value
    pub const fn new(v: i64) -> Self {
        SafeI64(v)
    }

    /// The raw value
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Checked addition
    pub fn checked_add(self, rhs: SafeI64) -> Option<SafeI64> {
        self.0.checked_add(rhs.0).map(SafeI64)
    }

    /// Checked subtraction
    pub fn checked_sub(self, rhs: SafeI64) -> Option<SafeI64> {
        self.0.checked_sub(rhs.0).map(SafeI64)
    }

    /// Checked negation
    pub fn checked_neg(self) -> Option<SafeI64> {
        self.0.checked_neg().map(SafeI64)
    }

    /// Convert from an unbounded number; `None` means it does not fit
    pub fn from_num(n: &Num) -> Option<SafeI64> {
        n.to_i64().map(SafeI64)
    }

    /// Widen back to an unbounded number
    pub fn to_num(self) -> Num {
        Num::from(self.0)
    }
}

impl fmt::Display for SafeI64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SafeI64 {
    fn from(v: i64) -> Self {
        SafeI64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_is_reported() {
        let max = SafeI64::new(i64::MAX);
        assert!(max.checked_add(SafeI64::new(1)).is_none());
        assert!(SafeI64::new(i64::MIN).checked_neg().is_none());
        assert_eq!(
            SafeI64::new(3).checked_add(SafeI64::new(4)),
            Some(SafeI64::new(7))
        );
    }

    #[test]
    fn num_conversion_detects_saturation() {
        let too_big = &Num::from(i64::MAX) + &Num::one();
        assert!(SafeI64::from_num(&too_big).is_none());
        assert_eq!(SafeI64::from_num(&Num::from(-5i64)), Some(SafeI64::new(-5)));
    }
}
