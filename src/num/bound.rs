// SPDX-License-Identifier: GPL-2.0

//! The extended number line

use core::fmt;
use core::ops::Neg;

use super::Num;

/// A point on the extended number line: -oo, a finite number, or +oo
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Bound {
    /// Negative infinity
    MinusInf,
    /// A finite value
    Finite(Num),
    /// Positive infinity
    PlusInf,
}

impl Bound {
    /// Finite zero
    pub fn zero() -> Self {
        Bound::Finite(Num::zero())
    }

    /// True if finite
    pub fn is_finite(&self) -> bool {
        matches!(self, Bound::Finite(_))
    }

    /// The finite value, if any
    pub fn finite(&self) -> Option<&Num> {
        match self {
            Bound::Finite(n) => Some(n),
            _ => None,
        }
    }

    /// Addition. Adding opposite infinities is a caller bug; lower bounds
    /// are only ever added to lower bounds and uppers to uppers.
    pub fn add(&self, other: &Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(a + b),
            (Bound::PlusInf, Bound::MinusInf) | (Bound::MinusInf, Bound::PlusInf) => {
                debug_assert!(false, "adding opposite infinities");
                Bound::PlusInf
            }
            (Bound::PlusInf, _) | (_, Bound::PlusInf) => Bound::PlusInf,
            (Bound::MinusInf, _) | (_, Bound::MinusInf) => Bound::MinusInf,
        }
    }

    /// Multiplication, with 0 * oo = 0
    pub fn mul(&self, other: &Bound) -> Bound {
        if let (Bound::Finite(a), Bound::Finite(b)) = (self, other) {
            return Bound::Finite(a * b);
        }
        // At least one infinity; zero absorbs it.
        if self.finite().is_some_and(Num::is_zero) || other.finite().is_some_and(Num::is_zero) {
            return Bound::zero();
        }
        let negative = self.is_negative() ^ other.is_negative();
        if negative {
            Bound::MinusInf
        } else {
            Bound::PlusInf
        }
    }

    fn is_negative(&self) -> bool {
        match self {
            Bound::MinusInf => true,
            Bound::Finite(n) => n.is_negative(),
            Bound::PlusInf => false,
        }
    }

    /// Minimum of two bounds
    pub fn min(self, other: Bound) -> Bound {
        if self <= other {
            self
        } else {
            other
        }
    }

    /// Maximum of two bounds
    pub fn max(self, other: Bound) -> Bound {
        if self >= other {
            self
        } else {
            other
        }
    }
}

impl Neg for &Bound {
    type Output = Bound;
    fn neg(self) -> Bound {
        match self {
            Bound::MinusInf => Bound::PlusInf,
            Bound::Finite(n) => Bound::Finite(-n),
            Bound::PlusInf => Bound::MinusInf,
        }
    }
}

impl From<Num> for Bound {
    fn from(n: Num) -> Self {
        Bound::Finite(n)
    }
}

impl From<i64> for Bound {
    fn from(v: i64) -> Self {
        Bound::Finite(Num::from(v))
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::MinusInf => write!(f, "-oo"),
            Bound::Finite(n) => write!(f, "{}", n),
            Bound::PlusInf => write!(f, "+oo"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering() {
        assert!(Bound::MinusInf < Bound::from(0));
        assert!(Bound::from(0) < Bound::from(1));
        assert!(Bound::from(1) < Bound::PlusInf);
    }

    #[test]
    fn zero_absorbs_infinity() {
        assert_eq!(Bound::zero().mul(&Bound::PlusInf), Bound::zero());
        assert_eq!(Bound::from(-2).mul(&Bound::PlusInf), Bound::MinusInf);
    }
}
