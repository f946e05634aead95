// SPDX-License-Identifier: GPL-2.0

//! Arbitrary-precision integers
//!
//! Thin wrapper around [`num_bigint::BigInt`] giving the rest of the crate
//! a stable surface: truncated division like machine integers, explicit
//! (fallible) narrowing to `i64`, and nothing else of the BigInt zoo.

use core::fmt;
use core::ops::{Add, Div, Mul, Neg, Rem, Shl, Shr, Sub};

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

/// An unbounded signed integer
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Num(BigInt);

impl Num {
    /// The number zero
    pub fn zero() -> Self {
        Num(BigInt::zero())
    }

    /// The number one
    pub fn one() -> Self {
        Num(BigInt::from(1))
    }

    /// 2^exp
    pub fn pow2(exp: u32) -> Self {
        Num(BigInt::from(1) << (exp as usize))
    }

    /// True if zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// True if strictly negative
    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// True if strictly positive
    pub fn is_positive(&self) -> bool {
        self.0.is_positive()
    }

    /// Absolute value
    pub fn abs(&self) -> Self {
        Num(self.0.abs())
    }

    /// Narrow to `i64` if the value fits
    pub fn to_i64(&self) -> Option<i64> {
        self.0.to_i64()
    }

    /// True if the value fits in an `i64`
    pub fn fits_i64(&self) -> bool {
        self.0.to_i64().is_some()
    }

    /// Greatest common divisor of the absolute values
    pub fn gcd(&self, other: &Num) -> Num {
        let mut a = self.0.abs();
        let mut b = other.0.abs();
        while !b.is_zero() {
            let r = &a % &b;
            a = b;
            b = r;
        }
        Num(a)
    }
}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Num {
    fn from(v: i64) -> Self {
        Num(BigInt::from(v))
    }
}

impl From<i32> for Num {
    fn from(v: i32) -> Self {
        Num(BigInt::from(v))
    }
}

impl From<u32> for Num {
    fn from(v: u32) -> Self {
        Num(BigInt::from(v))
    }
}

impl From<u64> for Num {
    fn from(v: u64) -> Self {
        Num(BigInt::from(v))
    }
}

impl From<usize> for Num {
    fn from(v: usize) -> Self {
        Num(BigInt::from(v))
    }
}

macro_rules! forward_binop {
    ($trait:ident, $method:ident) => {
        impl $trait for Num {
            type Output = Num;
            fn $method(self, rhs: Num) -> Num {
                Num(self.0.$method(rhs.0))
            }
        }
        impl $trait<&Num> for &Num {
            type Output = Num;
            fn $method(self, rhs: &Num) -> Num {
                Num((&self.0).$method(&rhs.0))
            }
        }
        impl $trait<&Num> for Num {
            type Output = Num;
            fn $method(self, rhs: &Num) -> Num {
                Num(self.0.$method(&rhs.0))
            }
        }
        impl $trait<Num> for &Num {
            type Output = Num;
            fn $method(self, rhs: Num) -> Num {
                Num((&self.0).$method(rhs.0))
            }
        }
    };
}

forward_binop!(Add, add);
forward_binop!(Sub, sub);
forward_binop!(Mul, mul);
// BigInt division truncates toward zero and Rem takes the sign of the
// dividend, matching machine integer semantics.
forward_binop!(Div, div);
forward_binop!(Rem, rem);

impl Neg for Num {
    type Output = Num;
    fn neg(self) -> Num {
        Num(-self.0)
    }
}

impl Neg for &Num {
    type Output = Num;
    fn neg(self) -> Num {
        Num(-&self.0)
    }
}

impl Shl<u32> for &Num {
    type Output = Num;
    fn shl(self, rhs: u32) -> Num {
        Num(&self.0 << (rhs as usize))
    }
}

impl Shr<u32> for &Num {
    type Output = Num;
    // Shifts right with flooring, i.e. arithmetic shift for negatives.
    fn shr(self, rhs: u32) -> Num {
        Num(&self.0 >> (rhs as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_truncates_toward_zero() {
        let a = Num::from(-7i64);
        let b = Num::from(2i64);
        assert_eq!(&a / &b, Num::from(-3i64));
        assert_eq!(&a % &b, Num::from(-1i64));
    }

    #[test]
    fn narrows_only_when_it_fits() {
        let big = &Num::from(i64::MAX) + &Num::one();
        assert!(!big.fits_i64());
        assert_eq!(Num::from(42i64).to_i64(), Some(42));
    }

    #[test]
    fn gcd_of_mixed_signs() {
        assert_eq!(Num::from(-12i64).gcd(&Num::from(18i64)), Num::from(6i64));
        assert_eq!(Num::from(5i64).gcd(&Num::zero()), Num::from(5i64));
    }
}
