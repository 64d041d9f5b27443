//! Signed fixed-point arithmetic at RAY scale (27 decimals).
//!
//! Every rate, ratio and ray-scaled amount in the engine is a [`Ray`]. The
//! newtype keeps the scale out of call sites and prevents accidental mixing
//! with native token units. Arithmetic is integer-only with truncating
//! (round-toward-zero) division, so results are bit-reproducible against the
//! reference vectors; floating point never enters the solver path.

use alloy::primitives::{uint, I256, U256};
use rust_decimal::Decimal;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// 1e27 as an unsigned word, the implicit scale factor.
pub const RAY_U256: U256 = uint!(1_000_000_000_000_000_000_000_000_000_U256);

/// RAY-scaled signed value (27 decimals).
///
/// Signed because marginal revenue and its derivatives go negative over most
/// of the borrow domain. Magnitudes are bounded by the market (total deposits
/// of the underlying reserve), which keeps every intermediate product in the
/// solver well inside `I256` range.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ray(I256);

impl Ray {
    pub const ZERO: Ray = Ray(I256::ZERO);
    pub const ONE: Ray = Ray(I256::from_raw(RAY_U256));

    /// Wrap a raw `I256` that is already RAY-scaled.
    pub const fn from_raw(val: I256) -> Self {
        Self(val)
    }

    /// Inner raw value.
    pub const fn raw(self) -> I256 {
        self.0
    }

    /// Scale a native token amount (`decimals` fractional digits) up to RAY.
    pub fn from_units(amount: u128, decimals: u8) -> Self {
        debug_assert!(decimals <= 27);
        let scaled = U256::from(amount) * pow10(27 - u32::from(decimals));
        // Native amounts are < 2^128, so the scaled value always fits.
        Self(I256::from_raw(scaled))
    }

    /// Convert back to native token units, truncating (floor for
    /// non-negative values). Negative values floor to zero: an amount that
    /// will be transferred can never be negative.
    pub fn to_units_floor(self, decimals: u8) -> u128 {
        debug_assert!(decimals <= 27);
        if self.0.is_negative() {
            return 0;
        }
        let units = self.0.into_raw() / pow10(27 - u32::from(decimals));
        units.to::<u128>()
    }

    /// Convert a small config fraction (e.g. `0.02`) to RAY.
    ///
    /// Intended for margins, tolerances and discounts; the mantissa of a
    /// `Decimal` always fits RAY scale.
    pub fn from_decimal(value: Decimal) -> Self {
        let scale = value.scale();
        let mantissa = I256::try_from(value.mantissa()).unwrap_or(I256::ZERO);
        if scale <= 27 {
            Self(mantissa * I256::from_raw(pow10(27 - scale)))
        } else {
            Self(mantissa / I256::from_raw(pow10(scale - 27)))
        }
    }

    /// `self * rhs / RAY`, truncating.
    pub fn ray_mul(self, rhs: Ray) -> Ray {
        Ray(self.0 * rhs.0 / Self::ONE.0)
    }

    /// `self * RAY / rhs`, truncating. Panics on a zero divisor; callers
    /// guard degenerate denominators explicitly.
    pub fn ray_div(self, rhs: Ray) -> Ray {
        Ray(self.0 * Self::ONE.0 / rhs.0)
    }

    /// `self * num / den` without a scale adjustment — the full-width
    /// product is formed before the division, preserving precision when
    /// `num / den` is a dimensionless ratio.
    pub fn mul_div(self, num: Ray, den: Ray) -> Ray {
        Ray(self.0 * num.0 / den.0)
    }

    /// `self * RAY / rhs`, rounding away from zero. For quantities where
    /// truncation would land one unit on the wrong side of a bound.
    pub fn ray_div_ceil(self, rhs: Ray) -> Ray {
        let num = self.0 * Self::ONE.0;
        let q = num / rhs.0;
        if num % rhs.0 != I256::ZERO && (num.is_negative() == rhs.0.is_negative()) {
            Ray(q + I256::ONE)
        } else {
            Ray(q)
        }
    }

    pub fn abs(self) -> Ray {
        if self.0.is_negative() {
            Ray(-self.0)
        } else {
            self
        }
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_negative()
    }

    pub fn min(self, other: Ray) -> Ray {
        if self <= other {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Ray) -> Ray {
        if self >= other {
            self
        } else {
            other
        }
    }

    /// Clamp into `[lo, hi]`.
    pub fn clamp(self, lo: Ray, hi: Ray) -> Ray {
        self.max(lo).min(hi)
    }
}

/// `10^exp` for exponents up to 27.
fn pow10(exp: u32) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

impl Add for Ray {
    type Output = Ray;
    fn add(self, rhs: Ray) -> Ray {
        Ray(self.0 + rhs.0)
    }
}

impl Sub for Ray {
    type Output = Ray;
    fn sub(self, rhs: Ray) -> Ray {
        Ray(self.0 - rhs.0)
    }
}

impl AddAssign for Ray {
    fn add_assign(&mut self, rhs: Ray) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Ray {
    fn sub_assign(&mut self, rhs: Ray) {
        self.0 -= rhs.0;
    }
}

impl Neg for Ray {
    type Output = Ray;
    fn neg(self) -> Ray {
        Ray(-self.0)
    }
}

/// Raw integer product — only meaningful when one side carries the scale.
impl Mul<i64> for Ray {
    type Output = Ray;
    fn mul(self, rhs: i64) -> Ray {
        Ray(self.0 * I256::try_from(rhs).unwrap_or(I256::ZERO))
    }
}

impl Div<i64> for Ray {
    type Output = Ray;
    fn div(self, rhs: i64) -> Ray {
        Ray(self.0 / I256::try_from(rhs).unwrap_or(I256::ONE))
    }
}

impl fmt::Debug for Ray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ray({self})")
    }
}

/// Exact decimal expansion, no floating point. Trailing zeros trimmed.
impl fmt::Display for Ray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0.is_negative() { "-" } else { "" };
        let abs = self.abs().0.into_raw();
        let int = abs / RAY_U256;
        let frac = abs % RAY_U256;
        if frac.is_zero() {
            return write!(f, "{sign}{int}");
        }
        let frac = format!("{:0>27}", frac.to_string());
        write!(f, "{sign}{int}.{}", frac.trim_end_matches('0'))
    }
}
