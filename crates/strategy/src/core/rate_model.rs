//! Kinked interest-rate curve evaluation and its analytic derivatives.
//!
//! The market's borrow rate is piecewise-linear in utilization with a slope
//! change at `u_optimal`. The segment is picked by a single comparison and
//! the derivatives are evaluated in closed form for that segment — a finite
//! difference straddling the kink would see a phantom slope, so the
//! discontinuity stays explicit here.

use crate::types::market::ReserveConfig;
use crate::types::ray::Ray;

/// Which side of the kink an evaluation falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    BelowKink,
    AboveKink,
}

/// Borrow rate and its first/second derivatives with respect to an
/// additional hypothetical borrow, all RAY-scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePrimes {
    pub rate: Ray,
    pub d1: Ray,
    pub d2: Ray,
    pub segment: Segment,
}

impl RatePrimes {
    pub const FLAT: RatePrimes = RatePrimes {
        rate: Ray::ZERO,
        d1: Ray::ZERO,
        d2: Ray::ZERO,
        segment: Segment::BelowKink,
    };
}

/// Pool-level amounts the curve is evaluated against, RAY-scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolAmounts {
    pub total_deposits: Ray,
    pub stable_debt: Ray,
    pub variable_debt: Ray,
}

impl PoolAmounts {
    /// Utilization after an extra borrow `x` is taken *and redeposited*:
    /// both total debt and total deposits grow by `x`, because the strategy
    /// sizes its deposit jointly with its borrow.
    pub fn utilization(&self, extra_borrow: Ray) -> Ray {
        let denom = self.total_deposits + extra_borrow;
        if denom.is_zero() {
            return Ray::ZERO;
        }
        (self.stable_debt + self.variable_debt + extra_borrow).ray_div(denom)
    }
}

/// The two-segment rate curve of the external market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCurve {
    pub base_rate: Ray,
    pub slope1: Ray,
    pub slope2: Ray,
    pub u_optimal: Ray,
}

impl From<&ReserveConfig> for RateCurve {
    fn from(cfg: &ReserveConfig) -> Self {
        Self {
            base_rate: cfg.base_rate,
            slope1: cfg.slope1,
            slope2: cfg.slope2,
            u_optimal: cfg.u_optimal,
        }
    }
}

impl RateCurve {
    pub fn segment(&self, utilization: Ray) -> Segment {
        if utilization <= self.u_optimal {
            Segment::BelowKink
        } else {
            Segment::AboveKink
        }
    }

    /// Borrow rate at a given utilization.
    pub fn borrow_rate_at(&self, utilization: Ray) -> Ray {
        match self.segment(utilization) {
            Segment::BelowKink => self.base_rate + self.slope1.mul_div(utilization, self.u_optimal),
            Segment::AboveKink => {
                self.base_rate
                    + self.slope1
                    + self.slope2
                        .mul_div(utilization - self.u_optimal, Ray::ONE - self.u_optimal)
            }
        }
    }

    /// Supply rate: `borrow_rate * utilization * (1 - reserve_factor)`.
    pub fn supply_rate_at(&self, utilization: Ray, reserve_factor: Ray) -> Ray {
        self.borrow_rate_at(utilization)
            .ray_mul(utilization)
            .ray_mul(Ray::ONE - reserve_factor)
    }

    /// Rate and derivatives at `extra_borrow` above the current pool state.
    ///
    /// The derivative of utilization w.r.t. the extra borrow is
    /// `(D - SB - VB) / (D + x)^2`; within a segment the rate derivative is
    /// that times the segment slope over its utilization span. An empty pool
    /// yields the flat zero response.
    pub fn rate_primes(&self, extra_borrow: Ray, pool: &PoolAmounts) -> RatePrimes {
        let denom = pool.total_deposits + extra_borrow;
        if denom.is_zero() {
            return RatePrimes::FLAT;
        }

        let utilization = pool.utilization(extra_borrow);
        let u_prime = (pool.total_deposits - pool.stable_debt - pool.variable_debt)
            .ray_div(denom)
            .ray_div(denom);
        let u_prime2 = (u_prime * -2).ray_div(denom);

        match self.segment(utilization) {
            Segment::BelowKink => RatePrimes {
                rate: self.base_rate + self.slope1.mul_div(utilization, self.u_optimal),
                d1: self.slope1.mul_div(u_prime, self.u_optimal),
                d2: self.slope1.mul_div(u_prime2, self.u_optimal),
                segment: Segment::BelowKink,
            },
            Segment::AboveKink => {
                let span = Ray::ONE - self.u_optimal;
                RatePrimes {
                    rate: self.base_rate
                        + self.slope1
                        + self.slope2.mul_div(utilization - self.u_optimal, span),
                    d1: self.slope2.mul_div(u_prime, span),
                    d2: self.slope2.mul_div(u_prime2, span),
                    segment: Segment::AboveKink,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::I256;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn ray(s: &str) -> Ray {
        Ray::from_decimal(Decimal::from_str(s).unwrap())
    }

    fn ray_raw(s: &str) -> Ray {
        Ray::from_raw(I256::from_str(s).unwrap())
    }

    /// `|actual - expected| <= |expected| / 1e6`, the reference fixtures'
    /// tolerance.
    fn assert_approx(actual: Ray, expected: Ray) {
        let delta = (actual - expected).abs();
        let allowed = expected.abs() / 1_000_000;
        assert!(
            delta <= allowed + Ray::from_raw(I256::ONE),
            "actual {actual} not within tolerance of expected {expected}"
        );
    }

    /// Reserve totals from the reference market snapshot (6-decimal want).
    fn reference_pool() -> PoolAmounts {
        PoolAmounts {
            stable_debt: Ray::from_units(11_958_029_754_937, 6),
            variable_debt: Ray::from_units(1_425_711_403_399_322, 6),
            total_deposits: Ray::from_units(
                11_958_029_754_937 + 1_425_711_403_399_322 + 812_664_505_140_562,
                6,
            ),
        }
    }

    fn reference_curve() -> RateCurve {
        RateCurve {
            base_rate: Ray::ZERO,
            slope1: ray("0.04"),
            slope2: ray("0.6"),
            u_optimal: ray("0.9"),
        }
    }

    #[test]
    fn test_rate_primes_at_100k_extra_borrow() {
        let primes = reference_curve().rate_primes(Ray::from_units(100_000, 0), &reference_pool());
        assert_eq!(primes.segment, Segment::BelowKink);
        assert_approx(primes.rate, ray_raw("28394907581318844000000000"));
        assert_approx(primes.d1, ray_raw("7131752054577753"));
        assert_approx(primes.d2, ray_raw("-6338112"));
    }

    #[test]
    fn test_rate_primes_at_200k_extra_borrow() {
        let primes = reference_curve().rate_primes(Ray::from_units(200_000, 0), &reference_pool());
        assert_approx(primes.rate, ray_raw("28395620724835146000000000"));
        assert_approx(primes.d1, ray_raw("7131118285542997"));
        assert_approx(primes.d2, ray_raw("-6337267"));
    }

    #[test]
    fn test_rate_primes_deep_borrow() {
        let primes =
            reference_curve().rate_primes(Ray::from_units(79_312_137, 0), &reference_pool());
        assert_approx(primes.rate, ray_raw("28940620565909253000000000"));
        assert_approx(primes.d1, ray_raw("6655012554459868"));
        assert_approx(primes.d2, ray_raw("-5713324"));
    }

    #[test]
    fn test_kink_is_a_slope_discontinuity() {
        let curve = reference_curve();
        // rate is continuous at the kink
        let at = curve.borrow_rate_at(ray("0.9"));
        let just_above = curve.borrow_rate_at(ray("0.900000001"));
        assert_eq!(at, ray("0.04"));
        assert!(just_above > at);
        // but the slope jumps from slope1/uOpt to slope2/(1-uOpt)
        assert_eq!(curve.segment(ray("0.9")), Segment::BelowKink);
        assert_eq!(curve.segment(ray("0.900000001")), Segment::AboveKink);
    }

    #[test]
    fn test_above_kink_rate() {
        // u = 0.95: 0.04 + 0.6 * 0.05 / 0.1 = 0.34
        assert_eq!(reference_curve().borrow_rate_at(ray("0.95")), ray("0.34"));
    }

    #[test]
    fn test_supply_rate() {
        // u = 0.9, rf = 0.1: 0.04 * 0.9 * 0.9 = 0.0324
        let rate = reference_curve().supply_rate_at(ray("0.9"), ray("0.1"));
        assert_eq!(rate, ray("0.0324"));
    }

    #[test]
    fn test_empty_pool_is_flat() {
        let pool = PoolAmounts {
            total_deposits: Ray::ZERO,
            stable_debt: Ray::ZERO,
            variable_debt: Ray::ZERO,
        };
        let primes = reference_curve().rate_primes(Ray::ZERO, &pool);
        assert_eq!(primes, RatePrimes::FLAT);
        assert_eq!(pool.utilization(Ray::ZERO), Ray::ZERO);
    }
}
