//! s15.16 fixed-point arithmetic for the packet hot path.
//!
//! No floating point is used by any operation here except the explicit
//! `from_f64`/`to_f64` conversions. Every loop runs a fixed number of
//! iterations. Error budgets:
//!
//! - multiply: rounded to nearest, saturating
//! - divide: truncated toward zero, exact in range, saturating
//! - `log2`: absolute error at most 7.7e-6 over the whole positive range
//! - `exp2`: absolute error at most 2^-17 + 3e-9 * 2^x over [-17, 15);
//!   zero below -17
//! - `pow`: composition of the two above
//!
//! `log2` and `exp2` run their shift-and-add passes on a u64 mantissa
//! with 32 fractional bits and round once at the end.

use super::Numeric;
use crate::error::NumericError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

pub const FRAC_BITS: u32 = 16;
const ONE_RAW: i32 = 1 << FRAC_BITS;
const EXP2_LIMIT: i32 = 15 << FRAC_BITS;

const EXP2_FLOOR: i32 = -(17 << FRAC_BITS);
const WIDE_ONE: u64 = 1 << 32;

/// log2(1 + 2^-k) for k = 1..=31, 32 fractional bits.
const LOG2_TAB: [u64; 31] = [
    0x095c01a3a, 0x05269e12f, 0x02b803474, 0x01663f6fb, 0x00b5d69bb, 0x005b9e5a1, 0x002dfca17,
    0x001709c47, 0x000b87c20, 0x0005c4995, 0x0002e27ac, 0x00017148f, 0x0000b8a76, 0x00005c546,
    0x00002e2a6, 0x000017154, 0x00000b8aa, 0x000005c55, 0x000002e2b, 0x000001715, 0x000000b8b,
    0x0000005c5, 0x0000002e3, 0x000000171, 0x0000000b9, 0x00000005c, 0x00000002e, 0x000000017,
    0x00000000c, 0x000000006, 0x000000003,
];

/// Signed 32-bit fixed point with 16 fractional bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fx(i32);

fn saturate(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

impl Fx {
    pub const ZERO: Fx = Fx(0);
    pub const ONE: Fx = Fx(ONE_RAW);
    pub const EPSILON: Fx = Fx(1);
    pub const MAX: Fx = Fx(i32::MAX);
    pub const MIN: Fx = Fx(i32::MIN);

    pub const fn from_raw(raw: i32) -> Self {
        Fx(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub fn from_int(a: i32) -> Self {
        Fx(saturate((a as i64) << FRAC_BITS))
    }

    /// Rounds half away from zero; out-of-range input saturates.
    pub fn from_f64(a: f64) -> Self {
        let scaled = a * ONE_RAW as f64 + if a < 0.0 { -0.5 } else { 0.5 };
        Fx(scaled as i32)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / ONE_RAW as f64
    }

    pub fn checked_mul(self, rhs: Fx) -> Option<Fx> {
        let t = self.0 as i64 * rhs.0 as i64;
        i32::try_from((t + (1 << (FRAC_BITS - 1))) >> FRAC_BITS)
            .ok()
            .map(Fx)
    }

    pub fn saturating_mul(self, rhs: Fx) -> Fx {
        let t = self.0 as i64 * rhs.0 as i64;
        Fx(saturate((t + (1 << (FRAC_BITS - 1))) >> FRAC_BITS))
    }

    pub fn checked_div(self, rhs: Fx) -> Option<Fx> {
        if rhs.0 == 0 {
            return None;
        }
        i32::try_from(((self.0 as i64) << FRAC_BITS) / rhs.0 as i64)
            .ok()
            .map(Fx)
    }

    /// Division by zero saturates toward the sign of the dividend.
    pub fn saturating_div(self, rhs: Fx) -> Fx {
        match self.checked_div(rhs) {
            Some(q) => q,
            None if self.0 == 0 => Fx::ZERO,
            None if (self.0 < 0) != (rhs.0 < 0) => Fx::MIN,
            None => Fx::MAX,
        }
    }

    /// Shift-and-add logarithm.
    ///
    /// The input is normalised to a mantissa in [1, 2); the pass multiplies
    /// it by factors `1 + 2^-k` while it stays below 2, so the summed table
    /// entries give `1 - log2(mantissa)`.
    pub fn log2(self) -> Result<Fx, NumericError> {
        if self.0 <= 0 {
            return Err(NumericError::Domain("log2 of non-positive value"));
        }
        let x = self.0 as u32;
        let msb = 31 - x.leading_zeros();
        let mut m = u64::from(x) << (32 - msb);
        let mut acc: u64 = 0;
        for (k, &t) in (1u32..).zip(LOG2_TAB.iter()) {
            let next = m + (m >> k);
            if next < 2 * WIDE_ONE {
                m = next;
                acc += t;
            }
        }
        let wide = ((i64::from(msb) - i64::from(FRAC_BITS)) << 32) + WIDE_ONE as i64 - acc as i64;
        Ok(Fx(((wide + (1 << 15)) >> 16) as i32))
    }

    /// Underflows to zero below -17; 15 and above is not representable.
    pub fn exp2(self) -> Result<Fx, NumericError> {
        if self.0 >= EXP2_LIMIT {
            return Err(NumericError::ExponentOutOfRange);
        }
        if self.0 < EXP2_FLOOR {
            return Ok(Fx::ZERO);
        }
        // floor split: 2^x = 2^whole * 2^frac, frac in [0, 1)
        let whole = self.0 >> FRAC_BITS;
        let mut r = ((self.0 & (ONE_RAW - 1)) as u64) << 16;
        let mut y = WIDE_ONE;
        for (k, &t) in (1u32..).zip(LOG2_TAB.iter()) {
            if r >= t {
                r -= t;
                y += y >> k;
            }
        }
        let shift = (16 - whole) as u32;
        let raw = (y + (1 << (shift - 1))) >> shift;
        Ok(Fx(saturate(raw as i64)))
    }

    /// `self ** exp` for a non-negative base.
    pub fn pow(self, exp: Fx) -> Result<Fx, NumericError> {
        if self.0 < 0 {
            return Err(NumericError::Domain("pow of negative base"));
        }
        if self.0 == 0 {
            return Ok(Fx::ZERO);
        }
        exp.checked_mul(self.log2()?)
            .ok_or(NumericError::ExponentOutOfRange)?
            .exp2()
    }

    /// Bitwise integer square root over the widened raw value, 32 rounds.
    pub fn sqrt(self) -> Fx {
        if self.0 <= 0 {
            return Fx::ZERO;
        }
        let mut rem = (self.0 as u64) << FRAC_BITS;
        let mut root: u64 = 0;
        let mut bit: u64 = 1 << 62;
        for _ in 0..32 {
            if rem >= root + bit {
                rem -= root + bit;
                root = (root >> 1) + bit;
            } else {
                root >>= 1;
            }
            bit >>= 2;
        }
        Fx(root as i32)
    }
}

/// Converts a nanosecond delta to fixed-point seconds at 1e-4 s resolution.
///
/// The delta is reduced by integer division only: nanoseconds to
/// microseconds, then whole seconds plus ten-thousandths.
pub fn seconds_from_nanos(nanos: u64) -> Result<Fx, NumericError> {
    let micros = nanos / 1_000;
    let secs = micros / 1_000_000;
    if secs > i16::MAX as u64 {
        return Err(NumericError::TimeDeltaOutOfRange { nanos });
    }
    let ten_thousandths = ((micros % 1_000_000) / 100) as i32;
    let frac = Fx::from_int(ten_thousandths).saturating_div(Fx::from_int(10_000));
    Ok(Fx::from_int(secs as i32) + frac)
}

impl Add for Fx {
    type Output = Fx;
    fn add(self, rhs: Fx) -> Fx {
        Fx(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Fx {
    type Output = Fx;
    fn sub(self, rhs: Fx) -> Fx {
        Fx(self.0.saturating_sub(rhs.0))
    }
}

impl Mul for Fx {
    type Output = Fx;
    fn mul(self, rhs: Fx) -> Fx {
        self.saturating_mul(rhs)
    }
}

impl Div for Fx {
    type Output = Fx;
    fn div(self, rhs: Fx) -> Fx {
        self.saturating_div(rhs)
    }
}

impl Neg for Fx {
    type Output = Fx;
    fn neg(self) -> Fx {
        Fx(self.0.saturating_neg())
    }
}

impl fmt::Debug for Fx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fx({:#x} ~ {})", self.0, self.to_f64())
    }
}

impl fmt::Display for Fx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

impl Numeric for Fx {
    /// Nanoseconds.
    type Time = u64;

    const ZERO: Self = Fx::ZERO;
    const ONE: Self = Fx::ONE;
    const EPSILON: Self = Fx::EPSILON;

    fn from_f64(x: f64) -> Self {
        Fx::from_f64(x)
    }

    fn to_f64(self) -> f64 {
        Fx::to_f64(self)
    }

    fn time_to_secs(t: u64) -> f64 {
        t as f64 / 1e9
    }

    /// Negative and non-finite input maps to zero.
    fn time_from_secs(secs: f64) -> u64 {
        if secs.is_finite() && secs > 0.0 {
            (secs * 1e9).round() as u64
        } else {
            0
        }
    }

    fn try_add(self, rhs: Self) -> Result<Self, NumericError> {
        self.0.checked_add(rhs.0).map(Fx).ok_or(NumericError::Overflow)
    }

    fn try_sub(self, rhs: Self) -> Result<Self, NumericError> {
        self.0.checked_sub(rhs.0).map(Fx).ok_or(NumericError::Overflow)
    }

    fn try_mul(self, rhs: Self) -> Result<Self, NumericError> {
        self.checked_mul(rhs).ok_or(NumericError::Overflow)
    }

    fn abs(self) -> Self {
        Fx(self.0.saturating_abs())
    }

    fn sqrt(self) -> Self {
        Fx::sqrt(self)
    }

    fn exp2(self) -> Result<Self, NumericError> {
        Fx::exp2(self)
    }

    fn log2(self) -> Result<Self, NumericError> {
        Fx::log2(self)
    }

    fn pow(self, exp: Self) -> Result<Self, NumericError> {
        Fx::pow(self, exp)
    }

    fn span(from: u64, to: u64) -> Result<Self, NumericError> {
        if to >= from {
            seconds_from_nanos(to - from)
        } else {
            Ok(-seconds_from_nanos(from - to)?)
        }
    }

    /// The exponent is formed in 64 bits and rejected if it would wrap.
    fn decay(lambda: Self, dt: Self) -> Result<Self, NumericError> {
        let exponent = lambda
            .checked_mul(dt)
            .ok_or(NumericError::ExponentOutOfRange)?;
        (-exponent).exp2()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Fx, b: f64, tol: f64) -> bool {
        (a.to_f64() - b).abs() <= tol
    }

    #[test]
    fn conversion_round_trip_within_half_ulp() {
        for x in [0.0, 1.0, -1.0, 1.1234567, -0.1234567, 1234.5678, -32767.5, 32767.99] {
            let back = Fx::from_f64(x).to_f64();
            assert!((back - x).abs() <= 0.5 / 65536.0 + 1e-12, "{x} -> {back}");
        }
    }

    #[test]
    fn lambdas_match_kernel_table() {
        let raw: Vec<i32> = [5.0, 3.0, 1.0, 0.1, 0.01]
            .iter()
            .map(|&l| Fx::from_f64(l).raw())
            .collect();
        assert_eq!(raw, vec![327680, 196608, 65536, 6554, 655]);
    }

    #[test]
    fn mul_and_div() {
        let u = Fx::from_f64(1.1234567);
        let v = Fx::from_f64(0.1234567);
        assert!(close(u * v, 1.1234567 * 0.1234567, 5e-5));
        assert!(close(u / v, 1.1234567 / 0.1234567, 2e-3));
        assert!(close(u + v, 1.2469134, 5e-5));
        assert!(close(u - v, 1.0, 5e-5));
    }

    #[test]
    fn div_by_zero_saturates() {
        assert_eq!(Fx::ONE / Fx::ZERO, Fx::MAX);
        assert_eq!(-Fx::ONE / Fx::ZERO, Fx::MIN);
        assert_eq!(Fx::ZERO / Fx::ZERO, Fx::ZERO);
    }

    #[test]
    fn mul_saturates_instead_of_wrapping() {
        let big = Fx::from_int(30000);
        assert_eq!(big * big, Fx::MAX);
        assert_eq!(big.checked_mul(big), None);
    }

    #[test]
    fn checked_ops_report_overflow() {
        let big = Fx::from_int(30000);
        assert_eq!(big.try_add(big), Err(NumericError::Overflow));
        assert_eq!((-big).try_sub(big), Err(NumericError::Overflow));
        assert_eq!(big.try_mul(big), Err(NumericError::Overflow));
        assert_eq!(Fx::ONE.try_add(Fx::ONE), Ok(Fx::from_int(2)));
        assert_eq!(Fx::from_int(100).try_mul(Fx::from_int(100)), Ok(Fx::from_int(10000)));
    }

    #[test]
    fn log2_accuracy_over_whole_range() {
        let raws = (1..1 << 18).chain((1 << 18..i32::MAX).step_by(997)).chain([i32::MAX]);
        for raw in raws {
            let q = Fx::from_raw(raw);
            let got = q.log2().unwrap();
            assert!(
                close(got, q.to_f64().log2(), 7.7e-6),
                "log2({q:?}) = {got:?}"
            );
        }
        assert!(Fx::ZERO.log2().is_err());
        assert!(Fx::from_int(-2).log2().is_err());
    }

    #[test]
    fn exp2_accuracy_over_whole_range() {
        for raw in EXP2_FLOOR..EXP2_LIMIT {
            let x = Fx::from_raw(raw);
            let got = x.exp2().unwrap().to_f64();
            let want = x.to_f64().exp2();
            assert!(
                (got - want).abs() <= 0.5 / 65536.0 + 3e-9 * want,
                "exp2({x:?}) = {got}, want {want}"
            );
        }
    }

    #[test]
    fn exp2_range() {
        assert_eq!(Fx::from_int(-15).exp2().unwrap(), Fx::from_raw(2));
        assert_eq!(Fx::from_int(-17).exp2().unwrap(), Fx::EPSILON);
        assert_eq!(Fx::from_raw(EXP2_FLOOR - 1).exp2().unwrap(), Fx::ZERO);
        assert_eq!(Fx::from_int(-200).exp2().unwrap(), Fx::ZERO);
        assert_eq!(Fx::ZERO.exp2().unwrap(), Fx::ONE);
        assert_eq!(Fx::from_int(14).exp2().unwrap(), Fx::from_int(16384));
        assert_eq!(
            Fx::from_int(15).exp2(),
            Err(NumericError::ExponentOutOfRange)
        );
    }

    #[test]
    fn pow_matches_float() {
        let got = Fx::from_f64(1.1234567).pow(Fx::from_f64(0.1234567)).unwrap();
        assert!(close(got, 1.1234567f64.powf(0.1234567), 1e-3));
        assert_eq!(Fx::ZERO.pow(Fx::ONE).unwrap(), Fx::ZERO);
        assert!(Fx::from_int(-1).pow(Fx::ONE).is_err());
    }

    #[test]
    fn sqrt_accuracy() {
        for x in [0.0, 0.25, 1.0, 2.0, 100.0, 12345.0, 32767.0] {
            let got = Fx::from_f64(x).sqrt();
            assert!(close(got, x.sqrt(), 1e-4), "sqrt({x}) = {got}");
        }
        assert_eq!(Fx::from_int(-4).sqrt(), Fx::ZERO);
    }

    #[test]
    fn nanos_to_seconds() {
        assert_eq!(seconds_from_nanos(0).unwrap(), Fx::ZERO);
        assert_eq!(seconds_from_nanos(2_000_000_000).unwrap(), Fx::from_int(2));
        assert!(close(seconds_from_nanos(1_500_000_000).unwrap(), 1.5, 1e-4));
        // below the 1e-4 s resolution
        assert_eq!(seconds_from_nanos(50_000).unwrap(), Fx::ZERO);
        assert!(seconds_from_nanos(40_000 * 1_000_000_000).is_err());
    }

    #[test]
    fn span_is_signed() {
        let fwd = <Fx as Numeric>::span(1_000_000_000, 3_000_000_000).unwrap();
        let back = <Fx as Numeric>::span(3_000_000_000, 1_000_000_000).unwrap();
        assert_eq!(fwd, Fx::from_int(2));
        assert_eq!(back, Fx::from_int(-2));
    }

    #[test]
    fn decay_rejects_wrapping_exponent() {
        let lambda = Fx::from_int(5);
        let dt = Fx::from_int(10_000);
        assert_eq!(
            <Fx as Numeric>::decay(lambda, dt),
            Err(NumericError::ExponentOutOfRange)
        );
    }

    #[test]
    fn decay_underflows_to_zero_for_long_gaps() {
        let f = <Fx as Numeric>::decay(Fx::from_int(5), Fx::from_int(100)).unwrap();
        assert_eq!(f, Fx::ZERO);
    }

    #[test]
    fn decay_split_matches_combined() {
        let lambda = Fx::ONE;
        let whole = <Fx as Numeric>::decay(lambda, Fx::from_f64(1.5)).unwrap();
        let split = <Fx as Numeric>::decay(lambda, Fx::from_f64(0.5)).unwrap()
            * <Fx as Numeric>::decay(lambda, Fx::ONE).unwrap();
        assert!((whole.to_f64() - split.to_f64()).abs() < 1e-3);
        assert!((whole.to_f64() - (-1.5f64).exp2()).abs() < 1e-3);
    }
}
