//! Numeric back-ends for the statistics engine.
//!
//! Every accumulator is generic over [`Numeric`], so the decay and
//! accumulation logic exists once and runs either on native `f64` (host
//! execution, timestamps in seconds) or on [`Fx`] s15.16 fixed point
//! (packet hot path, timestamps in nanoseconds).

mod fixed;

pub use fixed::{seconds_from_nanos, Fx, FRAC_BITS};

use crate::error::NumericError;
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Arithmetic interface shared by the floating and fixed-point domains.
pub trait Numeric:
    Copy
    + Default
    + PartialOrd
    + Debug
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Timestamp representation of this domain.
    type Time: Copy + Default + PartialOrd + Debug + Send + Sync + 'static;

    const ZERO: Self;
    const ONE: Self;
    /// Smallest positive offset used to keep divisors non-zero.
    const EPSILON: Self;

    fn from_f64(x: f64) -> Self;
    fn to_f64(self) -> f64;
    fn time_to_secs(t: Self::Time) -> f64;
    fn time_from_secs(secs: f64) -> Self::Time;

    /// Addition that reports `Overflow` instead of saturating.
    fn try_add(self, rhs: Self) -> Result<Self, NumericError>;
    fn try_sub(self, rhs: Self) -> Result<Self, NumericError>;
    fn try_mul(self, rhs: Self) -> Result<Self, NumericError>;

    fn abs(self) -> Self;
    /// Square root; negative input yields zero.
    fn sqrt(self) -> Self;
    fn exp2(self) -> Result<Self, NumericError>;
    fn log2(self) -> Result<Self, NumericError>;
    /// `self ** exp` for `self >= 0`.
    fn pow(self, exp: Self) -> Result<Self, NumericError>;

    /// Signed elapsed seconds from `from` to `to`.
    fn span(from: Self::Time, to: Self::Time) -> Result<Self, NumericError>;

    /// Decay multiplier `2^(-lambda * dt)`.
    fn decay(lambda: Self, dt: Self) -> Result<Self, NumericError> {
        (-(lambda * dt)).exp2()
    }

    fn max(self, other: Self) -> Self {
        if other > self {
            other
        } else {
            self
        }
    }

    fn clamp(self, lo: Self, hi: Self) -> Self {
        if self < lo {
            lo
        } else if self > hi {
            hi
        } else {
            self
        }
    }
}

fn finite(x: f64) -> Result<f64, NumericError> {
    if x.is_finite() {
        Ok(x)
    } else {
        Err(NumericError::Overflow)
    }
}

impl Numeric for f64 {
    type Time = f64;

    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const EPSILON: Self = 1e-20;

    fn from_f64(x: f64) -> Self {
        x
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn time_to_secs(t: f64) -> f64 {
        t
    }

    fn time_from_secs(secs: f64) -> f64 {
        secs
    }

    fn try_add(self, rhs: Self) -> Result<Self, NumericError> {
        finite(self + rhs)
    }

    fn try_sub(self, rhs: Self) -> Result<Self, NumericError> {
        finite(self - rhs)
    }

    fn try_mul(self, rhs: Self) -> Result<Self, NumericError> {
        finite(self * rhs)
    }

    fn abs(self) -> Self {
        f64::abs(self)
    }

    fn sqrt(self) -> Self {
        if self <= 0.0 {
            0.0
        } else {
            f64::sqrt(self)
        }
    }

    fn exp2(self) -> Result<Self, NumericError> {
        Ok(f64::exp2(self))
    }

    fn log2(self) -> Result<Self, NumericError> {
        if self <= 0.0 {
            return Err(NumericError::Domain("log2 of non-positive value"));
        }
        Ok(f64::log2(self))
    }

    fn pow(self, exp: Self) -> Result<Self, NumericError> {
        if self < 0.0 {
            return Err(NumericError::Domain("pow of negative base"));
        }
        Ok(self.powf(exp))
    }

    fn span(from: f64, to: f64) -> Result<Self, NumericError> {
        Ok(to - from)
    }

    fn decay(lambda: Self, dt: Self) -> Result<Self, NumericError> {
        Ok(f64::exp2(-lambda * dt))
    }
}
