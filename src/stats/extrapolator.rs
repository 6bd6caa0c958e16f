//! Lagrange extrapolation over the last few samples of one stream.
//!
//! Used by a 2-D accumulator to estimate what one endpoint's value would
//! be at the instant the other endpoint updated.

use super::ring::{RingBuffer, CAPACITY};
use crate::error::NumericError;
use crate::numeric::Numeric;

/// Predictions further out than this many mean sample gaps fall back to
/// the last observed value.
const MAX_GAP_RATIO: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default)]
struct Sample<S: Numeric> {
    t: S::Time,
    v: S,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Extrapolator<S: Numeric> {
    samples: RingBuffer<Sample<S>>,
}

impl<S: Numeric> Extrapolator<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, t: S::Time, v: S) {
        self.samples.insert(Sample { t, v });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Estimated value at `t`.
    ///
    /// Zero with no samples, the sample itself with one, the last sample
    /// when `t` lies more than ten mean gaps past it, and otherwise the
    /// Lagrange polynomial through all stored samples.
    pub fn predict(&self, t: S::Time) -> Result<S, NumericError> {
        let mut buf = [Sample::<S>::default(); CAPACITY];
        let n = self.samples.unroll(&mut buf);
        let pts = &buf[..n];
        let last = match pts {
            [] => return Ok(S::ZERO),
            [only] => return Ok(only.v),
            [.., last] => *last,
        };

        let mut gap_sum = S::ZERO;
        for pair in pts.windows(2) {
            gap_sum = gap_sum + S::span(pair[0].t, pair[1].t)?;
        }
        let mean_gap = gap_sum / S::from_f64((n - 1) as f64);
        if mean_gap * S::from_f64(MAX_GAP_RATIO) < S::span(last.t, t)? {
            return Ok(last.v);
        }

        let mut estimate = S::ZERO;
        for (i, pi) in pts.iter().enumerate() {
            let mut term = pi.v;
            for (j, pj) in pts.iter().enumerate() {
                if i == j {
                    continue;
                }
                term = term * (S::span(pj.t, t)? / (S::span(pj.t, pi.t)? + S::EPSILON));
            }
            estimate = estimate + term;
        }
        Ok(estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::Fx;

    #[test]
    fn empty_and_single() {
        let mut ex = Extrapolator::<f64>::new();
        assert_eq!(ex.predict(3.0).unwrap(), 0.0);
        ex.insert(1.0, 42.0);
        assert_eq!(ex.predict(3.0).unwrap(), 42.0);
    }

    #[test]
    fn linear_trend_is_extended() {
        let mut ex = Extrapolator::<f64>::new();
        ex.insert(0.0, 1.0);
        ex.insert(1.0, 3.0);
        ex.insert(2.0, 5.0);
        let v = ex.predict(3.0).unwrap();
        assert!((v - 7.0).abs() < 1e-9);
    }

    #[test]
    fn quadratic_through_three_points() {
        let mut ex = Extrapolator::<f64>::new();
        for t in [1.0, 2.0, 3.0] {
            ex.insert(t, t * t);
        }
        assert!((ex.predict(4.0).unwrap() - 16.0).abs() < 1e-9);
    }

    #[test]
    fn long_silence_returns_last_value() {
        let mut ex = Extrapolator::<f64>::new();
        ex.insert(0.0, 1.0);
        ex.insert(1.0, 2.0);
        assert_eq!(ex.predict(50.0).unwrap(), 2.0);
        // exactly ten gaps is still extrapolated
        assert!((ex.predict(11.0).unwrap() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn coincident_timestamps_stay_finite() {
        let mut ex = Extrapolator::<f64>::new();
        ex.insert(1.0, 2.0);
        ex.insert(1.0, 4.0);
        assert!(ex.predict(1.0).unwrap().is_finite());
    }

    #[test]
    fn fixed_point_linear_trend() {
        let mut ex = Extrapolator::<Fx>::new();
        ex.insert(0, Fx::from_int(1));
        ex.insert(1_000_000_000, Fx::from_int(3));
        ex.insert(2_000_000_000, Fx::from_int(5));
        let v = ex.predict(3_000_000_000).unwrap();
        assert!((v.to_f64() - 7.0).abs() < 1e-2);
    }
}
