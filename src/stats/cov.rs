//! 2-D damped statistics between two streams.

use super::clock::decay_and_add;
use super::extrapolator::Extrapolator;
use super::incstat::Moments;
use super::Timescales;
use crate::error::NumericError;
use crate::numeric::Numeric;

/// Which endpoint of a 2-D accumulator an update comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    First,
    Second,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::First => 0,
            Side::Second => 1,
        }
    }

    fn other(self) -> Side {
        match self {
            Side::First => Side::Second,
            Side::Second => Side::First,
        }
    }
}

/// Damped residual cross-product between two streams, one per timescale.
///
/// Endpoints are stream handles owned by the database; the accumulator
/// itself never holds references to them.
#[derive(Debug, Clone)]
pub struct IncStatCov<S: Numeric> {
    lambdas: Timescales<S>,
    endpoints: [usize; 2],
    cf3: Vec<S>,
    w3: Vec<S>,
    last_update: S::Time,
    extrapolators: [Extrapolator<S>; 2],
}

impl<S: Numeric> IncStatCov<S> {
    pub fn new(first: usize, second: usize, lambdas: Timescales<S>, init_time: S::Time) -> Self {
        let n = lambdas.len();
        Self {
            endpoints: [first, second],
            cf3: vec![S::ZERO; n],
            w3: vec![S::EPSILON; n],
            last_update: init_time,
            extrapolators: [Extrapolator::new(), Extrapolator::new()],
            lambdas,
        }
    }

    pub fn endpoints(&self) -> [usize; 2] {
        self.endpoints
    }

    /// Rewrites the endpoint handle `from` to `to`, keeping its side.
    pub(crate) fn relabel(&mut self, from: usize, to: usize) {
        for end in &mut self.endpoints {
            if *end == from {
                *end = to;
            }
        }
    }

    /// Side of `stream`, if it is an endpoint.
    pub fn side_of(&self, stream: usize) -> Option<Side> {
        if self.endpoints[0] == stream {
            Some(Side::First)
        } else if self.endpoints[1] == stream {
            Some(Side::Second)
        } else {
            None
        }
    }

    pub fn connects(&self, stream: usize) -> bool {
        self.side_of(stream).is_some()
    }

    pub fn weight(&self) -> &[S] {
        &self.w3
    }

    pub fn last_update(&self) -> S::Time {
        self.last_update
    }

    /// Folds in an update of the `side` endpoint, which has already
    /// inserted `value` at `t` into its own 1-D accumulator.
    ///
    /// The other endpoint's value at `t` is predicted from the other
    /// endpoint's extrapolator, never from the one `value` is inserted
    /// into: each extrapolator holds only its own endpoint's samples, so
    /// the estimate is never a prediction of the updating stream itself.
    /// Both residuals are centred on each endpoint's current mean. On
    /// error, overflow included, nothing is modified.
    pub fn update_cov(
        &mut self,
        side: Side,
        value: S,
        t: S::Time,
        first: &Moments<S>,
        second: &Moments<S>,
    ) -> Result<(), NumericError> {
        let dt = S::span(self.last_update, t)?;
        let other_estimate = self.extrapolators[side.other().index()].predict(t)?;

        let (own_mean, other_mean) = match side {
            Side::First => (&first.mean, &second.mean),
            Side::Second => (&second.mean, &first.mean),
        };
        let advanced = decay_and_add(
            self.lambdas.as_slice(),
            dt,
            [&mut self.cf3[..], &mut self.w3[..]],
            |i| {
                let own = value.try_sub(own_mean[i])?;
                let other = other_estimate.try_sub(other_mean[i])?;
                Ok([own.try_mul(other)?, S::ONE])
            },
        )?;
        if advanced {
            self.last_update = t;
        }
        self.extrapolators[side.index()].insert(t, value);
        Ok(())
    }

    pub fn covariance(&self) -> Vec<S> {
        self.cf3.iter().zip(&self.w3).map(|(&c, &w)| c / w).collect()
    }

    /// Appends radius, magnitude, covariance and correlation, each for
    /// every timescale.
    pub fn emit_2d(&self, first: &Moments<S>, second: &Moments<S>, out: &mut Vec<f64>) -> usize {
        let n = self.cf3.len();
        let start = out.len();
        out.extend((0..n).map(|i| (first.var[i] + second.var[i]).sqrt().to_f64()));
        out.extend((0..n).map(|i| {
            let (m1, m2) = (first.mean[i], second.mean[i]);
            (m1 * m1 + m2 * m2).sqrt().to_f64()
        }));
        out.extend((0..n).map(|i| (self.cf3[i] / self.w3[i]).to_f64()));
        out.extend((0..n).map(|i| self.pcc(i, first, second).to_f64()));
        out.len() - start
    }

    /// Correlation coefficient for timescale `i`; zero when either
    /// endpoint has no spread.
    pub fn pcc(&self, i: usize, first: &Moments<S>, second: &Moments<S>) -> S {
        let ss = first.std[i] * second.std[i];
        if ss < S::EPSILON {
            return S::ZERO;
        }
        (self.cf3[i] / (self.w3[i] * ss)).clamp(-S::ONE, S::ONE)
    }
}
