//! 1-D damped incremental statistics for one stream.

use super::clock::{decay_and_add, decay_in_place};
use super::Timescales;
use crate::error::NumericError;
use crate::numeric::Numeric;
use serde::{Deserialize, Serialize};

/// What a stream accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// The supplied value (packet size, ...)
    #[default]
    Value,
    /// The inter-arrival time; the supplied value is ignored
    Temporal,
}

impl StreamKind {
    /// Value actually accumulated for an update arriving `dt` after the last decay.
    pub fn observed<S: Numeric>(self, value: S, dt: S) -> S {
        match self {
            StreamKind::Value => value,
            StreamKind::Temporal => dt.max(S::ZERO),
        }
    }
}

/// Fills mean, variance and standard deviation from the raw sums.
pub(crate) fn fill_moments<S: Numeric>(
    cf1: &[S],
    cf2: &[S],
    w: &[S],
    mean: &mut [S],
    var: &mut [S],
    std: &mut [S],
) {
    for i in 0..w.len() {
        mean[i] = cf1[i] / w[i];
        // decay rounding can push this slightly negative
        var[i] = (cf2[i] / w[i] - mean[i] * mean[i]).abs();
        std[i] = var[i].sqrt();
    }
}

/// Derived per-timescale statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Moments<S> {
    pub mean: Vec<S>,
    pub var: Vec<S>,
    pub std: Vec<S>,
}

impl<S: Numeric> Moments<S> {
    fn zeroed(n: usize) -> Self {
        Self {
            mean: vec![S::ZERO; n],
            var: vec![S::ZERO; n],
            std: vec![S::ZERO; n],
        }
    }
}

/// Exponentially damped weight, linear sum and square sum per timescale.
#[derive(Debug, Clone)]
pub struct IncStat<S: Numeric> {
    id: String,
    lambdas: Timescales<S>,
    cf1: Vec<S>,
    cf2: Vec<S>,
    w: Vec<S>,
    last_update: S::Time,
    kind: StreamKind,
    moments: Moments<S>,
    fresh: bool,
    /// Handles of the 2-D accumulators this stream takes part in
    pub(crate) links: Vec<usize>,
}

impl<S: Numeric> IncStat<S> {
    pub fn new(id: impl Into<String>, lambdas: Timescales<S>, init_time: S::Time, kind: StreamKind) -> Self {
        let n = lambdas.len();
        Self {
            id: id.into(),
            cf1: vec![S::ZERO; n],
            cf2: vec![S::ZERO; n],
            // non-zero so ratios are defined before the first insert
            w: vec![S::EPSILON; n],
            last_update: init_time,
            kind,
            moments: Moments::zeroed(n),
            fresh: false,
            links: Vec::new(),
            lambdas,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn last_update(&self) -> S::Time {
        self.last_update
    }

    pub fn weight(&self) -> &[S] {
        &self.w
    }

    pub fn linear_sum(&self) -> &[S] {
        &self.cf1
    }

    pub fn square_sum(&self) -> &[S] {
        &self.cf2
    }

    /// Number of 2-D accumulators referencing this stream.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Decays to `t` and adds `value`.
    ///
    /// On error the stream is unchanged, including when a sum would leave
    /// the representable range.
    pub fn insert(&mut self, value: S, t: S::Time) -> Result<(), NumericError> {
        let dt = S::span(self.last_update, t)?;
        let value = self.kind.observed(value, dt);
        let square = value.try_mul(value)?;
        let advanced = decay_and_add(
            self.lambdas.as_slice(),
            dt,
            [&mut self.cf1[..], &mut self.cf2[..], &mut self.w[..]],
            |_| Ok([value, square, S::ONE]),
        )?;
        if advanced {
            self.last_update = t;
        }
        self.fresh = false;
        Ok(())
    }

    /// Applies decay up to `t` without adding an observation.
    pub fn process_decay(&mut self, t: S::Time) -> Result<(), NumericError> {
        let dt = S::span(self.last_update, t)?;
        self.decay_to(t, dt)
    }

    fn decay_to(&mut self, t: S::Time, dt: S) -> Result<(), NumericError> {
        let decayed = decay_in_place(
            self.lambdas.as_slice(),
            dt,
            [&mut self.cf1[..], &mut self.cf2[..], &mut self.w[..]],
        )?;
        if decayed {
            self.last_update = t;
            self.fresh = false;
        }
        Ok(())
    }

    /// Recomputes the derived statistics if an update invalidated them.
    pub fn refresh(&mut self) {
        if self.fresh {
            return;
        }
        let m = &mut self.moments;
        fill_moments(&self.cf1, &self.cf2, &self.w, &mut m.mean, &mut m.var, &mut m.std);
        self.fresh = true;
    }

    pub fn moments(&mut self) -> &Moments<S> {
        self.refresh();
        &self.moments
    }

    /// Moments as of the last `refresh`.
    pub(crate) fn cached_moments(&self) -> &Moments<S> {
        debug_assert!(self.fresh, "moments read before refresh");
        &self.moments
    }

    pub fn mean(&mut self) -> &[S] {
        &self.moments().mean
    }

    pub fn variance(&mut self) -> &[S] {
        &self.moments().var
    }

    pub fn std(&mut self) -> &[S] {
        &self.moments().std
    }

    /// Appends all weights, then all means, then all variances.
    pub fn emit_1d(&mut self, out: &mut Vec<f64>) -> usize {
        self.refresh();
        let start = out.len();
        out.extend(self.w.iter().map(|v| v.to_f64()));
        out.extend(self.moments.mean.iter().map(|v| v.to_f64()));
        out.extend(self.moments.var.iter().map(|v| v.to_f64()));
        out.len() - start
    }
}
