//! Damped incremental statistics: 1-D per stream, 2-D per stream pair.

mod clock;
mod cov;
mod db;
mod extrapolator;
mod incstat;
mod ring;

pub use clock::{decay_and_add, decay_in_place};
pub use cov::{IncStatCov, Side};
pub use db::IncStatDB;
pub use extrapolator::Extrapolator;
pub use incstat::{IncStat, Moments, StreamKind};
pub use ring::{RingBuffer, CAPACITY};

pub(crate) use incstat::fill_moments;

use crate::config::DEFAULT_TIMESCALES;
use crate::numeric::Numeric;
use std::sync::Arc;

/// Decay rates shared by every accumulator of one extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct Timescales<S>(Arc<[S]>);

impl<S: Numeric> Timescales<S> {
    pub fn new(lambdas: impl IntoIterator<Item = f64>) -> Self {
        Self(lambdas.into_iter().map(S::from_f64).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[S] {
        &self.0
    }
}

impl<S: Numeric> Default for Timescales<S> {
    fn default() -> Self {
        Self::new(DEFAULT_TIMESCALES)
    }
}
