//! Decay clock shared by every accumulator.

use crate::error::NumericError;
use crate::numeric::Numeric;

/// Decays every column in place by `2^(-λ·dt)` per timescale.
///
/// Returns `Ok(false)` without touching anything when `dt <= 0`: repeated
/// or out-of-order timestamps never decay. When any factor is
/// unrepresentable nothing is modified. The steepest timescale bounds the
/// exponent, so it is checked before the first write.
pub fn decay_in_place<S: Numeric, const K: usize>(
    lambdas: &[S],
    dt: S,
    columns: [&mut [S]; K],
) -> Result<bool, NumericError> {
    if dt <= S::ZERO {
        return Ok(false);
    }
    let Some(steepest) = lambdas.iter().copied().reduce(|a, b| a.max(b)) else {
        return Ok(false);
    };
    S::decay(steepest, dt)?;

    let mut columns = columns;
    for (i, &lambda) in lambdas.iter().enumerate() {
        let factor = S::decay(lambda, dt)?;
        for col in columns.iter_mut() {
            col[i] = col[i] * factor;
        }
    }
    Ok(true)
}

/// Decays every column by `2^(-λ·dt)` and adds one observation.
///
/// `delta(i)` yields the amounts added to the columns at timescale `i`.
/// The first pass computes every new value without writing; the second
/// repeats the same arithmetic and commits. An overflow or an
/// unrepresentable factor therefore leaves all columns untouched. Returns
/// whether the clock advanced (`dt > 0`).
pub fn decay_and_add<S: Numeric, const K: usize>(
    lambdas: &[S],
    dt: S,
    columns: [&mut [S]; K],
    mut delta: impl FnMut(usize) -> Result<[S; K], NumericError>,
) -> Result<bool, NumericError> {
    let advance = dt > S::ZERO;
    let mut columns = columns;
    for commit in [false, true] {
        for (i, &lambda) in lambdas.iter().enumerate() {
            let factor = if advance { S::decay(lambda, dt)? } else { S::ONE };
            let add = delta(i)?;
            for (col, d) in columns.iter_mut().zip(add) {
                let next = (col[i] * factor).try_add(d)?;
                if commit {
                    col[i] = next;
                }
            }
        }
    }
    Ok(advance)
}
