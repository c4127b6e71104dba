/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Point queries between and beyond stored samples.
//!
//! Evaluation happens in two steps. [`locate`] resolves a query value
//! against one sorted argument to a [`Bracket`]: a single stored
//! sample, or a weighted pair of samples. [`evaluate`] then combines
//! the brackets of all arguments, resolving the first argument
//! outermost, and blends component values with [`lerp`].

use std::cmp::Ordering;

use crate::array::insertion_index_by;
use crate::error::Error;
use crate::value::Value;
use crate::variable::ExtrapolationType;
use crate::variable::InterpolationType;

/// Where a query falls on one argument.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Bracket {
    /// Use the sample at this index.
    Sample(usize),
    /// Blend the samples at `lo` and `hi`: `v[lo] + (v[hi] - v[lo]) *
    /// weight`. The weight lies outside `[0, 1]` when extrapolating.
    Between { lo: usize, hi: usize, weight: f64 },
}

/// Resolves `query` against the sorted samples `args` of the argument
/// `variable`.
///
/// An exact match is returned as-is. Inside the stored range,
/// `interpolation` decides; outside it, `extrapolation` does, and
/// [`ExtrapolationType::None`] fails with [`Error::OutOfRange`].
/// Arguments without a numeric axis (text) only support exact
/// matches, left-hold interpolation and constant extrapolation.
pub fn locate(
    variable: &str,
    args: &[Value],
    query: &Value,
    interpolation: InterpolationType,
    extrapolation: ExtrapolationType,
) -> Result<Bracket, Error> {
    let not_found = || Error::ValueNotFound {
        variable: variable.to_string(),
        value: query.clone(),
    };
    let Some(first) = args.first() else {
        return Err(not_found());
    };
    query.expect_kind(first.kind())?;

    let i = insertion_index_by(args, |x| x.try_cmp(query).unwrap_or(Ordering::Greater));
    if i < args.len() && args[i].try_cmp(query)? == Ordering::Equal {
        return Ok(Bracket::Sample(i));
    }

    let positions: Option<Vec<f64>> = args.iter().map(Value::to_f64).collect();
    match (positions, query.to_f64()) {
        (Some(xs), Some(q)) if !q.is_nan() => {
            locate_position(&xs, q, interpolation, extrapolation).ok_or_else(|| {
                tracing::debug!(variable, query = %query, "query outside argument range");
                Error::OutOfRange {
                    variable: variable.to_string(),
                    value: query.clone(),
                }
            })
        }
        (Some(_), Some(_)) => Err(not_found()),
        _ => {
            // No numeric axis: only policies that pick a stored sample.
            let n = args.len();
            let outside = i == 0 || i == n;
            match (outside, interpolation, extrapolation) {
                (false, InterpolationType::Constant, _) => Ok(Bracket::Sample(i - 1)),
                (true, _, ExtrapolationType::None) => Err(Error::OutOfRange {
                    variable: variable.to_string(),
                    value: query.clone(),
                }),
                (true, _, ExtrapolationType::Constant) => {
                    Ok(Bracket::Sample(if i == 0 { 0 } else { n - 1 }))
                }
                _ => Err(not_found()),
            }
        }
    }
}

/// [`locate`] on numeric positions. `None` means the query is out of
/// range and `extrapolation` is [`ExtrapolationType::None`].
pub fn locate_position(
    xs: &[f64],
    q: f64,
    interpolation: InterpolationType,
    extrapolation: ExtrapolationType,
) -> Option<Bracket> {
    let (&first, &last) = (xs.first()?, xs.last()?);
    let n = xs.len();

    if q < first || q > last {
        let below = q < first;
        return match extrapolation {
            ExtrapolationType::None => None,
            ExtrapolationType::Constant => Some(Bracket::Sample(if below { 0 } else { n - 1 })),
            ExtrapolationType::Linear if n == 1 => Some(Bracket::Sample(0)),
            ExtrapolationType::Linear => {
                let (lo, hi) = if below { (0, 1) } else { (n - 2, n - 1) };
                Some(between(xs, lo, hi, q))
            }
            ExtrapolationType::Periodic => {
                let span = last - first;
                if span <= 0.0 {
                    return Some(Bracket::Sample(0));
                }
                let wrapped = first + (q - first).rem_euclid(span);
                Some(within(xs, wrapped, interpolation))
            }
        };
    }
    Some(within(xs, q, interpolation))
}

// `q` lies in `[xs[0], xs[n - 1]]`.
fn within(xs: &[f64], q: f64, interpolation: InterpolationType) -> Bracket {
    let n = xs.len();
    let i = xs.partition_point(|x| *x < q);
    if i >= n {
        return Bracket::Sample(n - 1);
    }
    if xs[i] == q || i == 0 {
        return Bracket::Sample(i);
    }
    let (lo, hi) = (i - 1, i);
    match interpolation {
        InterpolationType::Constant => Bracket::Sample(lo),
        InterpolationType::None => {
            if q - xs[lo] <= xs[hi] - q {
                Bracket::Sample(lo)
            } else {
                Bracket::Sample(hi)
            }
        }
        InterpolationType::Linear => between(xs, lo, hi, q),
    }
}

fn between(xs: &[f64], lo: usize, hi: usize, q: f64) -> Bracket {
    let dx = xs[hi] - xs[lo];
    if dx == 0.0 {
        return Bracket::Sample(lo);
    }
    Bracket::Between {
        lo,
        hi,
        weight: (q - xs[lo]) / dx,
    }
}

/// `lo + (hi - lo) * weight`, in the kind of `lo`. Integers and
/// date/times are rounded; text cannot be blended.
pub fn lerp(lo: &Value, hi: &Value, weight: f64) -> Result<Value, Error> {
    hi.expect_kind(lo.kind())?;
    match (lo.to_f64(), hi.to_f64()) {
        (Some(a), Some(b)) => Value::from_f64(lo.kind(), a + (b - a) * weight),
        _ => Err(Error::unsupported(format!(
            "cannot interpolate {} values",
            lo.kind()
        ))),
    }
}

/// Evaluates a component at the point described by one bracket per
/// argument. `sample` reads the stored component value at a full
/// multi-index.
pub fn evaluate<F>(brackets: &[Bracket], sample: F) -> Result<Value, Error>
where
    F: Fn(&[usize]) -> Result<Value, Error>,
{
    let mut index = Vec::with_capacity(brackets.len());
    evaluate_from(brackets, &mut index, &sample)
}

fn evaluate_from<F>(brackets: &[Bracket], index: &mut Vec<usize>, sample: &F) -> Result<Value, Error>
where
    F: Fn(&[usize]) -> Result<Value, Error>,
{
    let Some((bracket, rest)) = brackets.split_first() else {
        return sample(index);
    };
    match *bracket {
        Bracket::Sample(i) => {
            index.push(i);
            let value = evaluate_from(rest, index, sample);
            index.pop();
            value
        }
        Bracket::Between { lo, hi, weight } => {
            index.push(lo);
            let a = evaluate_from(rest, index, sample);
            index.pop();
            index.push(hi);
            let b = evaluate_from(rest, index, sample);
            index.pop();
            lerp(&a?, &b?, weight)
        }
    }
}
