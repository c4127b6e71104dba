/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The filter algebra.
//!
//! A [`Filter`] names one variable of a function and says how to slice
//! it: by argument values, by index windows, by down-sampling, by
//! removing the dimension entirely, or (for components) by picking the
//! column. Filters on the same variable combine with
//! [`Filter::intersect`]; [`crate::Function::filter`] applies a set of
//! filters and returns the projected function.
//!
//! Intersection is defined between filters of the same kind:
//!
//! | self ∩ other | result |
//! |---|---|
//! | range ∩ range | `[max(min), min(max)]`, possibly inverted |
//! | ranges ∩ range(s) | pairwise window intersections, non-empty, in order |
//! | values ∩ values | values in both, in `self`'s order |
//! | component ∩ component | component |
//! | reduce ∩ reduce | reduce |
//! | aggregation ∩ aggregation | itself, if equal |
//!
//! Every other pair is [`Error::IncompatibleFilter`].

use std::cmp::Ordering;

use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::shape::ShapeError;
use crate::value::Value;
use crate::variable::VariableId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Select the component as a column; no index restriction.
    Component(VariableId),
    /// Restrict an argument to the given values, in the given order.
    Values {
        variable: VariableId,
        values: Vec<Value>,
    },
    /// Restrict an argument to the index window `[min, max]`.
    IndexRange {
        variable: VariableId,
        min: usize,
        max: usize,
    },
    /// Restrict an argument to the concatenation of the index windows
    /// `ranges`, in order.
    IndexRanges {
        variable: VariableId,
        ranges: Vec<(usize, usize)>,
    },
    /// Remove an argument's dimension. The argument must be restricted
    /// to exactly one index.
    Reduce(VariableId),
    /// Down-sample the index window `[start, end]` of an argument by
    /// `step`.
    Aggregation {
        variable: VariableId,
        step: usize,
        start: usize,
        end: usize,
    },
}

/// The indexes a filter selects along its argument's dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    /// The contiguous window `[start, end]`.
    Window { start: usize, end: usize },
    /// An explicit list of indexes.
    Indexes(Vec<usize>),
}

impl Selection {
    pub fn len(&self) -> usize {
        match self {
            Selection::Window { start, end } => end - start + 1,
            Selection::Indexes(indexes) => indexes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn intersect_windows(a: (usize, usize), b: (usize, usize)) -> (usize, usize) {
    (a.0.max(b.0), a.1.min(b.1))
}

impl Filter {
    pub fn component(variable: VariableId) -> Self {
        Filter::Component(variable)
    }

    pub fn value(variable: VariableId, value: impl Into<Value>) -> Self {
        Filter::Values {
            variable,
            values: vec![value.into()],
        }
    }

    pub fn values<I, V>(variable: VariableId, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::Values {
            variable,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn index_range(variable: VariableId, min: usize, max: usize) -> Self {
        Filter::IndexRange { variable, min, max }
    }

    pub fn index_ranges(variable: VariableId, ranges: impl Into<Vec<(usize, usize)>>) -> Self {
        Filter::IndexRanges {
            variable,
            ranges: ranges.into(),
        }
    }

    pub fn reduce(variable: VariableId) -> Self {
        Filter::Reduce(variable)
    }

    pub fn aggregation(variable: VariableId, step: usize, start: usize, end: usize) -> Self {
        Filter::Aggregation {
            variable,
            step,
            start,
            end,
        }
    }

    /// The variable this filter targets.
    pub fn variable(&self) -> VariableId {
        match self {
            Filter::Component(variable)
            | Filter::Values { variable, .. }
            | Filter::IndexRange { variable, .. }
            | Filter::IndexRanges { variable, .. }
            | Filter::Reduce(variable)
            | Filter::Aggregation { variable, .. } => *variable,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Filter::Component(_) => "component",
            Filter::Values { .. } => "value",
            Filter::IndexRange { .. } => "index range",
            Filter::IndexRanges { .. } => "index ranges",
            Filter::Reduce(_) => "reduce",
            Filter::Aggregation { .. } => "aggregation",
        }
    }

    fn windows(&self) -> Option<Vec<(usize, usize)>> {
        match self {
            Filter::IndexRange { min, max, .. } => Some(vec![(*min, *max)]),
            Filter::IndexRanges { ranges, .. } => Some(ranges.clone()),
            _ => None,
        }
    }

    /// The filter selecting what both `self` and `other` select. With
    /// no `other`, a copy of `self`.
    pub fn intersect(&self, other: Option<&Filter>) -> Result<Filter, Error> {
        let Some(other) = other else {
            return Ok(self.clone());
        };
        if self.variable() != other.variable() {
            return Err(Error::incompatible(format!(
                "{} filter on {} cannot intersect filter on {}",
                self.kind_name(),
                self.variable(),
                other.variable()
            )));
        }
        let variable = self.variable();

        match (self, other) {
            (
                Filter::IndexRange { min, max, .. },
                Filter::IndexRange {
                    min: min2,
                    max: max2,
                    ..
                },
            ) => {
                let (min, max) = intersect_windows((*min, *max), (*min2, *max2));
                Ok(Filter::IndexRange { variable, min, max })
            }
            (Filter::IndexRanges { .. }, Filter::IndexRange { .. } | Filter::IndexRanges { .. })
            | (Filter::IndexRange { .. }, Filter::IndexRanges { .. }) => {
                let (ours, theirs) = (
                    self.windows().unwrap_or_default(),
                    other.windows().unwrap_or_default(),
                );
                let ranges = ours
                    .iter()
                    .cartesian_product(theirs.iter())
                    .map(|(a, b)| intersect_windows(*a, *b))
                    .filter(|(min, max)| min <= max)
                    .collect();
                Ok(Filter::IndexRanges { variable, ranges })
            }
            (Filter::Values { values, .. }, Filter::Values { values: others, .. }) => {
                let values = values
                    .iter()
                    .filter(|v| {
                        others
                            .iter()
                            .any(|o| matches!(v.try_cmp(o), Ok(Ordering::Equal)))
                    })
                    .cloned()
                    .collect();
                Ok(Filter::Values { variable, values })
            }
            (Filter::Component(_), Filter::Component(_)) => Ok(Filter::Component(variable)),
            (Filter::Reduce(_), Filter::Reduce(_)) => Ok(Filter::Reduce(variable)),
            (Filter::Aggregation { .. }, Filter::Aggregation { .. }) if self == other => {
                Ok(self.clone())
            }
            _ => Err(Error::incompatible(format!(
                "cannot intersect {} filter with {} filter on {}",
                self.kind_name(),
                other.kind_name(),
                variable
            ))),
        }
    }

    /// Whether this filter selects nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Filter::Component(_) | Filter::Reduce(_) => false,
            Filter::Values { values, .. } => values.is_empty(),
            Filter::IndexRange { min, max, .. } => min > max,
            Filter::IndexRanges { ranges, .. } => ranges.iter().all(|(min, max)| min > max),
            Filter::Aggregation {
                step, start, end, ..
            } => *step == 0 || start > end,
        }
    }

    /// The number of indexes this filter selects, if it selects
    /// indexes and that number does not depend on the data.
    pub fn count(&self) -> Option<usize> {
        match self {
            Filter::Component(_) | Filter::Reduce(_) => None,
            Filter::Values { values, .. } => Some(values.len()),
            Filter::IndexRange { min, max, .. } => Some((max + 1).saturating_sub(*min)),
            Filter::IndexRanges { ranges, .. } => Some(
                ranges
                    .iter()
                    .map(|(min, max)| (max + 1).saturating_sub(*min))
                    .sum(),
            ),
            Filter::Aggregation {
                step, start, end, ..
            } => {
                if *step == 0 || start > end {
                    None
                } else {
                    Some((end - start) / step + 1)
                }
            }
        }
    }

    /// Resolves this filter against `args`, the values of its argument
    /// as currently seen, to the indexes it selects.
    pub fn resolve(&self, name: &str, args: &[Value]) -> Result<Selection, Error> {
        let len = args.len();
        let check = |index: usize| -> Result<(), Error> {
            if index >= len {
                return Err(ShapeError::IndexOutOfRange {
                    dim: 0,
                    index,
                    size: len,
                }
                .into());
            }
            Ok(())
        };
        let window = |min: usize, max: usize| -> Result<(), Error> {
            if min > max {
                return Err(ShapeError::EmptyRange {
                    begin: min,
                    end: max,
                }
                .into());
            }
            check(max)
        };

        match self {
            Filter::Component(_) | Filter::Reduce(_) => Err(Error::unsupported(format!(
                "{} filter does not select indexes",
                self.kind_name()
            ))),
            Filter::IndexRange { min, max, .. } => {
                window(*min, *max)?;
                Ok(Selection::Window {
                    start: *min,
                    end: *max,
                })
            }
            Filter::IndexRanges { ranges, .. } => {
                if ranges.is_empty() {
                    return Err(Error::InvalidFilter {
                        reason: format!("no index ranges for `{name}`"),
                    });
                }
                for (min, max) in ranges {
                    window(*min, *max)?;
                }
                if let [(start, end)] = ranges.as_slice() {
                    return Ok(Selection::Window {
                        start: *start,
                        end: *end,
                    });
                }
                Ok(Selection::Indexes(
                    ranges.iter().flat_map(|(min, max)| *min..=*max).collect(),
                ))
            }
            Filter::Values { values, .. } => {
                if values.is_empty() {
                    return Err(Error::InvalidFilter {
                        reason: format!("no values for `{name}`"),
                    });
                }
                let mut indexes = Vec::with_capacity(values.len());
                for value in values {
                    let mut found = None;
                    for (i, arg) in args.iter().enumerate() {
                        if arg.try_cmp(value)? == Ordering::Equal {
                            found = Some(i);
                            break;
                        }
                    }
                    let index = found.ok_or_else(|| Error::ValueNotFound {
                        variable: name.to_string(),
                        value: value.clone(),
                    })?;
                    indexes.push(index);
                }
                Ok(Selection::Indexes(indexes))
            }
            Filter::Aggregation {
                step, start, end, ..
            } => {
                if *step == 0 {
                    return Err(Error::InvalidFilter {
                        reason: format!("aggregation of `{name}` with step 0"),
                    });
                }
                window(*start, *end)?;
                Ok(Selection::Indexes((*start..=*end).step_by(*step).collect()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const X: VariableId = VariableId(0);
    const Y: VariableId = VariableId(1);

    fn ints(xs: &[i64]) -> Vec<Value> {
        xs.iter().copied().map(Value::from).collect()
    }

    #[test]
    fn test_range_intersection() {
        let a = Filter::index_range(X, 1, 5);
        let b = Filter::index_range(X, 3, 8);
        assert_eq!(a.intersect(Some(&b)).unwrap(), Filter::index_range(X, 3, 5));
        assert_eq!(a.intersect(None).unwrap(), a);

        let disjoint = Filter::index_range(X, 6, 8).intersect(Some(&a)).unwrap();
        assert_eq!(disjoint, Filter::index_range(X, 6, 5));
        assert!(disjoint.is_empty());
        assert_eq!(disjoint.count(), Some(0));
    }

    #[test]
    fn test_different_variables() {
        let a = Filter::index_range(X, 1, 5);
        let b = Filter::index_range(Y, 1, 5);
        assert!(matches!(
            a.intersect(Some(&b)),
            Err(Error::IncompatibleFilter { .. })
        ));
    }

    #[test]
    fn test_ranges_intersection() {
        let a = Filter::index_ranges(X, vec![(0, 2), (5, 9)]);
        let b = Filter::index_ranges(X, vec![(1, 6), (8, 12)]);
        assert_eq!(
            a.intersect(Some(&b)).unwrap(),
            Filter::index_ranges(X, vec![(1, 2), (5, 6), (8, 9)])
        );
        let c = Filter::index_range(X, 3, 4);
        assert_eq!(
            a.intersect(Some(&c)).unwrap(),
            Filter::index_ranges(X, Vec::<(usize, usize)>::new())
        );
        assert!(a.intersect(Some(&c)).unwrap().is_empty());
        assert_eq!(
            c.intersect(Some(&b)).unwrap(),
            Filter::index_ranges(X, vec![(3, 4)])
        );
    }

    #[test]
    fn test_values_intersection() {
        let a = Filter::values(X, [3, 1, 2]);
        let b = Filter::values(X, [2, 3, 7]);
        assert_eq!(a.intersect(Some(&b)).unwrap(), Filter::values(X, [3, 2]));
    }

    #[test]
    fn test_cross_variant_intersection() {
        let pairs = [
            (Filter::component(X), Filter::index_range(X, 0, 1)),
            (Filter::reduce(X), Filter::value(X, 1)),
            (Filter::value(X, 1), Filter::index_range(X, 0, 1)),
            (
                Filter::aggregation(X, 2, 0, 4),
                Filter::index_range(X, 0, 1),
            ),
            (
                Filter::aggregation(X, 2, 0, 4),
                Filter::aggregation(X, 1, 0, 4),
            ),
        ];
        for (a, b) in pairs {
            assert!(matches!(
                a.intersect(Some(&b)),
                Err(Error::IncompatibleFilter { .. })
            ));
        }
        assert_eq!(
            Filter::component(X)
                .intersect(Some(&Filter::component(X)))
                .unwrap(),
            Filter::component(X)
        );
        assert_eq!(
            Filter::reduce(X).intersect(Some(&Filter::reduce(X))).unwrap(),
            Filter::reduce(X)
        );
    }

    #[test]
    fn test_aggregation_count() {
        assert_eq!(Filter::aggregation(X, 2, 0, 4).count(), Some(3));
        assert_eq!(Filter::aggregation(X, 1, 0, 0).count(), Some(1));
        assert_eq!(Filter::aggregation(X, 2, 0, 3).count(), Some(2));
        assert_eq!(Filter::aggregation(X, 0, 0, 3).count(), None);

        let args = ints(&[0, 1, 2, 3, 4]);
        assert_eq!(
            Filter::aggregation(X, 2, 0, 4).resolve("x", &args).unwrap(),
            Selection::Indexes(vec![0, 2, 4])
        );
        assert!(matches!(
            Filter::aggregation(X, 0, 0, 4).resolve("x", &args),
            Err(Error::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_resolve() {
        let args = ints(&[10, 20, 30, 40]);
        assert_eq!(
            Filter::index_range(X, 1, 2).resolve("x", &args).unwrap(),
            Selection::Window { start: 1, end: 2 }
        );
        assert!(
            Filter::index_range(X, 1, 4)
                .resolve("x", &args)
                .unwrap_err()
                .is_index_out_of_range()
        );
        assert!(matches!(
            Filter::index_range(X, 2, 1).resolve("x", &args),
            Err(Error::Shape(ShapeError::EmptyRange { .. }))
        ));
        assert_eq!(
            Filter::index_ranges(X, vec![(2, 3), (0, 0)])
                .resolve("x", &args)
                .unwrap(),
            Selection::Indexes(vec![2, 3, 0])
        );
        assert_eq!(
            Filter::values(X, [40, 10]).resolve("x", &args).unwrap(),
            Selection::Indexes(vec![3, 0])
        );
        assert!(matches!(
            Filter::value(X, 15).resolve("x", &args),
            Err(Error::ValueNotFound { .. })
        ));
        assert!(matches!(
            Filter::value(X, 1.5).resolve("x", &args),
            Err(Error::KindMismatch { .. })
        ));
        assert!(matches!(
            Filter::reduce(X).resolve("x", &args),
            Err(Error::UnsupportedOperation { .. })
        ));
    }
}
