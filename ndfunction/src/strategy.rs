/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Property-based generators for shapes, view chains and argument
//! grids.
//!
//! This module is only included in test builds (`#[cfg(test)]`).

use std::collections::BTreeSet;

use proptest::prelude::*;

/// Generates a shape with between 1 and `max_dims` dimensions, each of
/// size between 1 and `max_len` (inclusive).
pub fn gen_shape(max_dims: usize, max_len: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1..=max_len, 1..=max_dims)
}

/// Generates a strictly increasing sequence of up to `max_len`
/// integers, suitable as the values of a sorted argument.
pub fn gen_sorted_values(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::btree_set(-1000i64..1000, 1..=max_len)
        .prop_map(|set: BTreeSet<i64>| set.into_iter().collect())
}

/// One step of a view chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewOp {
    Window { dim: usize, start: usize, end: usize },
    Gather { dim: usize, indexes: Vec<usize> },
    Reduce { dim: usize, index: usize },
}

impl ViewOp {
    /// Interprets a random `seed` as an op valid for a view of shape
    /// `shape`. Returns `None` if the view has no dimension left to
    /// operate on.
    pub fn from_seed(shape: &[usize], seed: &(u8, usize, usize, Vec<usize>)) -> Option<ViewOp> {
        let (kind, a, b, c) = seed;
        if shape.is_empty() {
            return None;
        }
        let dim = a % shape.len();
        let len = shape[dim];
        if len == 0 {
            return None;
        }
        let op = match kind % 3 {
            0 => {
                let start = b % len;
                let extra = c.first().copied().unwrap_or(0) % (len - start);
                ViewOp::Window {
                    dim,
                    start,
                    end: start + extra,
                }
            }
            1 if !c.is_empty() => ViewOp::Gather {
                dim,
                indexes: c.iter().map(|i| i % len).collect(),
            },
            _ => ViewOp::Reduce { dim, index: b % len },
        };
        Some(op)
    }
}
