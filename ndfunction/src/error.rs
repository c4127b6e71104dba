/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use crate::shape::ShapeError;
use crate::value::Value;
use crate::value::ValueKind;

/// The type of error for array, view, filter and function operations.
///
/// None of these are transient: they describe a request that does not
/// fit the data, and are returned to the caller unchanged.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A multi-index or flat index outside the shape.
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("incompatible filters: {reason}")]
    IncompatibleFilter { reason: String },

    #[error("invalid filter: {reason}")]
    InvalidFilter { reason: String },

    #[error("shape mismatch for `{variable}`: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        variable: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("value {value} not found in `{variable}`")]
    ValueNotFound { variable: String, value: Value },

    #[error("value {value} is outside the range of `{variable}`")]
    OutOfRange { variable: String, value: Value },

    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },

    #[error("unsupported operation: {reason}")]
    UnsupportedOperation { reason: String },

    #[error("stale view: created at generation {expected}, storage is at generation {found}")]
    StaleView { expected: u64, found: u64 },

    #[error("kind mismatch: expected {expected}, got {got}")]
    KindMismatch { expected: ValueKind, got: ValueKind },

    #[error("unknown variable {id}")]
    UnknownVariable { id: usize },

    #[error("component {index} out of range for {count} components")]
    NoSuchComponent { index: usize, count: usize },

    #[error("values of `{variable}` are not sorted")]
    NotSorted { variable: String },
}

impl Error {
    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        Error::UnsupportedOperation {
            reason: reason.into(),
        }
    }

    pub(crate) fn incompatible(reason: impl Into<String>) -> Self {
        Error::IncompatibleFilter {
            reason: reason.into(),
        }
    }

    /// Whether this error reports an index outside a shape.
    pub fn is_index_out_of_range(&self) -> bool {
        matches!(
            self,
            Error::Shape(
                ShapeError::IndexOutOfRange { .. } | ShapeError::FlatIndexOutOfRange { .. }
            )
        )
    }
}
