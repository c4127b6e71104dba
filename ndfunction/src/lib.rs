/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Dense N-dimensional arrays and the functional data model built on
//! them.
//!
//! The crate is layered bottom-up:
//!
//! - [`shape`]: row-major stride arithmetic and multi-index iteration;
//! - [`storage`] and [`array`]: owned, resizable dense arrays with
//!   insertion and removal along a dimension;
//! - [`view`]: composable windows, gathers and reductions over arrays;
//! - [`function`]: sorted argument axes mapped to component columns,
//!   with value-addressed reads and writes, [`filter`]-based
//!   projection and [`interpolate`]d point queries.

/// Owned N-dimensional arrays.
pub mod array;

/// Configuration loaded from the environment or YAML.
pub mod config;

mod error;
pub use error::Error;

/// The filter algebra used to project functions.
pub mod filter;

/// Functions over shared variable stores.
pub mod function;

/// Interpolation and extrapolation of point queries.
pub mod interpolate;

/// Change notification for function mutations.
pub mod notify;

/// Shapes, strides and multi-index arithmetic.
pub mod shape;

/// Dense element buffers.
pub mod storage;

/// Property-based generators for randomized test input.
#[cfg(test)]
pub mod strategy;

/// Element values and their kinds.
pub mod value;

/// Variable metadata and evaluation policies.
pub mod variable;

/// Views of arrays.
pub mod view;

pub use array::Array;
pub use config::Config;
pub use filter::Filter;
pub use function::Function;
pub use notify::Change;
pub use notify::ChangeKind;
/// Errors in index arithmetic.
pub use shape::ShapeError;
pub use value::Value;
pub use value::ValueKind;
pub use variable::ExtrapolationType;
pub use variable::InterpolationType;
pub use variable::Variable;
pub use variable::VariableId;
pub use view::ArrayView;
pub use view::ArrayViewMut;
pub use view::ViewSpec;
