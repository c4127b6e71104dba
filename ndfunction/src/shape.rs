/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Row-major shape and stride arithmetic.
//!
//! A shape `[d₀, d₁, ..., dₖ₋₁]` is laid out densely in row-major
//! order, so the flat position of a multi-index is
//!
//! ```text
//! flat = ∑ iₖ × strides[k],   strides[k] = ∏ sizes[j] for j > k
//! ```
//!
//! All arrays in this crate use this layout, and every shape change
//! re-derives the strides from the new sizes.

use serde::Deserialize;
use serde::Serialize;

/// The type of error for shape and index arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ShapeError {
    #[error("invalid dims: expected {expected}, got {got}")]
    InvalidDims { expected: usize, got: usize },

    #[error("index {index} out of range {size} in dimension {dim}")]
    IndexOutOfRange {
        dim: usize,
        index: usize,
        size: usize,
    },

    #[error("flat index {index} out of range {total}")]
    FlatIndexOutOfRange { index: usize, total: usize },

    #[error("dimension {dim} out of range for {ndims}-dimensional shape")]
    DimensionOutOfRange { dim: usize, ndims: usize },

    #[error("empty range: {begin}..={end}")]
    EmptyRange { begin: usize, end: usize },
}

/// Row-major strides for `sizes`: `strides[last] = 1` and
/// `strides[i] = strides[i + 1] * sizes[i + 1]`.
///
/// ```
/// assert_eq!(ndfunction::shape::row_major_strides(&[2, 3, 4]), vec![12, 4, 1]);
/// ```
pub fn row_major_strides(sizes: &[usize]) -> Vec<usize> {
    // "flip it and reverse it" --Missy Elliott
    let mut strides: Vec<usize> = sizes.to_vec();
    let _ = strides.iter_mut().rev().fold(1, |acc, n| {
        let next = *n * acc;
        *n = acc;
        next
    });
    strides
}

/// The number of elements in a dense array of the given shape. A
/// shape containing a zero dimension has no elements.
pub fn total_length(sizes: &[usize]) -> usize {
    sizes.iter().product()
}

/// Whether `index` addresses an element of `sizes`.
///
/// Returns false for every index of a degenerate shape (any
/// dimension of size zero), and for indices of the wrong rank.
pub fn is_index_within_shape(index: &[usize], sizes: &[usize]) -> bool {
    if sizes.contains(&0) || index.len() != sizes.len() {
        return false;
    }
    index.iter().zip(sizes).all(|(i, size)| i < size)
}

/// Flat position of `index` in a dense row-major array of shape `sizes`.
pub fn flat_index(index: &[usize], sizes: &[usize]) -> Result<usize, ShapeError> {
    Layout::new(sizes.to_vec()).location(index)
}

/// Multi-index of the flat position `flat` in a dense row-major array
/// of shape `sizes`.
pub fn multi_index(flat: usize, sizes: &[usize]) -> Result<Vec<usize>, ShapeError> {
    Layout::new(sizes.to_vec()).coordinates(flat)
}

/// Layout is the shape of a dense row-major array together with its
/// derived strides.
///
/// ```
/// # use ndfunction::shape::Layout;
/// let l = Layout::new(vec![3, 3, 3]);
/// assert_eq!(l.strides(), &[9, 3, 1]);
/// assert_eq!(l.location(&[1, 2, 0]).unwrap(), 15);
/// assert_eq!(l.coordinates(15).unwrap(), vec![1, 2, 0]);
/// ```
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Layout {
    sizes: Vec<usize>,
    strides: Vec<usize>,
}

impl Layout {
    /// Create a new row-major layout for `sizes`.
    pub fn new(sizes: impl Into<Vec<usize>>) -> Self {
        let sizes = sizes.into();
        let strides = row_major_strides(&sizes);
        Self { sizes, strides }
    }

    /// The number of dimensions.
    pub fn rank(&self) -> usize {
        self.sizes.len()
    }

    /// The size of each dimension.
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// The distance in the flat buffer between neighbours along each
    /// dimension.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// The total number of elements.
    pub fn len(&self) -> usize {
        total_length(&self.sizes)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `index` is a valid multi-index of this layout.
    pub fn contains(&self, index: &[usize]) -> bool {
        is_index_within_shape(index, &self.sizes)
    }

    /// Checks that `dim` names a dimension of this layout.
    pub fn check_dim(&self, dim: usize) -> Result<(), ShapeError> {
        if dim >= self.rank() {
            return Err(ShapeError::DimensionOutOfRange {
                dim,
                ndims: self.rank(),
            });
        }
        Ok(())
    }

    /// Checks that `index` is a valid multi-index of this layout,
    /// reporting the first offending dimension.
    pub fn check_index(&self, index: &[usize]) -> Result<(), ShapeError> {
        if index.len() != self.rank() {
            return Err(ShapeError::InvalidDims {
                expected: self.rank(),
                got: index.len(),
            });
        }
        for (dim, (&i, &size)) in index.iter().zip(&self.sizes).enumerate() {
            if i >= size {
                return Err(ShapeError::IndexOutOfRange {
                    dim,
                    index: i,
                    size,
                });
            }
        }
        Ok(())
    }

    /// Return the flat location of the provided multi-index.
    pub fn location(&self, index: &[usize]) -> Result<usize, ShapeError> {
        self.check_index(index)?;
        Ok(index
            .iter()
            .zip(&self.strides)
            .map(|(pos, stride)| pos * stride)
            .sum::<usize>())
    }

    /// Return the multi-index of the provided flat location.
    pub fn coordinates(&self, flat: usize) -> Result<Vec<usize>, ShapeError> {
        let total = self.len();
        if flat >= total {
            return Err(ShapeError::FlatIndexOutOfRange { index: flat, total });
        }
        let mut rest = flat;
        let mut result = vec![0; self.rank()];
        for (dim, stride) in self.strides.iter().enumerate() {
            result[dim] = rest / stride;
            rest %= stride;
        }
        Ok(result)
    }

    /// A copy of this layout with dimension `dim` resized to `size`.
    pub fn with_size(&self, dim: usize, size: usize) -> Result<Self, ShapeError> {
        self.check_dim(dim)?;
        let mut sizes = self.sizes.clone();
        sizes[dim] = size;
        Ok(Self::new(sizes))
    }

    /// The number of elements in one slice of dimension `dim`, i.e.
    /// the product of the sizes after `dim`.
    pub(crate) fn inner_len(&self, dim: usize) -> usize {
        self.sizes[dim + 1..].iter().product()
    }

    /// The number of slices preceding dimension `dim`, i.e. the
    /// product of the sizes before `dim`.
    pub(crate) fn outer_len(&self, dim: usize) -> usize {
        self.sizes[..dim].iter().product()
    }

    /// Iterator over every multi-index of this layout in row-major
    /// order.
    pub fn iter(&self) -> CartesianIterator {
        CartesianIterator::new(self.sizes.clone())
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.sizes)
    }
}

/// Iterates over all coordinate tuples in an N-dimensional space.
///
/// Yields each point in row-major order for the shape defined by
/// `dims`, where each coordinate lies in `[0..dims[i])`. A shape with
/// a zero dimension yields nothing; the 0-dimensional shape yields the
/// single empty coordinate.
///
/// ```
/// # use ndfunction::shape::CartesianIterator;
/// let coords: Vec<_> = CartesianIterator::new(vec![2, 3]).collect();
/// assert_eq!(coords[4], vec![1, 1]);
/// assert_eq!(coords.len(), 6);
/// ```
pub struct CartesianIterator {
    dims: Vec<usize>,
    index: usize,
    total: usize,
}

impl CartesianIterator {
    pub fn new(dims: Vec<usize>) -> Self {
        let total = total_length(&dims);
        CartesianIterator {
            dims,
            index: 0,
            total,
        }
    }
}

impl Iterator for CartesianIterator {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.total {
            return None;
        }

        let mut result: Vec<usize> = vec![0; self.dims.len()];
        let mut rest = self.index;
        for (i, dim) in self.dims.iter().enumerate().rev() {
            result[i] = rest % dim;
            rest /= dim;
        }
        self.index += 1;
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for CartesianIterator {}

/// Maps flattened row numbers to multi-indices and back.
///
/// Grid and chart bindings present an N-dimensional function as a
/// flat list of rows; a `RowIndex` is the translation between the two
/// for a fixed shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowIndex {
    layout: Layout,
}

impl RowIndex {
    pub fn new(sizes: impl Into<Vec<usize>>) -> Self {
        Self {
            layout: Layout::new(sizes),
        }
    }

    /// The number of rows.
    pub fn row_count(&self) -> usize {
        self.layout.len()
    }

    /// The multi-index presented at `row`.
    pub fn index_of_row(&self, row: usize) -> Result<Vec<usize>, ShapeError> {
        self.layout.coordinates(row)
    }

    /// The row presenting `index`.
    pub fn row_of_index(&self, index: &[usize]) -> Result<usize, ShapeError> {
        self.layout.location(index)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::strategy::gen_shape;

    #[test]
    fn test_cartesian_iterator() {
        let dims = vec![2, 2, 2];
        let iter = CartesianIterator::new(dims);
        let products: Vec<Vec<usize>> = iter.collect();
        assert_eq!(
            products,
            vec![
                vec![0, 0, 0],
                vec![0, 0, 1],
                vec![0, 1, 0],
                vec![0, 1, 1],
                vec![1, 0, 0],
                vec![1, 0, 1],
                vec![1, 1, 0],
                vec![1, 1, 1],
            ]
        );
    }

    #[test]
    fn test_cartesian_iterator_degenerate() {
        assert_eq!(CartesianIterator::new(vec![3, 0, 2]).count(), 0);
        assert_eq!(
            CartesianIterator::new(vec![]).collect::<Vec<_>>(),
            vec![Vec::<usize>::new()]
        );
    }

    #[test]
    fn test_row_major() {
        let l = Layout::new(vec![4, 4, 4]);
        assert_eq!(l.sizes(), &[4, 4, 4]);
        assert_eq!(l.strides(), &[16, 4, 1]);
        assert_eq!(row_major_strides(&[5]), vec![1]);
        assert_eq!(row_major_strides(&[]), Vec::<usize>::new());
    }

    #[test]
    fn test_strides_three_dims() {
        let (a, b, c) = (3, 5, 7);
        assert_eq!(row_major_strides(&[a, b, c]), vec![b * c, c, 1]);
    }

    #[test]
    fn test_total_length() {
        assert_eq!(total_length(&[2, 3, 4]), 24);
        assert_eq!(total_length(&[2, 0, 4]), 0);
        assert_eq!(total_length(&[]), 1);
    }

    #[test]
    fn test_degenerate_shape_contains_nothing() {
        let sizes = [3, 0, 2];
        for index in [[0, 0, 0], [1, 0, 1], [2, 5, 1]] {
            assert!(!is_index_within_shape(&index, &sizes));
        }
        assert!(is_index_within_shape(&[2, 1], &[3, 2]));
        assert!(!is_index_within_shape(&[3, 1], &[3, 2]));
        assert!(!is_index_within_shape(&[1], &[3, 2]));
    }

    #[test]
    fn test_location_errors() {
        let l = Layout::new(vec![2, 3]);
        assert_eq!(l.location(&[1, 2]).unwrap(), 5);
        assert!(matches!(
            l.location(&[1, 3]),
            Err(ShapeError::IndexOutOfRange {
                dim: 1,
                index: 3,
                size: 3
            })
        ));
        assert!(matches!(
            l.location(&[1]),
            Err(ShapeError::InvalidDims {
                expected: 2,
                got: 1
            })
        ));
        assert!(matches!(
            l.coordinates(6),
            Err(ShapeError::FlatIndexOutOfRange { index: 6, total: 6 })
        ));
    }

    #[test]
    fn test_with_size() {
        let l = Layout::new(vec![2, 3]).with_size(0, 4).unwrap();
        assert_eq!(l.sizes(), &[4, 3]);
        assert_eq!(l.strides(), &[3, 1]);
        assert!(Layout::new(vec![2, 3]).with_size(2, 1).is_err());
    }

    #[test]
    fn test_row_index() {
        let rows = RowIndex::new(vec![2, 3]);
        assert_eq!(rows.row_count(), 6);
        assert_eq!(rows.index_of_row(4).unwrap(), vec![1, 1]);
        assert_eq!(rows.row_of_index(&[1, 1]).unwrap(), 4);
        assert!(rows.index_of_row(6).is_err());
    }

    proptest! {
        #[test]
        fn flat_index_is_a_bijection(sizes in gen_shape(4, 6)) {
            let total = total_length(&sizes);
            for flat in 0..total {
                let index = multi_index(flat, &sizes).unwrap();
                prop_assert!(is_index_within_shape(&index, &sizes));
                prop_assert_eq!(flat_index(&index, &sizes).unwrap(), flat);
            }
        }

        #[test]
        fn iteration_order_is_flat_order(sizes in gen_shape(4, 5)) {
            let layout = Layout::new(sizes);
            for (flat, index) in layout.iter().enumerate() {
                prop_assert_eq!(layout.location(&index).unwrap(), flat);
            }
        }
    }
}
