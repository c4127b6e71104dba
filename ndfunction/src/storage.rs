/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Dense typed element buffers.
//!
//! A [`Storage`] is a flat `Vec<T>` interpreted through a row-major
//! [`Layout`]. Structural edits (inserting or removing slices along a
//! dimension, resizing) rebuild the buffer so that every surviving
//! element keeps its multi-index under the new layout.

use serde::Deserialize;
use serde::Serialize;

use crate::shape::Layout;
use crate::shape::ShapeError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Storage<T> {
    layout: Layout,
    data: Vec<T>,
}

impl<T: Clone> Storage<T> {
    /// A buffer of shape `sizes` with every element set to `fill`.
    pub fn new(sizes: impl Into<Vec<usize>>, fill: T) -> Self {
        let layout = Layout::new(sizes);
        let data = vec![fill; layout.len()];
        Self { layout, data }
    }

    /// Wraps `data` as a buffer of shape `sizes`. The length of `data`
    /// must equal the number of elements of the shape.
    pub fn from_vec(sizes: impl Into<Vec<usize>>, data: Vec<T>) -> Result<Self, ShapeError> {
        let layout = Layout::new(sizes);
        if layout.len() != data.len() {
            return Err(ShapeError::InvalidDims {
                expected: layout.len(),
                got: data.len(),
            });
        }
        Ok(Self { layout, data })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn get_flat(&self, index: usize) -> Result<&T, ShapeError> {
        self.data
            .get(index)
            .ok_or(ShapeError::FlatIndexOutOfRange {
                index,
                total: self.data.len(),
            })
    }

    pub fn set_flat(&mut self, index: usize, value: T) -> Result<(), ShapeError> {
        let total = self.data.len();
        let slot = self
            .data
            .get_mut(index)
            .ok_or(ShapeError::FlatIndexOutOfRange { index, total })?;
        *slot = value;
        Ok(())
    }

    /// The `len` elements starting at flat position `start`.
    pub fn get_range(&self, start: usize, len: usize) -> Result<&[T], ShapeError> {
        let total = self.data.len();
        let end = start
            .checked_add(len)
            .filter(|end| *end <= total)
            .ok_or(ShapeError::FlatIndexOutOfRange {
                index: start.saturating_add(len),
                total,
            })?;
        Ok(&self.data[start..end])
    }

    /// Overwrites the elements starting at flat position `start` with
    /// `values`.
    pub fn set_range(&mut self, start: usize, values: &[T]) -> Result<(), ShapeError> {
        let total = self.data.len();
        let end = start
            .checked_add(values.len())
            .filter(|end| *end <= total)
            .ok_or(ShapeError::FlatIndexOutOfRange {
                index: start.saturating_add(values.len()),
                total,
            })?;
        self.data[start..end].clone_from_slice(values);
        Ok(())
    }

    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|slot| *slot = value.clone());
    }

    /// Reshapes the buffer to `sizes`. Elements whose multi-index is
    /// valid in both the old and the new shape keep their value; all
    /// other elements are set to `fill`. A change of rank shares no
    /// multi-index with the old shape, so it yields a buffer full of
    /// `fill`.
    pub fn resize(&mut self, sizes: impl Into<Vec<usize>>, fill: T) {
        let layout = Layout::new(sizes);
        if layout == self.layout {
            return;
        }
        let mut data = Vec::with_capacity(layout.len());
        if layout.rank() == self.layout.rank() {
            for index in layout.iter() {
                match self.layout.location(&index) {
                    Ok(flat) => data.push(self.data[flat].clone()),
                    Err(_) => data.push(fill.clone()),
                }
            }
        } else {
            data.resize(layout.len(), fill);
        }
        self.layout = layout;
        self.data = data;
    }

    /// Inserts `count` slices filled with `fill` before `position`
    /// along dimension `dim`. Slices at or after `position` move up by
    /// `count`; all other dimensions are unaffected.
    pub fn insert_at(
        &mut self,
        dim: usize,
        position: usize,
        count: usize,
        fill: T,
    ) -> Result<(), ShapeError> {
        self.layout.check_dim(dim)?;
        let size = self.layout.sizes()[dim];
        if position > size {
            return Err(ShapeError::IndexOutOfRange {
                dim,
                index: position,
                size: size + 1,
            });
        }
        if count == 0 {
            return Ok(());
        }

        let inner = self.layout.inner_len(dim);
        let outer = self.layout.outer_len(dim);
        let block = size * inner;
        let new_layout = self.layout.with_size(dim, size + count)?;

        let mut data = Vec::with_capacity(new_layout.len());
        for o in 0..outer {
            let base = o * block;
            data.extend_from_slice(&self.data[base..base + position * inner]);
            data.resize(data.len() + count * inner, fill.clone());
            data.extend_from_slice(&self.data[base + position * inner..base + block]);
        }
        self.layout = new_layout;
        self.data = data;
        Ok(())
    }

    /// Removes the `count` slices starting at `position` along
    /// dimension `dim`. Slices after the removed range move down by
    /// `count`.
    pub fn remove_at(&mut self, dim: usize, position: usize, count: usize) -> Result<(), ShapeError> {
        self.layout.check_dim(dim)?;
        let size = self.layout.sizes()[dim];
        match position.checked_add(count) {
            Some(end) if end <= size => {}
            _ => {
                return Err(ShapeError::IndexOutOfRange {
                    dim,
                    index: position.saturating_add(count).saturating_sub(1),
                    size,
                });
            }
        }
        if count == 0 {
            return Ok(());
        }

        let inner = self.layout.inner_len(dim);
        let outer = self.layout.outer_len(dim);
        let block = size * inner;
        let new_layout = self.layout.with_size(dim, size - count)?;

        let mut data = Vec::with_capacity(new_layout.len());
        for o in 0..outer {
            let base = o * block;
            data.extend_from_slice(&self.data[base..base + position * inner]);
            data.extend_from_slice(&self.data[base + (position + count) * inner..base + block]);
        }
        self.layout = new_layout;
        self.data = data;
        Ok(())
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 0 1 2
    // 3 4 5
    fn two_by_three() -> Storage<i32> {
        Storage::from_vec(vec![2, 3], (0..6).collect()).unwrap()
    }

    #[test]
    fn test_from_vec_length_mismatch() {
        assert!(matches!(
            Storage::from_vec(vec![2, 3], vec![0; 5]),
            Err(ShapeError::InvalidDims {
                expected: 6,
                got: 5
            })
        ));
    }

    #[test]
    fn test_insert_rows() {
        let mut s = two_by_three();
        s.insert_at(0, 1, 1, -1).unwrap();
        assert_eq!(s.layout().sizes(), &[3, 3]);
        assert_eq!(s.as_slice(), &[0, 1, 2, -1, -1, -1, 3, 4, 5]);
    }

    #[test]
    fn test_insert_columns() {
        let mut s = two_by_three();
        s.insert_at(1, 0, 2, -1).unwrap();
        assert_eq!(s.layout().sizes(), &[2, 5]);
        assert_eq!(s.layout().strides(), &[5, 1]);
        assert_eq!(s.as_slice(), &[-1, -1, 0, 1, 2, -1, -1, 3, 4, 5]);

        let mut s = two_by_three();
        s.insert_at(1, 3, 1, 9).unwrap();
        assert_eq!(s.as_slice(), &[0, 1, 2, 9, 3, 4, 5, 9]);
    }

    #[test]
    fn test_insert_out_of_range() {
        let mut s = two_by_three();
        assert!(s.insert_at(1, 4, 1, 0).is_err());
        assert!(s.insert_at(2, 0, 1, 0).is_err());
        assert_eq!(s, two_by_three());
    }

    #[test]
    fn test_remove_columns() {
        let mut s = two_by_three();
        s.remove_at(1, 1, 1).unwrap();
        assert_eq!(s.layout().sizes(), &[2, 2]);
        assert_eq!(s.as_slice(), &[0, 2, 3, 5]);

        let mut s = two_by_three();
        s.remove_at(0, 0, 2).unwrap();
        assert_eq!(s.layout().sizes(), &[0, 3]);
        assert!(s.is_empty());
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut s = two_by_three();
        assert!(s.remove_at(1, 2, 2).is_err());
        assert!(s.remove_at(0, 2, 1).is_err());
    }

    #[test]
    fn test_insert_into_empty_dimension() {
        let mut s: Storage<i32> = Storage::new(vec![2, 0], 0);
        s.insert_at(1, 0, 1, 7).unwrap();
        assert_eq!(s.layout().sizes(), &[2, 1]);
        assert_eq!(s.as_slice(), &[7, 7]);
    }

    #[test]
    fn test_resize_preserves_overlap() {
        let mut s = two_by_three();
        s.resize(vec![3, 2], -1);
        // 0 1
        // 3 4
        // - -
        assert_eq!(s.as_slice(), &[0, 1, 3, 4, -1, -1]);

        let mut s = two_by_three();
        s.resize(vec![6], -1);
        assert_eq!(s.as_slice(), &[-1; 6]);
    }

    #[test]
    fn test_ranges() {
        let mut s = two_by_three();
        assert_eq!(s.get_range(3, 3).unwrap(), &[3, 4, 5]);
        assert!(s.get_range(4, 3).is_err());
        s.set_range(1, &[10, 20]).unwrap();
        assert_eq!(s.as_slice(), &[0, 10, 20, 3, 4, 5]);
        assert!(s.set_range(5, &[1, 2]).is_err());
        s.fill(1);
        assert_eq!(s.as_slice(), &[1; 6]);
    }
}
