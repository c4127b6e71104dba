/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Owned N-dimensional arrays.
//!
//! An [`Array`] exclusively owns its [`Storage`] and exposes
//! bounds-checked multi-index access plus the structural edits a
//! growing function grid needs: resize, insert/remove/append along a
//! dimension, and sorted insertion into monotonic 1-d arrays.
//!
//! Every structural edit bumps the array's *generation*. Detached
//! [`ViewSpec`]s record the generation they were built against and
//! refuse to resolve against an array that has since changed shape.

use std::cmp::Ordering;

use crate::error::Error;
use crate::shape::Layout;
use crate::shape::ShapeError;
use crate::storage::Storage;
use crate::view::ArrayView;
use crate::view::ArrayViewMut;
use crate::view::ViewSpec;

/// The position at which `value` should be inserted into the sorted
/// sequence `sorted` to keep it sorted, given the ordering `cmp`.
///
/// The result is the first position whose element is not less than
/// `value`, so a value equal to an existing element lands on that
/// element's position; an empty sequence yields 0.
pub fn insertion_index_by<T, F>(sorted: &[T], mut cmp: F) -> usize
where
    F: FnMut(&T) -> Ordering,
{
    sorted.partition_point(|x| cmp(x) == Ordering::Less)
}

/// [`insertion_index_by`] for naturally ordered elements.
///
/// ```
/// use ndfunction::array::insertion_index;
/// let xs = [1, 2, 40, 50];
/// assert_eq!(insertion_index(&xs, &3), 2);
/// assert_eq!(insertion_index(&xs, &0), 0);
/// assert_eq!(insertion_index(&xs, &60), 4);
/// assert_eq!(insertion_index(&xs, &2), 1);
/// ```
pub fn insertion_index<T: PartialOrd>(sorted: &[T], value: &T) -> usize {
    insertion_index_by(sorted, |x| {
        x.partial_cmp(value).unwrap_or(Ordering::Greater)
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct Array<T> {
    storage: Storage<T>,
    default: T,
    generation: u64,
}

impl<T: Clone + Default> Array<T> {
    /// An array of shape `sizes` filled with `T::default()`.
    pub fn new(sizes: impl Into<Vec<usize>>) -> Self {
        Self::with_default(sizes, T::default())
    }
}

impl<T: Clone> Array<T> {
    /// An array of shape `sizes` whose cells (current and future)
    /// start out as `default`.
    pub fn with_default(sizes: impl Into<Vec<usize>>, default: T) -> Self {
        Self {
            storage: Storage::new(sizes, default.clone()),
            default,
            generation: 0,
        }
    }

    /// Wraps `data` (in row-major order) as an array of shape `sizes`.
    pub fn from_vec(
        sizes: impl Into<Vec<usize>>,
        data: Vec<T>,
        default: T,
    ) -> Result<Self, ShapeError> {
        Ok(Self {
            storage: Storage::from_vec(sizes, data)?,
            default,
            generation: 0,
        })
    }

    pub fn layout(&self) -> &Layout {
        self.storage.layout()
    }

    pub fn shape(&self) -> &[usize] {
        self.storage.layout().sizes()
    }

    pub fn rank(&self) -> usize {
        self.storage.layout().rank()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// The number of structural edits applied to this array.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }

    pub fn set_default_value(&mut self, default: T) {
        self.default = default;
    }

    /// All elements in row-major order.
    pub fn as_slice(&self) -> &[T] {
        self.storage.as_slice()
    }

    pub fn storage(&self) -> &Storage<T> {
        &self.storage
    }

    pub fn get(&self, index: &[usize]) -> Result<&T, ShapeError> {
        let flat = self.layout().location(index)?;
        self.storage.get_flat(flat)
    }

    pub fn set(&mut self, index: &[usize], value: T) -> Result<(), ShapeError> {
        let flat = self.layout().location(index)?;
        self.storage.set_flat(flat, value)
    }

    pub fn get_flat(&self, flat: usize) -> Result<&T, ShapeError> {
        self.storage.get_flat(flat)
    }

    pub fn set_flat(&mut self, flat: usize, value: T) -> Result<(), ShapeError> {
        self.storage.set_flat(flat, value)
    }

    /// Replaces every element, in row-major order. The number of
    /// values must equal the number of elements.
    pub fn set_all(&mut self, values: &[T]) -> Result<(), ShapeError> {
        if values.len() != self.len() {
            return Err(ShapeError::InvalidDims {
                expected: self.len(),
                got: values.len(),
            });
        }
        self.storage.set_range(0, values)
    }

    /// Changes the shape to `sizes`, keeping the values whose
    /// multi-index is valid in both shapes. New cells take the
    /// array's default value.
    pub fn resize(&mut self, sizes: impl Into<Vec<usize>>) {
        let sizes = sizes.into();
        if sizes.as_slice() == self.shape() {
            return;
        }
        tracing::debug!(from = ?self.shape(), to = ?sizes, "resizing array");
        self.storage.resize(sizes, self.default.clone());
        self.generation += 1;
    }

    /// Inserts `count` default-valued slices before `position` along
    /// `dim`.
    pub fn insert_at(&mut self, dim: usize, position: usize, count: usize) -> Result<(), ShapeError> {
        self.storage
            .insert_at(dim, position, count, self.default.clone())?;
        if count > 0 {
            self.generation += 1;
        }
        Ok(())
    }

    /// Removes `count` slices starting at `position` along `dim`.
    pub fn remove_at(&mut self, dim: usize, position: usize, count: usize) -> Result<(), ShapeError> {
        self.storage.remove_at(dim, position, count)?;
        if count > 0 {
            self.generation += 1;
        }
        Ok(())
    }

    /// Appends `count` default-valued slices at the end of `dim`,
    /// returning the position of the first new slice.
    pub fn append(&mut self, dim: usize, count: usize) -> Result<usize, ShapeError> {
        self.layout().check_dim(dim)?;
        let position = self.shape()[dim];
        self.insert_at(dim, position, count)?;
        Ok(position)
    }

    /// A view of the whole array.
    pub fn view(&self) -> ArrayView<'_, T> {
        ArrayView::new(self)
    }

    /// A mutable view of the whole array.
    pub fn view_mut(&mut self) -> ArrayViewMut<'_, T> {
        ArrayViewMut::new(self)
    }

    /// Resolves a detached view against this array.
    pub fn bind(&self, spec: ViewSpec) -> Result<ArrayView<'_, T>, Error> {
        ArrayView::from_spec(self, spec)
    }
}

impl<T: Clone + PartialOrd> Array<T> {
    fn check_one_dimensional(&self) -> Result<(), Error> {
        if self.rank() != 1 {
            return Err(Error::unsupported(format!(
                "sorted operations need a 1-dimensional array, got rank {}",
                self.rank()
            )));
        }
        Ok(())
    }

    /// The position at which `value` would be inserted to keep this
    /// (sorted, 1-dimensional) array sorted.
    pub fn insertion_index(&self, value: &T) -> Result<usize, Error> {
        self.check_one_dimensional()?;
        Ok(insertion_index(self.as_slice(), value))
    }

    /// Inserts `value` into this sorted 1-dimensional array, keeping
    /// it sorted, and returns its position.
    pub fn insert_sorted(&mut self, value: T) -> Result<usize, Error> {
        let position = self.insertion_index(&value)?;
        self.insert_at(0, position, 1)?;
        self.set_flat(position, value)?;
        Ok(position)
    }

    /// Whether this array is sorted in non-decreasing order along its
    /// (only) dimension.
    pub fn is_sorted(&self) -> bool {
        self.as_slice().windows(2).all(|w| {
            matches!(
                w[0].partial_cmp(&w[1]),
                Some(Ordering::Less | Ordering::Equal)
            )
        })
    }
}
