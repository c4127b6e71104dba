/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Non-owning views of arrays.
//!
//! A view is an index transform from its own coordinate space into
//! the coordinate space of an [`Array`]. The transform is described
//! per parent dimension by a [`DimMap`]:
//!
//! - `Window { start, len }`: local index `i` maps to `start + i`;
//! - `Gather(indexes)`: local index `i` maps to `indexes[i]`;
//! - `Fixed(index)`: the parent coordinate is fixed and the dimension
//!   does not appear in the view's own shape (a *reduction*).
//!
//! # Composition
//!
//! Views of views are never chained at access time. Selecting from a
//! view rewrites the affected `DimMap` so that it still maps straight
//! into the parent array:
//!
//! ```text
//! Window{s,_}  ∘ window [a..=b]   = Window{s + a, b - a + 1}
//! Window{s,_}  ∘ gather [i…]      = Gather[s + i…]
//! Gather[g…]   ∘ window [a..=b]   = Gather[g[a..=b]]
//! Gather[g…]   ∘ gather [i…]      = Gather[g[i]…]
//! any          ∘ fix i            = Fixed(map(i))
//! ```
//!
//! so a view built through any number of nested selections resolves
//! an element in a single pass over the parent's dimensions.
//!
//! # Ownership
//!
//! [`ArrayView`] and [`ArrayViewMut`] borrow their array, so the
//! compiler guarantees the array outlives them and is not reshaped
//! while they exist. A detached [`ViewSpec`] holds only the parent's
//! shape and generation; binding it to an array whose generation has
//! moved on fails with [`Error::StaleView`] until the view is
//! recomputed with [`ViewSpec::rebase`].

use serde::Deserialize;
use serde::Serialize;

use crate::array::Array;
use crate::error::Error;
use crate::shape::CartesianIterator;
use crate::shape::ShapeError;

/// How one parent dimension is seen through a view.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DimMap {
    /// The contiguous parent range `[start, start + len)`.
    Window { start: usize, len: usize },
    /// An arbitrary list of parent indexes, possibly repeating.
    Gather(Vec<usize>),
    /// A single fixed parent index; the dimension is reduced away.
    Fixed(usize),
}

impl DimMap {
    /// The extent of this dimension in the view, or `None` if it is
    /// reduced away.
    pub fn len(&self) -> Option<usize> {
        match self {
            DimMap::Window { len, .. } => Some(*len),
            DimMap::Gather(indexes) => Some(indexes.len()),
            DimMap::Fixed(_) => None,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, DimMap::Fixed(_))
    }

    /// The parent index seen at local index `local`. Reduced
    /// dimensions ignore `local`.
    pub fn parent_index(&self, local: usize) -> Option<usize> {
        match self {
            DimMap::Window { start, len } => (local < *len).then_some(start + local),
            DimMap::Gather(indexes) => indexes.get(local).copied(),
            DimMap::Fixed(index) => Some(*index),
        }
    }

    /// Every parent index seen through this dimension, in local order.
    pub fn parent_indexes(&self) -> Vec<usize> {
        match self {
            DimMap::Window { start, len } => (*start..start + len).collect(),
            DimMap::Gather(indexes) => indexes.clone(),
            DimMap::Fixed(index) => vec![*index],
        }
    }

    /// Whether two local indexes of this dimension alias the same
    /// parent index.
    pub fn has_duplicates(&self) -> bool {
        match self {
            DimMap::Gather(indexes) => {
                let mut sorted = indexes.clone();
                sorted.sort_unstable();
                sorted.windows(2).any(|w| w[0] == w[1])
            }
            _ => false,
        }
    }

    // The callers below validate local indexes against `len()` first.
    fn window(&self, start: usize, end: usize) -> DimMap {
        match self {
            DimMap::Window { start: s, .. } => DimMap::Window {
                start: s + start,
                len: end - start + 1,
            },
            DimMap::Gather(indexes) => DimMap::Gather(indexes[start..=end].to_vec()),
            DimMap::Fixed(index) => DimMap::Fixed(*index),
        }
    }

    fn gather(&self, locals: &[usize]) -> DimMap {
        match self {
            DimMap::Window { start, .. } => DimMap::Gather(locals.iter().map(|i| start + i).collect()),
            DimMap::Gather(indexes) => DimMap::Gather(locals.iter().map(|i| indexes[*i]).collect()),
            DimMap::Fixed(index) => DimMap::Fixed(*index),
        }
    }

    fn within(&self, size: usize) -> bool {
        match self {
            DimMap::Window { start, len } => start + len <= size,
            DimMap::Gather(indexes) => indexes.iter().all(|i| *i < size),
            DimMap::Fixed(index) => *index < size,
        }
    }
}

/// A detached view: the parent's shape and generation together with
/// one [`DimMap`] per parent dimension.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewSpec {
    parent_shape: Vec<usize>,
    generation: u64,
    dims: Vec<DimMap>,
}

impl ViewSpec {
    /// The view that sees all of a parent of shape `parent_shape`.
    pub fn identity(parent_shape: impl Into<Vec<usize>>, generation: u64) -> Self {
        let parent_shape = parent_shape.into();
        let dims = parent_shape
            .iter()
            .map(|&len| DimMap::Window { start: 0, len })
            .collect();
        Self {
            parent_shape,
            generation,
            dims,
        }
    }

    /// The identity view of `array`.
    pub fn of<T: Clone>(array: &Array<T>) -> Self {
        Self::identity(array.shape(), array.generation())
    }

    pub fn parent_shape(&self) -> &[usize] {
        &self.parent_shape
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// One entry per parent dimension.
    pub fn dims(&self) -> &[DimMap] {
        &self.dims
    }

    /// The view's own shape: the extents of the dimensions that are
    /// not reduced.
    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().filter_map(DimMap::len).collect()
    }

    pub fn rank(&self) -> usize {
        self.dims.iter().filter(|d| !d.is_fixed()).count()
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The parent dimension behind the view's dimension `dim`.
    pub fn parent_dim(&self, dim: usize) -> Result<usize, Error> {
        self.dims
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.is_fixed())
            .map(|(parent, _)| parent)
            .nth(dim)
            .ok_or_else(|| {
                ShapeError::DimensionOutOfRange {
                    dim,
                    ndims: self.rank(),
                }
                .into()
            })
    }

    fn extent(&self, dim: usize) -> Result<(usize, usize), Error> {
        let parent = self.parent_dim(dim)?;
        let len = self.dims[parent].len().unwrap_or(1);
        Ok((parent, len))
    }

    fn check_local(dim: usize, index: usize, len: usize) -> Result<(), Error> {
        if index >= len {
            return Err(ShapeError::IndexOutOfRange {
                dim,
                index,
                size: len,
            }
            .into());
        }
        Ok(())
    }

    /// Restricts dimension `dim` to the local range `[start, end]`
    /// (both inclusive).
    pub fn select(&self, dim: usize, start: usize, end: usize) -> Result<Self, Error> {
        let (parent, len) = self.extent(dim)?;
        if start > end {
            return Err(ShapeError::EmptyRange { begin: start, end }.into());
        }
        Self::check_local(dim, end, len)?;
        let mut spec = self.clone();
        spec.dims[parent] = self.dims[parent].window(start, end);
        Ok(spec)
    }

    /// Restricts every dimension at once: dimension `i` to
    /// `[starts[i], ends[i]]`.
    pub fn select_all(&self, starts: &[usize], ends: &[usize]) -> Result<Self, Error> {
        let rank = self.rank();
        if starts.len() != rank || ends.len() != rank {
            return Err(ShapeError::InvalidDims {
                expected: rank,
                got: if starts.len() != rank {
                    starts.len()
                } else {
                    ends.len()
                },
            }
            .into());
        }
        starts
            .iter()
            .zip(ends)
            .enumerate()
            .try_fold(self.clone(), |spec, (dim, (&start, &end))| {
                spec.select(dim, start, end)
            })
    }

    /// Gathers the local indexes `indexes` (in that order, repeats
    /// allowed) of dimension `dim`.
    pub fn select_indexes(&self, dim: usize, indexes: &[usize]) -> Result<Self, Error> {
        let (parent, len) = self.extent(dim)?;
        for &index in indexes {
            Self::check_local(dim, index, len)?;
        }
        let mut spec = self.clone();
        spec.dims[parent] = self.dims[parent].gather(indexes);
        Ok(spec)
    }

    /// Fixes dimension `dim` at local index `index`, removing it from
    /// the view's shape.
    pub fn reduce(&self, dim: usize, index: usize) -> Result<Self, Error> {
        let (parent, len) = self.extent(dim)?;
        Self::check_local(dim, index, len)?;
        let mut spec = self.clone();
        let fixed = self.dims[parent]
            .parent_index(index)
            .ok_or(ShapeError::IndexOutOfRange {
                dim,
                index,
                size: len,
            })?;
        spec.dims[parent] = DimMap::Fixed(fixed);
        Ok(spec)
    }

    /// Translates a multi-index of the view into the parent's
    /// coordinate space.
    pub fn to_parent(&self, index: &[usize]) -> Result<Vec<usize>, Error> {
        let rank = self.rank();
        if index.len() != rank {
            return Err(ShapeError::InvalidDims {
                expected: rank,
                got: index.len(),
            }
            .into());
        }
        let mut locals = index.iter().enumerate();
        let mut parent = Vec::with_capacity(self.dims.len());
        for map in &self.dims {
            if let DimMap::Fixed(fixed) = map {
                parent.push(*fixed);
                continue;
            }
            let Some((dim, &local)) = locals.next() else {
                break;
            };
            let size = map.len().unwrap_or(0);
            let mapped = map.parent_index(local).ok_or(ShapeError::IndexOutOfRange {
                dim,
                index: local,
                size,
            })?;
            parent.push(mapped);
        }
        Ok(parent)
    }

    /// Parent coordinates of every element of the view, in the view's
    /// row-major order.
    pub fn parent_indices(&self) -> impl Iterator<Item = Vec<usize>> + '_ {
        CartesianIterator::new(self.shape()).map(move |local| {
            let mut locals = local.into_iter();
            self.dims
                .iter()
                .map(|map| match map {
                    DimMap::Fixed(fixed) => *fixed,
                    DimMap::Window { start, .. } => start + locals.next().unwrap_or(0),
                    DimMap::Gather(indexes) => indexes[locals.next().unwrap_or(0)],
                })
                .collect()
        })
    }

    /// Whether writes through this view have a unique target, i.e. no
    /// gathered dimension repeats a parent index.
    pub fn is_writable(&self) -> bool {
        !self.dims.iter().any(DimMap::has_duplicates)
    }

    /// Fails with [`Error::StaleView`] if the storage this view was
    /// built against has changed shape since.
    pub fn check_generation(&self, generation: u64) -> Result<(), Error> {
        if self.generation != generation {
            tracing::warn!(
                expected = self.generation,
                found = generation,
                "rejecting stale view"
            );
            return Err(Error::StaleView {
                expected: self.generation,
                found: generation,
            });
        }
        Ok(())
    }

    /// Checks that this view can be resolved against `array`.
    pub fn check<T: Clone>(&self, array: &Array<T>) -> Result<(), Error> {
        self.check_generation(array.generation())?;
        if self.parent_shape != array.shape() {
            return Err(Error::StaleView {
                expected: self.generation,
                found: array.generation(),
            });
        }
        Ok(())
    }

    /// Recomputes this view against the current shape of `array`. The
    /// view keeps its transform and fails if any of its parent indexes
    /// no longer exist.
    pub fn rebase<T: Clone>(&self, array: &Array<T>) -> Result<Self, Error> {
        self.rebase_to(array.shape(), array.generation())
    }

    /// [`ViewSpec::rebase`] against a parent described by its shape and
    /// generation.
    pub fn rebase_to(&self, parent_shape: &[usize], generation: u64) -> Result<Self, Error> {
        if parent_shape.len() != self.dims.len() {
            return Err(ShapeError::InvalidDims {
                expected: self.dims.len(),
                got: parent_shape.len(),
            }
            .into());
        }
        for (dim, (map, &size)) in self.dims.iter().zip(parent_shape).enumerate() {
            if !map.within(size) {
                let index = map.parent_indexes().into_iter().max().unwrap_or(0);
                return Err(ShapeError::IndexOutOfRange { dim, index, size }.into());
            }
        }
        Ok(Self {
            parent_shape: parent_shape.to_vec(),
            generation,
            dims: self.dims.clone(),
        })
    }
}

/// A read-only view borrowing an [`Array`].
#[derive(Debug)]
pub struct ArrayView<'a, T> {
    array: &'a Array<T>,
    spec: ViewSpec,
}

impl<'a, T: Clone> ArrayView<'a, T> {
    pub(crate) fn new(array: &'a Array<T>) -> Self {
        Self {
            array,
            spec: ViewSpec::of(array),
        }
    }

    /// Binds a detached view to `array`.
    pub fn from_spec(array: &'a Array<T>, spec: ViewSpec) -> Result<Self, Error> {
        spec.check(array)?;
        Ok(Self { array, spec })
    }

    pub fn spec(&self) -> &ViewSpec {
        &self.spec
    }

    /// Detaches the view from its array.
    pub fn into_spec(self) -> ViewSpec {
        self.spec
    }

    pub fn shape(&self) -> Vec<usize> {
        self.spec.shape()
    }

    pub fn rank(&self) -> usize {
        self.spec.rank()
    }

    pub fn len(&self) -> usize {
        self.spec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spec.is_empty()
    }

    pub fn get(&self, index: &[usize]) -> Result<&'a T, Error> {
        let parent = self.spec.to_parent(index)?;
        Ok(self.array.get(&parent)?)
    }

    fn derive(&self, spec: ViewSpec) -> ArrayView<'a, T> {
        ArrayView {
            array: self.array,
            spec,
        }
    }

    /// See [`ViewSpec::select`].
    pub fn select(&self, dim: usize, start: usize, end: usize) -> Result<ArrayView<'a, T>, Error> {
        Ok(self.derive(self.spec.select(dim, start, end)?))
    }

    /// See [`ViewSpec::select_all`].
    pub fn select_all(&self, starts: &[usize], ends: &[usize]) -> Result<ArrayView<'a, T>, Error> {
        Ok(self.derive(self.spec.select_all(starts, ends)?))
    }

    /// See [`ViewSpec::select_indexes`].
    pub fn select_indexes(&self, dim: usize, indexes: &[usize]) -> Result<ArrayView<'a, T>, Error> {
        Ok(self.derive(self.spec.select_indexes(dim, indexes)?))
    }

    /// See [`ViewSpec::reduce`].
    pub fn reduce(&self, dim: usize, index: usize) -> Result<ArrayView<'a, T>, Error> {
        Ok(self.derive(self.spec.reduce(dim, index)?))
    }

    /// The elements of the view in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &'a T> + '_ {
        let array = self.array;
        self.spec
            .parent_indices()
            .filter_map(move |index| array.get(&index).ok())
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

/// A view that writes through to a mutably borrowed [`Array`].
#[derive(Debug)]
pub struct ArrayViewMut<'a, T> {
    array: &'a mut Array<T>,
    spec: ViewSpec,
}

impl<'a, T: Clone> ArrayViewMut<'a, T> {
    pub(crate) fn new(array: &'a mut Array<T>) -> Self {
        let spec = ViewSpec::of(array);
        Self { array, spec }
    }

    /// Binds a detached view to `array` for writing.
    pub fn from_spec(array: &'a mut Array<T>, spec: ViewSpec) -> Result<Self, Error> {
        spec.check(array)?;
        Ok(Self { array, spec })
    }

    pub fn spec(&self) -> &ViewSpec {
        &self.spec
    }

    pub fn shape(&self) -> Vec<usize> {
        self.spec.shape()
    }

    pub fn rank(&self) -> usize {
        self.spec.rank()
    }

    pub fn get(&self, index: &[usize]) -> Result<&T, Error> {
        let parent = self.spec.to_parent(index)?;
        Ok(self.array.get(&parent)?)
    }

    fn check_writable(&self) -> Result<(), Error> {
        if !self.spec.is_writable() {
            tracing::warn!(spec = ?self.spec, "rejecting write through aliasing view");
            return Err(Error::unsupported(
                "write through a view whose gathered indexes repeat",
            ));
        }
        Ok(())
    }

    /// Writes `value` at `index` of the view into the parent array.
    pub fn set(&mut self, index: &[usize], value: T) -> Result<(), Error> {
        self.check_writable()?;
        let parent = self.spec.to_parent(index)?;
        Ok(self.array.set(&parent, value)?)
    }

    /// Sets every element of the view to `value`.
    pub fn fill(&mut self, value: T) -> Result<(), Error> {
        self.check_writable()?;
        let targets: Vec<_> = self.spec.parent_indices().collect();
        for index in targets {
            self.array.set(&index, value.clone())?;
        }
        Ok(())
    }

    /// See [`ViewSpec::select`].
    pub fn select(self, dim: usize, start: usize, end: usize) -> Result<Self, Error> {
        let spec = self.spec.select(dim, start, end)?;
        Ok(Self { spec, ..self })
    }

    /// See [`ViewSpec::select_indexes`].
    pub fn select_indexes(self, dim: usize, indexes: &[usize]) -> Result<Self, Error> {
        let spec = self.spec.select_indexes(dim, indexes)?;
        Ok(Self { spec, ..self })
    }

    /// See [`ViewSpec::reduce`].
    pub fn reduce(self, dim: usize, index: usize) -> Result<Self, Error> {
        let spec = self.spec.reduce(dim, index)?;
        Ok(Self { spec, ..self })
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.spec
            .parent_indices()
            .filter_map(|index| self.array.get(&index).ok().cloned())
            .collect()
    }
}
