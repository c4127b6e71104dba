/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Functions: sorted argument axes mapped to component columns.
//!
//! A [`Function`] owns a *store*: an arena of variables and their
//! value arrays behind a single lock. Each argument is a sorted 1-d
//! array; each component is an array whose shape is the vector of
//! argument lengths. Writing a component value at argument values that
//! are not yet on the grid inserts them, growing every component along
//! that dimension under the same write lock.
//!
//! [`Function::filter`] returns a *projected* function sharing the
//! store. A projection is a [`ViewSpec`] over the argument grid plus a
//! subset of the components. It reads and writes existing cells of the
//! original, can be filtered again, and refuses to resolve after the
//! grid has been restructured (see [`Config::check_view_generation`])
//! until it is [rebased](Function::rebase).
//!
//! ```
//! use ndfunction::Function;
//! use ndfunction::Value;
//! use ndfunction::ValueKind;
//!
//! let mut f = Function::with_config("f", Default::default());
//! let x = f.add_argument(f.new_variable("x", ValueKind::Float)).unwrap();
//! let y = f.add_component(f.new_variable("y", ValueKind::Float)).unwrap();
//! f.set_value(y, &[0.0.into()], 1.0).unwrap();
//! f.set_value(y, &[2.0.into()], 3.0).unwrap();
//! assert_eq!(f.get_value(y, &[1.0.into()]).unwrap(), Value::Float(2.0));
//! assert_eq!(
//!     f.argument_values(x).unwrap(),
//!     vec![Value::Float(0.0), Value::Float(2.0)]
//! );
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::array::Array;
use crate::array::insertion_index_by;
use crate::config;
use crate::config::Config;
use crate::error::Error;
use crate::filter::Filter;
use crate::filter::Selection;
use crate::interpolate;
use crate::notify::Change;
use crate::notify::ChangeKind;
use crate::notify::Listeners;
use crate::notify::SubscriptionId;
use crate::shape::ShapeError;
use crate::value::Value;
use crate::value::ValueKind;
use crate::variable::ExtrapolationType;
use crate::variable::InterpolationType;
use crate::variable::Variable;
use crate::variable::VariableId;
use crate::view::DimMap;
use crate::view::ViewSpec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Argument,
    Component,
}

struct Slot {
    variable: Variable,
    role: Role,
    values: Array<Value>,
}

/// Every variable of a function, and the order of its arguments.
#[derive(Default)]
struct Store {
    slots: Vec<Slot>,
    arguments: Vec<VariableId>,
    /// Bumped whenever the argument grid is restructured.
    generation: u64,
}

impl Store {
    fn slot(&self, id: VariableId) -> Result<&Slot, Error> {
        self.slots
            .get(id.0)
            .ok_or(Error::UnknownVariable { id: id.0 })
    }

    fn slot_mut(&mut self, id: VariableId) -> Result<&mut Slot, Error> {
        self.slots
            .get_mut(id.0)
            .ok_or(Error::UnknownVariable { id: id.0 })
    }

    fn shape(&self) -> Vec<usize> {
        self.arguments
            .iter()
            .filter_map(|id| self.slots.get(id.0))
            .map(|slot| slot.values.len())
            .collect()
    }

    fn dimension_of(&self, argument: VariableId) -> Result<usize, Error> {
        self.arguments
            .iter()
            .position(|id| *id == argument)
            .ok_or(Error::UnknownVariable { id: argument.0 })
    }

    fn components_mut(&mut self) -> impl Iterator<Item = &mut Slot> {
        self.slots
            .iter_mut()
            .filter(|slot| slot.role == Role::Component)
    }

    /// Inserts `value` into the argument along `dim` and a
    /// default-valued slice into every component, returning the
    /// position of the new value.
    fn insert_argument_value(
        &mut self,
        dim: usize,
        value: Value,
        sorted: bool,
    ) -> Result<usize, Error> {
        let id = self.arguments[dim];
        let slot = self.slot_mut(id)?;
        let position = if sorted || slot.values.is_sorted() {
            slot.values.insertion_index(&value)?
        } else {
            slot.values.len()
        };
        slot.values.insert_at(0, position, 1)?;
        slot.values.set_flat(position, value)?;
        for component in self.components_mut() {
            component.values.insert_at(dim, position, 1)?;
        }
        self.generation += 1;
        tracing::debug!(dim, position, "inserted argument value");
        Ok(position)
    }
}

/// The values of an argument as seen through one dimension of a view.
fn seen_values(slot: &Slot, map: &DimMap) -> Result<Vec<Value>, Error> {
    map.parent_indexes()
        .into_iter()
        .map(|i| slot.values.get_flat(i).cloned().map_err(Error::from))
        .collect()
}

fn is_sorted(values: &[Value]) -> bool {
    values
        .windows(2)
        .all(|w| matches!(w[0].try_cmp(&w[1]), Ok(Ordering::Less | Ordering::Equal)))
}

fn is_strictly_sorted(values: &[Value]) -> bool {
    values
        .windows(2)
        .all(|w| matches!(w[0].try_cmp(&w[1]), Ok(Ordering::Less)))
}

/// The position of a value equal to `query`, by binary search when
/// `values` is known to be sorted.
fn exact_index(values: &[Value], query: &Value, sorted: bool) -> Result<Option<usize>, Error> {
    if sorted {
        let i = insertion_index_by(values, |x| x.try_cmp(query).unwrap_or(Ordering::Greater));
        return match values.get(i) {
            Some(v) if v.try_cmp(query)? == Ordering::Equal => Ok(Some(i)),
            _ => Ok(None),
        };
    }
    for (i, v) in values.iter().enumerate() {
        if v.try_cmp(query)? == Ordering::Equal {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

/// The arguments visible through `spec`, with their dimension in the
/// underlying grid.
fn visible_arguments(store: &Store, spec: &ViewSpec) -> Vec<(usize, VariableId)> {
    store
        .arguments
        .iter()
        .zip(spec.dims())
        .enumerate()
        .filter(|(_, (_, map))| !map.is_fixed())
        .map(|(dim, (id, _))| (dim, *id))
        .collect()
}

fn check_arity(expected: usize, got: usize) -> Result<(), Error> {
    if expected != got {
        return Err(ShapeError::InvalidDims { expected, got }.into());
    }
    Ok(())
}

fn check_editable(variable: &Variable) -> Result<(), Error> {
    if !variable.is_editable() {
        tracing::warn!(variable = variable.name(), "rejecting write to read-only variable");
        return Err(Error::unsupported(format!(
            "`{}` is not editable",
            variable.name()
        )));
    }
    Ok(())
}

/// Arguments and components over a shared store. See the module
/// documentation.
#[derive(Clone)]
pub struct Function {
    name: String,
    config: Config,
    store: Arc<RwLock<Store>>,
    listeners: Arc<Listeners>,
    components: Vec<VariableId>,
    projection: Option<ViewSpec>,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("components", &self.components)
            .field("projection", &self.projection)
            .finish()
    }
}

impl Function {
    /// An empty function configured from [`config::global`].
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, config::global::get())
    }

    pub fn with_config(name: impl Into<String>, config: Config) -> Self {
        Self {
            name: name.into(),
            config,
            store: Arc::new(RwLock::new(Store::default())),
            listeners: Arc::new(Listeners::default()),
            components: Vec::new(),
            projection: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether this function is a filtered projection of another.
    pub fn is_projection(&self) -> bool {
        self.projection.is_some()
    }

    pub fn projection(&self) -> Option<&ViewSpec> {
        self.projection.as_ref()
    }

    /// The number of times the underlying grid has been restructured.
    pub fn generation(&self) -> u64 {
        self.store.read().generation
    }

    /// A variable carrying this function's default policies.
    pub fn new_variable(&self, name: impl Into<String>, kind: ValueKind) -> Variable {
        Variable::new(name, kind)
            .with_interpolation(self.config.default_interpolation)
            .with_extrapolation(self.config.default_extrapolation)
    }

    /// The metadata of `id`.
    pub fn variable(&self, id: VariableId) -> Result<Variable, Error> {
        Ok(self.store.read().slot(id)?.variable.clone())
    }

    /// The visible variable named `name`, arguments first.
    pub fn find(&self, name: &str) -> Option<VariableId> {
        let store = self.store.read();
        self.arguments_in(&store)
            .into_iter()
            .chain(self.components.iter().copied())
            .find(|id| {
                store
                    .slot(*id)
                    .is_ok_and(|slot| slot.variable.name() == name)
            })
    }

    /// The arguments of this function, in dimension order. Reduced
    /// arguments of a projection are not included.
    pub fn arguments(&self) -> Vec<VariableId> {
        self.arguments_in(&self.store.read())
    }

    fn arguments_in(&self, store: &Store) -> Vec<VariableId> {
        match &self.projection {
            None => store.arguments.clone(),
            Some(spec) => visible_arguments(store, spec)
                .into_iter()
                .map(|(_, id)| id)
                .collect(),
        }
    }

    pub fn components(&self) -> &[VariableId] {
        &self.components
    }

    /// The `index`th component.
    pub fn component(&self, index: usize) -> Result<VariableId, Error> {
        self.components
            .get(index)
            .copied()
            .ok_or(Error::NoSuchComponent {
                index,
                count: self.components.len(),
            })
    }

    /// The number of values of each (visible) argument.
    pub fn shape(&self) -> Result<Vec<usize>, Error> {
        let store = self.store.read();
        Ok(self.spec(&store)?.shape())
    }

    /// The view of the grid this function sees: all of it, or its
    /// projection after checking it still applies.
    fn spec(&self, store: &Store) -> Result<ViewSpec, Error> {
        let shape = store.shape();
        let Some(spec) = &self.projection else {
            return Ok(ViewSpec::identity(shape, store.generation));
        };
        if self.config.check_view_generation {
            spec.check_generation(store.generation)?;
        }
        if spec.parent_shape() != shape.as_slice() {
            tracing::warn!(
                function = %self.name,
                expected = ?spec.parent_shape(),
                found = ?shape,
                "rejecting projection of restructured grid"
            );
            return Err(Error::StaleView {
                expected: spec.generation(),
                found: store.generation,
            });
        }
        Ok(spec.clone())
    }

    fn component_slot<'s>(&self, store: &'s Store, id: VariableId) -> Result<&'s Slot, Error> {
        if !self.components.contains(&id) {
            return Err(Error::UnknownVariable { id: id.0 });
        }
        store.slot(id)
    }

    fn check_owner(&self, op: &str) -> Result<(), Error> {
        if self.projection.is_some() {
            tracing::warn!(function = %self.name, op, "rejecting structural change through projection");
            return Err(Error::unsupported(format!(
                "{op} through a projected function"
            )));
        }
        Ok(())
    }

    /// Runs `f` under the store's write lock, then delivers the
    /// changes it recorded to the subscribers.
    fn mutate<R>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Store, &mut Vec<Change>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let _span = tracing::debug_span!("mutate", function = %self.name, op).entered();
        let mut changes = Vec::new();
        let result = {
            let mut store = self.store.write();
            f(&mut store, &mut changes)
        };
        if let Err(err) = &result {
            tracing::debug!(%err, "mutation failed");
        }
        self.listeners.notify(&changes);
        result
    }

    /// Adds an argument with no values as the last dimension. Every
    /// component becomes empty until the argument has values.
    pub fn add_argument(&mut self, variable: Variable) -> Result<VariableId, Error> {
        self.check_owner("adding an argument")?;
        self.mutate("add_argument", |store, _| {
            let id = VariableId(store.slots.len());
            tracing::debug!(name = variable.name(), %id, "adding argument");
            let values = Array::with_default(vec![0], variable.default_value().clone());
            store.slots.push(Slot {
                variable,
                role: Role::Argument,
                values,
            });
            store.arguments.push(id);
            let shape = store.shape();
            for component in store.components_mut() {
                component.values.resize(shape.clone());
            }
            store.generation += 1;
            Ok(id)
        })
    }

    /// Adds a component filled with its default value.
    pub fn add_component(&mut self, variable: Variable) -> Result<VariableId, Error> {
        self.check_owner("adding a component")?;
        let id = self.mutate("add_component", |store, _| {
            let id = VariableId(store.slots.len());
            tracing::debug!(name = variable.name(), %id, "adding component");
            let values = Array::with_default(store.shape(), variable.default_value().clone());
            store.slots.push(Slot {
                variable,
                role: Role::Component,
                values,
            });
            Ok(id)
        })?;
        self.components.push(id);
        Ok(id)
    }

    pub fn set_interpolation(&self, id: VariableId, interpolation: InterpolationType) -> Result<(), Error> {
        self.store
            .write()
            .slot_mut(id)?
            .variable
            .set_interpolation(interpolation);
        Ok(())
    }

    pub fn set_extrapolation(&self, id: VariableId, extrapolation: ExtrapolationType) -> Result<(), Error> {
        self.store
            .write()
            .slot_mut(id)?
            .variable
            .set_extrapolation(extrapolation);
        Ok(())
    }

    /// Replaces all values of an argument. Components keep the values
    /// whose indexes remain valid; new cells take their defaults.
    pub fn set_argument_values(&self, argument: VariableId, values: Vec<Value>) -> Result<(), Error> {
        self.check_owner("replacing argument values")?;
        let enforce_sorted = self.config.enforce_sorted_arguments;
        self.mutate("set_argument_values", |store, changes| {
            let dim = store.dimension_of(argument)?;
            let slot = store.slot_mut(argument)?;
            check_editable(&slot.variable)?;
            for value in &values {
                value.expect_kind(slot.variable.kind())?;
                value.check_orderable()?;
            }
            if enforce_sorted && !is_strictly_sorted(&values) {
                return Err(Error::NotSorted {
                    variable: slot.variable.name().to_string(),
                });
            }
            let len = values.len();
            slot.values.resize(vec![len]);
            slot.values.set_all(&values)?;

            changes.push(Change {
                kind: ChangeKind::Replace,
                variable: argument,
                dimension: Some(dim),
                range: 0..len,
            });

            let shape = store.shape();
            for (id, slot) in store.slots.iter_mut().enumerate() {
                if slot.role != Role::Component {
                    continue;
                }
                let before = slot.values.len();
                slot.values.resize(shape.clone());
                changes.push(Change {
                    kind: ChangeKind::Replace,
                    variable: VariableId(id),
                    dimension: None,
                    range: 0..before.max(slot.values.len()),
                });
            }
            store.generation += 1;
            Ok(())
        })
    }

    /// Replaces all values of a component, in row-major order over the
    /// (visible) grid.
    pub fn set_component_values(&self, component: VariableId, values: Vec<Value>) -> Result<(), Error> {
        self.mutate("set_component_values", |store, changes| {
            let spec = self.spec(store)?;
            let slot = self.component_slot(store, component)?;
            check_editable(&slot.variable)?;
            if values.len() != spec.len() {
                return Err(Error::ShapeMismatch {
                    variable: slot.variable.name().to_string(),
                    expected: spec.shape(),
                    got: vec![values.len()],
                });
            }
            for value in &values {
                value.expect_kind(slot.variable.kind())?;
            }
            if !spec.is_writable() {
                return Err(Error::unsupported(
                    "write through a projection whose gathered indexes repeat",
                ));
            }
            let targets: Vec<Vec<usize>> = spec.parent_indices().collect();
            let slot = store.slot_mut(component)?;
            for (index, value) in targets.iter().zip(values) {
                slot.values.set(index, value)?;
            }
            changes.push(Change {
                kind: ChangeKind::Replace,
                variable: component,
                dimension: None,
                range: 0..slot.values.len(),
            });
            Ok(())
        })
    }

    /// Sets `component` at the point `arguments` (one value per
    /// argument, in order). Argument values not yet on the grid are
    /// inserted in sorted position, growing every component.
    pub fn set_value(
        &self,
        component: VariableId,
        arguments: &[Value],
        value: impl Into<Value>,
    ) -> Result<(), Error> {
        let value = value.into();
        let sorted = self.config.enforce_sorted_arguments;
        self.mutate("set_value", |store, changes| {
            let slot = self.component_slot(store, component)?;
            check_editable(&slot.variable)?;
            value.expect_kind(slot.variable.kind())?;

            let index = match &self.projection {
                None => {
                    check_arity(store.arguments.len(), arguments.len())?;
                    // Resolve every argument before inserting any, so a
                    // rejected write leaves the grid untouched.
                    let mut resolved = Vec::with_capacity(arguments.len());
                    for (dim, query) in arguments.iter().enumerate() {
                        let arg = store.slot(store.arguments[dim])?;
                        query.expect_kind(arg.variable.kind())?;
                        let found = exact_index(arg.values.as_slice(), query, sorted)?;
                        if found.is_none() {
                            query.check_orderable()?;
                            check_editable(&arg.variable)?;
                        }
                        resolved.push(found);
                    }

                    let mut index = Vec::with_capacity(arguments.len());
                    for (dim, (found, query)) in resolved.into_iter().zip(arguments).enumerate() {
                        if let Some(i) = found {
                            index.push(i);
                            continue;
                        }
                        let position = store.insert_argument_value(dim, query.clone(), sorted)?;
                        changes.push(Change {
                            kind: ChangeKind::Insert,
                            variable: store.arguments[dim],
                            dimension: Some(dim),
                            range: position..position + 1,
                        });
                        index.push(position);
                    }
                    index
                }
                Some(_) => {
                    let spec = self.spec(store)?;
                    if !spec.is_writable() {
                        return Err(Error::unsupported(
                            "write through a projection whose gathered indexes repeat",
                        ));
                    }
                    let visible = visible_arguments(store, &spec);
                    check_arity(visible.len(), arguments.len())?;
                    let mut local = Vec::with_capacity(arguments.len());
                    for ((dim, id), query) in visible.iter().zip(arguments) {
                        let arg = store.slot(*id)?;
                        query.expect_kind(arg.variable.kind())?;
                        let seen = seen_values(arg, &spec.dims()[*dim])?;
                        let i = exact_index(&seen, query, false)?.ok_or_else(|| {
                            tracing::warn!(variable = arg.variable.name(), %query, "rejecting insertion through projection");
                            Error::unsupported(format!(
                                "inserting {} into `{}` through a projected function",
                                query,
                                arg.variable.name()
                            ))
                        })?;
                        local.push(i);
                    }
                    spec.to_parent(&local)?
                }
            };

            let slot = store.slot_mut(component)?;
            let flat = slot.values.layout().location(&index)?;
            slot.values.set_flat(flat, value)?;
            changes.push(Change {
                kind: ChangeKind::Replace,
                variable: component,
                dimension: None,
                range: flat..flat + 1,
            });
            Ok(())
        })
    }

    /// The value of `component` at the point `arguments`. Points off
    /// the grid are interpolated, and points outside it extrapolated,
    /// according to each argument's policies.
    pub fn get_value(&self, component: VariableId, arguments: &[Value]) -> Result<Value, Error> {
        let store = self.store.read();
        let spec = self.spec(&store)?;
        let slot = self.component_slot(&store, component)?;
        let visible = visible_arguments(&store, &spec);
        check_arity(visible.len(), arguments.len())?;

        let mut brackets = Vec::with_capacity(arguments.len());
        for ((dim, id), query) in visible.iter().zip(arguments) {
            let arg = store.slot(*id)?;
            let seen = seen_values(arg, &spec.dims()[*dim])?;
            let variable = &arg.variable;
            let bracket = if is_sorted(&seen) {
                interpolate::locate(
                    variable.name(),
                    &seen,
                    query,
                    variable.interpolation(),
                    variable.extrapolation(),
                )?
            } else {
                // A gathered, unordered axis: exact matches only.
                query.expect_kind(variable.kind())?;
                let i = exact_index(&seen, query, false)?.ok_or_else(|| Error::ValueNotFound {
                    variable: variable.name().to_string(),
                    value: query.clone(),
                })?;
                interpolate::Bracket::Sample(i)
            };
            brackets.push(bracket);
        }

        interpolate::evaluate(&brackets, |local| {
            let parent = spec.to_parent(local)?;
            Ok(slot.values.get(&parent)?.clone())
        })
    }

    /// Sets `component` at a multi-index of the (visible) grid.
    pub fn set_value_at(
        &self,
        component: VariableId,
        index: &[usize],
        value: impl Into<Value>,
    ) -> Result<(), Error> {
        let value = value.into();
        self.mutate("set_value_at", |store, changes| {
            let spec = self.spec(store)?;
            let slot = self.component_slot(store, component)?;
            check_editable(&slot.variable)?;
            value.expect_kind(slot.variable.kind())?;
            if !spec.is_writable() {
                return Err(Error::unsupported(
                    "write through a projection whose gathered indexes repeat",
                ));
            }
            let parent = spec.to_parent(index)?;
            let slot = store.slot_mut(component)?;
            let flat = slot.values.layout().location(&parent)?;
            slot.values.set_flat(flat, value)?;
            changes.push(Change {
                kind: ChangeKind::Replace,
                variable: component,
                dimension: None,
                range: flat..flat + 1,
            });
            Ok(())
        })
    }

    /// The value of `component` at a multi-index of the (visible)
    /// grid.
    pub fn get_value_at(&self, component: VariableId, index: &[usize]) -> Result<Value, Error> {
        let store = self.store.read();
        let spec = self.spec(&store)?;
        let slot = self.component_slot(&store, component)?;
        let parent = spec.to_parent(index)?;
        Ok(slot.values.get(&parent)?.clone())
    }

    /// Removes `value` from an argument, together with the component
    /// slices along it.
    pub fn remove_argument_value(&self, argument: VariableId, value: &Value) -> Result<(), Error> {
        self.check_owner("removing argument values")?;
        let sorted = self.config.enforce_sorted_arguments;
        self.mutate("remove_argument_value", |store, changes| {
            let dim = store.dimension_of(argument)?;
            let slot = store.slot_mut(argument)?;
            check_editable(&slot.variable)?;
            let index = exact_index(slot.values.as_slice(), value, sorted)?.ok_or_else(|| {
                Error::ValueNotFound {
                    variable: slot.variable.name().to_string(),
                    value: value.clone(),
                }
            })?;
            slot.values.remove_at(0, index, 1)?;
            for component in store.components_mut() {
                component.values.remove_at(dim, index, 1)?;
            }
            store.generation += 1;
            tracing::debug!(dim, index, "removed argument value");
            changes.push(Change {
                kind: ChangeKind::Remove,
                variable: argument,
                dimension: Some(dim),
                range: index..index + 1,
            });
            Ok(())
        })
    }

    /// Removes every argument value, emptying all components.
    pub fn clear(&self) -> Result<(), Error> {
        self.check_owner("clearing")?;
        self.mutate("clear", |store, changes| {
            let arguments = store.arguments.clone();
            for (dim, id) in arguments.iter().enumerate() {
                let slot = store.slot_mut(*id)?;
                let len = slot.values.len();
                slot.values.resize(vec![0]);
                changes.push(Change {
                    kind: ChangeKind::Clear,
                    variable: *id,
                    dimension: Some(dim),
                    range: 0..len,
                });
            }
            let shape = store.shape();
            for (id, slot) in store.slots.iter_mut().enumerate() {
                if slot.role != Role::Component {
                    continue;
                }
                let len = slot.values.len();
                slot.values.resize(shape.clone());
                changes.push(Change {
                    kind: ChangeKind::Clear,
                    variable: VariableId(id),
                    dimension: None,
                    range: 0..len,
                });
            }
            store.generation += 1;
            tracing::debug!("cleared function");
            Ok(())
        })
    }

    /// All values of a visible variable: an argument's values along its
    /// dimension, or a component's values in row-major order.
    pub fn values(&self, variable: VariableId) -> Result<Vec<Value>, Error> {
        let store = self.store.read();
        let spec = self.spec(&store)?;
        if let Some((dim, _)) = visible_arguments(&store, &spec)
            .into_iter()
            .find(|(_, id)| *id == variable)
        {
            return seen_values(store.slot(variable)?, &spec.dims()[dim]);
        }
        let slot = self.component_slot(&store, variable)?;
        spec.parent_indices()
            .map(|index| -> Result<Value, Error> { Ok(slot.values.get(&index)?.clone()) })
            .collect()
    }

    /// The values of a visible argument.
    pub fn argument_values(&self, argument: VariableId) -> Result<Vec<Value>, Error> {
        if !self.arguments().contains(&argument) {
            return Err(Error::UnknownVariable { id: argument.0 });
        }
        self.values(argument)
    }

    /// Fails with [`Error::ShapeMismatch`] if a component's shape
    /// disagrees with the argument lengths.
    pub fn check_shapes(&self) -> Result<(), Error> {
        let store = self.store.read();
        let shape = store.shape();
        for slot in store.slots.iter().filter(|s| s.role == Role::Component) {
            if slot.values.shape() != shape.as_slice() {
                return Err(Error::ShapeMismatch {
                    variable: slot.variable.name().to_string(),
                    expected: shape,
                    got: slot.values.shape().to_vec(),
                });
            }
        }
        Ok(())
    }

    /// Applies `filters` and returns the projected function.
    ///
    /// Filters on the same variable are intersected first. Selections
    /// (values, index ranges, aggregations) then narrow their argument's
    /// dimension; reductions remove dimensions that are down to a
    /// single index; component filters pick the components the
    /// projection exposes.
    pub fn filter(&self, filters: &[Filter]) -> Result<Function, Error> {
        let store = self.store.read();
        let mut spec = self.spec(&store)?;

        let mut selections: Vec<Filter> = Vec::new();
        let mut reductions: Vec<VariableId> = Vec::new();
        let mut components: Vec<VariableId> = Vec::new();
        for filter in filters {
            let variable = filter.variable();
            match filter {
                Filter::Component(_) => {
                    if !self.components.contains(&variable) {
                        return Err(Error::incompatible(format!(
                            "component filter on {variable}, which is not a component"
                        )));
                    }
                    if !components.contains(&variable) {
                        components.push(variable);
                    }
                }
                Filter::Reduce(_) => {
                    if !reductions.contains(&variable) {
                        reductions.push(variable);
                    }
                }
                _ => match selections.iter_mut().find(|f| f.variable() == variable) {
                    Some(existing) => *existing = existing.intersect(Some(filter))?,
                    None => selections.push(filter.clone()),
                },
            }
        }

        let local_dim = |spec: &ViewSpec, variable: VariableId| -> Result<usize, Error> {
            visible_arguments(&store, spec)
                .iter()
                .position(|(_, id)| *id == variable)
                .ok_or_else(|| {
                    Error::incompatible(format!("{variable} is not an argument of `{}`", self.name))
                })
        };

        for filter in &selections {
            let variable = filter.variable();
            let dim = local_dim(&spec, variable)?;
            let parent = spec.parent_dim(dim)?;
            let arg = store.slot(variable)?;
            let seen = seen_values(arg, &spec.dims()[parent])?;
            spec = match filter.resolve(arg.variable.name(), &seen)? {
                Selection::Window { start, end } => spec.select(dim, start, end)?,
                Selection::Indexes(indexes) => spec.select_indexes(dim, &indexes)?,
            };
        }

        let mut dims = reductions
            .iter()
            .map(|variable| local_dim(&spec, *variable))
            .collect::<Result<Vec<_>, _>>()?;
        dims.sort_unstable_by(|a, b| b.cmp(a));
        for dim in dims {
            let len = spec.shape()[dim];
            if len != 1 {
                return Err(Error::InvalidFilter {
                    reason: format!(
                        "reducing dimension {dim} needs exactly one index, found {len}"
                    ),
                });
            }
            spec = spec.reduce(dim, 0)?;
        }

        tracing::debug!(
            function = %self.name,
            filters = filters.len(),
            shape = ?spec.shape(),
            "projected function"
        );
        Ok(Function {
            name: self.name.clone(),
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            listeners: Arc::clone(&self.listeners),
            components: if components.is_empty() {
                self.components.clone()
            } else {
                components
            },
            projection: Some(spec),
        })
    }

    /// This projection, recomputed against the current grid. The
    /// projection keeps the same indexes and fails if any of them no
    /// longer exist.
    pub fn rebase(&self) -> Result<Function, Error> {
        let Some(spec) = &self.projection else {
            return Ok(self.clone());
        };
        let store = self.store.read();
        let spec = spec.rebase_to(&store.shape(), store.generation)?;
        Ok(Function {
            projection: Some(spec),
            ..self.clone()
        })
    }

    /// Registers `listener` to receive every change made through this
    /// function or any function sharing its store.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::strategy::gen_sorted_values;

    fn grid() -> (Function, VariableId, VariableId, VariableId) {
        let mut f = Function::with_config("f", Config::default());
        let x = f.add_argument(f.new_variable("x", ValueKind::Int)).unwrap();
        let y = f.add_argument(f.new_variable("y", ValueKind::Int)).unwrap();
        let z = f.add_component(f.new_variable("z", ValueKind::Float)).unwrap();
        for xv in 1..=3i64 {
            for yv in 1..=2i64 {
                f.set_value(z, &[xv.into(), yv.into()], (10 * xv + yv) as f64)
                    .unwrap();
            }
        }
        (f, x, y, z)
    }

    #[test]
    fn test_set_value_grows_grid() {
        let (f, x, y, z) = grid();
        assert_eq!(f.shape().unwrap(), vec![3, 2]);
        assert_eq!(
            f.argument_values(x).unwrap(),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
        assert_eq!(
            f.get_value(z, &[2.into(), 1.into()]).unwrap(),
            Value::Float(21.0)
        );

        // Insert in the middle of x: the new slice takes defaults.
        f.set_value(z, &[Value::Int(0), Value::Int(2)], -1.0).unwrap();
        assert_eq!(f.argument_values(x).unwrap()[0], Value::Int(0));
        assert_eq!(f.get_value_at(z, &[0, 0]).unwrap(), Value::Float(0.0));
        assert_eq!(f.get_value_at(z, &[0, 1]).unwrap(), Value::Float(-1.0));
        assert_eq!(f.get_value_at(z, &[1, 1]).unwrap(), Value::Float(12.0));
        assert_eq!(f.argument_values(y).unwrap().len(), 2);
        f.check_shapes().unwrap();
    }

    #[test]
    fn test_kind_and_arity_errors() {
        let (f, _, _, z) = grid();
        assert!(matches!(
            f.set_value(z, &[1.into(), 1.into()], 5),
            Err(Error::KindMismatch { .. })
        ));
        assert!(matches!(
            f.set_value(z, &[1.5.into(), 1.into()], 5.0),
            Err(Error::KindMismatch { .. })
        ));
        assert!(f.get_value(z, &[1.into()]).is_err());
        assert!(matches!(
            f.get_value(VariableId(42), &[1.into(), 1.into()]),
            Err(Error::UnknownVariable { id: 42 })
        ));
        assert!(matches!(
            f.component(3),
            Err(Error::NoSuchComponent { index: 3, count: 1 })
        ));
    }

    #[test]
    fn test_interpolated_read() {
        let (f, _, _, z) = grid();
        // x = 4 lies past the last stored x.
        f.set_interpolation(VariableId(0), InterpolationType::Linear)
            .unwrap();
        assert!(matches!(
            f.get_value(z, &[4.into(), 1.into()]),
            Err(Error::OutOfRange { .. })
        ));
        f.set_extrapolation(VariableId(0), ExtrapolationType::Constant)
            .unwrap();
        assert_eq!(
            f.get_value(z, &[4.into(), 1.into()]).unwrap(),
            Value::Float(31.0)
        );
    }

    #[test]
    fn test_read_only_variables() {
        let mut f = Function::with_config("f", Config::default());
        let x = f
            .add_argument(f.new_variable("x", ValueKind::Int).with_editable(false))
            .unwrap();
        let z = f.add_component(f.new_variable("z", ValueKind::Int)).unwrap();
        assert!(matches!(
            f.set_value(z, &[1.into()], 1),
            Err(Error::UnsupportedOperation { .. })
        ));
        assert!(f.set_argument_values(x, vec![1.into()]).is_err());
    }

    #[test]
    fn test_set_argument_values() {
        let (f, x, _, z) = grid();
        assert!(matches!(
            f.set_argument_values(x, vec![3.into(), 1.into()]),
            Err(Error::NotSorted { .. })
        ));
        assert!(matches!(
            f.set_argument_values(x, vec![1.into(), 1.into()]),
            Err(Error::NotSorted { .. })
        ));
        f.set_argument_values(x, vec![5.into(), 6.into()]).unwrap();
        assert_eq!(f.shape().unwrap(), vec![2, 2]);
        // Surviving cells keep their values.
        assert_eq!(
            f.get_value(z, &[6.into(), 2.into()]).unwrap(),
            Value::Float(22.0)
        );
    }

    #[test]
    fn test_unsorted_arguments_when_allowed() {
        let config = Config {
            enforce_sorted_arguments: false,
            ..Config::default()
        };
        let mut f = Function::with_config("f", config);
        let x = f.add_argument(f.new_variable("x", ValueKind::Int)).unwrap();
        let z = f.add_component(f.new_variable("z", ValueKind::Int)).unwrap();
        f.set_argument_values(x, vec![3.into(), 1.into()]).unwrap();
        f.set_value(z, &[2.into()], 7).unwrap();
        assert_eq!(
            f.argument_values(x).unwrap(),
            vec![Value::Int(3), Value::Int(1), Value::Int(2)]
        );
        assert_eq!(f.get_value(z, &[2.into()]).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_remove_and_clear() {
        let (f, x, y, z) = grid();
        f.remove_argument_value(x, &Value::Int(2)).unwrap();
        assert_eq!(f.shape().unwrap(), vec![2, 2]);
        assert_eq!(
            f.values(z).unwrap(),
            vec![11.0, 12.0, 31.0, 32.0]
                .into_iter()
                .map(Value::from)
                .collect::<Vec<_>>()
        );
        assert!(matches!(
            f.remove_argument_value(y, &Value::Int(9)),
            Err(Error::ValueNotFound { .. })
        ));

        f.clear().unwrap();
        assert_eq!(f.shape().unwrap(), vec![0, 0]);
        assert!(f.values(z).unwrap().is_empty());
        f.check_shapes().unwrap();
    }

    #[test]
    fn test_set_component_values() {
        let (f, _, _, z) = grid();
        let values: Vec<Value> = (0..6).map(|v| Value::Float(v as f64)).collect();
        f.set_component_values(z, values.clone()).unwrap();
        assert_eq!(f.values(z).unwrap(), values);
        assert!(matches!(
            f.set_component_values(z, values[..5].to_vec()),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_find() {
        let (f, x, _, z) = grid();
        assert_eq!(f.find("x"), Some(x));
        assert_eq!(f.find("z"), Some(z));
        assert_eq!(f.find("w"), None);
        assert_eq!(f.variable(z).unwrap().kind(), ValueKind::Float);
    }

    #[test]
    fn test_structural_changes_through_projection() {
        let (f, x, _, _) = grid();
        let mut p = f.filter(&[Filter::index_range(x, 0, 1)]).unwrap();
        assert!(p.is_projection());
        assert!(p.clear().is_err());
        assert!(p.remove_argument_value(x, &Value::Int(1)).is_err());
        assert!(p.add_argument(Variable::new("w", ValueKind::Int)).is_err());
    }

    #[test]
    fn test_failed_write_leaves_grid_unchanged() {
        let mut f = Function::with_config("f", Config::default());
        let x = f.add_argument(f.new_variable("x", ValueKind::Int)).unwrap();
        let y = f
            .add_argument(f.new_variable("y", ValueKind::Int).with_editable(false))
            .unwrap();
        let z = f.add_component(f.new_variable("z", ValueKind::Float)).unwrap();
        f.set_argument_values(x, vec![1.into()]).unwrap();
        let generation = f.generation();

        // x = 5 is new; the second argument fails the write.
        assert!(matches!(
            f.set_value(z, &[Value::Int(5), Value::Float(1.5)], 2.0),
            Err(Error::KindMismatch { .. })
        ));
        assert!(matches!(
            f.set_value(z, &[Value::Int(5), Value::Int(1)], 2.0),
            Err(Error::UnsupportedOperation { .. })
        ));
        assert_eq!(f.shape().unwrap(), vec![1, 0]);
        assert_eq!(f.argument_values(x).unwrap(), vec![Value::Int(1)]);
        assert!(f.argument_values(y).unwrap().is_empty());
        assert_eq!(f.generation(), generation);
        f.check_shapes().unwrap();
    }

    #[test]
    fn test_nan_argument_rejected() {
        let mut f = Function::with_config("f", Config::default());
        let x = f.add_argument(f.new_variable("x", ValueKind::Float)).unwrap();
        let y = f.add_component(f.new_variable("y", ValueKind::Float)).unwrap();
        let n = f.add_component(f.new_variable("n", ValueKind::Int)).unwrap();
        f.set_argument_values(x, vec![0.0.into(), 10.0.into()]).unwrap();
        f.set_component_values(y, vec![1.0.into(), 2.0.into()]).unwrap();
        f.set_component_values(n, vec![1.into(), 2.into()]).unwrap();

        assert!(matches!(
            f.set_value(y, &[Value::Float(f64::NAN)], 3.0),
            Err(Error::InvalidValue { .. })
        ));
        assert!(matches!(
            f.set_argument_values(x, vec![0.0.into(), Value::Float(f64::NAN)]),
            Err(Error::InvalidValue { .. })
        ));
        assert_eq!(f.shape().unwrap(), vec![2]);
        for component in [y, n] {
            assert!(matches!(
                f.get_value(component, &[Value::Float(20.0)]),
                Err(Error::OutOfRange { .. })
            ));
        }
    }

    #[test]
    fn test_signed_zero_is_one_point() {
        let mut f = Function::with_config("f", Config::default());
        let x = f.add_argument(f.new_variable("x", ValueKind::Float)).unwrap();
        let y = f.add_component(f.new_variable("y", ValueKind::Float)).unwrap();
        f.set_value(y, &[Value::Float(0.0)], 1.0).unwrap();
        f.set_value(y, &[Value::Float(-0.0)], 2.0).unwrap();
        assert_eq!(f.argument_values(x).unwrap().len(), 1);
        assert_eq!(
            f.get_value(y, &[Value::Float(0.0)]).unwrap(),
            Value::Float(2.0)
        );
    }

    #[test]
    fn test_set_argument_values_reports_components() {
        let (f, x, _, z) = grid();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        f.subscribe(move |change: &Change| sink.lock().push(change.clone()));

        f.set_argument_values(x, vec![7.into()]).unwrap();
        let changes = seen.lock();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].variable, x);
        assert_eq!(changes[0].dimension, Some(0));
        assert_eq!(changes[1].kind, ChangeKind::Replace);
        assert_eq!(changes[1].variable, z);
        assert_eq!(changes[1].dimension, None);
        assert_eq!(changes[1].range, 0..6);
    }

    proptest! {
        #[test]
        fn set_then_get_in_any_order(values in gen_sorted_values(20)) {
            let mut f = Function::with_config("f", Config::default());
            let x = f.add_argument(f.new_variable("x", ValueKind::Int)).unwrap();
            let y = f.add_component(f.new_variable("y", ValueKind::Int)).unwrap();
            // Write back to front so every insertion lands before the
            // existing samples.
            for v in values.iter().rev() {
                f.set_value(y, &[Value::Int(*v)], 2 * v).unwrap();
            }
            prop_assert_eq!(
                f.argument_values(x).unwrap(),
                values.iter().copied().map(Value::Int).collect::<Vec<_>>()
            );
            for v in &values {
                prop_assert_eq!(f.get_value(y, &[Value::Int(*v)]).unwrap(), Value::Int(2 * v));
            }
        }
    }
}
