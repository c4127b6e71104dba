/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Change notification.
//!
//! A [`crate::Function`] reports the changes each mutation applied to
//! the callbacks registered with [`crate::Function::subscribe`]. Callbacks
//! run on the mutating thread, after the store lock is released, so a
//! callback may read (or write) the function it observes.

use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;

use crate::variable::VariableId;

/// What a mutation did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// New argument values (and the component slices along them).
    Insert,
    /// Argument values removed (and the component slices along them).
    Remove,
    /// Values overwritten in place.
    Replace,
    /// All values removed.
    Clear,
}

/// One mutation of one variable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub variable: VariableId,
    /// The function dimension affected, for argument changes.
    pub dimension: Option<usize>,
    /// Affected positions: along `dimension` for argument changes,
    /// flat row-major indices otherwise.
    pub range: Range<usize>,
}

/// Identifies a registered callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&Change) + Send + Sync>;

#[derive(Default)]
struct State {
    next: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

/// The callbacks registered on a function and its projections.
#[derive(Default)]
pub(crate) struct Listeners {
    state: Mutex<State>,
}

impl Listeners {
    pub(crate) fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        let id = SubscriptionId(state.next);
        state.next += 1;
        state.listeners.push((id, Arc::new(listener)));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(other, _)| *other != id);
        state.listeners.len() != before
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Delivers `changes`, in order, to every listener. The registry
    /// is not locked while callbacks run.
    pub(crate) fn notify(&self, changes: &[Change]) {
        if changes.is_empty() {
            return;
        }
        let listeners: Vec<Listener> = self
            .state
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for change in changes {
            tracing::trace!(?change, listeners = listeners.len(), "notifying");
            for listener in &listeners {
                listener(change);
            }
        }
    }
}
