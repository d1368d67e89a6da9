//! Store mutations produced by handlers
//!
//! Handlers never mutate the store directly. They stage `StoreUpdate`s
//! which the dispatcher applies in order and republishes to observers, so
//! what a handler intended and what was applied travel one path.

use crate::key::{downcast_ref, SharedValue, StoreKey, StoreValue};
use crate::{KeyPath, Trace};
use std::sync::Arc;

/// A single mutation of the store
#[derive(Debug, Clone)]
pub enum StoreUpdate {
    /// Store a value under a key
    Set {
        /// The slot to write
        key: KeyPath,
        /// The new value
        value: SharedValue,
        /// Action kinds that caused this update, outermost first
        trace: Trace,
    },

    /// Remove a key and complete its subscribers
    Del {
        /// The slot to remove
        key: KeyPath,
        /// Action kinds that caused this update, outermost first
        trace: Trace,
    },
}

impl StoreUpdate {
    /// Create a set update with an empty trace
    pub fn set<T: StoreValue>(key: &StoreKey<T>, value: T) -> Self {
        StoreUpdate::Set {
            key: key.path().clone(),
            value: Arc::new(value),
            trace: Vec::new(),
        }
    }

    /// Create a delete update with an empty trace
    pub fn del<T>(key: &StoreKey<T>) -> Self {
        StoreUpdate::Del {
            key: key.path().clone(),
            trace: Vec::new(),
        }
    }

    /// Replace the trace
    pub fn with_trace(mut self, new_trace: Trace) -> Self {
        match &mut self {
            StoreUpdate::Set { trace, .. } | StoreUpdate::Del { trace, .. } => *trace = new_trace,
        }
        self
    }

    /// The slot this update targets
    pub fn key(&self) -> &KeyPath {
        match self {
            StoreUpdate::Set { key, .. } | StoreUpdate::Del { key, .. } => key,
        }
    }

    /// The causal chain of this update
    pub fn trace(&self) -> &[crate::ActionKind] {
        match self {
            StoreUpdate::Set { trace, .. } | StoreUpdate::Del { trace, .. } => trace,
        }
    }

    /// Check if this is a set
    pub fn is_set(&self) -> bool {
        matches!(self, StoreUpdate::Set { .. })
    }

    /// The value written by a set, as a concrete type
    pub fn value<T: 'static>(&self) -> Option<&T> {
        match self {
            StoreUpdate::Set { value, .. } => downcast_ref::<T>(value),
            StoreUpdate::Del { .. } => None,
        }
    }

    /// Compare two updates by key and value only
    pub fn eq_ignoring_trace(&self, other: &StoreUpdate) -> bool {
        match (self, other) {
            (
                StoreUpdate::Set { key: a, value: va, .. },
                StoreUpdate::Set { key: b, value: vb, .. },
            ) => a == b && va.eq_value(&**vb),
            (StoreUpdate::Del { key: a, .. }, StoreUpdate::Del { key: b, .. }) => a == b,
            _ => false,
        }
    }
}
