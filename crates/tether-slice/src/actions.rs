//! Typed access to a slice's actions

use crate::error::{Result, SliceError};
use crate::node::HandlerNode;
use indexmap::IndexMap;
use std::any::TypeId;
use std::fmt;
use tether_core::{Action, ActionKind, ActionType, HandlerMap};

/// Flattened action tree of a slice: one kind per handler leaf
#[derive(Clone)]
pub struct SliceActions {
    entries: IndexMap<ActionKind, HandlerNode>,
}

impl SliceActions {
    pub(crate) fn new(entries: IndexMap<ActionKind, HandlerNode>) -> Self {
        Self { entries }
    }

    /// Typed descriptor for the action at `path`
    pub fn action_type<P: Send + Sync + 'static>(&self, path: &str) -> Result<ActionType<P>> {
        let kind = ActionKind::new(path);
        let node = self
            .entries
            .get(&kind)
            .ok_or_else(|| SliceError::UnknownAction { kind: kind.clone() })?;
        if node.payload != TypeId::of::<P>() {
            return Err(SliceError::PayloadTypeMismatch {
                kind,
                expected: std::any::type_name::<P>(),
                found: node.payload_name,
            });
        }
        Ok(ActionType::new(kind))
    }

    /// Build the action at `path` with `payload`
    pub fn create<P: Send + Sync + 'static>(&self, path: &str, payload: P) -> Result<Action> {
        Ok(self.action_type::<P>(path)?.create(payload))
    }

    /// Every action kind, in definition order
    pub fn kinds(&self) -> impl Iterator<Item = &ActionKind> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registry with one handler per action kind
    pub fn handlers(&self) -> HandlerMap {
        self.entries
            .iter()
            .map(|(kind, node)| (kind.clone(), node.handler.clone()))
            .collect()
    }
}

impl fmt::Debug for SliceActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(kind, node)| (kind, node.payload_name)))
            .finish()
    }
}
