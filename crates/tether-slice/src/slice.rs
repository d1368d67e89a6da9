//! Slice definition, validation and runtime wiring

use crate::actions::SliceActions;
use crate::error::{Result, SliceError};
use crate::keys::SliceKeys;
use crate::node::{ActionNode, KeyNode};
use indexmap::IndexMap;
use tether_core::{
    ActionKind, Dispatcher, DispatcherConfig, EventStream, HandlerMap, KeyPath, Store,
};

/// Raw definition of a slice
#[derive(Debug, Clone)]
pub struct SliceDef {
    /// Key tree; must be a branch
    pub keys: KeyNode,
    /// Action tree; must be a branch
    pub actions: ActionNode,
}

/// A validated slice: namespaced keys, actions and their handlers
#[derive(Debug, Clone)]
pub struct Slice {
    keys: SliceKeys,
    actions: SliceActions,
}

/// A running slice: its store, dispatcher and event stream
#[derive(Debug)]
pub struct SliceRuntime {
    pub store: Store,
    pub dispatcher: Dispatcher,
    pub events: EventStream,
}

impl Slice {
    /// Validate and flatten a definition
    ///
    /// Paths are derived from the tree shape alone, so the same definition
    /// always yields the same paths.
    pub fn create(def: SliceDef) -> Result<Self> {
        if !matches!(def.keys, KeyNode::Branch(_)) {
            return Err(SliceError::RootNotBranch { section: "keys" });
        }
        let root = KeyPath::new("");
        validate_keys(&def.keys, &root)?;

        let ActionNode::Branch(_) = &def.actions else {
            return Err(SliceError::RootNotBranch { section: "actions" });
        };
        let mut entries = IndexMap::new();
        flatten_actions(&def.actions, &root, &mut entries)?;

        Ok(Self {
            keys: SliceKeys::new(def.keys, root),
            actions: SliceActions::new(entries),
        })
    }

    pub fn keys(&self) -> &SliceKeys {
        &self.keys
    }

    pub fn actions(&self) -> &SliceActions {
        &self.actions
    }

    /// Registry with one handler per action kind
    pub fn handlers(&self) -> HandlerMap {
        self.actions.handlers()
    }

    /// Start this slice alone, see [`init_slice`]
    pub fn init(&self, store: Option<Store>) -> SliceRuntime {
        init_slice(&[self], store)
    }
}

/// Start one or more slices on a shared store
///
/// Static key leaves are seeded with their initial values where the store
/// has no cell yet. Handlers are merged in order; a later slice wins on a
/// duplicate kind.
pub fn init_slice(slices: &[&Slice], store: Option<Store>) -> SliceRuntime {
    init_slice_with_config(slices, store, DispatcherConfig::default())
}

/// [`init_slice`] with an explicit dispatcher configuration
pub fn init_slice_with_config(
    slices: &[&Slice],
    store: Option<Store>,
    config: DispatcherConfig,
) -> SliceRuntime {
    let store = store.unwrap_or_default();
    let mut handlers = HandlerMap::new();
    let mut seeded = 0;

    for slice in slices {
        for update in slice.keys.initial_updates() {
            if !store.has(update.key()) {
                store.apply(&update);
                seeded += 1;
            }
        }
        handlers.merge(slice.handlers());
    }

    tracing::debug!(
        slices = slices.len(),
        seeded,
        handlers = handlers.len(),
        "slice runtime initialized"
    );

    let (dispatcher, events) = Dispatcher::with_config(store.clone(), handlers, config);
    SliceRuntime {
        store,
        dispatcher,
        events,
    }
}

/// Check that `segment` can be used as a path component
pub(crate) fn validate_segment(parent: &KeyPath, segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(SliceError::EmptySegment {
            parent: parent.clone(),
        });
    }
    if segment.contains('/') {
        return Err(SliceError::InvalidSegment {
            parent: parent.clone(),
            segment: segment.to_string(),
        });
    }
    Ok(())
}

/// Validate a key subtree rooted at `path`
///
/// Parameterized nodes are checked when a segment is supplied.
pub(crate) fn validate_keys(node: &KeyNode, path: &KeyPath) -> Result<()> {
    match node {
        KeyNode::Leaf(_) | KeyNode::Param(_) => Ok(()),
        KeyNode::Branch(children) => {
            if children.is_empty() {
                return Err(SliceError::EmptyBranch { path: path.clone() });
            }
            for (name, child) in children {
                validate_segment(path, name)?;
                validate_keys(child, &path.join(name))?;
            }
            Ok(())
        }
    }
}

fn flatten_actions(
    node: &ActionNode,
    path: &KeyPath,
    out: &mut IndexMap<ActionKind, crate::node::HandlerNode>,
) -> Result<()> {
    match node {
        ActionNode::Handler(handler) => {
            out.insert(ActionKind::new(path.as_str()), handler.clone());
            Ok(())
        }
        ActionNode::Branch(children) => {
            if children.is_empty() {
                return Err(SliceError::EmptyBranch { path: path.clone() });
            }
            for (name, child) in children {
                validate_segment(path, name)?;
                flatten_actions(child, &path.join(name), out)?;
            }
            Ok(())
        }
    }
}
