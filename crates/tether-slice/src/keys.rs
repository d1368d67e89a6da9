//! Typed access to a slice's key tree

use crate::error::{Result, SliceError};
use crate::node::{Initializer, KeyNode};
use std::sync::Arc;
use tether_core::{KeyPath, StoreKey, StoreUpdate};

/// Resolved key tree of a slice
///
/// Paths are `/`-joined node names from the slice root. A parameterized
/// node consumes the next path segment as its argument, so
/// `todoItem/a1` addresses the leaf built by `todoItem`'s function for `a1`.
#[derive(Debug, Clone)]
pub struct SliceKeys {
    root: Arc<KeyNode>,
    prefix: KeyPath,
}

impl SliceKeys {
    pub(crate) fn new(root: KeyNode, prefix: KeyPath) -> Self {
        Self {
            root: Arc::new(root),
            prefix,
        }
    }

    /// Path of this subtree from the slice root
    pub fn prefix(&self) -> &KeyPath {
        &self.prefix
    }

    /// Typed key for the leaf at `path`
    pub fn key<T: 'static>(&self, path: &str) -> Result<StoreKey<T>> {
        let (path, node) = self.resolve(path)?;
        match node {
            KeyNode::Leaf(init) if init.is::<T>() => Ok(StoreKey::new(path)),
            KeyNode::Leaf(init) => Err(SliceError::KeyTypeMismatch {
                path,
                expected: std::any::type_name::<T>(),
                found: init.type_name,
            }),
            other => Err(SliceError::UnexpectedNode {
                path,
                expected: "leaf",
                found: other.shape(),
            }),
        }
    }

    /// Typed key for the leaf a parameterized node builds for `segment`
    pub fn param_key<T: 'static>(&self, name: &str, segment: &str) -> Result<StoreKey<T>> {
        self.expect_param(name, segment)?;
        self.key(&format!("{}/{}", name, segment))
    }

    /// The subtree at `path`
    pub fn branch(&self, path: &str) -> Result<SliceKeys> {
        let (path, node) = self.resolve(path)?;
        match node {
            KeyNode::Branch(_) => Ok(SliceKeys::new(node, path)),
            other => Err(SliceError::UnexpectedNode {
                path,
                expected: "branch",
                found: other.shape(),
            }),
        }
    }

    /// The subtree a parameterized node builds for `segment`
    pub fn param_branch(&self, name: &str, segment: &str) -> Result<SliceKeys> {
        self.expect_param(name, segment)?;
        self.branch(&format!("{}/{}", name, segment))
    }

    /// Paths of every static leaf, in definition order
    ///
    /// Leaves below parameterized nodes only exist once a segment is given
    /// and are not listed.
    pub fn paths(&self) -> Vec<KeyPath> {
        self.leaves().into_iter().map(|(path, _)| path).collect()
    }

    /// Updates that set every static leaf to its initial value
    pub fn initial_updates(&self) -> Vec<StoreUpdate> {
        self.leaves()
            .into_iter()
            .map(|(key, init)| StoreUpdate::Set {
                key,
                value: init.value.clone(),
                trace: Vec::new(),
            })
            .collect()
    }

    /// Initial value of the leaf at `path`
    pub fn initial<T: Clone + 'static>(&self, path: &str) -> Result<T> {
        let (path, node) = self.resolve(path)?;
        match node {
            KeyNode::Leaf(init) => tether_core::downcast_ref::<T>(&init.value)
                .cloned()
                .ok_or(SliceError::KeyTypeMismatch {
                    path,
                    expected: std::any::type_name::<T>(),
                    found: init.type_name,
                }),
            other => Err(SliceError::UnexpectedNode {
                path,
                expected: "leaf",
                found: other.shape(),
            }),
        }
    }

    fn expect_param(&self, name: &str, segment: &str) -> Result<()> {
        let (path, node) = self.resolve(name)?;
        match node {
            KeyNode::Param(_) => crate::slice::validate_segment(&path, segment),
            other => Err(SliceError::UnexpectedNode {
                path,
                expected: "param",
                found: other.shape(),
            }),
        }
    }

    fn resolve(&self, path: &str) -> Result<(KeyPath, KeyNode)> {
        let segments: Vec<&str> = path.split('/').collect();
        resolve(&self.root, self.prefix.clone(), &segments)
    }

    fn leaves(&self) -> Vec<(KeyPath, &Initializer)> {
        let mut out = Vec::new();
        collect_leaves(&self.root, &self.prefix, &mut out);
        out
    }
}

fn resolve(node: &KeyNode, path: KeyPath, rest: &[&str]) -> Result<(KeyPath, KeyNode)> {
    let Some((segment, rest)) = rest.split_first() else {
        return Ok((path, node.clone()));
    };
    crate::slice::validate_segment(&path, segment)?;
    let path = path.join(segment);
    match node {
        KeyNode::Branch(children) => match children.get(*segment) {
            Some(child) => resolve(child, path, rest),
            None => Err(SliceError::UnknownPath { path }),
        },
        KeyNode::Param(build) => {
            let child = build(segment);
            crate::slice::validate_keys(&child, &path)?;
            resolve(&child, path, rest)
        }
        KeyNode::Leaf(_) => Err(SliceError::UnknownPath { path }),
    }
}

fn collect_leaves<'a>(node: &'a KeyNode, path: &KeyPath, out: &mut Vec<(KeyPath, &'a Initializer)>) {
    match node {
        KeyNode::Leaf(init) => out.push((path.clone(), init)),
        KeyNode::Branch(children) => {
            for (name, child) in children {
                collect_leaves(child, &path.join(name), out);
            }
        }
        KeyNode::Param(_) => {}
    }
}
