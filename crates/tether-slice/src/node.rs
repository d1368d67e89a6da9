//! Definition trees for slice keys and actions
//!
//! A key tree is made of leaves (a key with its initial value), branches
//! (named children) and parameterized nodes (a function from a runtime
//! segment to a subtree). An action tree is made of handlers and branches.

use indexmap::IndexMap;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use tether_core::{ActionHandler, HandlerContext, IntoEffect, SharedValue, StoreValue};

/// Initial value of a key leaf
#[derive(Clone)]
pub struct Initializer {
    pub(crate) value: SharedValue,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
}

impl Initializer {
    pub fn value(&self) -> &SharedValue {
        &self.value
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Debug for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.value)
    }
}

/// Builds the subtree for one runtime segment
pub type ParamFn = Arc<dyn Fn(&str) -> KeyNode + Send + Sync>;

/// A node in a key tree
#[derive(Clone)]
pub enum KeyNode {
    /// A key with its initial value
    Leaf(Initializer),
    /// Named children
    Branch(IndexMap<String, KeyNode>),
    /// A subtree chosen by a runtime segment
    Param(ParamFn),
}

impl KeyNode {
    /// Shape name used in errors
    pub fn shape(&self) -> &'static str {
        match self {
            KeyNode::Leaf(_) => "leaf",
            KeyNode::Branch(_) => "branch",
            KeyNode::Param(_) => "param",
        }
    }
}

impl fmt::Debug for KeyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyNode::Leaf(init) => f.debug_tuple("Leaf").field(init).finish(),
            KeyNode::Branch(children) => f.debug_map().entries(children.iter()).finish(),
            KeyNode::Param(_) => write!(f, "Param(..)"),
        }
    }
}

/// A key leaf starting at `value`
pub fn init<T: StoreValue>(value: T) -> KeyNode {
    KeyNode::Leaf(Initializer {
        value: Arc::new(value),
        type_id: TypeId::of::<T>(),
        type_name: std::any::type_name::<T>(),
    })
}

/// A branch of named key nodes
pub fn branch<I, K>(children: I) -> KeyNode
where
    I: IntoIterator<Item = (K, KeyNode)>,
    K: Into<String>,
{
    KeyNode::Branch(children.into_iter().map(|(k, v)| (k.into(), v)).collect())
}

/// A parameterized key node; `f` receives the runtime segment
pub fn param<F>(f: F) -> KeyNode
where
    F: Fn(&str) -> KeyNode + Send + Sync + 'static,
{
    KeyNode::Param(Arc::new(f))
}

/// A handler together with the payload type it accepts
#[derive(Clone)]
pub struct HandlerNode {
    pub(crate) handler: Arc<dyn ActionHandler>,
    pub(crate) payload: TypeId,
    pub(crate) payload_name: &'static str,
}

/// A node in an action tree
#[derive(Clone)]
pub enum ActionNode {
    Handler(HandlerNode),
    Branch(IndexMap<String, ActionNode>),
}

impl ActionNode {
    pub fn shape(&self) -> &'static str {
        match self {
            ActionNode::Handler(_) => "handler",
            ActionNode::Branch(_) => "branch",
        }
    }
}

impl fmt::Debug for ActionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionNode::Handler(node) => write!(f, "Handler<{}>", node.payload_name),
            ActionNode::Branch(children) => f.debug_map().entries(children.iter()).finish(),
        }
    }
}

/// An action leaf handled by `f(ctx, payload)`
pub fn handler<P, F, R>(f: F) -> ActionNode
where
    P: Clone + Send + Sync + 'static,
    F: Fn(HandlerContext, P) -> R + Send + Sync + 'static,
    R: IntoEffect + 'static,
{
    custom::<P>(tether_core::handler(f))
}

/// An action leaf backed by any handler taking payload `P`
pub fn custom<P: 'static>(handler: impl ActionHandler + 'static) -> ActionNode {
    ActionNode::Handler(HandlerNode {
        handler: Arc::new(handler),
        payload: TypeId::of::<P>(),
        payload_name: std::any::type_name::<P>(),
    })
}

/// A branch of named action nodes
pub fn actions<I, K>(children: I) -> ActionNode
where
    I: IntoIterator<Item = (K, ActionNode)>,
    K: Into<String>,
{
    ActionNode::Branch(children.into_iter().map(|(k, v)| (k.into(), v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_records_type() {
        match init(String::from("x")) {
            KeyNode::Leaf(init) => {
                assert!(init.is::<String>());
                assert!(!init.is::<u32>());
                assert_eq!(init.type_name(), std::any::type_name::<String>());
            }
            other => panic!("Expected leaf, got {:?}", other),
        }
    }

    #[test]
    fn test_branch_keeps_order() {
        let node = branch([("b", init(1u8)), ("a", init(2u8))]);
        match node {
            KeyNode::Branch(children) => {
                assert_eq!(children.keys().collect::<Vec<_>>(), vec!["b", "a"]);
            }
            other => panic!("Expected branch, got {:?}", other),
        }
    }

    #[test]
    fn test_param_builds_per_segment() {
        let node = param(|segment| init(segment.to_string()));
        let KeyNode::Param(f) = node else {
            panic!("Expected param");
        };
        match f("abc") {
            KeyNode::Leaf(init) => {
                assert_eq!(tether_core::downcast_ref::<String>(init.value()).map(String::as_str), Some("abc"));
            }
            other => panic!("Expected leaf, got {:?}", other),
        }
    }

    #[test]
    fn test_handler_node_payload() {
        let node = actions([("add", handler(|_ctx: HandlerContext, _n: u32| ()))]);
        assert_eq!(node.shape(), "branch");
        assert_eq!(format!("{:?}", node), "{\"add\": Handler<u32>}");
    }
}
