//! Actions: immutable requests routed to handlers by kind

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Discriminant used to route an action to its handler
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionKind(String);

impl ActionKind {
    /// Create a new action kind
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    /// Get the kind as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActionKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ActionKind {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Causal chain of action kinds, outermost first
pub type Trace = Vec<ActionKind>;

/// Type-erased action payload
#[derive(Clone)]
pub struct Payload {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Payload {
    /// Wrap a payload value
    pub fn new<P: Send + Sync + 'static>(value: P) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<P>(),
        }
    }

    /// Borrow the payload as its concrete type
    pub fn downcast_ref<P: 'static>(&self) -> Option<&P> {
        self.value.downcast_ref::<P>()
    }

    /// Name of the payload's concrete type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload<{}>", self.type_name)
    }
}

/// An immutable envelope carrying a kind, a payload and a trace
#[derive(Debug, Clone)]
pub struct Action {
    kind: ActionKind,
    payload: Payload,
    trace: Trace,
}

impl Action {
    /// Create an action with an empty trace
    pub fn new<P: Send + Sync + 'static>(kind: impl Into<ActionKind>, payload: P) -> Self {
        Self {
            kind: kind.into(),
            payload: Payload::new(payload),
            trace: Vec::new(),
        }
    }

    /// Replace the trace
    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.trace = trace;
        self
    }

    /// The routing discriminant
    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// The erased payload
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Borrow the payload as a concrete type
    pub fn payload_as<P: 'static>(&self) -> Option<&P> {
        self.payload.downcast_ref::<P>()
    }

    /// The causal chain that produced this action
    pub fn trace(&self) -> &[ActionKind] {
        &self.trace
    }

    /// Trace for anything caused by this action: `[kind, ...trace]`
    pub fn child_trace(&self) -> Trace {
        let mut trace = Vec::with_capacity(self.trace.len() + 1);
        trace.push(self.kind.clone());
        trace.extend(self.trace.iter().cloned());
        trace
    }
}

/// A typed action descriptor
///
/// Pairs an [`ActionKind`] with the payload type its handler expects.
pub struct ActionType<P> {
    kind: ActionKind,
    _marker: PhantomData<fn(P)>,
}

impl<P: Send + Sync + 'static> ActionType<P> {
    /// Create a descriptor for the given kind
    pub fn new(kind: impl Into<ActionKind>) -> Self {
        Self {
            kind: kind.into(),
            _marker: PhantomData,
        }
    }

    /// The routing discriminant
    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Build an action of this type
    pub fn create(&self, payload: P) -> Action {
        Action::new(self.kind.clone(), payload)
    }
}

impl<P> Clone for ActionType<P> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            _marker: PhantomData,
        }
    }
}

impl<P> fmt::Debug for ActionType<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionType")
            .field("kind", &self.kind)
            .field("payload", &std::any::type_name::<P>())
            .finish()
    }
}
