//! Action handlers and the kind-to-handler registry

use crate::context::HandlerContext;
use crate::effect::{Effect, IntoEffect};
use crate::key::{StoreKey, StoreValue};
use crate::{Action, ActionKind, ActionType, Error, Result};
use indexmap::IndexMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Handles one action kind
///
/// Implementations receive a fresh context per action and return the
/// effect to drive. Errors are reported on the dispatcher's event stream.
pub trait ActionHandler: Send + Sync {
    fn handle(&self, ctx: HandlerContext, action: &Action) -> Result<Effect>;
}

/// Handler built from a closure taking the context and a typed payload
pub struct FnHandler<P, F> {
    f: F,
    _marker: PhantomData<fn(P)>,
}

/// Wrap a closure `(ctx, payload) -> impl IntoEffect` as a handler
pub fn handler<P, F, R>(f: F) -> FnHandler<P, F>
where
    P: Clone + Send + Sync + 'static,
    F: Fn(HandlerContext, P) -> R + Send + Sync,
    R: IntoEffect,
{
    FnHandler {
        f,
        _marker: PhantomData,
    }
}

impl<P, F, R> ActionHandler for FnHandler<P, F>
where
    P: Clone + Send + Sync + 'static,
    F: Fn(HandlerContext, P) -> R + Send + Sync,
    R: IntoEffect,
{
    fn handle(&self, ctx: HandlerContext, action: &Action) -> Result<Effect> {
        let payload = typed_payload::<P>(action)?;
        (self.f)(ctx, payload)
            .into_effect()
            .map_err(|source| Error::HandlerThrew {
                kind: action.kind().clone(),
                source,
            })
    }
}

/// Handler built from a closure taking the payload first, then the context
pub struct CurriedHandler<P, F> {
    f: F,
    _marker: PhantomData<fn(P)>,
}

/// Wrap a closure `payload -> (ctx -> impl IntoEffect)` as a handler
pub fn curried<P, F, G, R>(f: F) -> CurriedHandler<P, F>
where
    P: Clone + Send + Sync + 'static,
    F: Fn(P) -> G + Send + Sync,
    G: FnOnce(HandlerContext) -> R,
    R: IntoEffect,
{
    CurriedHandler {
        f,
        _marker: PhantomData,
    }
}

impl<P, F, G, R> ActionHandler for CurriedHandler<P, F>
where
    P: Clone + Send + Sync + 'static,
    F: Fn(P) -> G + Send + Sync,
    G: FnOnce(HandlerContext) -> R,
    R: IntoEffect,
{
    fn handle(&self, ctx: HandlerContext, action: &Action) -> Result<Effect> {
        let payload = typed_payload::<P>(action)?;
        (self.f)(payload)(ctx)
            .into_effect()
            .map_err(|source| Error::HandlerThrew {
                kind: action.kind().clone(),
                source,
            })
    }
}

fn typed_payload<P: Clone + 'static>(action: &Action) -> Result<P> {
    action
        .payload_as::<P>()
        .cloned()
        .ok_or_else(|| Error::PayloadMismatch {
            kind: action.kind().clone(),
            expected: std::any::type_name::<P>(),
            found: action.payload().type_name(),
        })
}

/// Registry of handlers keyed by action kind
///
/// Keeps registration order so listings are stable.
#[derive(Clone, Default)]
pub struct HandlerMap {
    handlers: IndexMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl HandlerMap {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure handler for a typed action (builder style)
    pub fn on<P, F, R>(self, action_type: &ActionType<P>, f: F) -> Self
    where
        P: Clone + Send + Sync + 'static,
        F: Fn(HandlerContext, P) -> R + Send + Sync + 'static,
        R: IntoEffect + 'static,
    {
        self.with(action_type.kind().clone(), handler(f))
    }

    /// Register any handler (builder style)
    pub fn with(mut self, kind: impl Into<ActionKind>, handler: impl ActionHandler + 'static) -> Self {
        self.insert(kind, Arc::new(handler));
        self
    }

    /// Register a handler, returning the one it replaced
    pub fn insert(
        &mut self,
        kind: impl Into<ActionKind>,
        handler: Arc<dyn ActionHandler>,
    ) -> Option<Arc<dyn ActionHandler>> {
        let kind = kind.into();
        let replaced = self.handlers.insert(kind.clone(), handler);
        if replaced.is_some() {
            tracing::warn!(action = %kind, "replacing registered handler");
        }
        replaced
    }

    /// Add every handler from `other`; its entries win on conflict
    pub fn merge(&mut self, other: HandlerMap) {
        for (kind, handler) in other.handlers {
            self.insert(kind, handler);
        }
    }

    /// Get the handler for a kind
    pub fn get(&self, kind: &ActionKind) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(kind)
    }

    /// Check if a kind has a handler
    pub fn contains(&self, kind: &ActionKind) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered kinds, in registration order
    pub fn kinds(&self) -> impl Iterator<Item = &ActionKind> {
        self.handlers.keys()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl FromIterator<(ActionKind, Arc<dyn ActionHandler>)> for HandlerMap {
    fn from_iter<I: IntoIterator<Item = (ActionKind, Arc<dyn ActionHandler>)>>(iter: I) -> Self {
        let mut map = HandlerMap::new();
        for (kind, handler) in iter {
            map.insert(kind, handler);
        }
        map
    }
}

impl fmt::Debug for HandlerMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

/// Payload of the generic set handler
#[derive(Debug, Clone, PartialEq)]
pub struct SetValue<T> {
    pub key: StoreKey<T>,
    pub value: T,
}

impl<T> SetValue<T> {
    pub fn new(key: StoreKey<T>, value: T) -> Self {
        Self { key, value }
    }
}

/// Handler that writes `payload.value` under `payload.key`
pub fn set_value<T>() -> impl ActionHandler
where
    T: StoreValue + Clone,
{
    handler(|ctx: HandlerContext, payload: SetValue<T>| ctx.set(&payload.key, payload.value))
}

/// Handler that deletes the key given as payload
pub fn delete_value<T: 'static>() -> impl ActionHandler {
    handler(|ctx: HandlerContext, key: StoreKey<T>| ctx.del(&key))
}
