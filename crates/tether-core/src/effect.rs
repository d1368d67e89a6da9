//! Handler effects and their normalization
//!
//! A handler may produce nothing, an immediate batch, a future, or a
//! long-lived stream. All of these are expressed as one [`Effect`] and
//! driven by [`drive`], which turns each shape into an ordered sequence of
//! batches.

use crate::context::HandlerContext;
use crate::error::{panic_error, HandlerError};
use crate::{Action, StoreUpdate};
use futures::future::{self, BoxFuture};
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Something a handler emits: a store update or a derived action
#[derive(Debug, Clone)]
pub enum Emission {
    /// Mutation to apply to the store
    Update(StoreUpdate),
    /// Action to dispatch again
    Action(Action),
}

impl Emission {
    /// Check if this emission is a derived action rather than an update
    pub fn is_action(&self) -> bool {
        matches!(self, Emission::Action(_))
    }

    /// Get the update, if this is one
    pub fn as_update(&self) -> Option<&StoreUpdate> {
        match self {
            Emission::Update(update) => Some(update),
            Emission::Action(_) => None,
        }
    }

    /// Get the action, if this is one
    pub fn as_action(&self) -> Option<&Action> {
        match self {
            Emission::Action(action) => Some(action),
            Emission::Update(_) => None,
        }
    }

    /// Compare two emissions without their traces
    ///
    /// Actions compare by kind and payload type.
    pub fn eq_ignoring_trace(&self, other: &Emission) -> bool {
        match (self, other) {
            (Emission::Update(a), Emission::Update(b)) => a.eq_ignoring_trace(b),
            (Emission::Action(a), Emission::Action(b)) => {
                a.kind() == b.kind() && a.payload().type_name() == b.payload().type_name()
            }
            _ => false,
        }
    }
}

impl From<StoreUpdate> for Emission {
    fn from(update: StoreUpdate) -> Self {
        Emission::Update(update)
    }
}

impl From<Action> for Emission {
    fn from(action: Action) -> Self {
        Emission::Action(action)
    }
}

/// Emissions produced together by one handler step
pub type Batch = Vec<Emission>;

/// Future form of an effect
pub type EffectFuture = BoxFuture<'static, Result<Batch, HandlerError>>;

/// Stream form of an effect
pub type EffectStream = BoxStream<'static, Result<Batch, HandlerError>>;

/// What a handler returns
pub enum Effect {
    /// Nothing beyond what was staged on the context
    Empty,
    /// A batch available right away
    Immediate(Batch),
    /// A batch produced later
    Deferred(EffectFuture),
    /// Zero or more batches produced over time
    Ongoing(EffectStream),
}

impl Effect {
    /// An effect with no output
    pub fn none() -> Self {
        Effect::Empty
    }

    /// Wrap a future; its output becomes the final batch
    pub fn deferred<F>(fut: F) -> Self
    where
        F: Future + Send + 'static,
        F::Output: IntoBatch,
    {
        Effect::Deferred(fut.map(IntoBatch::into_batch).boxed())
    }

    /// Wrap a stream; each item becomes one batch
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream + Send + 'static,
        S::Item: IntoBatch,
    {
        Effect::Ongoing(stream.map(IntoBatch::into_batch).boxed())
    }

    /// Check if driving this effect needs an async runtime
    pub fn is_async(&self) -> bool {
        matches!(self, Effect::Deferred(_) | Effect::Ongoing(_))
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Empty => write!(f, "Empty"),
            Effect::Immediate(batch) => f.debug_tuple("Immediate").field(batch).finish(),
            Effect::Deferred(_) => write!(f, "Deferred(..)"),
            Effect::Ongoing(_) => write!(f, "Ongoing(..)"),
        }
    }
}

/// Conversion of handler step output into a batch
pub trait IntoBatch {
    fn into_batch(self) -> Result<Batch, HandlerError>;
}

impl IntoBatch for () {
    fn into_batch(self) -> Result<Batch, HandlerError> {
        Ok(Batch::new())
    }
}

impl IntoBatch for Emission {
    fn into_batch(self) -> Result<Batch, HandlerError> {
        Ok(vec![self])
    }
}

impl IntoBatch for StoreUpdate {
    fn into_batch(self) -> Result<Batch, HandlerError> {
        Ok(vec![self.into()])
    }
}

impl IntoBatch for Action {
    fn into_batch(self) -> Result<Batch, HandlerError> {
        Ok(vec![self.into()])
    }
}

impl IntoBatch for Vec<Emission> {
    fn into_batch(self) -> Result<Batch, HandlerError> {
        Ok(self)
    }
}

impl IntoBatch for Vec<StoreUpdate> {
    fn into_batch(self) -> Result<Batch, HandlerError> {
        Ok(self.into_iter().map(Emission::from).collect())
    }
}

impl IntoBatch for Vec<Action> {
    fn into_batch(self) -> Result<Batch, HandlerError> {
        Ok(self.into_iter().map(Emission::from).collect())
    }
}

impl<T: IntoBatch> IntoBatch for Option<T> {
    fn into_batch(self) -> Result<Batch, HandlerError> {
        self.map_or_else(|| Ok(Batch::new()), IntoBatch::into_batch)
    }
}

impl<T, E> IntoBatch for Result<T, E>
where
    T: IntoBatch,
    E: Into<HandlerError>,
{
    fn into_batch(self) -> Result<Batch, HandlerError> {
        self.map_err(Into::into).and_then(IntoBatch::into_batch)
    }
}

/// Conversion of a handler's return value into an effect
pub trait IntoEffect {
    fn into_effect(self) -> Result<Effect, HandlerError>;
}

impl IntoEffect for Effect {
    fn into_effect(self) -> Result<Effect, HandlerError> {
        Ok(self)
    }
}

impl<T: IntoEffect> IntoEffect for Option<T> {
    fn into_effect(self) -> Result<Effect, HandlerError> {
        self.map_or(Ok(Effect::Empty), IntoEffect::into_effect)
    }
}

impl<T, E> IntoEffect for Result<T, E>
where
    T: IntoEffect,
    E: Into<HandlerError>,
{
    fn into_effect(self) -> Result<Effect, HandlerError> {
        self.map_err(Into::into).and_then(IntoEffect::into_effect)
    }
}

macro_rules! into_effect_via_batch {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoEffect for $ty {
                fn into_effect(self) -> Result<Effect, HandlerError> {
                    let batch = self.into_batch()?;
                    Ok(if batch.is_empty() {
                        Effect::Empty
                    } else {
                        Effect::Immediate(batch)
                    })
                }
            }
        )*
    };
}

into_effect_via_batch!(
    (),
    Emission,
    StoreUpdate,
    Action,
    Vec<Emission>,
    Vec<StoreUpdate>,
    Vec<Action>,
);

/// Drive an effect to completion, handing every batch to `sink` in order
///
/// Items staged on the context are flushed whenever the effect suspends, so
/// a handler's mutations land as soon as the step that made them ends.
/// Panics inside async effects are reported as errors.
pub(crate) async fn drive<F>(
    effect: Effect,
    ctx: &HandlerContext,
    mut sink: F,
) -> Result<(), HandlerError>
where
    F: FnMut(Batch) + Send,
{
    match effect {
        Effect::Empty => {
            sink(ctx.collect(Batch::new()));
            Ok(())
        }
        Effect::Immediate(batch) => {
            sink(ctx.collect(batch));
            Ok(())
        }
        Effect::Deferred(fut) => {
            let mut fut = AssertUnwindSafe(fut).catch_unwind();
            let outcome = future::poll_fn(|cx| {
                let poll = fut.poll_unpin(cx);
                if poll.is_pending() {
                    sink(ctx.take_staged());
                }
                poll
            })
            .await;
            match outcome {
                Ok(Ok(batch)) => {
                    sink(ctx.collect(batch));
                    Ok(())
                }
                Ok(Err(err)) => {
                    sink(ctx.take_staged());
                    Err(err)
                }
                Err(panic) => {
                    sink(ctx.take_staged());
                    Err(panic_error(panic))
                }
            }
        }
        Effect::Ongoing(stream) => {
            let mut stream = AssertUnwindSafe(stream).catch_unwind();
            loop {
                let next = future::poll_fn(|cx| {
                    let poll = stream.poll_next_unpin(cx);
                    if poll.is_pending() {
                        sink(ctx.take_staged());
                    }
                    poll
                })
                .await;
                match next {
                    Some(Ok(Ok(batch))) => sink(ctx.collect(batch)),
                    Some(Ok(Err(err))) => {
                        sink(ctx.take_staged());
                        return Err(err);
                    }
                    Some(Err(panic)) => {
                        sink(ctx.take_staged());
                        return Err(panic_error(panic));
                    }
                    None => {
                        sink(ctx.take_staged());
                        return Ok(());
                    }
                }
            }
        }
    }
}
