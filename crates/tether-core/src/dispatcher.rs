//! Action dispatcher
//!
//! The dispatcher routes each action to its handler, applies the updates the
//! handler produces, re-dispatches derived actions, and publishes everything
//! that happens on one ordered event stream:
//!
//! 1. `Event::Action` when an action is dispatched, before its handler runs
//! 2. `Event::Updates` after a batch of updates has been applied
//! 3. `Event::Error` when routing or a handler fails
//!
//! Synchronous effects are applied before [`Dispatcher::dispatch`] returns.
//! Deferred and ongoing effects run as tasks on the ambient tokio runtime.
//!
//! Events fan out over a bounded broadcast channel sized by
//! [`DispatcherConfig::event_capacity`]. A subscriber that falls further
//! behind loses the oldest events and logs how many it skipped; holding an
//! unread [`EventStream`] never buffers more than the capacity.

use crate::config::DispatcherConfig;
use crate::context::HandlerContext;
use crate::effect::{self, Batch, Effect, Emission};
use crate::handler::HandlerMap;
use crate::store::Store;
use crate::{Action, Error, StoreUpdate};
use futures::{FutureExt, Stream, StreamExt};
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

/// Something observable that happened in the dispatcher
#[derive(Debug, Clone)]
pub enum Event {
    /// An action was dispatched
    Action(Action),
    /// Updates were applied to the store, in order
    Updates(Vec<StoreUpdate>),
    /// Routing or a handler failed
    Error(Arc<Error>),
}

impl Event {
    pub fn is_action(&self) -> bool {
        matches!(self, Event::Action(_))
    }

    pub fn is_updates(&self) -> bool {
        matches!(self, Event::Updates(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error(_))
    }

    pub fn as_action(&self) -> Option<&Action> {
        match self {
            Event::Action(action) => Some(action),
            _ => None,
        }
    }

    pub fn as_updates(&self) -> Option<&[StoreUpdate]> {
        match self {
            Event::Updates(updates) => Some(updates.as_slice()),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Event::Error(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Stream of dispatcher events
///
/// Never ends while the dispatcher is alive; errors arrive as
/// [`Event::Error`] items rather than terminating the stream.
pub struct EventStream {
    rx: BroadcastStream<Event>,
}

impl EventStream {
    /// Take every event already published, without waiting
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(Some(event)) = self.next().now_or_never() {
            events.push(event);
        }
        events
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        loop {
            match ready!(self.rx.poll_next_unpin(cx)) {
                Some(Ok(event)) => return Poll::Ready(Some(event)),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "event subscriber lagged, oldest events dropped");
                }
                None => return Poll::Ready(None),
            }
        }
    }
}

struct DispatcherInner {
    store: Store,
    handlers: HandlerMap,
    config: DispatcherConfig,
    events: broadcast::Sender<Event>,
    in_flight: watch::Sender<usize>,
}

/// Routes actions to handlers and applies their effects to a store
///
/// Cloning yields another handle to the same dispatcher.
///
/// Each batch is written to the store and then published. On a multi-thread
/// runtime, async effects finishing at the same moment may publish their
/// `Event::Updates` in a different order than their store writes; a
/// current-thread runtime keeps both orders identical.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Create a dispatcher with default configuration
    pub fn create(store: Store, handlers: HandlerMap) -> (Self, EventStream) {
        Self::with_config(store, handlers, DispatcherConfig::default())
    }

    /// Create a dispatcher and its first event subscription
    pub fn with_config(
        store: Store,
        handlers: HandlerMap,
        config: DispatcherConfig,
    ) -> (Self, EventStream) {
        let (in_flight, _) = watch::channel(0);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let dispatcher = Self {
            inner: Arc::new(DispatcherInner {
                store,
                handlers,
                config,
                events,
                in_flight,
            }),
        };
        let events = dispatcher.events();
        (dispatcher, events)
    }

    /// Subscribe to events published from now on
    pub fn events(&self) -> EventStream {
        EventStream {
            rx: BroadcastStream::new(self.inner.events.subscribe()),
        }
    }

    /// Number of live event subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.events.receiver_count()
    }

    /// The store this dispatcher writes to
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn handlers(&self) -> &HandlerMap {
        &self.inner.handlers
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Number of async effects still running
    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    /// Wait until no async effect is running
    pub async fn settled(&self) {
        let mut rx = self.inner.in_flight.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    /// Dispatch an action
    ///
    /// Never fails: problems are published as [`Event::Error`].
    pub fn dispatch(&self, action: Action) {
        self.publish(Event::Action(action.clone()));

        let kind = action.kind().clone();
        let limit = self.inner.config.max_dispatch_depth;
        if action.trace().len() > limit {
            self.publish_error(Error::DispatchDepthExceeded { kind, limit });
            return;
        }

        let Some(handler) = self.inner.handlers.get(&kind).cloned() else {
            self.publish_error(Error::HandlerNotFound { kind });
            return;
        };

        let ctx = HandlerContext::new(self.inner.store.clone(), &action);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(ctx.clone(), &action)));
        let effect = match outcome {
            Ok(Ok(effect)) => effect,
            Ok(Err(err)) => {
                self.finish_failed(&ctx, err);
                return;
            }
            Err(panic) => {
                let source = crate::error::panic_error(panic);
                self.finish_failed(&ctx, Error::HandlerThrew { kind, source });
                return;
            }
        };

        if effect.is_async() {
            self.spawn(ctx, effect);
        } else {
            let batch = match effect {
                Effect::Immediate(batch) => batch,
                _ => Batch::new(),
            };
            self.apply_batch(ctx.collect(batch));
            self.close(&ctx);
        }
    }

    /// End an invocation, reporting a panic raised by one of its cancel
    /// predicates
    fn close(&self, ctx: &HandlerContext) {
        ctx.close();
        if let Some(source) = ctx.take_fault() {
            self.publish_error(Error::HandlerRejected {
                kind: ctx.kind().clone(),
                source,
            });
        }
    }

    /// Apply what a failed handler staged, then report the failure
    fn finish_failed(&self, ctx: &HandlerContext, err: Error) {
        self.apply_batch(ctx.take_staged());
        ctx.close();
        self.publish_error(err);
    }

    fn spawn(&self, ctx: HandlerContext, effect: Effect) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            let kind = ctx.kind().clone();
            self.finish_failed(&ctx, Error::RuntimeUnavailable { kind });
            return;
        };

        // Writes staged before the handler returned land now.
        self.apply_batch(ctx.take_staged());

        let guard = InFlight::enter(self.inner.clone());
        let dispatcher = self.clone();
        runtime.spawn(async move {
            let _guard = guard;
            let result = effect::drive(effect, &ctx, |batch| dispatcher.apply_batch(batch)).await;
            ctx.close();
            let failure = result.err().or_else(|| ctx.take_fault());
            if let Some(source) = failure {
                dispatcher.publish_error(Error::HandlerRejected {
                    kind: ctx.kind().clone(),
                    source,
                });
            }
        });
    }

    /// Apply a batch in order
    ///
    /// Updates are grouped into one `Event::Updates`; a derived action first
    /// publishes the updates before it, then is dispatched.
    fn apply_batch(&self, batch: Batch) {
        let mut applied = Vec::new();
        for emission in batch {
            match emission {
                Emission::Update(update) => {
                    self.inner.store.apply(&update);
                    applied.push(update);
                }
                Emission::Action(action) => {
                    if !applied.is_empty() {
                        self.publish(Event::Updates(std::mem::take(&mut applied)));
                    }
                    self.dispatch(action);
                }
            }
        }
        if !applied.is_empty() {
            self.publish(Event::Updates(applied));
        }
    }

    fn publish_error(&self, err: Error) {
        self.publish(Event::Error(Arc::new(err)));
    }

    fn publish(&self, event: Event) {
        if self.inner.config.log_events {
            log_event(&event);
        }
        // No subscribers is not an error.
        let _ = self.inner.events.send(event);
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.inner.handlers)
            .field("config", &self.inner.config)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

fn log_event(event: &Event) {
    match event {
        Event::Action(action) => tracing::debug!(
            action = %action.kind(),
            depth = action.trace().len(),
            payload = action.payload().type_name(),
            "dispatch"
        ),
        Event::Updates(updates) => tracing::trace!(
            count = updates.len(),
            keys = ?updates.iter().map(|u| u.key().as_str()).collect::<Vec<_>>(),
            "updates applied"
        ),
        Event::Error(err) => tracing::warn!(error = %err, "dispatch failed"),
    }
}

/// Counts a running async effect until dropped
struct InFlight {
    dispatcher: Arc<DispatcherInner>,
}

impl InFlight {
    fn enter(dispatcher: Arc<DispatcherInner>) -> Self {
        dispatcher.in_flight.send_modify(|count| *count += 1);
        Self { dispatcher }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.dispatcher
            .in_flight
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}
