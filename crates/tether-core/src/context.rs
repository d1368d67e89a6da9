//! Per-invocation handler context
//!
//! A `HandlerContext` is created for each dispatched action. It gives the
//! handler read access to the store and stages writes and derived actions,
//! stamping each with the action's trace. The dispatcher flushes staged
//! items when the handler returns and whenever its async effect suspends.

use crate::effect::{Batch, Emission};
use crate::error::{panic_error, HandlerError};
use crate::key::{downcast_ref, AnyKey, SharedValue, StoreKey, StoreValue};
use crate::store::{Notification, Store, ValueStream, WatchGuard};
use crate::{Action, ActionKind, KeyPath, Result, StoreUpdate, Trace};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared cancellation flag for one handler invocation
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark as cancelled
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Values of the keys passed to [`HandlerContext::cancel_if_changed_with`],
/// in the order they were given
#[derive(Debug, Clone, Default)]
pub struct WatchedValues(Vec<Option<SharedValue>>);

impl WatchedValues {
    /// The value at `index` as a concrete type
    pub fn get<T: 'static>(&self, index: usize) -> Option<&T> {
        self.0
            .get(index)
            .and_then(Option::as_ref)
            .and_then(downcast_ref::<T>)
    }

    /// The erased value at `index`
    pub fn raw(&self, index: usize) -> Option<&SharedValue> {
        self.0.get(index).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

struct ContextInner {
    store: Store,
    kind: ActionKind,
    trace: Trace,
    staged: Mutex<Batch>,
    token: CancelToken,
    watchers: Mutex<Vec<WatchGuard>>,
    fault: Arc<Mutex<Option<HandlerError>>>,
    closed: AtomicBool,
}

/// Capabilities handed to a handler for one action
///
/// Cheap to clone; clones share staging, cancellation and watchers, so a
/// clone may be moved into the handler's future or stream.
#[derive(Clone)]
pub struct HandlerContext {
    inner: Arc<ContextInner>,
}

impl HandlerContext {
    pub(crate) fn new(store: Store, action: &Action) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                store,
                kind: action.kind().clone(),
                trace: action.child_trace(),
                staged: Mutex::new(Batch::new()),
                token: CancelToken::new(),
                watchers: Mutex::new(Vec::new()),
                fault: Arc::new(Mutex::new(None)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Check if a cell exists for the key
    pub fn has(&self, key: &impl AnyKey) -> bool {
        self.inner.store.has(key)
    }

    /// Current value, or `None` if unset or of another type
    pub fn get<T: Clone + 'static>(&self, key: &StoreKey<T>) -> Option<T> {
        self.inner.store.get(key)
    }

    /// Current value, failing if it has another type
    pub fn try_get<T: Clone + 'static>(&self, key: &StoreKey<T>) -> Result<Option<T>> {
        self.inner.store.try_get(key)
    }

    /// Current value, or `default` if unset
    pub fn get_or_else<T: Clone + 'static>(&self, key: &StoreKey<T>, default: T) -> T {
        self.inner.store.get_or_else(key, default)
    }

    /// Subscribe to a key, see [`Store::get_stream`]
    pub fn get_stream<T: Clone + 'static>(&self, key: &StoreKey<T>) -> ValueStream<T> {
        self.inner.store.get_stream(key)
    }

    /// Stage a write
    pub fn set<T: StoreValue>(&self, key: &StoreKey<T>, value: T) {
        self.stage(StoreUpdate::set(key, value).into());
    }

    /// Stage a delete
    pub fn del(&self, key: &impl AnyKey) {
        self.stage(
            StoreUpdate::Del {
                key: key.key_path().clone(),
                trace: Trace::new(),
            }
            .into(),
        );
    }

    /// Stage a derived action
    pub fn dispatch(&self, action: Action) {
        self.stage(action.into());
    }

    /// Cancel this invocation as soon as any of `keys` is set or deleted
    pub fn cancel_if_changed(&self, keys: &[&dyn AnyKey]) {
        self.cancel_if_changed_with(keys, |_, _| true);
    }

    /// Cancel this invocation when `should_cancel(previous, current)` holds
    /// after a change to any of `keys`
    ///
    /// Watching starts from the current values; a delete counts as a change
    /// to `None`. Watchers are removed when the invocation ends.
    ///
    /// The predicate runs inside whichever store write triggered it. If it
    /// panics, the invocation is cancelled and the panic is reported as this
    /// action's `HandlerRejected` once it finishes; the write itself is
    /// unaffected.
    pub fn cancel_if_changed_with<F>(&self, keys: &[&dyn AnyKey], should_cancel: F)
    where
        F: Fn(&WatchedValues, &WatchedValues) -> bool + Send + Sync + 'static,
    {
        if self.is_closed() {
            tracing::warn!(action = %self.inner.kind, "cancel watcher registered after handler finished");
            return;
        }

        let paths: Vec<KeyPath> = keys.iter().map(|key| key.key_path().clone()).collect();
        let latest = Arc::new(Mutex::new(WatchedValues(
            paths.iter().map(|path| self.inner.store.peek(path)).collect(),
        )));
        let should_cancel = Arc::new(should_cancel);

        let guards: Vec<WatchGuard> = paths
            .iter()
            .enumerate()
            .map(|(index, path)| {
                let latest = latest.clone();
                let should_cancel = should_cancel.clone();
                let token = self.inner.token.clone();
                let fault = self.inner.fault.clone();
                let kind = self.inner.kind.clone();
                let path_name = path.clone();
                self.inner.store.observe(
                    path,
                    Arc::new(move |note: Notification<'_>| {
                        if token.is_cancelled() {
                            return;
                        }
                        let (previous, current) = {
                            let mut latest = latest.lock().unwrap_or_else(PoisonError::into_inner);
                            let previous = latest.clone();
                            latest.0[index] = match note {
                                Notification::Next(value) => Some(value.clone()),
                                Notification::Complete => None,
                            };
                            (previous, latest.clone())
                        };
                        match panic::catch_unwind(AssertUnwindSafe(|| {
                            should_cancel(&previous, &current)
                        })) {
                            Ok(true) => {
                                tracing::debug!(action = %kind, key = %path_name, "handler cancelled by key change");
                                token.cancel();
                            }
                            Ok(false) => {}
                            Err(payload) => {
                                let err = panic_error(payload);
                                tracing::warn!(action = %kind, key = %path_name, error = %err, "cancel predicate panicked");
                                token.cancel();
                                fault
                                    .lock()
                                    .unwrap_or_else(PoisonError::into_inner)
                                    .get_or_insert(err);
                            }
                        }
                    }),
                )
            })
            .collect();

        self.watchers().extend(guards);
    }

    /// Check if a watched key changed since [`Self::cancel_if_changed`]
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// A handle to this invocation's cancellation flag
    pub fn cancel_token(&self) -> CancelToken {
        self.inner.token.clone()
    }

    /// Kind of the action being handled
    pub fn kind(&self) -> &ActionKind {
        &self.inner.kind
    }

    /// Trace stamped on everything this handler emits
    pub fn trace(&self) -> &[ActionKind] {
        &self.inner.trace
    }

    /// Check if the invocation has ended
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn stage(&self, emission: Emission) {
        if self.is_closed() {
            tracing::warn!(action = %self.inner.kind, "ignoring emission staged after handler finished");
            return;
        }
        let emission = self.stamp(emission);
        self.staged().push(emission);
    }

    /// Overwrite an emission's trace with this invocation's trace
    pub(crate) fn stamp(&self, emission: Emission) -> Emission {
        let trace = self.inner.trace.clone();
        match emission {
            Emission::Update(update) => Emission::Update(update.with_trace(trace)),
            Emission::Action(action) => Emission::Action(action.with_trace(trace)),
        }
    }

    /// Take everything staged so far
    pub(crate) fn take_staged(&self) -> Batch {
        std::mem::take(&mut *self.staged())
    }

    /// Staged items followed by a returned batch, all stamped
    pub(crate) fn collect(&self, batch: Batch) -> Batch {
        let mut out = self.take_staged();
        out.extend(batch.into_iter().map(|emission| self.stamp(emission)));
        out
    }

    /// Take the first panic raised by a cancel predicate, if any
    pub(crate) fn take_fault(&self) -> Option<HandlerError> {
        self.inner
            .fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// End the invocation: reject further staging and drop key watchers
    pub(crate) fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let watchers = std::mem::take(&mut *self.watchers());
        drop(watchers);
    }

    fn staged(&self) -> MutexGuard<'_, Batch> {
        self.inner.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn watchers(&self) -> MutexGuard<'_, Vec<WatchGuard>> {
        self.inner.watchers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("kind", &self.inner.kind)
            .field("trace", &self.inner.trace)
            .field("cancelled", &self.is_cancelled())
            .field("closed", &self.is_closed())
            .finish()
    }
}
