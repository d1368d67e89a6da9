//! Keyed reactive store
//!
//! The store maps key paths to cells. Each cell holds the current value (if
//! any) and its observers. A stream observer receives the latest value when it
//! subscribes and every value after that, and completes when the key is
//! deleted. Watch observers are synchronous callbacks used for cancellation
//! watchers and UI bindings.
//!
//! Observer callbacks always run after the store lock is released, so a
//! callback may read the store again.

use crate::key::{downcast_ref, AnyKey, SharedValue, StoreKey, StoreValue};
use crate::{Error, KeyPath, Result, StoreUpdate};
use futures::channel::mpsc;
use futures::{FutureExt, Stream, StreamExt};
use indexmap::IndexMap;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

/// Point-in-time copy of all live values, in creation order
pub type Snapshot = IndexMap<KeyPath, SharedValue>;

/// What a watch observer is told about its cell
pub(crate) enum Notification<'a> {
    /// A new value was stored
    Next(&'a SharedValue),
    /// The key was deleted
    Complete,
}

pub(crate) type WatchFn = Arc<dyn Fn(Notification<'_>) + Send + Sync>;

enum Observer {
    Stream(mpsc::UnboundedSender<SharedValue>),
    Watch(WatchFn),
}

/// Storage unit for one key
struct Cell {
    value: Option<SharedValue>,
    observers: IndexMap<u64, Observer>,
}

impl Cell {
    fn new() -> Self {
        Self {
            value: None,
            observers: IndexMap::new(),
        }
    }

    /// Store a value, feed stream observers and return the watch callbacks
    /// to run once the lock is released
    fn publish(&mut self, value: SharedValue) -> Vec<WatchFn> {
        self.value = Some(value.clone());
        let mut watchers = Vec::new();
        self.observers.retain(|_, observer| match observer {
            Observer::Stream(tx) => tx.unbounded_send(value.clone()).is_ok(),
            Observer::Watch(f) => {
                watchers.push(f.clone());
                true
            }
        });
        watchers
    }

    fn watchers(&self) -> Vec<WatchFn> {
        self.observers
            .values()
            .filter_map(|observer| match observer {
                Observer::Watch(f) => Some(f.clone()),
                Observer::Stream(_) => None,
            })
            .collect()
    }
}

struct StoreInner {
    cells: Mutex<IndexMap<KeyPath, Cell>>,
    next_observer: AtomicU64,
}

impl StoreInner {
    fn cells(&self) -> MutexGuard<'_, IndexMap<KeyPath, Cell>> {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A keyed store of observable values
///
/// Cloning a `Store` yields another handle to the same cells.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create a new, empty store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                cells: Mutex::new(IndexMap::new()),
                next_observer: AtomicU64::new(0),
            }),
        }
    }

    /// Create a typed key for a path
    pub fn key<T>(path: impl Into<KeyPath>) -> StoreKey<T> {
        StoreKey::new(path)
    }

    /// Check if a cell exists for the key, whether or not it holds a value
    pub fn has(&self, key: &impl AnyKey) -> bool {
        self.inner.cells().contains_key(key.key_path())
    }

    /// Get the current value, creating an empty cell if none exists
    ///
    /// Returns `None` when the key was never set or holds a value of another type.
    pub fn get<T: Clone + 'static>(&self, key: &StoreKey<T>) -> Option<T> {
        match self.try_get(key) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "typed read failed");
                None
            }
        }
    }

    /// Get the current value, reporting a type mismatch as an error
    pub fn try_get<T: Clone + 'static>(&self, key: &StoreKey<T>) -> Result<Option<T>> {
        let mut cells = self.inner.cells();
        let cell = cells.entry(key.path().clone()).or_insert_with(Cell::new);
        match &cell.value {
            None => Ok(None),
            Some(value) => match downcast_ref::<T>(value) {
                Some(v) => Ok(Some(v.clone())),
                None => Err(Error::TypeMismatch {
                    path: key.path().clone(),
                    expected: std::any::type_name::<T>(),
                    found: value.type_name(),
                }),
            },
        }
    }

    /// Get the current value or a fallback
    pub fn get_or_else<T: Clone + 'static>(&self, key: &StoreKey<T>, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Current erased value without creating a cell
    pub(crate) fn peek(&self, path: &KeyPath) -> Option<SharedValue> {
        self.inner.cells().get(path).and_then(|cell| cell.value.clone())
    }

    /// Subscribe to a key's values
    ///
    /// The stream yields the latest value immediately if one exists, then
    /// every later value in order. It completes when the key is deleted.
    pub fn get_stream<T: Clone + 'static>(&self, key: &StoreKey<T>) -> ValueStream<T> {
        let (tx, rx) = mpsc::unbounded();
        let id = self.next_observer_id();
        let mut cells = self.inner.cells();
        let cell = cells.entry(key.path().clone()).or_insert_with(Cell::new);
        if let Some(value) = &cell.value {
            let _ = tx.unbounded_send(value.clone());
        }
        cell.observers.insert(id, Observer::Stream(tx));
        ValueStream {
            rx,
            path: key.path().clone(),
            _marker: PhantomData,
        }
    }

    /// Call `callback` with the current value (if any) and every later value
    ///
    /// The callback stays registered until the returned guard is dropped or
    /// the key is deleted.
    pub fn watch<T, F>(&self, key: &StoreKey<T>, callback: F) -> WatchGuard
    where
        T: 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let replay = {
            let callback = callback.clone();
            move |value: &SharedValue| {
                if let Some(v) = downcast_ref::<T>(value) {
                    callback(v);
                }
            }
        };
        let current = self.peek(key.path());
        let guard = self.observe(
            key.path(),
            Arc::new(move |note: Notification<'_>| {
                if let Notification::Next(value) = note {
                    if let Some(v) = downcast_ref::<T>(value) {
                        callback(v);
                    }
                }
            }),
        );
        if let Some(value) = current {
            replay(&value);
        }
        guard
    }

    /// Register a watch observer without replaying the current value
    pub(crate) fn observe(&self, path: &KeyPath, f: WatchFn) -> WatchGuard {
        let id = self.next_observer_id();
        let mut cells = self.inner.cells();
        let cell = cells.entry(path.clone()).or_insert_with(Cell::new);
        cell.observers.insert(id, Observer::Watch(f));
        WatchGuard {
            store: Arc::downgrade(&self.inner),
            path: path.clone(),
            id,
        }
    }

    /// Store a value, creating the cell if needed, and notify observers
    pub fn set<T: StoreValue>(&self, key: &StoreKey<T>, value: T) -> &Self {
        self.set_shared(key.path().clone(), Arc::new(value))
    }

    /// Store an erased value
    pub fn set_shared(&self, path: KeyPath, value: SharedValue) -> &Self {
        let watchers = {
            let mut cells = self.inner.cells();
            let cell = cells.entry(path).or_insert_with(Cell::new);
            cell.publish(value.clone())
        };
        for watcher in watchers {
            watcher(Notification::Next(&value));
        }
        self
    }

    /// Remove a key, completing its subscribers; no-op if absent
    pub fn del(&self, key: &impl AnyKey) -> &Self {
        let removed = self.inner.cells().shift_remove(key.key_path());
        if let Some(cell) = removed {
            let watchers = cell.watchers();
            // Dropping the cell closes every stream observer.
            drop(cell);
            for watcher in watchers {
                watcher(Notification::Complete);
            }
        }
        self
    }

    /// Apply a staged mutation
    pub fn apply(&self, update: &StoreUpdate) -> &Self {
        match update {
            StoreUpdate::Set { key, value, .. } => self.set_shared(key.clone(), value.clone()),
            StoreUpdate::Del { key, .. } => self.del(key),
        }
    }

    /// Copy every live value
    pub fn snap(&self) -> Snapshot {
        self.inner
            .cells()
            .iter()
            .filter_map(|(path, cell)| cell.value.clone().map(|v| (path.clone(), v)))
            .collect()
    }

    fn next_observer_id(&self) -> u64 {
        self.inner.next_observer.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.snap()).finish()
    }
}

/// RAII guard for a watch observer
pub struct WatchGuard {
    store: Weak<StoreInner>,
    path: KeyPath,
    id: u64,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            if let Some(cell) = store.cells().get_mut(&self.path) {
                cell.observers.shift_remove(&self.id);
            }
        }
    }
}

/// Stream of a key's values, see [`Store::get_stream`]
pub struct ValueStream<T> {
    rx: mpsc::UnboundedReceiver<SharedValue>,
    path: KeyPath,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Clone + 'static> ValueStream<T> {
    /// Take every value already delivered, without waiting
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::new();
        while let Some(Some(value)) = self.next().now_or_never() {
            values.push(value);
        }
        values
    }

    /// The key this stream follows
    pub fn path(&self) -> &KeyPath {
        &self.path
    }
}

impl<T: Clone + 'static> Stream for ValueStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        loop {
            match self.rx.poll_next_unpin(cx) {
                Poll::Ready(Some(value)) => match downcast_ref::<T>(&value) {
                    Some(v) => return Poll::Ready(Some(v.clone())),
                    None => {
                        tracing::warn!(
                            path = %self.path,
                            expected = std::any::type_name::<T>(),
                            found = value.type_name(),
                            "skipping value of unexpected type"
                        );
                    }
                },
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
