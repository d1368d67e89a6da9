//! Identity types for store slots and the values they hold

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

/// A value that can live in the store
///
/// Implemented for every `Any + Send + Sync + Debug + PartialEq` type, so
/// plain data types need no extra code.
pub trait StoreValue: Any + Send + Sync + fmt::Debug {
    /// Upcast for downcasting to the concrete type
    fn as_any(&self) -> &dyn Any;

    /// Name of the concrete type, for diagnostics
    fn type_name(&self) -> &'static str;

    /// Compare with another erased value of possibly different type
    fn eq_value(&self, other: &dyn StoreValue) -> bool;
}

impl<T> StoreValue for T
where
    T: Any + Send + Sync + fmt::Debug + PartialEq,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn eq_value(&self, other: &dyn StoreValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }
}

/// A type-erased, shared store value
pub type SharedValue = Arc<dyn StoreValue>;

/// Downcast a shared value to its concrete type
pub fn downcast_ref<T: 'static>(value: &SharedValue) -> Option<&T> {
    (**value).as_any().downcast_ref::<T>()
}

/// Path identifying a storage slot
///
/// Segments are joined with `/`. Two keys with equal paths address the same slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyPath(String);

impl KeyPath {
    /// Create a new key path
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Get the path as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append a segment, producing `self/segment`
    pub fn join(&self, segment: &str) -> Self {
        if self.0.is_empty() {
            Self::new(segment)
        } else {
            Self(format!("{}/{}", self.0, segment))
        }
    }

    /// Iterate over the path segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for KeyPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for KeyPath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A typed handle to a storage slot
///
/// The value type `T` exists only at the type level; identity is the path.
pub struct StoreKey<T> {
    path: KeyPath,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StoreKey<T> {
    /// Create a key for the given path
    pub fn new(path: impl Into<KeyPath>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Get the key path
    pub fn path(&self) -> &KeyPath {
        &self.path
    }

    /// Derive a key one segment below this one
    pub fn child<U>(&self, segment: &str) -> StoreKey<U> {
        StoreKey::new(self.path.join(segment))
    }
}

impl<T> Clone for StoreKey<T> {
    fn clone(&self) -> Self {
        Self::new(self.path.clone())
    }
}

impl<T> fmt::Debug for StoreKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreKey")
            .field("path", &self.path)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> PartialEq for StoreKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl<T> Eq for StoreKey<T> {}

impl<T> Hash for StoreKey<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

/// Anything that names a storage slot, used where keys of different value
/// types are mixed
pub trait AnyKey {
    fn key_path(&self) -> &KeyPath;
}

impl<T> AnyKey for StoreKey<T> {
    fn key_path(&self) -> &KeyPath {
        &self.path
    }
}

impl AnyKey for KeyPath {
    fn key_path(&self) -> &KeyPath {
        self
    }
}
