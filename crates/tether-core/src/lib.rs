//! Tether Core - Reactive keyed store with action dispatch
//!
//! This crate provides the core types and runtime for tether:
//! - A keyed store of observable values (`Store`, `StoreKey`)
//! - Actions routed to handlers by kind (`Action`, `ActionType`)
//! - Handlers that stage updates and derived actions (`HandlerContext`)
//! - Effects that may complete now, later, or over time (`Effect`)
//! - A dispatcher publishing actions, updates and errors on one stream
//!
//! ## Flow
//!
//! ```text
//! dispatch(action) -> handler(ctx, payload) -> effect -> batches -> store
//!                                                          \-> derived actions
//! ```
//!
//! Every update and derived action carries a trace: the chain of action
//! kinds that caused it, outermost first.
//!
//! ## Testing Feature
//!
//! Enable the `testing` feature to run handlers in isolation:
//! ```toml
//! tether-core = { version = "0.1", features = ["testing"] }
//! ```

mod action;
pub mod config;
mod context;
pub mod dispatcher;
pub mod effect;
mod error;
mod handler;
mod key;
pub mod store;
mod update;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use action::{Action, ActionKind, ActionType, Payload, Trace};
pub use config::DispatcherConfig;
pub use context::{CancelToken, HandlerContext, WatchedValues};
pub use dispatcher::{Dispatcher, Event, EventStream};
pub use effect::{Batch, Effect, Emission, IntoBatch, IntoEffect};
pub use error::{Error, HandlerError, Result};
pub use handler::{
    curried, delete_value, handler, set_value, ActionHandler, CurriedHandler, FnHandler, HandlerMap,
    SetValue,
};
pub use key::{downcast_ref, AnyKey, KeyPath, SharedValue, StoreKey, StoreValue};
pub use store::{Snapshot, Store, ValueStream, WatchGuard};
pub use update::StoreUpdate;

#[cfg(any(test, feature = "testing"))]
pub use testing::{assert_emissions, HandlerHarness};
