//! Tether Slice - Namespaced keys and actions
//!
//! A slice groups related store keys and actions under one definition:
//! - Key trees with initial values (`init`, `branch`, `param`)
//! - Action trees with their handlers (`handler`, `custom`, `actions`)
//! - Typed lookup by `/`-joined path (`SliceKeys`, `SliceActions`)
//! - Runtime wiring onto a store and dispatcher (`init_slice`)
//!
//! ```ignore
//! let slice = Slice::create(SliceDef {
//!     keys: branch([("count", init(0u32))]),
//!     actions: actions([("add", handler(|ctx: HandlerContext, n: u32| { /* ... */ }))]),
//! })?;
//! let runtime = slice.init(None);
//! runtime.dispatcher.dispatch(slice.actions().create("add", 1u32)?);
//! ```

mod actions;
mod error;
mod keys;
mod node;
mod slice;

pub use actions::SliceActions;
pub use error::{Result, SliceError};
pub use keys::SliceKeys;
pub use node::{
    actions, branch, custom, handler, init, param, ActionNode, HandlerNode, Initializer, KeyNode,
    ParamFn,
};
pub use slice::{init_slice, init_slice_with_config, Slice, SliceDef, SliceRuntime};
