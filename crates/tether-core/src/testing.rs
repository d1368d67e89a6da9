//! Handler test harness
//!
//! Runs a single handler against a store and records what it emits without
//! applying anything or dispatching derived actions. Enabled with the
//! `testing` feature.
//!
//! ```ignore
//! let harness = HandlerHarness::new().setup([StoreUpdate::set(&text, "milk".to_string())]);
//! let emitted = harness.run(&add_item(), ()).await?;
//! assert_emissions(&emitted, &[StoreUpdate::set(&text, String::new()).into()]);
//! ```

use crate::context::HandlerContext;
use crate::effect::{self, Batch, Emission};
use crate::handler::ActionHandler;
use crate::store::Store;
use crate::{Action, ActionKind, Error, Result, StoreUpdate};

/// Runs handlers in isolation and records their emissions
#[derive(Debug, Clone)]
pub struct HandlerHarness {
    store: Store,
    kind: ActionKind,
}

impl HandlerHarness {
    /// Harness over an empty store
    pub fn new() -> Self {
        Self::with_store(Store::new())
    }

    /// Harness over an existing store
    pub fn with_store(store: Store) -> Self {
        Self {
            store,
            kind: ActionKind::new("test"),
        }
    }

    /// Apply updates to the store before running
    pub fn setup(self, updates: impl IntoIterator<Item = StoreUpdate>) -> Self {
        for update in updates {
            self.store.apply(&update);
        }
        self
    }

    /// Use a specific action kind for the invocation
    pub fn kind(mut self, kind: impl Into<ActionKind>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run `handler` with `payload` and return everything it emitted, in
    /// order
    ///
    /// Async effects are driven to completion. Nothing is applied to the
    /// store, so handlers that read their own writes see the setup state.
    pub async fn run<H, P>(&self, handler: &H, payload: P) -> Result<Batch>
    where
        H: ActionHandler + ?Sized,
        P: Send + Sync + 'static,
    {
        let action = Action::new(self.kind.clone(), payload);
        let ctx = HandlerContext::new(self.store.clone(), &action);
        let effect = match handler.handle(ctx.clone(), &action) {
            Ok(effect) => effect,
            Err(err) => {
                ctx.close();
                return Err(err);
            }
        };

        let mut recorded = Batch::new();
        let result = effect::drive(effect, &ctx, |batch| recorded.extend(batch)).await;
        ctx.close();
        match result.err().or_else(|| ctx.take_fault()) {
            Some(source) => Err(Error::HandlerRejected {
                kind: action.kind().clone(),
                source,
            }),
            None => Ok(recorded),
        }
    }
}

impl Default for HandlerHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert two emission sequences match, ignoring traces
#[track_caller]
pub fn assert_emissions(actual: &[Emission], expected: &[Emission]) {
    let matches = actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .all(|(a, e)| a.eq_ignoring_trace(e));
    assert!(
        matches,
        "emissions differ\n  actual:   {:?}\n  expected: {:?}",
        actual, expected
    );
}
