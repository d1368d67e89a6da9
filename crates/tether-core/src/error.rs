//! Error types for tether-core

use crate::{ActionKind, KeyPath};
use thiserror::Error;

/// Error raised by user handler code, either returned or produced by a
/// failed future/stream
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Core error type
///
/// Runtime errors never propagate out of [`crate::Dispatcher::dispatch`];
/// they are published as [`crate::Event::Error`] on the event stream.
#[derive(Error, Debug)]
pub enum Error {
    /// No handler is registered for the dispatched action kind
    #[error("no handler registered for action '{kind}'")]
    HandlerNotFound { kind: ActionKind },

    /// The handler failed synchronously (returned an error or panicked)
    #[error("handler for '{kind}' failed: {source}")]
    HandlerThrew { kind: ActionKind, source: HandlerError },

    /// The handler's deferred or ongoing effect failed
    #[error("handler for '{kind}' rejected: {source}")]
    HandlerRejected { kind: ActionKind, source: HandlerError },

    /// The action payload does not have the type the handler expects
    #[error("payload for '{kind}' should be {expected}, got {found}")]
    PayloadMismatch {
        kind: ActionKind,
        expected: &'static str,
        found: &'static str,
    },

    /// Nested dispatch went deeper than the configured limit
    #[error("action '{kind}' exceeds the dispatch depth limit of {limit}")]
    DispatchDepthExceeded { kind: ActionKind, limit: usize },

    /// An async effect was returned outside of a tokio runtime
    #[error("no async runtime available to drive handler for '{kind}'")]
    RuntimeUnavailable { kind: ActionKind },

    /// The value stored under a key is not of the requested type
    #[error("value at '{path}' should be {expected}, got {found}")]
    TypeMismatch {
        path: KeyPath,
        expected: &'static str,
        found: &'static str,
    },
}

impl Error {
    /// The action kind this error relates to, if any
    pub fn action_kind(&self) -> Option<&ActionKind> {
        match self {
            Error::HandlerNotFound { kind }
            | Error::HandlerThrew { kind, .. }
            | Error::HandlerRejected { kind, .. }
            | Error::PayloadMismatch { kind, .. }
            | Error::DispatchDepthExceeded { kind, .. }
            | Error::RuntimeUnavailable { kind } => Some(kind),
            Error::TypeMismatch { .. } => None,
        }
    }

    /// Check if this is a missing-handler error
    pub fn is_handler_not_found(&self) -> bool {
        matches!(self, Error::HandlerNotFound { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Render a caught panic payload as a handler error
pub(crate) fn panic_error(payload: Box<dyn std::any::Any + Send>) -> HandlerError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    };
    format!("panic: {}", message).into()
}
