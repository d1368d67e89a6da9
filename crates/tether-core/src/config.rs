//! Dispatcher configuration
//!
//! Settings are plain data so they can be loaded from a RON file next to the
//! application. Every field has a default, so a partial file is valid.

use serde::{Deserialize, Serialize};

/// Default limit on nested dispatch
pub const DEFAULT_MAX_DISPATCH_DEPTH: usize = 64;

/// Default number of events a subscriber may fall behind
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Configuration for a [`crate::Dispatcher`]
///
/// # Example
///
/// ```
/// use tether_core::DispatcherConfig;
///
/// let config = DispatcherConfig::default().with_max_dispatch_depth(8);
/// assert_eq!(config.max_dispatch_depth, 8);
/// assert!(config.log_events);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Longest trace an action may carry before it is rejected
    ///
    /// Guards against handlers that dispatch each other forever.
    pub max_dispatch_depth: usize,

    /// Log every published event through `tracing`
    pub log_events: bool,

    /// Events retained per subscriber before the oldest are dropped
    pub event_capacity: usize,
}

impl DispatcherConfig {
    /// Set the dispatch depth limit (at least 1)
    pub fn with_max_dispatch_depth(mut self, depth: usize) -> Self {
        self.max_dispatch_depth = depth.max(1);
        self
    }

    /// Set the per-subscriber event buffer (at least 1)
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Enable or disable event logging
    pub fn with_log_events(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_dispatch_depth: DEFAULT_MAX_DISPATCH_DEPTH,
            log_events: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DispatcherConfig::default();
        assert_eq!(config.max_dispatch_depth, DEFAULT_MAX_DISPATCH_DEPTH);
        assert!(config.log_events);
    }

    #[test]
    fn test_depth_clamped() {
        let config = DispatcherConfig::default()
            .with_max_dispatch_depth(0)
            .with_event_capacity(0);
        assert_eq!(config.max_dispatch_depth, 1);
        assert_eq!(config.event_capacity, 1);
    }

    #[test]
    fn test_partial_ron() {
        let config: DispatcherConfig =
            ron::from_str("(max_dispatch_depth: 8)").expect("parse partial config");
        assert_eq!(config.max_dispatch_depth, 8);
        assert!(config.log_events);
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn test_ron_roundtrip() {
        let config = DispatcherConfig::default().with_log_events(false);
        let text = ron::to_string(&config).expect("serialize config");
        let parsed: DispatcherConfig = ron::from_str(&text).expect("parse config");
        assert_eq!(parsed, config);
    }
}
