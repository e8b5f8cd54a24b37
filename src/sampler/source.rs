use crate::models::{RawFix, SourceError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Receives every fix or error produced by an active watch.
pub type FixSink = Arc<dyn Fn(Result<RawFix, SourceError>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub enable_high_accuracy: bool,
    /// Longest wait for a fix before the source reports a timeout.
    pub timeout: Duration,
    /// Oldest cached fix the source may hand out.
    pub maximum_age: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout: Duration::from_secs(30),
            maximum_age: Duration::ZERO,
        }
    }
}

/// A continuous position-reporting facility (GPS receiver, gpsd feed,
/// platform location API).
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Subscribes `sink` to every fix until `clear_watch` is called.
    fn watch(&self, sink: FixSink, options: WatchOptions) -> WatchId;

    fn clear_watch(&self, id: WatchId);

    /// One-shot position request. May trigger a permission prompt.
    async fn current_position(&self, options: WatchOptions) -> Result<RawFix, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
    Unavailable,
}

/// Non-invasive permission introspection.
#[async_trait]
pub trait PermissionQuery: Send + Sync {
    async fn query(&self) -> anyhow::Result<PermissionState>;
}
