//! The realtime document store seam.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

/// Called with the snapshot at the subscribed path, `None` when nothing is stored there.
pub type SnapshotCallback = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

/// Schema-less tree store with last-write-wins primitives.
///
/// Implementations deliver callbacks for a path in write order. A snapshot
/// of the current value is delivered once on subscribe.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    fn subscribe(&self, path: &str, callback: SnapshotCallback) -> Result<Subscription>;

    /// Replace the value at `path`. Writing `null` deletes it.
    async fn write(&self, path: &str, value: Value) -> Result<()>;

    /// Multi-location update. Keys are paths relative to `path`; a `null`
    /// value deletes that key.
    async fn update(&self, path: &str, values: Map<String, Value>) -> Result<()>;

    /// Append `value` under a new time-ordered child key and return the key.
    async fn push(&self, path: &str, value: Value) -> Result<String>;

    async fn delete(&self, path: &str) -> Result<()>;
}

/// Handle for an active subscription. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("active", &self.cancel.is_some()).finish()
    }
}
