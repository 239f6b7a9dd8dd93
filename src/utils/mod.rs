//! Small shared utilities: wall-clock access and trade-id generation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Returns the current wall-clock time in milliseconds since the Unix epoch.
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A thread-safe generator for sequential, namespace-scoped trade ids.
///
/// Each id is a UUID v5 derived from the generator's namespace and an
/// incrementing counter, so ids are unique within an engine instance and
/// reproducible when the same namespace is replayed.
#[derive(Debug)]
pub struct TradeIdGenerator {
    namespace: Uuid,
    counter: AtomicU64,
}

impl TradeIdGenerator {
    /// Creates a generator scoped to the given namespace.
    pub fn new(namespace: Uuid) -> Self {
        Self {
            namespace,
            counter: AtomicU64::new(0),
        }
    }

    /// Generates the next id in sequence.
    pub fn next(&self) -> Uuid {
        let counter = self.counter.fetch_add(1, Ordering::SeqCst);
        Uuid::new_v5(&self.namespace, counter.to_string().as_bytes())
    }
}
