//! The journal sink trait and the in-memory implementation.

use super::events::EngineEvent;
use std::fmt;
use std::sync::Mutex;

/// Errors a journal sink can raise.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum JournalError {
    /// The sink cannot keep up; the caller should retry after backing off.
    /// Surfaced at ingress as a transient error, never mid-transition.
    Backpressure,

    /// The sink failed outright (I/O, closed channel). Treated as a halt
    /// condition by the engine.
    Sink {
        /// Underlying failure description.
        message: String,
    },

    /// An internal mutex was poisoned.
    MutexPoisoned,
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalError::Backpressure => write!(f, "journal backpressure, retry later"),
            JournalError::Sink { message } => write!(f, "journal sink error: {message}"),
            JournalError::MutexPoisoned => write!(f, "journal internal mutex poisoned"),
        }
    }
}

impl std::error::Error for JournalError {}

/// An append-only, write-only event sink.
///
/// The engine guarantees that events for one symbol are appended in the
/// exact order their state transitions occurred. Implementations must be
/// `Send + Sync`; the engine may append from any symbol worker.
pub trait EventJournal: Send + Sync {
    /// Appends one event.
    ///
    /// # Errors
    ///
    /// [`JournalError::Sink`] on unrecoverable sink failure, which the
    /// engine treats as a halt condition.
    fn append(&self, event: &EngineEvent) -> Result<(), JournalError>;

    /// Probes for backpressure before the engine accepts new work. The
    /// default implementation is always ready.
    ///
    /// # Errors
    ///
    /// [`JournalError::Backpressure`] when the caller should retry later.
    fn poll_ready(&self) -> Result<(), JournalError> {
        Ok(())
    }
}

/// An in-memory journal for tests and embedded use. Appends never fail.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    events: Mutex<Vec<EngineEvent>>,
}

impl MemoryJournal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out all events appended so far, in append order.
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Number of events appended.
    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    /// Whether nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventJournal for MemoryJournal {
    fn append(&self, event: &EngineEvent) -> Result<(), JournalError> {
        let mut events = self.events.lock().map_err(|_| JournalError::MutexPoisoned)?;
        events.push(event.clone());
        Ok(())
    }
}
