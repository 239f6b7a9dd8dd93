//! The event journal: an ordered, write-only log of every order event and
//! trade the engine produces.
//!
//! The core appends and never reads back; persistence, fan-out and replay
//! storage are the sink implementor's concern. Appends are fire-and-forget
//! with respect to matching; backpressure is surfaced at ingress via
//! [`EventJournal::poll_ready`] so accepted orders are never dropped.

mod events;
mod serializer;
mod sink;

pub use events::{EngineEvent, EventKind};
pub use serializer::{EventSerializer, JsonEventSerializer, SerializationError};
pub use sink::{EventJournal, JournalError, MemoryJournal};
