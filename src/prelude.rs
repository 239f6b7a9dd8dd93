//! Prelude module that re-exports the types needed for everyday use.
//!
//! ```rust
//! use exchange_core::prelude::*;
//! ```

// Engine surface
pub use crate::engine::{
    Accepted, Engine, EngineError, FatalError, ModifyRequest, RejectReason, TransientError,
};

// Order and trade types
pub use crate::types::{
    AssetId, ClientOrderId, Order, OrderId, OrderKind, OrderRequest, OrderStatus, ParticipantId,
    Side, Symbol, TimeInForce, Trade, Trail,
};

// Configuration and reference data
pub use crate::refdata::{
    AssetConfig, EngineConfig, ReferenceData, RiskLimits, SelfMatchPolicy, SessionConfig,
    SymbolConfig, TriggerSource,
};

// Ledger types
pub use crate::ledger::{Balance, Ledger, LedgerError};

// Book views
pub use crate::book::{DepthSnapshot, LevelView};

// Journal surface
pub use crate::journal::{
    EngineEvent, EventJournal, EventKind, JournalError, JsonEventSerializer, MemoryJournal,
};

// Utility functions
pub use crate::utils::current_time_millis;
