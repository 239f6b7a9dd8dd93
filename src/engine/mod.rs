//! The order lifecycle manager and its supporting machinery.

mod engine;
mod error;
pub mod replay;
mod risk;
mod worker;

pub use engine::{Accepted, Engine, ModifyRequest};
pub use error::{EngineError, FatalError, RejectReason, TransientError};
pub use risk::RiskTracker;
