//! Identifier newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine-wide monotonic order identifier. Monotonicity engine-wide implies
/// monotonicity within every symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wraps the given value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrows the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// A participant (account) identifier.
    ParticipantId
);
string_id!(
    /// An asset identifier, e.g. `"USD"` or `"DEC"`.
    AssetId
);
string_id!(
    /// A trading symbol, e.g. `"DEC/USD"`.
    Symbol
);
string_id!(
    /// An optional client-assigned order identifier, unique per participant
    /// among active orders.
    ClientOrderId
);
