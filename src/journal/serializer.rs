//! Pluggable serialization of journal records for downstream sinks.
//!
//! A sink implementation that ships events over a wire (file, socket,
//! message bus) picks a format by choosing an [`EventSerializer`]; the
//! engine itself only ever hands sinks typed [`EngineEvent`]s.

use super::events::EngineEvent;

/// Errors that can occur during event serialization or deserialization.
#[derive(Debug)]
pub struct SerializationError {
    /// Human-readable description of the failure.
    pub message: String,
}

impl std::fmt::Display for SerializationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "event serialization error: {}", self.message)
    }
}

impl std::error::Error for SerializationError {}

/// A pluggable serializer for journal records.
pub trait EventSerializer: Send + Sync + std::fmt::Debug {
    /// Serializes an event into a byte buffer.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError`] if the event cannot be serialized.
    fn serialize_event(&self, event: &EngineEvent) -> Result<Vec<u8>, SerializationError>;

    /// Deserializes an event from a byte buffer.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError`] if the bytes are malformed or
    /// incompatible with the expected format.
    fn deserialize_event(&self, data: &[u8]) -> Result<EngineEvent, SerializationError>;

    /// MIME-like content type identifier for this format.
    fn content_type(&self) -> &'static str;
}

/// JSON event serializer using `serde_json`. Human-readable, always
/// available.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEventSerializer;

impl JsonEventSerializer {
    /// Creates a new JSON event serializer.
    pub fn new() -> Self {
        Self
    }
}

impl EventSerializer for JsonEventSerializer {
    fn serialize_event(&self, event: &EngineEvent) -> Result<Vec<u8>, SerializationError> {
        serde_json::to_vec(event).map_err(|e| SerializationError {
            message: e.to_string(),
        })
    }

    fn deserialize_event(&self, data: &[u8]) -> Result<EngineEvent, SerializationError> {
        serde_json::from_slice(data).map_err(|e| SerializationError {
            message: e.to_string(),
        })
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::EventKind;
    use crate::types::{OrderId, OrderRequest, ParticipantId, Side, Symbol};

    #[test]
    fn test_json_round_trip() {
        let serializer = JsonEventSerializer::new();
        let event = EngineEvent {
            sequence: 42,
            symbol: Symbol::from("DEC/USD"),
            order: OrderId(7),
            participant: ParticipantId::from("alice"),
            timestamp: 1_700_000_000_000,
            kind: EventKind::Accepted {
                request: OrderRequest::limit("alice", "DEC/USD", Side::Buy, 10_000, 500),
            },
        };

        let bytes = serializer.serialize_event(&event).unwrap();
        let back = serializer.deserialize_event(&bytes).unwrap();
        assert_eq!(back.sequence, 42);
        assert_eq!(back.order, OrderId(7));
        assert_eq!(back.kind.tag(), "ACCEPTED");
    }

    #[test]
    fn test_content_type() {
        assert_eq!(JsonEventSerializer::new().content_type(), "application/json");
    }

    #[test]
    fn test_malformed_input_errors() {
        let serializer = JsonEventSerializer::new();
        assert!(serializer.deserialize_event(b"not json").is_err());
    }
}
