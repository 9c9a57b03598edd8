//! Broadcast events emitted by the transport

use serde_json::Value;

/// Event received from the media server
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastEvent {
    /// Number of viewers currently watching
    ViewerCount(u32),
    /// The broadcast became visible to viewers
    Active,
    /// The broadcast is no longer visible to viewers
    Inactive,
    /// Any event the session does not interpret
    Other { name: String, data: Value },
}

impl BroadcastEvent {
    /// Build an event from its wire name and JSON payload.
    ///
    /// A `viewercount` event without a numeric `viewercount` field is kept
    /// as [`BroadcastEvent::Other`].
    pub fn from_named(name: &str, data: Value) -> Self {
        match name {
            "viewercount" => match data.get("viewercount").and_then(Value::as_u64) {
                Some(count) => BroadcastEvent::ViewerCount(u32::try_from(count).unwrap_or(u32::MAX)),
                None => {
                    tracing::warn!(payload = %data, "Malformed viewercount event");
                    BroadcastEvent::Other {
                        name: name.to_string(),
                        data,
                    }
                }
            },
            "active" => BroadcastEvent::Active,
            "inactive" => BroadcastEvent::Inactive,
            _ => BroadcastEvent::Other {
                name: name.to_string(),
                data,
            },
        }
    }

    /// Wire name of the event
    pub fn name(&self) -> &str {
        match self {
            BroadcastEvent::ViewerCount(_) => "viewercount",
            BroadcastEvent::Active => "active",
            BroadcastEvent::Inactive => "inactive",
            BroadcastEvent::Other { name, .. } => name,
        }
    }
}
