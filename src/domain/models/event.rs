#[cfg(test)]
#[path = "event_test.rs"]
mod tests;

use std::str::FromStr;

use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash, strum::EnumString, strum::IntoStaticStr)]
pub enum EventKind {
    #[strum(serialize = "stage1_start")]
    Stage1Start,
    #[strum(serialize = "stage1_complete")]
    Stage1Complete,
    #[strum(serialize = "stage2_start")]
    Stage2Start,
    #[strum(serialize = "stage2_complete")]
    Stage2Complete,
    #[strum(serialize = "stage3_start")]
    Stage3Start,
    #[strum(serialize = "stage3_complete")]
    Stage3Complete,
    #[strum(serialize = "title_complete")]
    TitleComplete,
    #[strum(serialize = "complete")]
    Complete,
    #[strum(serialize = "error")]
    Error,
    #[strum(disabled)]
    Unknown(String),
}

impl EventKind {
    pub fn parse(kind: &str) -> EventKind {
        return EventKind::from_str(kind).unwrap_or_else(|_| return EventKind::Unknown(kind.to_string()));
    }

    pub fn as_str(&self) -> &str {
        if let EventKind::Unknown(kind) = self {
            return kind;
        }

        let kind: &'static str = self.into();
        return kind;
    }

    /// `complete` and `error` are the only valid ways to end a stream.
    pub fn is_terminal(&self) -> bool {
        return *self == EventKind::Complete || *self == EventKind::Error;
    }
}

/// One frame payload exactly as it sits on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireEvent", into = "WireEvent")]
pub struct ProtocolEvent {
    pub kind: EventKind,
    pub data: Option<Value>,
    pub metadata: Option<Value>,
    pub message: Option<String>,
}

impl From<WireEvent> for ProtocolEvent {
    fn from(wire: WireEvent) -> ProtocolEvent {
        return ProtocolEvent {
            kind: EventKind::parse(&wire.kind),
            data: wire.data,
            metadata: wire.metadata,
            message: wire.message,
        };
    }
}

impl From<ProtocolEvent> for WireEvent {
    fn from(event: ProtocolEvent) -> WireEvent {
        return WireEvent {
            kind: event.kind.as_str().to_string(),
            data: event.data,
            metadata: event.metadata,
            message: event.message,
        };
    }
}

impl ProtocolEvent {
    pub fn new(kind: EventKind) -> ProtocolEvent {
        return ProtocolEvent {
            kind,
            data: None,
            metadata: None,
            message: None,
        };
    }

    pub fn with_data(kind: EventKind, data: Value) -> ProtocolEvent {
        let mut event = ProtocolEvent::new(kind);
        event.data = Some(data);
        return event;
    }

    pub fn error(message: &str) -> ProtocolEvent {
        let mut event = ProtocolEvent::new(EventKind::Error);
        event.message = Some(message.to_string());
        return event;
    }

    pub fn is_terminal(&self) -> bool {
        return self.kind.is_terminal();
    }
}
