#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::Value;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Identifies a single message for the lifetime of the process. Handles are
/// handed out when a message is built or deserialized and are never sent
/// over the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageHandle(u64);

impl MessageHandle {
    pub fn next() -> MessageHandle {
        return MessageHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed));
    }
}

impl Default for MessageHandle {
    fn default() -> MessageHandle {
        return MessageHandle::next();
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLoading {
    #[serde(default)]
    pub stage1: bool,
    #[serde(default)]
    pub stage2: bool,
    #[serde(default)]
    pub stage3: bool,
}

impl StageLoading {
    pub fn any(&self) -> bool {
        return self.stage1 || self.stage2 || self.stage3;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    #[serde(skip)]
    pub handle: MessageHandle,
    pub content: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(skip)]
    pub handle: MessageHandle,
    #[serde(default)]
    pub stage1: Option<Value>,
    #[serde(default)]
    pub stage2: Option<Value>,
    #[serde(default)]
    pub stage3: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub loading: StageLoading,
}

impl AssistantMessage {
    /// True while no stage has produced a result yet.
    pub fn is_empty(&self) -> bool {
        return self.stage1.is_none() && self.stage2.is_none() && self.stage3.is_none();
    }

    /// An assistant placeholder that never received anything usable.
    pub fn is_abandoned(&self) -> bool {
        return self.is_empty() && !self.loading.any();
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
}

impl Message {
    pub fn user(content: &str) -> Message {
        return Message::User(UserMessage {
            handle: MessageHandle::next(),
            content: content.to_string(),
        });
    }

    /// A fresh assistant reply with every stage empty and nothing loading.
    pub fn assistant_placeholder() -> Message {
        return Message::Assistant(AssistantMessage::default());
    }

    pub fn handle(&self) -> MessageHandle {
        match self {
            Message::User(msg) => return msg.handle,
            Message::Assistant(msg) => return msg.handle,
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        if let Message::Assistant(msg) = self {
            return Some(msg);
        }

        return None;
    }

    pub fn as_assistant_mut(&mut self) -> Option<&mut AssistantMessage> {
        if let Message::Assistant(msg) = self {
            return Some(msg);
        }

        return None;
    }
}
