#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::Message;
use super::MessageHandle;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub created_at: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message_count: u64,
}

/// Response of the create endpoint. The backend may send more, only the
/// identity is kept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedConversation {
    pub id: String,
    pub created_at: String,
}

impl From<CreatedConversation> for ConversationSummary {
    fn from(created: CreatedConversation) -> ConversationSummary {
        return ConversationSummary {
            id: created.id,
            created_at: created.created_at,
            title: None,
            message_count: 0,
        };
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub created_at: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(id: &str, created_at: &str) -> Conversation {
        return Conversation {
            id: id.to_string(),
            created_at: created_at.to_string(),
            title: None,
            messages: vec![],
        };
    }

    pub fn push(&mut self, message: Message) -> MessageHandle {
        let handle = message.handle();
        self.messages.push(message);
        return handle;
    }

    pub fn position(&self, handle: MessageHandle) -> Option<usize> {
        return self
            .messages
            .iter()
            .position(|message| return message.handle() == handle);
    }

    pub fn get(&self, handle: MessageHandle) -> Option<&Message> {
        return self
            .messages
            .iter()
            .find(|message| return message.handle() == handle);
    }

    pub fn get_mut(&mut self, handle: MessageHandle) -> Option<&mut Message> {
        return self
            .messages
            .iter_mut()
            .find(|message| return message.handle() == handle);
    }

    pub fn remove(&mut self, handle: MessageHandle) -> Option<Message> {
        let idx = self.position(handle)?;
        return Some(self.messages.remove(idx));
    }
}
