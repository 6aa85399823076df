use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::Conversation;
use super::ConversationSummary;
use super::CreatedConversation;
use super::ProtocolEvent;

#[async_trait]
pub trait CouncilApi {
    /// Lists every conversation the backend knows about, newest first.
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>>;

    async fn create_conversation(&self) -> Result<CreatedConversation>;

    async fn get_conversation(&self, id: &str) -> Result<Conversation>;

    /// Sends a message and waits for the whole council to finish, returning
    /// the final state of the conversation.
    async fn send_message(&self, id: &str, content: &str) -> Result<Conversation>;

    /// Sends a message and forwards every decoded protocol event through the
    /// channel as soon as its frame is complete.
    ///
    /// Once an event has been forwarded the stream always ends on a terminal
    /// event, synthesized if necessary, and the call returns `Ok`. An `Err`
    /// means nothing was forwarded.
    async fn send_message_stream<'a>(
        &self,
        id: &str,
        content: &str,
        tx: &'a mpsc::UnboundedSender<ProtocolEvent>,
    ) -> Result<()>;
}
