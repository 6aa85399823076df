#[cfg(test)]
#[path = "council_test.rs"]
mod tests;

use std::sync::Arc;
use std::sync::Weak;

use anyhow::bail;
use anyhow::Result;
use futures::future;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::effects;
use super::reduce;
use super::Backoff;
use super::Effect;
use super::RetryScheduler;
use super::RetryTarget;
use super::SelectionToken;
use super::SendOutcome;
use super::Store;
use crate::domain::models::ConversationSummary;
use crate::domain::models::Message;
use crate::domain::models::MessageHandle;
use crate::domain::models::ProtocolEvent;
use crate::infrastructure::api::CouncilApiBox;

/// Drives every exchange with the council backend: reads with retries,
/// selection, creation, and the streaming send pipeline. All results land in
/// the shared [`Store`].
pub struct CouncilService {
    api: CouncilApiBox,
    store: Store,
    retries: RetryScheduler,
    stopped: CancellationToken,
}

impl CouncilService {
    pub fn new(api: CouncilApiBox, backoff: Backoff) -> Arc<CouncilService> {
        return Arc::new(CouncilService {
            api,
            store: Store::default(),
            retries: RetryScheduler::new(backoff),
            stopped: CancellationToken::new(),
        });
    }

    pub fn store(&self) -> &Store {
        return &self.store;
    }

    pub fn retries(&self) -> &RetryScheduler {
        return &self.retries;
    }

    /// Fetches the conversation list. Failures are retried in the background
    /// with backoff and otherwise leave the previous list in place.
    pub fn load_conversations(self: &Arc<Self>, attempt: u32) -> BoxFuture<'static, ()> {
        let service = Arc::clone(self);
        return async move {
            match service.api.list_conversations().await {
                Ok(conversations) => {
                    tracing::debug!(count = conversations.len(), "Loaded conversations");
                    service.store.set_conversations(conversations);
                }
                Err(err) => {
                    tracing::error!(error = ?err, attempt, "Failed to load conversations");
                    let weak = Arc::downgrade(&service);
                    service
                        .retries
                        .schedule(RetryTarget::ConversationList, attempt, move |next| {
                            return match Weak::upgrade(&weak) {
                                Some(service) => service.load_conversations(next),
                                None => future::ready(()).boxed(),
                            };
                        });
                }
            }
        }
        .boxed();
    }

    /// Refreshes the list on a task of its own, so a slow list endpoint never
    /// holds up the caller. Stopped by [`CouncilService::logout`].
    fn refresh_conversations(self: &Arc<Self>) {
        let refresh = self.load_conversations(0);
        let stopped = self.stopped.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = stopped.cancelled() => {
                    tracing::debug!("Dropping conversation list refresh");
                }
                _ = refresh => {}
            }
        });
    }

    /// Fetches the conversation `token` was issued for. The result is only
    /// applied, and a retry only runs, while that selection is still current.
    pub fn load_conversation(self: &Arc<Self>, token: SelectionToken, attempt: u32) -> BoxFuture<'static, ()> {
        let service = Arc::clone(self);
        return async move {
            let res = service.api.get_conversation(&token.id).await;
            if !service.store.is_current(&token) {
                tracing::debug!(id = token.id, "Selection changed, discarding conversation");
                return;
            }

            match res {
                Ok(conversation) => {
                    service.store.apply_conversation(&token, conversation);
                }
                Err(err) => {
                    tracing::error!(error = ?err, id = token.id, attempt, "Failed to load conversation");
                    let weak = Arc::downgrade(&service);
                    service
                        .retries
                        .schedule(RetryTarget::Conversation, attempt, move |next| {
                            let service = match Weak::upgrade(&weak) {
                                Some(service) => service,
                                None => return future::ready(()).boxed(),
                            };

                            if !service.store.is_current(&token) {
                                tracing::debug!(id = token.id, "Selection changed, skipping retry");
                                return future::ready(()).boxed();
                            }

                            return service.load_conversation(token, next);
                        });
                }
            }
        }
        .boxed();
    }

    /// Makes `id` the current conversation and loads it. Any retry still
    /// pending for the previous selection is dropped.
    pub async fn select_conversation(self: &Arc<Self>, id: &str) -> SelectionToken {
        self.retries.cancel(RetryTarget::Conversation);
        let token = self.store.select(id);
        self.load_conversation(token.clone(), 0).await;
        return token;
    }

    /// Creates a conversation, puts it at the top of the list and selects it.
    pub async fn create_conversation(self: &Arc<Self>) -> Result<ConversationSummary> {
        let created = self.api.create_conversation().await.map_err(|err| {
            tracing::error!(error = ?err, "Failed to create conversation");
            return err;
        })?;

        let summary = ConversationSummary::from(created);
        self.store.prepend_conversation(summary.clone());
        self.select_conversation(&summary.id).await;

        return Ok(summary);
    }

    fn send_target(&self) -> Option<SelectionToken> {
        let token = self.store.selection()?;
        let loaded = self
            .store
            .current()
            .map(|current| return current.id == token.id)
            .unwrap_or(false);

        if !loaded {
            tracing::warn!(id = token.id, "Conversation not loaded, ignoring send");
            return None;
        }

        return Some(token);
    }

    fn mark_waiting(&self) {
        if self.store.set_waiting(true) {
            tracing::warn!("Sending while a previous message is still in flight");
        }
    }

    /// Sends `content` to the current conversation and streams the council's
    /// reply into it.
    ///
    /// Returns `Ok(None)` when no conversation is loaded. A fault before any
    /// event arrived rolls back both optimistic messages and is returned as
    /// `Err`. Everything after that is reported as the outcome of the stream.
    pub async fn send_message(self: &Arc<Self>, content: &str) -> Result<Option<SendOutcome>> {
        let token = match self.send_target() {
            Some(token) => token,
            None => return Ok(None),
        };

        self.mark_waiting();
        let pending = match self.store.append_exchange(&token, content) {
            Some(pending) => pending,
            None => {
                self.store.set_waiting(false);
                return Ok(None);
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<ProtocolEvent>();
        let api = Arc::clone(&self.api);
        let id = token.id.clone();
        let body = content.to_string();

        let request = async move {
            return api.send_message_stream(&id, &body, &tx).await;
        };

        let reducer = async {
            let mut outcome = None;
            while let Some(event) = rx.recv().await {
                if let Some(finished) = self.apply_event(pending.reply, &event) {
                    outcome = Some(finished);
                }
            }

            return outcome;
        };

        let (res, outcome) = tokio::join!(request, reducer);
        if let Err(err) = res {
            tracing::error!(error = ?err, id = token.id, "Failed to send message");
            self.store.remove_messages(&[pending.user, pending.reply]);
            self.store.set_waiting(false);
            return Err(err);
        }

        match outcome {
            Some(outcome) => return Ok(Some(outcome)),
            None => {
                self.store.set_waiting(false);
                bail!("Council stream closed without a final event");
            }
        }
    }

    fn apply_event(self: &Arc<Self>, reply: MessageHandle, event: &ProtocolEvent) -> Option<SendOutcome> {
        tracing::debug!(kind = event.kind.as_str(), "Received event");
        self.store
            .update_current(|conversation| return reduce(conversation, reply, event));

        let mut outcome = None;
        for effect in effects(event) {
            match effect {
                Effect::RefreshConversations => {
                    self.refresh_conversations();
                }
                Effect::Finish(finished) => {
                    self.store.set_waiting(false);
                    outcome = Some(finished);
                }
            }
        }

        return outcome;
    }

    /// Sends `content` and waits for the whole council before applying
    /// anything but the optimistic user message. Returns whether anything
    /// was sent.
    pub async fn send_message_blocking(self: &Arc<Self>, content: &str) -> Result<bool> {
        let token = match self.send_target() {
            Some(token) => token,
            None => return Ok(false),
        };

        self.mark_waiting();
        let pending = self.store.append_message(&token, Message::user(content));

        let res = self.api.send_message(&token.id, content).await;
        self.store.set_waiting(false);

        match res {
            Ok(conversation) => {
                self.store.apply_conversation(&token, conversation);
                self.refresh_conversations();
                return Ok(true);
            }
            Err(err) => {
                tracing::error!(error = ?err, id = token.id, "Failed to send message");
                if let Some(handle) = pending {
                    self.store.remove_messages(&[handle]);
                }
                return Err(err);
            }
        }
    }

    /// Stops every pending retry and forgets all state.
    pub fn logout(&self) {
        self.stopped.cancel();
        self.retries.cancel_all();
        self.store.clear();
    }
}
