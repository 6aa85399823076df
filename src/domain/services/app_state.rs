#[cfg(test)]
#[path = "app_state_test.rs"]
mod tests;

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::models::Conversation;
use crate::domain::models::ConversationSummary;
use crate::domain::models::Message;
use crate::domain::models::MessageHandle;

/// Proof of which selection a read was started for. A token only matches the
/// state while no other selection has been made since it was issued, even if
/// the same id is selected again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionToken {
    pub id: String,
    generation: u64,
}

/// Handles of the two messages a send appends optimistically.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PendingExchange {
    pub user: MessageHandle,
    pub reply: MessageHandle,
}

#[derive(Clone, Debug, Default)]
pub struct AppState {
    pub conversations: Arc<Vec<ConversationSummary>>,
    pub selection: Option<SelectionToken>,
    pub current: Option<Arc<Conversation>>,
    pub waiting_for_backend: bool,
    generation: u64,
}

/// The single shared aggregate. Every change is one synchronous replacement
/// of the snapshot, and the current conversation is swapped behind a fresh
/// `Arc`, so subscribers only ever see whole states.
pub struct Store {
    state: watch::Sender<AppState>,
}

impl Default for Store {
    fn default() -> Store {
        let (state, _) = watch::channel(AppState::default());
        return Store { state };
    }
}

impl Store {
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        return self.state.subscribe();
    }

    pub fn snapshot(&self) -> AppState {
        return self.state.borrow().clone();
    }

    pub fn selection(&self) -> Option<SelectionToken> {
        return self.state.borrow().selection.clone();
    }

    pub fn current(&self) -> Option<Arc<Conversation>> {
        return self.state.borrow().current.clone();
    }

    pub fn is_waiting(&self) -> bool {
        return self.state.borrow().waiting_for_backend;
    }

    pub fn is_current(&self, token: &SelectionToken) -> bool {
        return self.state.borrow().selection.as_ref() == Some(token);
    }

    pub fn set_conversations(&self, conversations: Vec<ConversationSummary>) {
        self.state.send_modify(|state| {
            state.conversations = Arc::new(conversations);
        });
    }

    pub fn prepend_conversation(&self, summary: ConversationSummary) {
        self.state.send_modify(|state| {
            let mut conversations = vec![summary];
            conversations.extend(state.conversations.iter().cloned());
            state.conversations = Arc::new(conversations);
        });
    }

    /// Makes `id` the selected conversation and returns the token reads for
    /// it must present. Switching to another id drops the loaded
    /// conversation.
    pub fn select(&self, id: &str) -> SelectionToken {
        let mut token = None;
        self.state.send_modify(|state| {
            state.generation += 1;
            let selection = SelectionToken {
                id: id.to_string(),
                generation: state.generation,
            };

            let same_id = state
                .current
                .as_ref()
                .map(|current| return current.id == id)
                .unwrap_or(false);
            if !same_id {
                state.current = None;
            }

            state.selection = Some(selection.clone());
            token = Some(selection);
        });

        return token.unwrap_or_else(|| {
            return SelectionToken {
                id: id.to_string(),
                generation: 0,
            };
        });
    }

    /// Replaces the current conversation with a freshly read one, unless the
    /// selection moved on since `token` was issued.
    pub fn apply_conversation(&self, token: &SelectionToken, conversation: Conversation) -> bool {
        return self.state.send_if_modified(|state| {
            if state.selection.as_ref() != Some(token) {
                return false;
            }

            state.current = Some(Arc::new(conversation));
            return true;
        });
    }

    /// Runs `update` against the current conversation and swaps in whatever
    /// it returns. `None` leaves the state untouched.
    pub fn update_current<F>(&self, update: F) -> bool
    where
        F: FnOnce(&Conversation) -> Option<Conversation>,
    {
        return self.state.send_if_modified(|state| {
            let next = match &state.current {
                Some(current) => update(current),
                None => None,
            };

            if let Some(conversation) = next {
                state.current = Some(Arc::new(conversation));
                return true;
            }

            return false;
        });
    }

    /// Appends a user message and an empty assistant placeholder to the
    /// conversation `token` points at.
    pub fn append_exchange(&self, token: &SelectionToken, content: &str) -> Option<PendingExchange> {
        let mut pending = None;
        self.update_current(|current| {
            if current.id != token.id {
                return None;
            }

            let mut next = current.clone();
            let user = next.push(Message::user(content));
            let reply = next.push(Message::assistant_placeholder());
            pending = Some(PendingExchange { user, reply });

            return Some(next);
        });

        return pending;
    }

    pub fn append_message(&self, token: &SelectionToken, message: Message) -> Option<MessageHandle> {
        let mut handle = None;
        self.update_current(|current| {
            if current.id != token.id {
                return None;
            }

            let mut next = current.clone();
            handle = Some(next.push(message));

            return Some(next);
        });

        return handle;
    }

    /// Removes exactly the given messages, wherever they sit.
    pub fn remove_messages(&self, handles: &[MessageHandle]) -> usize {
        let mut removed = 0;
        self.update_current(|current| {
            let mut next = current.clone();
            for handle in handles {
                if next.remove(*handle).is_some() {
                    removed += 1;
                }
            }

            if removed == 0 {
                return None;
            }

            return Some(next);
        });

        return removed;
    }

    /// Sets the busy flag and returns the previous value.
    pub fn set_waiting(&self, waiting: bool) -> bool {
        let mut previous = false;
        self.state.send_if_modified(|state| {
            previous = state.waiting_for_backend;
            state.waiting_for_backend = waiting;
            return previous != waiting;
        });

        return previous;
    }

    /// Forgets the list, the selection and the loaded conversation.
    pub fn clear(&self) {
        self.state.send_modify(|state| {
            let generation = state.generation + 1;
            *state = AppState {
                generation,
                ..AppState::default()
            };
        });
    }
}
