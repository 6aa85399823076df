#[cfg(test)]
#[path = "reducer_test.rs"]
mod tests;

use serde_json::Value;

use crate::domain::models::AssistantMessage;
use crate::domain::models::Conversation;
use crate::domain::models::EventKind;
use crate::domain::models::MessageHandle;
use crate::domain::models::ProtocolEvent;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Completed,
    Failed(String),
}

/// Side effects an event asks for beyond the message mutation itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    RefreshConversations,
    Finish(SendOutcome),
}

#[derive(Copy, Clone, Debug)]
enum Stage {
    First,
    Second,
    Third,
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::First => return "stage1",
            Stage::Second => return "stage2",
            Stage::Third => return "stage3",
        }
    }

    fn slots<'a>(&self, message: &'a mut AssistantMessage) -> (&'a mut Option<Value>, &'a mut bool) {
        match self {
            Stage::First => return (&mut message.stage1, &mut message.loading.stage1),
            Stage::Second => return (&mut message.stage2, &mut message.loading.stage2),
            Stage::Third => return (&mut message.stage3, &mut message.loading.stage3),
        }
    }
}

/// What `event` asks of the send pipeline, independent of message state.
pub fn effects(event: &ProtocolEvent) -> Vec<Effect> {
    match &event.kind {
        EventKind::TitleComplete => return vec![Effect::RefreshConversations],
        EventKind::Complete => {
            return vec![
                Effect::RefreshConversations,
                Effect::Finish(SendOutcome::Completed),
            ]
        }
        EventKind::Error => {
            let message = event
                .message
                .clone()
                .unwrap_or_else(|| return "Unknown error".to_string());
            tracing::error!(error = message, "Council reported an error");
            return vec![Effect::Finish(SendOutcome::Failed(message))];
        }
        EventKind::Unknown(kind) => {
            tracing::warn!(kind, "Ignoring unknown event");
            return vec![];
        }
        _ => return vec![],
    }
}

/// Applies `event` to the assistant message identified by `target`. Returns
/// the next conversation, or `None` when nothing changes. The input is never
/// mutated.
pub fn reduce(
    conversation: &Conversation,
    target: MessageHandle,
    event: &ProtocolEvent,
) -> Option<Conversation> {
    let message = conversation.get(target)?.as_assistant()?;

    let stage = match event.kind {
        EventKind::Stage1Start | EventKind::Stage1Complete => Stage::First,
        EventKind::Stage2Start | EventKind::Stage2Complete => Stage::Second,
        EventKind::Stage3Start | EventKind::Stage3Complete => Stage::Third,
        EventKind::Error => {
            if !message.is_abandoned() {
                return None;
            }

            let mut next = conversation.clone();
            next.remove(target);
            return Some(next);
        }
        _ => return None,
    };

    let mut next = conversation.clone();
    let message = next.get_mut(target)?.as_assistant_mut()?;

    let starting = matches!(
        event.kind,
        EventKind::Stage1Start | EventKind::Stage2Start | EventKind::Stage3Start
    );
    if starting {
        let (_, loading) = stage.slots(message);
        *loading = true;
        return Some(next);
    }

    let (value, loading) = stage.slots(message);
    *loading = false;
    if value.is_some() {
        tracing::warn!(stage = stage.name(), "Stage already complete, keeping first result");
        return Some(next);
    }

    *value = event.data.clone();
    if let Stage::Second = stage {
        message.metadata = event.metadata.clone();
    }

    return Some(next);
}
