use serde_json::json;

use super::effects;
use super::reduce;
use super::Effect;
use super::SendOutcome;
use crate::domain::models::AssistantMessage;
use crate::domain::models::Conversation;
use crate::domain::models::EventKind;
use crate::domain::models::Message;
use crate::domain::models::MessageHandle;
use crate::domain::models::ProtocolEvent;

fn pending_conversation() -> (Conversation, MessageHandle) {
    let mut conversation = Conversation::new("abc", "2024-05-01T10:30:00");
    conversation.push(Message::user("What is the capital of France?"));
    let reply = conversation.push(Message::assistant_placeholder());
    return (conversation, reply);
}

fn reply(conversation: &Conversation, handle: MessageHandle) -> AssistantMessage {
    return conversation
        .get(handle)
        .and_then(|message| return message.as_assistant())
        .cloned()
        .unwrap();
}

fn run(
    conversation: Conversation,
    target: MessageHandle,
    events: &[ProtocolEvent],
) -> (Conversation, Vec<Effect>) {
    let mut conversation = conversation;
    let mut requested = vec![];
    for event in events {
        if let Some(next) = reduce(&conversation, target, event) {
            conversation = next;
        }
        requested.extend(effects(event));
    }

    return (conversation, requested);
}

#[test]
fn it_marks_a_stage_as_loading() {
    let (conversation, handle) = pending_conversation();
    let next = reduce(&conversation, handle, &ProtocolEvent::new(EventKind::Stage2Start)).unwrap();

    let message = reply(&next, handle);
    assert!(message.loading.stage2);
    assert!(!message.loading.stage1);
    assert!(!message.loading.stage3);
    assert!(!reply(&conversation, handle).loading.stage2);
}

#[test]
fn it_fills_in_a_single_stage() {
    let (conversation, handle) = pending_conversation();
    let (conversation, requested) = run(
        conversation,
        handle,
        &[
            ProtocolEvent::new(EventKind::Stage1Start),
            ProtocolEvent::with_data(EventKind::Stage1Complete, json!([{"model": "a", "response": "Paris"}])),
            ProtocolEvent::new(EventKind::Complete),
        ],
    );

    let message = reply(&conversation, handle);
    assert_eq!(message.stage1, Some(json!([{"model": "a", "response": "Paris"}])));
    assert!(!message.loading.any());
    assert_eq!(message.stage2, None);
    assert_eq!(message.stage3, None);
    assert_eq!(
        requested,
        vec![
            Effect::RefreshConversations,
            Effect::Finish(SendOutcome::Completed)
        ]
    );
}

#[test]
fn it_keeps_stage2_metadata() {
    let (conversation, handle) = pending_conversation();
    let mut event = ProtocolEvent::with_data(EventKind::Stage2Complete, json!([{"model": "a", "ranking": "1. Response A"}]));
    event.metadata = Some(json!({"label_to_model": {"Response A": "a"}}));

    let next = reduce(&conversation, handle, &event).unwrap();

    let message = reply(&next, handle);
    assert_eq!(message.metadata, Some(json!({"label_to_model": {"Response A": "a"}})));
    assert!(message.stage2.is_some());
}

#[test]
fn it_never_overwrites_a_completed_stage() {
    let (conversation, handle) = pending_conversation();
    let (conversation, _) = run(
        conversation,
        handle,
        &[
            ProtocolEvent::with_data(EventKind::Stage3Complete, json!({"response": "first"})),
            ProtocolEvent::new(EventKind::Stage3Start),
            ProtocolEvent::with_data(EventKind::Stage3Complete, json!({"response": "second"})),
        ],
    );

    let message = reply(&conversation, handle);
    assert_eq!(message.stage3, Some(json!({"response": "first"})));
    assert!(!message.loading.stage3);
}

#[test]
fn it_only_touches_the_target_message() {
    let mut conversation = Conversation::new("abc", "");
    let earlier = conversation.push(Message::assistant_placeholder());
    conversation.push(Message::user("again"));
    let target = conversation.push(Message::assistant_placeholder());

    let next = reduce(
        &conversation,
        target,
        &ProtocolEvent::with_data(EventKind::Stage1Complete, json!([])),
    )
    .unwrap();

    assert!(reply(&next, earlier).stage1.is_none());
    assert_eq!(reply(&next, target).stage1, Some(json!([])));
}

#[test]
fn it_ignores_events_for_a_missing_target() {
    let (conversation, _) = pending_conversation();
    let user = conversation.messages[0].handle();

    assert!(reduce(&conversation, MessageHandle::next(), &ProtocolEvent::new(EventKind::Stage1Start)).is_none());
    assert!(reduce(&conversation, user, &ProtocolEvent::new(EventKind::Stage1Start)).is_none());
}

#[test]
fn it_drops_an_abandoned_placeholder_on_error() {
    let (conversation, handle) = pending_conversation();
    let (next, requested) = run(conversation, handle, &[ProtocolEvent::error("Council unavailable")]);

    assert_eq!(next.messages.len(), 1);
    assert!(next.get(handle).is_none());
    assert_eq!(
        requested,
        vec![Effect::Finish(SendOutcome::Failed("Council unavailable".to_string()))]
    );
}

#[test]
fn it_keeps_a_partial_reply_on_error() {
    let (conversation, handle) = pending_conversation();
    let (next, _) = run(
        conversation,
        handle,
        &[
            ProtocolEvent::new(EventKind::Stage1Start),
            ProtocolEvent::with_data(EventKind::Stage1Complete, json!([])),
            ProtocolEvent::error("Stream ended unexpectedly"),
        ],
    );

    assert_eq!(next.messages.len(), 2);
    assert_eq!(reply(&next, handle).stage1, Some(json!([])));
}

#[test]
fn it_keeps_a_loading_placeholder_on_error() {
    let (conversation, handle) = pending_conversation();
    let (next, _) = run(
        conversation,
        handle,
        &[
            ProtocolEvent::new(EventKind::Stage1Start),
            ProtocolEvent::error("boom"),
        ],
    );

    assert_eq!(next.messages.len(), 2);
    assert!(reply(&next, handle).loading.stage1);
}

#[test]
fn it_requests_a_refresh_for_titles() {
    let (conversation, handle) = pending_conversation();
    let event = ProtocolEvent::with_data(EventKind::TitleComplete, json!({"title": "Capital of France"}));

    assert!(reduce(&conversation, handle, &event).is_none());
    assert_eq!(effects(&event), vec![Effect::RefreshConversations]);
}

#[test]
fn it_ignores_unknown_events() {
    let (conversation, handle) = pending_conversation();
    let event = ProtocolEvent::new(EventKind::parse("stage4_start"));

    assert!(reduce(&conversation, handle, &event).is_none());
    assert!(effects(&event).is_empty());
}

#[test]
fn it_falls_back_to_a_generic_error_message() {
    let event = ProtocolEvent::new(EventKind::Error);

    assert_eq!(
        effects(&event),
        vec![Effect::Finish(SendOutcome::Failed("Unknown error".to_string()))]
    );
}
