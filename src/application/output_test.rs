use anyhow::Result;
use serde_json::json;
use test_utils::conversation_fixture;

use super::format_assistant;
use super::format_conversation;
use super::format_progress;
use super::format_summaries;
use super::format_timestamp;
use crate::domain::models::AssistantMessage;
use crate::domain::models::Conversation;
use crate::domain::models::ConversationSummary;

#[test]
fn it_formats_timestamps() {
    assert_eq!(format_timestamp("2024-05-01T10:30:00.123456"), "2024-05-01 10:30");
    assert_eq!(format_timestamp("2024-05-01T10:30:00"), "2024-05-01 10:30");
    assert_eq!(format_timestamp("yesterday"), "yesterday");
}

#[test]
fn it_formats_the_conversation_list() {
    let summaries = vec![
        ConversationSummary {
            id: "abc".to_string(),
            created_at: "2024-05-01T10:30:00.000000".to_string(),
            title: Some("Capital of France".to_string()),
            message_count: 2,
        },
        ConversationSummary {
            id: "def".to_string(),
            created_at: "2024-05-02T08:00:00".to_string(),
            title: None,
            message_count: 0,
        },
    ];

    insta::assert_snapshot!(format_summaries(&summaries), @r###"
    - (ID: abc) 2024-05-01 10:30, Capital of France, Messages: 2
    - (ID: def) 2024-05-02 08:00, New Conversation, Messages: 0
    "###);
}

#[test]
fn it_formats_an_empty_conversation_list() {
    insta::assert_snapshot!(format_summaries(&[]), @"There are no conversations yet. Start one with `council ask`!");
}

#[test]
fn it_formats_a_conversation() -> Result<()> {
    let conversation = serde_json::from_str::<Conversation>(&conversation_fixture("abc"))?;

    insta::assert_snapshot!(format_conversation(&conversation, "testuser"), @r###"
    Capital of France (2024-05-01 10:30)

    testuser: What is the capital of France?

    Council:
    Stage 1: Individual Responses
    - openai/gpt-4o: Paris.
    Stage 2: Peer Rankings
    0 peer evaluations
    Stage 3: Final Answer (google/gemini-pro)
    Paris.
    "###);

    return Ok(());
}

#[test]
fn it_formats_aggregate_rankings() {
    let message = AssistantMessage {
        stage2: Some(json!([])),
        metadata: Some(json!({
            "aggregate_rankings": [
                {"model": "anthropic/claude-3-opus", "average_rank": 1.0, "rankings_count": 1},
                {"model": "openai/gpt-4o", "average_rank": 2.0, "rankings_count": 1}
            ]
        })),
        ..AssistantMessage::default()
    };

    insta::assert_snapshot!(format_assistant(&message), @r###"
    Stage 2: Peer Rankings
    1. anthropic/claude-3-opus (average rank 1.00, 1 votes)
    2. openai/gpt-4o (average rank 2.00, 1 votes)
    "###);
}

#[test]
fn it_formats_an_empty_reply() {
    insta::assert_snapshot!(format_assistant(&AssistantMessage::default()), @"(no response)");
}

#[test]
fn it_reports_stage_transitions() {
    let idle = AssistantMessage::default();
    let mut loading = AssistantMessage::default();
    loading.loading.stage1 = true;
    let mut done = AssistantMessage::default();
    done.stage1 = Some(json!([{"model": "a"}, {"model": "b"}]));
    done.stage3 = Some(json!({"model": "c", "response": "Paris."}));

    assert_eq!(
        format_progress(&idle, &loading),
        vec!["Stage 1: collecting individual responses...".to_string()]
    );
    assert_eq!(
        format_progress(&loading, &done),
        vec![
            "Stage 1 done: 2 responses".to_string(),
            "Stage 3 done: 1 answer".to_string()
        ]
    );
    assert!(format_progress(&done, &done).is_empty());
}
