#[cfg(test)]
#[path = "output_test.rs"]
mod tests;

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::domain::models::AssistantMessage;
use crate::domain::models::Conversation;
use crate::domain::models::ConversationSummary;
use crate::domain::models::Message;

const DEFAULT_TITLE: &str = "New Conversation";

/// Renders backend timestamps (naive ISO 8601, optional fraction) as
/// `YYYY-MM-DD HH:MM`. Anything unparsable is shown as is.
pub fn format_timestamp(created_at: &str) -> String {
    let parsed = NaiveDateTime::parse_from_str(created_at, "%Y-%m-%dT%H:%M:%S%.f");
    if let Ok(timestamp) = parsed {
        return timestamp.format("%Y-%m-%d %H:%M").to_string();
    }

    return created_at.to_string();
}

pub fn format_summary(summary: &ConversationSummary) -> String {
    let title = summary.title.as_deref().unwrap_or(DEFAULT_TITLE);
    return format!(
        "- (ID: {}) {}, {}, Messages: {}",
        summary.id,
        format_timestamp(&summary.created_at),
        title,
        summary.message_count
    );
}

pub fn format_summaries(summaries: &[ConversationSummary]) -> String {
    if summaries.is_empty() {
        return "There are no conversations yet. Start one with `council ask`!".to_string();
    }

    return summaries
        .iter()
        .map(format_summary)
        .collect::<Vec<String>>()
        .join("\n");
}

fn text_field<'a>(value: &'a Value, key: &str) -> &'a str {
    return value.get(key).and_then(Value::as_str).unwrap_or_default();
}

fn format_responses(stage1: &Value) -> Vec<String> {
    return stage1
        .as_array()
        .map(|responses| {
            return responses
                .iter()
                .map(|response| {
                    return format!(
                        "- {}: {}",
                        text_field(response, "model"),
                        text_field(response, "response")
                    );
                })
                .collect::<Vec<String>>();
        })
        .unwrap_or_default();
}

fn format_rankings(stage2: &Value, metadata: Option<&Value>) -> Vec<String> {
    let aggregate = metadata
        .and_then(|metadata| return metadata.get("aggregate_rankings"))
        .and_then(Value::as_array);

    if let Some(rankings) = aggregate {
        return rankings
            .iter()
            .enumerate()
            .map(|(idx, ranking)| {
                let average = ranking
                    .get("average_rank")
                    .and_then(Value::as_f64)
                    .unwrap_or_default();
                let votes = ranking
                    .get("rankings_count")
                    .and_then(Value::as_u64)
                    .unwrap_or_default();

                return format!(
                    "{}. {} (average rank {average:.2}, {votes} votes)",
                    idx + 1,
                    text_field(ranking, "model")
                );
            })
            .collect::<Vec<String>>();
    }

    let count = stage2.as_array().map(Vec::len).unwrap_or_default();
    return vec![format!("{count} peer evaluations")];
}

/// Renders whatever stages of a council reply have arrived so far.
pub fn format_assistant(message: &AssistantMessage) -> String {
    let mut lines = vec![];

    if let Some(stage1) = &message.stage1 {
        lines.push("Stage 1: Individual Responses".to_string());
        lines.extend(format_responses(stage1));
    }

    if let Some(stage2) = &message.stage2 {
        lines.push("Stage 2: Peer Rankings".to_string());
        lines.extend(format_rankings(stage2, message.metadata.as_ref()));
    }

    if let Some(stage3) = &message.stage3 {
        lines.push(format!(
            "Stage 3: Final Answer ({})",
            text_field(stage3, "model")
        ));
        lines.push(text_field(stage3, "response").to_string());
    }

    if lines.is_empty() {
        return "(no response)".to_string();
    }

    return lines.join("\n");
}

pub fn format_conversation(conversation: &Conversation, username: &str) -> String {
    let title = conversation.title.as_deref().unwrap_or(DEFAULT_TITLE);
    let mut blocks = vec![format!(
        "{title} ({})",
        format_timestamp(&conversation.created_at)
    )];

    for message in &conversation.messages {
        match message {
            Message::User(user) => blocks.push(format!("{username}: {}", user.content)),
            Message::Assistant(assistant) => {
                blocks.push(format!("Council:\n{}", format_assistant(assistant)))
            }
        }
    }

    return blocks.join("\n\n");
}

fn stage_size(value: &Value) -> usize {
    return value.as_array().map(Vec::len).unwrap_or(1);
}

/// Progress lines for what changed between two renditions of the same
/// reply while it streams in.
pub fn format_progress(previous: &AssistantMessage, next: &AssistantMessage) -> Vec<String> {
    let stages = [
        (
            "Stage 1: collecting individual responses...",
            previous.loading.stage1,
            next.loading.stage1,
            &previous.stage1,
            &next.stage1,
            "responses",
        ),
        (
            "Stage 2: collecting peer rankings...",
            previous.loading.stage2,
            next.loading.stage2,
            &previous.stage2,
            &next.stage2,
            "rankings",
        ),
        (
            "Stage 3: synthesizing the final answer...",
            previous.loading.stage3,
            next.loading.stage3,
            &previous.stage3,
            &next.stage3,
            "answer",
        ),
    ];

    let mut lines = vec![];
    for (idx, (banner, was_loading, is_loading, before, after, unit)) in stages.iter().enumerate() {
        if *is_loading && !*was_loading {
            lines.push(banner.to_string());
        }

        if let (None, Some(value)) = (before, after) {
            lines.push(format!("Stage {} done: {} {unit}", idx + 1, stage_size(value)));
        }
    }

    return lines;
}
