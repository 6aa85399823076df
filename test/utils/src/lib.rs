/// Wraps a JSON payload into a single `data:` frame terminated by a blank
/// line.
pub fn sse_frame(payload: &str) -> String {
    return format!("data: {payload}\n\n");
}

/// Joins payloads into one stream body, one frame per payload.
pub fn sse_body(payloads: &[&str]) -> String {
    return payloads
        .iter()
        .map(|payload| {
            return sse_frame(payload);
        })
        .collect::<Vec<String>>()
        .join("");
}

/// A complete council run as the backend streams it, keep-alive comment
/// included.
pub fn council_stream_fixture() -> String {
    return [
        ": keep-alive\n\n".to_string(),
        sse_frame(r#"{"type":"stage1_start"}"#),
        sse_frame(
            r#"{"type":"stage1_complete","data":[{"model":"openai/gpt-4o","response":"Paris."},{"model":"anthropic/claude-3-opus","response":"It is Paris."}]}"#,
        ),
        sse_frame(r#"{"type":"stage2_start"}"#),
        sse_frame(
            r#"{"type":"stage2_complete","data":[{"model":"openai/gpt-4o","ranking":"FINAL RANKING:\n1. Response B\n2. Response A","parsed_ranking":["Response B","Response A"]}],"metadata":{"label_to_model":{"Response A":"openai/gpt-4o","Response B":"anthropic/claude-3-opus"},"aggregate_rankings":[{"model":"anthropic/claude-3-opus","average_rank":1.0,"rankings_count":1},{"model":"openai/gpt-4o","average_rank":2.0,"rankings_count":1}]}}"#,
        ),
        sse_frame(r#"{"type":"stage3_start"}"#),
        sse_frame(
            r#"{"type":"stage3_complete","data":{"model":"google/gemini-pro","response":"The capital of France is Paris."}}"#,
        ),
        sse_frame(r#"{"type":"title_complete","data":{"title":"Capital of France"}}"#),
        sse_frame(r#"{"type":"complete"}"#),
    ]
    .join("");
}

/// Full conversation payload as returned by `GET /api/conversations/{id}`.
pub fn conversation_fixture(id: &str) -> String {
    return format!(
        r#"{{"id":"{id}","created_at":"2024-05-01T10:30:00.000000","title":"Capital of France","messages":[{{"role":"user","content":"What is the capital of France?"}},{{"role":"assistant","stage1":[{{"model":"openai/gpt-4o","response":"Paris."}}],"stage2":[],"stage3":{{"model":"google/gemini-pro","response":"Paris."}}}}]}}"#
    );
}
