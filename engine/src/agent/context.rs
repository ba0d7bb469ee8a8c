//! Context Window Manager
//!
//! Keeps the outgoing conversation within budget before every provider call:
//!
//! 1. reasoning text is dropped from assistant messages (signatures stay)
//! 2. tool results are compressed
//! 3. history is condensed once the estimated token count passes a threshold
//!
//! All lengths are counted in characters, never bytes. Every transform is
//! idempotent on its own output.

use crate::llm::{ContentBlock, ConversationMessage, MessageContent, Role};
use serde_json::Value;
use tracing::info;

pub const MAX_TOOL_RESULT_CHARS: usize = 2000;
pub const MAX_SEQUENCE_PREVIEW_CHARS: usize = 20;
pub const TOKEN_THRESHOLD: usize = 80_000;
pub const TRUNCATION_MARKER: &str = "\n...[truncated to 2000 chars]";

const TRUNCATION_HEADROOM: usize = 60;
const CHARS_PER_TOKEN: usize = 4;
const HEAD_MESSAGES: usize = 2;
const TAIL_MESSAGES: usize = 8;
const CONDENSE_CHARS: usize = 200;
const CONDENSE_MARKER: &str = "...";
const CONDENSE_RESULT_MARKER: &str = "...[condensed]";
const SEQUENCE_PREVIEW_KEY: &str = "sequence_preview";

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Run the full pipeline on a copy of the log
pub fn prepare(messages: &[ConversationMessage]) -> Vec<ConversationMessage> {
    let pruned = prune_reasoning(messages);
    let compressed = compress_history_results(pruned);
    maybe_summarize(compressed)
}

/// Blank the text of reasoning blocks in assistant messages
pub fn prune_reasoning(messages: &[ConversationMessage]) -> Vec<ConversationMessage> {
    messages
        .iter()
        .map(|msg| match (&msg.role, &msg.content) {
            (Role::Assistant, MessageContent::Blocks(blocks)) => ConversationMessage::blocks(
                Role::Assistant,
                blocks
                    .iter()
                    .map(|block| match block {
                        ContentBlock::InternalReasoning {
                            opaque_signature, ..
                        } => ContentBlock::InternalReasoning {
                            text: String::new(),
                            opaque_signature: opaque_signature.clone(),
                        },
                        other => other.clone(),
                    })
                    .collect(),
            ),
            _ => msg.clone(),
        })
        .collect()
}

fn compress_history_results(messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
    messages
        .into_iter()
        .map(|mut msg| {
            if let MessageContent::Blocks(blocks) = &mut msg.content {
                for block in blocks.iter_mut() {
                    if let ContentBlock::ToolResult { content, .. } = block {
                        *content = compress_tool_result(content);
                    }
                }
            }
            msg
        })
        .collect()
}

/// Compress a serialized tool result
///
/// Error payloads pass through untouched. Otherwise `sequence_preview`
/// fields are shortened first, and only then is the whole string cut.
pub fn compress_tool_result(result: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(result).ok();

    let trimmed = match parsed {
        Some(Value::Object(map)) if map.contains_key("error") => return result.to_string(),
        Some(mut value @ Value::Object(_)) => {
            if trim_sequence_previews(&mut value) {
                value.to_string()
            } else {
                result.to_string()
            }
        }
        _ => result.to_string(),
    };

    if char_len(&trimmed) > MAX_TOOL_RESULT_CHARS {
        let mut cut = take_chars(&trimmed, MAX_TOOL_RESULT_CHARS - TRUNCATION_HEADROOM);
        cut.push_str(TRUNCATION_MARKER);
        cut
    } else {
        trimmed
    }
}

/// Shorten every `sequence_preview` string; returns true if anything changed
fn trim_sequence_previews(value: &mut Value) -> bool {
    match value {
        Value::Object(map) => {
            let mut changed = false;
            for (key, child) in map.iter_mut() {
                match child {
                    Value::String(s)
                        if key == SEQUENCE_PREVIEW_KEY
                            && char_len(s) > MAX_SEQUENCE_PREVIEW_CHARS =>
                    {
                        let short = format!("{}...", take_chars(s, MAX_SEQUENCE_PREVIEW_CHARS));
                        if short != *s {
                            *s = short;
                            changed = true;
                        }
                    }
                    Value::Object(_) | Value::Array(_) => {
                        changed |= trim_sequence_previews(child);
                    }
                    _ => {}
                }
            }
            changed
        }
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |changed, item| trim_sequence_previews(item) || changed),
        _ => false,
    }
}

/// Rough token estimate: characters of all content divided by four
pub fn estimate_tokens(messages: &[ConversationMessage]) -> usize {
    let chars: usize = messages
        .iter()
        .map(|msg| match &msg.content {
            MessageContent::Text(text) => char_len(text),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .map(|block| match block {
                    ContentBlock::Text { text } => char_len(text),
                    ContentBlock::ToolResult { content, .. } => char_len(content),
                    ContentBlock::ToolCall { input, .. } => char_len(&input.to_string()),
                    ContentBlock::InternalReasoning { text, .. } => char_len(text),
                })
                .sum(),
        })
        .sum();
    chars / CHARS_PER_TOKEN
}

/// Condense the middle of the log when it is over budget
///
/// The first two and last eight messages are never touched. Logs of ten
/// messages or fewer are returned as-is.
pub fn maybe_summarize(messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
    if messages.len() <= HEAD_MESSAGES + TAIL_MESSAGES {
        return messages;
    }
    let estimated = estimate_tokens(&messages);
    if estimated <= TOKEN_THRESHOLD {
        return messages;
    }

    info!("Context ~{} tokens; condensing history", estimated);
    let tail_start = messages.len() - TAIL_MESSAGES;
    messages
        .into_iter()
        .enumerate()
        .map(|(i, msg)| {
            if i < HEAD_MESSAGES || i >= tail_start {
                msg
            } else {
                condense_message(msg)
            }
        })
        .collect()
}

fn condense_text(text: &str, marker: &str) -> Option<String> {
    (char_len(text) > CONDENSE_CHARS).then(|| format!("{}{}", take_chars(text, CONDENSE_CHARS), marker))
}

fn condense_message(msg: ConversationMessage) -> ConversationMessage {
    let content = match msg.content {
        MessageContent::Text(text) => match condense_text(&text, CONDENSE_MARKER) {
            Some(short) => MessageContent::Text(short),
            None => MessageContent::Text(text),
        },
        MessageContent::Blocks(blocks) => MessageContent::Blocks(
            blocks
                .into_iter()
                .map(|block| match block {
                    ContentBlock::Text { text } => ContentBlock::Text {
                        text: condense_text(&text, CONDENSE_MARKER).unwrap_or(text),
                    },
                    ContentBlock::InternalReasoning {
                        opaque_signature, ..
                    } => ContentBlock::InternalReasoning {
                        text: String::new(),
                        opaque_signature,
                    },
                    ContentBlock::ToolResult {
                        tool_call_id,
                        content,
                    } => ContentBlock::ToolResult {
                        content: condense_text(&content, CONDENSE_RESULT_MARKER).unwrap_or(content),
                        tool_call_id,
                    },
                    call @ ContentBlock::ToolCall { .. } => call,
                })
                .collect(),
        ),
    };
    ConversationMessage {
        role: msg.role,
        content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reasoning(text: &str, sig: &str) -> ContentBlock {
        ContentBlock::InternalReasoning {
            text: text.to_string(),
            opaque_signature: sig.to_string(),
        }
    }

    #[test]
    fn test_prune_keeps_signature() {
        let log = vec![
            ConversationMessage::user("hi"),
            ConversationMessage::blocks(
                Role::Assistant,
                vec![reasoning("long thoughts", "sig-1"), ContentBlock::text("answer")],
            ),
        ];
        let pruned = prune_reasoning(&log);

        assert_eq!(pruned[0], log[0]);
        assert_eq!(
            pruned[1].content,
            MessageContent::Blocks(vec![reasoning("", "sig-1"), ContentBlock::text("answer")])
        );
    }

    #[test]
    fn test_compress_error_passthrough() {
        let big = format!("{{\"error\": \"{}\"}}", "x".repeat(5000));
        assert_eq!(compress_tool_result(&big), big);
    }

    #[test]
    fn test_compress_trims_nested_sequence_previews() {
        let result = json!({
            "details": {
                "chains": [
                    {"chain_id": "A", "sequence_preview": "M".repeat(50)},
                    {"chain_id": "B", "sequence_preview": "SHORT"}
                ]
            }
        })
        .to_string();

        let out: Value = serde_json::from_str(&compress_tool_result(&result)).unwrap();
        assert_eq!(
            out["details"]["chains"][0]["sequence_preview"],
            format!("{}...", "M".repeat(20))
        );
        assert_eq!(out["details"]["chains"][1]["sequence_preview"], "SHORT");
    }

    #[test]
    fn test_compress_untouched_json_keeps_original_text() {
        let result = "{\"b\": 1,  \"a\": 2}";
        assert_eq!(compress_tool_result(result), result);
    }

    #[test]
    fn test_compress_hard_truncation() {
        let result = "y".repeat(3000);
        let out = compress_tool_result(&result);
        assert!(out.chars().count() <= MAX_TOOL_RESULT_CHARS);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert!(out.starts_with(&"y".repeat(1940)));
    }

    #[test]
    fn test_compress_counts_chars_not_bytes() {
        let result = "é".repeat(1500);
        assert_eq!(compress_tool_result(&result), result);
    }

    #[test]
    fn test_estimate_tokens() {
        let log = vec![
            ConversationMessage::user("a".repeat(40)),
            ConversationMessage::blocks(
                Role::Assistant,
                vec![
                    ContentBlock::text("b".repeat(20)),
                    reasoning(&"c".repeat(20), "sig"),
                ],
            ),
        ];
        assert_eq!(estimate_tokens(&log), 20);
    }

    fn big_log(len: usize) -> Vec<ConversationMessage> {
        (0..len)
            .map(|i| {
                let body = "z".repeat(40_000);
                if i % 2 == 0 {
                    ConversationMessage::user(body)
                } else {
                    ConversationMessage::blocks(
                        Role::Assistant,
                        vec![ContentBlock::text(body), reasoning("r", "s")],
                    )
                }
            })
            .collect()
    }

    #[test]
    fn test_summarize_noop_for_short_logs() {
        let log = big_log(10);
        assert!(estimate_tokens(&log) > TOKEN_THRESHOLD);
        assert_eq!(maybe_summarize(log.clone()), log);
    }

    #[test]
    fn test_summarize_noop_under_threshold() {
        let log: Vec<_> = (0..30).map(|i| ConversationMessage::user(format!("m{}", i))).collect();
        assert_eq!(maybe_summarize(log.clone()), log);
    }

    #[test]
    fn test_summarize_condenses_middle_only() {
        let log = big_log(14);
        let out = maybe_summarize(log.clone());

        assert_eq!(out.len(), 14);
        assert_eq!(&out[..2], &log[..2]);
        assert_eq!(&out[6..], &log[6..]);

        let expected = format!("{}...", "z".repeat(200));
        assert_eq!(out[2].content, MessageContent::Text(expected.clone()));
        assert_eq!(
            out[3].content,
            MessageContent::Blocks(vec![ContentBlock::text(expected), reasoning("", "s")])
        );
    }

    #[test]
    fn test_condensed_tool_results_use_distinct_marker() {
        let msg = ConversationMessage::blocks(
            Role::User,
            vec![ContentBlock::tool_result("t1", "q".repeat(500))],
        );
        let condensed = condense_message(msg);
        assert_eq!(
            condensed.content,
            MessageContent::Blocks(vec![ContentBlock::tool_result(
                "t1",
                format!("{}...[condensed]", "q".repeat(200))
            )])
        );
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let mut log = big_log(14);
        log.push(ConversationMessage::blocks(
            Role::User,
            vec![ContentBlock::tool_result("t", "w".repeat(4000))],
        ));
        let once = prepare(&log);
        let twice = prepare(&once);
        assert_eq!(once, twice);
    }
}
