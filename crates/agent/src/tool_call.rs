//! Recognizing tool calls in model replies.
//!
//! Models are asked to answer with `{"tool": "<name>", "args": {...}}` when
//! they want a tool. In practice the object arrives bare, inside a fenced
//! code block, or buried in prose, so [`parse_tool_call`] tries each in turn.

use ensemble_core::tool::ToolCall;
use serde_json::Value;

/// Extract a tool call from a model reply, if it contains one.
pub fn parse_tool_call(reply: &str) -> Option<ToolCall> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(call) = from_json(trimmed, false) {
        return Some(call);
    }

    if let Some(call) = fenced_blocks(trimmed).find_map(|block| from_json(block, false)) {
        return Some(call);
    }

    // Prose: only objects naming both keys count, so stray braces in an
    // ordinary answer are not mistaken for a call.
    json_objects(trimmed).find_map(|candidate| from_json(candidate, true))
}

fn from_json(text: &str, require_args: bool) -> Option<ToolCall> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    let object = value.as_object()?;
    let name = object.get("tool")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let arguments = match object.get("args") {
        Some(args) if args.is_object() => args.clone(),
        Some(Value::Null) | None if !require_args => Value::Object(Default::default()),
        _ => return None,
    };
    Some(ToolCall {
        name: name.to_string(),
        arguments,
    })
}

/// Contents of every ``` fenced block, language tag stripped.
fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    text.split("```").skip(1).step_by(2).map(|block| {
        let body = block.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
        body.trim()
    })
}

/// Balanced `{...}` spans, outermost first, in order of appearance.
fn json_objects(text: &str) -> impl Iterator<Item = &str> {
    let bytes = text.as_bytes();
    let mut start = 0;
    std::iter::from_fn(move || {
        while start < bytes.len() {
            let open = start + text[start..].find('{')?;
            match matching_brace(&text[open..]) {
                Some(len) => {
                    start = open + len;
                    return Some(&text[open..open + len]);
                }
                None => start = open + 1,
            }
        }
        None
    })
}

/// Length of the object starting at `text[0] == '{'`, honoring JSON strings.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
