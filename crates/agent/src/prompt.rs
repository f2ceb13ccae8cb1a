//! Prompt assembly for model-backed agents.

use ensemble_core::memory::MemoryRecord;
use ensemble_core::message::Message;
use ensemble_core::tool::ToolRegistry;
use ensemble_memory::LongTermMemory;

const TOOL_FORMAT: &str = "To use a tool, reply with only a JSON object of the form \
{\"tool\": \"<tool name>\", \"args\": {<arguments>}} and nothing else. \
When a tool result comes back, either call another tool the same way or give your \
final answer in natural language, including the actual results.";

const NO_TOOLS: &str = "You do not have access to any tools. \
Respond directly in natural language only. Do not output JSON.";

/// Everything that goes into the opening prompt of a turn.
pub struct PromptParts<'a> {
    pub persona: &'a str,
    pub tools: &'a ToolRegistry,
    pub memories: &'a [MemoryRecord],
    pub transcript: &'a str,
    pub input: &'a str,
}

/// Build the opening messages: one system message, then the input.
pub fn build_messages(parts: &PromptParts<'_>) -> Vec<Message> {
    let mut system = parts.persona.trim().to_string();

    system.push_str("\n\n");
    if parts.tools.is_empty() {
        system.push_str(NO_TOOLS);
    } else {
        system.push_str("Available tools:\n");
        system.push_str(&parts.tools.describe());
        system.push_str("\n\n");
        system.push_str(TOOL_FORMAT);
    }

    if !parts.memories.is_empty() {
        system.push_str("\n\n");
        system.push_str(LongTermMemory::format_for_context(parts.memories).trim_end());
    }

    if !parts.transcript.trim().is_empty() {
        system.push_str("\n\nConversation so far:\n");
        system.push_str(parts.transcript);
    }

    vec![Message::system(system), Message::user(parts.input)]
}

/// The message that feeds a tool's result back to the model.
pub fn tool_result_message(tool: &str, output: &str, success: bool) -> Message {
    if success {
        Message::tool(format!("Tool '{tool}' returned:\n{output}"))
    } else {
        Message::tool(format!("Tool '{tool}' reported an error:\n{output}"))
    }
}
