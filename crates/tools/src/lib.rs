//! Built-in tools an agent can be given by name.
//!
//! A pool definition lists tool names per agent; [`builtin_registry`]
//! turns that list into the agent's own [`ToolRegistry`].

pub mod calculator;
pub mod memory_search;

use ensemble_core::error::ToolError;
use ensemble_core::tool::ToolRegistry;
use ensemble_memory::LongTermMemory;
use std::sync::Arc;

pub use calculator::Calculator;
pub use memory_search::MemorySearch;

/// Names accepted by [`builtin_registry`].
pub const BUILTIN_TOOLS: &[&str] = &["calculator", "memory_search"];

/// Build a registry holding the named built-in tools.
///
/// Unknown names are `NotFound`. `memory_search` needs `memory`.
pub fn builtin_registry<S: AsRef<str>>(
    names: &[S],
    memory: Option<Arc<LongTermMemory>>,
) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    for name in names {
        match name.as_ref() {
            "calculator" => registry.register(Box::new(Calculator)),
            "memory_search" => {
                let memory = memory.clone().ok_or_else(|| ToolError::ExecutionFailed {
                    tool_name: "memory_search".into(),
                    reason: "no long-term memory is attached".into(),
                })?;
                registry.register(Box::new(MemorySearch::new(memory)));
            }
            other => return Err(ToolError::NotFound(other.to_string())),
        }
    }
    Ok(registry)
}
