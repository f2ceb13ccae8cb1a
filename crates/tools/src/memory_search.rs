//! Lets an agent query long-term memory on demand, beyond the facts
//! recalled into its prompt at the start of a turn.

use async_trait::async_trait;
use ensemble_core::error::ToolError;
use ensemble_core::tool::{Tool, ToolResult};
use ensemble_memory::LongTermMemory;
use std::sync::Arc;
use tracing::warn;

const DEFAULT_LIMIT: usize = 5;
const MAX_LIMIT: u64 = 50;

/// Similarity search over a [`LongTermMemory`].
pub struct MemorySearch {
    memory: Arc<LongTermMemory>,
}

impl MemorySearch {
    pub fn new(memory: Arc<LongTermMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for MemorySearch {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search long-term memory for stored facts related to a query. \
         Use this to recall something learned in an earlier run."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of facts to return (default 5)",
                    "default": DEFAULT_LIMIT
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments
            .get("query")
            .and_then(|q| q.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("'query' is required".into()))?;
        let limit = arguments
            .get("limit")
            .and_then(|l| l.as_u64())
            .map(|l| l.clamp(1, MAX_LIMIT) as usize)
            .unwrap_or(DEFAULT_LIMIT);

        let records = match self.memory.retrieve(query, limit).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Memory search failed");
                return Ok(ToolResult {
                    success: false,
                    output: format!("Memory search failed: {e}"),
                });
            }
        };

        if records.is_empty() {
            return Ok(ToolResult::ok(format!("No memories found matching '{query}'.")));
        }

        let listing: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "text": r.text,
                    "score": r.score,
                    "created_at": r.created_at.to_rfc3339(),
                })
            })
            .collect();
        let output = serde_json::to_string_pretty(&listing).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "memory_search".into(),
            reason: e.to_string(),
        })?;
        Ok(ToolResult::ok(output))
    }
}
