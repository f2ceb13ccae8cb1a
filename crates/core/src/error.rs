//! Error types for the Ensemble domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MemoryError {
    /// The backing store could not be reached or written.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The caller passed an argument the store cannot honor (e.g. `limit == 0`).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Memory not found: {0}")]
    NotFound(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Fact extraction failed: {0}")]
    ExtractionFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Failure of a single `Agent::produce` invocation.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("model call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("tool failed: {0}")]
    Tool(#[from] ToolError),

    #[error("memory failed: {0}")]
    Memory(#[from] MemoryError),

    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("agent timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("{0}")]
    Failed(String),
}

/// Failure of a router to produce a decision.
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    /// The router's output could not be interpreted as a decision.
    #[error("malformed routing decision: {raw:?}")]
    Malformed { raw: String },

    /// The routing model call itself failed.
    #[error("routing model call failed: {0}")]
    Provider(#[from] ProviderError),
}
