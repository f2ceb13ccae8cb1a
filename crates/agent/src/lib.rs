//! Agents that take turns inside an Ensemble pool.
//!
//! - [`LlmAgent`]: persona + model + tools + optional long-term memory. Runs a
//!   bounded call-model / run-tool loop per turn.
//! - [`FnAgent`]: a closure over the input and shared state, for
//!   deterministic pipeline steps.

pub mod fn_agent;
pub mod llm_agent;
pub mod prompt;
pub mod tool_call;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use fn_agent::FnAgent;
pub use llm_agent::LlmAgent;
pub use tool_call::parse_tool_call;
