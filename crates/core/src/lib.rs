//! # Ensemble Core
//!
//! Domain types, traits, and error definitions for the Ensemble multi-agent
//! runtime. This crate has **no framework dependencies**; it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here: [`Agent`], [`Router`],
//! [`Provider`], [`Tool`], [`VectorStore`] and [`EmbeddingProvider`].
//! Implementations live in their respective crates, and tests swap in
//! scripted stand-ins.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod embedding;
pub mod memory;
pub mod state;
pub mod agent;
pub mod router;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{AgentError, MemoryError, ProviderError, RouterError, ToolError};
pub use message::{Message, Role};
pub use provider::{EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
pub use embedding::{EmbeddingMethod, EmbeddingProvider};
pub use memory::{MemoryRecord, Payload, VectorHit, VectorRecord, VectorStore};
pub use state::{SharedState, StateHandle, Turn, TurnRef};
pub use agent::{Agent, Outcome, Signal};
pub use router::{AgentInfo, Router, RouterContext, RouterDecision};
pub use event::{DomainEvent, EventBus};
