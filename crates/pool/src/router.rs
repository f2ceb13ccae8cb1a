//! Deterministic routers.

use async_trait::async_trait;
use ensemble_core::error::RouterError;
use ensemble_core::router::{Router, RouterContext, RouterDecision};

/// Visits each agent once, in order, then stops.
///
/// Without an explicit order the pool's registration order is used.
#[derive(Debug, Clone, Default)]
pub struct RoundRobinRouter {
    order: Option<Vec<String>>,
}

impl RoundRobinRouter {
    /// Round-robin over the pool's agents in registration order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Round-robin over an explicit list of agent ids.
    pub fn with_order<I, S>(order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            order: Some(order.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl Router for RoundRobinRouter {
    fn name(&self) -> &str {
        "round_robin"
    }

    async fn decide(&self, ctx: &RouterContext<'_>) -> Result<RouterDecision, RouterError> {
        let next = match &self.order {
            Some(order) => order.get(ctx.call_count).cloned(),
            None => ctx.agents.get(ctx.call_count).map(|a| a.id.clone()),
        };
        Ok(next.map_or(RouterDecision::Stop, RouterDecision::Next))
    }
}

type Decider = dyn Fn(&RouterContext<'_>) -> RouterDecision + Send + Sync;

/// Routes with a caller-supplied function of the context.
pub struct FnRouter {
    name: String,
    decide: Box<Decider>,
}

impl FnRouter {
    pub fn new<F>(decide: F) -> Self
    where
        F: Fn(&RouterContext<'_>) -> RouterDecision + Send + Sync + 'static,
    {
        Self {
            name: "function".into(),
            decide: Box::new(decide),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Router for FnRouter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(&self, ctx: &RouterContext<'_>) -> Result<RouterDecision, RouterError> {
        Ok((self.decide)(ctx))
    }
}
