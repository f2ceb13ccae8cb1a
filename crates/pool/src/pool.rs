//! The pool scheduler.
//!
//! A run alternates two steps until something stops it:
//!
//! 1. **Route**: ask the router which agent acts next (or whether to stop)
//! 2. **Invoke**: run that agent on the current input, append its turn
//!
//! The pool enforces its own iteration bound, so a router that never says
//! stop still terminates. Cancellation and the run deadline are checked
//! before each iteration and raced against whatever is in flight.

use chrono::Utc;
use ensemble_core::agent::{Agent, Outcome};
use ensemble_core::error::{AgentError, RouterError};
use ensemble_core::event::{DomainEvent, EventBus};
use ensemble_core::router::{AgentInfo, Router, RouterContext, RouterDecision};
use ensemble_core::state::{SharedState, Turn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::result::{FatalError, PoolError, RunResult, Termination};
use crate::router::RoundRobinRouter;

/// Variable an agent sets to choose the next agent's input.
///
/// The pool removes it after every turn.
pub const NEXT_INPUT_VAR: &str = "next_input";

/// Default bound on agent invocations per run.
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// What the pool does when an agent invocation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The first failure ends the run.
    #[default]
    FailFast,
    /// Re-invoke the same agent up to `attempts` more times first.
    Retry { attempts: u32 },
}

/// A set of agents plus the router that sequences them.
///
/// Runs take `&self` and own their state, so one pool can serve
/// concurrent runs.
pub struct Pool {
    agents: Vec<Arc<dyn Agent>>,
    by_id: HashMap<String, usize>,
    infos: Vec<AgentInfo>,
    router: Arc<dyn Router>,
    max_iterations: usize,
    run_timeout: Option<Duration>,
    agent_timeout: Option<Duration>,
    failure_policy: FailurePolicy,
    event_bus: Option<Arc<EventBus>>,
}

enum Interrupt {
    Cancelled,
    DeadlineExceeded,
}

impl From<Interrupt> for Termination {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Cancelled => Termination::Cancelled,
            Interrupt::DeadlineExceeded => Termination::DeadlineExceeded,
        }
    }
}

impl Pool {
    pub fn builder() -> PoolBuilder {
        PoolBuilder::default()
    }

    /// Registered agent ids, in registration order.
    pub fn agent_ids(&self) -> impl Iterator<Item = &str> {
        self.infos.iter().map(|a| a.id.as_str())
    }

    pub fn router_name(&self) -> &str {
        self.router.name()
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    fn agent(&self, id: &str) -> Option<&dyn Agent> {
        self.by_id.get(id).map(|&i| self.agents[i].as_ref())
    }

    /// Run from an empty state.
    pub async fn run(&self, input: &str) -> RunResult {
        self.run_with(input, SharedState::new(), CancellationToken::new()).await
    }

    /// Run on top of a caller-supplied state, e.g. one restored from disk.
    pub async fn run_with_state(&self, input: &str, state: SharedState) -> RunResult {
        self.run_with(input, state, CancellationToken::new()).await
    }

    /// Run from an empty state until done or `cancel` fires.
    pub async fn run_with_cancel(&self, input: &str, cancel: CancellationToken) -> RunResult {
        self.run_with(input, SharedState::new(), cancel).await
    }

    pub async fn run_with(&self, input: &str, mut state: SharedState, cancel: CancellationToken) -> RunResult {
        let deadline = self.run_timeout.map(|t| Instant::now() + t);
        let run_id = state.id().to_string();
        let mut call_count = 0usize;
        let mut last_outcome: Option<Outcome> = None;
        let mut annotations = Vec::new();
        let mut current_input = input.to_string();

        info!(
            run_id = %run_id,
            agents = self.agents.len(),
            router = %self.router.name(),
            max_iterations = self.max_iterations,
            "Run starting"
        );
        self.publish(DomainEvent::RunStarted {
            run_id: run_id.clone(),
            input_preview: preview(input),
            timestamp: Utc::now(),
        });

        let termination = loop {
            if cancel.is_cancelled() {
                break Termination::Cancelled;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break Termination::DeadlineExceeded;
            }

            let ctx = RouterContext {
                input,
                state: &state,
                call_count,
                last_outcome: last_outcome.as_ref(),
                agents: &self.infos,
            };
            let decision = match guarded(self.router.decide(&ctx), &cancel, deadline).await {
                Ok(decision) => decision,
                Err(interrupt) => break interrupt.into(),
            };

            let agent_id = match decision {
                Ok(RouterDecision::Next(agent_id)) => agent_id,
                Ok(RouterDecision::Stop) => break Termination::RouterStop,
                Err(RouterError::Malformed { raw }) => {
                    warn!(run_id = %run_id, router = %self.router.name(), raw = %raw, "Malformed routing decision, stopping");
                    annotations.push(format!(
                        "router {} returned a malformed decision {raw:?}; run stopped",
                        self.router.name()
                    ));
                    break Termination::RouterStop;
                }
                Err(source) => {
                    warn!(run_id = %run_id, router = %self.router.name(), error = %source, "Router failed");
                    break Termination::Fatal(FatalError::RouterFailure {
                        router: self.router.name().to_string(),
                        source,
                    });
                }
            };

            if call_count >= self.max_iterations {
                debug!(run_id = %run_id, call_count, "Iteration bound reached");
                break Termination::IterationBoundReached;
            }

            let Some(agent) = self.agent(&agent_id) else {
                warn!(run_id = %run_id, agent = %agent_id, "Router named an unknown agent");
                break Termination::Fatal(FatalError::UnknownAgent { agent_id });
            };

            debug!(run_id = %run_id, agent = %agent_id, call_count, "Invoking agent");
            self.publish(DomainEvent::AgentInvoked {
                run_id: run_id.clone(),
                agent_id: agent_id.clone(),
                call_index: call_count,
                timestamp: Utc::now(),
            });

            let started = Instant::now();
            let produced = guarded(
                self.invoke(agent, &current_input, &mut state, &mut annotations),
                &cancel,
                deadline,
            )
            .await;
            let outcome = match produced {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(source)) => {
                    warn!(run_id = %run_id, agent = %agent_id, error = %source, "Agent failed");
                    self.publish(DomainEvent::ErrorOccurred {
                        context: format!("agent.{agent_id}"),
                        error_message: source.to_string(),
                        timestamp: Utc::now(),
                    });
                    break Termination::Fatal(FatalError::AgentExecutionFailure { agent_id, source });
                }
                Err(interrupt) => break interrupt.into(),
            };

            let next_input = match state.remove_variable(NEXT_INPUT_VAR) {
                Some(serde_json::Value::String(next)) => Some(next),
                Some(other) => {
                    warn!(agent = %agent_id, value = %other, "Ignoring non-string {NEXT_INPUT_VAR}");
                    annotations.push(format!("agent {agent_id} set {NEXT_INPUT_VAR} to a non-string value; ignored"));
                    None
                }
                None => None,
            };

            let turn = state
                .append(Turn::from_outcome(agent_id.as_str(), current_input.as_str(), outcome.clone()))
                .clone();
            call_count += 1;
            let duration_ms = started.elapsed().as_millis() as u64;
            debug!(run_id = %run_id, agent = %agent_id, index = turn.index, duration_ms, "Turn appended");
            self.publish(DomainEvent::TurnAppended {
                run_id: run_id.clone(),
                agent_id: agent_id.clone(),
                index: turn.index,
                duration_ms,
                timestamp: Utc::now(),
            });

            if let Err(interrupt) = guarded(agent.after_turn(&turn, &run_id), &cancel, deadline).await {
                break interrupt.into();
            }

            current_input = next_input.unwrap_or_else(|| outcome.output.clone());
            last_outcome = Some(outcome);
        };

        let final_output = state.last_turn().map(|t| t.output.clone());
        info!(run_id = %run_id, call_count, termination = %termination, "Run finished");
        self.publish(DomainEvent::RunFinished {
            run_id,
            termination: termination.to_string(),
            call_count,
            timestamp: Utc::now(),
        });

        RunResult {
            state,
            termination,
            final_output,
            annotations,
            call_count,
        }
    }

    /// Invoke an agent, retrying per the failure policy.
    async fn invoke(
        &self,
        agent: &dyn Agent,
        input: &str,
        state: &mut SharedState,
        annotations: &mut Vec<String>,
    ) -> Result<Outcome, AgentError> {
        let retries = match self.failure_policy {
            FailurePolicy::FailFast => 0,
            FailurePolicy::Retry { attempts } => attempts,
        };

        let mut attempt = 0;
        loop {
            // A failed attempt's variable writes are rolled back.
            let snapshot = state.variables().clone();
            match self.invoke_once(agent, input, state).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempt < retries => {
                    state.replace_variables(snapshot);
                    attempt += 1;
                    warn!(agent = %agent.id(), attempt, error = %e, "Agent failed, retrying");
                    annotations.push(format!("agent {} failed on attempt {attempt}: {e}; retried", agent.id()));
                }
                Err(e) => {
                    state.replace_variables(snapshot);
                    return Err(e);
                }
            }
        }
    }

    async fn invoke_once(&self, agent: &dyn Agent, input: &str, state: &mut SharedState) -> Result<Outcome, AgentError> {
        let mut handle = state.handle();
        match self.agent_timeout {
            Some(limit) => tokio::time::timeout(limit, agent.produce(input, &mut handle))
                .await
                .unwrap_or_else(|_| {
                    Err(AgentError::Timeout {
                        timeout_ms: limit.as_millis() as u64,
                    })
                }),
            None => agent.produce(input, &mut handle).await,
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

/// Race `fut` against cancellation and the deadline.
async fn guarded<F: Future>(
    fut: F,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
) -> Result<F::Output, Interrupt> {
    let expiry = async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        _ = expiry => Err(Interrupt::DeadlineExceeded),
        output = fut => Ok(output),
    }
}

fn preview(input: &str) -> String {
    const MAX: usize = 80;
    match input.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}...", &input[..end]),
        None => input.to_string(),
    }
}

/// Builds a [`Pool`].
pub struct PoolBuilder {
    agents: Vec<Arc<dyn Agent>>,
    router: Option<Arc<dyn Router>>,
    max_iterations: usize,
    run_timeout: Option<Duration>,
    agent_timeout: Option<Duration>,
    failure_policy: FailurePolicy,
    event_bus: Option<Arc<EventBus>>,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            router: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            run_timeout: None,
            agent_timeout: None,
            failure_policy: FailurePolicy::default(),
            event_bus: None,
        }
    }
}

impl PoolBuilder {
    pub fn agent(self, agent: impl Agent + 'static) -> Self {
        self.shared_agent(Arc::new(agent))
    }

    pub fn shared_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Defaults to round-robin over registration order.
    pub fn router(self, router: impl Router + 'static) -> Self {
        self.shared_router(Arc::new(router))
    }

    pub fn shared_router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    pub fn agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = Some(timeout);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<Pool, PoolError> {
        if self.agents.is_empty() {
            return Err(PoolError::NoAgents);
        }
        if self.max_iterations == 0 {
            return Err(PoolError::ZeroIterations);
        }

        let mut by_id = HashMap::with_capacity(self.agents.len());
        let mut infos = Vec::with_capacity(self.agents.len());
        for (i, agent) in self.agents.iter().enumerate() {
            let id = agent.id().to_string();
            if by_id.insert(id.clone(), i).is_some() {
                return Err(PoolError::DuplicateAgent(id));
            }
            infos.push(AgentInfo::new(id, agent.description()));
        }

        Ok(Pool {
            agents: self.agents,
            by_id,
            infos,
            router: self.router.unwrap_or_else(|| Arc::new(RoundRobinRouter::new())),
            max_iterations: self.max_iterations,
            run_timeout: self.run_timeout,
            agent_timeout: self.agent_timeout,
            failure_policy: self.failure_policy,
            event_bus: self.event_bus,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::FnRouter;
    use crate::routing_agent::RoutingAgent;
    use crate::test_helpers::{RecordingAgent, ScriptedProvider, SleepyAgent};
    use ensemble_agent::FnAgent;
    use ensemble_core::error::ProviderError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo(id: &str) -> FnAgent {
        FnAgent::from_text(id, |input| input.to_string())
    }

    fn exclaim(id: &str) -> FnAgent {
        FnAgent::from_text(id, |input| format!("{input}!"))
    }

    fn turn_tuples(result: &RunResult) -> Vec<(&str, &str, &str)> {
        result
            .turns()
            .iter()
            .map(|t| (t.agent_id.as_str(), t.input.as_str(), t.output.as_str()))
            .collect()
    }

    #[tokio::test]
    async fn round_robin_echo_then_exclaim() {
        let pool = Pool::builder().agent(echo("A")).agent(exclaim("B")).build().unwrap();
        let result = pool.run("hello").await;

        assert!(matches!(result.termination, Termination::RouterStop));
        assert_eq!(turn_tuples(&result), vec![("A", "hello", "hello"), ("B", "hello", "hello!")]);
        assert_eq!(result.final_output.as_deref(), Some("hello!"));
        assert_eq!(result.call_count, 2);
        assert!(result.annotations.is_empty());
        assert_eq!(result.turns()[1].index, 1);
    }

    #[tokio::test]
    async fn iteration_bound_below_agent_count() {
        let pool = Pool::builder()
            .agent(echo("A"))
            .agent(exclaim("B"))
            .max_iterations(1)
            .build()
            .unwrap();
        let result = pool.run("hello").await;

        assert!(matches!(result.termination, Termination::IterationBoundReached));
        assert_eq!(result.turns().len(), 1);
        assert_eq!(result.final_output.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn bound_equal_to_agent_count_is_a_router_stop() {
        let pool = Pool::builder()
            .agent(echo("A"))
            .agent(exclaim("B"))
            .max_iterations(2)
            .build()
            .unwrap();
        let result = pool.run("hello").await;
        assert!(matches!(result.termination, Termination::RouterStop));
        assert_eq!(result.turns().len(), 2);
    }

    #[tokio::test]
    async fn router_that_never_stops_is_bounded() {
        let pool = Pool::builder()
            .agent(exclaim("A"))
            .router(FnRouter::new(|_| RouterDecision::next("A")))
            .build()
            .unwrap();
        let result = pool.run("go").await;

        assert!(matches!(result.termination, Termination::IterationBoundReached));
        assert_eq!(result.turns().len(), DEFAULT_MAX_ITERATIONS);
        assert_eq!(result.final_output.as_deref(), Some("go!!!!!"));
    }

    #[tokio::test]
    async fn turns_grow_one_per_iteration_in_order() {
        let pool = Pool::builder()
            .agent(exclaim("A"))
            .agent(exclaim("B"))
            .router(FnRouter::new(|ctx| {
                assert_eq!(ctx.state.len(), ctx.call_count);
                if ctx.call_count % 2 == 0 {
                    RouterDecision::next("A")
                } else {
                    RouterDecision::next("B")
                }
            }))
            .max_iterations(4)
            .build()
            .unwrap();
        let result = pool.run("x").await;

        let ids: Vec<_> = result.turns().iter().map(|t| t.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "A", "B"]);
        let indices: Vec<_> = result.turns().iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(result.turns()[3].input, "x!!!");
    }

    #[tokio::test]
    async fn routing_agent_naming_unregistered_agent_is_fatal() {
        let provider = std::sync::Arc::new(ScriptedProvider::new(vec![Ok("A".into()), Ok("critic".into())]));
        let pool = Pool::builder()
            .agent(echo("A"))
            .agent(exclaim("B"))
            .router(RoutingAgent::new("router", provider, "mock-model"))
            .build()
            .unwrap();
        let result = pool.run("hello").await;

        match &result.termination {
            Termination::Fatal(FatalError::UnknownAgent { agent_id }) => assert_eq!(agent_id, "critic"),
            other => panic!("expected UnknownAgent, got {other:?}"),
        }
        assert_eq!(turn_tuples(&result), vec![("A", "hello", "hello")]);
    }

    #[tokio::test]
    async fn malformed_routing_reply_stops_with_annotation() {
        let provider = std::sync::Arc::new(ScriptedProvider::new(vec![Ok(
            "Maybe A, or perhaps B? Hard to say.".into(),
        )]));
        let pool = Pool::builder()
            .agent(echo("A"))
            .agent(exclaim("B"))
            .router(RoutingAgent::new("router", provider, "mock-model"))
            .build()
            .unwrap();
        let result = pool.run("hello").await;

        assert!(matches!(result.termination, Termination::RouterStop));
        assert!(result.turns().is_empty());
        assert_eq!(result.final_output, None);
        assert_eq!(result.annotations.len(), 1);
        assert!(result.annotations[0].contains("malformed"));
    }

    #[tokio::test]
    async fn routing_model_failure_is_fatal() {
        let provider = std::sync::Arc::new(ScriptedProvider::new(vec![Err(ProviderError::RateLimited {
            retry_after_secs: 5,
        })]));
        let pool = Pool::builder()
            .agent(echo("A"))
            .router(RoutingAgent::new("router", provider, "mock-model"))
            .build()
            .unwrap();
        let result = pool.run("hello").await;
        assert!(matches!(
            result.termination,
            Termination::Fatal(FatalError::RouterFailure { .. })
        ));
    }

    #[tokio::test]
    async fn agent_failure_is_fatal_and_keeps_prior_turns() {
        let pool = Pool::builder()
            .agent(echo("A"))
            .agent(FnAgent::new("B", |_, _| Err(AgentError::Failed("out of ink".into()))))
            .build()
            .unwrap();
        let result = pool.run("hello").await;

        match &result.termination {
            Termination::Fatal(FatalError::AgentExecutionFailure { agent_id, source }) => {
                assert_eq!(agent_id, "B");
                assert!(source.to_string().contains("out of ink"));
            }
            other => panic!("expected AgentExecutionFailure, got {other:?}"),
        }
        assert_eq!(result.turns().len(), 1);
        assert!(result.is_fatal());
    }

    #[tokio::test]
    async fn retry_policy_reinvokes_failed_agent() {
        let attempts = std::sync::Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let flaky = FnAgent::new("flaky", move |input, _| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AgentError::Failed("transient".into()))
            } else {
                Ok(Outcome::text(format!("{input} ok")))
            }
        });
        let pool = Pool::builder()
            .agent(flaky)
            .failure_policy(FailurePolicy::Retry { attempts: 2 })
            .build()
            .unwrap();
        let result = pool.run("try").await;

        assert!(matches!(result.termination, Termination::RouterStop));
        assert_eq!(result.final_output.as_deref(), Some("try ok"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(result.annotations.len(), 1);
        assert!(result.annotations[0].contains("attempt 1"));
    }

    #[tokio::test]
    async fn failed_attempt_variables_do_not_reach_the_retry() {
        let attempts = std::sync::Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let flaky = FnAgent::new("flaky", move |_, state| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                state.set_variable("partial", "half-written");
                return Err(AgentError::Failed("transient".into()));
            }
            let carried = state.get_variable("partial").is_some();
            Ok(Outcome::text(format!("carried={carried}")))
        });
        let pool = Pool::builder()
            .agent(flaky)
            .failure_policy(FailurePolicy::Retry { attempts: 1 })
            .build()
            .unwrap();
        let result = pool.run("go").await;

        assert_eq!(result.final_output.as_deref(), Some("carried=false"));
        assert!(result.state.get_variable("partial").is_none());
    }

    #[tokio::test]
    async fn retries_exhausted_is_fatal() {
        let pool = Pool::builder()
            .agent(FnAgent::new("broken", |_, _| Err(AgentError::Failed("nope".into()))))
            .failure_policy(FailurePolicy::Retry { attempts: 1 })
            .build()
            .unwrap();
        let result = pool.run("x").await;
        assert!(result.is_fatal());
        assert_eq!(result.annotations.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn agent_timeout_names_the_agent() {
        let pool = Pool::builder()
            .agent(SleepyAgent::new("slow", Duration::from_secs(10)))
            .agent_timeout(Duration::from_secs(1))
            .build()
            .unwrap();
        let result = pool.run("x").await;

        match &result.termination {
            Termination::Fatal(FatalError::AgentExecutionFailure { agent_id, source }) => {
                assert_eq!(agent_id, "slow");
                assert!(matches!(source, AgentError::Timeout { timeout_ms: 1000 }));
            }
            other => panic!("expected agent timeout, got {other:?}"),
        }
        assert!(result.turns().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_deadline_interrupts_in_flight_agent() {
        let pool = Pool::builder()
            .agent(echo("fast"))
            .agent(SleepyAgent::new("slow", Duration::from_secs(10)))
            .run_timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let result = pool.run("x").await;

        assert!(matches!(result.termination, Termination::DeadlineExceeded));
        assert_eq!(turn_tuples(&result), vec![("fast", "x", "x")]);
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_nothing() {
        let pool = Pool::builder().agent(echo("A")).build().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let result = pool.run_with_cancel("x", token).await;

        assert!(matches!(result.termination, Termination::Cancelled));
        assert!(result.turns().is_empty());
        assert_eq!(result.call_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_in_flight_agent_without_a_turn() {
        let pool = Pool::builder()
            .agent(echo("fast"))
            .agent(SleepyAgent::new("slow", Duration::from_secs(60)))
            .build()
            .unwrap();
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = pool.run_with_cancel("x", token).await;
        assert!(matches!(result.termination, Termination::Cancelled));
        assert_eq!(result.turns().len(), 1);
        assert_eq!(result.call_count, 1);
    }

    #[tokio::test]
    async fn next_input_variable_overrides_and_is_consumed() {
        let planner = FnAgent::new("planner", |input, state| {
            state.set_variable(NEXT_INPUT_VAR, format!("write about {input}"));
            Ok(Outcome::text("plan ready"))
        });
        let pool = Pool::builder().agent(planner).agent(echo("writer")).build().unwrap();
        let result = pool.run("otters").await;

        assert_eq!(
            turn_tuples(&result),
            vec![("planner", "otters", "plan ready"), ("writer", "write about otters", "write about otters")]
        );
        assert!(result.state.get_variable(NEXT_INPUT_VAR).is_none());
    }

    #[tokio::test]
    async fn non_string_next_input_is_ignored() {
        let planner = FnAgent::new("planner", |_, state| {
            state.set_variable(NEXT_INPUT_VAR, 42);
            Ok(Outcome::text("plan"))
        });
        let pool = Pool::builder().agent(planner).agent(echo("writer")).build().unwrap();
        let result = pool.run("x").await;

        assert_eq!(result.turns()[1].input, "plan");
        assert_eq!(result.annotations.len(), 1);
    }

    #[tokio::test]
    async fn variables_are_shared_between_agents() {
        let first = FnAgent::new("first", |_, state| {
            state.set_variable("topic", "rust");
            Ok(Outcome::text("set"))
        });
        let second = FnAgent::new("second", |_, state| {
            let topic = state
                .get_variable("topic")
                .and_then(|v| v.as_str())
                .unwrap_or("none")
                .to_string();
            Ok(Outcome::text(topic))
        });
        let pool = Pool::builder().agent(first).agent(second).build().unwrap();
        let result = pool.run("x").await;
        assert_eq!(result.final_output.as_deref(), Some("rust"));
    }

    #[tokio::test]
    async fn run_with_state_continues_history() {
        let pool = Pool::builder().agent(exclaim("A")).build().unwrap();
        let mut state = SharedState::new();
        state.append(Turn::from_outcome("earlier", "q", Outcome::text("previous answer")));
        let run_id = state.id().to_string();

        let result = pool.run_with_state("again", state).await;
        assert_eq!(result.state.id(), run_id);
        assert_eq!(result.turns().len(), 2);
        assert_eq!(result.turns()[1].index, 1);
        assert_eq!(result.turns()[1].output, "again!");
        assert_eq!(result.call_count, 1);
    }

    #[tokio::test]
    async fn after_turn_sees_each_appended_turn() {
        let recorder = std::sync::Arc::new(RecordingAgent::default());
        let pool = Pool::builder()
            .shared_agent(recorder.clone())
            .router(FnRouter::new(|ctx| {
                if ctx.call_count < 2 {
                    RouterDecision::next("recorder")
                } else {
                    RouterDecision::Stop
                }
            }))
            .build()
            .unwrap();
        let result = pool.run("x").await;

        let seen = recorder.seen.lock().unwrap().clone();
        let run_id = result.state.id().to_string();
        assert_eq!(seen, vec![(run_id.clone(), 0), (run_id, 1)]);
    }

    #[tokio::test]
    async fn router_context_carries_input_and_descriptions() {
        let pool = Pool::builder()
            .agent(echo("A").with_description("Echoes"))
            .router(FnRouter::new(|ctx| {
                assert_eq!(ctx.input, "original");
                assert_eq!(ctx.agents[0].description, "Echoes");
                if ctx.call_count == 0 {
                    assert!(ctx.last_outcome.is_none());
                    RouterDecision::next("A")
                } else {
                    assert_eq!(ctx.last_outcome.map(|o| o.output.as_str()), Some("original"));
                    RouterDecision::Stop
                }
            }))
            .build()
            .unwrap();
        assert!(matches!(pool.run("original").await.termination, Termination::RouterStop));
    }

    #[tokio::test]
    async fn run_publishes_lifecycle_events() {
        let bus = std::sync::Arc::new(EventBus::new(64));
        let mut rx = bus.subscribe();
        let pool = Pool::builder()
            .agent(echo("A"))
            .event_bus(bus.clone())
            .build()
            .unwrap();
        pool.run("hello").await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match std::sync::Arc::unwrap_or_clone(event) {
                DomainEvent::RunStarted { .. } => "started",
                DomainEvent::AgentInvoked { .. } => "invoked",
                DomainEvent::TurnAppended { .. } => "appended",
                DomainEvent::RunFinished { termination, call_count, .. } => {
                    assert_eq!(termination, "router_stop");
                    assert_eq!(call_count, 1);
                    "finished"
                }
                _ => "other",
            });
        }
        assert_eq!(kinds, vec!["started", "invoked", "appended", "finished"]);
    }

    #[test]
    fn builder_validates() {
        assert_eq!(Pool::builder().build().err(), Some(PoolError::NoAgents));
        assert_eq!(
            Pool::builder().agent(echo("A")).agent(echo("A")).build().err(),
            Some(PoolError::DuplicateAgent("A".into()))
        );
        assert_eq!(
            Pool::builder().agent(echo("A")).max_iterations(0).build().err(),
            Some(PoolError::ZeroIterations)
        );

        let pool = Pool::builder().agent(echo("A")).agent(echo("B")).build().unwrap();
        assert_eq!(pool.agent_ids().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(pool.router_name(), "round_robin");
        assert_eq!(pool.max_iterations(), DEFAULT_MAX_ITERATIONS);
    }

    #[test]
    fn pool_runs_are_send() {
        fn assert_send<T: Send>(_: &T) {}
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<Pool>();
        let pool = Pool::builder().agent(echo("A")).build().unwrap();
        let run = pool.run("x");
        assert_send(&run);
    }

    #[test]
    fn preview_truncates_long_input() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(200);
        assert_eq!(preview(&long).len(), 83);
    }
}
