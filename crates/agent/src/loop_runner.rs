//! The agent loop implementation.
//!
//! One run drives a single conversational turn-cycle against one backend:
//! format the window once, stream a model round, and either return its text
//! or execute the requested tools and go around again. Rounds are strictly
//! sequential; separate runs share nothing.

use crate::context::{TokenBudgetTruncator, emergency_window};
use convoy_config::AgentSettings;
use convoy_core::error::{Error, ProviderError, Result};
use convoy_core::message::Message;
use convoy_core::provider::ProviderConfig;
use convoy_core::tool::{ToolCall, ToolEventCallback, ToolExecutor};
use convoy_providers::accumulator::{StreamDecoderState, tool_calls};
use convoy_providers::adapter::{ProviderAdapter, WireMessage, WireRequest, adapter_for};
use convoy_providers::decoder::StreamDecoder;
use convoy_providers::encoder::compact;
use convoy_providers::transport::{HttpTransport, RetryTransport, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

/// Marker a model can emit to end the run immediately.
pub const COMPLETION_SENTINEL: &str = "[[TASK_COMPLETE]]";

/// Bounds for one run.
#[derive(Debug, Clone)]
pub struct LoopLimits {
    pub max_iterations: u32,
    pub round_timeout: Duration,
    pub total_timeout: Duration,
    /// Tokens held back from the prompt budget.
    pub reserved_buffer: u32,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self::from(&AgentSettings::default())
    }
}

impl From<&AgentSettings> for LoopLimits {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            max_iterations: settings.max_iterations,
            round_timeout: settings.round_timeout(),
            total_timeout: settings.total_timeout(),
            reserved_buffer: settings.reserved_buffer_tokens,
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model answered without requesting tools.
    Completed,
    /// The model emitted [`COMPLETION_SENTINEL`].
    Sentinel,
    MaxIterations,
    RoundTimeout,
    TotalTimeout,
}

/// Result of a run.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub text: String,
    pub stop: StopReason,
    /// Completed tool rounds.
    pub iterations: u32,
    /// Model requests sent, including the emergency retry.
    pub rounds: u32,
    /// Every executed call in its final state.
    pub tool_calls: Vec<ToolCall>,
    /// The wire conversation as last sent, plus the final exchange.
    pub transcript: Vec<WireMessage>,
    /// History messages dropped by truncation.
    pub truncated: usize,
}

enum RoundOutcome {
    Finished(StreamDecoderState),
    TimedOut(StreamDecoderState),
}

/// Orchestrates model rounds and tool execution for one backend.
pub struct AgentLoop {
    adapter: Arc<dyn ProviderAdapter>,
    transport: Arc<dyn Transport>,
    config: ProviderConfig,
    limits: LoopLimits,
    executor: Option<Arc<dyn ToolExecutor>>,
    observer: Option<ToolEventCallback>,
    json_mode: bool,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        transport: Arc<dyn Transport>,
        config: ProviderConfig,
    ) -> Self {
        Self {
            adapter,
            transport,
            config,
            limits: LoopLimits::default(),
            executor: None,
            observer: None,
            json_mode: false,
        }
    }

    /// HTTP transport with transient retries, adapter chosen by dialect.
    pub fn from_config(
        config: ProviderConfig,
        settings: &AgentSettings,
    ) -> std::result::Result<Self, ProviderError> {
        let http: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
        let transport = RetryTransport::new(http)
            .with_max_retries(settings.transient_retries)
            .with_backoff(settings.retry_backoff());
        Ok(Self::new(adapter_for(config.provider), Arc::new(transport), config)
            .with_limits(LoopLimits::from(settings)))
    }

    pub fn with_limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the maximum number of tool rounds.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.limits.max_iterations = max;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_observer(mut self, observer: ToolEventCallback) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Ask for JSON output. Tools are not declared in this mode.
    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    /// Run the loop for `prompt` on top of `history`.
    ///
    /// Timeouts and the iteration cap end the run with descriptive text;
    /// provider and tool failures are returned as errors.
    pub async fn run(
        &self,
        prompt: &str,
        history: &[Message],
        system: Option<&str>,
    ) -> Result<AgentOutcome> {
        let total_deadline = Instant::now() + self.limits.total_timeout;
        let kind = self.adapter.kind();

        info!(
            provider = %kind,
            model = %self.config.model,
            history = history.len(),
            "Starting agent run"
        );

        let truncation =
            TokenBudgetTruncator::for_limits(&self.config.context_limits, self.limits.reserved_buffer)
                .truncate(history, system, prompt);
        if truncation.was_truncated() {
            warn!(omitted = truncation.omitted, "History truncated to fit the context window");
        }

        let mut conversation = self.adapter.format(&truncation.messages, system, prompt)?;
        let mut exchange_start = conversation.messages.len();

        let tools = match &self.executor {
            Some(executor) if !self.json_mode => executor.definitions(),
            _ => Vec::new(),
        };

        let mut iterations = 0u32;
        let mut rounds = 0u32;
        let mut last_text = String::new();
        let mut executed: Vec<ToolCall> = Vec::new();
        let mut emergency_used = false;

        let finish = |conversation: Vec<WireMessage>,
                      stop: StopReason,
                      text: String,
                      iterations: u32,
                      rounds: u32,
                      executed: Vec<ToolCall>| {
            info!(provider = %kind, ?stop, iterations, rounds, "Agent run finished");
            AgentOutcome {
                text,
                stop,
                iterations,
                rounds,
                tool_calls: executed,
                transcript: conversation,
                truncated: truncation.omitted,
            }
        };

        loop {
            if iterations >= self.limits.max_iterations {
                warn!(iterations, "Max tool iterations reached, returning best-effort text");
                let notice = format!("Maximum iterations ({}) reached", self.limits.max_iterations);
                return Ok(finish(
                    conversation.messages,
                    StopReason::MaxIterations,
                    with_notice(&last_text, &notice),
                    iterations,
                    rounds,
                    executed,
                ));
            }

            let now = Instant::now();
            if now >= total_deadline {
                let text = with_notice(&last_text, &self.timeout_notice(StopReason::TotalTimeout));
                return Ok(finish(
                    conversation.messages,
                    StopReason::TotalTimeout,
                    text,
                    iterations,
                    rounds,
                    executed,
                ));
            }
            let round_deadline = (now + self.limits.round_timeout).min(total_deadline);

            rounds += 1;
            debug!(provider = %kind, round = rounds, iteration = iterations, "Agent loop round");

            let request = self
                .adapter
                .request(&self.config, &conversation, &tools, self.json_mode);

            let state = match self.stream_round(&request, round_deadline).await {
                Ok(RoundOutcome::Finished(state)) => state,
                Ok(RoundOutcome::TimedOut(partial)) => {
                    let stop = self.timeout_kind(total_deadline);
                    warn!(round = rounds, ?stop, "Model round timed out");
                    let partial = best_text(&partial.accumulated_text, &last_text);
                    return Ok(finish(
                        conversation.messages,
                        stop,
                        with_notice(partial, &self.timeout_notice(stop)),
                        iterations,
                        rounds,
                        executed,
                    ));
                }
                Err(ProviderError::ContextWindowExceeded(reason)) if !emergency_used => {
                    warn!(%reason, "Context window exceeded, retrying with minimal history");
                    emergency_used = true;
                    let exchange = conversation.messages.split_off(exchange_start);
                    conversation =
                        self.adapter
                            .format(&emergency_window(history, prompt), system, prompt)?;
                    exchange_start = conversation.messages.len();
                    conversation.messages.extend(exchange);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let text = state.accumulated_text.clone();
            if text.contains(COMPLETION_SENTINEL) {
                let text = text.replace(COMPLETION_SENTINEL, "").trim().to_string();
                return Ok(finish(
                    conversation.messages,
                    StopReason::Sentinel,
                    text,
                    iterations,
                    rounds,
                    executed,
                ));
            }
            if !text.trim().is_empty() {
                last_text = text.clone();
            }

            let calls = tool_calls(&state);
            let executor = match &self.executor {
                Some(executor) if state.is_complete && !calls.is_empty() => executor,
                _ => {
                    if text.is_empty() && state.finish_reason.is_none() {
                        return Err(ProviderError::StreamInterrupted(
                            "stream ended without a response".into(),
                        )
                        .into());
                    }
                    return Ok(finish(
                        conversation.messages,
                        StopReason::Completed,
                        text,
                        iterations,
                        rounds,
                        executed,
                    ));
                }
            };

            debug!(tool_count = calls.len(), "Executing tool calls");
            let mut results = Vec::with_capacity(calls.len());
            for mut call in calls {
                call.start();
                self.notify(&call);

                let execution =
                    timeout_at(round_deadline, executor.execute(&call.name, call.args.clone()))
                        .await;
                match execution {
                    Ok(Ok(value)) => {
                        call.succeed(value.clone());
                        self.notify(&call);
                        let value = compact(&call.name, value);
                        results.push((call.clone(), value));
                        executed.push(call);
                    }
                    Ok(Err(e)) => {
                        warn!(tool = %call.name, error = %e, "Tool execution failed");
                        call.fail(e.to_string());
                        self.notify(&call);
                        return Err(Error::Tool(e));
                    }
                    Err(_) => {
                        let stop = self.timeout_kind(total_deadline);
                        warn!(tool = %call.name, ?stop, "Tool execution timed out");
                        call.fail(self.timeout_notice(stop));
                        self.notify(&call);
                        executed.push(call);
                        return Ok(finish(
                            conversation.messages,
                            stop,
                            with_notice(&last_text, &self.timeout_notice(stop)),
                            iterations,
                            rounds,
                            executed,
                        ));
                    }
                }
            }

            let invoked: Vec<ToolCall> = results.iter().map(|(call, _)| call.clone()).collect();
            conversation
                .messages
                .push(self.adapter.encode_invocation(&text, &invoked));
            conversation
                .messages
                .extend(self.adapter.encode_results(&results));
            iterations += 1;
        }
    }

    /// Stream one model round until it ends or `deadline` passes.
    ///
    /// On timeout the frame stream is dropped, which aborts the request.
    async fn stream_round(
        &self,
        request: &WireRequest,
        deadline: Instant,
    ) -> std::result::Result<RoundOutcome, ProviderError> {
        let mut stream = match timeout_at(deadline, self.transport.open(request)).await {
            Ok(opened) => opened?,
            Err(_) => {
                return Ok(RoundOutcome::TimedOut(StreamDecoderState::new(
                    self.adapter.kind(),
                )));
            }
        };

        let mut decoder = StreamDecoder::new(self.adapter.as_ref());
        loop {
            match timeout_at(deadline, stream.next()).await {
                Err(_) => return Ok(RoundOutcome::TimedOut(decoder.into_state())),
                Ok(None) => break,
                Ok(Some(Err(e))) => return Err(e),
                Ok(Some(Ok(frame))) => {
                    decoder.feed(&frame)?;
                }
            }
        }

        if decoder.skipped() > 0 {
            debug!(skipped = decoder.skipped(), "Dropped malformed stream frames");
        }
        Ok(RoundOutcome::Finished(decoder.into_state()))
    }

    fn timeout_kind(&self, total_deadline: Instant) -> StopReason {
        if Instant::now() >= total_deadline {
            StopReason::TotalTimeout
        } else {
            StopReason::RoundTimeout
        }
    }

    fn timeout_notice(&self, stop: StopReason) -> String {
        match stop {
            StopReason::TotalTimeout => format!(
                "Agent run timed out after {}s",
                self.limits.total_timeout.as_secs()
            ),
            _ => format!(
                "Model round timed out after {}s",
                self.limits.round_timeout.as_secs()
            ),
        }
    }

    // Observer panics must not take the loop down with them.
    fn notify(&self, call: &ToolCall) {
        if let Some(observer) = &self.observer {
            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| observer(call)));
            if outcome.is_err() {
                warn!(tool = %call.name, "Tool event observer panicked");
            }
        }
    }
}

fn best_text<'a>(current: &'a str, previous: &'a str) -> &'a str {
    if current.trim().is_empty() {
        previous
    } else {
        current
    }
}

fn with_notice(text: &str, notice: &str) -> String {
    if text.trim().is_empty() {
        format!("[{notice}]")
    } else {
        format!("{}\n\n[{notice}]", text.trim_end())
    }
}

/// Run one agent loop and return its final text.
///
/// Uses the default loop limits and an HTTP transport with transient
/// retries. Tools are declared only when an executor is given.
pub async fn run_agent_loop(
    prompt: &str,
    history: &[Message],
    config: &ProviderConfig,
    system_instruction: Option<&str>,
    tool_executor: Option<Arc<dyn ToolExecutor>>,
    tool_event_callback: Option<ToolEventCallback>,
) -> Result<String> {
    let mut agent = AgentLoop::from_config(config.clone(), &AgentSettings::default())?;
    if let Some(executor) = tool_executor {
        agent = agent.with_executor(executor);
    }
    if let Some(callback) = tool_event_callback {
        agent = agent.with_observer(callback);
    }
    Ok(agent.run(prompt, history, system_instruction).await?.text)
}
