//! Typed stream events and the per-round decoder.

use crate::accumulator::{StreamDecoderState, tool_calls};
use crate::adapter::ProviderAdapter;
use crate::{anthropic, gemini, ollama, openai_compat};
use convoy_core::error::ProviderError;
use convoy_core::tool::ToolCall;
use tracing::trace;

/// One decoded frame, discriminated by dialect.
#[derive(Debug, Clone)]
pub enum WireEvent {
    OpenAi(openai_compat::StreamChunk),
    Anthropic(anthropic::StreamEvent),
    Gemini(gemini::StreamChunk),
    Ollama(ollama::StreamChunk),
}

impl StreamDecoderState {
    /// Fold an event into the state, returning any new text.
    ///
    /// Errors are provider-reported failures carried inside the stream.
    pub fn apply(&mut self, event: WireEvent) -> Result<Option<String>, ProviderError> {
        match event {
            WireEvent::OpenAi(chunk) => openai_compat::apply(self, chunk),
            WireEvent::Anthropic(event) => anthropic::apply(self, event),
            WireEvent::Gemini(chunk) => gemini::apply(self, chunk),
            WireEvent::Ollama(chunk) => ollama::apply(self, chunk),
        }
    }
}

/// Decodes the frames of a single model round.
pub struct StreamDecoder<'a> {
    adapter: &'a dyn ProviderAdapter,
    state: StreamDecoderState,
    skipped: usize,
}

impl<'a> StreamDecoder<'a> {
    pub fn new(adapter: &'a dyn ProviderAdapter) -> Self {
        Self {
            adapter,
            state: StreamDecoderState::new(adapter.kind()),
            skipped: 0,
        }
    }

    /// Decode one frame. Frames that do not parse are skipped.
    pub fn feed(&mut self, frame: &str) -> Result<Option<String>, ProviderError> {
        match self.adapter.parse_event(frame) {
            Ok(event) => self.state.apply(event),
            Err(e) => {
                self.skipped += 1;
                trace!(
                    provider = %self.adapter.kind(),
                    data = %frame,
                    error = %e,
                    "Ignoring unparseable stream frame"
                );
                Ok(None)
            }
        }
    }

    pub fn state(&self) -> &StreamDecoderState {
        &self.state
    }

    /// Calls materialized so far; safe to poll mid-stream.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        tool_calls(&self.state)
    }

    /// Number of frames dropped as malformed.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn into_state(self) -> StreamDecoderState {
        self.state
    }
}
