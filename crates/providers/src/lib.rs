//! Provider dialects for Convoy.
//!
//! Each backend speaks its own streaming protocol and tool-calling
//! convention. Every dialect implements [`ProviderAdapter`]: it formats the
//! conversation, decodes stream frames into the shared
//! [`StreamDecoderState`], and encodes tool traffic for the next round.
//! [`Transport`] moves the bytes; the agent loop drives everything else.

pub mod accumulator;
pub mod adapter;
pub mod anthropic;
pub mod decoder;
pub mod encoder;
pub mod format;
pub mod framing;
pub mod gemini;
pub mod ollama;
pub mod openai_compat;
pub mod router;
pub mod transport;

pub use accumulator::{PartialCall, StreamDecoderState, tool_calls};
pub use adapter::{ProviderAdapter, WireConversation, WireMessage, WireRequest, adapter_for};
pub use anthropic::AnthropicAdapter;
pub use decoder::{StreamDecoder, WireEvent};
pub use framing::{FrameSplitter, Framing};
pub use gemini::GeminiAdapter;
pub use ollama::OllamaAdapter;
pub use openai_compat::OpenAiAdapter;
pub use router::{ProviderRouter, build_from_config};
pub use transport::{FrameStream, HttpTransport, RetryTransport, Transport};
